//! Hierarchical scene paths.
//!
//! A path is a sequence of elements under the absolute root:
//!
//! ```text
//! /World/Geom{lod=high}Mesh.points      prim, variant selection, property
//! /World/Look.rel[/World/Mat].weight    target and relational attribute
//! ```
//!
//! Paths order element by element, with parents before children, so a
//! sorted run of paths keeps every subtree contiguous.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::util::{Error, Result};

/// One step of a path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathElement {
    Prim(String),
    VariantSelection(String, String),
    Property(String),
    Target(Path),
}

/// Absolute scene path. The default value is the empty path.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    elems: Option<Arc<[PathElement]>>,
}

impl Path {
    /// The empty (invalid) path.
    pub fn empty() -> Self {
        Self { elems: None }
    }

    /// The absolute root `/`.
    pub fn root() -> Self {
        Self { elems: Some(Arc::from(Vec::new())) }
    }

    fn from_elements(elems: Vec<PathElement>) -> Self {
        Self { elems: Some(Arc::from(elems)) }
    }

    /// Parse a path string, reporting malformed input as an error.
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elems.is_none()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        matches!(&self.elems, Some(e) if e.is_empty())
    }

    pub fn elements(&self) -> &[PathElement] {
        self.elems.as_deref().unwrap_or(&[])
    }

    fn last(&self) -> Option<&PathElement> {
        self.elements().last()
    }

    /// Number of elements below the root.
    pub fn depth(&self) -> usize {
        self.elements().len()
    }

    /// Parent path. The root's parent and the empty path's parent are empty.
    pub fn parent(&self) -> Path {
        match &self.elems {
            Some(e) if !e.is_empty() => Self::from_elements(e[..e.len() - 1].to_vec()),
            _ => Path::empty(),
        }
    }

    /// Prim or variant-selection path (including the root).
    pub fn is_prim_path(&self) -> bool {
        !self.is_empty()
            && matches!(
                self.last(),
                None | Some(PathElement::Prim(_)) | Some(PathElement::VariantSelection(..))
            )
    }

    pub fn is_property_path(&self) -> bool {
        matches!(self.last(), Some(PathElement::Property(_)))
    }

    /// Property directly owned by a prim, as opposed to a relational
    /// attribute owned by a target.
    pub fn is_prim_property_path(&self) -> bool {
        let e = self.elements();
        e.len() >= 2
            && matches!(e[e.len() - 1], PathElement::Property(_))
            && matches!(e[e.len() - 2], PathElement::Prim(_) | PathElement::VariantSelection(..))
    }

    pub fn is_target_path(&self) -> bool {
        matches!(self.last(), Some(PathElement::Target(_)))
    }

    /// The path a target element refers to.
    pub fn target_path(&self) -> Option<&Path> {
        match self.last() {
            Some(PathElement::Target(p)) => Some(p),
            _ => None,
        }
    }

    /// Name of the last prim or property element.
    pub fn name(&self) -> &str {
        match self.last() {
            Some(PathElement::Prim(n)) | Some(PathElement::Property(n)) => n,
            Some(PathElement::VariantSelection(_, v)) => v,
            _ => "",
        }
    }

    /// Text appended to the parent to form this path: `name`, `.name`,
    /// `{set=variant}` or `[/target]`. Empty for the root.
    pub fn element_string(&self) -> String {
        match self.last() {
            None => String::new(),
            Some(PathElement::Prim(n)) => n.clone(),
            Some(PathElement::VariantSelection(s, v)) => format!("{{{}={}}}", s, v),
            Some(PathElement::Property(n)) => format!(".{}", n),
            Some(PathElement::Target(p)) => format!("[{}]", p),
        }
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn has_prefix(&self, prefix: &Path) -> bool {
        match (&self.elems, &prefix.elems) {
            (Some(a), Some(b)) => a.len() >= b.len() && a[..b.len()] == b[..],
            _ => false,
        }
    }

    /// Nearest prim path at or above this path.
    pub fn prim_path(&self) -> Path {
        let e = self.elements();
        match e.iter().position(|x| matches!(x, PathElement::Property(_))) {
            Some(i) if !self.is_empty() => Self::from_elements(e[..i].to_vec()),
            _ => self.clone(),
        }
    }

    fn append(&self, elem: PathElement) -> Result<Path> {
        if self.is_empty() {
            return Err(Error::InvalidPath("cannot append to the empty path".into()));
        }
        let ok = match (&elem, self.last()) {
            (PathElement::Prim(_), None)
            | (PathElement::Prim(_), Some(PathElement::Prim(_)))
            | (PathElement::Prim(_), Some(PathElement::VariantSelection(..))) => true,
            (PathElement::VariantSelection(..), Some(PathElement::Prim(_)))
            | (PathElement::VariantSelection(..), Some(PathElement::VariantSelection(..))) => true,
            (PathElement::Property(_), Some(PathElement::Prim(_)))
            | (PathElement::Property(_), Some(PathElement::VariantSelection(..)))
            | (PathElement::Property(_), Some(PathElement::Target(_))) => true,
            (PathElement::Target(_), Some(PathElement::Property(_))) => true,
            _ => false,
        };
        if !ok {
            return Err(Error::InvalidPath(format!("cannot append {:?} to <{}>", elem, self)));
        }
        let mut elems = self.elements().to_vec();
        elems.push(elem);
        Ok(Self::from_elements(elems))
    }

    pub fn append_child(&self, name: &str) -> Result<Path> {
        validate_name(name)?;
        self.append(PathElement::Prim(name.to_string()))
    }

    pub fn append_property(&self, name: &str) -> Result<Path> {
        validate_name(name)?;
        self.append(PathElement::Property(name.to_string()))
    }

    pub fn append_target(&self, target: Path) -> Result<Path> {
        if target.is_empty() {
            return Err(Error::InvalidPath("empty target path".into()));
        }
        self.append(PathElement::Target(target))
    }

    pub fn append_variant_selection(&self, set: &str, variant: &str) -> Result<Path> {
        validate_name(set)?;
        self.append(PathElement::VariantSelection(set.to_string(), variant.to_string()))
    }

    /// Inverse of [`Path::element_string`].
    pub fn append_element_string(&self, elem: &str) -> Result<Path> {
        if let Some(name) = elem.strip_prefix('.') {
            self.append_property(name)
        } else if let Some(inner) = elem.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            self.append_target(inner.parse()?)
        } else if let Some(inner) = elem.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            let (set, variant) = inner
                .split_once('=')
                .ok_or_else(|| Error::InvalidPath(format!("bad variant selection '{}'", elem)))?;
            self.append_variant_selection(set, variant)
        } else {
            self.append_child(elem)
        }
    }

    /// Replace a leading `old` prefix with `new`.
    pub fn replace_prefix(&self, old: &Path, new: &Path) -> Option<Path> {
        if !self.has_prefix(old) || new.is_empty() {
            return None;
        }
        let mut elems = new.elements().to_vec();
        elems.extend_from_slice(&self.elements()[old.depth()..]);
        Some(Self::from_elements(elems))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '.', '[', ']', '{', '}']) {
        return Err(Error::InvalidPath(format!("invalid path element name '{}'", name)));
    }
    Ok(())
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Path::empty());
        }
        let bad = || Error::InvalidPath(s.to_string());
        if !s.starts_with('/') {
            return Err(bad());
        }
        let b = s.as_bytes();
        let mut path = Path::root();
        let mut i = 1;
        let mut after_slash = true;
        while i < b.len() {
            match b[i] {
                b'/' => {
                    if after_slash || !matches!(path.last(), Some(PathElement::Prim(_))) {
                        return Err(bad());
                    }
                    after_slash = true;
                    i += 1;
                    continue;
                }
                b'.' => {
                    let end = scan_name(b, i + 1);
                    path = path.append_property(&s[i + 1..end]).map_err(|_| bad())?;
                    i = end;
                }
                b'[' => {
                    let mut depth = 0usize;
                    let mut j = i;
                    loop {
                        match b.get(j) {
                            Some(b'[') => depth += 1,
                            Some(b']') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some(_) => {}
                            None => return Err(bad()),
                        }
                        j += 1;
                    }
                    let target: Path = s[i + 1..j].parse()?;
                    path = path.append_target(target).map_err(|_| bad())?;
                    i = j + 1;
                }
                b'{' => {
                    let close = s[i..].find('}').map(|k| i + k).ok_or_else(bad)?;
                    path = path.append_element_string(&s[i..=close]).map_err(|_| bad())?;
                    i = close + 1;
                }
                _ => {
                    let prim_ok = after_slash
                        || matches!(path.last(), Some(PathElement::VariantSelection(..)));
                    if !prim_ok {
                        return Err(bad());
                    }
                    let end = scan_name(b, i);
                    path = path.append_child(&s[i..end]).map_err(|_| bad())?;
                    i = end;
                }
            }
            after_slash = false;
        }
        if after_slash && !path.is_root() {
            return Err(bad());
        }
        Ok(path)
    }
}

/// End of a name starting at `start`.
fn scan_name(b: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < b.len() && !matches!(b[i], b'/' | b'.' | b'[' | b']' | b'{' | b'}') {
        i += 1;
    }
    i
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(elems) = &self.elems else {
            return Ok(());
        };
        if elems.is_empty() {
            return f.write_str("/");
        }
        let mut prev: Option<&PathElement> = None;
        for e in elems.iter() {
            match e {
                PathElement::Prim(n) => {
                    if !matches!(prev, Some(PathElement::VariantSelection(..))) {
                        f.write_str("/")?;
                    }
                    f.write_str(n)?;
                }
                PathElement::VariantSelection(s, v) => write!(f, "{{{}={}}}", s, v)?,
                PathElement::Property(n) => write!(f, ".{}", n)?,
                PathElement::Target(p) => write!(f, "[{}]", p)?,
            }
            prev = Some(e);
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        s.parse().expect("valid path")
    }

    #[test]
    fn test_parse_display_roundtrip() {
        for s in [
            "/",
            "/A",
            "/A/B",
            "/A.x",
            "/A/B.primvars:st",
            "/A.rel[/B/C]",
            "/A.rel[/B/C].weight",
            "/A{lod=high}",
            "/A{lod=high}B.x",
            "/A{a=1}{b=2}",
        ] {
            assert_eq!(p(s).to_string(), s);
        }
        assert!(p("").is_empty());
        assert_eq!(p("").to_string(), "");
    }

    #[test]
    fn test_parse_rejects() {
        for s in ["A", "/A/", "//A", "/A..x", "/A.x/B", "/A[/B]", "/A.x[/B", "/.x"] {
            assert!(s.parse::<Path>().is_err(), "{} should not parse", s);
        }
    }

    #[test]
    fn test_parent_chain() {
        assert_eq!(p("/A/B.x").parent(), p("/A/B"));
        assert_eq!(p("/A").parent(), Path::root());
        assert!(Path::root().parent().is_empty());
        assert!(Path::empty().parent().is_empty());
        assert_eq!(p("/A.rel[/B]").parent(), p("/A.rel"));
    }

    #[test]
    fn test_classification() {
        assert!(p("/A.x").is_prim_property_path());
        assert!(p("/A{v=x}.y").is_prim_property_path());
        assert!(!p("/A.rel[/B].w").is_prim_property_path());
        assert!(p("/A.rel[/B].w").is_property_path());
        assert!(p("/A.rel[/B]").is_target_path());
        assert_eq!(p("/A.rel[/B]").target_path(), Some(&p("/B")));
        assert!(p("/").is_prim_path());
        assert!(p("/A/B").is_prim_path());
        assert!(!p("/A.x").is_prim_path());
        assert_eq!(p("/A/B.x").prim_path(), p("/A/B"));
    }

    #[test]
    fn test_element_strings() {
        for s in ["/A/B", "/A.x", "/A.r[/B]", "/A{v=x}", "/A.r[/B].w"] {
            let path = p(s);
            let rebuilt = path
                .parent()
                .append_element_string(&path.element_string())
                .expect("append");
            assert_eq!(rebuilt, path);
        }
        assert_eq!(Path::root().element_string(), "");
        assert_eq!(p("/A/B").name(), "B");
        assert_eq!(p("/A.x").name(), "x");
    }

    #[test]
    fn test_ordering_keeps_subtrees_contiguous() {
        let mut paths = vec![p("/B"), p("/A/C"), p("/A.x"), p("/A"), p("/"), p("/A/C.y"), p("/AB")];
        paths.sort();
        let root = p("/A");
        let first = paths.iter().position(|x| *x == root).expect("present");
        let run = paths[first..].iter().take_while(|x| x.has_prefix(&root)).count();
        assert_eq!(run, 4);
        assert_eq!(paths[0], Path::root());
        assert!(Path::empty() < Path::root());
    }

    #[test]
    fn test_replace_prefix() {
        assert_eq!(p("/A/B.x").replace_prefix(&p("/A"), &p("/C/D")), Some(p("/C/D/B.x")));
        assert_eq!(p("/X").replace_prefix(&p("/A"), &p("/C")), None);
    }
}
