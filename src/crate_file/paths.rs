//! The PATHS section: a pre-order encoding of the path tree.
//!
//! Each node stores its table index, the token of its last element and
//! whether it has a child and a following sibling. Children directly follow
//! their parent; a sibling either follows the parent's subtree directly or,
//! when the parent has a child, is reached by an explicit offset. Reading
//! walks sibling subtrees in parallel.
//!
//! Before 0.4 nodes are fixed-size headers and sibling offsets are absolute
//! file positions. From 0.4 the tree is three compressed columns: path
//! indexes, element tokens (negated for prim properties) and jumps.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rayon::prelude::*;

use super::sections::SectionCursor;
use super::writer::ValueWriter;
use crate::format::{
    PathIndex, Version, PATH_HAS_CHILD, PATH_HAS_SIBLING, PATH_IS_PRIM_PROPERTY,
};
use crate::util::{Error, Result};
use crate::value::{Path, Token};

/// Jump of a node with a child but no sibling.
const JUMP_CHILD_ONLY: i32 = -1;
/// Jump of a leaf with no sibling.
const JUMP_LEAF: i32 = -2;

/// Shared state of a parallel tree walk.
struct TreeBuilder<'t> {
    tokens: &'t [Token],
    num_paths: usize,
    built: Mutex<Vec<(u32, Path)>>,
    first_error: Mutex<Option<Error>>,
    /// Nodes visited so far; a well-formed tree visits each at most once.
    visited: AtomicUsize,
    limit: usize,
}

impl<'t> TreeBuilder<'t> {
    fn new(tokens: &'t [Token], num_paths: usize, limit: usize) -> Self {
        Self {
            tokens,
            num_paths,
            built: Mutex::new(Vec::with_capacity(num_paths)),
            first_error: Mutex::new(None),
            visited: AtomicUsize::new(0),
            limit,
        }
    }

    fn fail(&self, err: Error) {
        self.first_error.lock().get_or_insert(err);
    }

    fn failed(&self) -> bool {
        self.first_error.lock().is_some()
    }

    /// Count a visit, refusing more nodes than the encoding can hold.
    fn visit(&self) -> Result<()> {
        if self.visited.fetch_add(1, Ordering::Relaxed) >= self.limit {
            return Err(Error::corrupt("path tree visits more nodes than it holds"));
        }
        Ok(())
    }

    /// Build one node's path and record it.
    fn make(&self, parent: &Path, index: u32, token: i64, prim_property: bool) -> Result<Path> {
        if index as usize >= self.num_paths {
            return Err(Error::corrupt(format!("path index {} out of range", index)));
        }
        let path = if parent.is_empty() {
            Path::root()
        } else {
            let token = usize::try_from(token)
                .ok()
                .and_then(|t| self.tokens.get(t))
                .ok_or_else(|| Error::corrupt(format!("path element token {} out of range", token)))?;
            if prim_property {
                parent.append_property(token)?
            } else {
                parent.append_element_string(token)?
            }
        };
        self.built.lock().push((index, path.clone()));
        Ok(path)
    }

    fn finish(self) -> Result<Vec<Path>> {
        if let Some(err) = self.first_error.into_inner() {
            return Err(err);
        }
        let mut paths = vec![Path::empty(); self.num_paths];
        for (index, path) in self.built.into_inner() {
            paths[index as usize] = path;
        }
        Ok(paths)
    }
}

/// Legacy layout: headers in pre-order with absolute sibling offsets.
struct LegacyTree<'a, 't> {
    builder: TreeBuilder<'t>,
    cursor: SectionCursor<'a>,
    header_pad: bool,
}

impl LegacyTree<'_, '_> {
    fn walk<'s>(&'s self, scope: &rayon::Scope<'s>, offset: u64, parent: Path) {
        if let Err(err) = self.walk_from(scope, offset, parent) {
            self.builder.fail(err);
        }
    }

    fn walk_from<'s>(&'s self, scope: &rayon::Scope<'s>, offset: u64, mut parent: Path) -> Result<()> {
        let mut c = self.cursor.clone();
        c.seek(offset)?;
        loop {
            if self.builder.failed() {
                return Ok(());
            }
            self.builder.visit()?;
            if self.header_pad {
                c.read_u32()?;
            }
            let index = c.read_u32()?;
            let token = c.read_u32()?;
            let bits = c.read_u8()?;
            c.read_bytes(3)?;

            let path = self.builder.make(&parent, index, token as i64, bits & PATH_IS_PRIM_PROPERTY != 0)?;
            let has_child = bits & PATH_HAS_CHILD != 0;
            let has_sibling = bits & PATH_HAS_SIBLING != 0;
            if has_child {
                if has_sibling {
                    let sibling = c.read_i64()?;
                    let sibling = u64::try_from(sibling)
                        .map_err(|_| Error::corrupt(format!("bad sibling offset {}", sibling)))?;
                    let sibling_parent = parent.clone();
                    scope.spawn(move |s| self.walk(s, sibling, sibling_parent));
                }
                parent = path;
            }
            if !(has_child || has_sibling) {
                return Ok(());
            }
        }
    }
}

/// Compressed layout: decoded columns indexed by pre-order position.
struct CompressedTree<'t> {
    builder: TreeBuilder<'t>,
    path_indexes: Vec<u32>,
    element_tokens: Vec<i32>,
    jumps: Vec<i32>,
}

impl CompressedTree<'_> {
    fn walk<'s>(&'s self, scope: &rayon::Scope<'s>, start: usize, parent: Path) {
        if let Err(err) = self.walk_from(scope, start, parent) {
            self.builder.fail(err);
        }
    }

    fn walk_from<'s>(&'s self, scope: &rayon::Scope<'s>, start: usize, mut parent: Path) -> Result<()> {
        let mut current = start;
        loop {
            if self.builder.failed() {
                return Ok(());
            }
            self.builder.visit()?;
            let this = current;
            current += 1;
            let (index, token, jump) = match (
                self.path_indexes.get(this),
                self.element_tokens.get(this),
                self.jumps.get(this),
            ) {
                (Some(&i), Some(&t), Some(&j)) => (i, t, j),
                _ => return Err(Error::corrupt(format!("path tree position {} out of range", this))),
            };

            let path = self.builder.make(&parent, index, (token as i64).abs(), token < 0)?;
            let has_child = jump > 0 || jump == JUMP_CHILD_ONLY;
            let has_sibling = jump >= 0;
            if has_child {
                if has_sibling {
                    let sibling = this + jump as usize;
                    let sibling_parent = parent.clone();
                    scope.spawn(move |s| self.walk(s, sibling, sibling_parent));
                }
                parent = path;
            }
            if !(has_child || has_sibling) {
                return Ok(());
            }
        }
    }
}

/// Decode the PATHS section at the cursor into the path table.
pub(crate) fn read_paths(c: &mut SectionCursor<'_>, tokens: &[Token], version: Version) -> Result<Vec<Path>> {
    let num_paths = c.read_u64()?;
    if num_paths > u32::MAX as u64 {
        return Err(Error::corrupt(format!("path table size {} exceeds index range", num_paths)));
    }
    let num_paths = num_paths as usize;

    if version < Version::COMPRESSED_STRUCTURE {
        if num_paths == 0 {
            return Ok(Vec::new());
        }
        let tree = LegacyTree {
            builder: TreeBuilder::new(tokens, num_paths, num_paths),
            cursor: c.clone(),
            header_pad: version < Version::PATH_HEADER_FIX,
        };
        let start = c.tell();
        rayon::scope(|s| tree.walk(s, start, Path::empty()));
        return tree.builder.finish();
    }

    let num_encoded = c.read_u64()? as usize;
    if num_encoded > num_paths {
        return Err(Error::corrupt(format!("{} encoded paths but table holds {}", num_encoded, num_paths)));
    }
    let tree = CompressedTree {
        builder: TreeBuilder::new(tokens, num_paths, num_encoded),
        path_indexes: c.read_compressed(num_encoded)?,
        element_tokens: c.read_compressed(num_encoded)?,
        jumps: c.read_compressed(num_encoded)?,
    };
    if num_encoded > 0 {
        rayon::scope(|s| tree.walk(s, 0, Path::empty()));
    }
    tree.builder.finish()
}

/// One node of the tree being written.
struct Node {
    index: u32,
    token: u32,
    prim_property: bool,
    has_child: bool,
    has_sibling: bool,
}

impl ValueWriter<'_> {
    fn element_token(&self, path: &Path) -> Result<u32> {
        let elem = if path.is_prim_property_path() {
            path.name().to_string()
        } else {
            path.element_string()
        };
        self.ctx
            .token_to_index
            .get(elem.as_str())
            .map(|t| t.0)
            .ok_or_else(|| Error::other(format!("no token for path element '{}'", elem)))
    }

    /// Shape of the node at `cur` of the sorted path list.
    fn node(&self, paths: &[(Path, PathIndex)], cur: usize) -> Result<Node> {
        let path = &paths[cur].0;
        let next_subtree = paths[cur + 1..]
            .iter()
            .position(|(p, _)| !p.has_prefix(path))
            .map_or(paths.len(), |i| cur + 1 + i);
        let next = cur + 1;
        let has_child = next != next_subtree && paths[next].0.parent() == *path;
        let has_sibling = next_subtree != paths.len() && paths[next_subtree].0.parent() == path.parent();
        Ok(Node {
            index: paths[cur].1 .0,
            token: self.element_token(path)?,
            prim_property: path.is_prim_property_path(),
            has_child,
            has_sibling,
        })
    }

    fn write_legacy_tree(&mut self, paths: &[(Path, PathIndex)], mut cur: usize) -> Result<usize> {
        let header_pad = self.write_version() < Version::PATH_HEADER_FIX;
        while cur != paths.len() {
            let node = self.node(paths, cur)?;
            let mut next = cur + 1;

            let mut bits = 0;
            if node.has_child {
                bits |= PATH_HAS_CHILD;
            }
            if node.has_sibling {
                bits |= PATH_HAS_SIBLING;
            }
            if node.prim_property {
                bits |= PATH_IS_PRIM_PROPERTY;
            }
            if header_pad {
                self.write_u32(0)?;
            }
            self.write_u32(node.index)?;
            self.write_u32(node.token)?;
            self.write_bytes(&[bits, 0, 0, 0])?;

            let sibling_slot = if node.has_child && node.has_sibling {
                let slot = self.tell();
                self.write_i64(-1)?;
                Some(slot)
            } else {
                None
            };
            if node.has_child {
                next = self.write_legacy_tree(paths, next)?;
            }
            if let Some(slot) = sibling_slot {
                let here = self.tell();
                self.seek(slot)?;
                self.write_i64(here as i64)?;
                self.seek(here)?;
            }
            if !node.has_sibling {
                return Ok(next);
            }
            cur = next;
        }
        Ok(paths.len())
    }

    fn build_compressed_tree(
        &self,
        paths: &[(Path, PathIndex)],
        mut cur: usize,
        columns: &mut (Vec<u32>, Vec<i32>, Vec<i32>),
    ) -> Result<usize> {
        while cur != paths.len() {
            let node = self.node(paths, cur)?;
            let mut next = cur + 1;

            let this = columns.0.len();
            columns.0.push(node.index);
            let token = node.token as i32;
            columns.1.push(if node.prim_property { -token } else { token });
            columns.2.push(0);

            if node.has_child {
                next = self.build_compressed_tree(paths, next, columns)?;
            }
            columns.2[this] = match (node.has_child, node.has_sibling) {
                (true, true) => (columns.0.len() - this) as i32,
                (false, true) => 0,
                (true, false) => JUMP_CHILD_ONLY,
                (false, false) => JUMP_LEAF,
            };
            if !node.has_sibling {
                return Ok(next);
            }
            cur = next;
        }
        Ok(paths.len())
    }

    /// Write the PATHS section body.
    pub(super) fn write_paths(&mut self) -> Result<()> {
        let mut paths: Vec<(Path, PathIndex)> = self
            .tables
            .paths
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_empty())
            .map(|(i, p)| (p.clone(), PathIndex::new(i as u32)))
            .collect();
        paths.par_sort_by(|a, b| a.0.cmp(&b.0));

        self.write_u64(self.tables.paths.len() as u64)?;
        if self.write_version() < Version::COMPRESSED_STRUCTURE {
            if !paths.is_empty() {
                self.write_legacy_tree(&paths, 0)?;
            }
            return Ok(());
        }

        let mut columns = (Vec::new(), Vec::new(), Vec::new());
        if !paths.is_empty() {
            self.build_compressed_tree(&paths, 0, &mut columns)?;
        }
        self.write_u64(columns.0.len() as u64)?;
        self.write_compressed_ints(&columns.0)?;
        self.write_compressed_ints(&columns.1)?;
        self.write_compressed_ints(&columns.2)
    }
}
