//! Scene-description value types that are not plain numbers or vectors.

use std::collections::BTreeMap;
use std::fmt;

use bytemuck::{Pod, Zeroable};
use half::f16;

use super::{Path, Value};

/// Two-component half vector.
pub type Vec2h = [f16; 2];
/// Three-component half vector.
pub type Vec3h = [f16; 3];
/// Four-component half vector.
pub type Vec4h = [f16; 4];
/// Half quaternion stored as `[i, j, k, real]`.
pub type Quath = [f16; 4];

/// String-keyed nested values.
pub type Dictionary = BTreeMap<String, Value>;

/// Variant set name to selected variant.
pub type VariantSelectionMap = BTreeMap<String, String>;

/// Reference to an external asset by its authored path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetPath(pub String);

impl AssetPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}@", self.0)
    }
}

/// Time-code value; a double that is retimed by layer offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Pod, Zeroable)]
#[repr(transparent)]
pub struct TimeCode(pub f64);

/// Time offset and scale applied to a referenced layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerOffset {
    pub offset: f64,
    pub scale: f64,
}

impl LayerOffset {
    pub const IDENTITY: LayerOffset = LayerOffset { offset: 0.0, scale: 1.0 };

    pub fn new(offset: f64, scale: f64) -> Self {
        Self { offset, scale }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for LayerOffset {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reference {
    pub asset_path: String,
    pub prim_path: Path,
    pub layer_offset: LayerOffset,
    pub custom_data: Dictionary,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Payload {
    pub asset_path: String,
    pub prim_path: Path,
    pub layer_offset: LayerOffset,
}

impl Payload {
    pub fn new(asset_path: impl Into<String>, prim_path: Path) -> Self {
        Self { asset_path: asset_path.into(), prim_path, layer_offset: LayerOffset::IDENTITY }
    }
}

/// How a prim spec contributes to composition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Specifier {
    #[default]
    Def = 0,
    Over = 1,
    Class = 2,
}

impl Specifier {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Def),
            1 => Some(Self::Over),
            2 => Some(Self::Class),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Permission {
    #[default]
    Public = 0,
    Private = 1,
}

impl Permission {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Public),
            1 => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Variability {
    #[default]
    Varying = 0,
    Uniform = 1,
}

impl Variability {
    /// Decode a stored variability. The retired "config" value 2 reads as
    /// uniform.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Varying),
            1 | 2 => Some(Self::Uniform),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_offset_identity() {
        assert!(LayerOffset::default().is_identity());
        assert!(!LayerOffset::new(1.0, 1.0).is_identity());
        assert!(Payload::new("a.usd", Path::root()).layer_offset.is_identity());
    }

    #[test]
    fn test_enum_decoding() {
        assert_eq!(Specifier::from_u32(2), Some(Specifier::Class));
        assert_eq!(Specifier::from_u32(3), None);
        assert_eq!(Permission::from_u32(1), Some(Permission::Private));
        assert_eq!(Variability::from_u32(2), Some(Variability::Uniform));
        assert_eq!(Variability::from_u32(7), None);
    }
}
