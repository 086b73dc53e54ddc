//! Table handles and the structural records stored in FIELDS and SPECS.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use super::value_rep::ValueRep;

macro_rules! table_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// The sentinel handle.
            pub const INVALID: Self = Self(u32::MAX);

            #[inline]
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }

            #[inline]
            pub const fn get(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}(invalid)", stringify!($name))
                }
            }
        }
    };
}

table_index!(
    /// Handle into the token table.
    TokenIndex
);
table_index!(
    /// Handle into the string table (which itself holds token handles).
    StringIndex
);
table_index!(
    /// Handle into the path table.
    PathIndex
);
table_index!(
    /// Handle into the field table.
    FieldIndex
);
table_index!(
    /// Handle into the flat field-set table; runs end at an invalid index.
    FieldSetIndex
);

/// A named value: token handle plus value descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Field {
    pub token_index: TokenIndex,
    pub value_rep: ValueRep,
}

impl Field {
    #[inline]
    pub const fn new(token_index: TokenIndex, value_rep: ValueRep) -> Self {
        Self { token_index, value_rep }
    }
}

/// Kind of a spec. Numbering is part of the file format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum SpecType {
    #[default]
    Unknown = 0,
    Attribute = 1,
    Connection = 2,
    Expression = 3,
    Mapper = 4,
    MapperArg = 5,
    Prim = 6,
    PseudoRoot = 7,
    Relationship = 8,
    RelationshipTarget = 9,
    Variant = 10,
    VariantSet = 11,
}

impl SpecType {
    pub const fn from_u32(v: u32) -> Option<Self> {
        use SpecType::*;
        Some(match v {
            0 => Unknown,
            1 => Attribute,
            2 => Connection,
            3 => Expression,
            4 => Mapper,
            5 => MapperArg,
            6 => Prim,
            7 => PseudoRoot,
            8 => Relationship,
            9 => RelationshipTarget,
            10 => Variant,
            11 => VariantSet,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        use SpecType::*;
        match self {
            Unknown => "Unknown",
            Attribute => "Attribute",
            Connection => "Connection",
            Expression => "Expression",
            Mapper => "Mapper",
            MapperArg => "MapperArg",
            Prim => "Prim",
            PseudoRoot => "PseudoRoot",
            Relationship => "Relationship",
            RelationshipTarget => "RelationshipTarget",
            Variant => "Variant",
            VariantSet => "VariantSet",
        }
    }
}

impl fmt::Display for SpecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One addressable record: path, field set and kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Spec {
    pub path_index: PathIndex,
    pub field_set_index: FieldSetIndex,
    pub spec_type: SpecType,
}

impl Spec {
    #[inline]
    pub const fn new(path_index: PathIndex, spec_type: SpecType, field_set_index: FieldSetIndex) -> Self {
        Self { path_index, field_set_index, spec_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_default_is_sentinel() {
        assert!(!TokenIndex::default().is_valid());
        assert_eq!(FieldSetIndex::default().0, u32::MAX);
        assert!(PathIndex::new(0).is_valid());
        assert_eq!(format!("{:?}", FieldIndex::INVALID), "FieldIndex(invalid)");
    }

    #[test]
    fn test_spec_type_roundtrip() {
        for v in 0..12 {
            let t = SpecType::from_u32(v).expect("spec type");
            assert_eq!(t as u32, v);
        }
        assert!(SpecType::from_u32(12).is_none());
        assert_eq!(SpecType::Prim.to_string(), "Prim");
    }
}
