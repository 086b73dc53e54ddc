//! Packed 64-bit value descriptors and the value type tags they carry.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Value type tag stored in bits 48..56 of a [`ValueRep`].
///
/// The numbering is part of the file format and must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeEnum {
    Invalid = 0,
    Bool = 1,
    UChar = 2,
    Int = 3,
    UInt = 4,
    Int64 = 5,
    UInt64 = 6,
    Half = 7,
    Float = 8,
    Double = 9,
    String = 10,
    Token = 11,
    AssetPath = 12,
    Matrix2d = 13,
    Matrix3d = 14,
    Matrix4d = 15,
    Quatd = 16,
    Quatf = 17,
    Quath = 18,
    Vec2d = 19,
    Vec2f = 20,
    Vec2h = 21,
    Vec2i = 22,
    Vec3d = 23,
    Vec3f = 24,
    Vec3h = 25,
    Vec3i = 26,
    Vec4d = 27,
    Vec4f = 28,
    Vec4h = 29,
    Vec4i = 30,
    Dictionary = 31,
    TokenListOp = 32,
    StringListOp = 33,
    PathListOp = 34,
    ReferenceListOp = 35,
    IntListOp = 36,
    Int64ListOp = 37,
    UIntListOp = 38,
    UInt64ListOp = 39,
    PathVector = 40,
    TokenVector = 41,
    Specifier = 42,
    Permission = 43,
    Variability = 44,
    VariantSelectionMap = 45,
    TimeSamples = 46,
    Payload = 47,
    DoubleVector = 48,
    LayerOffsetVector = 49,
    StringVector = 50,
    ValueBlock = 51,
    Value = 52,
    UnregisteredValue = 53,
    UnregisteredValueListOp = 54,
    PayloadListOp = 55,
    TimeCode = 56,
}

impl TypeEnum {
    /// One past the largest tag.
    pub const COUNT: usize = 57;

    /// Convert from the raw tag byte.
    pub const fn from_u8(v: u8) -> Option<Self> {
        use TypeEnum::*;
        Some(match v {
            0 => Invalid,
            1 => Bool,
            2 => UChar,
            3 => Int,
            4 => UInt,
            5 => Int64,
            6 => UInt64,
            7 => Half,
            8 => Float,
            9 => Double,
            10 => String,
            11 => Token,
            12 => AssetPath,
            13 => Matrix2d,
            14 => Matrix3d,
            15 => Matrix4d,
            16 => Quatd,
            17 => Quatf,
            18 => Quath,
            19 => Vec2d,
            20 => Vec2f,
            21 => Vec2h,
            22 => Vec2i,
            23 => Vec3d,
            24 => Vec3f,
            25 => Vec3h,
            26 => Vec3i,
            27 => Vec4d,
            28 => Vec4f,
            29 => Vec4h,
            30 => Vec4i,
            31 => Dictionary,
            32 => TokenListOp,
            33 => StringListOp,
            34 => PathListOp,
            35 => ReferenceListOp,
            36 => IntListOp,
            37 => Int64ListOp,
            38 => UIntListOp,
            39 => UInt64ListOp,
            40 => PathVector,
            41 => TokenVector,
            42 => Specifier,
            43 => Permission,
            44 => Variability,
            45 => VariantSelectionMap,
            46 => TimeSamples,
            47 => Payload,
            48 => DoubleVector,
            49 => LayerOffsetVector,
            50 => StringVector,
            51 => ValueBlock,
            52 => Value,
            53 => UnregisteredValue,
            54 => UnregisteredValueListOp,
            55 => PayloadListOp,
            56 => TimeCode,
            _ => return None,
        })
    }

    /// Whether values of this type may be stored as arrays.
    #[inline]
    pub const fn supports_array(self) -> bool {
        let v = self as u8;
        (v >= 1 && v <= 30) || v == 56
    }

    /// Human-readable type name, matching scene-description type names.
    pub const fn name(self) -> &'static str {
        use TypeEnum::*;
        match self {
            Invalid => "invalid",
            Bool => "bool",
            UChar => "uchar",
            Int => "int",
            UInt => "uint",
            Int64 => "int64",
            UInt64 => "uint64",
            Half => "half",
            Float => "float",
            Double => "double",
            String => "string",
            Token => "token",
            AssetPath => "asset",
            Matrix2d => "matrix2d",
            Matrix3d => "matrix3d",
            Matrix4d => "matrix4d",
            Quatd => "quatd",
            Quatf => "quatf",
            Quath => "quath",
            Vec2d => "double2",
            Vec2f => "float2",
            Vec2h => "half2",
            Vec2i => "int2",
            Vec3d => "double3",
            Vec3f => "float3",
            Vec3h => "half3",
            Vec3i => "int3",
            Vec4d => "double4",
            Vec4f => "float4",
            Vec4h => "half4",
            Vec4i => "int4",
            Dictionary => "dictionary",
            TokenListOp => "tokenListOp",
            StringListOp => "stringListOp",
            PathListOp => "pathListOp",
            ReferenceListOp => "referenceListOp",
            IntListOp => "intListOp",
            Int64ListOp => "int64ListOp",
            UIntListOp => "uintListOp",
            UInt64ListOp => "uint64ListOp",
            PathVector => "pathVector",
            TokenVector => "tokenVector",
            Specifier => "specifier",
            Permission => "permission",
            Variability => "variability",
            VariantSelectionMap => "variantSelectionMap",
            TimeSamples => "timeSamples",
            Payload => "payload",
            DoubleVector => "doubleVector",
            LayerOffsetVector => "layerOffsetVector",
            StringVector => "stringVector",
            ValueBlock => "valueBlock",
            Value => "value",
            UnregisteredValue => "unregisteredValue",
            UnregisteredValueListOp => "unregisteredValueListOp",
            PayloadListOp => "payloadListOp",
            TimeCode => "timecode",
        }
    }
}

impl fmt::Display for TypeEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packed value descriptor.
///
/// Bit 63 is the array flag, bit 62 the inlined flag, bit 61 the compressed
/// flag, bits 48..56 the type tag and bits 0..48 the payload: either an
/// inlined encoding or an absolute file offset.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct ValueRep(pub u64);

impl ValueRep {
    const IS_ARRAY_BIT: u64 = 1 << 63;
    const IS_INLINED_BIT: u64 = 1 << 62;
    const IS_COMPRESSED_BIT: u64 = 1 << 61;
    /// Mask of the 48-bit payload.
    pub const PAYLOAD_MASK: u64 = (1 << 48) - 1;

    #[inline]
    pub const fn new(t: TypeEnum, is_inlined: bool, is_array: bool, payload: u64) -> Self {
        Self(
            (if is_array { Self::IS_ARRAY_BIT } else { 0 })
                | (if is_inlined { Self::IS_INLINED_BIT } else { 0 })
                | ((t as u64) << 48)
                | (payload & Self::PAYLOAD_MASK),
        )
    }

    /// Rep for a non-inlined scalar at `offset`.
    #[inline]
    pub const fn at(t: TypeEnum, offset: u64) -> Self {
        Self::new(t, false, false, offset)
    }

    /// Rep for an inlined scalar.
    #[inline]
    pub const fn inlined(t: TypeEnum, bits: u32) -> Self {
        Self::new(t, true, false, bits as u64)
    }

    /// Rep for an array at `offset`; offset 0 is the empty array.
    #[inline]
    pub const fn array(t: TypeEnum, offset: u64) -> Self {
        Self::new(t, false, true, offset)
    }

    #[inline]
    pub const fn is_array(self) -> bool {
        self.0 & Self::IS_ARRAY_BIT != 0
    }

    #[inline]
    pub const fn is_inlined(self) -> bool {
        self.0 & Self::IS_INLINED_BIT != 0
    }

    #[inline]
    pub const fn is_compressed(self) -> bool {
        self.0 & Self::IS_COMPRESSED_BIT != 0
    }

    #[inline]
    pub fn set_is_compressed(&mut self) {
        self.0 |= Self::IS_COMPRESSED_BIT;
    }

    /// Raw type tag byte.
    #[inline]
    pub const fn type_tag(self) -> u8 {
        ((self.0 >> 48) & 0xFF) as u8
    }

    /// Decoded type tag, `None` for tags this library does not know.
    #[inline]
    pub const fn type_enum(self) -> Option<TypeEnum> {
        TypeEnum::from_u8(self.type_tag())
    }

    #[inline]
    pub const fn payload(self) -> u64 {
        self.0 & Self::PAYLOAD_MASK
    }

    /// Low 32 bits of the payload, where inlined encodings live.
    #[inline]
    pub const fn inline_bits(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[inline]
    pub fn set_payload(&mut self, payload: u64) {
        self.0 = (self.0 & !Self::PAYLOAD_MASK) | (payload & Self::PAYLOAD_MASK);
    }

    /// Raw 64-bit word as stored on disk.
    #[inline]
    pub const fn data(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ValueRep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.type_enum() {
            Some(t) => t.name().to_string(),
            None => format!("<tag {}>", self.type_tag()),
        };
        write!(
            f,
            "ValueRep({}{}{}{} payload={})",
            tag,
            if self.is_array() { "[]" } else { "" },
            if self.is_inlined() { " inlined" } else { "" },
            if self.is_compressed() { " compressed" } else { "" },
            self.payload()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_layout() {
        let rep = ValueRep::new(TypeEnum::Vec3f, false, true, 0x1234);
        assert_eq!(rep.data(), (1u64 << 63) | (24u64 << 48) | 0x1234);
        assert!(rep.is_array());
        assert!(!rep.is_inlined());
        assert_eq!(rep.type_enum(), Some(TypeEnum::Vec3f));

        let rep = ValueRep::inlined(TypeEnum::Int, 7);
        assert_eq!(rep.data(), (1u64 << 62) | (3u64 << 48) | 7);
        assert_eq!(rep.inline_bits(), 7);
    }

    #[test]
    fn test_compressed_and_payload() {
        let mut rep = ValueRep::array(TypeEnum::Float, 100);
        rep.set_is_compressed();
        assert!(rep.is_compressed());
        assert!(rep.is_array());
        rep.set_payload(u64::MAX);
        assert_eq!(rep.payload(), ValueRep::PAYLOAD_MASK);
        assert_eq!(rep.type_enum(), Some(TypeEnum::Float));
        assert!(rep.is_compressed());
    }

    #[test]
    fn test_type_enum_table() {
        for v in 0..TypeEnum::COUNT as u8 {
            let t = TypeEnum::from_u8(v).expect("known tag");
            assert_eq!(t as u8, v);
        }
        assert!(TypeEnum::from_u8(57).is_none());
        assert!(TypeEnum::Vec4i.supports_array());
        assert!(TypeEnum::TimeCode.supports_array());
        assert!(!TypeEnum::Dictionary.supports_array());
        assert!(!TypeEnum::Invalid.supports_array());
    }

    #[test]
    fn test_unknown_tag_debug() {
        let rep = ValueRep(200u64 << 48);
        assert!(rep.type_enum().is_none());
        assert!(format!("{:?}", rep).contains("<tag 200>"));
    }
}
