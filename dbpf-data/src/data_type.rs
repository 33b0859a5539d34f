// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Field data types.

The numbering of tags 0 through 20 is this crate's own. It has not been
checked against resources produced by other tools, so scalars in such
resources may be decoded under the wrong type by
[crate::DataEntry::values]. Tags are always written back exactly as read,
so raw field bytes and unknown tags round-trip regardless.
*/

/// The type of a field or entry value.
///
/// Composite types are recognized so they survive a round trip, but their
/// bytes are never interpreted. Tags outside the known range are preserved
/// as [DataType::Unknown].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DataType {
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Transform,
    LocalizationKey,
    TableSetReference,
    ResourceKey,
    Variant,
    Unknown(u32),
}

impl From<u32> for DataType {
    fn from(v: u32) -> Self {
        match v {
            0 => Self::Boolean,
            1 => Self::Int8,
            2 => Self::UInt8,
            3 => Self::Int16,
            4 => Self::UInt16,
            5 => Self::Int32,
            6 => Self::UInt32,
            7 => Self::Int64,
            8 => Self::UInt64,
            9 => Self::Float,
            10 => Self::Double,
            11 => Self::String,
            12 => Self::Vector2,
            13 => Self::Vector3,
            14 => Self::Vector4,
            15 => Self::Color,
            16 => Self::Transform,
            17 => Self::LocalizationKey,
            18 => Self::TableSetReference,
            19 => Self::ResourceKey,
            20 => Self::Variant,
            _ => Self::Unknown(v),
        }
    }
}

impl From<DataType> for u32 {
    fn from(t: DataType) -> Self {
        match t {
            DataType::Boolean => 0,
            DataType::Int8 => 1,
            DataType::UInt8 => 2,
            DataType::Int16 => 3,
            DataType::UInt16 => 4,
            DataType::Int32 => 5,
            DataType::UInt32 => 6,
            DataType::Int64 => 7,
            DataType::UInt64 => 8,
            DataType::Float => 9,
            DataType::Double => 10,
            DataType::String => 11,
            DataType::Vector2 => 12,
            DataType::Vector3 => 13,
            DataType::Vector4 => 14,
            DataType::Color => 15,
            DataType::Transform => 16,
            DataType::LocalizationKey => 17,
            DataType::TableSetReference => 18,
            DataType::ResourceKey => 19,
            DataType::Variant => 20,
            DataType::Unknown(v) => v,
        }
    }
}

impl DataType {
    /// Size in bytes of a single value, for fixed size scalar types.
    pub fn scalar_size(&self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double => Some(8),
            _ => None,
        }
    }

    /// Whether values of this type are decoded into [crate::DataValue]s.
    ///
    /// Everything else is carried as opaque bytes.
    pub fn is_primitive(&self) -> bool {
        self.scalar_size().is_some() || matches!(self, Self::String)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(v) => write!(f, "unknown({})", v),
            _ => write!(f, "{:?}", self),
        }
    }
}
