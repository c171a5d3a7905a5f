//! Numeric element types stored in container arrays and compound fields.

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Numeric storage type. The discriminant is the on-disk type code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PlainOldDataType {
    Uint8 = 1,
    Int32 = 2,
    Uint32 = 3,
    Int64 = 4,
    Uint64 = 5,
    Float32 = 6,
    Float64 = 7,
    /// Never written; decoding an unknown code yields this.
    #[default]
    Unknown = 0xFF,
}

const KNOWN: [PlainOldDataType; 7] = [
    PlainOldDataType::Uint8,
    PlainOldDataType::Int32,
    PlainOldDataType::Uint32,
    PlainOldDataType::Int64,
    PlainOldDataType::Uint64,
    PlainOldDataType::Float32,
    PlainOldDataType::Float64,
];

impl PlainOldDataType {
    /// Bytes per element; 0 for `Unknown`.
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 => 8,
            Self::Unknown => 0,
        }
    }

    /// C-style type name, as printed by `cadtree dump`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8_t",
            Self::Int32 => "int32_t",
            Self::Uint32 => "uint32_t",
            Self::Int64 => "int64_t",
            Self::Uint64 => "uint64_t",
            Self::Float32 => "float32_t",
            Self::Float64 => "float64_t",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Self {
        KNOWN.into_iter().find(|p| p.name() == name).unwrap_or_default()
    }

    pub fn from_u8(code: u8) -> Self {
        KNOWN.into_iter().find(|&p| p as u8 == code).unwrap_or_default()
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Uint8 | Self::Int32 | Self::Uint32 | Self::Int64 | Self::Uint64)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for PlainOldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust scalar that is stored as one container element.
pub trait ContainerPod: Pod + Zeroable + Default {
    const POD_TYPE: PlainOldDataType;
}

macro_rules! container_pod {
    ($($ty:ty => $pod:ident),* $(,)?) => {
        $(impl ContainerPod for $ty {
            const POD_TYPE: PlainOldDataType = PlainOldDataType::$pod;
        })*
    };
}

container_pod! {
    u8 => Uint8,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_rust_types() {
        assert_eq!(<u8 as ContainerPod>::POD_TYPE.num_bytes(), std::mem::size_of::<u8>());
        assert_eq!(<i32 as ContainerPod>::POD_TYPE.num_bytes(), std::mem::size_of::<i32>());
        assert_eq!(<f64 as ContainerPod>::POD_TYPE.num_bytes(), std::mem::size_of::<f64>());
        assert_eq!(PlainOldDataType::Unknown.num_bytes(), 0);
    }

    #[test]
    fn test_codes_and_names() {
        for pod in KNOWN {
            assert_eq!(PlainOldDataType::from_u8(pod as u8), pod);
            assert_eq!(PlainOldDataType::from_name(pod.name()), pod);
        }
        assert_eq!(PlainOldDataType::from_u8(0), PlainOldDataType::Unknown);
        assert_eq!(PlainOldDataType::from_name("half"), PlainOldDataType::Unknown);
        assert!(PlainOldDataType::Int64.is_integer() && !PlainOldDataType::Int64.is_float());
    }
}
