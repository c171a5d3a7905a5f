//! ElementType - how one element of an array is laid out.

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Error, PlainOldDataType, Result};

const TAG_POD: u8 = 0;
const TAG_FIXED_STRING: u8 = 1;
const TAG_COMPOUND: u8 = 2;
const TAG_VARLEN: u8 = 3;

/// Type of a single field inside a compound record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Numeric scalar
    Pod(PlainOldDataType),
    /// Null-padded text with a declared maximum byte length
    FixedString(usize),
}

impl FieldKind {
    /// Size of the field in bytes.
    pub fn num_bytes(&self) -> usize {
        match self {
            Self::Pod(pod) => pod.num_bytes(),
            Self::FixedString(len) => *len,
        }
    }
}

/// A named field of a compound record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompoundField {
    pub name: String,
    pub kind: FieldKind,
}

/// Fixed compound record: named scalar fields packed in declared order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompoundType {
    fields: Vec<CompoundField>,
}

impl CompoundType {
    /// Create an empty compound type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a numeric field.
    pub fn with_pod(mut self, name: &str, pod: PlainOldDataType) -> Self {
        self.fields.push(CompoundField { name: name.to_string(), kind: FieldKind::Pod(pod) });
        self
    }

    /// Append a fixed-width text field.
    pub fn with_text(mut self, name: &str, max_len: usize) -> Self {
        self.fields.push(CompoundField {
            name: name.to_string(),
            kind: FieldKind::FixedString(max_len),
        });
        self
    }

    /// Fields in declared order.
    pub fn fields(&self) -> &[CompoundField] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the compound has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Packed record size in bytes.
    pub fn num_bytes(&self) -> usize {
        self.fields.iter().map(|f| f.kind.num_bytes()).sum()
    }

    /// Byte offset of each field inside a packed record.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|f| {
                let start = offset;
                offset += f.kind.num_bytes();
                start
            })
            .collect()
    }
}

/// Element layout of a typed array.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Numeric scalar
    Pod(PlainOldDataType),
    /// Null-padded text of a declared maximum byte length
    FixedString(usize),
    /// Packed compound record
    Compound(CompoundType),
    /// Variable-length sequence of a numeric type, one length per entry
    VarLen(PlainOldDataType),
}

impl ElementType {
    /// Size of one element in bytes; `None` for variable-length elements.
    pub fn num_bytes(&self) -> Option<usize> {
        match self {
            Self::Pod(pod) => Some(pod.num_bytes()),
            Self::FixedString(len) => Some(*len),
            Self::Compound(ct) => Some(ct.num_bytes()),
            Self::VarLen(_) => None,
        }
    }

    /// Returns true if elements of this type have a fixed size.
    pub fn is_fixed(&self) -> bool {
        !matches!(self, Self::VarLen(_))
    }

    /// Returns true if this is a valid (known, non-empty) type.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Pod(pod) | Self::VarLen(pod) => *pod != PlainOldDataType::Unknown,
            Self::FixedString(len) => *len > 0,
            Self::Compound(ct) => {
                !ct.is_empty()
                    && ct.fields().iter().all(|f| match &f.kind {
                        FieldKind::Pod(pod) => *pod != PlainOldDataType::Unknown,
                        FieldKind::FixedString(len) => *len > 0,
                    })
            }
        }
    }

    /// Serialize the type description into an array header.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Pod(pod) => {
                buf.write_u8(TAG_POD)?;
                buf.write_u8(*pod as u8)?;
            }
            Self::FixedString(len) => {
                buf.write_u8(TAG_FIXED_STRING)?;
                buf.write_u32::<LittleEndian>(*len as u32)?;
            }
            Self::Compound(ct) => {
                buf.write_u8(TAG_COMPOUND)?;
                buf.write_u32::<LittleEndian>(ct.len() as u32)?;
                for field in ct.fields() {
                    buf.write_u32::<LittleEndian>(field.name.len() as u32)?;
                    buf.extend_from_slice(field.name.as_bytes());
                    match &field.kind {
                        FieldKind::Pod(pod) => {
                            buf.write_u8(TAG_POD)?;
                            buf.write_u8(*pod as u8)?;
                        }
                        FieldKind::FixedString(len) => {
                            buf.write_u8(TAG_FIXED_STRING)?;
                            buf.write_u32::<LittleEndian>(*len as u32)?;
                        }
                    }
                }
            }
            Self::VarLen(pod) => {
                buf.write_u8(TAG_VARLEN)?;
                buf.write_u8(*pod as u8)?;
            }
        }
        Ok(())
    }

    /// Deserialize a type description written by [`ElementType::encode_into`].
    pub fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let tag = cursor.read_u8()?;
        let ty = match tag {
            TAG_POD => Self::Pod(read_pod(cursor)?),
            TAG_FIXED_STRING => Self::FixedString(cursor.read_u32::<LittleEndian>()? as usize),
            TAG_COMPOUND => {
                let count = cursor.read_u32::<LittleEndian>()?;
                let mut ct = CompoundType::new();
                for _ in 0..count {
                    let name_len = cursor.read_u32::<LittleEndian>()? as usize;
                    let mut name = vec![0u8; name_len];
                    cursor.read_exact(&mut name)?;
                    let name = String::from_utf8(name)?;
                    ct = match cursor.read_u8()? {
                        TAG_POD => ct.with_pod(&name, read_pod(cursor)?),
                        TAG_FIXED_STRING => {
                            ct.with_text(&name, cursor.read_u32::<LittleEndian>()? as usize)
                        }
                        other => {
                            return Err(Error::invalid(format!("unknown field tag {other}")))
                        }
                    };
                }
                Self::Compound(ct)
            }
            TAG_VARLEN => Self::VarLen(read_pod(cursor)?),
            other => return Err(Error::invalid(format!("unknown element tag {other}"))),
        };
        Ok(ty)
    }
}

fn read_pod(cursor: &mut Cursor<&[u8]>) -> Result<PlainOldDataType> {
    let raw = cursor.read_u8()?;
    match PlainOldDataType::from_u8(raw) {
        PlainOldDataType::Unknown => Err(Error::invalid(format!("unknown POD code {raw}"))),
        pod => Ok(pod),
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pod(pod) => write!(f, "{}", pod.name()),
            Self::FixedString(len) => write!(f, "string[{len}]"),
            Self::Compound(ct) => {
                write!(f, "{{")?;
                for (i, field) in ct.fields().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &field.kind {
                        FieldKind::Pod(pod) => write!(f, "{}: {}", field.name, pod.name())?,
                        FieldKind::FixedString(len) => write!(f, "{}: string[{len}]", field.name)?,
                    }
                }
                write!(f, "}}")
            }
            Self::VarLen(pod) => write!(f, "vlen<{}>", pod.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_type() -> CompoundType {
        CompoundType::new()
            .with_text("Domain", 32)
            .with_text("Origin", 32)
            .with_pod("NumShapes", PlainOldDataType::Float32)
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(ElementType::Pod(PlainOldDataType::Float64).num_bytes(), Some(8));
        assert_eq!(ElementType::FixedString(32).num_bytes(), Some(32));
        assert_eq!(ElementType::Compound(meta_type()).num_bytes(), Some(68));
        assert_eq!(ElementType::VarLen(PlainOldDataType::Int32).num_bytes(), None);
        assert_eq!(meta_type().offsets(), vec![0, 32, 64]);
    }

    #[test]
    fn test_element_header_roundtrip() {
        let types = [
            ElementType::Pod(PlainOldDataType::Int64),
            ElementType::FixedString(16),
            ElementType::Compound(meta_type()),
            ElementType::VarLen(PlainOldDataType::Int32),
        ];
        for ty in types {
            let mut buf = Vec::new();
            ty.encode_into(&mut buf).unwrap();
            let mut cursor = Cursor::new(buf.as_slice());
            assert_eq!(ElementType::decode(&mut cursor).unwrap(), ty);
        }
    }

    #[test]
    fn test_element_validity() {
        assert!(ElementType::FixedString(1).is_valid());
        assert!(!ElementType::FixedString(0).is_valid());
        assert!(!ElementType::Compound(CompoundType::new()).is_valid());
        assert!(!ElementType::Pod(PlainOldDataType::Unknown).is_valid());
    }

    #[test]
    fn test_element_display() {
        assert_eq!(ElementType::VarLen(PlainOldDataType::Int32).to_string(), "vlen<int32_t>");
        assert_eq!(
            ElementType::Compound(meta_type()).to_string(),
            "{Domain: string[32], Origin: string[32], NumShapes: float32_t}"
        );
    }
}
