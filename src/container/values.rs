//! Typed values stored in a container: attributes, fixed text and compound records.

use std::fmt;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::util::{CompoundType, Error, FieldKind, PlainOldDataType, Result};

const ATTR_INT: u8 = 0;
const ATTR_FLOAT: u8 = 1;
const ATTR_TEXT: u8 = 2;
const ATTR_FLOATS: u8 = 3;
const ATTR_INTS: u8 = 4;

/// Scalar or small-vector attribute value attached to a group.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Text(String),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Floats(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Int(v) => {
                buf.write_u8(ATTR_INT)?;
                buf.write_i64::<LittleEndian>(*v)?;
            }
            Self::Float(v) => {
                buf.write_u8(ATTR_FLOAT)?;
                buf.write_f64::<LittleEndian>(*v)?;
            }
            Self::Text(v) => {
                buf.write_u8(ATTR_TEXT)?;
                write_str(buf, v)?;
            }
            Self::Floats(v) => {
                buf.write_u8(ATTR_FLOATS)?;
                buf.write_u32::<LittleEndian>(v.len() as u32)?;
                for x in v {
                    buf.write_f64::<LittleEndian>(*x)?;
                }
            }
            Self::Ints(v) => {
                buf.write_u8(ATTR_INTS)?;
                buf.write_u32::<LittleEndian>(v.len() as u32)?;
                for x in v {
                    buf.write_i64::<LittleEndian>(*x)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let value = match cursor.read_u8()? {
            ATTR_INT => Self::Int(cursor.read_i64::<LittleEndian>()?),
            ATTR_FLOAT => Self::Float(cursor.read_f64::<LittleEndian>()?),
            ATTR_TEXT => Self::Text(read_str(cursor)?),
            ATTR_FLOATS => {
                let n = read_count(cursor, 8)?;
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(cursor.read_f64::<LittleEndian>()?);
                }
                Self::Floats(v)
            }
            ATTR_INTS => {
                let n = read_count(cursor, 8)?;
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(cursor.read_i64::<LittleEndian>()?);
                }
                Self::Ints(v)
            }
            other => return Err(Error::invalid(format!("unknown attribute tag {other}"))),
        };
        Ok(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Floats(v) => write!(f, "{v:?}"),
            Self::Ints(v) => write!(f, "{v:?}"),
        }
    }
}

/// Length-prefixed UTF-8 string.
pub(crate) fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u32::<LittleEndian>(s.len() as u32)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

pub(crate) fn read_str(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = read_count(cursor, 1)?;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

/// Read a u32 count, rejecting counts larger than the remaining bytes allow.
pub(crate) fn read_count(cursor: &mut Cursor<&[u8]>, item_size: usize) -> Result<usize> {
    let n = cursor.read_u32::<LittleEndian>()? as usize;
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if n.saturating_mul(item_size) > remaining {
        return Err(Error::UnexpectedEof(cursor.position()));
    }
    Ok(n)
}

/// Pack strings into null-padded fixed-width slots.
///
/// A value longer than `width` bytes is an error, never truncated.
pub fn pack_text<S: AsRef<str>>(values: &[S], width: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; values.len() * width];
    for (i, value) in values.iter().enumerate() {
        write_text_slot(&mut out[i * width..(i + 1) * width], value.as_ref(), width)?;
    }
    Ok(out)
}

fn write_text_slot(slot: &mut [u8], value: &str, width: usize) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(Error::ValueTooLong { value: value.to_string(), len: bytes.len(), max: width });
    }
    slot[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Unpack null-padded fixed-width slots.
pub fn unpack_text(bytes: &[u8], width: usize) -> Result<Vec<String>> {
    if width == 0 {
        return Ok(Vec::new());
    }
    bytes.chunks_exact(width).map(read_text_slot).collect()
}

fn read_text_slot(slot: &[u8]) -> Result<String> {
    let len = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    Ok(String::from_utf8(slot[..len].to_vec())?)
}

/// One field value of a compound record.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Float(f64),
    Int(i64),
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Pack one compound record in declared field order.
pub fn pack_record(ct: &CompoundType, values: &[FieldValue]) -> Result<Vec<u8>> {
    if values.len() != ct.len() {
        return Err(Error::ShapeMismatch(format!(
            "record has {} fields, compound declares {}",
            values.len(),
            ct.len()
        )));
    }
    let mut out = vec![0u8; ct.num_bytes()];
    for ((field, value), start) in ct.fields().iter().zip(values).zip(ct.offsets()) {
        let slot = &mut out[start..start + field.kind.num_bytes()];
        match (&field.kind, value) {
            (FieldKind::FixedString(width), FieldValue::Text(s)) => write_text_slot(slot, s, *width)?,
            (FieldKind::Pod(pod), FieldValue::Float(v)) if pod.is_float() => {
                write_scalar(slot, *pod, *v, 0)?;
            }
            (FieldKind::Pod(pod), FieldValue::Int(v)) if pod.is_integer() => {
                write_scalar(slot, *pod, *v as f64, *v)?;
            }
            (kind, value) => {
                return Err(Error::TypeMismatch {
                    expected: format!("{} ({kind:?})", field.name),
                    actual: format!("{value:?}"),
                })
            }
        }
    }
    Ok(out)
}

/// Pack numbers as `pod` elements; integers and floats convert freely.
pub(crate) fn pack_numeric(pod: PlainOldDataType, values: &[FieldValue]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(values.len() * pod.num_bytes());
    for value in values {
        match value {
            FieldValue::Float(v) => write_scalar(&mut out, pod, *v, *v as i64)?,
            FieldValue::Int(v) => write_scalar(&mut out, pod, *v as f64, *v)?,
            FieldValue::Text(s) => {
                return Err(Error::TypeMismatch { expected: pod.name().into(), actual: format!("text {s:?}") })
            }
        }
    }
    Ok(out)
}

fn write_scalar(mut out: impl Write, pod: PlainOldDataType, f: f64, i: i64) -> Result<()> {
    match pod {
        PlainOldDataType::Float32 => out.write_f32::<LittleEndian>(f as f32)?,
        PlainOldDataType::Float64 => out.write_f64::<LittleEndian>(f)?,
        PlainOldDataType::Uint8 => out.write_u8(i as u8)?,
        PlainOldDataType::Int32 => out.write_i32::<LittleEndian>(i as i32)?,
        PlainOldDataType::Uint32 => out.write_u32::<LittleEndian>(i as u32)?,
        PlainOldDataType::Int64 => out.write_i64::<LittleEndian>(i)?,
        PlainOldDataType::Uint64 => out.write_u64::<LittleEndian>(i as u64)?,
        PlainOldDataType::Unknown => return Err(Error::invalid("unknown field type")),
    }
    Ok(())
}

/// Unpack one compound record.
pub fn unpack_record(ct: &CompoundType, bytes: &[u8]) -> Result<Vec<FieldValue>> {
    if bytes.len() != ct.num_bytes() {
        return Err(Error::ShapeMismatch(format!(
            "record of {} bytes, compound needs {}",
            bytes.len(),
            ct.num_bytes()
        )));
    }
    let mut values = Vec::with_capacity(ct.len());
    for (field, start) in ct.fields().iter().zip(ct.offsets()) {
        let slot = &bytes[start..start + field.kind.num_bytes()];
        let mut cursor = Cursor::new(slot);
        let value = match &field.kind {
            FieldKind::FixedString(_) => FieldValue::Text(read_text_slot(slot)?),
            FieldKind::Pod(pod) => match pod {
                PlainOldDataType::Float32 => {
                    FieldValue::Float(cursor.read_f32::<LittleEndian>()? as f64)
                }
                PlainOldDataType::Float64 => FieldValue::Float(cursor.read_f64::<LittleEndian>()?),
                PlainOldDataType::Uint8 => FieldValue::Int(cursor.read_u8()? as i64),
                PlainOldDataType::Int32 => FieldValue::Int(cursor.read_i32::<LittleEndian>()? as i64),
                PlainOldDataType::Uint32 => FieldValue::Int(cursor.read_u32::<LittleEndian>()? as i64),
                PlainOldDataType::Int64 => FieldValue::Int(cursor.read_i64::<LittleEndian>()?),
                PlainOldDataType::Uint64 => FieldValue::Int(cursor.read_u64::<LittleEndian>()? as i64),
                PlainOldDataType::Unknown => return Err(Error::invalid("unknown field type")),
            },
        };
        values.push(value);
    }
    Ok(values)
}
