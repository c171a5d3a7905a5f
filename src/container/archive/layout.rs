//! Mapping between the container arena and file blocks.
//!
//! ```text
//! group = [ data(kind=GROUP, name), data(attributes), child... ]
//! array = [ data(kind=ARRAY, name, element, shape, max), data(payload) ]
//! vlen  = [ data(kind=VLEN_ARRAY, ...), data(lengths:u64[rows]), data(values) ]
//! ```

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{ArrayEntry, ChildRef, ConstructState, Container, GroupEntry, GroupId, OpenMode, Payload};
use crate::container::format::*;
use crate::container::reader::{BlockGroup, FileSource};
use crate::container::stream::OStream;
use crate::container::values::{read_count, read_str, write_str, AttrValue};
use crate::util::{ElementType, Error, MaxShape, Result, Shape};

impl Container {
    /// Write the whole arena to `self.path`.
    pub(super) fn save(&self) -> Result<()> {
        let mut out = OStream::create(&self.path)?;
        let root = self.write_group_blocks(&mut out, self.root())?;
        out.finish(root)?;
        tracing::trace!(path = %self.path.display(), bytes = out.pos(), "container saved");
        Ok(())
    }

    fn write_group_blocks(&self, out: &mut OStream, id: GroupId) -> Result<u64> {
        let entry = self.group_entry(id)?;

        let mut header = vec![KIND_GROUP];
        write_str(&mut header, &entry.name)?;

        let mut attrs = Vec::new();
        attrs.write_u32::<LittleEndian>(entry.attributes.len() as u32)?;
        for (name, value) in &entry.attributes {
            write_str(&mut attrs, name)?;
            value.encode_into(&mut attrs)?;
        }

        let mut children = vec![out.write_data(&header)?, out.write_data(&attrs)?];
        for &child in &entry.children {
            let pos = match child {
                ChildRef::Group(g) => self.write_group_blocks(out, g)?,
                ChildRef::Array(a) => {
                    let array = self.array_entry(a)?;
                    write_array_blocks(out, array)?
                }
            };
            children.push(pos);
        }
        out.write_group(&children)
    }

    /// Read a frozen container file into a fresh arena.
    pub(super) fn load(path: &Path, mode: OpenMode) -> Result<Self> {
        let source = Arc::new(FileSource::open(path)?);
        if !source.is_frozen() {
            return Err(Error::invalid(format!(
                "{} was not closed; the file is incomplete",
                path.display()
            )));
        }
        let root = BlockGroup::root(&source)?;

        let mut container = Self::empty(path, mode);
        let header = root.data(0)?;
        let mut cursor = Cursor::new(header.as_slice());
        if cursor.read_u8()? != KIND_GROUP {
            return Err(Error::invalid("root block is not a group"));
        }
        container.read_group(&root, &mut cursor, None)?;
        Ok(container)
    }

    fn read_group(
        &mut self,
        group: &BlockGroup,
        header: &mut Cursor<&[u8]>,
        parent: Option<GroupId>,
    ) -> Result<GroupId> {
        if group.len() < 2 {
            return Err(Error::invalid(format!("group block at {} is truncated", group.pos())));
        }
        let name = read_str(header)?;

        let attr_bytes = group.data(1)?;
        let mut cursor = Cursor::new(attr_bytes.as_slice());
        let count = read_count(&mut cursor, 5)?;
        let mut attributes = Vec::with_capacity(count);
        for _ in 0..count {
            let key = read_str(&mut cursor)?;
            attributes.push((key, AttrValue::decode(&mut cursor)?));
        }

        let id = GroupId(self.groups.len());
        self.groups.push(Some(GroupEntry { name, parent, attributes, children: Vec::new() }));
        if let Some(parent) = parent {
            self.group_entry_mut(parent)?.children.push(ChildRef::Group(id));
        }

        for index in 2..group.len() {
            let child = group.group(index)?;
            let header = child.data(0)?;
            let mut cursor = Cursor::new(header.as_slice());
            match cursor.read_u8()? {
                KIND_GROUP => {
                    self.read_group(&child, &mut cursor, Some(id))?;
                }
                kind @ (KIND_ARRAY | KIND_VLEN_ARRAY) => {
                    let entry = read_array(&child, &mut cursor, kind, id)?;
                    let array = super::ArrayId(self.arrays.len());
                    self.arrays.push(Some(entry));
                    self.group_entry_mut(id)?.children.push(ChildRef::Array(array));
                }
                other => return Err(Error::invalid(format!("unknown block kind {other}"))),
            }
        }
        Ok(id)
    }
}

fn write_array_blocks(out: &mut OStream, array: &ArrayEntry) -> Result<u64> {
    let kind = if array.element.is_fixed() { KIND_ARRAY } else { KIND_VLEN_ARRAY };
    let mut header = vec![kind];
    write_str(&mut header, &array.name)?;
    array.element.encode_into(&mut header)?;
    header.write_u32::<LittleEndian>(array.shape.rank() as u32)?;
    for &dim in array.shape.sizes() {
        header.write_u64::<LittleEndian>(dim as u64)?;
    }
    for dim in array.max_shape.sizes() {
        header.write_u64::<LittleEndian>(dim.map_or(UNLIMITED_DIM, |d| d as u64))?;
    }

    let header = out.write_data(&header)?;
    match &array.payload {
        Payload::Fixed(data) => {
            let payload = out.write_data(data)?;
            out.write_group(&[header, payload])
        }
        Payload::VarLen(rows) => {
            let pod_size = match &array.element {
                ElementType::VarLen(pod) => pod.num_bytes(),
                other => return Err(Error::invalid(format!("vlen payload for {other}"))),
            };
            let mut lengths = Vec::with_capacity(rows.len() * 8);
            for row in rows {
                lengths.write_u64::<LittleEndian>((row.len() / pod_size) as u64)?;
            }
            let values = rows.concat();
            let lengths = out.write_data(&lengths)?;
            let values = out.write_data(&values)?;
            out.write_group(&[header, lengths, values])
        }
    }
}

fn read_array(
    group: &BlockGroup,
    header: &mut Cursor<&[u8]>,
    kind: u8,
    parent: GroupId,
) -> Result<ArrayEntry> {
    let name = read_str(header)?;
    let element = ElementType::decode(header)?;
    let rank = read_count(header, 16)?;
    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        dims.push(header.read_u64::<LittleEndian>()? as usize);
    }
    let mut max = Vec::with_capacity(rank);
    for _ in 0..rank {
        let dim = header.read_u64::<LittleEndian>()?;
        max.push(if dim == UNLIMITED_DIM { None } else { Some(dim as usize) });
    }
    let shape = Shape::from(dims);
    let max_shape = MaxShape::from_slice(&max);
    max_shape
        .admits(&shape)
        .map_err(|e| Error::invalid(format!("array {name}: {e}")))?;
    let overflow = || Error::invalid(format!("array {name}: extents {shape} overflow"));

    let payload = match (kind, element.num_bytes()) {
        (KIND_ARRAY, Some(size)) => {
            let data = group.data(1)?;
            if data.len() != shape.checked_bytes(size).ok_or_else(overflow)? {
                return Err(Error::invalid(format!(
                    "array {name}: payload of {} bytes does not match {shape} x {size}",
                    data.len()
                )));
            }
            Payload::Fixed(data)
        }
        (KIND_VLEN_ARRAY, None) => {
            let ElementType::VarLen(pod) = &element else {
                return Err(Error::invalid(format!("array {name}: expected vlen element")));
            };
            let lengths = group.data(1)?;
            let values = group.data(2)?;
            if lengths.len() != shape.rows().checked_mul(8).ok_or_else(overflow)? {
                return Err(Error::invalid(format!("array {name}: bad length table")));
            }
            let mut cursor = Cursor::new(lengths.as_slice());
            let mut rows = Vec::with_capacity(shape.rows());
            let mut start = 0usize;
            for _ in 0..shape.rows() {
                let count = cursor.read_u64::<LittleEndian>()? as usize;
                let end = count
                    .checked_mul(pod.num_bytes())
                    .and_then(|len| start.checked_add(len))
                    .filter(|&end| end <= values.len())
                    .ok_or_else(|| Error::invalid(format!("array {name}: row past end of values")))?;
                rows.push(values[start..end].to_vec());
                start = end;
            }
            Payload::VarLen(rows)
        }
        _ => return Err(Error::invalid(format!("array {name}: kind does not match element {element}"))),
    };

    Ok(ArrayEntry {
        name,
        parent,
        element,
        shape,
        max_shape,
        payload,
        state: ConstructState::Written,
    })
}
