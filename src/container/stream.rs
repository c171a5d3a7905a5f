//! Append-only writer for container files.
//!
//! Children are written before their parent group, so every pointer a group
//! holds already exists on disk. [`OStream::finish`] patches the root
//! position and the frozen flag into the header.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::util::{Error, Result};

pub struct OStream {
    out: BufWriter<File>,
    pos: u64,
    done: bool,
}

impl OStream {
    /// Truncate or create `path` and write an unfrozen header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        let mut stream = Self { out: BufWriter::with_capacity(1 << 18, file), pos: 0, done: false };
        stream.put(MAGIC)?;
        stream.out.write_u8(NOT_FROZEN_FLAG)?;
        stream.out.write_u16::<LittleEndian>(CURRENT_VERSION)?;
        stream.out.write_u64::<LittleEndian>(0)?;
        stream.pos = HEADER_SIZE as u64;
        Ok(stream)
    }

    /// Bytes written so far.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn put_u64(&mut self, value: u64) -> Result<()> {
        self.out.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.done {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Append a data block; returns its tagged child pointer.
    pub fn write_data(&mut self, bytes: &[u8]) -> Result<u64> {
        self.ensure_open()?;
        if bytes.is_empty() {
            return Ok(EMPTY_DATA);
        }
        let at = self.pos;
        self.put_u64(bytes.len() as u64)?;
        self.put(bytes)?;
        tracing::trace!(at, len = bytes.len(), "data block");
        Ok(make_data_offset(at))
    }

    /// Append a group block listing `children`; returns its child pointer.
    pub fn write_group(&mut self, children: &[u64]) -> Result<u64> {
        self.ensure_open()?;
        if children.is_empty() {
            return Ok(make_group_offset(0));
        }
        let at = self.pos;
        self.put_u64(children.len() as u64)?;
        for &child in children {
            self.put_u64(child)?;
        }
        tracing::trace!(at, children = children.len(), "group block");
        Ok(make_group_offset(at))
    }

    /// Record `root` in the header and mark the file complete.
    pub fn finish(&mut self, root: u64) -> Result<()> {
        self.ensure_open()?;
        self.out.flush()?;
        let file = self.out.get_mut();
        file.seek(SeekFrom::Start(FROZEN_OFFSET as u64))?;
        file.write_u8(FROZEN_FLAG)?;
        file.seek(SeekFrom::Start(ROOT_POS_OFFSET as u64))?;
        file.write_u64::<LittleEndian>(extract_offset(root))?;
        file.seek(SeekFrom::Start(self.pos))?;
        file.flush()?;
        self.done = true;
        Ok(())
    }
}
