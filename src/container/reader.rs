//! Random access to the blocks of a finished container file.
//!
//! The file is memory-mapped when possible. If mapping fails the reader
//! falls back to seek-and-read on a shared file handle.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use crate::util::{Error, Result};

enum Backing {
    Mapped(Mmap),
    Handle(Mutex<File>),
}

/// An opened container file with a validated header.
pub struct FileSource {
    backing: Backing,
    len: u64,
    frozen: bool,
    root: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, true)
    }

    /// Open with or without memory mapping.
    pub fn open_with(path: impl AsRef<Path>, map: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(len));
        }

        let backing = if map {
            // SAFETY: read-only mapping; writers replace the file only through `Container::flush`
            match unsafe { Mmap::map(&file) } {
                Ok(mmap) => Backing::Mapped(mmap),
                Err(err) => {
                    tracing::debug!(path = %path.display(), %err, "mmap failed, using buffered reads");
                    Backing::Handle(Mutex::new(file))
                }
            }
        } else {
            Backing::Handle(Mutex::new(file))
        };

        let mut source = Self { backing, len, frozen: false, root: 0 };
        let mut header = [0u8; HEADER_SIZE];
        source.read_at(0, &mut header)?;
        let (frozen, root) = parse_header(&header)?;
        source.frozen = frozen;
        source.root = root;
        Ok(source)
    }

    /// False when the writer never reached `finish`.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn root_pos(&self) -> u64 {
        self.root
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= self.len)
            .ok_or(Error::UnexpectedEof(pos))?;
        match &self.backing {
            Backing::Mapped(mmap) => buf.copy_from_slice(&mmap[pos as usize..end as usize]),
            Backing::Handle(file) => {
                let mut file = file.lock();
                file.seek(SeekFrom::Start(pos))?;
                file.read_exact(buf)?;
            }
        }
        Ok(())
    }

    fn u64_at(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_at(pos, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Contents of the data block at `pos`; position 0 is the empty block.
    fn data_at(&self, pos: u64) -> Result<Vec<u8>> {
        if pos == 0 {
            return Ok(Vec::new());
        }
        let size = self.u64_at(pos)?;
        if size > self.len {
            return Err(Error::UnexpectedEof(pos.saturating_add(size)));
        }
        let mut buf = vec![0u8; size as usize];
        self.read_at(pos + 8, &mut buf)?;
        Ok(buf)
    }
}

/// `(frozen, root position)` from a file header.
fn parse_header(header: &[u8]) -> Result<(bool, u64)> {
    if header.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof(header.len() as u64));
    }
    if &header[..MAGIC.len()] != MAGIC {
        return Err(Error::InvalidMagic);
    }
    let version = u16::from_le_bytes([header[VERSION_OFFSET], header[VERSION_OFFSET + 1]]);
    if version != CURRENT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let mut root = [0u8; 8];
    root.copy_from_slice(&header[ROOT_POS_OFFSET..ROOT_POS_OFFSET + 8]);
    Ok((header[FROZEN_OFFSET] == FROZEN_FLAG, u64::from_le_bytes(root)))
}

/// A group block: child pointers in write order.
pub struct BlockGroup {
    source: Arc<FileSource>,
    pos: u64,
    children: Vec<u64>,
}

impl BlockGroup {
    /// The group at `pos`; position 0 is an empty group.
    pub fn at(source: Arc<FileSource>, pos: u64) -> Result<Self> {
        let count = if pos == 0 { 0 } else { source.u64_at(pos)? };
        if count > source.len() / 8 {
            return Err(Error::invalid(format!("group at {pos} claims {count} children")));
        }
        let children = (0..count).map(|i| source.u64_at(pos + 8 + i * 8)).collect::<Result<_>>()?;
        Ok(Self { source, pos, children })
    }

    /// The root group of `source`.
    pub fn root(source: &Arc<FileSource>) -> Result<Self> {
        Self::at(source.clone(), source.root_pos())
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn pointer(&self, index: usize) -> Result<u64> {
        self.children.get(index).copied().ok_or_else(|| {
            Error::invalid(format!("group at {} has no child {index}", self.pos))
        })
    }

    /// Child `index`, which must be a group.
    pub fn group(&self, index: usize) -> Result<BlockGroup> {
        let ptr = self.pointer(index)?;
        if !is_group_offset(ptr) {
            return Err(Error::TypeMismatch { expected: "group block".into(), actual: "data block".into() });
        }
        Self::at(self.source.clone(), extract_offset(ptr))
    }

    /// Bytes of child `index`, which must be a data block.
    pub fn data(&self, index: usize) -> Result<Vec<u8>> {
        let ptr = self.pointer(index)?;
        if !is_data_offset(ptr) {
            return Err(Error::TypeMismatch { expected: "data block".into(), actual: "group block".into() });
        }
        self.source.data_at(extract_offset(ptr))
    }
}

#[cfg(test)]
mod tests {
    use super::super::stream::OStream;
    use super::*;

    fn header(version: u16, frozen: bool) -> [u8; HEADER_SIZE] {
        let mut h = [0u8; HEADER_SIZE];
        h[..MAGIC.len()].copy_from_slice(MAGIC);
        h[FROZEN_OFFSET] = if frozen { FROZEN_FLAG } else { NOT_FROZEN_FLAG };
        h[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&version.to_le_bytes());
        h[ROOT_POS_OFFSET..].copy_from_slice(&64u64.to_le_bytes());
        h
    }

    #[test]
    fn test_header() {
        assert_eq!(parse_header(&header(CURRENT_VERSION, true)).unwrap(), (true, 64));
        assert_eq!(parse_header(&header(CURRENT_VERSION, false)).unwrap(), (false, 64));
        assert!(matches!(parse_header(&header(9, true)), Err(Error::UnsupportedVersion(9))));
        assert!(matches!(parse_header(&[0u8; HEADER_SIZE]), Err(Error::InvalidMagic)));
        assert!(matches!(parse_header(&[0u8; 4]), Err(Error::UnexpectedEof(4))));
    }

    #[test]
    fn test_blocks_mapped_and_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.ctree");
        let mut out = OStream::create(&path).unwrap();
        let text = out.write_data(b"label_1").unwrap();
        let empty = out.write_data(&[]).unwrap();
        let inner = out.write_group(&[text]).unwrap();
        let root = out.write_group(&[inner, text, empty]).unwrap();
        out.finish(root).unwrap();

        for map in [true, false] {
            let source = Arc::new(FileSource::open_with(&path, map).unwrap());
            assert!(source.is_frozen());
            let root = BlockGroup::root(&source).unwrap();
            assert_eq!(root.len(), 3);
            assert_eq!(root.group(0).unwrap().data(0).unwrap(), b"label_1");
            assert_eq!(root.data(1).unwrap(), b"label_1");
            assert!(root.data(2).unwrap().is_empty());
            assert!(matches!(root.data(0), Err(Error::TypeMismatch { .. })));
            assert!(root.group(3).is_err());
        }
    }

    #[test]
    fn test_missing_and_short_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(FileSource::open(dir.path().join("none.ctree")), Err(Error::NotFound(_))));
        let short = dir.path().join("short.ctree");
        std::fs::write(&short, b"CTREE").unwrap();
        assert!(matches!(FileSource::open(&short), Err(Error::UnexpectedEof(5))));
    }
}
