//! On-disk block layout.
//!
//! ```text
//! header  = magic[5] frozen:u8 version:u16 root_pos:u64
//! data    = size:u64 bytes[size]
//! group   = count:u64 child:u64[count]
//! ```
//!
//! Child pointers carry the block kind in the top bit: set for data, clear
//! for a group. Position 0 stands for an empty block of either kind.
//! Integers are little-endian.

pub const MAGIC: &[u8; 5] = b"CTREE";
pub const HEADER_SIZE: usize = 16;
pub const FROZEN_OFFSET: usize = 5;
pub const VERSION_OFFSET: usize = 6;
pub const ROOT_POS_OFFSET: usize = 8;

/// Files with any other version are rejected.
pub const CURRENT_VERSION: u16 = 1;

/// Written by `OStream::finish`; a file without it was never completed.
pub const FROZEN_FLAG: u8 = 0xFF;
pub const NOT_FROZEN_FLAG: u8 = 0x00;

const DATA_BIT: u64 = 1 << 63;

/// Pointer to an empty data block.
pub const EMPTY_DATA: u64 = DATA_BIT;

// First byte of every construct header block
pub const KIND_GROUP: u8 = 0;
pub const KIND_ARRAY: u8 = 1;
pub const KIND_VLEN_ARRAY: u8 = 2;

/// Maximum-extent value of an unlimited dimension.
pub const UNLIMITED_DIM: u64 = u64::MAX;

pub const fn is_group_offset(ptr: u64) -> bool {
    ptr & DATA_BIT == 0
}

pub const fn is_data_offset(ptr: u64) -> bool {
    ptr & DATA_BIT != 0
}

/// File position a child pointer refers to.
pub const fn extract_offset(ptr: u64) -> u64 {
    ptr & !DATA_BIT
}

pub const fn make_group_offset(pos: u64) -> u64 {
    pos & !DATA_BIT
}

pub const fn make_data_offset(pos: u64) -> u64 {
    pos | DATA_BIT
}
