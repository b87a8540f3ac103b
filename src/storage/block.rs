//! Block
//!
//! A single fixed-size unit of a block file: header plus content region.

use bytes::{Buf, BufMut};

use crate::error::{Result, StoreError};

use super::BlockStore;

/// Zero-based position of a block in its file
///
/// Links between blocks are stored as u16, which caps a file at 65536 blocks.
pub type BlockId = u16;

/// Fixed-width block header
///
/// `record_length` is owner-defined: key count for B-tree nodes, total byte
/// length on the first block of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHeader {
    pub record_length: u32,
    pub next_id: BlockId,
    pub prev_id: BlockId,
    pub is_deleted: bool,
    pub is_leaf: bool,
}

impl BlockHeader {
    /// Encoded size: RecordLen (4) + Next (2) + Prev (2) + Deleted (1) + Leaf (1)
    pub const SIZE: usize = 10;

    /// Encode as big-endian bytes
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut out = &mut buf[..];
        out.put_u32(self.record_length);
        out.put_u16(self.next_id);
        out.put_u16(self.prev_id);
        out.put_u8(self.is_deleted as u8);
        out.put_u8(self.is_leaf as u8);
        buf
    }

    /// Decode from big-endian bytes (any non-zero flag byte reads as true)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(StoreError::Integrity(format!(
                "block header needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }

        let mut buf = bytes;
        Ok(Self {
            record_length: buf.get_u32(),
            next_id: buf.get_u16(),
            prev_id: buf.get_u16(),
            is_deleted: buf.get_u8() != 0,
            is_leaf: buf.get_u8() != 0,
        })
    }
}

/// Handle to one block of a [`BlockStore`]
///
/// The handle caches the header in memory; `load_header`/`flush_header`
/// synchronize it with the file. Content is always read and written straight
/// through to the file.
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    header_size: usize,
    block_size: usize,
    /// Cached header (valid after `load_header`)
    pub header: BlockHeader,
}

impl Block {
    pub(super) fn new(id: BlockId, header_size: usize, block_size: usize) -> Self {
        Self {
            id,
            header_size,
            block_size,
            header: BlockHeader::default(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Bytes available for content after the header
    pub fn content_size(&self) -> usize {
        self.block_size - self.header_size
    }

    /// File offset of the first header byte
    pub fn offset(&self) -> u64 {
        self.id as u64 * self.block_size as u64
    }

    /// Read the header from disk into `self.header`
    pub fn load_header(&mut self, store: &mut BlockStore) -> Result<()> {
        let mut buf = [0u8; BlockHeader::SIZE];
        store.read_at(self.offset(), &mut buf)?;
        self.header = BlockHeader::decode(&buf)?;
        Ok(())
    }

    /// Write `self.header` to disk
    pub fn flush_header(&self, store: &mut BlockStore) -> Result<()> {
        store.write_at(self.offset(), &self.header.encode())
    }

    /// Read `count` content bytes starting `offset` bytes past the header
    pub fn read_bytes(&self, store: &mut BlockStore, count: usize, offset: usize) -> Result<Vec<u8>> {
        self.check_bounds(count, offset)?;
        let mut buf = vec![0u8; count];
        store.read_at(self.content_offset(offset), &mut buf)?;
        Ok(buf)
    }

    /// Write content bytes starting `offset` bytes past the header
    pub fn write_bytes(&self, store: &mut BlockStore, bytes: &[u8], offset: usize) -> Result<()> {
        self.check_bounds(bytes.len(), offset)?;
        store.write_at(self.content_offset(offset), bytes)
    }

    fn content_offset(&self, offset: usize) -> u64 {
        self.offset() + (self.header_size + offset) as u64
    }

    fn check_bounds(&self, count: usize, offset: usize) -> Result<()> {
        if offset + count > self.content_size() {
            return Err(StoreError::Storage(format!(
                "access of {} bytes at offset {} overruns the {}-byte content of block {}",
                count,
                offset,
                self.content_size(),
                self.id
            )));
        }
        Ok(())
    }
}
