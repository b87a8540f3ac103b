//! Block Store
//!
//! Owns one block file and its block count.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StoreError};

use super::{Block, BlockHeader, BlockId};

/// Largest number of blocks addressable by a u16 block id
pub const MAX_BLOCKS: u32 = BlockId::MAX as u32 + 1;

/// A file viewed as a dense array of fixed-size blocks
///
/// The file handle is held for the lifetime of the store and closed on drop.
pub struct BlockStore {
    path: PathBuf,
    file: File,
    header_size: usize,
    block_size: usize,
    block_count: u32,
}

impl BlockStore {
    /// Open or create a block file
    ///
    /// `block_count` is derived from the file size; a trailing partial block
    /// (if any) is ignored and overwritten by the next `create_block`.
    pub fn open(path: &Path, header_size: usize, block_size: usize) -> Result<Self> {
        if header_size < BlockHeader::SIZE {
            return Err(StoreError::Config(format!(
                "header_size {} is smaller than the {}-byte block header",
                header_size,
                BlockHeader::SIZE
            )));
        }
        if block_size <= header_size {
            return Err(StoreError::Config(format!(
                "block_size {} leaves no content after a {}-byte header",
                block_size, header_size
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_size = file.metadata()?.len();
        let block_count = file_size / block_size as u64;
        if block_count > MAX_BLOCKS as u64 {
            return Err(StoreError::Storage(format!(
                "{} holds {} blocks, more than the {} addressable",
                path.display(),
                block_count,
                MAX_BLOCKS
            )));
        }

        tracing::debug!(
            "Opened block file {} ({} blocks of {} bytes)",
            path.display(),
            block_count,
            block_size
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header_size,
            block_size,
            block_count: block_count as u32,
        })
    }

    /// Open using the geometry from a config
    pub fn open_with(path: &Path, config: &Config) -> Result<Self> {
        Self::open(path, config.header_size, config.block_size)
    }

    /// Append one zero-filled block and return a handle to it
    pub fn create_block(&mut self) -> Result<Block> {
        if self.block_count >= MAX_BLOCKS {
            return Err(StoreError::Storage(format!(
                "{} is full: all {} block ids are in use",
                self.path.display(),
                MAX_BLOCKS
            )));
        }

        let id = self.block_count as BlockId;
        let zeroes = vec![0u8; self.block_size];
        self.write_at(id as u64 * self.block_size as u64, &zeroes)?;
        self.block_count += 1;

        Ok(Block::new(id, self.header_size, self.block_size))
    }

    /// Get a handle to an existing block, or None if `id` is out of range
    ///
    /// Never allocates. The returned header is not loaded yet.
    pub fn find_block(&self, id: BlockId) -> Option<Block> {
        if id as u32 >= self.block_count {
            return None;
        }
        Some(Block::new(id, self.header_size, self.block_size))
    }

    /// `find_block` followed by `load_header`
    pub fn load_block(&mut self, id: BlockId) -> Result<Option<Block>> {
        match self.find_block(id) {
            Some(mut block) => {
                block.load_header(self)?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// Flush OS buffers to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Blocks that can still be appended before the id space runs out
    pub fn remaining_blocks(&self) -> u32 {
        MAX_BLOCKS - self.block_count
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Content bytes per block
    pub fn content_size(&self) -> usize {
        self.block_size - self.header_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Raw I/O (used by Block)
    // =========================================================================

    pub(super) fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub(super) fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }
}
