//! Record Store
//!
//! Inserts, reads, rewrites and frees block chains.

use std::path::Path;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::storage::{
    Block, BlockHeader, BlockId, BlockStore, FreeList, FreeListAnchor, SENTINEL_BLOCK,
};

use super::RecordId;

/// Free blocks of a record file hang off block 0 `next_id`
const FREE_LIST: FreeList = FreeList::new(FreeListAnchor::Next);

/// Stores opaque byte records in chained blocks of one file
pub struct RecordStore {
    store: BlockStore,
}

impl RecordStore {
    /// Open or create a record file, reserving block 0 on first use
    pub fn open(path: &Path, header_size: usize, block_size: usize) -> Result<Self> {
        let mut store = BlockStore::open(path, header_size, block_size)?;
        if store.block_count() == 0 {
            store.create_block()?;
        }
        Ok(Self { store })
    }

    /// Open using the geometry from a config
    pub fn open_with(path: &Path, config: &Config) -> Result<Self> {
        Self::open(path, config.header_size, config.block_size)
    }

    /// Store `bytes` and return the id of the record's first block
    pub fn insert(&mut self, bytes: &[u8]) -> Result<RecordId> {
        let needed = self.blocks_needed(bytes.len())?;

        let mut blocks = self.allocate_blocks(needed)?;
        let id = self.write_chain(&mut blocks, bytes)?;

        tracing::debug!(
            "Inserted record {} ({} bytes in {} blocks)",
            id,
            bytes.len(),
            needed
        );
        Ok(id)
    }

    /// Read a record back
    ///
    /// Returns `Ok(None)` if `id` is the sentinel or past the end of the file.
    pub fn find_by_id(&mut self, id: RecordId) -> Result<Option<Vec<u8>>> {
        let chain = match self.chain(id)? {
            Some(chain) => chain,
            None => return Ok(None),
        };

        let total = chain[0].header.record_length as usize;
        let capacity = self.store.content_size();
        let mut bytes = Vec::with_capacity(total);

        for block in &chain {
            let count = capacity.min(total - bytes.len());
            bytes.extend(block.read_bytes(&mut self.store, count, 0)?);
        }

        Ok(Some(bytes))
    }

    /// Replace a record's bytes, keeping its id
    ///
    /// The existing chain is reused block by block; extra blocks are
    /// allocated, surplus trailing blocks are freed.
    pub fn update(&mut self, id: RecordId, bytes: &[u8]) -> Result<()> {
        let mut chain = self
            .chain(id)?
            .ok_or_else(|| StoreError::NotFound(format!("record {}", id)))?;

        let needed = self.blocks_needed(bytes.len())?;
        let surplus = if needed < chain.len() {
            chain.split_off(needed)
        } else {
            Vec::new()
        };
        if chain.len() < needed {
            let extra = self.allocate_blocks(needed - chain.len())?;
            chain.extend(extra);
        }

        self.write_chain(&mut chain, bytes)?;
        let surplus: Vec<BlockId> = surplus.iter().map(Block::id).collect();
        FREE_LIST.push_many(&mut self.store, &surplus)?;

        tracing::debug!(
            "Updated record {} ({} bytes in {} blocks, {} freed)",
            id,
            bytes.len(),
            needed,
            surplus.len()
        );
        Ok(())
    }

    /// Free every block of a record
    pub fn delete(&mut self, id: RecordId) -> Result<()> {
        let chain = self
            .chain(id)?
            .ok_or_else(|| StoreError::NotFound(format!("record {}", id)))?;

        let ids: Vec<BlockId> = chain.iter().map(Block::id).collect();
        FREE_LIST.push_many(&mut self.store, &ids)?;

        tracing::debug!("Deleted record {} ({} blocks freed)", id, chain.len());
        Ok(())
    }

    /// Block ids of a record in chain order
    pub fn blocks_of(&mut self, id: RecordId) -> Result<Option<Vec<BlockId>>> {
        Ok(self
            .chain(id)?
            .map(|chain| chain.iter().map(Block::id).collect()))
    }

    /// Blocks waiting on the free list for reuse
    pub fn free_block_count(&mut self) -> Result<usize> {
        FREE_LIST.len(&mut self.store)
    }

    pub fn block_count(&self) -> u32 {
        self.store.block_count()
    }

    /// Content bytes per block
    pub fn block_capacity(&self) -> usize {
        self.store.content_size()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Blocks needed to hold `len` bytes (at least one)
    fn blocks_needed(&self, len: usize) -> Result<usize> {
        if len > u32::MAX as usize {
            return Err(StoreError::Storage(format!(
                "record of {} bytes exceeds the u32 length field",
                len
            )));
        }
        Ok(len.div_ceil(self.store.content_size()).max(1))
    }

    /// Take `count` blocks, free ones first, appending the rest
    ///
    /// Fails without allocating anything when the free list and the unused
    /// block ids together cannot cover `count`. If appending still fails,
    /// every block taken so far goes back on the free list.
    fn allocate_blocks(&mut self, count: usize) -> Result<Vec<Block>> {
        let free = FREE_LIST.len(&mut self.store)?;
        let available = free + self.store.remaining_blocks() as usize;
        if count > available {
            return Err(StoreError::Storage(format!(
                "{} cannot fit {} more blocks: {} free, {} unused ids",
                self.store.path().display(),
                count,
                free,
                self.store.remaining_blocks()
            )));
        }

        let mut blocks = FREE_LIST.pop_many(&mut self.store, count)?;
        while blocks.len() < count {
            match self.store.create_block() {
                Ok(block) => blocks.push(block),
                Err(err) => {
                    let taken: Vec<BlockId> = blocks.iter().rev().map(Block::id).collect();
                    FREE_LIST.push_many(&mut self.store, &taken)?;
                    return Err(err);
                }
            }
        }
        Ok(blocks)
    }

    /// Link `blocks` into one chain and write `bytes` across them
    fn write_chain(&mut self, blocks: &mut [Block], bytes: &[u8]) -> Result<RecordId> {
        let capacity = self.store.content_size();
        let ids: Vec<BlockId> = blocks.iter().map(Block::id).collect();

        for (i, block) in blocks.iter_mut().enumerate() {
            block.header = BlockHeader {
                record_length: if i == 0 { bytes.len() as u32 } else { 0 },
                next_id: ids.get(i + 1).copied().unwrap_or(SENTINEL_BLOCK),
                prev_id: if i == 0 { SENTINEL_BLOCK } else { ids[i - 1] },
                ..BlockHeader::default()
            };
            block.flush_header(&mut self.store)?;

            let start = (i * capacity).min(bytes.len());
            let end = (start + capacity).min(bytes.len());
            if start < end {
                block.write_bytes(&mut self.store, &bytes[start..end], 0)?;
            }
        }

        ids.first()
            .copied()
            .ok_or_else(|| StoreError::Storage("record chain has no blocks".to_string()))
    }

    /// Load and validate the chain starting at `id`
    ///
    /// Deleted blocks, broken back links, cycles and chains that do not match
    /// the declared length are integrity violations.
    fn chain(&mut self, id: RecordId) -> Result<Option<Vec<Block>>> {
        if id == SENTINEL_BLOCK {
            return Ok(None);
        }
        let first = match self.store.load_block(id)? {
            Some(block) => block,
            None => return Ok(None),
        };

        if first.header.is_deleted {
            return Err(StoreError::Integrity(format!(
                "record {} starts at a deleted block",
                id
            )));
        }
        if first.header.prev_id != SENTINEL_BLOCK {
            return Err(StoreError::Integrity(format!(
                "block {} is not the first block of a record (prev = {})",
                id, first.header.prev_id
            )));
        }

        let expected = self.blocks_needed(first.header.record_length as usize)?;
        let mut next = first.header.next_id;
        let mut chain = vec![first];

        while next != SENTINEL_BLOCK {
            if chain.len() >= expected {
                return Err(StoreError::Integrity(format!(
                    "record {} links more than the {} blocks its length needs",
                    id, expected
                )));
            }

            let block = self.store.load_block(next)?.ok_or_else(|| {
                StoreError::Integrity(format!("record {} links to missing block {}", id, next))
            })?;
            if block.header.is_deleted {
                return Err(StoreError::Integrity(format!(
                    "record {} links to deleted block {}",
                    id, next
                )));
            }

            let prev = chain[chain.len() - 1].id();
            if block.header.prev_id != prev {
                return Err(StoreError::Integrity(format!(
                    "block {} links back to {} instead of {}",
                    next, block.header.prev_id, prev
                )));
            }

            next = block.header.next_id;
            chain.push(block);
        }

        if chain.len() != expected {
            return Err(StoreError::Integrity(format!(
                "record {} ends after {} blocks, its length needs {}",
                id,
                chain.len(),
                expected
            )));
        }

        Ok(Some(chain))
    }
}
