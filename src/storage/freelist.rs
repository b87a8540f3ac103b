//! Free Block Chain
//!
//! Freed blocks are marked deleted and linked through their `next_id`
//! field into a chain whose head lives in a header field of block 0.
//!
//! ```text
//! block 0 ──head──▶ free A ──next──▶ free B ──next──▶ 0
//! ```
//!
//! `push` appends at the tail and `pop` detaches the tail, so the most
//! recently freed block is recycled first. Every call walks the chain from
//! block 0 once, which costs one header read per free block. Callers moving
//! several blocks at a time use `push_many` / `pop_many` to pay that walk once
//! per batch instead of once per block.

use std::collections::HashSet;

use crate::error::{Result, StoreError};

use super::{Block, BlockHeader, BlockId, BlockStore, SENTINEL_BLOCK};

/// Which block-0 header field holds the chain head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeListAnchor {
    /// Block 0 `next_id` (record stores)
    Next,
    /// Block 0 `prev_id` (B-tree files, whose `next_id` is the root pointer)
    Prev,
}

/// Free block chain anchored at block 0
#[derive(Debug, Clone, Copy)]
pub struct FreeList {
    anchor: FreeListAnchor,
}

impl FreeList {
    pub const fn new(anchor: FreeListAnchor) -> Self {
        Self { anchor }
    }

    /// Ids of all free blocks, head first
    pub fn blocks(&self, store: &mut BlockStore) -> Result<Vec<BlockId>> {
        let (_, chain) = self.walk(store)?;
        Ok(chain.iter().map(Block::id).collect())
    }

    /// Number of free blocks
    pub fn len(&self, store: &mut BlockStore) -> Result<usize> {
        Ok(self.walk(store)?.1.len())
    }

    pub fn is_empty(&self, store: &mut BlockStore) -> Result<bool> {
        let root = self.load_root(store)?;
        Ok(self.head(&root.header) == SENTINEL_BLOCK)
    }

    /// Mark a block deleted and append it to the chain
    pub fn push(&self, store: &mut BlockStore, id: BlockId) -> Result<()> {
        self.push_many(store, &[id])
    }

    /// Mark every block in `ids` deleted and append them, in order, to the chain
    ///
    /// All blocks are checked before any header is written: the sentinel,
    /// missing blocks, blocks already free and repeated ids are rejected
    /// without touching the file.
    pub fn push_many(&self, store: &mut BlockStore, ids: &[BlockId]) -> Result<()> {
        let first = match ids.first() {
            Some(&id) => id,
            None => return Ok(()),
        };

        let mut seen = HashSet::with_capacity(ids.len());
        let mut blocks = Vec::with_capacity(ids.len());
        for &id in ids {
            if id == SENTINEL_BLOCK {
                return Err(StoreError::Integrity(
                    "block 0 cannot be placed on the free list".to_string(),
                ));
            }
            if !seen.insert(id) {
                return Err(StoreError::Integrity(format!(
                    "block {} is freed twice in one batch",
                    id
                )));
            }
            let block = store.load_block(id)?.ok_or_else(|| {
                StoreError::Integrity(format!("cannot free block {}: it does not exist", id))
            })?;
            if block.header.is_deleted {
                return Err(StoreError::Integrity(format!("block {} is already free", id)));
            }
            blocks.push(block);
        }

        let (mut root, mut chain) = self.walk(store)?;

        for (i, block) in blocks.iter_mut().enumerate() {
            block.header = BlockHeader {
                is_deleted: true,
                next_id: ids.get(i + 1).copied().unwrap_or(SENTINEL_BLOCK),
                ..BlockHeader::default()
            };
            block.flush_header(store)?;
        }

        match chain.last_mut() {
            Some(tail) => {
                tail.header.next_id = first;
                tail.flush_header(store)?;
            }
            None => {
                self.set_head(&mut root.header, first);
                root.flush_header(store)?;
            }
        }

        tracing::trace!("Freed {} blocks in {}", ids.len(), store.path().display());
        Ok(())
    }

    /// Detach the tail of the chain, clear its header and return it
    pub fn pop(&self, store: &mut BlockStore) -> Result<Option<Block>> {
        Ok(self.pop_many(store, 1)?.pop())
    }

    /// Detach up to `count` blocks from the tail of the chain
    ///
    /// Blocks come back in the order repeated `pop` calls would return them,
    /// most recently freed first. Their headers are cleared.
    pub fn pop_many(&self, store: &mut BlockStore, count: usize) -> Result<Vec<Block>> {
        let (mut root, mut chain) = self.walk(store)?;

        let keep = chain.len().saturating_sub(count);
        let mut recycled = chain.split_off(keep);
        if recycled.is_empty() {
            return Ok(recycled);
        }

        match chain.last_mut() {
            Some(prev) => {
                prev.header.next_id = SENTINEL_BLOCK;
                prev.flush_header(store)?;
            }
            None => {
                self.set_head(&mut root.header, SENTINEL_BLOCK);
                root.flush_header(store)?;
            }
        }

        recycled.reverse();
        for block in &mut recycled {
            block.header = BlockHeader::default();
            block.flush_header(store)?;
        }

        tracing::trace!(
            "Recycled {} blocks in {}",
            recycled.len(),
            store.path().display()
        );
        Ok(recycled)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn head(&self, root: &BlockHeader) -> BlockId {
        match self.anchor {
            FreeListAnchor::Next => root.next_id,
            FreeListAnchor::Prev => root.prev_id,
        }
    }

    fn set_head(&self, root: &mut BlockHeader, id: BlockId) {
        match self.anchor {
            FreeListAnchor::Next => root.next_id = id,
            FreeListAnchor::Prev => root.prev_id = id,
        }
    }

    fn load_root(&self, store: &mut BlockStore) -> Result<Block> {
        store.load_block(SENTINEL_BLOCK)?.ok_or_else(|| {
            StoreError::Integrity(format!(
                "{} has no block 0 to anchor its free list",
                store.path().display()
            ))
        })
    }

    /// Load block 0 and every block on the chain, validating each link
    fn walk(&self, store: &mut BlockStore) -> Result<(Block, Vec<Block>)> {
        let root = self.load_root(store)?;
        let mut chain = Vec::new();
        let mut current = self.head(&root.header);

        while current != SENTINEL_BLOCK {
            if chain.len() as u32 >= store.block_count() {
                return Err(StoreError::Integrity(format!(
                    "free list of {} contains a cycle at block {}",
                    store.path().display(),
                    current
                )));
            }

            let block = store.load_block(current)?.ok_or_else(|| {
                StoreError::Integrity(format!(
                    "free list links to missing block {}",
                    current
                ))
            })?;
            if !block.header.is_deleted {
                return Err(StoreError::Integrity(format!(
                    "free list links to live block {}",
                    current
                )));
            }

            current = block.header.next_id;
            chain.push(block);
        }

        Ok((root, chain))
    }
}
