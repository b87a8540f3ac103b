//! B-tree Node
//!
//! A node is a plain value materialized from one block, mutated in memory and
//! written back with `persist`. Nodes never reference each other directly;
//! children are addressed by block id.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StoreError};
use crate::storage::{BlockHeader, BlockId, BlockStore, SENTINEL_BLOCK};

use super::{Key, Value, MIN_CAPACITY};

const KEY_SIZE: usize = 4;
const VAL_SIZE: usize = 4;
const REF_SIZE: usize = 2;

/// One B-tree node backed by one block
///
/// `keys` and `vals` always hold `capacity` slots and `refs` holds
/// `capacity + 1`; only the first `length` (resp. `length + 1`) are occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeNode {
    id: BlockId,
    capacity: usize,
    pub is_leaf: bool,
    pub length: usize,
    pub keys: Vec<Key>,
    pub vals: Vec<Value>,
    pub refs: Vec<BlockId>,
}

impl BTreeNode {
    /// Keys that fit in `content_size` bytes, forced odd
    ///
    /// `floor((content - ref) / (key + val + ref))`, minus one when even, so a
    /// full node always has a single median.
    pub fn capacity_for(content_size: usize) -> usize {
        let possible = content_size.saturating_sub(REF_SIZE) / (KEY_SIZE + VAL_SIZE + REF_SIZE);
        if possible % 2 == 0 {
            possible.saturating_sub(1)
        } else {
            possible
        }
    }

    /// Bytes of content a node of `capacity` occupies
    pub fn encoded_size(capacity: usize) -> usize {
        capacity * (KEY_SIZE + VAL_SIZE) + (capacity + 1) * REF_SIZE
    }

    /// Create an empty in-memory node for block `id`
    pub fn new(id: BlockId, capacity: usize, is_leaf: bool) -> Self {
        Self {
            id,
            capacity,
            is_leaf,
            length: 0,
            keys: vec![0; capacity],
            vals: vec![0; capacity],
            refs: vec![0; capacity + 1],
        }
    }

    /// Read the node stored in block `id`
    pub fn load(store: &mut BlockStore, id: BlockId) -> Result<Self> {
        if id == SENTINEL_BLOCK {
            return Err(StoreError::Integrity(
                "node reference points at the meta block".to_string(),
            ));
        }

        let block = store.load_block(id)?.ok_or_else(|| {
            StoreError::Integrity(format!("node reference to missing block {}", id))
        })?;
        if block.header.is_deleted {
            return Err(StoreError::Integrity(format!(
                "node reference to deleted block {}",
                id
            )));
        }

        let capacity = Self::capacity_for(block.content_size());
        if capacity < MIN_CAPACITY {
            return Err(StoreError::Storage(format!(
                "block content of {} bytes holds only {} keys",
                block.content_size(),
                capacity
            )));
        }

        let length = block.header.record_length as usize;
        if length > capacity {
            return Err(StoreError::Integrity(format!(
                "block {} claims {} keys but holds at most {}",
                id, length, capacity
            )));
        }

        let content = block.read_bytes(store, Self::encoded_size(capacity), 0)?;
        let mut node = Self::new(id, capacity, block.header.is_leaf);
        node.length = length;
        node.decode(&content);
        Ok(node)
    }

    /// Write the header fields and the padded key/value/ref arrays
    pub fn persist(&self, store: &mut BlockStore) -> Result<()> {
        let mut block = store.find_block(self.id).ok_or_else(|| {
            StoreError::Integrity(format!("cannot persist node to missing block {}", self.id))
        })?;

        block.header = BlockHeader {
            record_length: self.length as u32,
            is_leaf: self.is_leaf,
            ..BlockHeader::default()
        };
        block.flush_header(store)?;
        block.write_bytes(store, &self.encode(), 0)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.length == self.capacity
    }

    /// Occupied keys
    pub fn occupied_keys(&self) -> &[Key] {
        &self.keys[..self.length]
    }

    /// Occupied child references (empty for leaves)
    pub fn children(&self) -> &[BlockId] {
        if self.is_leaf {
            &[]
        } else {
            &self.refs[..=self.length]
        }
    }

    /// First slot whose key is `>= key`, and whether it is an exact match
    pub fn search(&self, key: Key) -> (usize, bool) {
        let mut i = 0;
        while i < self.length && key > self.keys[i] {
            i += 1;
        }
        (i, i < self.length && self.keys[i] == key)
    }

    // =========================================================================
    // In-place Edits (callers guarantee capacity)
    // =========================================================================

    /// Insert an entry at `index`, shifting later entries right
    pub(crate) fn insert_entry(&mut self, index: usize, key: Key, val: Value) {
        let len = self.length;
        self.keys.copy_within(index..len, index + 1);
        self.vals.copy_within(index..len, index + 1);
        self.keys[index] = key;
        self.vals[index] = val;
        self.length += 1;
    }

    /// Remove the entry at `index` from a leaf
    pub(crate) fn remove_entry(&mut self, index: usize) -> (Key, Value) {
        let len = self.length;
        let removed = (self.keys[index], self.vals[index]);
        self.keys.copy_within(index + 1..len, index);
        self.vals.copy_within(index + 1..len, index);
        self.keys[len - 1] = 0;
        self.vals[len - 1] = 0;
        self.length -= 1;
        removed
    }

    /// Insert a separator at `index` with `right` as the child after it
    pub(crate) fn insert_separator(&mut self, index: usize, key: Key, val: Value, right: BlockId) {
        let len = self.length;
        self.refs.copy_within(index + 1..=len, index + 2);
        self.refs[index + 1] = right;
        self.insert_entry(index, key, val);
    }

    /// Remove the separator at `index` together with the child after it
    pub(crate) fn remove_separator(&mut self, index: usize) -> (Key, Value) {
        let len = self.length;
        self.refs.copy_within(index + 2..=len, index + 1);
        self.refs[len] = 0;
        self.remove_entry(index)
    }

    /// Prepend an entry whose left child becomes `refs[0]`
    pub(crate) fn push_front(&mut self, key: Key, val: Value, child: BlockId) {
        let len = self.length;
        self.refs.copy_within(0..=len, 1);
        self.refs[0] = child;
        self.insert_entry(0, key, val);
    }

    /// Append an entry whose right child becomes `refs[length]`
    pub(crate) fn push_back(&mut self, key: Key, val: Value, child: BlockId) {
        let len = self.length;
        self.keys[len] = key;
        self.vals[len] = val;
        self.refs[len + 1] = child;
        self.length += 1;
    }

    /// Remove the first entry and its left child
    pub(crate) fn pop_front(&mut self) -> (Key, Value, BlockId) {
        let len = self.length;
        let child = self.refs[0];
        self.refs.copy_within(1..=len, 0);
        self.refs[len] = 0;
        let (key, val) = self.remove_entry(0);
        (key, val, child)
    }

    /// Remove the last entry and its right child
    pub(crate) fn pop_back(&mut self) -> (Key, Value, BlockId) {
        let len = self.length;
        let child = self.refs[len];
        self.refs[len] = 0;
        let (key, val) = self.remove_entry(len - 1);
        (key, val, child)
    }

    /// Zero every slot from `length` on
    pub(crate) fn clear_tail(&mut self) {
        self.keys[self.length..].fill(0);
        self.vals[self.length..].fill(0);
        self.refs[self.length + 1..].fill(0);
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::encoded_size(self.capacity));

        for i in 0..self.capacity {
            buf.put_u32_le(if i < self.length { self.keys[i] } else { 0 });
        }
        for i in 0..self.capacity {
            buf.put_u32_le(if i < self.length { self.vals[i] } else { 0 });
        }
        for i in 0..=self.capacity {
            let live = !self.is_leaf && i <= self.length;
            buf.put_u16_le(if live { self.refs[i] } else { 0 });
        }

        buf
    }

    fn decode(&mut self, content: &[u8]) {
        let mut buf = content;
        for key in self.keys.iter_mut() {
            *key = buf.get_u32_le();
        }
        for val in self.vals.iter_mut() {
            *val = buf.get_u32_le();
        }
        for child in self.refs.iter_mut() {
            *child = buf.get_u16_le();
        }
    }
}
