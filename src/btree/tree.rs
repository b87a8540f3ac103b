//! B-tree
//!
//! Single-pass insertion and deletion: every node is made safe before the
//! descent enters it, so no structural change ever propagates upwards.
//! With `t = (capacity + 1) / 2`:
//! - put splits any full node before entering it
//! - delete tops up any child holding fewer than `t` keys before entering it
//!   (borrow from a sibling, else merge with one)

use std::path::Path;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::storage::{BlockId, BlockStore, FreeList, FreeListAnchor, SENTINEL_BLOCK};

use super::{BTreeNode, Key, Value, MIN_CAPACITY};

/// Free blocks of a B-tree file hang off the meta block's `prev_id`
const FREE_LIST: FreeList = FreeList::new(FreeListAnchor::Prev);

/// Ordered index of `u32` keys to `u32` values over a block file
///
/// The root node is kept resident; every other node is loaded on access.
pub struct BTree {
    store: BlockStore,
    capacity: usize,
    root_id: BlockId,
    root: BTreeNode,
}

impl BTree {
    /// Open or create a B-tree file
    ///
    /// A new file gets the meta block (0) and an empty leaf root (1).
    pub fn open(path: &Path, header_size: usize, block_size: usize) -> Result<Self> {
        let store = BlockStore::open(path, header_size, block_size)?;
        Self::from_store(store)
    }

    /// Open using the geometry from a config
    pub fn open_with(path: &Path, config: &Config) -> Result<Self> {
        Self::open(path, config.header_size, config.block_size)
    }

    /// Build a tree over an already opened block store
    pub fn from_store(mut store: BlockStore) -> Result<Self> {
        let capacity = BTreeNode::capacity_for(store.content_size());
        if capacity < MIN_CAPACITY {
            return Err(StoreError::Config(format!(
                "block content of {} bytes fits {} keys per node, need at least {}",
                store.content_size(),
                capacity,
                MIN_CAPACITY
            )));
        }

        let root_id = if store.block_count() == 0 {
            let mut meta = store.create_block()?;
            let root_block = store.create_block()?;

            BTreeNode::new(root_block.id(), capacity, true).persist(&mut store)?;
            meta.header.next_id = root_block.id();
            meta.flush_header(&mut store)?;

            tracing::debug!(
                "Created B-tree {} (capacity {} keys per node)",
                store.path().display(),
                capacity
            );
            root_block.id()
        } else {
            let meta = store.load_block(SENTINEL_BLOCK)?.ok_or_else(|| {
                StoreError::Integrity("B-tree file has no meta block".to_string())
            })?;
            let root_id = meta.header.next_id;
            if root_id == SENTINEL_BLOCK || root_id as u32 >= store.block_count() {
                return Err(StoreError::Integrity(format!(
                    "meta block points at invalid root {} ({} blocks)",
                    root_id,
                    store.block_count()
                )));
            }
            root_id
        };

        let root = BTreeNode::load(&mut store, root_id)?;

        Ok(Self {
            store,
            capacity,
            root_id,
            root,
        })
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Insert or replace the value for `key`
    pub fn put(&mut self, key: Key, value: Value) -> Result<()> {
        if self.root.is_full() {
            self.split_root()?;
        }

        let mut node = self.root.clone();
        loop {
            let (mut i, found) = node.search(key);

            if found {
                node.vals[i] = value;
                break node.persist(&mut self.store)?;
            }

            if node.is_leaf {
                node.insert_entry(i, key, value);
                break node.persist(&mut self.store)?;
            }

            let child = self.load_node(node.refs[i])?;
            if !child.is_full() {
                node = child;
                continue;
            }

            self.split_child(&mut node, i, child)?;
            if key == node.keys[i] {
                node.vals[i] = value;
                break node.persist(&mut self.store)?;
            }
            if key > node.keys[i] {
                i += 1;
            }
            node = self.load_node(node.refs[i])?;
        }

        self.reload_root()
    }

    /// Look up the value stored for `key`
    pub fn find(&mut self, key: Key) -> Result<Option<Value>> {
        let (i, found) = self.root.search(key);
        if found {
            return Ok(Some(self.root.vals[i]));
        }
        if self.root.is_leaf {
            return Ok(None);
        }

        let mut node = self.load_node(self.root.refs[i])?;
        loop {
            let (i, found) = node.search(key);
            if found {
                return Ok(Some(node.vals[i]));
            }
            if node.is_leaf {
                return Ok(None);
            }
            node = self.load_node(node.refs[i])?;
        }
    }

    /// Remove `key`; returns whether it was present
    pub fn delete(&mut self, key: Key) -> Result<bool> {
        let removed = self.delete_from(self.root.clone(), key)?;
        self.reload_root()?;
        Ok(removed)
    }

    /// All entries in ascending key order
    pub fn entries(&mut self) -> Result<Vec<(Key, Value)>> {
        let mut out = Vec::new();
        let root = self.root.clone();
        self.collect(&root, &mut out)?;
        Ok(out)
    }

    /// Number of stored entries
    pub fn len(&mut self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> bool {
        self.root.length == 0
    }

    /// Number of levels (1 for a lone root leaf)
    pub fn depth(&mut self) -> Result<usize> {
        let mut depth = 1;
        let mut node = self.root.clone();
        while !node.is_leaf {
            node = self.load_node(node.refs[0])?;
            depth += 1;
        }
        Ok(depth)
    }

    /// Check ordering, occupancy and balance of the whole tree
    ///
    /// Keys must be strictly increasing in-order, every leaf must sit at the
    /// same depth, a non-root node must hold at least `capacity / 2` keys and
    /// an internal root at least one.
    pub fn verify(&mut self) -> Result<()> {
        let root = self.root.clone();
        if !root.is_leaf && root.length == 0 {
            return Err(StoreError::Integrity(format!(
                "internal root {} holds no keys",
                root.id()
            )));
        }
        let mut leaf_depth = None;
        self.verify_node(&root, None, None, 1, &mut leaf_depth)
    }

    /// Keys per node
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fewest keys a child may hold before the delete descent tops it up
    pub fn min_keys(&self) -> usize {
        (self.capacity + 1) / 2
    }

    pub fn root_id(&self) -> BlockId {
        self.root_id
    }

    /// Blocks waiting on the free list for reuse
    pub fn free_block_count(&mut self) -> Result<usize> {
        FREE_LIST.len(&mut self.store)
    }

    pub fn block_count(&self) -> u32 {
        self.store.block_count()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Grow the tree by one level: a new root adopts the old one, then splits it
    ///
    /// The meta block is repointed only once the new root and both halves are
    /// on disk, so a failed split leaves the old root in place.
    fn split_root(&mut self) -> Result<()> {
        let free = FREE_LIST.len(&mut self.store)?;
        if free + (self.store.remaining_blocks() as usize) < 2 {
            return Err(StoreError::Storage(format!(
                "{} has no room to split the root: {} free, {} unused ids",
                self.store.path().display(),
                free,
                self.store.remaining_blocks()
            )));
        }

        let old_root = self.root.clone();
        let mut new_root = self.allocate_node(false)?;
        new_root.refs[0] = old_root.id();

        if let Err(err) = self.split_child(&mut new_root, 0, old_root) {
            self.free_node(new_root.id())?;
            return Err(err);
        }
        self.set_root(new_root.id())?;

        tracing::debug!(
            "Split root {} into new root {}",
            self.root.id(),
            new_root.id()
        );
        self.root = new_root;
        Ok(())
    }

    /// Split the full `child` at `parent.refs[index]` around its median
    ///
    /// Entries above the median move to a new right sibling, the median moves
    /// into `parent` at `index`. All three nodes are persisted.
    fn split_child(&mut self, parent: &mut BTreeNode, index: usize, mut child: BTreeNode) -> Result<()> {
        let capacity = child.capacity();
        let half = capacity / 2;

        let mut sibling = self.allocate_node(child.is_leaf)?;
        sibling.length = capacity - half - 1;
        sibling.keys[..half].copy_from_slice(&child.keys[half + 1..capacity]);
        sibling.vals[..half].copy_from_slice(&child.vals[half + 1..capacity]);
        if !child.is_leaf {
            sibling.refs[..=half].copy_from_slice(&child.refs[half + 1..=capacity]);
        }

        let (median_key, median_val) = (child.keys[half], child.vals[half]);
        child.length = half;
        child.clear_tail();

        parent.insert_separator(index, median_key, median_val, sibling.id());

        parent.persist(&mut self.store)?;
        child.persist(&mut self.store)?;
        sibling.persist(&mut self.store)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn delete_from(&mut self, mut node: BTreeNode, mut key: Key) -> Result<bool> {
        let min = self.min_keys();

        loop {
            let (i, found) = node.search(key);

            if node.is_leaf {
                if !found {
                    return Ok(false);
                }
                node.remove_entry(i);
                node.persist(&mut self.store)?;
                return Ok(true);
            }

            if found {
                // Replace with the predecessor or successor, then delete that
                // entry from the subtree it came from.
                let left = self.load_node(node.refs[i])?;
                if left.length >= min {
                    let (pred_key, pred_val) = self.last_entry(&left)?;
                    node.keys[i] = pred_key;
                    node.vals[i] = pred_val;
                    node.persist(&mut self.store)?;
                    node = left;
                    key = pred_key;
                    continue;
                }

                let right = self.load_node(node.refs[i + 1])?;
                if right.length >= min {
                    let (succ_key, succ_val) = self.first_entry(&right)?;
                    node.keys[i] = succ_key;
                    node.vals[i] = succ_val;
                    node.persist(&mut self.store)?;
                    node = right;
                    key = succ_key;
                    continue;
                }

                node = self.merge_children(node, i, left, right)?;
                continue;
            }

            let mut child = self.load_node(node.refs[i])?;
            if child.length >= min {
                node = child;
                continue;
            }

            let mut left = if i > 0 {
                Some(self.load_node(node.refs[i - 1])?)
            } else {
                None
            };
            if let Some(sibling) = left.as_mut().filter(|s| s.length >= min) {
                // Rotate right through the separator at i - 1
                let (k, v, r) = sibling.pop_back();
                child.push_front(node.keys[i - 1], node.vals[i - 1], r);
                node.keys[i - 1] = k;
                node.vals[i - 1] = v;

                sibling.persist(&mut self.store)?;
                node.persist(&mut self.store)?;
                child.persist(&mut self.store)?;
                node = child;
                continue;
            }

            let mut right = if i < node.length {
                Some(self.load_node(node.refs[i + 1])?)
            } else {
                None
            };
            if let Some(sibling) = right.as_mut().filter(|s| s.length >= min) {
                // Rotate left through the separator at i
                let (k, v, r) = sibling.pop_front();
                child.push_back(node.keys[i], node.vals[i], r);
                node.keys[i] = k;
                node.vals[i] = v;

                sibling.persist(&mut self.store)?;
                node.persist(&mut self.store)?;
                child.persist(&mut self.store)?;
                node = child;
                continue;
            }

            node = match (left, right) {
                (_, Some(right)) => self.merge_children(node, i, child, right)?,
                (Some(left), None) => self.merge_children(node, i - 1, left, child)?,
                (None, None) => {
                    return Err(StoreError::Integrity(format!(
                        "internal node {} has a single child",
                        node.id()
                    )))
                }
            };
        }
    }

    /// Merge `right` and the separator at `index` into `left`
    ///
    /// `right`'s block is freed. If `parent` is the root and loses its last
    /// key, `left` becomes the new root and the old root block is freed.
    fn merge_children(
        &mut self,
        mut parent: BTreeNode,
        index: usize,
        mut left: BTreeNode,
        right: BTreeNode,
    ) -> Result<BTreeNode> {
        let base = left.length;
        let merged_len = base + 1 + right.length;
        if merged_len > left.capacity() {
            return Err(StoreError::Integrity(format!(
                "merging blocks {} and {} needs {} slots, capacity is {}",
                left.id(),
                right.id(),
                merged_len,
                left.capacity()
            )));
        }

        left.keys[base] = parent.keys[index];
        left.vals[base] = parent.vals[index];
        left.keys[base + 1..merged_len].copy_from_slice(&right.keys[..right.length]);
        left.vals[base + 1..merged_len].copy_from_slice(&right.vals[..right.length]);
        if !left.is_leaf {
            left.refs[base + 1..=merged_len].copy_from_slice(&right.refs[..=right.length]);
        }
        left.length = merged_len;
        left.persist(&mut self.store)?;

        parent.remove_separator(index);
        self.free_node(right.id())?;

        if parent.id() == self.root_id && parent.length == 0 {
            tracing::debug!("Root {} emptied, {} becomes the root", parent.id(), left.id());
            self.set_root(left.id())?;
            self.free_node(parent.id())?;
        } else {
            parent.persist(&mut self.store)?;
        }

        Ok(left)
    }

    /// Rightmost entry of the subtree rooted at `node`
    fn last_entry(&mut self, node: &BTreeNode) -> Result<(Key, Value)> {
        let mut current = node.clone();
        while !current.is_leaf {
            current = self.load_node(current.refs[current.length])?;
        }
        match current.length {
            0 => Err(StoreError::Integrity(format!("leaf {} is empty", current.id()))),
            n => Ok((current.keys[n - 1], current.vals[n - 1])),
        }
    }

    /// Leftmost entry of the subtree rooted at `node`
    fn first_entry(&mut self, node: &BTreeNode) -> Result<(Key, Value)> {
        let mut current = node.clone();
        while !current.is_leaf {
            current = self.load_node(current.refs[0])?;
        }
        match current.length {
            0 => Err(StoreError::Integrity(format!("leaf {} is empty", current.id()))),
            _ => Ok((current.keys[0], current.vals[0])),
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    fn collect(&mut self, node: &BTreeNode, out: &mut Vec<(Key, Value)>) -> Result<()> {
        for i in 0..node.length {
            if !node.is_leaf {
                let child = self.load_node(node.refs[i])?;
                self.collect(&child, out)?;
            }
            out.push((node.keys[i], node.vals[i]));
        }
        if !node.is_leaf {
            let child = self.load_node(node.refs[node.length])?;
            self.collect(&child, out)?;
        }
        Ok(())
    }

    fn verify_node(
        &mut self,
        node: &BTreeNode,
        lower: Option<Key>,
        upper: Option<Key>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> Result<()> {
        let is_root = node.id() == self.root_id;
        if !is_root && node.length < self.capacity / 2 {
            return Err(StoreError::Integrity(format!(
                "block {} holds {} keys, minimum is {}",
                node.id(),
                node.length,
                self.capacity / 2
            )));
        }

        let keys = node.occupied_keys();
        for (pos, &key) in keys.iter().enumerate() {
            let above_prev = match pos {
                0 => lower.map_or(true, |low| key > low),
                _ => key > keys[pos - 1],
            };
            let below_upper = upper.map_or(true, |high| key < high);
            if !above_prev || !below_upper {
                return Err(StoreError::Integrity(format!(
                    "block {} breaks key order at slot {} (key {})",
                    node.id(),
                    pos,
                    key
                )));
            }
        }

        if node.is_leaf {
            return match *leaf_depth {
                Some(expected) if expected != depth => Err(StoreError::Integrity(format!(
                    "leaf {} sits at depth {}, other leaves at {}",
                    node.id(),
                    depth,
                    expected
                ))),
                _ => {
                    *leaf_depth = Some(depth);
                    Ok(())
                }
            };
        }

        for (i, &child_id) in node.children().iter().enumerate() {
            let child = self.load_node(child_id)?;
            let low = if i == 0 { lower } else { Some(keys[i - 1]) };
            let high = if i == keys.len() { upper } else { Some(keys[i]) };
            self.verify_node(&child, low, high, depth + 1, leaf_depth)?;
        }
        Ok(())
    }

    // =========================================================================
    // Block Bookkeeping
    // =========================================================================

    fn load_node(&mut self, id: BlockId) -> Result<BTreeNode> {
        BTreeNode::load(&mut self.store, id)
    }

    fn reload_root(&mut self) -> Result<()> {
        self.root = self.load_node(self.root_id)?;
        Ok(())
    }

    /// Take a block from the free list, or append a new one
    fn allocate_node(&mut self, is_leaf: bool) -> Result<BTreeNode> {
        let block = match FREE_LIST.pop(&mut self.store)? {
            Some(block) => {
                tracing::trace!("Reusing block {} for a B-tree node", block.id());
                block
            }
            None => self.store.create_block()?,
        };
        Ok(BTreeNode::new(block.id(), self.capacity, is_leaf))
    }

    fn free_node(&mut self, id: BlockId) -> Result<()> {
        tracing::trace!("Releasing B-tree node {}", id);
        FREE_LIST.push(&mut self.store, id)
    }

    /// Point the meta block at a new root
    fn set_root(&mut self, id: BlockId) -> Result<()> {
        let mut meta = self.store.load_block(SENTINEL_BLOCK)?.ok_or_else(|| {
            StoreError::Integrity("B-tree file has no meta block".to_string())
        })?;
        meta.header.next_id = id;
        meta.flush_header(&mut self.store)?;
        self.root_id = id;
        Ok(())
    }
}
