//! B-tree Module
//!
//! Ordered `u32 → u32` index stored one node per block.
//!
//! ## Responsibilities
//! - Point lookups by linear scan per node (fan-out is small)
//! - Insertion with proactive splitting on the way down
//! - Deletion with borrow/merge rebalancing on the way down
//! - Root tracking through the reserved meta block (block 0)
//!
//! ## File Layout
//! ```text
//! block 0   meta: next_id = root block id, prev_id = free list head
//! block 1   initial root (leaf)
//! block n   nodes allocated by splits, recycled after merges
//! ```
//!
//! ## Node Content (little-endian)
//! ```text
//! ┌────────────────────┬────────────────────┬──────────────────────────┐
//! │ keys: cap × u32    │ vals: cap × u32    │ refs: (cap + 1) × u16    │
//! └────────────────────┴────────────────────┴──────────────────────────┘
//! ```
//! The key count and leaf flag live in the block header
//! (`record_length`, `is_leaf`).

mod node;
mod tree;

pub use node::BTreeNode;
pub use tree::BTree;

/// Key type stored in the tree
pub type Key = u32;

/// Opaque fixed-width payload (typically a record id)
pub type Value = u32;

/// Smallest usable node capacity; one key on each side of the median
pub const MIN_CAPACITY: usize = 3;
