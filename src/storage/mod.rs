//! Storage Module
//!
//! Fixed-size block storage over a single file.
//!
//! ## Responsibilities
//! - Address one file as a dense array of blocks `[0, block_count)`
//! - Append zero-filled blocks on demand (the file never shrinks)
//! - Read/write block headers and content regions at `id * block_size`
//! - Recycle freed blocks through a chain anchored at block 0
//!
//! ## Block Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (10 bytes, big-endian, padded to header_size)         │
//! │ ┌───────────────┬──────────┬──────────┬─────────┬─────────┐  │
//! │ │ RecordLen (4) │ Next (2) │ Prev (2) │ Del (1) │ Leaf (1)│  │
//! │ └───────────────┴──────────┴──────────┴─────────┴─────────┘  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Content (block_size - header_size bytes)                     │
//! │   interpreted by the owner: B-tree node arrays or record     │
//! │   bytes                                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Block 0 is reserved in every file. Its `next_id`/`prev_id` fields anchor
//! owner bookkeeping (root pointer, free list) and it is never handed out as
//! a data block.

mod block;
mod block_store;
mod freelist;

pub use block::{Block, BlockHeader, BlockId};
pub use block_store::{BlockStore, MAX_BLOCKS};
pub use freelist::{FreeList, FreeListAnchor};

/// Id of the reserved sentinel block
pub const SENTINEL_BLOCK: BlockId = 0;
