//! Record Module
//!
//! Variable-length opaque records stored as chains of blocks.
//!
//! ## Record Chain
//! ```text
//! ┌──────────────────────┐    ┌──────────────────────┐    ┌──────────────────────┐
//! │ first block          │    │ block                │    │ last block           │
//! │ record_length = total│───▶│ prev = first         │───▶│ prev = ...           │
//! │ prev = 0             │◀───│ next = ...           │◀───│ next = 0             │
//! │ bytes [0, cap)       │    │ bytes [cap, 2·cap)   │    │ remaining bytes      │
//! └──────────────────────┘    └──────────────────────┘    └──────────────────────┘
//! ```
//!
//! A record is identified by the id of its first block. Every record owns at
//! least one block, so the empty record is valid. Freed blocks go onto the
//! free list anchored at block 0 `next_id` and are reused before the file
//! grows.

mod store;

pub use store::RecordStore;

/// Id of a record (the id of its first block)
pub type RecordId = crate::storage::BlockId;
