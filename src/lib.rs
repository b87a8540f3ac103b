//! # invstore
//!
//! An embedded, file-backed storage kernel with:
//! - Fixed-size block files with free-block recycling
//! - A B-tree for ordered `u32` key lookup with split/merge rebalancing
//! - A record store for variable-length payloads chained across blocks
//! - An external sort-based inverted index builder with bounded memory
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     System (catalog)                        │
//! │              named stores under one data dir                │
//! └──────────┬──────────────────┬──────────────────┬────────────┘
//!            │                  │                  │
//!            ▼                  ▼                  ▼
//!   ┌─────────────────┐ ┌───────────────┐  ┌─────────────────┐
//!   │      Table      │ │    B-tree     │  │  Sort-Based     │
//!   │ key → record id │ │  (.bt file)   │  │  Inverted Index │
//!   │   → payload     │ └───────┬───────┘  │ runs → merge →  │
//!   └────────┬────────┘         │          │ postings + lex  │
//!            │                  │          └─────────────────┘
//!            ▼                  │
//!   ┌─────────────────┐         │
//!   │  Record Store   │         │
//!   │  (.bs file)     │         │
//!   └────────┬────────┘         │
//!            │                  │
//!            ▼                  ▼
//!   ┌─────────────────────────────────────┐
//!   │        Block Store + Free List      │
//!   │  header (BE) │ content              │
//!   └─────────────────────────────────────┘
//! ```
//!
//! Everything is single-threaded and synchronous. One open handle per file.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod btree;
pub mod record;
pub mod index;
pub mod table;
pub mod system;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;
pub use btree::BTree;
pub use record::{RecordId, RecordStore};
pub use index::{IndexDocument, InvertedIndexReader, SortBasedIndex, TextDocument};
pub use table::Table;
pub use system::System;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of invstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
