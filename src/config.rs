//! Configuration for invstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::btree::BTreeNode;
use crate::error::{Result, StoreError};
use crate::storage::BlockHeader;

/// Main configuration for an invstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {NAME}.bs        (record stores)
    ///     ├── {NAME}.bt        (B-tree files)
    ///     └── {name}.lex/.inf  (inverted index lexicon + postings)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Block Geometry
    // -------------------------------------------------------------------------
    /// Size of every block in bytes (header + content)
    pub block_size: usize,

    /// Bytes reserved at the start of each block for the header
    pub header_size: usize,

    // -------------------------------------------------------------------------
    // Index Build Configuration
    // -------------------------------------------------------------------------
    /// Entries per run during the external sort; bounds peak memory
    pub run_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./invstore_data"),
            block_size: 1024,
            header_size: BlockHeader::SIZE,
            run_size: 4096,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check block geometry and run size
    pub fn validate(&self) -> Result<()> {
        if self.header_size < BlockHeader::SIZE {
            return Err(StoreError::Config(format!(
                "header_size {} is smaller than the {}-byte block header",
                self.header_size,
                BlockHeader::SIZE
            )));
        }
        if self.block_size <= self.header_size {
            return Err(StoreError::Config(format!(
                "block_size {} leaves no content after a {}-byte header",
                self.block_size, self.header_size
            )));
        }
        if self.run_size == 0 {
            return Err(StoreError::Config("run_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Content bytes available in each block
    pub fn content_size(&self) -> usize {
        self.block_size.saturating_sub(self.header_size)
    }

    /// Keys per B-tree node implied by the block geometry
    pub fn node_capacity(&self) -> usize {
        BTreeNode::capacity_for(self.content_size())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the block header size (in bytes)
    pub fn header_size(mut self, size: usize) -> Self {
        self.config.header_size = size;
        self
    }

    /// Set the number of entries per external-sort run
    pub fn run_size(mut self, entries: usize) -> Self {
        self.config.run_size = entries;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
