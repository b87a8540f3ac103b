//! System Catalog
//!
//! Owns a data directory and hands out named stores inside it.
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   ├── {NAME}.bs     record stores (and table payloads)
//!   ├── {NAME}.bt     B-trees (and table indexes)
//!   └── {name}.lex    inverted index lexicon
//!       {name}.inf    inverted index postings
//!       {name}.tmp    scratch, present only mid-build
//! ```
//!
//! Store names are case-insensitive. Every handle is opened on first use,
//! cached, and closed when the `System` drops.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::btree::BTree;
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::SortBasedIndex;
use crate::record::RecordStore;
use crate::table::Table;

pub struct System {
    config: Config,
    record_stores: HashMap<String, RecordStore>,
    btrees: HashMap<String, BTree>,
    tables: HashMap<String, Table>,
}

impl System {
    const RECORD_EXT: &'static str = "bs";
    const BTREE_EXT: &'static str = "bt";

    /// Open or create the data directory
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        tracing::info!(
            "Opened system at {} (block size {}, node capacity {})",
            config.data_dir.display(),
            config.block_size,
            config.node_capacity()
        );

        Ok(Self {
            config,
            record_stores: HashMap::new(),
            btrees: HashMap::new(),
            tables: HashMap::new(),
        })
    }

    /// Open with default config rooted at `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    // =========================================================================
    // Named Stores
    // =========================================================================

    /// Record store `{NAME}.bs`
    pub fn record_store(&mut self, name: &str) -> Result<&mut RecordStore> {
        let name = name.to_uppercase();
        if self.tables.contains_key(&name) {
            return Err(claimed_by_table(&name));
        }

        match self.record_stores.entry(name) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let path = store_path(&self.config.data_dir, e.key(), Self::RECORD_EXT);
                let store = RecordStore::open_with(&path, &self.config)?;
                Ok(e.insert(store))
            }
        }
    }

    /// B-tree `{NAME}.bt`
    pub fn btree(&mut self, name: &str) -> Result<&mut BTree> {
        let name = name.to_uppercase();
        if self.tables.contains_key(&name) {
            return Err(claimed_by_table(&name));
        }

        match self.btrees.entry(name) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let path = store_path(&self.config.data_dir, e.key(), Self::BTREE_EXT);
                let tree = BTree::open_with(&path, &self.config)?;
                Ok(e.insert(tree))
            }
        }
    }

    /// Keyed table over `{NAME}.bt` and `{NAME}.bs`
    pub fn table(&mut self, name: &str) -> Result<&mut Table> {
        let name = name.to_uppercase();
        if self.record_stores.contains_key(&name) || self.btrees.contains_key(&name) {
            return Err(StoreError::InvalidState(format!(
                "{} is already open as a plain store",
                name
            )));
        }

        match self.tables.entry(name) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let table = Table::open(&self.config, e.key())?;
                Ok(e.insert(table))
            }
        }
    }

    /// Inverted index files `{name}.lex` / `{name}.inf`
    pub fn inverted_index(&self, name: &str) -> SortBasedIndex {
        SortBasedIndex::from_config(&self.config, name)
    }

    /// Names of the stores currently open
    pub fn open_stores(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .record_stores
            .keys()
            .chain(self.btrees.keys())
            .chain(self.tables.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Flush every open store to disk
    pub fn sync(&mut self) -> Result<()> {
        for store in self.record_stores.values_mut() {
            store.sync()?;
        }
        for tree in self.btrees.values_mut() {
            tree.sync()?;
        }
        for table in self.tables.values_mut() {
            table.sync()?;
        }
        Ok(())
    }
}

fn store_path(dir: &Path, name: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, ext))
}

fn claimed_by_table(name: &str) -> StoreError {
    StoreError::InvalidState(format!("{} is already open as a table", name))
}
