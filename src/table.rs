//! Keyed Table
//!
//! A B-tree from numeric keys to record ids, paired with the record store
//! holding the payloads.
//!
//! ```text
//!   key ──▶ BTree ({NAME}.bt) ──▶ record id ──▶ RecordStore ({NAME}.bs) ──▶ bytes
//! ```

use std::fs;

use crate::btree::{BTree, Key, Value};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::record::{RecordId, RecordStore};

pub struct Table {
    index: BTree,
    records: RecordStore,
}

impl Table {
    /// Open or create the `{NAME}.bt` / `{NAME}.bs` pair under the data directory
    pub fn open(config: &Config, name: &str) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let name = name.to_uppercase();
        let index = BTree::open_with(&config.data_dir.join(format!("{}.bt", name)), config)?;
        let records =
            RecordStore::open_with(&config.data_dir.join(format!("{}.bs", name)), config)?;
        Ok(Self::from_parts(index, records))
    }

    pub fn from_parts(index: BTree, records: RecordStore) -> Self {
        Self { index, records }
    }

    /// Store `payload` under `key`, rewriting the existing record in place
    pub fn put(&mut self, key: Key, payload: &[u8]) -> Result<RecordId> {
        match self.index.find(key)? {
            Some(value) => {
                let id = record_id(key, value)?;
                self.records.update(id, payload)?;
                Ok(id)
            }
            None => {
                let id = self.records.insert(payload)?;
                self.index.put(key, Value::from(id))?;
                Ok(id)
            }
        }
    }

    pub fn get(&mut self, key: Key) -> Result<Option<Vec<u8>>> {
        let id = match self.index.find(key)? {
            Some(value) => record_id(key, value)?,
            None => return Ok(None),
        };
        match self.records.find_by_id(id)? {
            Some(payload) => Ok(Some(payload)),
            None => Err(StoreError::Integrity(format!(
                "key {} points at missing record {}",
                key, id
            ))),
        }
    }

    /// Remove `key` and free its record; false if the key was absent
    pub fn remove(&mut self, key: Key) -> Result<bool> {
        let id = match self.index.find(key)? {
            Some(value) => record_id(key, value)?,
            None => return Ok(false),
        };
        self.records.delete(id)?;
        self.index.delete(key)
    }

    pub fn contains(&mut self, key: Key) -> Result<bool> {
        Ok(self.index.find(key)?.is_some())
    }

    /// Keys in ascending order
    pub fn keys(&mut self) -> Result<Vec<Key>> {
        Ok(self.index.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn len(&mut self) -> Result<usize> {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&mut self) -> &mut BTree {
        &mut self.index
    }

    pub fn records(&mut self) -> &mut RecordStore {
        &mut self.records
    }

    pub fn sync(&mut self) -> Result<()> {
        self.index.sync()?;
        self.records.sync()
    }
}

fn record_id(key: Key, value: Value) -> Result<RecordId> {
    RecordId::try_from(value).map_err(|_| {
        StoreError::Integrity(format!(
            "key {} maps to {}, outside the record id range",
            key, value
        ))
    })
}
