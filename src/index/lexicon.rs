//! Lexicon
//!
//! Term → postings location map, persisted as one checksummed blob.
//!
//! ## Blob Format
//! ```text
//! ┌───────────┬─────────────┬───────────┬──────────────┬─────────────────────┐
//! │ Magic (4) │ Version (2) │ CRC32 (4) │ PayloadLen(8)│ bincode payload     │
//! │  "INVL"   │   u16 LE    │  u32 LE   │   u64 LE     │ BTreeMap<term, ..>  │
//! └───────────┴─────────────┴───────────┴──────────────┴─────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Magic bytes identifying a lexicon blob
const MAGIC: &[u8; 4] = b"INVL";

/// Current lexicon format version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + CRC (4) + PayloadLen (8)
const HEADER_SIZE: usize = 18;

/// Location of one term's postings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconEntry {
    /// Number of postings
    pub count: u32,
    /// Byte offset of the first posting in the postings file
    pub offset: u64,
}

/// In-memory term dictionary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexicon {
    terms: BTreeMap<String, LexiconEntry>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, term: impl Into<String>, entry: LexiconEntry) {
        self.terms.insert(term.into(), entry);
    }

    /// Exact (already normalized) term lookup
    pub fn get(&self, term: &str) -> Option<&LexiconEntry> {
        self.terms.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in lexicographic order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LexiconEntry)> {
        self.terms.iter().map(|(term, entry)| (term.as_str(), entry))
    }

    /// Total postings across all terms
    pub fn postings_count(&self) -> u64 {
        self.terms.values().map(|e| e.count as u64).sum()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Encode as a self-describing blob
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&self.terms)?;

        let mut blob = Vec::with_capacity(HEADER_SIZE + payload.len());
        blob.put_slice(MAGIC);
        blob.put_u16_le(VERSION);
        blob.put_u32_le(crc32fast::hash(&payload));
        blob.put_u64_le(payload.len() as u64);
        blob.put_slice(&payload);
        Ok(blob)
    }

    /// Decode a blob, validating magic, version, length and checksum
    pub fn decode(blob: &[u8]) -> Result<Self> {
        if blob.len() < HEADER_SIZE {
            return Err(StoreError::Integrity(format!(
                "lexicon blob is {} bytes, shorter than its {}-byte header",
                blob.len(),
                HEADER_SIZE
            )));
        }
        if &blob[0..4] != MAGIC {
            return Err(StoreError::Integrity(format!(
                "invalid lexicon magic: expected INVL, got {:?}",
                &blob[0..4]
            )));
        }

        let mut header = &blob[4..HEADER_SIZE];
        let version = header.get_u16_le();
        if version != VERSION {
            return Err(StoreError::Integrity(format!(
                "unsupported lexicon version: {}",
                version
            )));
        }
        let crc = header.get_u32_le();
        let payload_len = header.get_u64_le();

        let payload = &blob[HEADER_SIZE..];
        if payload.len() as u64 != payload_len {
            return Err(StoreError::Integrity(format!(
                "lexicon payload is {} bytes, header declares {}",
                payload.len(),
                payload_len
            )));
        }
        if crc32fast::hash(payload) != crc {
            return Err(StoreError::Integrity(
                "lexicon checksum mismatch".to_string(),
            ));
        }

        let terms = bincode::deserialize(payload)?;
        Ok(Self { terms })
    }

    /// Write the blob next to `path` and rename it into place
    pub fn save(&self, path: &Path) -> Result<()> {
        let blob = self.encode()?;
        let staging = staging_path(path);
        fs::write(&staging, &blob)?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    /// Read and decode a whole blob
    pub fn load(path: &Path) -> Result<Self> {
        let blob = fs::read(path)?;
        Self::decode(&blob)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
