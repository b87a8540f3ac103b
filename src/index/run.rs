//! Sequential, order-checking reads over a range of scratch entries.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, StoreError};

use super::RunEntry;

/// Number of whole entries in a scratch file
pub(crate) fn entry_count(path: &Path) -> Result<u64> {
    let len = std::fs::metadata(path)?.len();
    if len % RunEntry::SIZE as u64 != 0 {
        return Err(StoreError::Integrity(format!(
            "{} is {} bytes, not a whole number of {}-byte entries",
            path.display(),
            len,
            RunEntry::SIZE
        )));
    }
    Ok(len / RunEntry::SIZE as u64)
}

/// Streams entries `[start, end)` of a scratch file
///
/// Every entry must sort at or after the previous one; the first that does
/// not is reported with its absolute entry index.
pub(crate) struct RunCursor {
    reader: BufReader<File>,
    position: u64,
    end: u64,
    last: Option<RunEntry>,
}

impl RunCursor {
    pub(crate) fn open(path: &Path, start: u64, end: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start * RunEntry::SIZE as u64))?;
        Ok(Self {
            reader: BufReader::new(file),
            position: start,
            end,
            last: None,
        })
    }

    /// Next entry of the range, or None once the range is consumed
    pub(crate) fn next_entry(&mut self) -> Result<Option<RunEntry>> {
        if self.position >= self.end {
            return Ok(None);
        }

        let mut raw = [0u8; RunEntry::SIZE];
        self.reader.read_exact(&mut raw)?;
        let entry = RunEntry::decode(&raw);

        if let Some(prev) = self.last {
            if entry.sort_key() < prev.sort_key() {
                return Err(StoreError::Integrity(format!(
                    "broken run ordering at entry {}: ({}, {}) follows ({}, {})",
                    self.position, entry.term_id, entry.doc_id, prev.term_id, prev.doc_id
                )));
            }
        }

        self.last = Some(entry);
        self.position += 1;
        Ok(Some(entry))
    }
}
