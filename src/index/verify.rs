//! Scratch file diagnostics. None of these run during a normal build.

use std::fs;
use std::path::Path;

use crate::error::{Result, StoreError};

use super::run::{entry_count, RunCursor};
use super::RunEntry;

/// Check that every `run_size` chunk is non-decreasing
///
/// Returns the number of entries checked.
pub fn verify_runs(path: &Path, run_size: usize) -> Result<u64> {
    if run_size == 0 {
        return Err(StoreError::Config("run_size must be at least 1".to_string()));
    }

    let entries = entry_count(path)?;
    let mut start = 0u64;
    while start < entries {
        let end = (start + run_size as u64).min(entries);
        let mut cursor = RunCursor::open(path, start, end)?;
        while cursor.next_entry()?.is_some() {}
        start = end;
    }
    Ok(entries)
}

/// Check that the whole file is one non-decreasing run
pub fn verify_sorted(path: &Path) -> Result<u64> {
    let entries = entry_count(path)?;
    let mut cursor = RunCursor::open(path, 0, entries)?;
    while cursor.next_entry()?.is_some() {}
    Ok(entries)
}

/// Every entry of a scratch file, in file order
pub fn dump_runs(path: &Path) -> Result<Vec<RunEntry>> {
    entry_count(path)?;
    let bytes = fs::read(path)?;
    Ok(RunEntry::decode_all(&bytes))
}
