//! Index Build
//!
//! Step-by-step external sort of scratch triples into postings.
//!
//! ```text
//! Empty ─write_runs─▶ RunsWritten ─sort_runs─▶ RunsSorted ─merge_runs─▶ Merged ─compact─▶ Compacted
//! ```
//!
//! Each step checks the current phase. A build interrupted part way leaves
//! scratch files that are only valid for discarding; start a new build.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

use super::run::{entry_count, RunCursor};
use super::{extract_terms, IndexDocument, IndexPaths, Lexicon, LexiconEntry, Posting, RunEntry};

/// Progress of an index build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Empty,
    RunsWritten,
    RunsSorted,
    Merged,
    Compacted,
}

/// Counters collected while building
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Documents consumed
    pub documents: u64,
    /// Distinct terms
    pub terms: usize,
    /// Scratch triples (one per distinct term per document)
    pub entries: u64,
    /// Merge passes over the scratch file
    pub merge_passes: u32,
}

/// One run of the external sort-based index construction
pub struct IndexBuild {
    paths: IndexPaths,
    run_size: usize,
    phase: BuildPhase,
    /// term → id, ids assigned from 1 in order of first sight
    term_ids: HashMap<String, u32>,
    /// id - 1 → term
    terms: Vec<String>,
    stats: BuildStats,
    lexicon: Lexicon,
}

impl IndexBuild {
    pub fn new(paths: IndexPaths, run_size: usize) -> Result<Self> {
        if run_size == 0 {
            return Err(StoreError::Config("run_size must be at least 1".to_string()));
        }
        Ok(Self {
            paths,
            run_size,
            phase: BuildPhase::Empty,
            term_ids: HashMap::new(),
            terms: Vec::new(),
            stats: BuildStats::default(),
            lexicon: Lexicon::new(),
        })
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    pub fn run_size(&self) -> usize {
        self.run_size
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Id assigned to a normalized term, if it has been seen
    pub fn term_id(&self, term: &str) -> Option<u32> {
        self.term_ids.get(term).copied()
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Tokenize every document and append one triple per distinct term
    pub fn write_runs<I>(&mut self, docs: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: IndexDocument,
    {
        self.expect_phase(BuildPhase::Empty, "write_runs")?;

        let mut writer = BufWriter::new(File::create(&self.paths.scratch)?);
        for doc in docs {
            self.stats.documents += 1;
            for (term, freq) in extract_terms(doc.content()) {
                let term_id = self.assign_term_id(term);
                writer.write_all(&RunEntry::new(term_id, doc.id(), freq).encode())?;
                self.stats.entries += 1;
            }
        }
        writer.flush()?;
        drop(writer);

        self.stats.terms = self.terms.len();
        tracing::debug!(
            "Wrote {} scratch entries for {} documents ({} terms)",
            self.stats.entries,
            self.stats.documents,
            self.stats.terms
        );
        self.advance(BuildPhase::RunsWritten);
        Ok(())
    }

    /// Sort each `run_size` chunk of the scratch file in place
    pub fn sort_runs(&mut self) -> Result<()> {
        self.expect_phase(BuildPhase::RunsWritten, "sort_runs")?;
        self.check_scratch_len()?;

        let entries = self.stats.entries;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.paths.scratch)?;

        let mut start = 0u64;
        let mut buf = Vec::new();
        while start < entries {
            let count = (self.run_size as u64).min(entries - start);
            let offset = start * RunEntry::SIZE as u64;

            buf.resize(count as usize * RunEntry::SIZE, 0);
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;

            let mut run = RunEntry::decode_all(&buf);
            run.sort_by_key(RunEntry::sort_key);

            buf.clear();
            for entry in &run {
                buf.extend_from_slice(&entry.encode());
            }
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&buf)?;

            start += count;
        }
        file.flush()?;

        tracing::debug!(
            "Sorted {} runs of up to {} entries",
            entries.div_ceil(self.run_size as u64),
            self.run_size
        );
        self.advance(BuildPhase::RunsSorted);
        Ok(())
    }

    /// Merge adjacent runs pairwise, doubling the run length each pass
    pub fn merge_runs(&mut self) -> Result<()> {
        self.expect_phase(BuildPhase::RunsSorted, "merge_runs")?;
        self.check_scratch_len()?;

        let entries = self.stats.entries;
        let mut run_size = self.run_size as u64;
        while run_size < entries {
            tracing::debug!(
                "Merge pass {}: {} runs of {} entries",
                self.stats.merge_passes + 1,
                entries.div_ceil(run_size),
                run_size
            );
            merge_pass(&self.paths.scratch, run_size, entries)?;
            self.stats.merge_passes += 1;
            run_size *= 2;
        }

        self.advance(BuildPhase::Merged);
        Ok(())
    }

    /// Write postings and the lexicon, then remove the scratch file
    pub fn compact(&mut self) -> Result<()> {
        self.expect_phase(BuildPhase::Merged, "compact")?;
        self.check_scratch_len()?;

        let entries = self.stats.entries;
        let mut cursor = RunCursor::open(&self.paths.scratch, 0, entries)?;
        let mut writer = BufWriter::new(File::create(&self.paths.postings)?);

        let mut lexicon = Lexicon::new();
        let mut offset = 0u64;
        let mut current_term: Option<u32> = None;
        let mut span = LexiconEntry { count: 0, offset: 0 };

        while let Some(entry) = cursor.next_entry()? {
            if current_term != Some(entry.term_id) {
                if let Some(term_id) = current_term {
                    lexicon.insert(self.term_name(term_id)?, span);
                }
                current_term = Some(entry.term_id);
                span = LexiconEntry { count: 0, offset };
            }
            span.count += 1;

            writer.write_all(&Posting::from(entry).encode())?;
            offset += Posting::SIZE as u64;
        }
        if let Some(term_id) = current_term {
            lexicon.insert(self.term_name(term_id)?, span);
        }

        writer.flush()?;
        drop(writer);
        drop(cursor);

        lexicon.save(&self.paths.lexicon)?;
        fs::remove_file(&self.paths.scratch)?;

        tracing::debug!(
            "Compacted {} entries into {} postings lists ({} bytes)",
            entries,
            lexicon.len(),
            offset
        );
        self.lexicon = lexicon;
        self.advance(BuildPhase::Compacted);
        Ok(())
    }

    /// Hand out the lexicon of a completed build
    pub fn finish(self) -> Result<Lexicon> {
        self.expect_phase(BuildPhase::Compacted, "finish")?;
        Ok(self.lexicon)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn assign_term_id(&mut self, term: String) -> u32 {
        if let Some(&id) = self.term_ids.get(&term) {
            return id;
        }
        self.terms.push(term.clone());
        let id = self.terms.len() as u32;
        self.term_ids.insert(term, id);
        id
    }

    fn term_name(&self, term_id: u32) -> Result<&str> {
        term_id
            .checked_sub(1)
            .and_then(|i| self.terms.get(i as usize))
            .map(String::as_str)
            .ok_or_else(|| {
                StoreError::Integrity(format!("scratch entry refers to unknown term id {}", term_id))
            })
    }

    fn expect_phase(&self, expected: BuildPhase, step: &str) -> Result<()> {
        if self.phase != expected {
            return Err(StoreError::InvalidState(format!(
                "{} requires phase {:?}, build is in {:?}",
                step, expected, self.phase
            )));
        }
        Ok(())
    }

    fn advance(&mut self, next: BuildPhase) {
        tracing::trace!("Index build {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn check_scratch_len(&self) -> Result<()> {
        let on_disk = entry_count(&self.paths.scratch)?;
        if on_disk != self.stats.entries {
            return Err(StoreError::Integrity(format!(
                "scratch file holds {} entries, build wrote {}",
                on_disk, self.stats.entries
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Merge Pass
// =============================================================================

/// One pass: merge runs `[2k, 2k+1)` of length `run_size` into runs of
/// `2 * run_size`, copying an unpaired trailing run through unchanged
fn merge_pass(scratch: &Path, run_size: u64, entries: u64) -> Result<()> {
    let output = aux_path(scratch);
    {
        let mut writer = BufWriter::new(File::create(&output)?);

        let mut start = 0u64;
        while start < entries {
            let mid = (start + run_size).min(entries);
            let end = (start + 2 * run_size).min(entries);
            merge_pair(scratch, start, mid, end, &mut writer)?;
            start = end;
        }

        writer.flush()?;
    }

    fs::rename(&output, scratch)?;
    Ok(())
}

/// Stream-merge `[start, mid)` and `[mid, end)`; ties keep the left entry
fn merge_pair<W: Write>(scratch: &Path, start: u64, mid: u64, end: u64, out: &mut W) -> Result<()> {
    let mut left = RunCursor::open(scratch, start, mid)?;
    let mut right = RunCursor::open(scratch, mid, end)?;

    let mut l = left.next_entry()?;
    let mut r = right.next_entry()?;
    loop {
        match (l, r) {
            (Some(a), Some(b)) if a.sort_key() <= b.sort_key() => {
                out.write_all(&a.encode())?;
                l = left.next_entry()?;
            }
            (_, Some(b)) => {
                out.write_all(&b.encode())?;
                r = right.next_entry()?;
            }
            (Some(a), None) => {
                out.write_all(&a.encode())?;
                l = left.next_entry()?;
            }
            (None, None) => return Ok(()),
        }
    }
}

fn aux_path(scratch: &Path) -> PathBuf {
    let mut name = scratch.as_os_str().to_owned();
    name.push("_aux");
    PathBuf::from(name)
}
