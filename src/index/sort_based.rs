//! Sort-Based Inverted Index
//!
//! Owns the three file locations of one index and drives a full
//! [`IndexBuild`] over a document stream.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;

use super::{DocId, IndexBuild, IndexDocument, InvertedIndexReader, Lexicon};

/// Locations of an index's lexicon, postings and scratch files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub lexicon: PathBuf,
    pub postings: PathBuf,
    pub scratch: PathBuf,
}

impl IndexPaths {
    /// Scratch file defaults to the postings path with `.tmp` appended
    pub fn new(lexicon: impl Into<PathBuf>, postings: impl Into<PathBuf>) -> Self {
        let postings = postings.into();
        let mut scratch = OsString::from(postings.as_os_str());
        scratch.push(".tmp");
        Self {
            lexicon: lexicon.into(),
            postings,
            scratch: PathBuf::from(scratch),
        }
    }

    pub fn with_scratch(mut self, scratch: impl Into<PathBuf>) -> Self {
        self.scratch = scratch.into();
        self
    }

    /// `{dir}/{name}.lex`, `{dir}/{name}.inf`, `{dir}/{name}.tmp`
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self {
            lexicon: dir.join(format!("{}.lex", name)),
            postings: dir.join(format!("{}.inf", name)),
            scratch: dir.join(format!("{}.tmp", name)),
        }
    }
}

/// External sort-based inverted index
#[derive(Debug, Clone)]
pub struct SortBasedIndex {
    paths: IndexPaths,
    run_size: usize,
}

impl SortBasedIndex {
    pub fn new(paths: IndexPaths, run_size: usize) -> Self {
        Self { paths, run_size }
    }

    /// Index files named `name` under the configured data directory
    pub fn from_config(config: &Config, name: &str) -> Self {
        Self::new(IndexPaths::in_dir(&config.data_dir, name), config.run_size)
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn run_size(&self) -> usize {
        self.run_size
    }

    /// Rebuild the postings file and lexicon from `docs`
    ///
    /// Existing index files are replaced. The document stream is consumed
    /// exactly once.
    pub fn create_inverted_file<I>(&self, docs: I) -> Result<Lexicon>
    where
        I: IntoIterator,
        I::Item: IndexDocument,
    {
        let mut build = IndexBuild::new(self.paths.clone(), self.run_size)?;
        build.write_runs(docs)?;
        build.sort_runs()?;
        build.merge_runs()?;
        build.compact()?;

        let stats = build.stats().clone();
        let lexicon = build.finish()?;
        tracing::info!(
            "Built inverted index {}: {} documents, {} terms, {} postings, {} merge passes",
            self.paths.postings.display(),
            stats.documents,
            stats.terms,
            stats.entries,
            stats.merge_passes
        );
        Ok(lexicon)
    }

    pub fn open_reader(&self) -> Result<InvertedIndexReader> {
        InvertedIndexReader::open(&self.paths.lexicon, &self.paths.postings)
    }

    /// Documents containing `term`, in ascending id order
    pub fn retrieve_docs(&self, term: &str) -> Result<Vec<DocId>> {
        self.open_reader()?.retrieve_docs(term)
    }
}

