//! Inverted Index Module
//!
//! External sort-based construction of a term → postings index whose
//! intermediate data never has to fit in memory.
//!
//! ## Build Pipeline
//! ```text
//!  documents ──▶ write_runs ──▶ sort_runs ──▶ merge_runs ──▶ compact
//!                   │              │              │             │
//!             scratch file    each run of     pairwise      postings file
//!             (term, doc,     run_size        passes until  + lexicon blob
//!              freq) triples  sorted in place one run       (scratch removed)
//! ```
//!
//! ## Files
//! ```text
//! scratch   [term_id: u32][doc_id: u32][freq: u32]   native order, 12 bytes
//! postings  [doc_id: u32][freq: u32]                 little-endian, 8 bytes,
//!                                                    contiguous per term
//! lexicon   magic | version | crc32 | len | bincode(term → (count, offset))
//! ```
//!
//! Peak memory during the build is one run plus the term table.

mod build;
mod entry;
mod lexicon;
mod reader;
mod run;
mod sort_based;
mod verify;

use std::collections::HashMap;

pub use build::{BuildPhase, BuildStats, IndexBuild};
pub use entry::{Posting, RunEntry};
pub use lexicon::{Lexicon, LexiconEntry};
pub use reader::InvertedIndexReader;
pub use sort_based::{IndexPaths, SortBasedIndex};
pub use verify::{dump_runs, verify_runs, verify_sorted};

/// Document id as stored in postings
pub type DocId = u32;

/// A document that can be fed to the indexer
pub trait IndexDocument {
    /// Stable integer id
    fn id(&self) -> DocId;

    /// Raw text content
    fn content(&self) -> &str;
}

impl<T: IndexDocument + ?Sized> IndexDocument for &T {
    fn id(&self) -> DocId {
        (**self).id()
    }

    fn content(&self) -> &str {
        (**self).content()
    }
}

/// Plain in-memory document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pub id: DocId,
    pub content: String,
}

impl TextDocument {
    pub fn new(id: DocId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

impl IndexDocument for TextDocument {
    fn id(&self) -> DocId {
        self.id
    }

    fn content(&self) -> &str {
        &self.content
    }
}

/// Normalize a term the way indexing does (lower-cased)
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Split content on whitespace and count normalized terms
///
/// Terms come back in order of first occurrence.
pub fn extract_terms(content: &str) -> Vec<(String, u32)> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut terms: Vec<(String, u32)> = Vec::new();

    for word in content.split_whitespace() {
        let term = normalize_term(word);
        match positions.get(&term) {
            Some(&pos) => terms[pos].1 += 1,
            None => {
                positions.insert(term.clone(), terms.len());
                terms.push((term, 1));
            }
        }
    }

    terms
}
