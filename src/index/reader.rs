//! Read side of a built index: lexicon in memory, postings on disk.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, StoreError};

use super::{normalize_term, DocId, Lexicon, Posting};

pub struct InvertedIndexReader {
    lexicon: Lexicon,
    postings: BufReader<File>,
    postings_len: u64,
}

impl InvertedIndexReader {
    /// Load the lexicon blob and open the postings file
    pub fn open(lexicon_path: &Path, postings_path: &Path) -> Result<Self> {
        let lexicon = Lexicon::load(lexicon_path)?;
        let file = File::open(postings_path)?;
        let postings_len = file.metadata()?.len();

        tracing::debug!(
            "Opened inverted index {} ({} terms, {} bytes of postings)",
            postings_path.display(),
            lexicon.len(),
            postings_len
        );

        Ok(Self {
            lexicon,
            postings: BufReader::new(file),
            postings_len,
        })
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Postings of `term`; empty when the term was never indexed
    pub fn retrieve_postings(&mut self, term: &str) -> Result<Vec<Posting>> {
        let term = normalize_term(term);
        let entry = match self.lexicon.get(&term) {
            Some(entry) => *entry,
            None => return Ok(Vec::new()),
        };

        let len = entry.count as u64 * Posting::SIZE as u64;
        let end = entry.offset.checked_add(len).unwrap_or(u64::MAX);
        if end > self.postings_len {
            return Err(StoreError::Integrity(format!(
                "postings for '{}' span [{}, {}) past end of file ({} bytes)",
                term, entry.offset, end, self.postings_len
            )));
        }

        let mut buf = vec![0u8; len as usize];
        self.postings.seek(SeekFrom::Start(entry.offset))?;
        self.postings.read_exact(&mut buf)?;
        Ok(Posting::decode_all(&buf))
    }

    /// Document ids containing `term`, in postings order
    pub fn retrieve_docs(&mut self, term: &str) -> Result<Vec<DocId>> {
        Ok(self
            .retrieve_postings(term)?
            .into_iter()
            .map(|p| p.doc_id)
            .collect())
    }
}
