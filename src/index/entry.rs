//! Fixed-width scratch and postings entries.

use bytes::{Buf, BufMut};

use super::DocId;

/// One `(term, document, frequency)` triple of the scratch file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunEntry {
    pub term_id: u32,
    pub doc_id: DocId,
    pub freq: u32,
}

impl RunEntry {
    /// TermId (4) + DocId (4) + Freq (4)
    pub const SIZE: usize = 12;

    pub fn new(term_id: u32, doc_id: DocId, freq: u32) -> Self {
        Self {
            term_id,
            doc_id,
            freq,
        }
    }

    /// Ordering used by run sorting and merging
    pub fn sort_key(&self) -> (u32, DocId) {
        (self.term_id, self.doc_id)
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut out = &mut buf[..];
        out.put_u32_ne(self.term_id);
        out.put_u32_ne(self.doc_id);
        out.put_u32_ne(self.freq);
        buf
    }

    pub fn decode(bytes: &[u8; Self::SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            term_id: buf.get_u32_ne(),
            doc_id: buf.get_u32_ne(),
            freq: buf.get_u32_ne(),
        }
    }

    /// Decode a buffer holding whole entries
    pub fn decode_all(bytes: &[u8]) -> Vec<Self> {
        bytes
            .chunks_exact(Self::SIZE)
            .map(|chunk| {
                let mut raw = [0u8; Self::SIZE];
                raw.copy_from_slice(chunk);
                Self::decode(&raw)
            })
            .collect()
    }
}

/// One `(document, frequency)` pair of a postings list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub freq: u32,
}

impl Posting {
    /// DocId (4) + Freq (4)
    pub const SIZE: usize = 8;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut out = &mut buf[..];
        out.put_u32_le(self.doc_id);
        out.put_u32_le(self.freq);
        buf
    }

    /// Decode a buffer holding whole postings
    pub fn decode_all(bytes: &[u8]) -> Vec<Self> {
        let mut buf = bytes;
        let mut postings = Vec::with_capacity(bytes.len() / Self::SIZE);
        while buf.remaining() >= Self::SIZE {
            postings.push(Self {
                doc_id: buf.get_u32_le(),
                freq: buf.get_u32_le(),
            });
        }
        postings
    }
}

impl From<RunEntry> for Posting {
    fn from(entry: RunEntry) -> Self {
        Self {
            doc_id: entry.doc_id,
            freq: entry.freq,
        }
    }
}
