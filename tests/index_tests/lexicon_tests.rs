//! Tests for the Lexicon blob
//!
//! These tests verify:
//! - Encode/decode and save/load
//! - Header validation (magic, version, length, checksum)
//! - Iteration order and totals

use std::fs;
use std::path::PathBuf;

use invstore::index::{Lexicon, LexiconEntry};
use invstore::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_lexicon() -> Lexicon {
    let mut lexicon = Lexicon::new();
    lexicon.insert("delta", LexiconEntry { count: 4, offset: 40 });
    lexicon.insert("alpha", LexiconEntry { count: 3, offset: 0 });
    lexicon.insert("charlie", LexiconEntry { count: 1, offset: 24 });
    lexicon
}

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("words.lex");
    (temp_dir, path)
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_lookup_and_totals() {
    let lexicon = sample_lexicon();

    assert_eq!(lexicon.len(), 3);
    assert!(lexicon.contains("alpha"));
    assert!(!lexicon.contains("bravo"));
    assert_eq!(lexicon.get("charlie"), Some(&LexiconEntry { count: 1, offset: 24 }));
    assert_eq!(lexicon.postings_count(), 8);
}

#[test]
fn test_iter_is_lexicographic() {
    let lexicon = sample_lexicon();
    let terms: Vec<&str> = lexicon.iter().map(|(term, _)| term).collect();
    assert_eq!(terms, vec!["alpha", "charlie", "delta"]);
}

#[test]
fn test_encode_decode() {
    let lexicon = sample_lexicon();
    let blob = lexicon.encode().unwrap();

    assert_eq!(&blob[0..4], b"INVL");
    assert_eq!(&blob[4..6], &1u16.to_le_bytes());
    assert_eq!(Lexicon::decode(&blob).unwrap(), lexicon);
}

#[test]
fn test_empty_lexicon_encodes() {
    let lexicon = Lexicon::new();
    let blob = lexicon.encode().unwrap();
    assert!(Lexicon::decode(&blob).unwrap().is_empty());
}

#[test]
fn test_save_and_load() {
    let (_temp, path) = setup_temp_file();
    let lexicon = sample_lexicon();

    lexicon.save(&path).unwrap();

    assert_eq!(Lexicon::load(&path).unwrap(), lexicon);
    let mut staging = path.clone().into_os_string();
    staging.push(".partial");
    assert!(!PathBuf::from(staging).exists());
}

#[test]
fn test_save_overwrites() {
    let (_temp, path) = setup_temp_file();
    sample_lexicon().save(&path).unwrap();

    let mut replacement = Lexicon::new();
    replacement.insert("zulu", LexiconEntry { count: 9, offset: 0 });
    replacement.save(&path).unwrap();

    assert_eq!(Lexicon::load(&path).unwrap(), replacement);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_bad_magic() {
    let mut blob = sample_lexicon().encode().unwrap();
    blob[0] = b'X';
    assert!(matches!(Lexicon::decode(&blob), Err(StoreError::Integrity(_))));
}

#[test]
fn test_bad_version() {
    let mut blob = sample_lexicon().encode().unwrap();
    blob[4] = 99;
    assert!(matches!(Lexicon::decode(&blob), Err(StoreError::Integrity(_))));
}

#[test]
fn test_checksum_mismatch() {
    let mut blob = sample_lexicon().encode().unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0xFF;
    assert!(matches!(Lexicon::decode(&blob), Err(StoreError::Integrity(_))));
}

#[test]
fn test_truncated_blob() {
    let blob = sample_lexicon().encode().unwrap();

    let short_header = Lexicon::decode(&blob[..10]);
    assert!(matches!(short_header, Err(StoreError::Integrity(_))));

    let short_payload = Lexicon::decode(&blob[..blob.len() - 3]);
    assert!(matches!(short_payload, Err(StoreError::Integrity(_))));
}

#[test]
fn test_load_missing_file_is_io_error() {
    let (_temp, path) = setup_temp_file();
    assert!(matches!(Lexicon::load(&path), Err(StoreError::Io(_))));
}

#[test]
fn test_load_corrupt_file() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, b"not a lexicon at all").unwrap();
    assert!(matches!(Lexicon::load(&path), Err(StoreError::Integrity(_))));
}
