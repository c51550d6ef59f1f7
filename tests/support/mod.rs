//! Shared fixtures for the dictionary integration tests.
//!
//! Each integration test binary compiles this module on its own and uses a
//! subset of the helpers.
#![allow(dead_code)]

use std::sync::Arc;

use termdict::writer::DictionaryWriter;
use termdict::{BlockTreeWriter, Directory, EncoderConfig, MemoryDirectory, TermStats};

/// Per-term stats derived from the term bytes and its write ordinal, so any
/// test can recompute the expected values without carrying a side table.
pub fn stats_for(term: &[u8], ord: usize) -> TermStats {
    let doc_freq = (term.len() as u32 % 7) + 1;
    let extra = term.iter().map(|&b| u64::from(b)).sum::<u64>() % 5;
    TermStats {
        doc_freq,
        total_term_freq: u64::from(doc_freq) + extra,
        postings_fp: ord as u64 * 11,
    }
}

/// Write one field holding `terms` (sorted ascending, no duplicates, at least
/// one term) as segment `segment` inside `dir`.
pub fn write_field(
    dir: &dyn Directory,
    segment: &str,
    field: &str,
    terms: &[Vec<u8>],
    config: EncoderConfig,
) {
    let mut writer = BlockTreeWriter::create(dir, segment, config).unwrap();
    writer.begin_field(field).unwrap();
    for (ord, term) in terms.iter().enumerate() {
        writer.add_term(term, stats_for(term, ord)).unwrap();
    }
    writer.end_field(terms.len() as u32).unwrap();
    writer.finish().unwrap();
}

/// `write_field` into a fresh in-memory directory.
pub fn dict_with_field(
    segment: &str,
    field: &str,
    terms: &[Vec<u8>],
    config: EncoderConfig,
) -> Arc<dyn Directory> {
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    write_field(dir.as_ref(), segment, field, terms, config);
    dir
}

/// Terms as owned byte vectors, for fixtures written as string literals.
pub fn terms(list: &[&str]) -> Vec<Vec<u8>> {
    list.iter().map(|t| t.as_bytes().to_vec()).collect()
}
