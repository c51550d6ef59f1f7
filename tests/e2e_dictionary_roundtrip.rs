//! Write a segment, reopen it, and check everything the reader exposes:
//! field table, metadata sums, full enumeration, and cursor lifecycle errors.

mod support;

use std::sync::Arc;

use termdict::registry::{BLOCKTREE_FORMAT_ALIAS, BLOCKTREE_FORMAT_NAME};
use termdict::writer::DictionaryWriter;
use termdict::{
    BlockTreeWriter, Directory, EncoderConfig, FormatRegistry, FsDirectory, MemoryDirectory,
    OpenOptions, TermDictError, TermDictReader, TermDictionary, TermStats,
};

use support::{dict_with_field, stats_for, terms};

fn field_terms() -> Vec<(String, Vec<Vec<u8>>)> {
    let title = terms(&["autumn", "spring", "summer", "winter"]);
    let body: Vec<Vec<u8>> = (0..120).map(|i| format!("w{i:03}").into_bytes()).collect();
    let id = terms(&["doc-0001"]);
    vec![
        ("title".to_string(), title),
        ("body".to_string(), body),
        ("id".to_string(), id),
    ]
}

fn write_segment(dir: &dyn Directory, segment: &str) {
    let mut writer = BlockTreeWriter::create(dir, segment, EncoderConfig::default()).unwrap();
    for (field, terms) in field_terms() {
        writer.begin_field(&field).unwrap();
        for (ord, term) in terms.iter().enumerate() {
            writer.add_term(term, stats_for(term, ord)).unwrap();
        }
        writer.end_field(terms.len() as u32).unwrap();
    }
    writer.finish().unwrap();
}

fn check_segment(reader: &dyn TermDictionary) {
    assert_eq!(reader.field_names(), vec!["body", "id", "title"]);

    for (field, terms) in field_terms() {
        let expected: Vec<TermStats> = terms
            .iter()
            .enumerate()
            .map(|(ord, t)| stats_for(t, ord))
            .collect();
        let sum_doc_freq: u64 = expected.iter().map(|s| u64::from(s.doc_freq)).sum();
        let sum_ttf: u64 = expected.iter().map(|s| s.total_term_freq).sum();

        let meta = reader.field_meta(&field).unwrap();
        assert_eq!(meta.name, field);
        assert_eq!(meta.num_terms, terms.len() as u64);
        assert_eq!(meta.doc_count, terms.len() as u32);
        assert_eq!(meta.sum_doc_freq, sum_doc_freq);
        assert_eq!(meta.sum_total_term_freq, sum_ttf);
        assert_eq!(meta.min_term, terms[0]);
        assert_eq!(meta.max_term, terms[terms.len() - 1]);

        let mut cursor = reader.cursor(&field).unwrap();
        for (ord, term) in terms.iter().enumerate() {
            assert!(cursor.next().unwrap(), "field {field} ended at ordinal {ord}");
            assert_eq!(cursor.term(), term.as_slice());
            assert_eq!(cursor.stats().unwrap(), expected[ord]);
        }
        assert!(!cursor.next().unwrap());
        assert!(!cursor.next().unwrap());

        let stats = reader.field_stats(&field).unwrap();
        assert_eq!(stats.field, field);
        assert_eq!(stats.total_term_count, terms.len() as u64);
        assert_eq!(
            stats.total_term_bytes,
            terms.iter().map(|t| t.len() as u64).sum::<u64>()
        );
        assert!(stats.index_num_bytes > 0);
        assert!(stats.total_block_count > 0);
    }
}

#[test]
fn multi_field_segment_roundtrip_in_memory() {
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    write_segment(dir.as_ref(), "seg0");
    let reader = TermDictReader::open(dir, "seg0", OpenOptions::default()).unwrap();
    check_segment(&reader);
    reader.verify_checksums().unwrap();
}

#[test]
fn registry_roundtrip_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::with_defaults();

    {
        let dir = FsDirectory::new(tmp.path()).unwrap();
        let mut writer = registry
            .create(BLOCKTREE_FORMAT_NAME, &dir, "seg4", EncoderConfig::default())
            .unwrap();
        for (field, terms) in field_terms() {
            writer.begin_field(&field).unwrap();
            for (ord, term) in terms.iter().enumerate() {
                writer.add_term(term, stats_for(term, ord)).unwrap();
            }
            writer.end_field(terms.len() as u32).unwrap();
        }
        writer.finish().unwrap();
    }

    // The alias recorded by older segment metadata opens the same files.
    let dir: Arc<dyn Directory> = Arc::new(FsDirectory::new(tmp.path()).unwrap());
    let reader = registry
        .open(
            BLOCKTREE_FORMAT_ALIAS,
            dir,
            "seg4",
            OpenOptions {
                verify_checksum_on_open: true,
            },
        )
        .unwrap();
    check_segment(reader.as_ref());
}

#[test]
fn unknown_field_is_reported_not_found() {
    let dir = dict_with_field("seg1", "body", &terms(&["one", "two"]), EncoderConfig::default());
    let reader = TermDictReader::open(dir, "seg1", OpenOptions::default()).unwrap();

    assert!(reader.field_meta("missing").is_none());
    assert!(matches!(
        reader.cursor("missing"),
        Err(TermDictError::NotFound(_))
    ));
    assert!(matches!(
        reader.field_stats("missing"),
        Err(TermDictError::NotFound(_))
    ));
}

#[test]
fn cursors_on_one_reader_are_independent() {
    let list: Vec<Vec<u8>> = (0..60).map(|i| format!("item{i:02}").into_bytes()).collect();
    let dir = dict_with_field("seg2", "body", &list, EncoderConfig::default());
    let reader = TermDictReader::open(dir, "seg2", OpenOptions::default()).unwrap();

    let mut ahead = reader.cursor("body").unwrap();
    let mut behind = reader.cursor("body").unwrap();

    for _ in 0..10 {
        assert!(ahead.next().unwrap());
    }
    assert_eq!(ahead.term(), b"item09");

    assert!(behind.next().unwrap());
    assert_eq!(behind.term(), b"item00");
    assert_eq!(ahead.term(), b"item09");

    assert!(behind.seek_exact(b"item42").unwrap());
    assert!(ahead.next().unwrap());
    assert_eq!(ahead.term(), b"item10");
    assert_eq!(behind.term(), b"item42");
}

#[test]
fn field_without_terms_is_dropped() {
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    {
        let mut writer =
            BlockTreeWriter::create(dir.as_ref(), "seg3", EncoderConfig::default()).unwrap();
        writer.begin_field("ghost").unwrap();
        writer.end_field(0).unwrap();
        writer.begin_field("real").unwrap();
        for (ord, term) in terms(&["ant", "bee", "cat"]).iter().enumerate() {
            writer.add_term(term, stats_for(term, ord)).unwrap();
        }
        writer.end_field(3).unwrap();
        writer.finish().unwrap();
    }
    let reader = TermDictReader::open(dir, "seg3", OpenOptions::default()).unwrap();
    assert_eq!(reader.field_names(), vec!["real"]);
}

#[test]
fn cursor_surfaces_lifecycle_errors() {
    let dir = dict_with_field("seg5", "body", &terms(&["only"]), EncoderConfig::default());
    let reader = TermDictReader::open(dir, "seg5", OpenOptions::default()).unwrap();
    let mut cursor = reader.cursor("body").unwrap();

    assert_eq!(cursor.term(), b"");
    assert!(matches!(
        cursor.stats(),
        Err(TermDictError::InvalidState(_))
    ));

    assert!(cursor.next().unwrap());
    assert!(matches!(cursor.ord(), Err(TermDictError::NotSupported(_))));

    // Exhaust the field, then check stats is refused again at the end.
    assert!(!cursor.next().unwrap());
    assert!(matches!(
        cursor.stats(),
        Err(TermDictError::InvalidState(_))
    ));
}
