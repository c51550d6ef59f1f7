#![no_main]

use libfuzzer_sys::fuzz_target;
use std::collections::BTreeSet;
use std::sync::Arc;
use termdict::formats::terms_file_name;
use termdict::storage::{read_file, Directory, MemoryDirectory};
use termdict::writer::DictionaryWriter;
use termdict::{
    BlockTreeWriter, EncoderConfig, OpenOptions, TermDictReader, TermDictionary, TermStats,
};

/// Write a real segment from fuzzer-chosen terms, damage one byte of the
/// terms file, and drive the cursor over it. Decoding may fail, but it must
/// fail with an error.
///
/// Layout:
/// - byte 0: block size seed, byte 1: extra block headroom seed
/// - bytes 2..6: damage offset (u32 LE, wrapped to the file length)
/// - then terms as [len byte][len % 16 bytes] chunks
fuzz_target!(|data: &[u8]| {
    if data.len() < 6 {
        return;
    }
    let min = (data[0] % 8 + 2) as usize;
    let max = 2 * (min - 1) + (data[1] % 8) as usize;
    let damage = u32::from_le_bytes([data[2], data[3], data[4], data[5]]) as usize;

    let mut terms: BTreeSet<Vec<u8>> = BTreeSet::new();
    let mut i = 6usize;
    while i < data.len() && terms.len() < 256 {
        let len = (data[i] % 16) as usize;
        i += 1;
        let end = (i + len).min(data.len());
        terms.insert(data[i..end].to_vec());
        i = end;
    }
    if terms.is_empty() {
        return;
    }

    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    let config = EncoderConfig {
        min_items_in_block: min,
        max_items_in_block: max,
    };
    let mut writer = BlockTreeWriter::create(dir.as_ref(), "seg", config).unwrap();
    writer.begin_field("body").unwrap();
    for (ord, term) in terms.iter().enumerate() {
        let stats = TermStats {
            doc_freq: (term.len() % 5 + 1) as u32,
            total_term_freq: (term.len() % 5 + 1) as u64,
            postings_fp: ord as u64 * 7,
        };
        writer.add_term(term, stats).unwrap();
    }
    writer.end_field(terms.len() as u32).unwrap();
    writer.finish().unwrap();

    let path = terms_file_name("seg");
    let mut bytes = read_file(dir.as_ref(), &path).unwrap();
    let at = damage % bytes.len();
    bytes[at] ^= 0x5c;
    dir.atomic_write(&path, &bytes).unwrap();

    let Ok(reader) = TermDictReader::open(dir, "seg", OpenOptions::default()) else {
        return;
    };
    if let Ok(mut cursor) = reader.cursor("body") {
        for _ in 0..512 {
            match cursor.next() {
                Ok(true) => {
                    let _ = cursor.stats();
                }
                _ => break,
            }
        }
        for probe in terms.iter().take(16) {
            if cursor.seek_exact(probe).is_err() {
                break;
            }
        }
        let _ = cursor.seek_ceil(b"probe");
    }
    let _ = reader.field_stats("body");
    let _ = reader.verify_checksums();
});
