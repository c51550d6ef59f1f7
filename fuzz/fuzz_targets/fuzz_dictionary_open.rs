#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use termdict::formats::{index_file_name, terms_file_name};
use termdict::storage::{Directory, MemoryDirectory};
use termdict::{OpenOptions, TermDictReader, TermDictionary};

/// Interpret input bytes as a pair of dictionary files.
///
/// Layout:
/// - bytes 0..4: terms-file length (u32 LE, clamped to what is left)
/// - then that many bytes of terms file, rest becomes the index file
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let rest = &data[4..];
    let split = declared % (rest.len() + 1);
    let (terms, index) = rest.split_at(split);

    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    dir.atomic_write(&terms_file_name("seg"), terms).ok();
    dir.atomic_write(&index_file_name("seg"), index).ok();

    for verify in [false, true] {
        let options = OpenOptions {
            verify_checksum_on_open: verify,
        };
        let Ok(reader) = TermDictReader::open(dir.clone(), "seg", options) else {
            continue;
        };
        for field in reader.field_names() {
            if let Ok(mut cursor) = reader.cursor(&field) {
                for _ in 0..64 {
                    match cursor.next() {
                        Ok(true) => {}
                        _ => break,
                    }
                }
                let _ = cursor.seek_exact(b"probe");
                let _ = cursor.seek_ceil(b"probe");
            }
            let _ = reader.field_stats(&field);
        }
        let _ = reader.verify_checksums();
    }
});
