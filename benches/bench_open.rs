//! Benchmarks for segment open: the fast path that defers the body checksum
//! against the verified path that streams the whole terms file.
#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use termdict::storage::{Directory, FsDirectory, MemoryDirectory};
use termdict::writer::DictionaryWriter;
use termdict::{
    BlockTreeWriter, EncoderConfig, OpenOptions, TermDictReader, TermDictionary, TermStats,
};

fn write_segment(dir: &dyn Directory, fields: usize, terms_per_field: usize) {
    let mut writer =
        BlockTreeWriter::create(dir, "seg", EncoderConfig::default()).unwrap();
    for f in 0..fields {
        writer.begin_field(&format!("field{f:02}")).unwrap();
        for i in 0..terms_per_field {
            let term = format!("term{i:08}").into_bytes();
            writer
                .add_term(
                    &term,
                    TermStats {
                        doc_freq: (i % 50 + 1) as u32,
                        total_term_freq: (i % 50 + 1) as u64 * 2,
                        postings_fp: i as u64 * 9,
                    },
                )
                .unwrap();
        }
        writer.end_field(terms_per_field as u32).unwrap();
    }
    writer.finish().unwrap();
}

fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");

    let mem: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    write_segment(mem.as_ref(), 8, 25_000);

    let tmp = tempfile::tempdir().unwrap();
    let fs: Arc<dyn Directory> = Arc::new(FsDirectory::new(tmp.path()).unwrap());
    write_segment(fs.as_ref(), 8, 25_000);

    group.bench_function("fast_open_200k_memory", |b| {
        b.iter(|| {
            let reader =
                TermDictReader::open(mem.clone(), "seg", OpenOptions::default()).unwrap();
            std::hint::black_box(reader.field_names().len());
        });
    });

    group.bench_function("verified_open_200k_memory", |b| {
        b.iter(|| {
            let reader = TermDictReader::open(
                mem.clone(),
                "seg",
                OpenOptions {
                    verify_checksum_on_open: true,
                },
            )
            .unwrap();
            std::hint::black_box(reader.field_names().len());
        });
    });

    group.bench_function("fast_open_200k_fs", |b| {
        b.iter(|| {
            let reader =
                TermDictReader::open(fs.clone(), "seg", OpenOptions::default()).unwrap();
            std::hint::black_box(reader.field_names().len());
        });
    });

    group.bench_function("verified_open_200k_fs", |b| {
        b.iter(|| {
            let reader = TermDictReader::open(
                fs.clone(),
                "seg",
                OpenOptions {
                    verify_checksum_on_open: true,
                },
            )
            .unwrap();
            std::hint::black_box(reader.field_names().len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_open);
criterion_main!(benches);
