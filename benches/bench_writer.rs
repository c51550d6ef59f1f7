//! Benchmarks for `termdict::writer` (segment encoding).
#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;
use termdict::storage::{Directory, FsDirectory, MemoryDirectory};
use termdict::writer::DictionaryWriter;
use termdict::{BlockTreeWriter, EncoderConfig, TermStats};

fn sample_terms(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("field{:02}term{i:06}", i % 7).into_bytes())
        .collect()
}

fn sample_stats(i: usize) -> TermStats {
    TermStats {
        doc_freq: (i % 100 + 1) as u32,
        total_term_freq: (i % 100 + 1) as u64 * 3,
        postings_fp: i as u64 * 13,
    }
}

fn write_segment(dir: &dyn Directory, terms: &[Vec<u8>], config: EncoderConfig) {
    let mut writer = BlockTreeWriter::create(dir, "seg", config).unwrap();
    writer.begin_field("body").unwrap();
    for (i, term) in terms.iter().enumerate() {
        writer.add_term(term, sample_stats(i)).unwrap();
    }
    writer.end_field(terms.len() as u32).unwrap();
    writer.finish().unwrap();
}

fn bench_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer");
    let terms = sample_terms(50_000);

    group.bench_function("write_50k_memory", |b| {
        b.iter_batched(
            MemoryDirectory::new,
            |dir| {
                write_segment(&dir, &terms, EncoderConfig::default());
                std::hint::black_box(dir);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("write_50k_memory_small_blocks", |b| {
        b.iter_batched(
            MemoryDirectory::new,
            |dir| {
                write_segment(
                    &dir,
                    &terms,
                    EncoderConfig {
                        min_items_in_block: 2,
                        max_items_in_block: 4,
                    },
                );
                std::hint::black_box(dir);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("write_50k_fs", |b| {
        b.iter_batched(
            || {
                let tmp = tempfile::tempdir().unwrap();
                let dir: Arc<dyn Directory> = Arc::new(FsDirectory::new(tmp.path()).unwrap());
                (tmp, dir)
            },
            |(_tmp, dir)| {
                write_segment(dir.as_ref(), &terms, EncoderConfig::default());
                drop(dir);
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_writer);
criterion_main!(benches);
