//! Benchmarks for cursor traffic: full iteration, point lookups, ceilings,
//! and the stats walk.
#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use termdict::storage::{Directory, MemoryDirectory};
use termdict::writer::DictionaryWriter;
use termdict::{
    BlockTreeWriter, EncoderConfig, OpenOptions, TermDictReader, TermDictionary, TermStats,
};

fn build_reader(count: usize) -> TermDictReader {
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    let mut writer =
        BlockTreeWriter::create(dir.as_ref(), "seg", EncoderConfig::default()).unwrap();
    writer.begin_field("body").unwrap();
    for i in 0..count {
        let term = format!("field{:02}term{i:06}", i % 7).into_bytes();
        writer
            .add_term(
                &term,
                TermStats {
                    doc_freq: (i % 100 + 1) as u32,
                    total_term_freq: (i % 100 + 1) as u64 * 3,
                    postings_fp: i as u64 * 13,
                },
            )
            .unwrap();
    }
    writer.end_field(count as u32).unwrap();
    writer.finish().unwrap();
    TermDictReader::open(dir, "seg", OpenOptions::default()).unwrap()
}

fn bench_cursor(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor");
    let reader = build_reader(50_000);

    let hits: Vec<Vec<u8>> = (0..50_000usize)
        .step_by(97)
        .map(|i| format!("field{:02}term{i:06}", i % 7).into_bytes())
        .collect();
    let misses: Vec<Vec<u8>> = hits
        .iter()
        .map(|t| {
            let mut probe = t.clone();
            probe.push(0);
            probe
        })
        .collect();

    group.bench_function("iterate_50k", |b| {
        b.iter(|| {
            let mut cursor = reader.cursor("body").unwrap();
            let mut n = 0u64;
            while cursor.next().unwrap() {
                n += cursor.term().len() as u64;
            }
            std::hint::black_box(n);
        });
    });

    group.bench_function("seek_exact_ascending", |b| {
        b.iter(|| {
            let mut cursor = reader.cursor("body").unwrap();
            let mut found = 0u64;
            for probe in &hits {
                if cursor.seek_exact(probe).unwrap() {
                    found += 1;
                }
            }
            std::hint::black_box(found);
        });
    });

    // Ascending probes reuse the frame stack; shuffled ones defeat it.
    let mut shuffled = hits.clone();
    shuffled.shuffle(&mut StdRng::seed_from_u64(0x7e51));
    group.bench_function("seek_exact_shuffled", |b| {
        b.iter(|| {
            let mut cursor = reader.cursor("body").unwrap();
            let mut found = 0u64;
            for probe in &shuffled {
                if cursor.seek_exact(probe).unwrap() {
                    found += 1;
                }
            }
            std::hint::black_box(found);
        });
    });

    group.bench_function("seek_ceil_misses", |b| {
        b.iter(|| {
            let mut cursor = reader.cursor("body").unwrap();
            let mut landed = 0u64;
            for probe in &misses {
                let _ = cursor.seek_ceil(probe).unwrap();
                landed += cursor.term().len() as u64;
            }
            std::hint::black_box(landed);
        });
    });

    group.bench_function("field_stats_walk_50k", |b| {
        b.iter(|| {
            let stats = reader.field_stats("body").unwrap();
            std::hint::black_box(stats.total_block_count);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_cursor);
criterion_main!(benches);
