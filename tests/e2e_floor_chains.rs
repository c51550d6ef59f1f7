//! Floor-chain coverage. Tiny block limits force a shared-prefix run to be
//! cut into a chain of sibling blocks, keyed by lead label from the head
//! block's directory. Seeks must pick the right sibling and iteration must
//! walk through every boundary, including back out into the parent.

mod support;

use termdict::{
    EncoderConfig, OpenOptions, SeekStatus, TermDictReader, TermDictionary,
};

use support::{dict_with_field, stats_for, terms};

/// "a", "ka".."kl", "q", "r". With 2..4 items per block the twelve `k` terms
/// become one chain of five siblings: {ka kb} {kc kd} {ke kf} {kg kh}
/// {ki kj kk kl}, while the singles stay in the root next to the pointer.
fn chain_terms() -> Vec<Vec<u8>> {
    let mut all = terms(&["a"]);
    all.extend((b'a'..=b'l').map(|c| vec![b'k', c]));
    all.extend(terms(&["q", "r"]));
    all
}

fn tiny_blocks() -> EncoderConfig {
    EncoderConfig {
        min_items_in_block: 2,
        max_items_in_block: 4,
    }
}

#[test]
fn chain_shape_is_reported_by_field_stats() {
    let dir = dict_with_field("seg0", "body", &chain_terms(), tiny_blocks());
    let reader = TermDictReader::open(dir, "seg0", OpenOptions::default()).unwrap();

    let stats = reader.field_stats("body").unwrap();
    assert_eq!(stats.total_term_count, 15);
    assert_eq!(stats.total_term_bytes, 3 + 24);
    assert_eq!(stats.total_block_count, 6);
    assert_eq!(stats.non_floor_block_count, 1);
    assert_eq!(stats.floor_block_count, 1);
    assert_eq!(stats.floor_sub_block_count, 5);
    assert_eq!(stats.mixed_block_count, 1);
    assert_eq!(stats.terms_only_block_count, 5);
    assert_eq!(stats.sub_blocks_only_block_count, 0);
    assert_eq!(stats.block_count_by_prefix_len, vec![1, 5]);
}

#[test]
fn exact_seeks_pick_the_right_sibling() {
    let all = chain_terms();
    let dir = dict_with_field("seg1", "body", &all, tiny_blocks());
    let reader = TermDictReader::open(dir, "seg1", OpenOptions::default()).unwrap();
    let mut cursor = reader.cursor("body").unwrap();

    // Every term is found, whichever sibling holds it.
    for (i, term) in all.iter().enumerate() {
        assert!(cursor.seek_exact(term).unwrap(), "lost {term:?}");
        assert_eq!(cursor.term(), term.as_slice());
        assert_eq!(cursor.stats().unwrap(), stats_for(term, i));
    }

    // Probes below the head, between siblings, and past the tail all miss.
    assert!(!cursor.seek_exact(b"k").unwrap());
    assert!(!cursor.seek_exact(b"k@").unwrap());
    assert!(!cursor.seek_exact(b"kb\x00").unwrap());
    assert!(!cursor.seek_exact(b"km").unwrap());
    assert!(!cursor.seek_exact(b"kz").unwrap());
    assert!(cursor.seek_exact(b"kl").unwrap());
}

#[test]
fn ceiling_seeks_cross_sibling_boundaries() {
    let dir = dict_with_field("seg2", "body", &chain_terms(), tiny_blocks());
    let reader = TermDictReader::open(dir, "seg2", OpenOptions::default()).unwrap();
    let mut cursor = reader.cursor("body").unwrap();

    assert_eq!(cursor.seek_ceil(b"k").unwrap(), SeekStatus::NotFound);
    assert_eq!(cursor.term(), b"ka");

    // Past the last term of one sibling, the ceiling is in the next one.
    assert_eq!(cursor.seek_ceil(b"kd\x00").unwrap(), SeekStatus::NotFound);
    assert_eq!(cursor.term(), b"ke");
    assert_eq!(cursor.seek_ceil(b"kh\x00").unwrap(), SeekStatus::NotFound);
    assert_eq!(cursor.term(), b"ki");

    // Past the whole chain, the ceiling is back in the parent block.
    assert_eq!(cursor.seek_ceil(b"kl\x00").unwrap(), SeekStatus::NotFound);
    assert_eq!(cursor.term(), b"q");
    assert_eq!(cursor.seek_ceil(b"r\x00").unwrap(), SeekStatus::End);
}

#[test]
fn iteration_walks_every_boundary() {
    let all = chain_terms();
    let dir = dict_with_field("seg3", "body", &all, tiny_blocks());
    let reader = TermDictReader::open(dir, "seg3", OpenOptions::default()).unwrap();

    let mut cursor = reader.cursor("body").unwrap();
    let mut walked = Vec::new();
    while cursor.next().unwrap() {
        walked.push(cursor.term().to_vec());
    }
    assert_eq!(walked, all);

    // Pick up mid-chain and run to the end.
    assert!(cursor.seek_exact(b"kj").unwrap());
    for expected in [&b"kk"[..], b"kl", b"q", b"r"] {
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.term(), expected);
    }
    assert!(!cursor.next().unwrap());
}

#[test]
fn chains_survive_checksum_verification() {
    let dir = dict_with_field("seg4", "body", &chain_terms(), tiny_blocks());
    let reader = TermDictReader::open(
        dir,
        "seg4",
        OpenOptions {
            verify_checksum_on_open: true,
        },
    )
    .unwrap();
    reader.verify_checksums().unwrap();

    let stats = reader.field_stats("body").unwrap();
    assert_eq!(stats.floor_sub_block_count, 5);
}
