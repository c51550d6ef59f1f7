//! Random interleavings of `next`, `seek_exact`, and `seek_ceil` against one
//! cursor, checked with a model that tracks where the cursor must be. After a
//! failed exact seek the position is unspecified, so the model stops
//! predicting until the cursor lands somewhere definite again.

mod support;

use proptest::collection::vec as pvec;
use proptest::prelude::*;
use termdict::{EncoderConfig, OpenOptions, SeekStatus, TermDictReader, TermDictionary};

use support::{dict_with_field, stats_for};

#[derive(Debug, Clone)]
enum Op {
    Next,
    /// Exact seek to the term at this (wrapped) ordinal; always a hit.
    ExactAt(usize),
    /// Exact seek to arbitrary bytes.
    Exact(Vec<u8>),
    /// Ceiling seek to the term at this (wrapped) ordinal; always Found.
    CeilAt(usize),
    /// Ceiling seek to arbitrary bytes.
    Ceil(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    Fresh,
    OnTerm(usize),
    Unpredicted,
    Done,
}

fn term_bytes() -> impl Strategy<Value = Vec<u8>> {
    pvec(
        prop_oneof![Just(b'a'), Just(b'b'), Just(b'c'), Just(0x00u8)],
        0..8,
    )
}

fn term_sets() -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::btree_set(term_bytes(), 1..80)
        .prop_map(|set| set.into_iter().collect())
}

fn op_sequences() -> impl Strategy<Value = Vec<Op>> {
    pvec(
        prop_oneof![
            3 => Just(Op::Next),
            1 => any::<usize>().prop_map(Op::ExactAt),
            1 => term_bytes().prop_map(Op::Exact),
            1 => any::<usize>().prop_map(Op::CeilAt),
            1 => term_bytes().prop_map(Op::Ceil),
        ],
        1..80,
    )
}

fn block_configs() -> impl Strategy<Value = EncoderConfig> {
    prop_oneof![
        Just(EncoderConfig {
            min_items_in_block: 2,
            max_items_in_block: 4,
        }),
        Just(EncoderConfig::default()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: None,
        cases: 96,
        .. ProptestConfig::default()
    })]

    #[test]
    fn interleaved_operations_track_the_model(
        terms in term_sets(),
        ops in op_sequences(),
        config in block_configs(),
    ) {
        let dir = dict_with_field("seg", "body", &terms, config);
        let reader = TermDictReader::open(dir, "seg", OpenOptions::default()).unwrap();
        let mut cursor = reader.cursor("body").unwrap();
        let mut position = Position::Fresh;

        for op in &ops {
            match op {
                Op::Next => {
                    let moved = cursor.next().unwrap();
                    position = match position {
                        Position::Fresh => {
                            prop_assert!(moved);
                            Position::OnTerm(0)
                        }
                        Position::OnTerm(i) if i + 1 < terms.len() => {
                            prop_assert!(moved);
                            Position::OnTerm(i + 1)
                        }
                        Position::OnTerm(_) | Position::Done => {
                            prop_assert!(!moved);
                            Position::Done
                        }
                        Position::Unpredicted => {
                            if moved {
                                // Wherever it went, it must be a real term.
                                let ord = terms.binary_search(&cursor.term().to_vec());
                                prop_assert!(ord.is_ok(), "next() invented {:?}", cursor.term());
                                Position::OnTerm(ord.unwrap())
                            } else {
                                Position::Done
                            }
                        }
                    };
                }
                Op::ExactAt(raw) => {
                    let ord = raw % terms.len();
                    prop_assert!(cursor.seek_exact(&terms[ord]).unwrap());
                    position = Position::OnTerm(ord);
                }
                Op::Exact(probe) => {
                    let hit = cursor.seek_exact(probe).unwrap();
                    position = match terms.binary_search(probe) {
                        Ok(ord) => {
                            prop_assert!(hit);
                            Position::OnTerm(ord)
                        }
                        Err(_) => {
                            prop_assert!(!hit);
                            Position::Unpredicted
                        }
                    };
                }
                Op::CeilAt(raw) => {
                    let ord = raw % terms.len();
                    prop_assert_eq!(cursor.seek_ceil(&terms[ord]).unwrap(), SeekStatus::Found);
                    position = Position::OnTerm(ord);
                }
                Op::Ceil(probe) => {
                    let status = cursor.seek_ceil(probe).unwrap();
                    position = match terms.binary_search(probe) {
                        Ok(ord) => {
                            prop_assert_eq!(status, SeekStatus::Found);
                            Position::OnTerm(ord)
                        }
                        Err(ord) if ord < terms.len() => {
                            prop_assert_eq!(status, SeekStatus::NotFound);
                            Position::OnTerm(ord)
                        }
                        Err(_) => {
                            prop_assert_eq!(status, SeekStatus::End);
                            Position::Done
                        }
                    };
                }
            }

            if let Position::OnTerm(ord) = position {
                prop_assert_eq!(cursor.term(), terms[ord].as_slice());
                prop_assert_eq!(cursor.stats().unwrap(), stats_for(&terms[ord], ord));
            }
        }
    }
}
