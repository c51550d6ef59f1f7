//! `termdict`: block-tree term dictionaries for segment-based indices.
//!
//! Scope:
//! - directory abstraction (`storage`)
//! - on-disk framing constants (`formats`)
//! - dictionary encoder (`writer`)
//! - opening and cursors (`reader`, `cursor`)
//! - structural statistics (`stats`)
//! - format name registry (`registry`)
//!
//! Non-goal: postings encoding, scoring, or segment lifecycle. A term's stats carry
//! a postings file pointer; what it points into is another crate's business.
//!
//! ## Contract (what you can rely on)
//!
//! This crate is designed around two different trust levels at open time:
//!
//! - **Fast open** (default)
//!   - Validates structure loudly: magics, versions, the fixed footer, the field
//!     table (always crc-checked), per-field bounds, and the whole index file.
//!   - Skips the terms-file body checksum. Damage inside a block surfaces as a
//!     `Corruption` error from whichever cursor first decodes that block, never
//!     as a wrong term or silent truncation of an enumeration.
//! - **Verified open** (opt-in)
//!   - [`OpenOptions::verify_checksum_on_open`] streams the terms file and
//!     compares its crc32 before the dictionary is handed out; the same pass is
//!     available later through [`TermDictionary::verify_checksums`].
//!
//! Terminology:
//! - A **block** groups terms (and pointers to deeper blocks) sharing a prefix;
//!   long runs under one prefix split into a **floor chain** keyed on the first
//!   suffix byte.
//! - The **index automaton** maps block prefixes to file pointers. It is small,
//!   loaded whole, and always checksum-verified; the terms file is random-access.
//!
//! Note: this crate intentionally exposes *traits and framing*. Which segments
//! exist, when they are opened, and what format name was recorded for them are
//! decisions for the index lifecycle layer; [`registry::FormatRegistry`] only
//! resolves those recorded names.

pub mod cursor;
pub mod error;
pub mod formats;
mod frame;
pub mod reader;
pub mod registry;
pub mod stats;
pub mod storage;
pub mod varint;
pub mod writer;

pub use cursor::{SeekStatus, TermCursor};
pub use error::{TermDictError, TermDictResult};
pub use formats::{FieldMeta, TermStats};
pub use reader::{OpenOptions, TermDictReader, TermDictionary};
pub use registry::{FormatRegistry, TermDictFormat};
pub use stats::FieldStats;
pub use storage::{Directory, FsDirectory, MemoryDirectory};
pub use writer::{BlockTreeWriter, DictionaryWriter, EncoderConfig};
