//! On-disk format constants and small shared structs.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - Both dictionary files open with `[magic][version u32 LE]` and end with a marker
//!   trailer; the 4-byte crc32 immediately before the trailer covers every preceding
//!   byte of the file.
//! - The terms file footer is fixed-width ([`TERMS_FOOTER_LEN`] bytes) so a reader can
//!   locate the field table from the file length alone.
//! - Index outputs and block header codes pack flags into the low bits, file pointers
//!   and entry counts into the high bits. Flag assignments are part of the format.

use crate::error::{TermDictError, TermDictResult};
use crate::varint::SliceReader;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

/// Magic bytes opening a terms file.
pub const TERMS_MAGIC: [u8; 4] = *b"VTRM";
/// Marker trailer closing a terms file.
pub const TERMS_TRAILER: [u8; 4] = *b"MRTV";
/// Magic bytes opening a block index file.
pub const INDEX_MAGIC: [u8; 4] = *b"VTIX";
/// Marker trailer closing a block index file.
pub const INDEX_TRAILER: [u8; 4] = *b"XITV";
/// Current on-disk format version for both dictionary files.
pub const FORMAT_VERSION: u32 = 1;

/// Bytes occupied by `[magic][version]` at the head of each file.
pub const FILE_HEADER_LEN: usize = 8;
/// Fixed-width terms-file footer: table offset, table len, table crc, file crc, trailer.
pub const TERMS_FOOTER_LEN: usize = 8 + 8 + 4 + 4 + 4;
/// Fixed-width index-file footer: file crc, trailer.
pub const INDEX_FOOTER_LEN: usize = 4 + 4;

/// Upper bound on a serialized field table. Corrupt footers must not drive allocation.
pub const MAX_FIELD_TABLE_LEN: u64 = 64 * 1024 * 1024;
/// Upper bound on any single in-block strip (suffixes, stats, metadata).
pub const MAX_STRIP_LEN: u32 = 256 * 1024 * 1024;

/// File name of the terms file for a segment.
pub fn terms_file_name(segment: &str) -> String {
    format!("{segment}.trm")
}

/// File name of the block index file for a segment.
pub fn index_file_name(segment: &str) -> String {
    format!("{segment}.tix")
}

// Index outputs: fp << 2 | HAS_TERMS | IS_FLOOR. The same packing is used for the
// per-field root code recorded in the field table.

/// Output flag: the addressed block (or its floor chain) contains at least one term.
pub const OUTPUT_HAS_TERMS: u64 = 0x2;
/// Output flag: the output addresses the first block of a floor chain.
pub const OUTPUT_IS_FLOOR: u64 = 0x1;
/// Largest file pointer representable in a packed output.
pub const MAX_BLOCK_FP: u64 = (1 << 62) - 1;

/// Pack a block file pointer and its flags into an index output.
pub fn encode_index_output(fp: u64, has_terms: bool, is_floor: bool) -> u64 {
    debug_assert!(fp <= MAX_BLOCK_FP);
    let mut code = fp << 2;
    if has_terms {
        code |= OUTPUT_HAS_TERMS;
    }
    if is_floor {
        code |= OUTPUT_IS_FLOOR;
    }
    code
}

/// File pointer carried by a packed index output.
pub fn output_block_fp(code: u64) -> u64 {
    code >> 2
}

/// Whether the packed output's block subtree holds any terms.
pub fn output_has_terms(code: u64) -> bool {
    code & OUTPUT_HAS_TERMS != 0
}

/// Whether the packed output addresses a floor chain.
pub fn output_is_floor(code: u64) -> bool {
    code & OUTPUT_IS_FLOOR != 0
}

// Block header codes: entry_count << 2 | FLOOR_FIRST | LAST_IN_FLOOR. A block that is
// not part of a floor chain sets LAST_IN_FLOOR and clears FLOOR_FIRST.

/// Header flag: this block opens a floor chain and carries the sibling directory.
pub const BLOCK_FLAG_FLOOR_FIRST: u32 = 0x2;
/// Header flag: no further floor sibling follows this block.
pub const BLOCK_FLAG_LAST_IN_FLOOR: u32 = 0x1;

/// Pack a block's entry count and floor flags into its header code.
pub fn encode_block_code(entry_count: usize, floor_first: bool, last_in_floor: bool) -> u32 {
    debug_assert!(entry_count > 0 && entry_count <= (u32::MAX >> 2) as usize);
    let mut code = (entry_count as u32) << 2;
    if floor_first {
        code |= BLOCK_FLAG_FLOOR_FIRST;
    }
    if last_in_floor {
        code |= BLOCK_FLAG_LAST_IN_FLOOR;
    }
    code
}

/// Suffix-section flag (bit 0 of the section length word): all entries are terms.
pub const SUFFIX_SECTION_LEAF: u32 = 0x1;
/// Per-entry flag in mixed blocks (bit 0 of the suffix length word): entry is a sub-block.
pub const ENTRY_FLAG_SUB_BLOCK: u32 = 0x1;

/// Per-term statistics and postings location handed back by a cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermStats {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total occurrences of the term across all documents.
    pub total_term_freq: u64,
    /// File pointer into the postings file for this term.
    pub postings_fp: u64,
}

/// Per-field summary recorded in the terms-file field table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Field name.
    pub name: String,
    /// Number of distinct terms in the field.
    pub num_terms: u64,
    /// Sum of doc_freq over all terms.
    pub sum_doc_freq: u64,
    /// Sum of total_term_freq over all terms.
    pub sum_total_term_freq: u64,
    /// Number of documents with at least one term in this field.
    pub doc_count: u32,
    /// Smallest term in the field.
    pub min_term: Vec<u8>,
    /// Largest term in the field.
    pub max_term: Vec<u8>,
    /// Packed output addressing the root block.
    pub root_code: u64,
    /// Offset of this field's index automaton within the index file.
    pub index_offset: u64,
    /// Length in bytes of this field's index automaton.
    pub index_len: u64,
}

/// Serialize the field table.
pub fn encode_field_table(fields: &[FieldMeta]) -> TermDictResult<Vec<u8>> {
    postcard::to_allocvec(fields).map_err(|e| TermDictError::Encode(e.to_string()))
}

/// Deserialize the field table.
pub fn decode_field_table(bytes: &[u8]) -> TermDictResult<Vec<FieldMeta>> {
    postcard::from_bytes(bytes).map_err(|e| TermDictError::Decode(e.to_string()))
}

/// Append `[magic][FORMAT_VERSION]` to a file being assembled.
pub fn write_file_header(out: &mut Vec<u8>, magic: [u8; 4]) {
    out.extend_from_slice(&magic);
    // Vec<u8> writes cannot fail.
    let _ = out.write_u32::<LittleEndian>(FORMAT_VERSION);
}

/// Validate `[magic][version]` at the head of a file and return the version.
pub fn check_file_header(head: &[u8], magic: [u8; 4], file_kind: &str) -> TermDictResult<u32> {
    if head.len() < FILE_HEADER_LEN {
        return Err(TermDictError::Format(format!(
            "{file_kind} file too short for header ({} bytes)",
            head.len()
        )));
    }
    if head[..4] != magic {
        return Err(TermDictError::FormatDetail {
            message: format!("bad magic in {file_kind} file"),
            expected: Some(magic.escape_ascii().to_string()),
            actual: Some(head[..4].escape_ascii().to_string()),
        });
    }
    let version = LittleEndian::read_u32(&head[4..8]);
    if version != FORMAT_VERSION {
        return Err(TermDictError::FormatDetail {
            message: format!("unsupported {file_kind} file version"),
            expected: Some(FORMAT_VERSION.to_string()),
            actual: Some(version.to_string()),
        });
    }
    Ok(version)
}

/// Parsed terms-file footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermsFooter {
    /// Offset of the serialized field table.
    pub table_offset: u64,
    /// Length of the serialized field table.
    pub table_len: u64,
    /// crc32 of the serialized field table.
    pub table_crc32: u32,
    /// crc32 of the whole file up to (not including) this checksum.
    pub file_crc32: u32,
}

impl TermsFooter {
    /// The leading footer fields, which the file checksum still covers.
    pub fn encode_prefix(&self) -> [u8; 20] {
        let mut buf = [0u8; 20];
        LittleEndian::write_u64(&mut buf[0..8], self.table_offset);
        LittleEndian::write_u64(&mut buf[8..16], self.table_len);
        LittleEndian::write_u32(&mut buf[16..20], self.table_crc32);
        buf
    }

    /// Parse the final [`TERMS_FOOTER_LEN`] bytes of a terms file.
    pub fn parse(tail: &[u8]) -> TermDictResult<Self> {
        if tail.len() != TERMS_FOOTER_LEN {
            return Err(TermDictError::Format(format!(
                "terms footer must be {TERMS_FOOTER_LEN} bytes, got {}",
                tail.len()
            )));
        }
        if tail[24..28] != TERMS_TRAILER {
            return Err(TermDictError::FormatDetail {
                message: "terms file trailer mismatch".into(),
                expected: Some(TERMS_TRAILER.escape_ascii().to_string()),
                actual: Some(tail[24..28].escape_ascii().to_string()),
            });
        }
        Ok(Self {
            table_offset: LittleEndian::read_u64(&tail[0..8]),
            table_len: LittleEndian::read_u64(&tail[8..16]),
            table_crc32: LittleEndian::read_u32(&tail[16..20]),
            file_crc32: LittleEndian::read_u32(&tail[20..24]),
        })
    }
}

/// Parse the final [`INDEX_FOOTER_LEN`] bytes of an index file, returning its crc.
pub fn parse_index_footer(tail: &[u8]) -> TermDictResult<u32> {
    if tail.len() != INDEX_FOOTER_LEN {
        return Err(TermDictError::Format(format!(
            "index footer must be {INDEX_FOOTER_LEN} bytes, got {}",
            tail.len()
        )));
    }
    if tail[4..8] != INDEX_TRAILER {
        return Err(TermDictError::FormatDetail {
            message: "index file trailer mismatch".into(),
            expected: Some(INDEX_TRAILER.escape_ascii().to_string()),
            actual: Some(tail[4..8].escape_ascii().to_string()),
        });
    }
    Ok(LittleEndian::read_u32(&tail[0..4]))
}

/// Decode a block header code previously packed with [`encode_block_code`].
pub struct BlockCode {
    /// Entries (terms plus sub-block pointers) stored in the block.
    pub entry_count: usize,
    /// Block opens a floor chain.
    pub floor_first: bool,
    /// Block is the final (or only) block of its chain.
    pub last_in_floor: bool,
}

impl BlockCode {
    /// Split a packed header code into its parts.
    pub fn decode(code: u32) -> TermDictResult<Self> {
        let entry_count = (code >> 2) as usize;
        if entry_count == 0 {
            return Err(TermDictError::Corruption("block with zero entries".into()));
        }
        Ok(Self {
            entry_count,
            floor_first: code & BLOCK_FLAG_FLOOR_FIRST != 0,
            last_in_floor: code & BLOCK_FLAG_LAST_IN_FLOOR != 0,
        })
    }

    /// Read and decode the header code from a block strip.
    pub fn read_from(r: &mut SliceReader<'_>) -> TermDictResult<Self> {
        Self::decode(r.read_vint()?)
    }
}
