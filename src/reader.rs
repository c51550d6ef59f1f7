//! Opening a segment's dictionary and handing out cursors.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - Opening validates structure, never block content: both file headers, the
//!   fixed-width terms footer, that the field table abuts the footer, the field
//!   table's own crc, and the index file's crc (its bytes are resident anyway).
//!   The terms-file body crc is checked only when
//!   [`OpenOptions::verify_checksum_on_open`] is set, or later through
//!   [`TermDictionary::verify_checksums`].
//! - Damage inside a block region that open skipped surfaces as
//!   [`TermDictError::Corruption`](crate::error::TermDictError) from the cursor
//!   that first decodes the block.
//! - Every cursor opens its own terms-file input; a reader can hand out any
//!   number of concurrently live cursors.

use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use fst::Map;

use crate::cursor::{BlockTreeCursor, TermCursor};
use crate::error::{TermDictError, TermDictResult};
use crate::formats::{
    check_file_header, decode_field_table, index_file_name, output_block_fp, parse_index_footer,
    terms_file_name, FieldMeta, TermsFooter, FILE_HEADER_LEN, INDEX_FOOTER_LEN, INDEX_MAGIC,
    MAX_FIELD_TABLE_LEN, TERMS_FOOTER_LEN, TERMS_MAGIC,
};
use crate::stats::FieldStats;
use crate::storage::{read_file, Directory, IndexInput};

/// Integrity work performed by [`TermDictReader::open`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Stream the whole terms file and compare its crc32 before returning.
    /// When unset, block payloads are only validated as cursors decode them.
    pub verify_checksum_on_open: bool,
}

/// Read access to one segment's term dictionary.
pub trait TermDictionary {
    /// Names of the fields in the dictionary, sorted.
    fn field_names(&self) -> Vec<String>;

    /// Table row for `field`, if present.
    fn field_meta(&self, field: &str) -> Option<&FieldMeta>;

    /// A fresh, unpositioned cursor over `field`'s terms.
    fn cursor(&self, field: &str) -> TermDictResult<Box<dyn TermCursor + '_>>;

    /// Walk every block of `field` and aggregate structural statistics.
    fn field_stats(&self, field: &str) -> TermDictResult<FieldStats>;

    /// Stream both files and compare their crc32s against the footers seen at
    /// open time.
    fn verify_checksums(&self) -> TermDictResult<()>;
}

struct FieldEntry {
    meta: FieldMeta,
    index: Map<Vec<u8>>,
}

pub struct TermDictReader {
    dir: Arc<dyn Directory>,
    segment: String,
    footer: TermsFooter,
    index_crc32: u32,
    fields: BTreeMap<String, FieldEntry>,
}

impl TermDictReader {
    /// Open the dictionary written for `segment` inside `dir`.
    pub fn open(
        dir: Arc<dyn Directory>,
        segment: &str,
        options: OpenOptions,
    ) -> TermDictResult<Self> {
        let terms_path = terms_file_name(segment);
        let mut terms = dir.open_input(&terms_path)?;
        let terms_len = terms.len();
        if terms_len < (FILE_HEADER_LEN + TERMS_FOOTER_LEN) as u64 {
            return Err(TermDictError::Format(format!(
                "terms file {terms_path} is {terms_len} bytes, shorter than header plus footer"
            )));
        }
        let mut head = [0u8; FILE_HEADER_LEN];
        terms.read_exact(&mut head)?;
        check_file_header(&head, TERMS_MAGIC, "terms")?;

        terms.seek(SeekFrom::Start(terms_len - TERMS_FOOTER_LEN as u64))?;
        let mut tail = [0u8; TERMS_FOOTER_LEN];
        terms.read_exact(&mut tail)?;
        let footer = TermsFooter::parse(&tail)?;

        if footer.table_len > MAX_FIELD_TABLE_LEN {
            return Err(TermDictError::Format(format!(
                "field table of {} bytes exceeds the {MAX_FIELD_TABLE_LEN} byte cap",
                footer.table_len
            )));
        }
        // The table must sit flush against the footer. A footer that survived
        // truncation or splicing fails here without any block being read.
        let table_end = footer.table_offset.checked_add(footer.table_len);
        if footer.table_offset < FILE_HEADER_LEN as u64
            || table_end != Some(terms_len - TERMS_FOOTER_LEN as u64)
        {
            return Err(TermDictError::Format(format!(
                "field table at [{}, +{}] does not abut the footer of a {terms_len} byte terms file",
                footer.table_offset, footer.table_len
            )));
        }

        terms.seek(SeekFrom::Start(footer.table_offset))?;
        let mut table = vec![0u8; footer.table_len as usize];
        terms.read_exact(&mut table)?;
        let table_crc = crc32fast::hash(&table);
        if table_crc != footer.table_crc32 {
            return Err(TermDictError::CrcMismatch {
                expected: footer.table_crc32,
                actual: table_crc,
            });
        }
        let metas = decode_field_table(&table)?;

        if options.verify_checksum_on_open {
            verify_file_crc(terms.as_mut(), terms_len, footer.file_crc32)?;
        }

        let index_path = index_file_name(segment);
        let index_bytes = read_file(dir.as_ref(), &index_path)?;
        if index_bytes.len() < FILE_HEADER_LEN + INDEX_FOOTER_LEN {
            return Err(TermDictError::Format(format!(
                "index file {index_path} is {} bytes, shorter than header plus footer",
                index_bytes.len()
            )));
        }
        check_file_header(&index_bytes, INDEX_MAGIC, "index")?;
        let index_body_end = index_bytes.len() - INDEX_FOOTER_LEN;
        let index_crc32 = parse_index_footer(&index_bytes[index_body_end..])?;
        let actual = crc32fast::hash(&index_bytes[..index_body_end]);
        if actual != index_crc32 {
            return Err(TermDictError::CrcMismatch {
                expected: index_crc32,
                actual,
            });
        }

        let mut fields = BTreeMap::new();
        for meta in metas {
            validate_field_meta(&meta, footer.table_offset, index_body_end as u64)?;
            let start = meta.index_offset as usize;
            let end = start + meta.index_len as usize;
            let map = Map::new(index_bytes[start..end].to_vec()).map_err(|e| {
                TermDictError::Decode(format!("field {} index automaton: {e}", meta.name))
            })?;
            if map.get(b"") != Some(meta.root_code) {
                return Err(TermDictError::Corruption(format!(
                    "field {}: index automaton root disagrees with the field table",
                    meta.name
                )));
            }
            let name = meta.name.clone();
            if fields.insert(name.clone(), FieldEntry { meta, index: map }).is_some() {
                return Err(TermDictError::Format(format!(
                    "field {name} appears twice in the field table"
                )));
            }
        }

        log::debug!(
            "segment {segment}: dictionary opened with {} fields ({} index bytes, body crc {})",
            fields.len(),
            index_bytes.len(),
            if options.verify_checksum_on_open {
                "verified"
            } else {
                "deferred"
            }
        );

        Ok(Self {
            dir,
            segment: segment.to_string(),
            footer,
            index_crc32,
            fields,
        })
    }

    fn entry(&self, field: &str) -> TermDictResult<&FieldEntry> {
        self.fields
            .get(field)
            .ok_or_else(|| TermDictError::NotFound(format!("field {field}")))
    }
}

impl TermDictionary for TermDictReader {
    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn field_meta(&self, field: &str) -> Option<&FieldMeta> {
        self.fields.get(field).map(|e| &e.meta)
    }

    fn cursor(&self, field: &str) -> TermDictResult<Box<dyn TermCursor + '_>> {
        let entry = self.entry(field)?;
        let input = self.dir.open_input(&terms_file_name(&self.segment))?;
        Ok(Box::new(BlockTreeCursor::new(
            &entry.meta,
            entry.index.as_fst(),
            input,
        )))
    }

    fn field_stats(&self, field: &str) -> TermDictResult<FieldStats> {
        let entry = self.entry(field)?;
        let input = self.dir.open_input(&terms_file_name(&self.segment))?;
        let mut cursor = BlockTreeCursor::new(&entry.meta, entry.index.as_fst(), input);
        cursor.compute_field_stats()
    }

    fn verify_checksums(&self) -> TermDictResult<()> {
        let mut terms = self.dir.open_input(&terms_file_name(&self.segment))?;
        let terms_len = terms.len();
        verify_file_crc(terms.as_mut(), terms_len, self.footer.file_crc32)?;

        let mut index = self.dir.open_input(&index_file_name(&self.segment))?;
        let index_len = index.len();
        verify_file_crc(index.as_mut(), index_len, self.index_crc32)?;
        log::debug!("segment {}: dictionary checksums verified", self.segment);
        Ok(())
    }
}

/// Bounds and counter sanity for one table row. The table crc already passed,
/// so a failure here is a writer defect or a cross-file mixup, not bit rot.
fn validate_field_meta(
    meta: &FieldMeta,
    terms_body_end: u64,
    index_body_end: u64,
) -> TermDictResult<()> {
    if meta.num_terms == 0 {
        return Err(TermDictError::Format(format!(
            "field {}: table row records zero terms",
            meta.name
        )));
    }
    if meta.doc_count == 0 {
        return Err(TermDictError::Format(format!(
            "field {}: table row records zero documents",
            meta.name
        )));
    }
    if meta.sum_doc_freq < u64::from(meta.doc_count) {
        return Err(TermDictError::Format(format!(
            "field {}: sum_doc_freq {} is below doc_count {}",
            meta.name, meta.sum_doc_freq, meta.doc_count
        )));
    }
    if meta.sum_total_term_freq < meta.sum_doc_freq {
        return Err(TermDictError::Format(format!(
            "field {}: sum_total_term_freq {} is below sum_doc_freq {}",
            meta.name, meta.sum_total_term_freq, meta.sum_doc_freq
        )));
    }
    if meta.min_term > meta.max_term {
        return Err(TermDictError::Format(format!(
            "field {}: min_term sorts after max_term",
            meta.name
        )));
    }
    let root_fp = output_block_fp(meta.root_code);
    if root_fp < FILE_HEADER_LEN as u64 || root_fp >= terms_body_end {
        return Err(TermDictError::Format(format!(
            "field {}: root block pointer {root_fp} is out of bounds",
            meta.name
        )));
    }
    if meta.index_len == 0 {
        return Err(TermDictError::Format(format!(
            "field {}: empty index automaton",
            meta.name
        )));
    }
    let index_end = meta.index_offset.checked_add(meta.index_len);
    if meta.index_offset < FILE_HEADER_LEN as u64
        || index_end.is_none()
        || index_end > Some(index_body_end)
    {
        return Err(TermDictError::Format(format!(
            "field {}: index automaton at [{}, +{}] is out of bounds",
            meta.name, meta.index_offset, meta.index_len
        )));
    }
    Ok(())
}

/// Stream a file and compare the crc32 of everything but the trailing
/// `[crc32][trailer]` eight bytes against `expected`.
fn verify_file_crc(
    input: &mut dyn IndexInput,
    file_len: u64,
    expected: u32,
) -> TermDictResult<()> {
    debug_assert!(file_len >= 8);
    input.seek(SeekFrom::Start(0))?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut remaining = file_len - 8;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        input.read_exact(&mut buf[..want])?;
        hasher.update(&buf[..want]);
        remaining -= want as u64;
    }
    let actual = hasher.finalize();
    if actual != expected {
        return Err(TermDictError::CrcMismatch { expected, actual });
    }
    Ok(())
}
