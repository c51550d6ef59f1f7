//! Block-tree dictionary encoder.
//!
//! Terms arrive in strictly ascending byte order and accumulate on a pending stack.
//! When a prefix is abandoned (the next term no longer shares it) and enough entries
//! sit on top of the stack, those entries are grouped into one block, or into a floor
//! chain of blocks split on the first suffix byte, and replaced on the stack by a
//! single pointer entry. Closing a field flushes the stack into the root block and
//! freezes the prefix index automaton.
//!
//! ## Public invariants (must not change without a format bump)
//!
//! - A block never holds fewer than `min_items_in_block` entries, except the root.
//! - Floor chains are split so that no block exceeds `max_items_in_block`, and every
//!   floor sibling shares the chain's prefix.
//! - Blocks are written leaves-first, so a sub-block pointer always refers backward.
//! - Per block, term metadata deltas restart: the first term's postings pointer is
//!   absolute, each later one is a delta against the previous term in the block.

use crate::error::{TermDictError, TermDictResult};
use crate::formats::{
    encode_block_code, encode_field_table, encode_index_output, index_file_name,
    terms_file_name, write_file_header, FieldMeta, TermStats, ENTRY_FLAG_SUB_BLOCK,
    INDEX_MAGIC, INDEX_TRAILER, MAX_BLOCK_FP, MAX_STRIP_LEN, SUFFIX_SECTION_LEAF, TERMS_MAGIC,
    TERMS_TRAILER,
};
use crate::storage::Directory;
use crate::varint::{write_vint, write_vlong};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// Sink for one segment's term dictionary.
///
/// Call order per segment: `begin_field`, ascending `add_term`s, `end_field`,
/// repeated per field, then one `finish`.
pub trait DictionaryWriter {
    /// Start accepting terms for `name`.
    fn begin_field(&mut self, name: &str) -> TermDictResult<()>;
    /// Add the next term of the open field. Terms must be strictly ascending.
    fn add_term(&mut self, term: &[u8], stats: TermStats) -> TermDictResult<()>;
    /// Close the open field. `doc_count` is the number of documents having at
    /// least one term in the field. A field that received no terms is dropped.
    fn end_field(&mut self, doc_count: u32) -> TermDictResult<()>;
    /// Write the field table and checksummed footers. Must be called exactly once.
    fn finish(&mut self) -> TermDictResult<()>;
}

/// Block sizing knobs for the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Smallest entry count that justifies cutting a block.
    pub min_items_in_block: usize,
    /// Largest entry count allowed in a single block.
    pub max_items_in_block: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            min_items_in_block: 25,
            max_items_in_block: 48,
        }
    }
}

impl EncoderConfig {
    /// Reject size combinations the block cutter cannot honor.
    pub fn validate(&self) -> TermDictResult<()> {
        if self.min_items_in_block <= 1 {
            return Err(TermDictError::InvalidConfig(format!(
                "min_items_in_block must be at least 2, got {}",
                self.min_items_in_block
            )));
        }
        if self.min_items_in_block > self.max_items_in_block {
            return Err(TermDictError::InvalidConfig(format!(
                "min_items_in_block ({}) exceeds max_items_in_block ({})",
                self.min_items_in_block, self.max_items_in_block
            )));
        }
        if 2 * (self.min_items_in_block - 1) > self.max_items_in_block {
            return Err(TermDictError::InvalidConfig(format!(
                "max_items_in_block ({}) must be at least 2*(min_items_in_block-1) ({})",
                self.max_items_in_block,
                2 * (self.min_items_in_block - 1)
            )));
        }
        Ok(())
    }
}

enum PendingEntry {
    Term(PendingTerm),
    Block(PendingBlock),
}

struct PendingTerm {
    term: Vec<u8>,
    doc_freq: u32,
    total_term_freq: u64,
    postings_fp: u64,
}

struct PendingBlock {
    prefix: Vec<u8>,
    fp: u64,
}

/// One block's rendered sections plus what the chain assembly needs to place it.
struct RenderedBlock {
    entry_count: usize,
    has_terms: bool,
    /// First suffix byte of the block's first entry; -1 only for a chain's first block.
    lead_label: i32,
    /// `[suffix section][stats strip][meta strip]`, everything after the header.
    sections: Vec<u8>,
}

struct FieldState {
    name: String,
    pending: Vec<PendingEntry>,
    /// For prefix length `i + 1`: pending index where the run sharing
    /// `last_term[..=i]` begins.
    prefix_starts: Vec<usize>,
    last_term: Vec<u8>,
    /// `(prefix, packed output)` per written chain; sorted before the automaton build.
    fst_entries: Vec<(Vec<u8>, u64)>,
    num_terms: u64,
    sum_doc_freq: u64,
    sum_total_term_freq: u64,
    min_term: Vec<u8>,
    max_term: Vec<u8>,
    last_postings_fp: u64,
    blocks_written: u64,
}

impl FieldState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pending: Vec::new(),
            prefix_starts: Vec::new(),
            last_term: Vec::new(),
            fst_entries: Vec::new(),
            num_terms: 0,
            sum_doc_freq: 0,
            sum_total_term_freq: 0,
            min_term: Vec::new(),
            max_term: Vec::new(),
            last_postings_fp: 0,
            blocks_written: 0,
        }
    }

    /// Close blocks for every prefix the new term abandons, then adopt it as the
    /// comparison point for the next push.
    fn push_term(
        &mut self,
        out: &mut CountingCrcWriter,
        config: &EncoderConfig,
        term: &[u8],
    ) -> TermDictResult<()> {
        let limit = self.last_term.len().min(term.len());
        let mut pos = 0;
        while pos < limit && self.last_term[pos] == term[pos] {
            pos += 1;
        }

        // Longest abandoned prefix first.
        let mut i = self.last_term.len();
        while i > pos {
            i -= 1;
            let prefix_top_size = self.pending.len() - self.prefix_starts[i];
            if prefix_top_size >= config.min_items_in_block {
                self.write_blocks(out, config, i + 1, prefix_top_size)?;
                // The run collapsed into one entry; stale slots are re-initialized
                // before the next read, so wrapping is harmless.
                self.prefix_starts[i] = self.prefix_starts[i].wrapping_sub(prefix_top_size - 1);
            }
        }

        if self.prefix_starts.len() < term.len() {
            self.prefix_starts.resize(term.len(), 0);
        }
        for i in pos..term.len() {
            self.prefix_starts[i] = self.pending.len();
        }

        self.last_term.clear();
        self.last_term.extend_from_slice(term);
        Ok(())
    }

    /// Group the top `count` pending entries (all sharing `last_term[..prefix_len]`)
    /// into one block or a floor chain, write it, and replace the run with a single
    /// pointer entry.
    fn write_blocks(
        &mut self,
        out: &mut CountingCrcWriter,
        config: &EncoderConfig,
        prefix_len: usize,
        count: usize,
    ) -> TermDictResult<()> {
        debug_assert!(count > 0);
        let start = self.pending.len() - count;
        let end = self.pending.len();
        let fp_orig = out.len;
        if fp_orig > MAX_BLOCK_FP {
            return Err(TermDictError::Encode(
                "terms file exceeds the maximum addressable size".into(),
            ));
        }
        let prefix: Vec<u8> = self.last_term[..prefix_len].to_vec();

        let mut rendered: Vec<RenderedBlock> = Vec::new();
        let mut last_suffix_lead_label: i32 = -1;
        let mut has_terms = false;
        let mut has_sub_blocks = false;
        let mut next_block_start = start;
        let mut next_floor_lead_label: i32 = -1;

        for i in start..end {
            let suffix_lead_label: i32 = match &self.pending[i] {
                PendingEntry::Term(t) => {
                    if t.term.len() == prefix_len {
                        -1
                    } else {
                        i32::from(t.term[prefix_len])
                    }
                }
                PendingEntry::Block(b) => i32::from(b.prefix[prefix_len]),
            };

            if suffix_lead_label != last_suffix_lead_label {
                let items_in_block = i - next_block_start;
                // Floor cuts only happen on a lead-label boundary, so every block of
                // a chain owns whole label ranges.
                if items_in_block >= config.min_items_in_block
                    && end - next_block_start > config.max_items_in_block
                {
                    rendered.push(self.render_block(
                        prefix_len,
                        next_block_start,
                        i,
                        has_terms,
                        has_sub_blocks,
                        next_floor_lead_label,
                        fp_orig,
                    )?);
                    has_terms = false;
                    has_sub_blocks = false;
                    next_floor_lead_label = suffix_lead_label;
                    next_block_start = i;
                }
                last_suffix_lead_label = suffix_lead_label;
            }

            match &self.pending[i] {
                PendingEntry::Term(_) => has_terms = true,
                PendingEntry::Block(_) => has_sub_blocks = true,
            }
        }

        if next_block_start < end {
            rendered.push(self.render_block(
                prefix_len,
                next_block_start,
                end,
                has_terms,
                has_sub_blocks,
                next_floor_lead_label,
                fp_orig,
            )?);
        }

        let n = rendered.len();
        debug_assert!(n > 0);
        let is_floor = n > 1;

        // Floor siblings after the first, fully framed. Their lengths fix the
        // directory deltas, so these render before the first block's header.
        let mut tail_bufs: Vec<Vec<u8>> = Vec::with_capacity(n - 1);
        for (idx, rb) in rendered.iter().enumerate().skip(1) {
            let mut buf = Vec::with_capacity(rb.sections.len() + prefix.len() + 8);
            write_vint(&mut buf, prefix_len as u32);
            buf.extend_from_slice(&prefix);
            write_vint(&mut buf, encode_block_code(rb.entry_count, false, idx == n - 1));
            buf.extend_from_slice(&rb.sections);
            tail_bufs.push(buf);
        }

        let first_rb = &rendered[0];
        let mut first = Vec::with_capacity(first_rb.sections.len() + prefix.len() + 16);
        write_vint(&mut first, prefix_len as u32);
        first.extend_from_slice(&prefix);
        write_vint(
            &mut first,
            encode_block_code(first_rb.entry_count, is_floor, n == 1),
        );
        if is_floor {
            write_vint(&mut first, (n - 1) as u32);
            // Deltas are measured from the first sibling's end, which makes them
            // independent of this directory's own encoded size.
            let mut delta: u64 = 0;
            for (idx, rb) in rendered.iter().enumerate().skip(1) {
                debug_assert!(rb.lead_label >= 0);
                first.push(rb.lead_label as u8);
                write_vlong(&mut first, delta << 1 | u64::from(rb.has_terms));
                delta += tail_bufs[idx - 1].len() as u64;
            }
        }
        first.extend_from_slice(&first_rb.sections);

        out.write_all(&first)?;
        for buf in &tail_bufs {
            out.write_all(buf)?;
        }
        self.blocks_written += n as u64;

        let chain_has_terms = first_rb.has_terms;
        self.pending.truncate(start);
        self.pending.push(PendingEntry::Block(PendingBlock {
            prefix: prefix.clone(),
            fp: fp_orig,
        }));
        self.fst_entries
            .push((prefix, encode_index_output(fp_orig, chain_has_terms, is_floor)));
        Ok(())
    }

    /// Render one block's suffix, stats and metadata sections from
    /// `pending[start..end]`.
    #[allow(clippy::too_many_arguments)]
    fn render_block(
        &self,
        prefix_len: usize,
        start: usize,
        end: usize,
        has_terms: bool,
        has_sub_blocks: bool,
        lead_label: i32,
        fp_orig: u64,
    ) -> TermDictResult<RenderedBlock> {
        debug_assert!(end > start);
        let is_leaf = !has_sub_blocks;
        let mut suffixes = Vec::new();
        let mut stats = Vec::new();
        let mut meta = Vec::new();
        let mut last_fp: Option<u64> = None;

        for ent in &self.pending[start..end] {
            match ent {
                PendingEntry::Term(t) => {
                    let suffix = &t.term[prefix_len..];
                    if is_leaf {
                        write_vint(&mut suffixes, suffix.len() as u32);
                    } else {
                        write_vint(&mut suffixes, (suffix.len() as u32) << 1);
                    }
                    suffixes.extend_from_slice(suffix);

                    write_vint(&mut stats, t.doc_freq);
                    write_vlong(&mut stats, t.total_term_freq - u64::from(t.doc_freq));

                    let delta = match last_fp {
                        Some(prev) => t.postings_fp - prev,
                        None => t.postings_fp,
                    };
                    write_vlong(&mut meta, delta);
                    last_fp = Some(t.postings_fp);
                }
                PendingEntry::Block(b) => {
                    let suffix = &b.prefix[prefix_len..];
                    write_vint(
                        &mut suffixes,
                        (suffix.len() as u32) << 1 | ENTRY_FLAG_SUB_BLOCK,
                    );
                    suffixes.extend_from_slice(suffix);
                    // Children were written earlier, so the delta is positive.
                    write_vlong(&mut suffixes, fp_orig - b.fp);
                }
            }
        }

        for (strip, what) in [(&suffixes, "suffix"), (&stats, "stats"), (&meta, "metadata")] {
            if strip.len() as u64 > u64::from(MAX_STRIP_LEN) {
                return Err(TermDictError::Encode(format!(
                    "{what} strip exceeds {MAX_STRIP_LEN} bytes"
                )));
            }
        }

        let mut sections =
            Vec::with_capacity(suffixes.len() + stats.len() + meta.len() + 12);
        let leaf_flag = if is_leaf { SUFFIX_SECTION_LEAF } else { 0 };
        write_vint(&mut sections, (suffixes.len() as u32) << 1 | leaf_flag);
        sections.extend_from_slice(&suffixes);
        write_vint(&mut sections, stats.len() as u32);
        sections.extend_from_slice(&stats);
        write_vint(&mut sections, meta.len() as u32);
        sections.extend_from_slice(&meta);

        Ok(RenderedBlock {
            entry_count: end - start,
            has_terms,
            lead_label,
            sections,
        })
    }
}

/// Streaming writer that appends a crc32 and byte count to everything it passes on.
struct CountingCrcWriter {
    inner: Box<dyn Write>,
    hasher: crc32fast::Hasher,
    len: u64,
}

impl CountingCrcWriter {
    fn new(inner: Box<dyn Write>) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            len: 0,
        }
    }

    /// crc32 of every byte written so far.
    fn crc(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl Write for CountingCrcWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Encoder producing a segment's terms file and block index file.
pub struct BlockTreeWriter {
    config: EncoderConfig,
    segment: String,
    terms_out: CountingCrcWriter,
    index_out: CountingCrcWriter,
    fields: Vec<FieldMeta>,
    current: Option<FieldState>,
    finished: bool,
}

impl BlockTreeWriter {
    /// Create the dictionary files for `segment` inside `dir`.
    pub fn create<D: Directory + ?Sized>(
        dir: &D,
        segment: &str,
        config: EncoderConfig,
    ) -> TermDictResult<Self> {
        config.validate()?;
        let mut terms_out = CountingCrcWriter::new(dir.create_file(&terms_file_name(segment))?);
        let mut index_out = CountingCrcWriter::new(dir.create_file(&index_file_name(segment))?);

        let mut header = Vec::with_capacity(8);
        write_file_header(&mut header, TERMS_MAGIC);
        terms_out.write_all(&header)?;
        header.clear();
        write_file_header(&mut header, INDEX_MAGIC);
        index_out.write_all(&header)?;

        Ok(Self {
            config,
            segment: segment.to_string(),
            terms_out,
            index_out,
            fields: Vec::new(),
            current: None,
            finished: false,
        })
    }
}

impl DictionaryWriter for BlockTreeWriter {
    fn begin_field(&mut self, name: &str) -> TermDictResult<()> {
        if self.finished {
            return Err(TermDictError::InvalidState(
                "begin_field after finish".into(),
            ));
        }
        if let Some(st) = &self.current {
            return Err(TermDictError::InvalidState(format!(
                "begin_field(\"{name}\") while field \"{}\" is still open",
                st.name
            )));
        }
        if self.fields.iter().any(|f| f.name == name) {
            return Err(TermDictError::InvalidState(format!(
                "field \"{name}\" written twice"
            )));
        }
        self.current = Some(FieldState::new(name));
        Ok(())
    }

    fn add_term(&mut self, term: &[u8], stats: TermStats) -> TermDictResult<()> {
        let st = self.current.as_mut().ok_or_else(|| {
            TermDictError::InvalidState("add_term without an open field".into())
        })?;
        if st.num_terms > 0 && term <= st.last_term.as_slice() {
            return Err(TermDictError::InvalidState(format!(
                "terms must be strictly ascending: {:?} after {:?}",
                term.escape_ascii().to_string(),
                st.last_term.escape_ascii().to_string()
            )));
        }
        if stats.doc_freq == 0 {
            return Err(TermDictError::InvalidState(
                "doc_freq must be positive".into(),
            ));
        }
        if stats.total_term_freq < u64::from(stats.doc_freq) {
            return Err(TermDictError::InvalidState(format!(
                "total_term_freq ({}) below doc_freq ({})",
                stats.total_term_freq, stats.doc_freq
            )));
        }
        if stats.postings_fp < st.last_postings_fp {
            return Err(TermDictError::InvalidState(
                "postings file pointer went backwards".into(),
            ));
        }

        st.push_term(&mut self.terms_out, &self.config, term)?;
        st.pending.push(PendingEntry::Term(PendingTerm {
            term: term.to_vec(),
            doc_freq: stats.doc_freq,
            total_term_freq: stats.total_term_freq,
            postings_fp: stats.postings_fp,
        }));

        if st.num_terms == 0 {
            st.min_term = term.to_vec();
        }
        st.max_term.clear();
        st.max_term.extend_from_slice(term);
        st.num_terms += 1;
        st.sum_doc_freq += u64::from(stats.doc_freq);
        st.sum_total_term_freq += stats.total_term_freq;
        st.last_postings_fp = stats.postings_fp;
        Ok(())
    }

    fn end_field(&mut self, doc_count: u32) -> TermDictResult<()> {
        let mut st = self.current.take().ok_or_else(|| {
            TermDictError::InvalidState("end_field without an open field".into())
        })?;
        if st.num_terms == 0 {
            return Ok(());
        }
        if doc_count == 0 {
            return Err(TermDictError::InvalidState(
                "doc_count must be positive for a field with terms".into(),
            ));
        }
        if u64::from(doc_count) > st.sum_doc_freq {
            return Err(TermDictError::InvalidState(format!(
                "doc_count ({doc_count}) exceeds sum_doc_freq ({})",
                st.sum_doc_freq
            )));
        }

        // Flush everything still pending into the root block.
        st.push_term(&mut self.terms_out, &self.config, &[])?;
        let count = st.pending.len();
        st.write_blocks(&mut self.terms_out, &self.config, 0, count)?;
        debug_assert_eq!(st.pending.len(), 1);
        match st.pending.first() {
            Some(PendingEntry::Block(root)) if root.prefix.is_empty() => {}
            _ => {
                return Err(TermDictError::InvalidState(
                    "root flush did not leave a single root block".into(),
                ))
            }
        }
        let root_code = match st.fst_entries.last() {
            Some((prefix, code)) if prefix.is_empty() => *code,
            _ => {
                return Err(TermDictError::InvalidState(
                    "root block missing from the prefix index".into(),
                ))
            }
        };

        st.fst_entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut builder = fst::MapBuilder::memory();
        for (prefix, code) in &st.fst_entries {
            builder
                .insert(prefix, *code)
                .map_err(|e| TermDictError::Encode(e.to_string()))?;
        }
        let fst_bytes = builder
            .into_inner()
            .map_err(|e| TermDictError::Encode(e.to_string()))?;
        let index_offset = self.index_out.len;
        self.index_out.write_all(&fst_bytes)?;

        log::debug!(
            "segment {} field {}: {} terms in {} blocks, index {} bytes",
            self.segment,
            st.name,
            st.num_terms,
            st.blocks_written,
            fst_bytes.len()
        );

        self.fields.push(FieldMeta {
            name: std::mem::take(&mut st.name),
            num_terms: st.num_terms,
            sum_doc_freq: st.sum_doc_freq,
            sum_total_term_freq: st.sum_total_term_freq,
            doc_count,
            min_term: std::mem::take(&mut st.min_term),
            max_term: std::mem::take(&mut st.max_term),
            root_code,
            index_offset,
            index_len: fst_bytes.len() as u64,
        });
        Ok(())
    }

    fn finish(&mut self) -> TermDictResult<()> {
        if self.finished {
            return Err(TermDictError::InvalidState("finish called twice".into()));
        }
        if let Some(st) = &self.current {
            return Err(TermDictError::InvalidState(format!(
                "finish while field \"{}\" is still open",
                st.name
            )));
        }
        self.finished = true;

        let table = encode_field_table(&self.fields)?;
        let table_offset = self.terms_out.len;
        let table_crc = crc32fast::hash(&table);
        self.terms_out.write_all(&table)?;
        self.terms_out.write_u64::<LittleEndian>(table_offset)?;
        self.terms_out.write_u64::<LittleEndian>(table.len() as u64)?;
        self.terms_out.write_u32::<LittleEndian>(table_crc)?;
        let file_crc = self.terms_out.crc();
        self.terms_out.write_u32::<LittleEndian>(file_crc)?;
        self.terms_out.write_all(&TERMS_TRAILER)?;
        self.terms_out.flush()?;

        let index_crc = self.index_out.crc();
        self.index_out.write_u32::<LittleEndian>(index_crc)?;
        self.index_out.write_all(&INDEX_TRAILER)?;
        self.index_out.flush()?;

        log::debug!(
            "segment {}: dictionary finished with {} fields",
            self.segment,
            self.fields.len()
        );
        Ok(())
    }
}
