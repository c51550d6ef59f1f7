//! Traversal frames over node blocks.
//!
//! A [`Frame`] is the decoded, in-memory view of one node block: header fields, the
//! three entry strips, and scan positions. The cursor keeps a stack of frames, one per
//! descended prefix, and drives them through the methods here. Frames never touch the
//! index; they only read the dictionary file through the input the cursor hands them.
//!
//! Decoding here is the deferred half of the integrity story: blocks are validated
//! structurally when they are actually read, so damage inside a block that open-time
//! checks skipped surfaces as [`TermDictError::Corruption`] from `load_block` or from
//! one of the scan methods.

use std::cmp::Ordering;
use std::io::{ErrorKind, SeekFrom};

use crate::error::{TermDictError, TermDictResult};
use crate::formats::{BlockCode, TermStats, ENTRY_FLAG_SUB_BLOCK, MAX_STRIP_LEN, SUFFIX_SECTION_LEAF};
use crate::storage::IndexInput;
use crate::varint::{read_vint, read_vlong, SliceReader};

/// Term bytes shared between the cursor and its frames.
///
/// Bytes past `len` are scratch left behind by earlier, longer terms.
pub(crate) struct TermBuf {
    pub bytes: Vec<u8>,
    pub len: usize,
}

impl TermBuf {
    pub fn new() -> Self {
        TermBuf {
            bytes: Vec::new(),
            len: 0,
        }
    }

    pub fn term(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn grow(&mut self, len: usize) {
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
    }

    /// Overwrite everything after `prefix` with `suffix` and truncate there.
    pub fn set_suffix(&mut self, prefix: usize, suffix: &[u8]) {
        self.grow(prefix + suffix.len());
        self.bytes[prefix..prefix + suffix.len()].copy_from_slice(suffix);
        self.len = prefix + suffix.len();
    }
}

/// What one decoded block entry turned out to be.
pub(crate) enum BlockEntry {
    /// A term; the shared buffer now holds its bytes.
    Term,
    /// A child block chain starting at this file pointer.
    SubBlock(u64),
}

/// Outcome of an in-block scan toward a target term.
pub(crate) enum ScanResult {
    /// Exact match; the buffer holds the target.
    Found,
    /// Stopped at the first entry sorting after the target.
    After {
        /// The stopping entry is a term (false: a sub-block pointer).
        is_term: bool,
    },
    /// Every entry in the block sorts before the target. With `fill_on_end`
    /// the buffer is left holding the last scanned entry.
    End,
}

/// One floor sibling after the chain head, from the head's directory.
#[derive(Clone, Copy)]
struct FloorFollower {
    label: u8,
    fp: u64,
    has_terms: bool,
}

/// Decoded state of one node block plus the position of an in-progress scan.
pub(crate) struct Frame {
    /// Stack depth. Index of this frame in the cursor's stack.
    pub ord: usize,

    /// Terms reachable from the sibling currently selected (floor scans update this).
    pub has_terms: bool,
    pub has_terms_orig: bool,
    /// The chain behind `fp_orig` has more than one sibling.
    pub is_floor: bool,

    /// File pointer of the sibling this frame currently reads.
    pub fp: u64,
    /// File pointer of the chain head. Never changes while the frame maps one chain.
    pub fp_orig: u64,
    /// First byte past the loaded sibling. The next sibling starts here.
    pub fp_end: u64,

    /// Prefix length this block covers; `term[..prefix]` is the block prefix.
    pub prefix: usize,

    pub ent_count: usize,
    /// Entries consumed so far. Meaningful only while `loaded`.
    pub next_ent: usize,
    pub loaded: bool,

    pub is_last_in_floor: bool,
    pub is_leaf_block: bool,

    /// Chain fp of the sub-block entry most recently decoded or scanned to.
    pub last_sub_fp: Option<u64>,

    /// Terms consumed so far in a non-leaf block (stats strips skip sub-blocks).
    pub term_block_ord: usize,
    /// Stats decoded for the current term once `decode_stats` ran.
    pub state: TermStats,

    floor_followers: Vec<FloorFollower>,
    floor_next_idx: usize,

    suffix_bytes: Vec<u8>,
    suffix_pos: usize,
    stat_bytes: Vec<u8>,
    stat_pos: usize,
    meta_bytes: Vec<u8>,
    meta_pos: usize,
    /// Terms whose stats/metadata have been decoded already.
    metadata_upto: usize,

    start_byte_pos: usize,
    suffix_len: usize,
    sub_code: u64,
}

/// Inside a block, running out of bytes is damage, not end of input.
fn corrupt(e: TermDictError) -> TermDictError {
    match e {
        TermDictError::Io(io) if io.kind() == ErrorKind::UnexpectedEof => {
            TermDictError::Corruption("block cut short by end of file".into())
        }
        TermDictError::Decode(msg) => TermDictError::Corruption(msg),
        other => other,
    }
}

fn read_block_bytes(input: &mut dyn IndexInput, buf: &mut [u8]) -> TermDictResult<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            TermDictError::Corruption("block cut short by end of file".into())
        } else {
            TermDictError::Io(e)
        }
    })
}

impl Frame {
    pub fn new(ord: usize) -> Self {
        Frame {
            ord,
            has_terms: false,
            has_terms_orig: false,
            is_floor: false,
            fp: 0,
            fp_orig: 0,
            fp_end: 0,
            prefix: 0,
            ent_count: 0,
            next_ent: 0,
            loaded: false,
            is_last_in_floor: true,
            is_leaf_block: false,
            last_sub_fp: None,
            term_block_ord: 0,
            state: TermStats::default(),
            floor_followers: Vec::new(),
            floor_next_idx: 0,
            suffix_bytes: Vec::new(),
            suffix_pos: 0,
            stat_bytes: Vec::new(),
            stat_pos: 0,
            meta_bytes: Vec::new(),
            meta_pos: 0,
            metadata_upto: 0,
            start_byte_pos: 0,
            suffix_len: 0,
            sub_code: 0,
        }
    }

    /// Re-arm this frame slot for the chain at `fp`. Index-driven flags
    /// (`has_terms`, `is_floor`) are the caller's to set afterwards.
    pub fn reset(&mut self, fp: u64, prefix: usize) {
        self.fp = fp;
        self.fp_orig = fp;
        self.fp_end = fp;
        self.prefix = prefix;
        self.loaded = false;
        self.next_ent = 0;
        self.ent_count = 0;
        self.has_terms = false;
        self.has_terms_orig = false;
        self.is_floor = false;
        self.is_last_in_floor = true;
        self.last_sub_fp = None;
        self.term_block_ord = 0;
        self.metadata_upto = 0;
        self.floor_followers.clear();
        self.floor_next_idx = 0;
        self.sub_code = 0;
    }

    /// Back to the chain head, dropping scan progress but keeping the decoded
    /// floor directory.
    pub fn rewind(&mut self) {
        self.fp = self.fp_orig;
        self.loaded = false;
        self.has_terms = self.has_terms_orig;
        self.floor_next_idx = 0;
    }

    /// Next floor scan starts over from the chain head's directory. Forward
    /// scans from the head reach any sibling, so this is always safe; the
    /// in-block position is untouched.
    pub fn restart_floor_scan(&mut self) {
        self.floor_next_idx = 0;
    }

    pub fn entries_exhausted(&self) -> bool {
        self.loaded && self.next_ent == self.ent_count
    }

    pub fn suffix_strip_len(&self) -> u64 {
        self.suffix_bytes.len() as u64
    }

    pub fn stats_strip_len(&self) -> u64 {
        self.stat_bytes.len() as u64
    }

    /// Read and decode the sibling at `self.fp`. No-op when already loaded.
    ///
    /// `expected_prefix` is the path of bytes that led here; a block recording a
    /// different prefix means the file pointer landed on garbage.
    pub fn load_block(
        &mut self,
        input: &mut dyn IndexInput,
        expected_prefix: &[u8],
    ) -> TermDictResult<()> {
        if self.loaded {
            return Ok(());
        }
        debug_assert_eq!(expected_prefix.len(), self.prefix);
        input.seek(SeekFrom::Start(self.fp))?;

        let prefix_len = read_vint(input).map_err(corrupt)? as usize;
        if prefix_len != self.prefix {
            return Err(TermDictError::Corruption(format!(
                "block at fp {} records prefix length {} but was reached through {} bytes",
                self.fp, prefix_len, self.prefix
            )));
        }
        let mut prefix = vec![0u8; prefix_len];
        read_block_bytes(input, &mut prefix)?;
        if prefix != expected_prefix {
            return Err(TermDictError::Corruption(format!(
                "block at fp {} records prefix {:?}, expected {:?}",
                self.fp,
                prefix.escape_ascii().to_string(),
                expected_prefix.escape_ascii().to_string()
            )));
        }

        let code = BlockCode::decode(read_vint(input).map_err(corrupt)?)?;
        self.ent_count = code.entry_count;
        self.is_last_in_floor = code.last_in_floor;

        // The floor directory sits only in the chain head. Deltas are measured from
        // the head's fp_end, which is unknown until the strips below are consumed,
        // so hold the raw form and fix the pointers up at the end.
        let mut raw_followers: Vec<(u8, u64, bool)> = Vec::new();
        if code.floor_first {
            debug_assert_eq!(self.fp, self.fp_orig);
            let n = read_vint(input).map_err(corrupt)? as usize;
            if n == 0 || n > 255 {
                return Err(TermDictError::Corruption(format!(
                    "floor directory with {n} followers at fp {}",
                    self.fp
                )));
            }
            let mut last_label: i32 = -1;
            for _ in 0..n {
                let mut label = [0u8; 1];
                read_block_bytes(input, &mut label)?;
                if i32::from(label[0]) <= last_label {
                    return Err(TermDictError::Corruption(
                        "floor directory labels out of order".into(),
                    ));
                }
                last_label = i32::from(label[0]);
                let packed = read_vlong(input).map_err(corrupt)?;
                raw_followers.push((label[0], packed >> 1, packed & 1 != 0));
            }
        }

        let suffix_code = read_vint(input).map_err(corrupt)?;
        self.is_leaf_block = suffix_code & SUFFIX_SECTION_LEAF != 0;
        self.read_strip(input, suffix_code >> 1, Strip::Suffix)?;
        let stats_len = read_vint(input).map_err(corrupt)?;
        self.read_strip(input, stats_len, Strip::Stats)?;
        let meta_len = read_vint(input).map_err(corrupt)?;
        self.read_strip(input, meta_len, Strip::Meta)?;

        self.suffix_pos = 0;
        self.stat_pos = 0;
        self.meta_pos = 0;
        self.metadata_upto = 0;
        self.term_block_ord = 0;
        self.next_ent = 0;
        self.last_sub_fp = None;
        self.sub_code = 0;
        self.fp_end = input.stream_position()?;
        self.loaded = true;

        if !raw_followers.is_empty() {
            let base = self.fp_end;
            self.floor_followers.clear();
            let mut last_fp = self.fp;
            for (label, delta, follower_has_terms) in raw_followers {
                let fp = base
                    .checked_add(delta)
                    .ok_or_else(|| {
                        TermDictError::Corruption("floor directory pointer overflow".into())
                    })?;
                if fp <= last_fp {
                    return Err(TermDictError::Corruption(
                        "floor directory pointers out of order".into(),
                    ));
                }
                last_fp = fp;
                self.floor_followers.push(FloorFollower {
                    label,
                    fp,
                    has_terms: follower_has_terms,
                });
            }
            self.floor_next_idx = 0;
        }
        Ok(())
    }

    fn read_strip(
        &mut self,
        input: &mut dyn IndexInput,
        len: u32,
        which: Strip,
    ) -> TermDictResult<()> {
        if len > MAX_STRIP_LEN {
            return Err(TermDictError::Corruption(format!(
                "{} strip of {len} bytes exceeds the {MAX_STRIP_LEN} byte cap",
                which.name()
            )));
        }
        let buf = match which {
            Strip::Suffix => &mut self.suffix_bytes,
            Strip::Stats => &mut self.stat_bytes,
            Strip::Meta => &mut self.meta_bytes,
        };
        buf.resize(len as usize, 0);
        read_block_bytes(input, buf)
    }

    /// Floor siblings are contiguous, so the next one starts at `fp_end`.
    pub fn load_next_floor_block(
        &mut self,
        input: &mut dyn IndexInput,
        expected_prefix: &[u8],
    ) -> TermDictResult<()> {
        debug_assert!(self.loaded && !self.is_last_in_floor);
        self.fp = self.fp_end;
        self.loaded = false;
        self.load_block(input, expected_prefix)
    }

    /// Jump to the floor sibling whose label range covers `target`, consuming
    /// directory entries forward. Callers only ever seek forward within a chain;
    /// backward motion goes through `rewind` first.
    pub fn scan_to_floor_frame(
        &mut self,
        input: &mut dyn IndexInput,
        target: &[u8],
    ) -> TermDictResult<()> {
        if !self.is_floor || target.len() <= self.prefix {
            return Ok(());
        }
        if self.floor_followers.is_empty() {
            // Directory still undecoded; it lives in the chain head.
            debug_assert_eq!(self.fp, self.fp_orig);
            self.load_block(input, &target[..self.prefix])?;
            if self.floor_followers.is_empty() {
                return Err(TermDictError::Corruption(format!(
                    "indexed floor chain at fp {} has no floor directory",
                    self.fp_orig
                )));
            }
        }
        let target_label = target[self.prefix];
        if self.floor_next_idx >= self.floor_followers.len()
            || target_label < self.floor_followers[self.floor_next_idx].label
        {
            return Ok(());
        }

        let mut new_fp;
        loop {
            let follower = self.floor_followers[self.floor_next_idx];
            new_fp = follower.fp;
            self.has_terms = follower.has_terms;
            self.floor_next_idx += 1;
            if self.floor_next_idx == self.floor_followers.len() {
                self.is_last_in_floor = true;
                break;
            }
            self.is_last_in_floor = false;
            if target_label < self.floor_followers[self.floor_next_idx].label {
                break;
            }
        }
        if new_fp != self.fp {
            self.loaded = false;
            self.fp = new_fp;
        }
        Ok(())
    }

    /// Advance past entries until the sub-block pointing at `sub_fp` is the
    /// current one. Used when re-entering a parent whose scan position was lost.
    pub fn scan_to_sub_block(&mut self, sub_fp: u64) -> TermDictResult<()> {
        debug_assert!(self.loaded && !self.is_leaf_block);
        if self.last_sub_fp == Some(sub_fp) {
            return Ok(());
        }
        debug_assert!(sub_fp < self.fp_orig);
        let target_sub_code = self.fp_orig - sub_fp;
        loop {
            if self.next_ent >= self.ent_count {
                return Err(TermDictError::Corruption(format!(
                    "child block at fp {sub_fp} not referenced by its parent block"
                )));
            }
            self.next_ent += 1;
            let code = self.suffix_vint()?;
            self.skip_suffix((code >> 1) as usize)?;
            if code & ENTRY_FLAG_SUB_BLOCK != 0 {
                let sub_code = self.suffix_vlong()?;
                if sub_code == target_sub_code {
                    self.last_sub_fp = Some(sub_fp);
                    return Ok(());
                }
            } else {
                self.term_block_ord += 1;
            }
        }
    }

    /// Decode the next entry, filling `term` with its bytes. At the end of a
    /// non-last floor sibling the next sibling is loaded transparently.
    pub fn next_entry(
        &mut self,
        input: &mut dyn IndexInput,
        term: &mut TermBuf,
    ) -> TermDictResult<BlockEntry> {
        if self.is_leaf_block {
            self.next_leaf(term)?;
            return Ok(BlockEntry::Term);
        }
        loop {
            if self.next_ent == self.ent_count {
                if self.is_last_in_floor {
                    return Err(TermDictError::Corruption(format!(
                        "walked past the last entry of the block at fp {}",
                        self.fp
                    )));
                }
                self.load_next_floor_block(input, &term.bytes[..self.prefix])?;
                if self.is_leaf_block {
                    self.next_leaf(term)?;
                    return Ok(BlockEntry::Term);
                }
                continue;
            }
            self.next_ent += 1;
            let code = self.suffix_vint()?;
            self.suffix_len = (code >> 1) as usize;
            self.start_byte_pos = self.suffix_pos;
            self.skip_suffix(self.suffix_len)?;
            self.fill_term(term);
            if code & ENTRY_FLAG_SUB_BLOCK == 0 {
                self.sub_code = 0;
                self.term_block_ord += 1;
                return Ok(BlockEntry::Term);
            }
            let delta = self.suffix_vlong()?;
            let child = self.child_fp(delta)?;
            self.sub_code = delta;
            self.last_sub_fp = Some(child);
            return Ok(BlockEntry::SubBlock(child));
        }
    }

    fn next_leaf(&mut self, term: &mut TermBuf) -> TermDictResult<()> {
        debug_assert!(self.loaded && self.next_ent < self.ent_count);
        self.next_ent += 1;
        self.suffix_len = self.suffix_vint()? as usize;
        self.start_byte_pos = self.suffix_pos;
        self.skip_suffix(self.suffix_len)?;
        self.fill_term(term);
        Ok(())
    }

    /// Child pointers are deltas below the chain head; zero or an underflow
    /// cannot come from a well-formed file.
    fn child_fp(&self, delta: u64) -> TermDictResult<u64> {
        if delta == 0 || delta > self.fp_orig {
            return Err(TermDictError::Corruption(format!(
                "child pointer delta {delta} out of range for the chain at fp {}",
                self.fp_orig
            )));
        }
        Ok(self.fp_orig - delta)
    }

    /// Scan entries in order for `target`. With `fill_on_end` the buffer is left
    /// holding the last scanned entry even when the block runs out.
    pub fn scan_to_term(
        &mut self,
        term: &mut TermBuf,
        target: &[u8],
        fill_on_end: bool,
    ) -> TermDictResult<ScanResult> {
        debug_assert!(self.loaded);
        debug_assert!(target.len() >= self.prefix);
        if self.is_leaf_block {
            self.scan_leaf(term, target, fill_on_end)
        } else {
            self.scan_non_leaf(term, target, fill_on_end)
        }
    }

    fn scan_leaf(
        &mut self,
        term: &mut TermBuf,
        target: &[u8],
        fill_on_end: bool,
    ) -> TermDictResult<ScanResult> {
        self.sub_code = 0;
        if self.next_ent == self.ent_count {
            if fill_on_end {
                self.fill_term(term);
            }
            return Ok(ScanResult::End);
        }
        loop {
            self.next_ent += 1;
            self.suffix_len = self.suffix_vint()? as usize;
            self.start_byte_pos = self.suffix_pos;
            self.skip_suffix(self.suffix_len)?;
            let suffix =
                &self.suffix_bytes[self.start_byte_pos..self.start_byte_pos + self.suffix_len];
            match suffix.cmp(&target[self.prefix..]) {
                Ordering::Less => {
                    if self.next_ent == self.ent_count {
                        break;
                    }
                }
                Ordering::Greater => {
                    self.fill_term(term);
                    return Ok(ScanResult::After { is_term: true });
                }
                Ordering::Equal => {
                    self.fill_term(term);
                    return Ok(ScanResult::Found);
                }
            }
        }
        if fill_on_end {
            self.fill_term(term);
        }
        Ok(ScanResult::End)
    }

    fn scan_non_leaf(
        &mut self,
        term: &mut TermBuf,
        target: &[u8],
        fill_on_end: bool,
    ) -> TermDictResult<ScanResult> {
        if self.next_ent == self.ent_count {
            if fill_on_end {
                self.fill_term(term);
            }
            return Ok(ScanResult::End);
        }
        while self.next_ent < self.ent_count {
            self.next_ent += 1;
            let code = self.suffix_vint()?;
            self.suffix_len = (code >> 1) as usize;
            self.start_byte_pos = self.suffix_pos;
            self.skip_suffix(self.suffix_len)?;
            let is_term = code & ENTRY_FLAG_SUB_BLOCK == 0;
            if is_term {
                self.sub_code = 0;
                self.term_block_ord += 1;
            } else {
                let delta = self.suffix_vlong()?;
                let child = self.child_fp(delta)?;
                self.sub_code = delta;
                self.last_sub_fp = Some(child);
            }
            let suffix =
                &self.suffix_bytes[self.start_byte_pos..self.start_byte_pos + self.suffix_len];
            match suffix.cmp(&target[self.prefix..]) {
                Ordering::Less => {}
                Ordering::Equal if is_term => {
                    self.fill_term(term);
                    return Ok(ScanResult::Found);
                }
                // A sub-block prefix equal to the target still means the target
                // itself is absent; everything inside sorts after it.
                Ordering::Equal | Ordering::Greater => {
                    self.fill_term(term);
                    return Ok(ScanResult::After { is_term });
                }
            }
        }
        if fill_on_end {
            self.fill_term(term);
        }
        Ok(ScanResult::End)
    }

    /// Copy the entry the scan position points at into the shared buffer.
    fn fill_term(&self, term: &mut TermBuf) {
        term.set_suffix(
            self.prefix,
            &self.suffix_bytes[self.start_byte_pos..self.start_byte_pos + self.suffix_len],
        );
    }

    /// Decode stats and metadata strips up to the current entry. Lazy: a pure
    /// enumeration that never asks for stats never touches these strips.
    pub fn decode_stats(&mut self) -> TermDictResult<()> {
        let limit = if self.is_leaf_block {
            self.next_ent
        } else {
            self.term_block_ord
        };
        debug_assert!(limit > 0);
        let mut absolute = self.metadata_upto == 0;
        while self.metadata_upto < limit {
            let doc_freq = self.stat_vint()?;
            if doc_freq == 0 {
                return Err(TermDictError::Corruption(
                    "term with zero doc_freq".into(),
                ));
            }
            let extra = self.stat_vlong()?;
            self.state.doc_freq = doc_freq;
            self.state.total_term_freq = u64::from(doc_freq) + extra;
            let delta = self.meta_vlong()?;
            self.state.postings_fp = if absolute {
                delta
            } else {
                self.state.postings_fp + delta
            };
            self.metadata_upto += 1;
            absolute = false;
        }
        Ok(())
    }

    fn suffix_vint(&mut self) -> TermDictResult<u32> {
        let mut r = SliceReader::new(&self.suffix_bytes);
        r.set_position(self.suffix_pos)?;
        let v = r.read_vint()?;
        self.suffix_pos = r.position();
        Ok(v)
    }

    fn suffix_vlong(&mut self) -> TermDictResult<u64> {
        let mut r = SliceReader::new(&self.suffix_bytes);
        r.set_position(self.suffix_pos)?;
        let v = r.read_vlong()?;
        self.suffix_pos = r.position();
        Ok(v)
    }

    fn skip_suffix(&mut self, n: usize) -> TermDictResult<()> {
        let end = self
            .suffix_pos
            .checked_add(n)
            .filter(|&e| e <= self.suffix_bytes.len())
            .ok_or_else(|| TermDictError::Corruption("suffix strip overrun".into()))?;
        self.suffix_pos = end;
        Ok(())
    }

    fn stat_vint(&mut self) -> TermDictResult<u32> {
        let mut r = SliceReader::new(&self.stat_bytes);
        r.set_position(self.stat_pos)?;
        let v = r.read_vint()?;
        self.stat_pos = r.position();
        Ok(v)
    }

    fn stat_vlong(&mut self) -> TermDictResult<u64> {
        let mut r = SliceReader::new(&self.stat_bytes);
        r.set_position(self.stat_pos)?;
        let v = r.read_vlong()?;
        self.stat_pos = r.position();
        Ok(v)
    }

    fn meta_vlong(&mut self) -> TermDictResult<u64> {
        let mut r = SliceReader::new(&self.meta_bytes);
        r.set_position(self.meta_pos)?;
        let v = r.read_vlong()?;
        self.meta_pos = r.position();
        Ok(v)
    }
}

enum Strip {
    Suffix,
    Stats,
    Meta,
}

impl Strip {
    fn name(&self) -> &'static str {
        match self {
            Strip::Suffix => "suffix",
            Strip::Stats => "stats",
            Strip::Meta => "metadata",
        }
    }
}
