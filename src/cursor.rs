//! Term enumeration over one field's block tree.
//!
//! [`BlockTreeCursor`] drives a stack of [`Frame`]s, one per descended prefix, with
//! `stack[0]` as an unused sentinel so that frame ordinals equal stack indexes and
//! ordinal 0 means "not positioned". Seeks walk the field's in-memory FST byte by byte
//! along the target, push a frame for every indexed prefix passed, and finish with an
//! in-block scan; consecutive seeks reuse the deepest frames whose path still matches.
//!
//! The index maps a prefix to its chain head only. For floor chains the per-sibling
//! directory is read from the head block itself, so a floor-aware jump may load the
//! head before it can pick the sibling covering the target.

use std::cmp::Ordering;

use fst::raw::{CompiledAddr, Fst};

use crate::error::{TermDictError, TermDictResult};
use crate::formats::{output_block_fp, output_has_terms, output_is_floor, FieldMeta, TermStats};
use crate::frame::{BlockEntry, Frame, ScanResult, TermBuf};
use crate::stats::FieldStats;
use crate::storage::IndexInput;

/// Where a [`TermCursor::seek_ceil`] landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// Positioned exactly on the target.
    Found,
    /// Target absent; positioned on the smallest term greater than it.
    NotFound,
    /// Target sorts after every term in the field.
    End,
}

/// Ordered enumeration and point lookup over one field's terms.
pub trait TermCursor {
    /// Advance to the next term in order. `false` means the field is exhausted;
    /// the cursor stays terminal afterwards.
    fn next(&mut self) -> TermDictResult<bool>;

    /// Position exactly on `target` if present. On `false` the cursor is left on
    /// nearby state and remains usable.
    fn seek_exact(&mut self, target: &[u8]) -> TermDictResult<bool>;

    /// Position on the smallest term `>= target`.
    fn seek_ceil(&mut self, target: &[u8]) -> TermDictResult<SeekStatus>;

    /// Bytes of the current term.
    fn term(&self) -> &[u8];

    /// Stats of the current term, decoding lazily up to the current entry.
    fn stats(&mut self) -> TermDictResult<TermStats>;

    /// Zero-based rank of the current term. This dictionary does not maintain
    /// per-block run totals and reports unsupported instead of a wrong answer.
    fn ord(&self) -> TermDictResult<u64>;
}

/// One step of an index walk: the node reached after consuming a byte and the
/// transition outputs summed so far. Final outputs are added only when a frame
/// is pushed, matching how the packed codes were split across the map.
#[derive(Clone, Copy)]
struct Step {
    addr: CompiledAddr,
    output: u64,
}

enum Reposition {
    /// Exact seek of the term the cursor already sits on.
    Hit,
    /// Walk the index starting after this many verified bytes.
    WalkFrom(usize),
}

pub struct BlockTreeCursor<'a> {
    meta: &'a FieldMeta,
    fst: &'a Fst<Vec<u8>>,
    input: Box<dyn IndexInput>,

    /// `stack[ord].ord == ord`; `stack[0]` is never loaded.
    stack: Vec<Frame>,
    /// Ordinal of the deepest active frame; 0 when unpositioned.
    current: usize,

    /// `steps[i]` is the index state after consuming `term[..i]`; `steps[0]` is
    /// the root. Valid up to the deepest prefix the last walk reached.
    steps: Vec<Step>,

    term: TermBuf,
    term_exists: bool,
    eof: bool,

    /// How many leading term bytes are known to agree with the index path in
    /// `steps`. Frame reuse on the next seek is limited to this region.
    valid_index_prefix: usize,
    /// Frames at or below this ordinal keep their scan position when reused.
    target_before_current_length: usize,
}

impl<'a> BlockTreeCursor<'a> {
    pub(crate) fn new(
        meta: &'a FieldMeta,
        fst: &'a Fst<Vec<u8>>,
        input: Box<dyn IndexInput>,
    ) -> Self {
        let root = Step {
            addr: fst.root().addr(),
            output: 0,
        };
        BlockTreeCursor {
            meta,
            fst,
            input,
            stack: vec![Frame::new(0)],
            current: 0,
            steps: vec![root],
            term: TermBuf::new(),
            term_exists: false,
            eof: false,
            valid_index_prefix: 0,
            target_before_current_length: 0,
        }
    }

    fn ensure_frame(&mut self, ord: usize) {
        while self.stack.len() <= ord {
            self.stack.push(Frame::new(self.stack.len()));
        }
    }

    fn set_step(&mut self, idx: usize, step: Step) {
        if idx < self.steps.len() {
            self.steps[idx] = step;
        } else {
            debug_assert_eq!(idx, self.steps.len());
            self.steps.push(step);
        }
    }

    /// Push (or reuse) the frame for an index-mapped chain. `code` is the packed
    /// output from the map, `prefix` the number of term bytes it covers.
    fn push_frame_by_output(&mut self, code: u64, prefix: usize) -> usize {
        let fp = output_block_fp(code);
        let ord = self.current + 1;
        self.ensure_frame(ord);
        let keep_below = self.target_before_current_length;
        let frame = &mut self.stack[ord];
        if frame.fp_orig == fp && frame.loaded {
            if frame.ord > keep_below {
                frame.rewind();
            }
            debug_assert_eq!(frame.prefix, prefix);
        } else {
            frame.reset(fp, prefix);
        }
        frame.has_terms = output_has_terms(code);
        frame.has_terms_orig = frame.has_terms;
        frame.is_floor = output_is_floor(code);
        // Index-driven entry restarts the directory scan; in-block position is
        // kept, and a forward floor scan from the head reaches any sibling.
        frame.restart_floor_scan();
        ord
    }

    /// Push (or reuse) the frame for a sub-block discovered inside a parent
    /// block. No index data exists for it; floor state comes from its header.
    fn push_frame_by_fp(&mut self, fp: u64, prefix: usize) -> usize {
        let ord = self.current + 1;
        self.ensure_frame(ord);
        let keep_below = self.target_before_current_length;
        let frame = &mut self.stack[ord];
        if frame.fp_orig == fp && frame.loaded {
            if frame.ord > keep_below {
                frame.rewind();
            }
            debug_assert_eq!(frame.prefix, prefix);
        } else {
            frame.reset(fp, prefix);
        }
        ord
    }

    /// Walk the index along `target` starting at `target_upto` consumed bytes,
    /// pushing a frame at every indexed prefix. Returns the number of bytes the
    /// index could consume.
    fn walk_index(&mut self, target: &[u8], mut target_upto: usize) -> usize {
        let fst = self.fst;
        while target_upto < target.len() {
            let label = target[target_upto];
            let step = self.steps[target_upto];
            let node = fst.node(step.addr);
            let Some(t) = node.find_input(label) else {
                return target_upto;
            };
            let tr = node.transition(t);
            self.term.bytes[target_upto] = label;
            let next = Step {
                addr: tr.addr,
                output: step.output + tr.out.value(),
            };
            target_upto += 1;
            self.set_step(target_upto, next);
            let reached = fst.node(next.addr);
            if reached.is_final() {
                let code = next.output + reached.final_output().value();
                self.current = self.push_frame_by_output(code, target_upto);
            }
        }
        target_upto
    }

    /// Compare the current term against `target` within the still-indexed prefix
    /// and pick the deepest frame both share. Returns (ordering, shared frame
    /// ordinal, bytes compared equal inside the index region).
    fn compare_posted(&self, target: &[u8]) -> (Ordering, usize, usize) {
        debug_assert!(self.valid_index_prefix <= self.term.len);
        let mut last_frame = 1usize;
        let mut upto = 0usize;
        let limit = target.len().min(self.valid_index_prefix);
        let mut cmp = Ordering::Equal;
        while upto < limit {
            cmp = self.term.bytes[upto].cmp(&target[upto]);
            if cmp != Ordering::Equal {
                break;
            }
            upto += 1;
            if self.fst.node(self.steps[upto].addr).is_final() {
                debug_assert!(last_frame < self.current);
                last_frame += 1;
            }
        }
        if cmp == Ordering::Equal {
            // Order against the full current term; the frame choice stays at the
            // index-verified depth.
            let mut beyond = upto;
            let limit = target.len().min(self.term.len);
            while beyond < limit {
                cmp = self.term.bytes[beyond].cmp(&target[beyond]);
                if cmp != Ordering::Equal {
                    break;
                }
                beyond += 1;
            }
            if cmp == Ordering::Equal {
                cmp = self.term.len.cmp(&target.len());
            }
        }
        (cmp, last_frame, upto)
    }

    /// Rewind/reuse bookkeeping shared by both seeks. Leaves the cursor ready to
    /// walk the index from `WalkFrom`'s byte position; `Hit` short-circuits an
    /// exact seek already positioned on the target.
    fn position_for_seek(&mut self, target: &[u8], exact: bool) -> Reposition {
        self.eof = false;
        self.term.grow(target.len() + 1);
        self.target_before_current_length = self.current;

        if self.current > 0 {
            let (cmp, last_frame, upto) = self.compare_posted(target);
            match cmp {
                Ordering::Less => {
                    // Target sorts after the current term; frames up to the shared
                    // prefix stay warm.
                    self.current = last_frame;
                }
                Ordering::Greater => {
                    // Target sorts before the current term; scan positions beyond
                    // the shared frame are no longer usable.
                    self.target_before_current_length = last_frame;
                    self.current = last_frame;
                    self.stack[self.current].rewind();
                }
                Ordering::Equal => {
                    if exact && self.term_exists {
                        return Reposition::Hit;
                    }
                    // The entry equal to the target is behind the shared frame's
                    // scan position; re-scan from the head so it is seen again.
                    self.target_before_current_length = last_frame;
                    self.current = last_frame;
                    self.stack[self.current].rewind();
                }
            }
            Reposition::WalkFrom(upto)
        } else {
            self.target_before_current_length = 0;
            self.current = self.push_frame_by_output(self.meta.root_code, 0);
            Reposition::WalkFrom(0)
        }
    }

    /// Descend from the sub-block entry the scan stopped at down to its first
    /// term, loading chain heads along the way.
    fn descend_to_first_term(&mut self) -> TermDictResult<()> {
        loop {
            let fp = self.stack[self.current].last_sub_fp.ok_or_else(|| {
                TermDictError::InvalidState("descent without a sub-block position".into())
            })?;
            let prefix = self.term.len;
            self.current = self.push_frame_by_fp(fp, prefix);
            self.stack[self.current]
                .load_block(self.input.as_mut(), &self.term.bytes[..prefix])?;
            match self.stack[self.current].next_entry(self.input.as_mut(), &mut self.term)? {
                BlockEntry::Term => return Ok(()),
                BlockEntry::SubBlock(_) => {}
            }
        }
    }

    /// Full structural walk feeding the aggregator; leaves the cursor
    /// unpositioned, as if freshly created.
    pub(crate) fn compute_field_stats(&mut self) -> TermDictResult<FieldStats> {
        fn start_event(stats: &mut FieldStats, frame: &Frame, is_floor: bool) {
            stats.start_block(frame.prefix, frame.fp == frame.fp_orig, is_floor);
        }
        fn end_event(stats: &mut FieldStats, frame: &Frame) -> TermDictResult<()> {
            let term_count = if frame.is_leaf_block {
                frame.ent_count
            } else {
                frame.term_block_ord
            };
            let sub_count = frame.ent_count - term_count;
            let strips = frame.suffix_strip_len() + frame.stats_strip_len();
            let other = frame
                .fp_end
                .checked_sub(frame.fp)
                .and_then(|span| span.checked_sub(strips))
                .filter(|&b| b > 0)
                .ok_or_else(|| {
                    TermDictError::Corruption(format!(
                        "block at fp {} spans fewer bytes than its strips",
                        frame.fp
                    ))
                })?;
            stats.end_block(
                term_count,
                sub_count,
                frame.suffix_strip_len(),
                frame.stats_strip_len(),
                other,
            );
            Ok(())
        }

        let mut stats = FieldStats::new(&self.meta.name, self.meta.index_len);
        self.reset_position();

        self.current = self.push_frame_by_output(self.meta.root_code, 0);
        self.stack[self.current].load_block(self.input.as_mut(), &[])?;
        start_event(
            &mut stats,
            &self.stack[self.current],
            !self.stack[self.current].is_last_in_floor,
        );

        'walk: loop {
            while self.stack[self.current].entries_exhausted() {
                end_event(&mut stats, &self.stack[self.current])?;
                if !self.stack[self.current].is_last_in_floor {
                    let prefix = self.stack[self.current].prefix;
                    self.stack[self.current]
                        .load_next_floor_block(self.input.as_mut(), &self.term.bytes[..prefix])?;
                    start_event(&mut stats, &self.stack[self.current], true);
                    break;
                }
                if self.current == 1 {
                    break 'walk;
                }
                let child_fp = self.stack[self.current].fp_orig;
                self.current -= 1;
                debug_assert_eq!(self.stack[self.current].last_sub_fp, Some(child_fp));
            }
            loop {
                match self.stack[self.current].next_entry(self.input.as_mut(), &mut self.term)? {
                    BlockEntry::Term => {
                        stats.term(self.term.len);
                        break;
                    }
                    BlockEntry::SubBlock(fp) => {
                        let prefix = self.term.len;
                        self.current = self.push_frame_by_fp(fp, prefix);
                        self.stack[self.current]
                            .load_block(self.input.as_mut(), &self.term.bytes[..prefix])?;
                        start_event(
                            &mut stats,
                            &self.stack[self.current],
                            !self.stack[self.current].is_last_in_floor,
                        );
                    }
                }
            }
        }

        stats.finish();
        self.reset_position();
        Ok(stats)
    }

    fn reset_position(&mut self) {
        self.current = 0;
        self.eof = false;
        self.term.len = 0;
        self.term_exists = false;
        self.valid_index_prefix = 0;
        self.target_before_current_length = 0;
    }
}

impl TermCursor for BlockTreeCursor<'_> {
    fn next(&mut self) -> TermDictResult<bool> {
        if self.eof {
            return Ok(false);
        }
        if self.current == 0 {
            self.current = self.push_frame_by_output(self.meta.root_code, 0);
            self.stack[self.current].load_block(self.input.as_mut(), &[])?;
        } else {
            // A failed seek may have left the deepest frame targeted but unread.
            let prefix = self.stack[self.current].prefix;
            self.stack[self.current]
                .load_block(self.input.as_mut(), &self.term.bytes[..prefix])?;
        }
        self.target_before_current_length = self.current;

        while self.stack[self.current].entries_exhausted() {
            if !self.stack[self.current].is_last_in_floor {
                let prefix = self.stack[self.current].prefix;
                self.stack[self.current]
                    .load_next_floor_block(self.input.as_mut(), &self.term.bytes[..prefix])?;
                break;
            }
            if self.current == 1 {
                self.eof = true;
                self.term_exists = false;
                self.term.len = 0;
                self.valid_index_prefix = 0;
                self.stack[1].rewind();
                return Ok(false);
            }
            // Pop. The parent may have been retargeted by seeks since we
            // descended, in which case its scan position is rebuilt.
            let child_fp = self.stack[self.current].fp_orig;
            self.current -= 1;
            let parent = &mut self.stack[self.current];
            if !parent.loaded || parent.last_sub_fp != Some(child_fp) {
                parent.scan_to_floor_frame(
                    self.input.as_mut(),
                    &self.term.bytes[..self.term.len],
                )?;
                let prefix = parent.prefix;
                parent.load_block(self.input.as_mut(), &self.term.bytes[..prefix])?;
                parent.scan_to_sub_block(child_fp)?;
            }
            self.valid_index_prefix = self.valid_index_prefix.min(self.stack[self.current].prefix);
        }

        loop {
            match self.stack[self.current].next_entry(self.input.as_mut(), &mut self.term)? {
                BlockEntry::Term => {
                    self.term_exists = true;
                    return Ok(true);
                }
                BlockEntry::SubBlock(fp) => {
                    let prefix = self.term.len;
                    self.current = self.push_frame_by_fp(fp, prefix);
                    self.stack[self.current]
                        .load_block(self.input.as_mut(), &self.term.bytes[..prefix])?;
                }
            }
        }
    }

    fn seek_exact(&mut self, target: &[u8]) -> TermDictResult<bool> {
        let upto = match self.position_for_seek(target, true) {
            Reposition::Hit => return Ok(true),
            Reposition::WalkFrom(upto) => upto,
        };
        let consumed = self.walk_index(target, upto);
        self.valid_index_prefix = self.stack[self.current].prefix;

        let frame = &mut self.stack[self.current];
        frame.scan_to_floor_frame(self.input.as_mut(), target)?;
        if !frame.has_terms {
            // The target can only live as a direct term of this block, and the
            // block holds none.
            self.term_exists = false;
            if consumed < target.len() {
                self.term.bytes[consumed] = target[consumed];
                self.term.len = consumed + 1;
            } else {
                self.term.len = consumed;
            }
            return Ok(false);
        }
        frame.load_block(self.input.as_mut(), &target[..frame.prefix])?;
        match frame.scan_to_term(&mut self.term, target, true)? {
            ScanResult::Found => {
                self.term_exists = true;
                Ok(true)
            }
            ScanResult::After { .. } | ScanResult::End => {
                // A miss leaves the buffer on nearby scan state, not on a hit.
                self.term_exists = false;
                Ok(false)
            }
        }
    }

    fn seek_ceil(&mut self, target: &[u8]) -> TermDictResult<SeekStatus> {
        let upto = match self.position_for_seek(target, false) {
            Reposition::Hit => return Ok(SeekStatus::Found),
            Reposition::WalkFrom(upto) => upto,
        };
        self.walk_index(target, upto);
        self.valid_index_prefix = self.stack[self.current].prefix;

        let frame = &mut self.stack[self.current];
        frame.scan_to_floor_frame(self.input.as_mut(), target)?;
        frame.load_block(self.input.as_mut(), &target[..frame.prefix])?;
        match frame.scan_to_term(&mut self.term, target, false)? {
            ScanResult::Found => {
                self.term_exists = true;
                Ok(SeekStatus::Found)
            }
            ScanResult::After { is_term: true } => {
                self.term_exists = true;
                Ok(SeekStatus::NotFound)
            }
            ScanResult::After { is_term: false } => {
                // Smallest term greater than the target lives under the
                // sub-block the scan stopped at.
                self.descend_to_first_term()?;
                self.term_exists = true;
                Ok(SeekStatus::NotFound)
            }
            ScanResult::End => {
                self.term.set_suffix(0, target);
                self.term_exists = false;
                if self.next()? {
                    Ok(SeekStatus::NotFound)
                } else {
                    Ok(SeekStatus::End)
                }
            }
        }
    }

    fn term(&self) -> &[u8] {
        self.term.term()
    }

    fn stats(&mut self) -> TermDictResult<TermStats> {
        if self.current == 0 || !self.term_exists {
            return Err(TermDictError::InvalidState(
                "cursor is not positioned on a term".into(),
            ));
        }
        let frame = &mut self.stack[self.current];
        frame.decode_stats()?;
        Ok(frame.state)
    }

    fn ord(&self) -> TermDictResult<u64> {
        Err(TermDictError::NotSupported(
            "term ordinals are not tracked by this dictionary".into(),
        ))
    }
}
