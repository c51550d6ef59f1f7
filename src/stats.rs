//! Per-field block statistics gathered by walking every block of a field.
//!
//! The aggregator is fed start/end events by the cursor's depth-first block walk.
//! Its counting identities hold for any file the walk accepts:
//!
//! - every started block is ended exactly once
//! - `total_block_count == non_floor_block_count + floor_sub_block_count`
//! - `total_block_count == mixed + terms_only + sub_blocks_only`
//!
//! The identities guard the walk's own bookkeeping, so they are `debug_assert!`s
//! rather than runtime errors.

use std::fmt;

/// Statistics for one field, produced by [`crate::reader::TermDictReader::field_stats`].
#[derive(Debug, Clone, Default)]
pub struct FieldStats {
    /// Field these statistics describe.
    pub field: String,
    /// Size in bytes of the field's prefix index automaton.
    pub index_num_bytes: u64,
    /// Terms seen during the walk.
    pub total_term_count: u64,
    /// Sum of term lengths in bytes.
    pub total_term_bytes: u64,
    /// Blocks seen during the walk, floor siblings included.
    pub total_block_count: u64,
    /// Blocks that are not part of any floor chain.
    pub non_floor_block_count: u64,
    /// Floor chains (counted once, at the chain's first block).
    pub floor_block_count: u64,
    /// Blocks belonging to floor chains, the first block included.
    pub floor_sub_block_count: u64,
    /// Blocks holding both terms and sub-block pointers.
    pub mixed_block_count: u64,
    /// Blocks holding only terms.
    pub terms_only_block_count: u64,
    /// Blocks holding only sub-block pointers.
    pub sub_blocks_only_block_count: u64,
    /// Bytes spent on suffix strips.
    pub total_block_suffix_bytes: u64,
    /// Bytes spent on statistics strips.
    pub total_block_stats_bytes: u64,
    /// Bytes spent on everything else (headers, length words, metadata strips).
    pub total_block_other_bytes: u64,
    /// Block count indexed by the block's prefix length.
    pub block_count_by_prefix_len: Vec<u64>,
    started: u64,
    ended: u64,
}

impl FieldStats {
    pub(crate) fn new(field: &str, index_num_bytes: u64) -> Self {
        Self {
            field: field.to_string(),
            index_num_bytes,
            ..Self::default()
        }
    }

    pub(crate) fn start_block(&mut self, prefix_len: usize, entering_chain: bool, is_floor: bool) {
        self.started += 1;
        self.total_block_count += 1;
        if is_floor {
            if entering_chain {
                self.floor_block_count += 1;
            }
            self.floor_sub_block_count += 1;
        } else {
            self.non_floor_block_count += 1;
        }
        if self.block_count_by_prefix_len.len() <= prefix_len {
            self.block_count_by_prefix_len.resize(prefix_len + 1, 0);
        }
        self.block_count_by_prefix_len[prefix_len] += 1;
    }

    pub(crate) fn end_block(
        &mut self,
        term_count: usize,
        sub_block_count: usize,
        suffix_bytes: u64,
        stats_bytes: u64,
        other_bytes: u64,
    ) {
        self.ended += 1;
        debug_assert!(term_count + sub_block_count > 0);
        if term_count != 0 && sub_block_count != 0 {
            self.mixed_block_count += 1;
        } else if term_count != 0 {
            self.terms_only_block_count += 1;
        } else {
            self.sub_blocks_only_block_count += 1;
        }
        self.total_block_suffix_bytes += suffix_bytes;
        self.total_block_stats_bytes += stats_bytes;
        // Header and length words always occupy at least one byte.
        debug_assert!(other_bytes > 0);
        self.total_block_other_bytes += other_bytes;
    }

    pub(crate) fn term(&mut self, term_len: usize) {
        self.total_term_count += 1;
        self.total_term_bytes += term_len as u64;
    }

    pub(crate) fn finish(&mut self) {
        debug_assert_eq!(self.started, self.ended);
        debug_assert_eq!(
            self.total_block_count,
            self.non_floor_block_count + self.floor_sub_block_count
        );
        debug_assert_eq!(
            self.total_block_count,
            self.mixed_block_count
                + self.terms_only_block_count
                + self.sub_blocks_only_block_count
        );
    }
}

impl fmt::Display for FieldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "field: {}", self.field)?;
        writeln!(f, "  index: {} bytes", self.index_num_bytes)?;
        writeln!(f, "  terms: {}", self.total_term_count)?;
        if self.total_term_count > 0 {
            writeln!(
                f,
                "  term bytes: {} ({:.1} bytes/term)",
                self.total_term_bytes,
                self.total_term_bytes as f64 / self.total_term_count as f64
            )?;
        } else {
            writeln!(f, "  term bytes: {}", self.total_term_bytes)?;
        }
        writeln!(f, "  blocks: {}", self.total_block_count)?;
        writeln!(f, "    terms-only: {}", self.terms_only_block_count)?;
        writeln!(f, "    sub-blocks-only: {}", self.sub_blocks_only_block_count)?;
        writeln!(f, "    mixed: {}", self.mixed_block_count)?;
        writeln!(f, "    non-floor: {}", self.non_floor_block_count)?;
        writeln!(f, "    floor chains: {}", self.floor_block_count)?;
        writeln!(f, "    floor blocks: {}", self.floor_sub_block_count)?;
        writeln!(f, "  suffix bytes: {}", self.total_block_suffix_bytes)?;
        writeln!(f, "  stats bytes: {}", self.total_block_stats_bytes)?;
        writeln!(f, "  other bytes: {}", self.total_block_other_bytes)?;
        writeln!(f, "  blocks by prefix length:")?;
        for (len, count) in self.block_count_by_prefix_len.iter().enumerate() {
            if *count != 0 {
                writeln!(f, "    {len:>4}: {count}")?;
            }
        }
        Ok(())
    }
}
