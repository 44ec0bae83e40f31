//! Gap scanning, flank windows and batch partitioning.
//!
//! A gap is a maximal run of unknown bases (`N`/`n`). Each gap that has
//! enough real sequence on both sides becomes a [`FlankedGap`], and the
//! per-assembly list of those is cut into fixed-size [`Batch`]es for the
//! alignment jobs.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::store::SequenceStore;

#[inline]
fn is_unknown(base: u8) -> bool {
    base == b'N' || base == b'n'
}

// ============================================================================
// Gap Scanner
// ============================================================================

/// Half-open interval `[start, end)` of unknown bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapInterval {
    pub start: usize,
    pub end: usize,
}

/// Lazily yields every maximal run of `N`/`n` in ascending order.
pub struct GapScanner<'a> {
    seq: &'a [u8],
    pos: usize,
}

impl<'a> GapScanner<'a> {
    pub fn new(seq: &'a [u8]) -> Self {
        Self { seq, pos: 0 }
    }
}

impl Iterator for GapScanner<'_> {
    type Item = GapInterval;

    fn next(&mut self) -> Option<GapInterval> {
        let rest = self.seq.get(self.pos..)?;
        let start = self.pos + rest.iter().position(|&b| is_unknown(b))?;
        let run = self.seq[start..]
            .iter()
            .take_while(|&&b| is_unknown(b))
            .count();
        self.pos = start + run;
        Some(GapInterval {
            start,
            end: self.pos,
        })
    }
}

/// Convenience wrapper over [`GapScanner`].
pub fn find_gaps(seq: &str) -> GapScanner<'_> {
    GapScanner::new(seq.as_bytes())
}

// ============================================================================
// Flanked Gaps
// ============================================================================

/// A gap together with the flank windows `[before, start)` and `[end, after)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlankedGap {
    pub header: String,
    pub start: usize,
    pub end: usize,
    pub before: usize,
    pub after: usize,
}

impl FlankedGap {
    pub fn before_len(&self) -> usize {
        self.start - self.before
    }

    pub fn after_len(&self) -> usize {
        self.after - self.end
    }
}

/// Bounds both windows by `max_size`; `None` when either window is
/// `min_flank` bases or shorter.
pub fn flank_gap(
    header: &str,
    gap: GapInterval,
    seq_len: usize,
    max_size: usize,
    min_flank: usize,
) -> Option<FlankedGap> {
    let before = gap.start.saturating_sub(max_size);
    let after = (gap.end + max_size).min(seq_len);
    if gap.start - before <= min_flank || after - gap.end <= min_flank {
        return None;
    }
    Some(FlankedGap {
        header: header.to_string(),
        start: gap.start,
        end: gap.end,
        before,
        after,
    })
}

/// Collects the flanked gaps of every sequence, in store order then
/// position order.
pub fn find_flanked_gaps<S: SequenceStore + ?Sized>(
    store: &S,
    config: &PipelineConfig,
) -> Result<Vec<FlankedGap>> {
    let mut flanked = Vec::new();
    for name in store.names() {
        let len = store.length(&name)?;
        let seq = store.fetch(&name, 0, len)?;
        let mut dropped = 0usize;
        for gap in find_gaps(&seq) {
            match flank_gap(&name, gap, len, config.max_size, config.min_flank) {
                Some(fg) => flanked.push(fg),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            log::debug!("{}: {} gap(s) without enough flanking sequence", name, dropped);
        }
    }
    Ok(flanked)
}

/// Total number of gaps in the store, flanked or not.
pub fn count_gaps<S: SequenceStore + ?Sized>(store: &S) -> Result<usize> {
    let mut total = 0;
    for name in store.names() {
        let len = store.length(&name)?;
        total += find_gaps(&store.fetch(&name, 0, len)?).count();
    }
    Ok(total)
}

// ============================================================================
// Batches
// ============================================================================

/// A contiguous slice of an assembly's gap list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: usize,
    pub gaps: Vec<FlankedGap>,
}

/// Batch `i` holds gaps `[i * split_size, (i + 1) * split_size)`.
pub fn partition(gaps: Vec<FlankedGap>, split_size: usize) -> Vec<Batch> {
    let split_size = split_size.max(1);
    let mut batches = Vec::with_capacity(gaps.len().div_ceil(split_size));
    let mut iter = gaps.into_iter().peekable();
    while iter.peek().is_some() {
        let chunk: Vec<FlankedGap> = iter.by_ref().take(split_size).collect();
        batches.push(Batch {
            index: batches.len(),
            gaps: chunk,
        });
    }
    batches
}
