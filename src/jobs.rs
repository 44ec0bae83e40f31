//! Job graph tasks: gap discovery, batch alignment and merge.
//!
//! Each task is a plain serialisable description executed by a free
//! function. Tasks communicate only through files: an [`AlignBatchTask`]
//! writes one partial result, and a [`MergeTask`] concatenates them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::aligner::{evaluate_boundary, PairwiseAligner};
use crate::config::PipelineConfig;
use crate::dups::{write_rows, DuplicationRecord, REPORT_HEADER};
use crate::gaps::{find_flanked_gaps, partition, Batch, FlankedGap};
use crate::store::SequenceStore;

/// Finds every flanked gap of an assembly and cuts the list into batches.
pub fn gap_job<S: SequenceStore + ?Sized>(store: &S, config: &PipelineConfig) -> Result<Vec<Batch>> {
    let gaps = find_flanked_gaps(store, config)?;
    Ok(partition(gaps, config.split_size))
}

// ============================================================================
// Batch Alignment
// ============================================================================

/// One batch of gaps to align, plus where to write its partial result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignBatchTask {
    pub assembly: String,
    /// Sequence store the gap coordinates refer to.
    pub store: PathBuf,
    pub batch: Batch,
    /// Partial result file (rows only, no header).
    pub output: PathBuf,
    pub min_flank: usize,
    pub min_dup_size: usize,
}

impl AlignBatchTask {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read task: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Invalid task file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write task: {}", path.display()))?;
        Ok(())
    }
}

/// Runs the boundary check for every gap of `gaps` in order.
pub fn detect_duplications<S, A>(
    gaps: &[FlankedGap],
    store: &S,
    aligner: &A,
    min_flank: usize,
    min_dup_size: usize,
) -> Result<Vec<DuplicationRecord>>
where
    S: SequenceStore + ?Sized,
    A: PairwiseAligner + ?Sized,
{
    let mut records = Vec::new();
    for gap in gaps {
        let before = store.fetch(&gap.header, gap.before, gap.start)?.to_ascii_uppercase();
        let after = store.fetch(&gap.header, gap.end, gap.after)?.to_ascii_uppercase();
        if before.len() <= min_flank || after.len() <= min_flank {
            continue;
        }

        let hit = evaluate_boundary(aligner, &before, &after)
            .with_context(|| format!("{}:{}-{}", gap.header, gap.start, gap.end))?;
        if hit.size > min_dup_size {
            records.push(DuplicationRecord {
                header: gap.header.clone(),
                gap_start: gap.start,
                gap_end: gap.end,
                dup_size: hit.size,
                dup_pct_id: hit.pct_identity,
            });
        }
    }
    Ok(records)
}

/// Aligns one batch and overwrites its partial result file.
pub fn align_batch<S, A>(task: &AlignBatchTask, store: &S, aligner: &A) -> Result<Vec<DuplicationRecord>>
where
    S: SequenceStore + ?Sized,
    A: PairwiseAligner + ?Sized,
{
    let records = detect_duplications(
        &task.batch.gaps,
        store,
        aligner,
        task.min_flank,
        task.min_dup_size,
    )?;

    let mut buf = Vec::new();
    write_rows(&mut buf, &records)?;
    fs::write(&task.output, buf)
        .with_context(|| format!("Failed to write partial result: {}", task.output.display()))?;
    Ok(records)
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeTask {
    pub assembly: String,
    /// Partial result files in batch index order.
    pub partials: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Writes the header followed by every partial, in the order given.
///
/// The report is assembled in a temporary file next to `output` and
/// renamed into place, so `output` either holds the full report or is
/// left untouched.
pub fn merge(task: &MergeTask) -> Result<()> {
    let parent = match task.output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".gapdups_merge_")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temporary report in {}", parent.display()))?;

    {
        let mut writer = BufWriter::new(tmp.as_file());
        writeln!(writer, "{}", REPORT_HEADER)?;
        for partial in &task.partials {
            let file = fs::File::open(partial)
                .with_context(|| format!("Missing partial result: {}", partial.display()))?;
            std::io::copy(&mut BufReader::new(file), &mut writer)?;
        }
        writer.flush()?;
    }

    tmp.persist(&task.output)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write report: {}", task.output.display()))?;
    Ok(())
}
