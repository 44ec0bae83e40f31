//! Pipeline configuration shared by the job graph.

use anyhow::Result;
use std::path::PathBuf;

/// Default bound on each flank window.
pub const DEFAULT_MAX_SIZE: usize = 5000;
/// Default number of gaps per alignment batch.
pub const DEFAULT_SPLIT_SIZE: usize = 1000;
/// Flank windows must be strictly longer than this.
pub const DEFAULT_MIN_FLANK: usize = 5;
/// Duplications are reported only when strictly larger than this.
pub const DEFAULT_MIN_DUP_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum flank window length on each side of a gap.
    pub max_size: usize,
    /// Maximum number of gaps per batch.
    pub split_size: usize,
    /// Gaps with a window of this length or less are dropped.
    pub min_flank: usize,
    /// Report threshold (exclusive) on duplication size.
    pub min_dup_size: usize,
    /// Extra attempts for a failed batch before the assembly fails.
    pub max_retries: usize,
    /// Parent directory for per-assembly scratch space (system temp dir if unset).
    pub work_dir: Option<PathBuf>,
    /// Leave the scratch directory behind after the run.
    pub keep_work: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            split_size: DEFAULT_SPLIT_SIZE,
            min_flank: DEFAULT_MIN_FLANK,
            min_dup_size: DEFAULT_MIN_DUP_SIZE,
            max_retries: 2,
            work_dir: None,
            keep_work: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.split_size == 0 {
            anyhow::bail!("split size must be at least 1");
        }
        if self.max_size <= self.min_flank {
            anyhow::bail!(
                "max size ({}) must exceed the minimum flank length ({}), otherwise every gap is dropped",
                self.max_size,
                self.min_flank
            );
        }
        Ok(())
    }
}
