//! Two-level fan-out/fan-in over assemblies and their batches.
//!
//! ```text
//! assemblies ──par──> gap_job ──> batches ──par──> align_batch ──join──> merge
//! ```
//! Assemblies are independent. Within one assembly every batch writes its
//! own partial result, and the merge runs only once all of them exist.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

use crate::aligner::PairwiseAligner;
use crate::config::PipelineConfig;
use crate::dups::DuplicationRecord;
use crate::error::GapDupError;
use crate::jobs::{align_batch, gap_job, merge, AlignBatchTask, MergeTask};
use crate::store::{open_store, SequenceStore};

// ============================================================================
// Assembly State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Pending,
    /// Batches created.
    GapsFound,
    /// Batches in flight.
    Aligning,
    Merged,
}

impl AssemblyState {
    fn successor(self) -> Option<Self> {
        match self {
            AssemblyState::Pending => Some(AssemblyState::GapsFound),
            AssemblyState::GapsFound => Some(AssemblyState::Aligning),
            AssemblyState::Aligning => Some(AssemblyState::Merged),
            AssemblyState::Merged => None,
        }
    }
}

/// Lifecycle of one assembly plus its completed-batch counter.
#[derive(Debug)]
pub struct AssemblyProgress {
    assembly: String,
    state: AssemblyState,
    total_batches: usize,
    completed: AtomicUsize,
}

impl AssemblyProgress {
    pub fn new(assembly: &str) -> Self {
        Self {
            assembly: assembly.to_string(),
            state: AssemblyState::Pending,
            total_batches: 0,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    pub fn completed_batches(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn advance(&mut self, to: AssemblyState) -> Result<()> {
        if self.state.successor() != Some(to) {
            return Err(GapDupError::InvalidTransition {
                assembly: self.assembly.clone(),
                from: self.state,
                to,
            }
            .into());
        }
        self.state = to;
        Ok(())
    }

    /// `Pending -> GapsFound`, recording how many batches must complete.
    pub fn gaps_found(&mut self, batches: usize) -> Result<()> {
        self.advance(AssemblyState::GapsFound)?;
        self.total_batches = batches;
        Ok(())
    }

    /// `GapsFound -> Aligning`.
    pub fn start_aligning(&mut self) -> Result<()> {
        self.advance(AssemblyState::Aligning)
    }

    /// Records one finished batch; returns the number finished so far.
    pub fn batch_done(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Fails unless the assembly is aligning and every batch has finished.
    pub fn ready_to_merge(&self) -> Result<()> {
        if self.state != AssemblyState::Aligning {
            return Err(GapDupError::InvalidTransition {
                assembly: self.assembly.clone(),
                from: self.state,
                to: AssemblyState::Merged,
            }
            .into());
        }
        let done = self.completed_batches();
        if done != self.total_batches {
            anyhow::bail!(
                "{}: cannot merge with {} of {} batches complete",
                self.assembly,
                done,
                self.total_batches
            );
        }
        Ok(())
    }

    /// `Aligning -> Merged`; refused while any batch is outstanding.
    pub fn merged(&mut self) -> Result<()> {
        self.ready_to_merge()?;
        self.advance(AssemblyState::Merged)
    }
}

/// Runs the merge only once every batch of `progress` has finished, then
/// marks the assembly merged. Nothing is written when the check fails.
pub fn merge_when_complete(progress: &mut AssemblyProgress, task: &MergeTask) -> Result<()> {
    progress.ready_to_merge()?;
    merge(task)?;
    progress.merged()
}

// ============================================================================
// Orchestrator
// ============================================================================

/// One `(sequence store, report)` pair.
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub store: PathBuf,
    pub output: PathBuf,
}

impl AssemblyJob {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(store: P, output: Q) -> Self {
        Self {
            store: store.into(),
            output: output.into(),
        }
    }

    /// Assembly identifier used in logs and task files.
    pub fn id(&self) -> String {
        self.store
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.store.display().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct AssemblySummary {
    pub assembly: String,
    pub gaps: usize,
    pub batches: usize,
    pub duplications: usize,
    pub output: PathBuf,
}

pub struct Orchestrator<'a, A: PairwiseAligner + ?Sized> {
    aligner: &'a A,
    config: &'a PipelineConfig,
}

impl<'a, A: PairwiseAligner + ?Sized> Orchestrator<'a, A> {
    pub fn new(aligner: &'a A, config: &'a PipelineConfig) -> Self {
        Self { aligner, config }
    }

    /// Runs every assembly in parallel. Results are in input order; one
    /// assembly failing does not stop the others.
    pub fn run(&self, jobs: &[AssemblyJob]) -> Vec<Result<AssemblySummary>> {
        jobs.par_iter()
            .map(|job| {
                self.run_assembly(job)
                    .with_context(|| format!("Assembly {} failed", job.id()))
            })
            .collect()
    }

    pub fn run_assembly(&self, job: &AssemblyJob) -> Result<AssemblySummary> {
        self.config.validate()?;
        let store = open_store(&job.store)?;
        self.run_with_store(job, store.as_ref())
    }

    fn run_with_store(&self, job: &AssemblyJob, store: &dyn SequenceStore) -> Result<AssemblySummary> {
        let id = job.id();
        let mut progress = AssemblyProgress::new(&id);

        let batches = gap_job(store, self.config)?;
        let gaps: usize = batches.iter().map(|b| b.gaps.len()).sum();
        progress.gaps_found(batches.len())?;
        log::info!("{}: {} gaps in {} batches", id, gaps, batches.len());

        let work = self.work_dir()?;
        let tasks: Vec<AlignBatchTask> = batches
            .into_iter()
            .map(|batch| AlignBatchTask {
                assembly: id.clone(),
                store: job.store.clone(),
                output: work.path().join(format!("batch_{:05}.tsv", batch.index)),
                batch,
                min_flank: self.config.min_flank,
                min_dup_size: self.config.min_dup_size,
            })
            .collect();
        for task in &tasks {
            task.save(&task_path(work.path(), task.batch.index))?;
        }

        progress.start_aligning()?;
        let failed = AtomicBool::new(false);
        let counts = tasks
            .par_iter()
            .map(|task| {
                if failed.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                match self.align_with_retries(task, store) {
                    Ok(records) => {
                        let done = progress.batch_done();
                        log::debug!(
                            "{}: batch {} done ({}/{})",
                            id,
                            task.batch.index,
                            done,
                            progress.total_batches()
                        );
                        Ok(Some(records.len()))
                    }
                    Err(e) => {
                        failed.store(true, Ordering::SeqCst);
                        Err(e)
                    }
                }
            })
            .collect::<Result<Vec<Option<usize>>>>()?;
        let duplications: usize = counts.iter().flatten().sum();

        let merge_task = MergeTask {
            assembly: id.clone(),
            partials: tasks.iter().map(|t| t.output.clone()).collect(),
            output: job.output.clone(),
        };
        merge_when_complete(&mut progress, &merge_task)?;
        log::info!("{}: {} duplications written to {}", id, duplications, job.output.display());

        if self.config.keep_work {
            let kept = work.into_path();
            log::info!("{}: work directory kept at {}", id, kept.display());
        }

        Ok(AssemblySummary {
            assembly: id,
            gaps,
            batches: tasks.len(),
            duplications,
            output: job.output.clone(),
        })
    }

    /// Re-runs a failed batch from scratch up to `max_retries` times.
    /// Ambiguous alignments are deterministic and fail immediately.
    fn align_with_retries(&self, task: &AlignBatchTask, store: &dyn SequenceStore) -> Result<Vec<DuplicationRecord>> {
        let mut attempt = 0;
        loop {
            match align_batch(task, store, self.aligner) {
                Ok(records) => return Ok(records),
                Err(e) if attempt < self.config.max_retries && !is_ambiguous(&e) => {
                    attempt += 1;
                    log::warn!(
                        "{}: batch {} failed ({:#}), retry {}/{}",
                        task.assembly,
                        task.batch.index,
                        e,
                        attempt,
                        self.config.max_retries
                    );
                }
                Err(e) => {
                    return Err(e.context(format!("Batch {} failed", task.batch.index)));
                }
            }
        }
    }

    fn work_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("gapdups_");
        let dir = match &self.config.work_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create work directory: {}", parent.display()))?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        };
        dir.context("Failed to create work directory")
    }
}

fn task_path(work: &Path, index: usize) -> PathBuf {
    work.join(format!("batch_{:05}.json", index))
}

fn is_ambiguous(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<GapDupError>(),
            Some(GapDupError::AmbiguousAlignment { .. })
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::testing::{FlakyAligner, OverlapAligner, ScriptedAligner};
    use crate::aligner::CandidateAlignment;
    use crate::dups::{ReportReader, REPORT_HEADER};
    use std::fs;

    const DUP: &str = "GATTACAGCCTTAGGCATCGAATCG";

    /// Deterministic pseudo-random bases.
    fn bases(seed: u64, len: usize) -> String {
        let mut x = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(x >> 62) as usize] as char
            })
            .collect()
    }

    fn write_fasta(dir: &Path, name: &str, seqs: &[(&str, String)]) -> PathBuf {
        let path = dir.join(name);
        let text: String = seqs.iter().map(|(n, s)| format!(">{}\n{}\n", n, s)).collect();
        fs::write(&path, text).unwrap();
        path
    }

    /// Three gaps: two with a 25-base duplication on both sides, one without.
    fn assembly(dir: &Path) -> PathBuf {
        let gap = "N".repeat(10);
        let chr1 = format!(
            "{}{}{}{}{}{}{}",
            bases(1, 40),
            DUP,
            gap,
            DUP,
            bases(2, 40),
            gap,
            bases(3, 40)
        );
        let chr2 = format!("{}{}{}{}{}", bases(4, 30), DUP, gap, DUP, bases(5, 30));
        write_fasta(dir, "asm.fa", &[("chr1", chr1), ("chr2", chr2)])
    }

    #[test]
    fn test_end_to_end_single_duplication() {
        let dir = tempfile::tempdir().unwrap();
        let gap = "N".repeat(10);
        let seq = format!("{}{}{}{}{}", bases(7, 50), DUP, gap, DUP, bases(8, 50));
        let store = write_fasta(dir.path(), "one.fa", &[("scaf", seq)]);
        let output = dir.path().join("one.dups");

        let config = PipelineConfig::default();
        let aligner = OverlapAligner::default();
        let summary = Orchestrator::new(&aligner, &config)
            .run_assembly(&AssemblyJob::new(&store, &output))
            .unwrap();
        assert_eq!(summary.duplications, 1);

        let records = ReportReader::open(&output).unwrap().records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].gap_start, records[0].gap_end), (75, 85));
        assert!(records[0].dup_size >= 21);
        assert_eq!(records[0].dup_pct_id, 100.0);
    }

    #[test]
    fn test_short_flank_gives_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let seq = format!("ACGT{}TAGCTAGC", "N".repeat(10));
        let store = write_fasta(dir.path(), "short.fa", &[("s", seq)]);
        let output = dir.path().join("short.dups");

        let config = PipelineConfig::default();
        let aligner = OverlapAligner::default();
        let summary = Orchestrator::new(&aligner, &config)
            .run_assembly(&AssemblyJob::new(&store, &output))
            .unwrap();
        assert_eq!((summary.gaps, summary.batches), (0, 0));
        assert_eq!(aligner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), format!("{}\n", REPORT_HEADER));
    }

    #[test]
    fn test_partitioning_does_not_change_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = assembly(dir.path());
        let aligner = OverlapAligner::default();

        let mut reports = Vec::new();
        for split in [1, 2, 1000] {
            let config = PipelineConfig {
                split_size: split,
                ..PipelineConfig::default()
            };
            let output = dir.path().join(format!("split{}.dups", split));
            let summary = Orchestrator::new(&aligner, &config)
                .run_assembly(&AssemblyJob::new(&store, &output))
                .unwrap();
            assert_eq!(summary.gaps, 3);
            assert_eq!(summary.batches, 3usize.div_ceil(split));
            reports.push(fs::read(&output).unwrap());
        }
        assert_eq!(reports[0], reports[1]);
        assert_eq!(reports[0], reports[2]);

        let text = String::from_utf8(reports.remove(0)).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = assembly(dir.path());
        let output = dir.path().join("retry.dups");
        let config = PipelineConfig {
            max_retries: 2,
            ..PipelineConfig::default()
        };
        let aligner = FlakyAligner::new(2);
        let summary = Orchestrator::new(&aligner, &config)
            .run_assembly(&AssemblyJob::new(&store, &output))
            .unwrap();
        assert_eq!(summary.duplications, 2);
        assert!(output.exists());
    }

    #[test]
    fn test_exhausted_retries_write_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = assembly(dir.path());
        let output = dir.path().join("fail.dups");
        let config = PipelineConfig {
            max_retries: 1,
            ..PipelineConfig::default()
        };
        let aligner = FlakyAligner::new(2);
        let err = Orchestrator::new(&aligner, &config)
            .run_assembly(&AssemblyJob::new(&store, &output))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("transient"));
        assert!(!output.exists());
    }

    #[test]
    fn test_ambiguous_alignment_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let gap = "N".repeat(10);
        let seq = format!("{}{}{}", bases(9, 20), gap, bases(10, 20));
        let store = write_fasta(dir.path(), "amb.fa", &[("s", seq)]);
        let output = dir.path().join("amb.dups");
        let anchored = CandidateAlignment {
            before_start: 10,
            before_end: 20,
            after_start: 0,
            after_end: 10,
            size: 10,
            pct_identity: 100.0,
            forward: true,
        };
        let aligner = ScriptedAligner(vec![anchored.clone(), anchored]);
        let config = PipelineConfig::default();
        let err = Orchestrator::new(&aligner, &config)
            .run_assembly(&AssemblyJob::new(&store, &output))
            .unwrap_err();
        assert!(is_ambiguous(&err));
        assert!(!output.exists());
    }

    #[test]
    fn test_failed_assembly_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let good = assembly(dir.path());
        let jobs = vec![
            AssemblyJob::new(dir.path().join("missing.fa"), dir.path().join("missing.dups")),
            AssemblyJob::new(&good, dir.path().join("good.dups")),
        ];
        let config = PipelineConfig::default();
        let aligner = OverlapAligner::default();
        let results = Orchestrator::new(&aligner, &config).run(&jobs);
        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap().duplications, 2);
        assert!(!dir.path().join("missing.dups").exists());
    }

    #[test]
    fn test_keep_work_leaves_task_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = assembly(dir.path());
        let work = dir.path().join("work");
        let config = PipelineConfig {
            split_size: 2,
            work_dir: Some(work.clone()),
            keep_work: true,
            ..PipelineConfig::default()
        };
        let aligner = OverlapAligner::default();
        Orchestrator::new(&aligner, &config)
            .run_assembly(&AssemblyJob::new(&store, dir.path().join("kept.dups")))
            .unwrap();

        let scratch: Vec<PathBuf> = fs::read_dir(&work).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(scratch.len(), 1);
        let task = AlignBatchTask::load(&task_path(&scratch[0], 1)).unwrap();
        assert_eq!(task.assembly, "asm");
        assert_eq!(task.batch.gaps.len(), 1);
    }

    #[test]
    fn test_scratch_removed_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = assembly(dir.path());
        let work = dir.path().join("work");
        let config = PipelineConfig {
            work_dir: Some(work.clone()),
            ..PipelineConfig::default()
        };
        let aligner = OverlapAligner::default();
        Orchestrator::new(&aligner, &config)
            .run_assembly(&AssemblyJob::new(&store, dir.path().join("clean.dups")))
            .unwrap();
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
    }

    #[test]
    fn test_state_machine_order() {
        let mut progress = AssemblyProgress::new("asm");
        assert_eq!(progress.state(), AssemblyState::Pending);
        // no skipping
        assert!(progress.start_aligning().is_err());
        progress.gaps_found(2).unwrap();
        assert!(progress.gaps_found(2).is_err());
        progress.start_aligning().unwrap();
        progress.batch_done();
        assert!(progress.merged().is_err());
        assert_eq!(progress.state(), AssemblyState::Aligning);
        progress.batch_done();
        progress.merged().unwrap();
        assert_eq!(progress.state(), AssemblyState::Merged);
        assert!(progress.merged().is_err());
    }

    #[test]
    fn test_incomplete_batches_block_merge() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("batch_00000.tsv");
        fs::write(&partial, "s\t10\t20\t30\t100.0\n").unwrap();
        let output = dir.path().join("early.dups");
        let task = MergeTask {
            assembly: "asm".into(),
            partials: vec![partial.clone(), partial],
            output: output.clone(),
        };

        let mut progress = AssemblyProgress::new("asm");
        progress.gaps_found(2).unwrap();
        progress.start_aligning().unwrap();
        progress.batch_done();
        assert!(merge_when_complete(&mut progress, &task).is_err());
        assert!(!output.exists());
        assert_eq!(progress.state(), AssemblyState::Aligning);

        progress.batch_done();
        merge_when_complete(&mut progress, &task).unwrap();
        assert!(output.exists());
        assert_eq!(progress.state(), AssemblyState::Merged);
    }

    #[test]
    fn test_invalid_transition_error() {
        let mut progress = AssemblyProgress::new("asm");
        let err = progress.merged().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GapDupError>(),
            Some(GapDupError::InvalidTransition {
                from: AssemblyState::Pending,
                to: AssemblyState::Merged,
                ..
            })
        ));
    }
}
