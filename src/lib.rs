//! gapdups - tandem duplication detection at scaffold gaps
//!
//! When a scaffolder joins two contigs that actually overlap, the overlapping
//! sequence ends up on both sides of the gap. This crate finds every run of
//! `N`s, aligns the sequence just before it against the sequence just after
//! it, and reports alignments that touch both gap boundaries.
//!
//! # Modules
//! - `gaps`: gap scanning, flank windows and batch partitioning
//! - `aligner`: boundary anchoring rule and external aligner backends
//! - `paf`, `psl`, `lastz`: minimap2, BLAT and lastz output parsing
//! - `jobs`: gap, batch alignment and merge tasks
//! - `orchestrator`: per-assembly state machine and parallel execution
//! - `dups`: report format, filtering, BED export, trimming and summary
//! - `store`, `seqio`, `twobit`: sequence access (FASTA, gzip FASTA, 2bit)
//! - `config`, `error`: pipeline settings and error taxonomy

pub mod aligner;
pub mod config;
pub mod dups;
pub mod error;
pub mod gaps;
pub mod jobs;
pub mod lastz;
pub mod orchestrator;
pub mod paf;
pub mod psl;
pub mod seqio;
pub mod store;
pub mod twobit;

/// Initialises `env_logger` for the binaries; `RUST_LOG` still applies.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}
