//! Error taxonomy for gap duplication detection.
//!
//! Library functions return `anyhow::Result`; the variants below are the
//! failures callers may need to tell apart (for example the batch retry
//! policy refuses to retry an [`GapDupError::AmbiguousAlignment`]).

use thiserror::Error;

use crate::orchestrator::AssemblyState;

#[derive(Debug, Error)]
pub enum GapDupError {
    /// A report did not start with the five-column header.
    #[error("unexpected report header: {found:?} (expected {expected:?})")]
    MalformedHeader { found: String, expected: &'static str },

    /// The aligner binary could not be started.
    #[error("failed to start {tool}: {source}")]
    AlignerSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The aligner exited with a non-zero status.
    #[error("{tool} failed ({status}): {stderr}")]
    AlignerFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The aligner was killed after exceeding its time limit.
    #[error("{tool} did not finish within {secs}s")]
    AlignerTimeout { tool: String, secs: u64 },

    /// A line of aligner output could not be parsed.
    #[error("unparsable {format} record: {line:?}")]
    UnparsableRecord { format: &'static str, line: String },

    /// More than one alignment touches both gap boundaries.
    #[error("{count} alignments satisfy the boundary anchoring rule (expected at most one)")]
    AmbiguousAlignment { count: usize },

    #[error("sequence not found in store: {0}")]
    UnknownSequence(String),

    /// Two records share a name, so lookups by name would be ambiguous.
    #[error("duplicate sequence name in store: {0}")]
    DuplicateSequence(String),

    #[error("invalid range {start}..{end} for {name} (length {len})")]
    InvalidRange {
        name: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("invalid state transition for {assembly}: {from:?} -> {to:?}")]
    InvalidTransition {
        assembly: String,
        from: AssemblyState,
        to: AssemblyState,
    },

    #[error("invalid 2bit file: {0}")]
    InvalidTwoBit(String),
}

impl GapDupError {
    pub(crate) fn unparsable(format: &'static str, line: &str) -> Self {
        GapDupError::UnparsableRecord {
            format,
            line: line.to_string(),
        }
    }
}
