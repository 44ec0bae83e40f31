//! Boundary alignment around a gap.
//!
//! A scaffold join that duplicated sequence leaves the same stretch on both
//! sides of the gap: the copy before the gap *ends* at the gap and the copy
//! after it *starts* at the gap. An external pairwise aligner proposes
//! candidate alignments between the two flank windows; only a candidate that
//! touches both boundaries counts.
//!
//! # Backends
//! Every tool is driven through [`PairwiseAligner`]. [`ExternalAligner`]
//! covers lastz, BLAT and minimap2; their outputs are normalised into
//! [`CandidateAlignment`]s in before/after window coordinates.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::GapDupError;
use crate::seqio::write_single_line;
use crate::{lastz, paf, psl};

// ============================================================================
// Alignment Types
// ============================================================================

/// One alignment proposed by a backend, in flank window coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateAlignment {
    pub before_start: usize,
    pub before_end: usize,
    pub after_start: usize,
    pub after_end: usize,
    /// Duplication size as reported by the backend.
    pub size: usize,
    pub pct_identity: f64,
    pub forward: bool,
}

impl CandidateAlignment {
    /// True when the match ends exactly at the end of the before-window and
    /// starts exactly at the start of the after-window.
    pub fn is_anchored(&self, before_len: usize) -> bool {
        self.forward && self.before_end == before_len && self.after_start == 0
    }
}

/// Size and identity of the duplication straddling a gap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryAlignment {
    /// 0 when no anchored alignment exists.
    pub size: usize,
    pub pct_identity: f64,
}

impl BoundaryAlignment {
    pub fn none() -> Self {
        Self {
            size: 0,
            pct_identity: 0.0,
        }
    }
}

/// Produces zero or more candidate alignments between two flank windows.
pub trait PairwiseAligner: Sync {
    fn align(&self, before: &str, after: &str) -> Result<Vec<CandidateAlignment>>;
}

/// Runs the aligner and applies the anchoring rule.
///
/// Fails with [`GapDupError::AmbiguousAlignment`] if more than one candidate
/// is anchored on both sides.
pub fn evaluate_boundary<A: PairwiseAligner + ?Sized>(
    aligner: &A,
    before: &str,
    after: &str,
) -> Result<BoundaryAlignment> {
    let candidates = aligner.align(before, after)?;
    let mut anchored = candidates.iter().filter(|c| c.is_anchored(before.len()));

    let Some(hit) = anchored.next() else {
        return Ok(BoundaryAlignment::none());
    };
    let extra = anchored.count();
    if extra > 0 {
        return Err(GapDupError::AmbiguousAlignment { count: extra + 1 }.into());
    }

    Ok(BoundaryAlignment {
        size: hit.size,
        pct_identity: hit.pct_identity,
    })
}

// ============================================================================
// External Aligners
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
pub enum AlignerTool {
    Lastz,
    Blat,
    Minimap2,
}

impl AlignerTool {
    /// Executable name looked up on PATH when no explicit path is given.
    pub fn program_name(self) -> &'static str {
        match self {
            AlignerTool::Lastz => "lastz",
            AlignerTool::Blat => "blat",
            AlignerTool::Minimap2 => "minimap2",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlignerConfig {
    pub tool: AlignerTool,
    pub program: PathBuf,
    pub timeout: Duration,
}

impl AlignerConfig {
    pub fn new(tool: AlignerTool) -> Self {
        Self {
            tool,
            program: PathBuf::from(tool.program_name()),
            timeout: Duration::from_secs(300),
        }
    }
}

/// A [`PairwiseAligner`] backed by an external command.
pub struct ExternalAligner {
    config: AlignerConfig,
}

impl ExternalAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    pub fn tool(&self) -> AlignerTool {
        self.config.tool
    }

    /// Writes `seq` to a scoped FASTA file that is removed when dropped.
    fn window_file(name: &str, seq: &str) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("gapdups_")
            .suffix(".fa")
            .tempfile()
            .context("Failed to create aligner input file")?;
        write_single_line(&mut file, name, seq)?;
        file.flush()?;
        Ok(file)
    }

    fn run(&self, cmd: Command, stdin_name: &str, stdin_seq: &str) -> Result<String> {
        let mut input = Vec::with_capacity(stdin_seq.len() + 16);
        write_single_line(&mut input, stdin_name, stdin_seq)?;
        run_tool(cmd, self.config.tool.program_name(), input, self.config.timeout)
    }
}

impl PairwiseAligner for ExternalAligner {
    fn align(&self, before: &str, after: &str) -> Result<Vec<CandidateAlignment>> {
        let program = &self.config.program;
        match self.config.tool {
            AlignerTool::Lastz => {
                let target = Self::window_file("after", after)?;
                let mut cmd = Command::new(program);
                cmd.args(["--strand=plus", "--step=4", "--maxwordcount=10"])
                    .arg(format!("{}[unmask]", target.path().display()))
                    .args(["--nogapped", "--xdrop=300", "--identity=95", "--format=mapping-"]);
                let output = self.run(cmd, "before", before)?;
                Ok(lastz::parse_output(&output)?
                    .iter()
                    .map(lastz::MappingRecord::to_candidate)
                    .collect())
            }
            AlignerTool::Blat => {
                let target = Self::window_file("before", before)?;
                let mut cmd = Command::new(program);
                cmd.arg(target.path())
                    .arg("stdin")
                    .args(["-q=dna", "-minIdentity=95", "-repMatch=10", "-noHead", "stdout"]);
                let output = self.run(cmd, "after", after)?;
                Ok(psl::parse_output(&output)?
                    .iter()
                    .map(psl::PslRecord::to_candidate)
                    .collect())
            }
            AlignerTool::Minimap2 => {
                let target = Self::window_file("before", before)?;
                let mut cmd = Command::new(program);
                cmd.args(["-c", "--for-only", "-x", "asm5"])
                    .arg(target.path())
                    .arg("-");
                let output = self.run(cmd, "after", after)?;
                Ok(paf::parse_output(&output)?
                    .iter()
                    .map(paf::PafRecord::to_candidate)
                    .collect())
            }
        }
    }
}

/// Runs `cmd` feeding `input` on stdin and returns its stdout.
///
/// Non-zero exit, a missed deadline (the child is killed) or non-UTF-8
/// output are errors.
pub fn run_tool(mut cmd: Command, tool: &str, input: Vec<u8>, timeout: Duration) -> Result<String> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|source| GapDupError::AlignerSpawn {
        tool: tool.to_string(),
        source,
    })?;

    let mut stdin = child.stdin.take().context("aligner stdin unavailable")?;
    let mut stdout = child.stdout.take().context("aligner stdout unavailable")?;
    let mut stderr = child.stderr.take().context("aligner stderr unavailable")?;

    // A tool that exits early closes its stdin; the exit status reports that.
    let writer = thread::spawn(move || {
        let _ = stdin.write_all(&input);
    });
    let out_reader = thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf)?;
        Ok(buf)
    });
    let err_reader = thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf)?;
        Ok(buf)
    });

    let deadline = Instant::now() + timeout;
    let mut pause = Duration::from_millis(1);
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GapDupError::AlignerTimeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            }
            .into());
        }
        thread::sleep(pause);
        pause = (pause * 2).min(Duration::from_millis(50));
    };

    let _ = writer.join();
    let stdout = out_reader
        .join()
        .map_err(|_| anyhow::anyhow!("{} stdout reader panicked", tool))??;
    let stderr = err_reader
        .join()
        .map_err(|_| anyhow::anyhow!("{} stderr reader panicked", tool))??;

    if !status.success() {
        return Err(GapDupError::AlignerFailed {
            tool: tool.to_string(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        }
        .into());
    }

    String::from_utf8(stdout)
        .map_err(|_| GapDupError::unparsable("aligner output", "<non-UTF-8 output>").into())
}

// ============================================================================
// Test Doubles
// ============================================================================
