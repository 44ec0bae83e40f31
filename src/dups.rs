//! Duplication reports.
//!
//! # Report Format
//! ```text
//! sequence	gapStart	gapEnd	dupSize	dupPctID
//! scaffold_12	48211	48311	143	99.3
//! ```
//! Every reader validates the header line exactly before parsing rows.

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::GapDupError;
use crate::seqio::{write_fasta_record, FastaRecord};

pub const REPORT_HEADER: &str = "sequence\tgapStart\tgapEnd\tdupSize\tdupPctID";

// ============================================================================
// Duplication Record
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicationRecord {
    pub header: String,
    pub gap_start: usize,
    pub gap_end: usize,
    pub dup_size: usize,
    pub dup_pct_id: f64,
}

impl DuplicationRecord {
    /// Formats one report row; identity is printed with one decimal.
    pub fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{:.1}",
            self.header, self.gap_start, self.gap_end, self.dup_size, self.dup_pct_id
        )
    }

    pub fn parse_row(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            anyhow::bail!("Invalid report row (expected 5 columns): {:?}", line);
        }
        Ok(Self {
            header: fields[0].to_string(),
            gap_start: fields[1].parse().with_context(|| format!("Invalid gapStart in {:?}", line))?,
            gap_end: fields[2].parse().with_context(|| format!("Invalid gapEnd in {:?}", line))?,
            dup_size: fields[3].parse().with_context(|| format!("Invalid dupSize in {:?}", line))?,
            dup_pct_id: fields[4].parse().with_context(|| format!("Invalid dupPctID in {:?}", line))?,
        })
    }
}

/// Writes rows (no header), as stored in partial result files.
pub fn write_rows<W: Write>(writer: &mut W, records: &[DuplicationRecord]) -> Result<()> {
    for record in records {
        writeln!(writer, "{}", record.to_row())?;
    }
    Ok(())
}

/// Fails with [`GapDupError::MalformedHeader`] unless `line` is the report header.
pub fn check_header(line: &str) -> Result<()> {
    if line.trim_end_matches(['\r', '\n']) != REPORT_HEADER {
        return Err(GapDupError::MalformedHeader {
            found: line.trim_end().to_string(),
            expected: REPORT_HEADER,
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// Report Reader
// ============================================================================

/// Row reader over a report; the header is validated on construction.
///
/// Yields the raw row text alongside the parsed record so filters can pass
/// rows through unchanged.
pub struct ReportReader<R: BufRead> {
    reader: R,
    line_buf: String,
}

impl ReportReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open report: {}", path.display()))?;
        Self::new(BufReader::new(file))
            .with_context(|| format!("Invalid report: {}", path.display()))
    }
}

impl<R: BufRead> ReportReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut line_buf = String::new();
        reader.read_line(&mut line_buf)?;
        check_header(&line_buf)?;
        Ok(Self { reader, line_buf })
    }

    pub fn read_next(&mut self) -> Result<Option<(String, DuplicationRecord)>> {
        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                return Ok(None);
            }
            let line = self.line_buf.trim_end();
            if line.is_empty() {
                continue;
            }
            let record = DuplicationRecord::parse_row(line)?;
            return Ok(Some((line.to_string(), record)));
        }
    }

    /// Reads all remaining records.
    pub fn records(mut self) -> Result<Vec<DuplicationRecord>> {
        let mut out = Vec::new();
        while let Some((_, record)) = self.read_next()? {
            out.push(record);
        }
        Ok(out)
    }
}

// ============================================================================
// Report Tools
// ============================================================================

/// Thresholds for [`filter_report`]; both are inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct DupFilter {
    pub min_size: usize,
    pub min_pct_id: f64,
}

impl DupFilter {
    pub fn passes(&self, record: &DuplicationRecord) -> bool {
        record.dup_size >= self.min_size && record.dup_pct_id >= self.min_pct_id
    }
}

/// Copies the header and every passing row; returns the number of rows kept.
pub fn filter_report<R: BufRead, W: Write>(
    reader: ReportReader<R>,
    writer: &mut W,
    filter: DupFilter,
) -> Result<usize> {
    let mut reader = reader;
    writeln!(writer, "{}", REPORT_HEADER)?;
    let mut kept = 0;
    while let Some((line, record)) = reader.read_next()? {
        if filter.passes(&record) {
            writeln!(writer, "{}", line)?;
            kept += 1;
        }
    }
    Ok(kept)
}

/// Two BED intervals per record: the copy before the gap and the copy after it.
pub fn write_bed<W: Write>(records: &[DuplicationRecord], writer: &mut W) -> Result<()> {
    for dup in records {
        writeln!(
            writer,
            "{}\t{}\t{}",
            dup.header,
            dup.gap_start.saturating_sub(dup.dup_size),
            dup.gap_start
        )?;
        writeln!(
            writer,
            "{}\t{}\t{}",
            dup.header,
            dup.gap_end,
            dup.gap_end + dup.dup_size
        )?;
    }
    Ok(())
}

/// Groups records by sequence name, keeping file order within each group.
pub fn group_by_sequence(records: Vec<DuplicationRecord>) -> FxHashMap<String, Vec<DuplicationRecord>> {
    let mut grouped: FxHashMap<String, Vec<DuplicationRecord>> = FxHashMap::default();
    for record in records {
        grouped.entry(record.header.clone()).or_default().push(record);
    }
    grouped
}

/// Removes both copies of each duplication (plus `additional` bases on each
/// outer side) from `seq`. Ranges are clamped to the sequence.
pub fn trim_duplications(seq: &[u8], dups: &[DuplicationRecord], additional: usize) -> Vec<u8> {
    let mut keep = vec![true; seq.len()];
    for dup in dups {
        let reach = dup.dup_size + additional;
        let left = dup.gap_start.saturating_sub(reach).min(seq.len())..dup.gap_start.min(seq.len());
        let right = dup.gap_end.min(seq.len())..(dup.gap_end + reach).min(seq.len());
        for range in [left, right] {
            keep[range].iter_mut().for_each(|k| *k = false);
        }
    }
    seq.iter()
        .zip(keep)
        .filter_map(|(&b, k)| k.then_some(b))
        .collect()
}

/// Writes every record of `fasta`, trimmed where the report lists duplications.
pub fn write_trimmed_fasta<I, W>(
    fasta: I,
    dups: &FxHashMap<String, Vec<DuplicationRecord>>,
    additional: usize,
    writer: &mut W,
) -> Result<usize>
where
    I: Iterator<Item = Result<FastaRecord>>,
    W: Write,
{
    let mut trimmed = 0;
    for record in fasta {
        let record = record?;
        match dups.get(&record.name) {
            Some(seq_dups) => {
                let seq = trim_duplications(record.seq.as_bytes(), seq_dups, additional);
                write_fasta_record(writer, &record.name, &seq)?;
                trimmed += 1;
            }
            None => write_fasta_record(writer, &record.name, record.seq.as_bytes())?,
        }
    }
    Ok(trimmed)
}

/// Number of distinct gaps that carry at least one record.
pub fn duplicated_gaps(records: &[DuplicationRecord]) -> usize {
    records
        .iter()
        .map(|r| (r.header.as_str(), r.gap_start, r.gap_end))
        .collect::<FxHashSet<_>>()
        .len()
}

/// One summary line: report base name, total gaps, duplicated gaps, percentage.
pub fn summary_line(base: &str, total_gaps: usize, dup_gaps: usize) -> String {
    let pct = if total_gaps == 0 {
        0.0
    } else {
        dup_gaps as f64 / total_gaps as f64 * 100.0
    };
    format!("{}\t{}\t{}\t{:.2}", base, total_gaps, dup_gaps, pct)
}

/// File name up to the first `.`.
pub fn report_base_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or("")
        .to_string()
}
