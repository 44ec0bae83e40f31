//! Sequence I/O Module
//!
//! FASTA reading (plain or gzip-compressed) and wrapped FASTA writing.
//!
//! # Examples
//! ```no_run
//! use gapdups::seqio::FastaReader;
//!
//! let mut reader = FastaReader::open("assembly.fa.gz").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{}: {} bp", record.name, record.seq.len());
//! }
//! ```

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

/// Line width used when writing FASTA.
pub const FASTA_LINE_WIDTH: usize = 80;

// ============================================================================
// FASTA Record
// ============================================================================

/// A FASTA record: name (header text up to the first whitespace) and sequence.
#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub name: String,
    /// Sequence with line breaks removed, case preserved.
    pub seq: String,
}

// ============================================================================
// FASTA Reader
// ============================================================================

/// Sequential FASTA reader over any byte source.
///
/// Handles multi-line records. Files ending in `.gz` are decompressed
/// transparently when opened through [`FastaReader::open`].
pub struct FastaReader {
    reader: Box<dyn BufRead + Send>,
    line_buf: String,
    current_name: Option<String>,
}

impl FastaReader {
    /// Opens a FASTA file, selecting gzip decoding by the `.gz` extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open FASTA: {}", path.display()))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let source: Box<dyn Read + Send> = if ext == "gz" {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Self::from_reader(source)
    }

    /// Wraps an arbitrary reader (used for in-memory input and tests).
    pub fn from_reader<R: Read + Send + 'static>(source: R) -> Result<Self> {
        let mut reader = Self {
            reader: Box::new(BufReader::with_capacity(1024 * 1024, source)),
            line_buf: String::with_capacity(256),
            current_name: None,
        };

        // Skip anything before the first header
        loop {
            reader.line_buf.clear();
            if reader.reader.read_line(&mut reader.line_buf)? == 0 {
                break;
            }
            if let Some(header) = reader.line_buf.strip_prefix('>') {
                reader.current_name = Some(header_name(header));
                break;
            }
        }

        Ok(reader)
    }

    /// Reads the next record; `Ok(None)` at end of input.
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        let name = match self.current_name.take() {
            Some(n) => n,
            None => return Ok(None),
        };

        let mut seq = String::with_capacity(10000);

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }

            if let Some(header) = self.line_buf.strip_prefix('>') {
                self.current_name = Some(header_name(header));
                break;
            }
            seq.push_str(self.line_buf.trim_end());
        }

        Ok(Some(FastaRecord { name, seq }))
    }
}

impl Iterator for FastaReader {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn header_name(header: &str) -> String {
    header.split_whitespace().next().unwrap_or("").to_string()
}

// ============================================================================
// FASTA Writer
// ============================================================================

/// Writes one record, wrapping the sequence at [`FASTA_LINE_WIDTH`].
pub fn write_fasta_record<W: Write>(writer: &mut W, name: &str, seq: &[u8]) -> Result<()> {
    writeln!(writer, ">{}", name)?;
    for line in seq.chunks(FASTA_LINE_WIDTH) {
        writer.write_all(line)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Writes a short single-line record, as fed to external aligners.
pub fn write_single_line<W: Write>(writer: &mut W, name: &str, seq: &str) -> Result<()> {
    writeln!(writer, ">{}", name)?;
    writeln!(writer, "{}", seq)?;
    Ok(())
}
