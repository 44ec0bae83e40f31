//! PAF (Pairwise mApping Format) parsing for minimap2 output.
//!
//! # PAF Format (12 mandatory columns)
//! ```text
//! Col  Type    Description
//! 1    string  Query sequence name
//! 2    int     Query sequence length
//! 3    int     Query start (0-based)
//! 4    int     Query end
//! 5    char    Relative strand: '+' or '-'
//! 6    string  Target sequence name
//! 7    int     Target sequence length
//! 8    int     Target start
//! 9    int     Target end
//! 10   int     Number of matching bases
//! 11   int     Alignment block length
//! 12   int     Mapping quality (0-255; 255 for missing)
//! ```
//!
//! For boundary checks the target is the window before the gap and the
//! query is the window after it.

use anyhow::Result;

use crate::aligner::CandidateAlignment;
use crate::error::GapDupError;

/// The mandatory PAF columns used by the boundary check.
#[derive(Debug, Clone)]
pub struct PafRecord {
    pub query_name: String,
    pub query_len: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub strand: char,
    pub target_name: String,
    pub target_len: usize,
    pub target_start: usize,
    pub target_end: usize,
    pub matches: usize,
    pub block_len: usize,
}

impl PafRecord {
    /// Parses one tab-separated PAF line; optional tags are ignored.
    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            return Err(GapDupError::unparsable("PAF", line).into());
        }

        let num = |i: usize| -> Result<usize> {
            fields[i]
                .parse()
                .map_err(|_| GapDupError::unparsable("PAF", line).into())
        };

        let record = Self {
            query_name: fields[0].to_string(),
            query_len: num(1)?,
            query_start: num(2)?,
            query_end: num(3)?,
            strand: fields[4].chars().next().unwrap_or('+'),
            target_name: fields[5].to_string(),
            target_len: num(6)?,
            target_start: num(7)?,
            target_end: num(8)?,
            matches: num(9)?,
            block_len: num(10)?,
        };
        if record.query_end < record.query_start || record.target_end < record.target_start {
            return Err(GapDupError::unparsable("PAF", line).into());
        }
        Ok(record)
    }

    /// Identity = matching bases / alignment block length × 100.
    pub fn calculate_identity(&self) -> f64 {
        if self.block_len == 0 {
            return 0.0;
        }
        (self.matches as f64 / self.block_len as f64) * 100.0
    }

    pub fn to_candidate(&self) -> CandidateAlignment {
        CandidateAlignment {
            before_start: self.target_start,
            before_end: self.target_end,
            after_start: self.query_start,
            after_end: self.query_end,
            size: self.query_end - self.query_start,
            pct_identity: self.calculate_identity(),
            forward: self.strand == '+',
        }
    }
}

/// Parses every non-empty line of minimap2 output.
pub fn parse_output(output: &str) -> Result<Vec<PafRecord>> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(PafRecord::parse_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paf_line() {
        let line = "after\t150\t0\t40\t+\tbefore\t1000\t960\t1000\t39\t40\t60\ttp:A:P";
        let record = PafRecord::parse_line(line).unwrap();

        assert_eq!(record.query_name, "after");
        assert_eq!(record.query_start, 0);
        assert_eq!(record.target_end, 1000);
        assert_eq!(record.matches, 39);
        assert_eq!(record.block_len, 40);
        assert_eq!(record.calculate_identity(), 97.5);

        let c = record.to_candidate();
        assert_eq!(c.size, 40);
        assert!(c.is_anchored(1000));
    }

    #[test]
    fn test_invalid_paf_line() {
        assert!(PafRecord::parse_line("incomplete\tline").is_err());
        let bad = "q\t1\tx\t4\t+\tt\t1\t0\t4\t4\t4\t60";
        let err = PafRecord::parse_line(bad).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GapDupError>(),
            Some(GapDupError::UnparsableRecord { format: "PAF", .. })
        ));
    }

    #[test]
    fn test_inverted_span_rejected() {
        let query = "after\t150\t40\t0\t+\tbefore\t1000\t960\t1000\t39\t40\t60";
        let target = "after\t150\t0\t40\t+\tbefore\t1000\t1000\t960\t39\t40\t60";
        for line in [query, target] {
            let err = PafRecord::parse_line(line).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<GapDupError>(),
                Some(GapDupError::UnparsableRecord { format: "PAF", .. })
            ));
        }
        assert!(parse_output(&format!("{}\n", query)).is_err());
    }

    #[test]
    fn test_parse_output_skips_blank_lines() {
        let out = "q\t10\t0\t10\t+\tt\t10\t0\t10\t10\t10\t60\n\nq\t10\t2\t9\t-\tt\t10\t1\t8\t7\t7\t60\n";
        let records = parse_output(out).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[1].to_candidate().forward);
    }
}
