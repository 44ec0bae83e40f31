//! BLAT PSL output (`-noHead`).
//!
//! Only the columns used for the boundary check are kept:
//! `matches(0) misMatches(1) strand(8) qStart(11) qEnd(12) tStart(15) tEnd(16)`.
//! The target file holds the window before the gap and the query (stdin)
//! holds the window after it.

use anyhow::Result;

use crate::aligner::CandidateAlignment;
use crate::error::GapDupError;

#[derive(Debug, Clone)]
pub struct PslRecord {
    pub matches: usize,
    pub mismatches: usize,
    pub strand: String,
    pub q_start: usize,
    pub q_end: usize,
    pub t_start: usize,
    pub t_end: usize,
}

impl PslRecord {
    pub fn parse_line(line: &str) -> Result<Self> {
        let bad = || GapDupError::unparsable("PSL", line);
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 17 {
            return Err(bad().into());
        }
        let num = |i: usize| fields[i].parse::<usize>().map_err(|_| bad());

        let record = Self {
            matches: num(0)?,
            mismatches: num(1)?,
            strand: fields[8].to_string(),
            q_start: num(11)?,
            q_end: num(12)?,
            t_start: num(15)?,
            t_end: num(16)?,
        };
        if record.q_end < record.q_start || record.t_end < record.t_start {
            return Err(bad().into());
        }
        Ok(record)
    }

    /// matches / (matches + mismatches) × 100
    pub fn percent_identity(&self) -> f64 {
        let aligned = self.matches + self.mismatches;
        if aligned == 0 {
            return 0.0;
        }
        self.matches as f64 / aligned as f64 * 100.0
    }

    pub fn to_candidate(&self) -> CandidateAlignment {
        CandidateAlignment {
            before_start: self.t_start,
            before_end: self.t_end,
            after_start: self.q_start,
            after_end: self.q_end,
            size: self.matches,
            pct_identity: self.percent_identity(),
            forward: self.strand.starts_with('+'),
        }
    }
}

pub fn parse_output(output: &str) -> Result<Vec<PslRecord>> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(PslRecord::parse_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "24\t1\t0\t0\t0\t0\t0\t0\t+\tafter\t400\t0\t25\tbefore\t300\t275\t300\t1\t25,\t0,\t275,";

    #[test]
    fn test_parse_psl_line() {
        let rec = PslRecord::parse_line(LINE).unwrap();
        assert_eq!(rec.matches, 24);
        assert_eq!(rec.mismatches, 1);
        assert_eq!((rec.q_start, rec.q_end), (0, 25));
        assert_eq!((rec.t_start, rec.t_end), (275, 300));
        assert_eq!(rec.percent_identity(), 96.0);

        let c = rec.to_candidate();
        assert_eq!(c.size, 24);
        assert!(c.is_anchored(300));
    }

    #[test]
    fn test_inverted_span_rejected() {
        let line = LINE.replace("\t275\t300\t", "\t300\t275\t");
        assert!(PslRecord::parse_line(&line).is_err());
    }

    #[test]
    fn test_short_line_rejected() {
        assert!(PslRecord::parse_line("24\t1\t0").is_err());
    }
}
