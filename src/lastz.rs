//! lastz `--format=mapping-` output.
//!
//! Columns: name1 zstart1 end1 name2 strand2 zstart2+ end2+ identity idPct
//! (further columns ignored). Sequence 1 is the target, given as a file, and
//! holds the window after the gap; sequence 2 is the query, read from stdin,
//! and holds the window before it.

use anyhow::Result;

use crate::aligner::CandidateAlignment;
use crate::error::GapDupError;

#[derive(Debug, Clone)]
pub struct MappingRecord {
    pub target_start: usize,
    pub target_end: usize,
    pub strand: char,
    pub query_start: usize,
    pub query_end: usize,
    /// Percent identity, e.g. `97.5` for "97.5%".
    pub id_pct: f64,
}

impl MappingRecord {
    pub fn parse_line(line: &str) -> Result<Self> {
        let bad = || GapDupError::unparsable("lastz mapping", line);
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 9 {
            return Err(bad().into());
        }
        let num = |i: usize| fields[i].parse::<usize>().map_err(|_| bad());

        let id_pct = fields[8]
            .strip_suffix('%')
            .unwrap_or(fields[8])
            .parse::<f64>()
            .map_err(|_| bad())?;

        let record = Self {
            target_start: num(1)?,
            target_end: num(2)?,
            strand: fields[4].chars().next().unwrap_or('+'),
            query_start: num(5)?,
            query_end: num(6)?,
            id_pct,
        };
        if record.target_end < record.target_start || record.query_end < record.query_start {
            return Err(bad().into());
        }
        Ok(record)
    }

    pub fn to_candidate(&self) -> CandidateAlignment {
        CandidateAlignment {
            before_start: self.query_start,
            before_end: self.query_end,
            after_start: self.target_start,
            after_end: self.target_end,
            size: self.target_end - self.target_start,
            pct_identity: self.id_pct,
            forward: self.strand == '+',
        }
    }
}

pub fn parse_output(output: &str) -> Result<Vec<MappingRecord>> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(MappingRecord::parse_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mapping_line() {
        let line = "after\t0\t30\tbefore\t+\t470\t500\t29/30\t96.7%\t30/500\t6.0%";
        let rec = MappingRecord::parse_line(line).unwrap();
        assert_eq!((rec.target_start, rec.target_end), (0, 30));
        assert_eq!((rec.query_start, rec.query_end), (470, 500));
        assert!((rec.id_pct - 96.7).abs() < 1e-9);

        let c = rec.to_candidate();
        assert_eq!(c.size, 30);
        assert!(c.is_anchored(500));
        assert!(!c.is_anchored(501));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(MappingRecord::parse_line("after 0 30").is_err());
        assert!(MappingRecord::parse_line("a 0 30 b + 1 2 1/1 high").is_err());
    }

    #[test]
    fn test_inverted_span_rejected() {
        for line in [
            "after\t30\t0\tbefore\t+\t0\t6\t1/1\t100%",
            "after\t0\t6\tbefore\t+\t40\t34\t6/6\t100%",
        ] {
            let err = MappingRecord::parse_line(line).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<GapDupError>(),
                Some(GapDupError::UnparsableRecord { .. })
            ));
        }
    }
}
