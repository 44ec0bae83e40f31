//! Random-access sequence stores.
//!
//! The pipeline only needs three things from an assembly: its sequence names
//! in order, their lengths, and half-open range slices. [`SequenceStore`]
//! captures that; [`open_store`] picks the backend from the file extension.

use anyhow::Result;
use rustc_hash::FxHashMap;
use std::path::Path;

use crate::error::GapDupError;
use crate::seqio::{FastaReader, FastaRecord};
use crate::twobit::TwoBitFile;

pub trait SequenceStore: Sync {
    /// Sequence names in store order.
    fn names(&self) -> Vec<String>;

    fn length(&self, name: &str) -> Result<usize>;

    /// Bases `[start, end)` of `name`, case preserved.
    fn fetch(&self, name: &str, start: usize, end: usize) -> Result<String>;
}

impl SequenceStore for TwoBitFile {
    fn names(&self) -> Vec<String> {
        TwoBitFile::names(self)
    }

    fn length(&self, name: &str) -> Result<usize> {
        TwoBitFile::length(self, name)
    }

    fn fetch(&self, name: &str, start: usize, end: usize) -> Result<String> {
        TwoBitFile::fetch(self, name, start, end)
    }
}

/// Whole FASTA assembly held in memory.
pub struct FastaStore {
    records: Vec<FastaRecord>,
    index: FxHashMap<String, usize>,
}

impl FastaStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let records = FastaReader::open(path)?.collect::<Result<Vec<_>>>()?;
        Self::from_records(records)
    }

    /// Fails with [`GapDupError::DuplicateSequence`] if a name repeats.
    pub fn from_records(records: Vec<FastaRecord>) -> Result<Self> {
        let mut index = FxHashMap::default();
        for (i, record) in records.iter().enumerate() {
            if index.insert(record.name.clone(), i).is_some() {
                return Err(GapDupError::DuplicateSequence(record.name.clone()).into());
            }
        }
        Ok(Self { records, index })
    }

    fn record(&self, name: &str) -> Result<&FastaRecord> {
        self.index
            .get(name)
            .map(|&i| &self.records[i])
            .ok_or_else(|| GapDupError::UnknownSequence(name.to_string()).into())
    }
}

impl SequenceStore for FastaStore {
    fn names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    fn length(&self, name: &str) -> Result<usize> {
        Ok(self.record(name)?.seq.len())
    }

    fn fetch(&self, name: &str, start: usize, end: usize) -> Result<String> {
        let record = self.record(name)?;
        record
            .seq
            .get(start..end)
            .map(str::to_string)
            .ok_or_else(|| {
                GapDupError::InvalidRange {
                    name: name.to_string(),
                    start,
                    end,
                    len: record.seq.len(),
                }
                .into()
            })
    }
}

/// Opens `.2bit` files with [`TwoBitFile`], anything else as FASTA.
pub fn open_store(path: &Path) -> Result<Box<dyn SequenceStore>> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext.eq_ignore_ascii_case("2bit") {
        Ok(Box::new(TwoBitFile::open(path)?))
    } else {
        Ok(Box::new(FastaStore::open(path)?))
    }
}
