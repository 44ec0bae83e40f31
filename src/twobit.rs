//! UCSC .2bit random-access sequence reader.
//!
//! # File Format
//! ```text
//! [Header: signature u32, version u32, sequence_count u32, reserved u32]
//! [Index: per sequence name_len u8, name, offset u32 (u64 for version 1)]
//! [Records: dna_size u32,
//!           n_block_count u32, n_block_starts[u32], n_block_sizes[u32],
//!           mask_block_count u32, mask_block_starts[u32], mask_block_sizes[u32],
//!           reserved u32,
//!           packed DNA (4 bases per byte, T=0 C=1 A=2 G=3, high bits first)]
//! ```
//!
//! The index and every record header are loaded on open; [`TwoBitFile::fetch`]
//! reads only the packed bytes covering the requested range.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::GapDupError;

const TWOBIT_SIGNATURE: u32 = 0x1A41_2743;
const BASES: &[u8; 4] = b"TCAG";

#[derive(Debug, Clone, Copy)]
pub(crate) enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    fn u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        }
    }
}

/// Half-open block of positions `[start, start + len)`.
#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    len: usize,
}

impl Block {
    fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Debug, Clone)]
struct TwoBitEntry {
    name: String,
    len: usize,
    n_blocks: Vec<Block>,
    mask_blocks: Vec<Block>,
    dna_offset: u64,
}

/// An opened .2bit file.
pub struct TwoBitFile {
    path: PathBuf,
    entries: Vec<TwoBitEntry>,
    index: FxHashMap<String, usize>,
}

impl TwoBitFile {
    /// Opens a .2bit file and loads its index and record headers.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open 2bit: {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut buf4 = [0u8; 4];
        reader.read_exact(&mut buf4)?;
        let order = if u32::from_le_bytes(buf4) == TWOBIT_SIGNATURE {
            ByteOrder::Little
        } else if u32::from_be_bytes(buf4) == TWOBIT_SIGNATURE {
            ByteOrder::Big
        } else {
            return Err(GapDupError::InvalidTwoBit(format!("bad signature in {}", path.display())).into());
        };

        let version = read_u32(&mut reader, order)?;
        if version > 1 {
            return Err(GapDupError::InvalidTwoBit(format!("unsupported version {}", version)).into());
        }
        let seq_count = read_u32(&mut reader, order)? as usize;
        let _reserved = read_u32(&mut reader, order)?;

        let mut offsets = Vec::with_capacity(seq_count);
        for _ in 0..seq_count {
            let mut len_buf = [0u8; 1];
            reader.read_exact(&mut len_buf)?;
            let mut name_buf = vec![0u8; len_buf[0] as usize];
            reader.read_exact(&mut name_buf)?;
            let name = String::from_utf8(name_buf)
                .map_err(|_| GapDupError::InvalidTwoBit("non-UTF-8 sequence name".to_string()))?;

            let offset = if version == 1 {
                let mut buf8 = [0u8; 8];
                reader.read_exact(&mut buf8)?;
                order.u64(buf8)
            } else {
                read_u32(&mut reader, order)? as u64
            };
            offsets.push((name, offset));
        }

        let mut entries = Vec::with_capacity(seq_count);
        let mut index = FxHashMap::default();
        for (name, offset) in offsets {
            reader.seek(SeekFrom::Start(offset))?;
            let len = read_u32(&mut reader, order)? as usize;
            let n_blocks = read_blocks(&mut reader, order)?;
            let mask_blocks = read_blocks(&mut reader, order)?;
            let _reserved = read_u32(&mut reader, order)?;
            let dna_offset = reader.stream_position()?;

            if index.insert(name.clone(), entries.len()).is_some() {
                return Err(GapDupError::DuplicateSequence(name).into());
            }
            entries.push(TwoBitEntry {
                name,
                len,
                n_blocks,
                mask_blocks,
                dna_offset,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            index,
        })
    }

    /// Sequence names in file order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn length(&self, name: &str) -> Result<usize> {
        Ok(self.entry(name)?.len)
    }

    /// Returns bases `[start, end)` of `name`. Gap blocks decode as `N`,
    /// soft-masked blocks as lower case.
    pub fn fetch(&self, name: &str, start: usize, end: usize) -> Result<String> {
        let entry = self.entry(name)?;
        if start > end || end > entry.len {
            return Err(GapDupError::InvalidRange {
                name: name.to_string(),
                start,
                end,
                len: entry.len,
            }
            .into());
        }
        if start == end {
            return Ok(String::new());
        }

        let byte_start = start / 4;
        let byte_end = end.div_ceil(4);
        let mut packed = vec![0u8; byte_end - byte_start];

        // A fresh handle per fetch keeps the store shareable across threads
        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open 2bit: {}", self.path.display()))?;
        file.seek(SeekFrom::Start(entry.dna_offset + byte_start as u64))?;
        file.read_exact(&mut packed)?;

        let mut bases: Vec<u8> = (start..end)
            .map(|pos| {
                let byte = packed[pos / 4 - byte_start];
                let shift = 6 - 2 * (pos % 4);
                BASES[((byte >> shift) & 0b11) as usize]
            })
            .collect();

        for block in overlapping(&entry.n_blocks, start, end) {
            for pos in block.start.max(start)..block.end().min(end) {
                bases[pos - start] = b'N';
            }
        }
        for block in overlapping(&entry.mask_blocks, start, end) {
            for pos in block.start.max(start)..block.end().min(end) {
                bases[pos - start] = bases[pos - start].to_ascii_lowercase();
            }
        }

        String::from_utf8(bases).context("2bit decoding produced invalid text")
    }

    fn entry(&self, name: &str) -> Result<&TwoBitEntry> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| GapDupError::UnknownSequence(name.to_string()).into())
    }
}

fn read_u32<R: Read>(reader: &mut R, order: ByteOrder) -> Result<u32> {
    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    Ok(order.u32(buf4))
}

fn read_blocks<R: Read>(reader: &mut R, order: ByteOrder) -> Result<Vec<Block>> {
    let count = read_u32(reader, order)? as usize;
    let mut starts = Vec::with_capacity(count);
    for _ in 0..count {
        starts.push(read_u32(reader, order)? as usize);
    }
    let mut blocks = Vec::with_capacity(count);
    for start in starts {
        let len = read_u32(reader, order)? as usize;
        blocks.push(Block { start, len });
    }
    Ok(blocks)
}

/// Blocks intersecting `[start, end)`. Blocks are sorted and disjoint.
fn overlapping(blocks: &[Block], start: usize, end: usize) -> impl Iterator<Item = &Block> {
    let first = blocks.partition_point(|b| b.end() <= start);
    blocks[first..].iter().take_while(move |b| b.start < end)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    fn runs(seq: &[u8], pred: impl Fn(u8) -> bool) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < seq.len() {
            if pred(seq[i]) {
                let s = i;
                while i < seq.len() && pred(seq[i]) {
                    i += 1;
                }
                out.push((s as u32, (i - s) as u32));
            } else {
                i += 1;
            }
        }
        out
    }

    /// Encodes little-endian version 0 .2bit data.
    pub(crate) fn write_twobit(path: &Path, seqs: &[(&str, &str)]) {
        write_twobit_as(path, seqs, ByteOrder::Little, 0);
    }

    /// Encodes .2bit data in the given byte order; version 1 uses 64-bit offsets.
    pub(crate) fn write_twobit_as(path: &Path, seqs: &[(&str, &str)], order: ByteOrder, version: u32) {
        let u32_bytes = |v: u32| match order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        };
        let u64_bytes = |v: u64| match order {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        };

        let mut records: Vec<Vec<u8>> = Vec::new();
        for (_, seq) in seqs {
            let bytes = seq.as_bytes();
            let n_runs = runs(bytes, |b| b == b'N' || b == b'n');
            let mask_runs = runs(bytes, |b| b.is_ascii_lowercase());
            let mut rec = Vec::new();
            rec.extend(u32_bytes(bytes.len() as u32));
            for blocks in [&n_runs, &mask_runs] {
                rec.extend(u32_bytes(blocks.len() as u32));
                for (s, _) in blocks.iter() {
                    rec.extend(u32_bytes(*s));
                }
                for (_, l) in blocks.iter() {
                    rec.extend(u32_bytes(*l));
                }
            }
            rec.extend(u32_bytes(0));
            for chunk in bytes.chunks(4) {
                let mut byte = 0u8;
                for (i, b) in chunk.iter().enumerate() {
                    let code = match b.to_ascii_uppercase() {
                        b'C' => 1,
                        b'A' => 2,
                        b'G' => 3,
                        _ => 0,
                    };
                    byte |= code << (6 - 2 * i);
                }
                rec.push(byte);
            }
            records.push(rec);
        }

        let offset_width = if version == 1 { 8 } else { 4 };
        let index_len: usize = seqs.iter().map(|(n, _)| 1 + n.len() + offset_width).sum();
        let mut offset = 16 + index_len;
        let mut out = Vec::new();
        out.extend(u32_bytes(TWOBIT_SIGNATURE));
        out.extend(u32_bytes(version));
        out.extend(u32_bytes(seqs.len() as u32));
        out.extend(u32_bytes(0));
        for ((name, _), rec) in seqs.iter().zip(&records) {
            out.push(name.len() as u8);
            out.extend(name.as_bytes());
            if version == 1 {
                out.extend(u64_bytes(offset as u64));
            } else {
                out.extend(u32_bytes(offset as u32));
            }
            offset += rec.len();
        }
        for rec in &records {
            out.extend(rec);
        }
        File::create(path).unwrap().write_all(&out).unwrap();
    }

    #[test]
    fn test_roundtrip_with_gaps_and_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asm.2bit");
        write_twobit(&path, &[("chr1", "ACGTNNNNacgtTTGCA"), ("chr2", "GATTACA")]);

        let tb = TwoBitFile::open(&path).unwrap();
        assert_eq!(tb.names(), vec!["chr1", "chr2"]);
        assert_eq!(tb.length("chr1").unwrap(), 17);
        assert_eq!(tb.fetch("chr1", 0, 17).unwrap(), "ACGTNNNNacgtTTGCA");
        assert_eq!(tb.fetch("chr2", 0, 7).unwrap(), "GATTACA");
    }

    #[test]
    fn test_big_endian_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("be.2bit");
        write_twobit_as(&path, &[("x", "ACGTNNACgt"), ("y", "TTTT")], ByteOrder::Big, 0);

        let tb = TwoBitFile::open(&path).unwrap();
        assert_eq!(tb.names(), vec!["x", "y"]);
        assert_eq!(tb.length("x").unwrap(), 10);
        assert_eq!(tb.fetch("x", 0, 8).unwrap(), "ACGTNNAC");
        assert_eq!(tb.fetch("x", 6, 10).unwrap(), "ACgt");
        assert_eq!(tb.fetch("y", 0, 4).unwrap(), "TTTT");
    }

    #[test]
    fn test_version_one_offsets() {
        let dir = tempfile::tempdir().unwrap();
        for (name, order) in [("le.2bit", ByteOrder::Little), ("be.2bit", ByteOrder::Big)] {
            let path = dir.path().join(name);
            write_twobit_as(&path, &[("chr1", "GATTACANNNNcc"), ("chr2", "ACGTA")], order, 1);

            let tb = TwoBitFile::open(&path).unwrap();
            assert_eq!(tb.fetch("chr1", 0, 13).unwrap(), "GATTACANNNNcc");
            assert_eq!(tb.fetch("chr2", 1, 5).unwrap(), "CGTA");
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.2bit");
        write_twobit(&path, &[("s", "ACGT"), ("s", "GGGG")]);
        let err = TwoBitFile::open(&path).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<GapDupError>(),
            Some(GapDupError::DuplicateSequence(_))
        ));
    }

    #[test]
    fn test_unaligned_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asm.2bit");
        write_twobit(&path, &[("s", "ACGTNNNNacgtTTGCA")]);

        let tb = TwoBitFile::open(&path).unwrap();
        assert_eq!(tb.fetch("s", 3, 10).unwrap(), "TNNNNac");
        assert_eq!(tb.fetch("s", 13, 13).unwrap(), "");
    }

    #[test]
    fn test_out_of_range_and_unknown_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asm.2bit");
        write_twobit(&path, &[("s", "ACGT")]);

        let tb = TwoBitFile::open(&path).unwrap();
        assert!(tb.fetch("s", 2, 5).is_err());
        let err = tb.fetch("missing", 0, 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GapDupError>(),
            Some(GapDupError::UnknownSequence(_))
        ));
    }

    #[test]
    fn test_bad_signature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.2bit");
        File::create(&path).unwrap().write_all(&[0u8; 16]).unwrap();
        assert!(TwoBitFile::open(&path).is_err());
    }
}
