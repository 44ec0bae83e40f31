//! Removes reported duplications from an assembly.
//!
//! Usage:
//!   gapdups-trim asm.fa asm.dups --additional 10 > asm.trimmed.fa

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use gapdups::dups::{group_by_sequence, write_trimmed_fasta, ReportReader};
use gapdups::seqio::FastaReader;

#[derive(Parser)]
#[command(name = "gapdups-trim")]
#[command(version)]
#[command(about = "Write the FASTA with both copies of every duplication removed")]
struct Args {
    #[arg(value_name = "FASTA")]
    fasta: PathBuf,

    #[arg(value_name = "REPORT")]
    report: PathBuf,

    /// Extra bases removed beyond each copy's outer edge
    #[arg(short = 'a', long, value_name = "BP", default_value = "0")]
    additional: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    gapdups::init_logging(false);

    let dups = group_by_sequence(ReportReader::open(&args.report)?.records()?);
    let fasta = FastaReader::open(&args.fasta)?;

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let trimmed = write_trimmed_fasta(fasta, &dups, args.additional, &mut writer)?;
    writer.flush()?;
    log::info!("Trimmed {} sequence(s)", trimmed);
    Ok(())
}
