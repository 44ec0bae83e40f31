//! Converts a duplication report to BED: one interval for the copy before
//! each gap and one for the copy after it.

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use gapdups::dups::{write_bed, ReportReader};

#[derive(Parser)]
#[command(name = "gapdups-bed")]
#[command(version)]
#[command(about = "Write both copies of every reported duplication as BED")]
struct Args {
    #[arg(value_name = "REPORT")]
    report: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    gapdups::init_logging(false);

    let records = ReportReader::open(&args.report)?.records()?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    write_bed(&records, &mut writer)?;
    writer.flush()?;
    Ok(())
}
