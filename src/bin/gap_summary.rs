//! Prints how many gaps of an assembly carry a duplication.
//!
//! Output: `base  totalGaps  duplicatedGaps  percent`

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use gapdups::dups::{duplicated_gaps, report_base_name, summary_line, ReportReader};
use gapdups::gaps::count_gaps;
use gapdups::store::open_store;

#[derive(Parser)]
#[command(name = "gapdups-summary")]
#[command(version)]
#[command(about = "Summarise the fraction of gaps with a duplication")]
struct Args {
    /// Sequence store the report was computed from (FASTA or .2bit)
    #[arg(value_name = "STORE")]
    store: PathBuf,

    #[arg(value_name = "REPORT")]
    report: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    gapdups::init_logging(false);

    let records = ReportReader::open(&args.report)?.records()?;
    let store = open_store(&args.store)?;
    let total = count_gaps(store.as_ref())?;

    println!(
        "{}",
        summary_line(&report_base_name(&args.report), total, duplicated_gaps(&records))
    );
    Ok(())
}
