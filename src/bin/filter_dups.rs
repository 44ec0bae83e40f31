//! Filters a duplication report by size and identity.
//!
//! Usage:
//!   gapdups-filter hg38.dups -s 100 -p 98.5 > hg38.filtered.dups

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use gapdups::dups::{filter_report, DupFilter, ReportReader};

#[derive(Parser)]
#[command(name = "gapdups-filter")]
#[command(version)]
#[command(about = "Keep report rows with dupSize >= SIZE and dupPctID >= PCT")]
struct Args {
    #[arg(value_name = "REPORT")]
    report: PathBuf,

    #[arg(short = 's', long, value_name = "BP", default_value = "0")]
    size: usize,

    #[arg(short = 'p', long = "pct", value_name = "PERCENT", default_value = "0.0")]
    pct: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    gapdups::init_logging(false);

    let reader = ReportReader::open(&args.report)?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let kept = filter_report(
        reader,
        &mut writer,
        DupFilter {
            min_size: args.size,
            min_pct_id: args.pct,
        },
    )?;
    writer.flush()?;
    log::debug!("{} rows kept", kept);
    Ok(())
}
