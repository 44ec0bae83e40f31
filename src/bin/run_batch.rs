//! Re-runs one saved batch task (`batch_NNNNN.json` from a `--keep-work`
//! directory) and rewrites its partial result.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use gapdups::aligner::{AlignerConfig, AlignerTool, ExternalAligner};
use gapdups::jobs::{align_batch, AlignBatchTask};
use gapdups::store::open_store;

#[derive(Parser)]
#[command(name = "gapdups-batch")]
#[command(version)]
#[command(about = "Execute a single saved alignment batch")]
struct Args {
    #[arg(value_name = "TASK")]
    task: PathBuf,

    #[arg(short = 'a', long, value_enum, default_value_t = AlignerTool::Lastz)]
    aligner: AlignerTool,

    #[arg(long = "aligner-path", value_name = "FILE")]
    aligner_path: Option<PathBuf>,

    #[arg(long, value_name = "SECS", default_value = "300")]
    timeout: u64,

    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    gapdups::init_logging(args.verbose);

    let task = AlignBatchTask::load(&args.task)?;
    let store = open_store(&task.store)?;

    let mut config = AlignerConfig::new(args.aligner);
    if let Some(path) = args.aligner_path {
        config.program = path;
    }
    config.timeout = Duration::from_secs(args.timeout);
    let aligner = ExternalAligner::new(config);

    let records = align_batch(&task, store.as_ref(), &aligner)?;
    log::info!(
        "{}: batch {} produced {} duplication(s) -> {}",
        task.assembly,
        task.batch.index,
        records.len(),
        task.output.display()
    );
    Ok(())
}
