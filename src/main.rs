use anyhow::Result;
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use gapdups::aligner::{AlignerConfig, AlignerTool, ExternalAligner};
use gapdups::config::{PipelineConfig, DEFAULT_MAX_SIZE, DEFAULT_SPLIT_SIZE};
use gapdups::orchestrator::{AssemblyJob, Orchestrator};

#[derive(Parser)]
#[command(name = "gapdups")]
#[command(version)]
#[command(about = "Detect tandem duplications straddling scaffold gaps")]
#[command(long_about = r#"
gapdups - find sequence duplicated on both sides of assembly gaps

For every run of N bases, the sequence before the gap (up to --max-size
bases) is aligned against the sequence after it. An alignment that ends
exactly at the gap on the left and starts exactly at the gap on the right
is reported as a duplication.

WORKFLOW:
  Sequence store → gap scan → batches (--split) → aligner (parallel) → merged report

OUTPUT:
  sequence  gapStart  gapEnd  dupSize  dupPctID
    0-based half-open gap coordinates; only duplications longer than 20 bp

INPUTS:
  FASTA (.fa/.fasta, optionally .gz) or UCSC .2bit; inputs and outputs are
  paired by position.

EXAMPLES:
  gapdups -i hg38.2bit -o hg38.dups
  gapdups -i a.fa b.fa -o a.dups b.dups --aligner minimap2 -t 16
"#)]
struct Args {
    #[arg(short = 'i', long, value_name = "FILE(S)", num_args = 1.., required = true, help_heading = "Input")]
    inputs: Vec<PathBuf>,

    #[arg(short = 'o', long, value_name = "FILE(S)", num_args = 1.., required = true, help_heading = "Output")]
    outputs: Vec<PathBuf>,

    #[arg(short = 'm', long = "max-size", value_name = "BP", default_value_t = DEFAULT_MAX_SIZE, help_heading = "Detection")]
    max_size: usize,

    #[arg(short = 's', long = "split", value_name = "NUM", default_value_t = DEFAULT_SPLIT_SIZE, help_heading = "Detection")]
    split_size: usize,

    #[arg(short = 'a', long, value_enum, default_value_t = AlignerTool::Lastz, help_heading = "Aligner")]
    aligner: AlignerTool,

    /// Aligner executable (looked up on PATH by default)
    #[arg(long = "aligner-path", value_name = "FILE", help_heading = "Aligner")]
    aligner_path: Option<PathBuf>,

    /// Seconds before a single aligner run is killed
    #[arg(long, value_name = "SECS", default_value = "300", help_heading = "Aligner")]
    timeout: u64,

    /// Extra attempts for a failed batch
    #[arg(short = 'r', long, value_name = "NUM", default_value = "2", help_heading = "Runtime")]
    retries: usize,

    #[arg(short = 't', long, value_name = "NUM", default_value = "0", help_heading = "Runtime")]
    threads: usize,

    /// Parent directory for scratch files (system temp dir by default)
    #[arg(short = 'w', long = "work-dir", value_name = "DIR", help_heading = "Runtime")]
    work_dir: Option<PathBuf>,

    /// Keep batch task and partial result files
    #[arg(short = 'k', long = "keep-work", help_heading = "Runtime")]
    keep_work: bool,

    #[arg(short = 'v', long, help_heading = "Output")]
    verbose: bool,
}

fn find_executable(name: &Path) -> Result<PathBuf> {
    if name.components().count() > 1 || name.is_absolute() {
        if name.is_file() {
            return Ok(name.to_path_buf());
        }
        anyhow::bail!("{} does not exist", name.display());
    }

    if let Ok(paths) = env::var("PATH") {
        for dir in env::split_paths(&paths) {
            let full_path = dir.join(name);
            if full_path.is_file() {
                return Ok(full_path);
            }
        }
    }

    anyhow::bail!("{} not found in PATH. Please install it or pass --aligner-path.", name.display())
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    let start_time = Instant::now();
    gapdups::init_logging(args.verbose);

    if args.inputs.len() != args.outputs.len() {
        anyhow::bail!(
            "{} input(s) but {} output(s); each input needs exactly one output",
            args.inputs.len(),
            args.outputs.len()
        );
    }
    if args.threads == 0 {
        args.threads = num_cpus::get();
    }

    let config = PipelineConfig {
        max_size: args.max_size,
        split_size: args.split_size,
        max_retries: args.retries,
        work_dir: args.work_dir.clone(),
        keep_work: args.keep_work,
        ..PipelineConfig::default()
    };
    config.validate()?;

    let mut aligner_config = AlignerConfig::new(args.aligner);
    let program = args
        .aligner_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(args.aligner.program_name()));
    aligner_config.program = find_executable(&program)?;
    aligner_config.timeout = Duration::from_secs(args.timeout);
    log::debug!("Using {}", aligner_config.program.display());

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .ok();

    let jobs: Vec<AssemblyJob> = args
        .inputs
        .iter()
        .zip(&args.outputs)
        .map(|(input, output)| AssemblyJob::new(input, output))
        .collect();
    log::info!("Processing {} assembly(ies) with {} threads", jobs.len(), args.threads);

    let aligner = ExternalAligner::new(aligner_config);
    let results = Orchestrator::new(&aligner, &config).run(&jobs);

    let mut failed = 0;
    for result in &results {
        match result {
            Ok(summary) => log::info!(
                "{}: {} duplication(s) at {} gap(s) -> {}",
                summary.assembly,
                summary.duplications,
                summary.gaps,
                summary.output.display()
            ),
            Err(e) => {
                failed += 1;
                log::error!("{:#}", e);
            }
        }
    }

    log::info!("Finished in {:.1}s", start_time.elapsed().as_secs_f64());
    if failed > 0 {
        anyhow::bail!("{} of {} assemblies failed", failed, jobs.len());
    }
    Ok(())
}
