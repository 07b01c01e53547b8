//! Command line front end: split fused duplex reads found in a basecall file

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{info, Level};
use simple_logger::init_with_level;

use readsplit::bam::BamRecordStream;
use readsplit::detect::SplitConfig;
use readsplit::parallel::{SchedulerConfig, BATCH_SIZE};
use readsplit::pipeline::{run, RunOptions};
use readsplit::{RevCompAligner, SplitDetector};

#[derive(Parser, Debug)]
#[command(
    name = "readsplit",
    version,
    about = "Detect reads holding a template and its complement and split their raw signal"
)]
struct Args {
    #[arg(value_name = "ALIGNMENT", help = "Unaligned BAM/SAM holding mv, ts and ns tags")]
    alignment: PathBuf,

    #[arg(value_name = "SIGNAL_INPUT_DIR", help = "Directory searched for .rsig files")]
    signal_input_dir: PathBuf,

    #[arg(value_name = "SIGNAL_OUTPUT_DIR", help = "Directory receiving split .rsig files")]
    signal_output_dir: PathBuf,

    #[arg(
        long = "max-reads",
        value_name = "N",
        help = "Stop reading new batches once more than N reads were split"
    )]
    max_reads: Option<usize>,

    #[arg(long = "force-overwrite", help = "Replace existing output files")]
    force_overwrite: bool,

    #[arg(
        long = "debug-dir",
        value_name = "PATH",
        help = "Write one SVG of the original and split signal per read"
    )]
    debug_dir: Option<PathBuf>,

    #[arg(
        long = "match-threshold",
        value_name = "FRACTION",
        default_value_t = 0.8,
        help = "Minimum matched fraction of the first half"
    )]
    match_threshold: f64,

    #[arg(
        long = "left-midpoint-threshold",
        value_name = "FRACTION",
        default_value_t = 0.45,
        help = "Lowest accepted relative position of the split"
    )]
    left_midpoint_threshold: f64,

    #[arg(
        long = "right-midpoint-threshold",
        value_name = "FRACTION",
        default_value_t = 0.55,
        help = "Highest accepted relative position of the split"
    )]
    right_midpoint_threshold: f64,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "THREADS",
        default_value_t = default_threads(),
        help = "Number of detection threads"
    )]
    threads: usize,

    #[arg(
        long = "batch-size",
        value_name = "N",
        default_value_t = BATCH_SIZE,
        help = "Records assessed per batch"
    )]
    batch_size: usize,

    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: Level,
}

/// Leaves one CPU free on machines with more than two
fn default_threads() -> usize {
    let cpus = num_cpus::get();
    if cpus > 2 {
        cpus - 1
    } else {
        cpus
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_with_level(args.log_level)?;
    let start = std::time::Instant::now();

    let config = SplitConfig::default()
        .match_threshold(args.match_threshold)
        .midpoint_band(args.left_midpoint_threshold, args.right_midpoint_threshold);
    let detector = SplitDetector::new(RevCompAligner::default(), config);

    let mut options = RunOptions::new(&args.signal_input_dir, &args.signal_output_dir);
    options.overwrite = args.force_overwrite;
    options.debug_dir = args.debug_dir;
    options.scheduler = SchedulerConfig::default()
        .threads(args.threads)
        .batch_size(args.batch_size)
        .max_decisions(args.max_reads);

    info!("Reading basecalls from {}", args.alignment.display());
    let records = BamRecordStream::from_path(&args.alignment)?;
    let summary = run(records, &detector, &options)?;

    info!(
        "Split {} of {} reads into {} new reads",
        summary.decided, summary.assessed, summary.written
    );
    info!("Elapsed time: {:?}", start.elapsed());
    Ok(())
}
