//! Fetch subcommand - harvest counts from one source

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use commonscount_core::shutdown::FORCED_EXIT_CODE;
use commonscount_core::{HarvestStatus, QuarterPaths, RunOptions, RunReport, SharedProgress};

use super::print_summary;
use crate::config::Config;

/// Quota hit with every credential spent
pub const EXIT_DEPLETED: u8 = 3;
/// Missing or invalid configuration
pub const EXIT_CONFIG: u8 = 2;

/// GCS queries per run unless `--limit` says otherwise
const GCS_DEFAULT_LIMIT: usize = 1;

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(subcommand)]
    pub source: FetchSource,
}

#[derive(Subcommand, Debug)]
pub enum FetchSource {
    /// Google Custom Search counts per legal tool, language and country
    Gcs(GcsArgs),
    /// WikiCommons file and page counts per license category
    Wikicommons(WikiCommonsArgs),
    /// YouTube Creative Commons video counts per two-month window
    Youtube(YouTubeArgs),
}

/// Flags shared by every source
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Write rows and checkpoints (otherwise a dry run)
    #[arg(long)]
    pub enable_save: bool,

    /// Fabricate counts instead of calling the API
    #[arg(long)]
    pub dev: bool,

    /// Quarter to write into, e.g. 2024Q3 (default: current)
    #[arg(long)]
    pub quarter: Option<String>,
}

#[derive(Args, Debug)]
pub struct GcsArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Query plan CSV (default: <data-dir>/gcs_query_plan.csv)
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Maximum number of queries this run
    #[arg(short = 'l', long, default_value_t = GCS_DEFAULT_LIMIT)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct WikiCommonsArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Root category (default from config)
    #[arg(long)]
    pub root: Option<String>,

    /// Maximum number of categories recorded this run
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct YouTubeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Intervals to record in total (default: all up to now)
    #[arg(long)]
    pub goal: Option<usize>,

    /// Maximum number of queries this run
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,
}

pub fn run(
    args: FetchArgs,
    config: &Config,
    data_dir: PathBuf,
    progress: &SharedProgress,
) -> Result<ExitCode> {
    match args.source {
        FetchSource::Gcs(args) => {
            let source = config.gcs.source_config(args.plan);
            if !args.run.dev && (source.cx.is_empty() || source.developer_keys.is_empty()) {
                log::error!("GCS needs a search engine id and developer key (GCS_CX, GCS_DEVELOPER_KEY)");
                return Ok(ExitCode::from(EXIT_CONFIG));
            }
            let options = run_options(&args.run, Some(args.limit), config, data_dir);
            let report = commonscount_gcs::run(&source, &options, progress)?;
            Ok(finish("GCS", &report))
        }
        FetchSource::Wikicommons(args) => {
            let source = config.wikicommons.source_config(args.root);
            let options = run_options(&args.run, args.limit, config, data_dir);
            let report = commonscount_wikicommons::run(&source, &options, progress)?;
            Ok(finish("WikiCommons", &report))
        }
        FetchSource::Youtube(args) => {
            let source = config.youtube.source_config(args.goal);
            if !args.run.dev && source.api_keys.is_empty() {
                log::error!("YouTube needs an API key (YOUTUBE_API_KEY)");
                return Ok(ExitCode::from(EXIT_CONFIG));
            }
            let options = run_options(&args.run, args.limit, config, data_dir);
            let report = commonscount_youtube::run(&source, &options, progress)?;
            Ok(finish("YouTube", &report))
        }
    }
}

fn run_options(
    args: &RunArgs,
    limit: Option<usize>,
    config: &Config,
    data_dir: PathBuf,
) -> RunOptions {
    let paths = match &args.quarter {
        Some(quarter) => QuarterPaths::new(data_dir, quarter.clone()),
        None => QuarterPaths::current(data_dir),
    };
    log::info!("Output: {}", paths.fetch_dir().display());
    if !args.enable_save {
        log::info!("Saving disabled, rows are discarded (use --enable-save)");
    }

    let mut options = RunOptions::new(paths);
    options.enable_save = args.enable_save;
    options.dev = args.dev;
    options.limit = limit;
    options.backoff = config.http.backoff();
    options.request_delay = config.http.request_delay();
    options
}

/// Print the run summary and map its status to the process exit code
fn finish(title: &str, report: &RunReport) -> ExitCode {
    let mut rows = vec![
        ("Status", report.status.to_string()),
        (
            "Checkpoint",
            format!("{} -> {}", report.start.completed, report.end.completed),
        ),
        ("Processed", report.processed.to_string()),
        ("Rotations", report.rotations.to_string()),
    ];
    if let Some(stats) = &report.traversal {
        rows.push(("Visited", stats.visited.to_string()));
        rows.push(("Revisits", stats.revisits.to_string()));
        rows.push(("Listing failures", stats.child_fetch_failures.to_string()));
    }
    rows.push(("Time", format!("{:.1}s", report.elapsed.as_secs_f64())));
    print_summary(title, &rows);

    ExitCode::from(exit_code(&report.status))
}

pub fn exit_code(status: &HarvestStatus) -> u8 {
    match status {
        HarvestStatus::Completed | HarvestStatus::AlreadyComplete | HarvestStatus::LimitReached => 0,
        HarvestStatus::CredentialsDepleted { .. } => EXIT_DEPLETED,
        HarvestStatus::Fatal { .. } => 1,
        HarvestStatus::Cancelled => FORCED_EXIT_CODE as u8,
    }
}
