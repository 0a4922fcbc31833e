//! commonscount - resumable harvester for Creative Commons usage counts
//!
//! Queries Google Custom Search, WikiCommons and YouTube for how often CC
//! legal tools are used, a few requests per run, picking up where the last
//! run stopped.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::Cell;

mod cmd;
mod config;

use cmd::fetch::EXIT_CONFIG;
use config::Config;

#[derive(Parser)]
#[command(name = "commonscount")]
#[command(about = "Resumable harvester for Creative Commons usage counts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./commonscount.toml or ~/.config/commonscount/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding plans and quarterly output
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Attempts per request before giving up on transient failures
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Milliseconds to wait between consecutive requests
    #[arg(long, global = true)]
    request_delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Build query plans
    Plan(cmd::plan::PlanArgs),
    /// Harvest counts from a source
    Fetch(cmd::fetch::FetchArgs),
    /// Show per-source checkpoints for a quarter
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(commonscount_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  - progress bars show activity
    //   non-TTY: info unless --debug          - logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    commonscount_core::init_logging(quiet, cli.debug, multi);

    if let Err(e) = commonscount_core::install_signal_handlers() {
        log::warn!("Failed to install signal handlers: {e}");
    }

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // CLI overrides
    if let Some(max_attempts) = cli.max_attempts {
        config.http.max_attempts = max_attempts;
    }
    if let Some(delay) = cli.request_delay_ms {
        config.http.request_delay_ms = delay;
    }
    commonscount_core::set_http_settings(config.http.settings());
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| config.output.data_dir.clone());

    let result = match cli.command {
        Command::Plan(args) => cmd::plan::run(args, &data_dir).map(|()| ExitCode::SUCCESS),
        Command::Fetch(args) => cmd::fetch::run(args, &config, data_dir, &progress),
        Command::Status(args) => {
            cmd::status::run(args, &config, &data_dir).map(|()| ExitCode::SUCCESS)
        }
        Command::Config => {
            print_config(&config, &data_dir);
            Ok(ExitCode::SUCCESS)
        }
    };

    result.unwrap_or_else(|e| {
        log::error!("{e:#}");
        ExitCode::FAILURE
    })
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

fn print_config(config: &Config, data_dir: &std::path::Path) {
    let configured = |set: bool| if set { "configured" } else { "not set" };
    let http = &config.http;

    let mut table = cmd::table(&["Setting", "Value"]);
    let rows: Vec<(&str, String)> = vec![
        ("Data directory", data_dir.display().to_string()),
        ("Max attempts", http.max_attempts.to_string()),
        (
            "Backoff",
            format!(
                "{}ms x{} (max {}ms, jitter {}ms)",
                http.base_delay_ms, http.multiplier, http.max_delay_ms, http.jitter_ms
            ),
        ),
        ("Request delay", format!("{}ms", http.request_delay_ms)),
        (
            "Timeouts",
            format!(
                "connect {}s, request {}s",
                http.connect_timeout_secs, http.request_timeout_secs
            ),
        ),
        ("GCS base URL", config.gcs.base_url.clone()),
        ("GCS cx", configured(config.gcs.cx.is_some()).to_string()),
        (
            "GCS developer keys",
            configured(config.gcs.developer_keys.is_some()).to_string(),
        ),
        ("WikiCommons API URL", config.wikicommons.api_url.clone()),
        ("WikiCommons root", config.wikicommons.root_category.clone()),
        ("YouTube API URL", config.youtube.api_url.clone()),
        ("YouTube license type", config.youtube.license_type.clone()),
        (
            "YouTube API keys",
            configured(config.youtube.api_keys.is_some()).to_string(),
        ),
        (
            "YouTube goal",
            config
                .youtube
                .goal
                .map_or_else(|| "all intervals".to_string(), |g| g.to_string()),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }

    eprintln!("\n{table}");
}
