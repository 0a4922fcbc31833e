//! Status subcommand - checkpoint of every source for one quarter

use std::path::Path;

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use commonscount_core::checkpoint::graph_total_key;
use commonscount_core::{
    CheckpointStore, GoalCheckpointStore, IndexCheckpointStore, QuarterPaths, fmt_num,
};

use super::table;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Quarter to inspect, e.g. 2024Q3 (default: current)
    #[arg(long)]
    pub quarter: Option<String>,
}

struct SourceStatus {
    source: &'static str,
    completed: usize,
    target: Option<usize>,
}

impl SourceStatus {
    fn state(&self) -> &'static str {
        match self.target {
            Some(target) if self.completed >= target => "complete",
            _ if self.completed == 0 => "not started",
            _ => "in progress",
        }
    }
}

pub fn run(args: StatusArgs, config: &Config, data_dir: &Path) -> Result<()> {
    let paths = match args.quarter {
        Some(quarter) => QuarterPaths::new(data_dir, quarter),
        None => QuarterPaths::current(data_dir),
    };
    let statuses = collect(&paths, config)?;

    let mut table = table(&["Source", "Checkpoint", "Target", "State"]);
    for status in &statuses {
        table.add_row(vec![
            Cell::new(status.source),
            Cell::new(fmt_num(status.completed as u64)),
            Cell::new(
                status
                    .target
                    .map(|t| fmt_num(t as u64))
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
            Cell::new(status.state()),
        ]);
    }
    eprintln!("\n{} ({})\n{table}", paths.quarter(), paths.quarter_dir().display());
    Ok(())
}

fn collect(paths: &QuarterPaths, config: &Config) -> Result<Vec<SourceStatus>> {
    use commonscount_gcs::adapter as gcs;
    use commonscount_wikicommons::adapter as wikicommons;
    use commonscount_youtube::adapter as youtube;

    let gcs_store = IndexCheckpointStore::new(
        paths.fetch_dir(),
        &[gcs::COUNT_TABLE, gcs::LANGUAGE_TABLE, gcs::COUNTRY_TABLE],
    );
    let plan_file = config.gcs.source_config(None).resolve_plan_file(paths.data_dir());
    let gcs_target = if plan_file.exists() {
        Some(commonscount_gcs::read_query_plan(&plan_file)?.len())
    } else {
        None
    };

    let wikicommons_store =
        IndexCheckpointStore::new(paths.fetch_dir(), &[wikicommons::COUNT_TABLE]);
    let wikicommons_target = paths
        .state_file()
        .get(&graph_total_key(wikicommons::SOURCE_ID))?;

    let youtube_store = GoalCheckpointStore::new(paths.state_file());
    let youtube_config = config.youtube.source_config(None);
    let intervals = commonscount_youtube::current_interval_plan(&youtube_config.license_type).len();
    let youtube_target = youtube_config.goal.map_or(intervals, |g| g.min(intervals));

    Ok(vec![
        SourceStatus {
            source: gcs::SOURCE_ID,
            completed: gcs_store.load(gcs::SOURCE_ID)?.completed,
            target: gcs_target,
        },
        SourceStatus {
            source: wikicommons::SOURCE_ID,
            completed: wikicommons_store.load(wikicommons::SOURCE_ID)?.completed,
            target: wikicommons_target,
        },
        SourceStatus {
            source: youtube::SOURCE_ID,
            completed: youtube_store.load(youtube::SOURCE_ID)?.completed,
            target: Some(youtube_target),
        },
    ])
}
