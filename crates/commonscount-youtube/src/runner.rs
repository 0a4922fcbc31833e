//! YouTube harvest run

use commonscount_core::{
    DevAdapter, Harvester, ProgressContext, RunOptions, RunReport, SourceAdapter, Target,
};

use crate::adapter::{SOURCE_ID, YouTubeAdapter};
use crate::config::Config;
use crate::intervals::current_interval_plan;

/// Harvest interval counts until the goal counter reaches the goal
pub fn run(
    config: &Config,
    options: &RunOptions,
    progress: &ProgressContext,
) -> anyhow::Result<RunReport> {
    if !options.dev {
        anyhow::ensure!(!config.api_keys.is_empty(), "no YouTube API key configured");
    }

    let plan = current_interval_plan(&config.license_type);
    let target = match config.goal {
        Some(goal) => Target::Goal(goal),
        None => Target::PlanLength,
    };
    log::info!("{SOURCE_ID}: {} intervals, target {target:?}", plan.len());

    let adapter = YouTubeAdapter::new(config);
    let adapter: Box<dyn SourceAdapter> = if options.dev {
        Box::new(DevAdapter::new(adapter))
    } else {
        Box::new(adapter)
    };

    let mut harvester = Harvester::new(
        adapter,
        options.sink()?,
        options.goal_store(SOURCE_ID)?,
        options.retrier(),
    )
    .with_credentials(config.credentials())
    .with_limit(options.limit)
    .with_progress(progress.harvest_bar(SOURCE_ID, plan.len(), 0));

    Ok(harvester.run_plan(&plan, target)?)
}
