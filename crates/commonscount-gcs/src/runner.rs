//! GCS harvest run

use commonscount_core::{
    DevAdapter, Harvester, ProgressContext, RunOptions, RunReport, SourceAdapter, Target,
};

use crate::adapter::{GcsAdapter, SOURCE_ID};
use crate::config::Config;
use crate::plan::read_query_plan;

/// Harvest the query plan from its checkpoint
pub fn run(
    config: &Config,
    options: &RunOptions,
    progress: &ProgressContext,
) -> anyhow::Result<RunReport> {
    if !options.dev {
        anyhow::ensure!(!config.cx.is_empty(), "GCS search engine id (cx) is not set");
        anyhow::ensure!(
            !config.developer_keys.is_empty(),
            "no GCS developer key configured"
        );
    }

    let plan = read_query_plan(&config.resolve_plan_file(options.paths.data_dir()))?;
    log::info!("{SOURCE_ID}: {} plan entries", plan.len());

    let adapter = GcsAdapter::new(config);
    let adapter: Box<dyn SourceAdapter> = if options.dev {
        Box::new(DevAdapter::new(adapter))
    } else {
        Box::new(adapter)
    };
    let store = options.index_store(adapter.tables());

    let mut harvester = Harvester::new(adapter, options.sink()?, store, options.retrier())
        .with_credentials(config.credentials())
        .with_limit(options.limit)
        .with_progress(progress.harvest_bar(SOURCE_ID, plan.len(), 0));

    Ok(harvester.run_plan(&plan, Target::PlanLength)?)
}
