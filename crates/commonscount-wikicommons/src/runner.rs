//! WikiCommons harvest run

use commonscount_core::{
    CheckpointStore, DevAdapter, GraphSource, Harvester, ProgressContext, RunOptions, RunReport,
    SourceAdapter,
};

use crate::adapter::{SOURCE_ID, WikiCommonsAdapter, canonicalize};
use crate::config::Config;
use crate::totals::write_totals;

/// Traverse from the configured root, skipping categories already recorded.
///
/// Once the whole graph is recorded, the subtree totals table is rebuilt
/// from the count table.
pub fn run(
    config: &Config,
    options: &RunOptions,
    progress: &ProgressContext,
) -> anyhow::Result<RunReport> {
    anyhow::ensure!(
        !canonicalize(&config.root_category).is_empty(),
        "WikiCommons root category is empty"
    );

    let adapter = WikiCommonsAdapter::new(config);
    let adapter: Box<dyn GraphSource> = if options.dev {
        Box::new(DevAdapter::new(adapter))
    } else {
        Box::new(adapter)
    };
    let store = options.index_store(adapter.tables());

    let mut harvester = Harvester::new(adapter, options.sink()?, store, options.retrier())
        .with_limit(options.limit)
        .with_progress(progress.traversal_spinner(SOURCE_ID));

    let report = harvester.run_graph(&config.root_category, canonicalize)?;
    if options.enable_save && harvester.store().load_graph_total(SOURCE_ID)?.is_some() {
        write_totals(&options.paths.fetch_dir())?;
    }
    Ok(report)
}
