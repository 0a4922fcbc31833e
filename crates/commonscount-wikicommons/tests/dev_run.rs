//! Dev-mode traversal: rows, completion marker and the no-op rerun

use std::fs;

use commonscount_core::{HarvestStatus, ProgressContext, QuarterPaths, RunOptions};
use commonscount_wikicommons::adapter::COUNT_TABLE;
use commonscount_wikicommons::totals::TOTALS_TABLE;
use commonscount_wikicommons::{Config, run};
use tempfile::TempDir;

#[test]
fn root_only_traversal_completes_then_noops() {
    let dir = TempDir::new().unwrap();
    let paths = QuarterPaths::new(dir.path(), "2024Q3");
    let mut options = RunOptions::new(paths.clone());
    options.enable_save = true;
    options.dev = true;
    let progress = ProgressContext::new();
    let config = Config::default();

    let report = run(&config, &options, &progress).unwrap();
    assert_eq!(report.status, HarvestStatus::Completed);
    assert_eq!(report.processed, 1);

    let text = fs::read_to_string(paths.fetch_dir().join(format!("{COUNT_TABLE}.csv"))).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("PLAN_INDEX,CATEGORY_PATH,FILE_COUNT,PAGE_COUNT"));
    assert!(lines.next().unwrap().starts_with("1,Free_Creative_Commons_licenses,666"));
    assert_eq!(
        paths.state_file().get("nodes_total (wikicommons)").unwrap(),
        Some(1)
    );
    let totals = fs::read_to_string(paths.fetch_dir().join(format!("{TOTALS_TABLE}.csv"))).unwrap();
    let mut lines = totals.lines();
    assert_eq!(
        lines.next(),
        Some("CATEGORY_PATH,SUBCATEGORIES,TOTAL_FILE_COUNT,TOTAL_PAGE_COUNT")
    );
    assert!(lines.next().unwrap().starts_with("Free_Creative_Commons_licenses,0,666"));

    let report = run(&config, &options, &progress).unwrap();
    assert_eq!(report.status, HarvestStatus::AlreadyComplete);
}

#[test]
fn dry_run_writes_no_totals() {
    let dir = TempDir::new().unwrap();
    let paths = QuarterPaths::new(dir.path(), "2024Q3");
    let mut options = RunOptions::new(paths.clone());
    options.dev = true;

    let report = run(&Config::default(), &options, &ProgressContext::new()).unwrap();
    assert_eq!(report.status, HarvestStatus::Completed);
    assert!(!paths.fetch_dir().exists());
}

#[test]
fn blank_root_is_rejected() {
    let dir = TempDir::new().unwrap();
    let options = RunOptions::new(QuarterPaths::new(dir.path(), "2024Q3"));
    let config = Config {
        root_category: " _ ".into(),
        ..Default::default()
    };
    assert!(run(&config, &options, &ProgressContext::new()).is_err());
}
