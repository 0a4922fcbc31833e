//! Plan subcommand - build query plans ahead of fetching

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use super::print_summary;

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub source: PlanSource,
}

#[derive(Subcommand, Debug)]
pub enum PlanSource {
    /// Build the GCS query plan from the tool paths and collections in the data directory
    Gcs,
}

pub fn run(args: PlanArgs, data_dir: &Path) -> Result<()> {
    match args.source {
        PlanSource::Gcs => {
            let plan = commonscount_gcs::write_query_plan(data_dir)?;
            print_summary(
                "GCS plan",
                &[
                    ("Entries", plan.len().to_string()),
                    (
                        "File",
                        commonscount_gcs::Config::plan_path(data_dir)
                            .display()
                            .to_string(),
                    ),
                ],
            );
            Ok(())
        }
    }
}
