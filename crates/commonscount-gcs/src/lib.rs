//! commonscount GCS - Google Custom Search counts per CC legal tool
//!
//! Counts pages linking to each legal tool, overall and broken down by
//! language and country, following a precomputed query plan.
//!
//! # Example
//!
//! ```no_run
//! use commonscount_core::{Credential, ProgressContext, QuarterPaths, RunOptions};
//! use commonscount_gcs::{Config, run};
//!
//! let config = Config {
//!     cx: "0123456789abcdef".into(),
//!     developer_keys: vec![Credential::new("key-a"), Credential::new("key-b")],
//!     ..Default::default()
//! };
//! let options = RunOptions::new(QuarterPaths::current("data"));
//! let report = run(&config, &options, &ProgressContext::new()).expect("harvest failed");
//! println!("{}", report.status);
//! ```

pub mod adapter;
pub mod config;
pub mod plan;
pub mod runner;

// Re-exports for convenience
pub use adapter::GcsAdapter;
pub use config::Config;
pub use plan::{create_query_plan, read_query_plan, write_query_plan};
pub use runner::run;
