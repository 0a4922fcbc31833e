//! commonscount YouTube - Creative Commons video counts per upload interval
//!
//! Queries the Data API search endpoint once per two-month publication
//! window since 2009, checkpointing with a goal counter in the quarter's
//! state file.

pub mod adapter;
pub mod config;
pub mod intervals;
pub mod runner;

// Re-exports for convenience
pub use adapter::YouTubeAdapter;
pub use config::Config;
pub use intervals::{Interval, current_interval_plan, interval_plan};
pub use runner::run;
