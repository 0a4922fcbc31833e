//! commonscount WikiCommons - file and page counts per CC license category
//!
//! Walks the category tree below a root category (depth-first, each
//! category visited once however many parents list it) and records the
//! `categoryinfo` counts of every category reached. A finished traversal
//! also gets a totals table rolling each category's counts up its subtree.

pub mod adapter;
pub mod config;
pub mod runner;
pub mod totals;

// Re-exports for convenience
pub use adapter::{WikiCommonsAdapter, canonicalize};
pub use config::Config;
pub use runner::run;
pub use totals::{SubtreeTotal, subtree_totals, write_totals};
