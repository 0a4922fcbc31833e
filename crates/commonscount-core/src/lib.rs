//! commonscount core - resumable, rate-limited harvesting of CC usage counts
//!
//! Source crates implement [`SourceAdapter`] (and [`GraphSource`] for
//! category trees); the [`Harvester`] drives them through backoff, credential
//! rotation and checkpointing.

pub mod checkpoint;
pub mod credentials;
pub mod error;
pub mod harvest;
pub mod http;
pub mod logging;
pub mod output;
pub mod plan;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod tool;
pub mod traverse;

// Re-exports for convenience
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, GoalCheckpointStore, IndexCheckpointStore,
    MemoryCheckpointStore, PLAN_INDEX_COLUMN, StateFile,
};
pub use credentials::{Credential, CredentialRotator};
pub use error::{FetchError, HarvestError};
pub use harvest::{HarvestStatus, Harvester, RunReport, Target};
pub use http::{HttpFailure, HttpSettings, get_json, set_http_settings};
pub use logging::{ProgressLogger, init_logging};
pub use output::{QuarterPaths, RunOptions, quarter_label};
pub use plan::{
    Dimension, DimensionKind, DimensionSpec, DimensionValue, Plan, ToolScope, WorkItem,
    build_plan,
};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{BackoffPolicy, Retrier};
pub use shutdown::{
    install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag,
};
pub use sink::{CsvSink, NullSink, Row, RowSink};
pub use source::{DevAdapter, FetchResult, GraphSource, SourceAdapter};
pub use tool::{LegalTool, prioritize};
pub use traverse::{CategoryNode, TraversalError, TraversalStats, VisitFlow, traverse};
