//! Quarterly output layout and per-run wiring of sinks and checkpoint stores
//!
//! ```text
//! <data_dir>/
//!   gcs_query_plan.csv
//!   2024Q3/
//!     state.yaml
//!     1-fetch/<table>.csv
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};

use crate::checkpoint::{
    CheckpointError, CheckpointStore, GoalCheckpointStore, IndexCheckpointStore,
    MemoryCheckpointStore, StateFile,
};
use crate::retry::{BackoffPolicy, Retrier};
use crate::sink::{CsvSink, NullSink, RowSink};

/// Directory name of the fetch phase inside a quarter
pub const FETCH_PHASE: &str = "1-fetch";

pub const STATE_FILE: &str = "state.yaml";

/// `2024Q3` style label for a date
pub fn quarter_label(date: NaiveDate) -> String {
    format!("{}Q{}", date.year(), (date.month() - 1) / 3 + 1)
}

/// Paths of one quarter's harvest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarterPaths {
    data_dir: PathBuf,
    quarter: String,
}

impl QuarterPaths {
    pub fn new(data_dir: impl Into<PathBuf>, quarter: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            quarter: quarter.into(),
        }
    }

    /// Paths for the current UTC quarter
    pub fn current(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(data_dir, quarter_label(Utc::now().date_naive()))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn quarter(&self) -> &str {
        &self.quarter
    }

    pub fn quarter_dir(&self) -> PathBuf {
        self.data_dir.join(&self.quarter)
    }

    pub fn fetch_dir(&self) -> PathBuf {
        self.quarter_dir().join(FETCH_PHASE)
    }

    pub fn state_file(&self) -> StateFile {
        StateFile::new(self.quarter_dir().join(STATE_FILE))
    }
}

/// Options shared by every `fetch` run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub paths: QuarterPaths,
    /// Write rows and checkpoints; otherwise rows are discarded and existing
    /// checkpoints are only read
    pub enable_save: bool,
    pub limit: Option<usize>,
    /// Fabricate counts instead of calling the network
    pub dev: bool,
    pub backoff: BackoffPolicy,
    pub request_delay: Duration,
}

impl RunOptions {
    pub fn new(paths: QuarterPaths) -> Self {
        Self {
            paths,
            enable_save: false,
            limit: None,
            dev: false,
            backoff: BackoffPolicy::default(),
            request_delay: Duration::from_secs(1),
        }
    }

    pub fn sink(&self) -> std::io::Result<Box<dyn RowSink>> {
        if self.enable_save {
            Ok(Box::new(CsvSink::new(self.paths.fetch_dir())?))
        } else {
            Ok(Box::new(NullSink::new()))
        }
    }

    /// Index checkpoint over `tables`. Saves only touch disk (the graph
    /// marker) with persistence enabled.
    pub fn index_store(&self, tables: &[&str]) -> Box<dyn CheckpointStore> {
        let store = IndexCheckpointStore::new(self.paths.fetch_dir(), tables);
        if self.enable_save {
            Box::new(store.with_state_file(self.paths.state_file()))
        } else {
            Box::new(store)
        }
    }

    /// Goal counter in the quarter state file; read-only without persistence
    pub fn goal_store(&self, source_id: &str) -> Result<Box<dyn CheckpointStore>, CheckpointError> {
        let store = GoalCheckpointStore::new(self.paths.state_file());
        if self.enable_save {
            return Ok(Box::new(store));
        }
        let current = store.load(source_id)?;
        Ok(Box::new(
            MemoryCheckpointStore::new().with(source_id, current.completed),
        ))
    }

    /// Retrier with the configured policy; dev runs skip the courtesy delay
    pub fn retrier(&self) -> Retrier {
        let delay = if self.dev {
            Duration::ZERO
        } else {
            self.request_delay
        };
        Retrier::new(self.backoff, delay)
    }
}
