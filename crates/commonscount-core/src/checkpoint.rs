//! Checkpoint stores: durable "how far did we get" per source
//!
//! Two shapes. Index-based stores read the highest `PLAN_INDEX` off the last
//! row of each output table, so the output files are the source of truth.
//! Goal-counter stores keep a running total in a YAML state file.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::sink::read_complete_rows;

/// Output column every index-checkpointed table starts with
pub const PLAN_INDEX_COLUMN: &str = "PLAN_INDEX";

/// Number of completed units; for plans, also the last completed index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint {
    pub completed: usize,
}

impl Checkpoint {
    pub fn new(completed: usize) -> Self {
        Self { completed }
    }

    /// 1-based index of the next unit to process
    pub fn next_index(&self) -> usize {
        self.completed + 1
    }
}

#[derive(Debug)]
pub enum CheckpointError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, message: String },
    /// A save would move the checkpoint backwards
    Regression {
        source_id: String,
        stored: usize,
        attempted: usize,
    },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Parse { path, message } => write!(f, "{}: {message}", path.display()),
            Self::Regression {
                source_id,
                stored,
                attempted,
            } => write!(
                f,
                "{source_id}: checkpoint would decrease from {stored} to {attempted}"
            ),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Durable progress record, one per source id
pub trait CheckpointStore {
    fn load(&self, source_id: &str) -> Result<Checkpoint, CheckpointError>;

    /// Record progress; must never decrease
    fn save(&mut self, source_id: &str, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Node count of a finished graph traversal, if one was recorded
    fn load_graph_total(&self, _source_id: &str) -> Result<Option<usize>, CheckpointError> {
        Ok(None)
    }

    fn save_graph_total(&mut self, _source_id: &str, _total: usize) -> Result<(), CheckpointError> {
        Ok(())
    }

    /// Values of `column` in the rows already recorded for `source_id`;
    /// graph runs skip nodes found here
    fn load_recorded(&self, _source_id: &str, _column: &str) -> Result<Vec<String>, CheckpointError> {
        Ok(Vec::new())
    }
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for Box<T> {
    fn load(&self, source_id: &str) -> Result<Checkpoint, CheckpointError> {
        (**self).load(source_id)
    }

    fn save(&mut self, source_id: &str, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        (**self).save(source_id, checkpoint)
    }

    fn load_graph_total(&self, source_id: &str) -> Result<Option<usize>, CheckpointError> {
        (**self).load_graph_total(source_id)
    }

    fn save_graph_total(&mut self, source_id: &str, total: usize) -> Result<(), CheckpointError> {
        (**self).save_graph_total(source_id, total)
    }

    fn load_recorded(&self, source_id: &str, column: &str) -> Result<Vec<String>, CheckpointError> {
        (**self).load_recorded(source_id, column)
    }
}

/// Key of the goal counter in the state file
pub fn goal_key(source_id: &str) -> String {
    format!("total_units_retrieved ({source_id})")
}

/// Key of the graph completion marker in the state file
pub fn graph_total_key(source_id: &str) -> String {
    format!("nodes_total ({source_id})")
}

/// Small YAML key/value file shared by all sources of a run.
///
/// Unknown keys are preserved on rewrite. Writes go through `<file>.tmp`
/// and a rename, so a crash never leaves a half-written state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, serde_yaml::Value>, CheckpointError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(io_err(&self.path)(e)),
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_yaml::from_str(&text).map_err(|e| CheckpointError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<usize>, CheckpointError> {
        let map = self.read_map()?;
        match map.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| CheckpointError::Parse {
                    path: self.path.clone(),
                    message: format!("{key:?} is not a non-negative integer"),
                }),
        }
    }

    pub fn set(&self, key: &str, value: usize) -> Result<(), CheckpointError> {
        let mut map = self.read_map()?;
        map.insert(key.to_string(), serde_yaml::Value::from(value as u64));
        let text = serde_yaml::to_string(&map).map_err(|e| CheckpointError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, text).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))
    }
}

/// Index checkpoint read off the output tables themselves.
///
/// Each table is `<dir>/<table>.csv` with a [`PLAN_INDEX_COLUMN`]; the
/// checkpoint is the highest index found on the last good row of any table.
#[derive(Debug)]
pub struct IndexCheckpointStore {
    dir: PathBuf,
    tables: Vec<String>,
    /// Optional home for the graph completion marker
    state: Option<StateFile>,
    last_saved: HashMap<String, usize>,
}

impl IndexCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, tables: &[&str]) -> Self {
        Self {
            dir: dir.into(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
            state: None,
            last_saved: HashMap::new(),
        }
    }

    pub fn with_state_file(mut self, state: StateFile) -> Self {
        self.state = Some(state);
        self
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }
}

/// Bytes of the table end read by the first pass of [`last_plan_index`]
const TAIL_WINDOW: u64 = 8 * 1024;

/// `PLAN_INDEX` of the last complete, well-formed row of `path`.
///
/// Only the header line and the end of the file are read; the window grows
/// until a usable row or the header is reached. An unterminated last line is
/// an interrupted write and is ignored. Malformed rows are skipped with a
/// warning. 0 if the table is missing or holds no usable row.
pub fn last_plan_index(path: &Path) -> Result<usize, CheckpointError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_err(path)(e)),
    };

    let mut header = String::new();
    let header_len = match BufReader::new(&mut file).read_line(&mut header) {
        Ok(n) => n as u64,
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            log::warn!("{}: unreadable header ({e}), assuming no progress", path.display());
            return Ok(0);
        }
        Err(e) => return Err(io_err(path)(e)),
    };
    if !header.ends_with('\n') {
        return Ok(0);
    }
    let Some(header) = parse_line(header.trim_end_matches(['\r', '\n'])) else {
        log::warn!("{}: unreadable header, assuming no progress", path.display());
        return Ok(0);
    };
    let Some(column) = header.iter().position(|c| c == PLAN_INDEX_COLUMN) else {
        log::warn!(
            "{}: no {PLAN_INDEX_COLUMN} column, assuming no progress",
            path.display()
        );
        return Ok(0);
    };

    let len = file.metadata().map_err(io_err(path))?.len();
    let mut window = TAIL_WINDOW;
    // Lines from the end already checked by a smaller window
    let mut examined = 0;
    loop {
        let start = len.saturating_sub(window).max(header_len);
        let mut tail = Vec::new();
        file.seek(SeekFrom::Start(start)).map_err(io_err(path))?;
        (&mut file)
            .take(len - start)
            .read_to_end(&mut tail)
            .map_err(io_err(path))?;

        let text = String::from_utf8_lossy(&tail);
        let mut lines: Vec<&str> = text.split('\n').collect();
        // Whatever follows the last newline was cut short mid-write
        if let Some(torn) = lines.pop() {
            if examined == 0 && !torn.is_empty() {
                log::warn!("{}: ignoring interrupted last row", path.display());
            }
        }
        let reached_header = start == header_len;
        if !reached_header && !lines.is_empty() {
            // May begin mid-row
            lines.remove(0);
        }

        for line in lines.iter().rev().skip(examined) {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let index = parse_line(line)
                .filter(|record| record.len() == header.len())
                .and_then(|record| record.get(column).and_then(|v| v.trim().parse().ok()));
            match index {
                Some(index) => return Ok(index),
                None => log::warn!("{}: skipping malformed row {line:?}", path.display()),
            }
        }
        if reached_header {
            return Ok(0);
        }
        examined = lines.len();
        window *= 2;
    }
}

/// Values of `column` over the complete rows of `path`
pub fn recorded_values(path: &Path, column: &str) -> Result<Vec<String>, CheckpointError> {
    let bytes = read_complete_rows(path).map_err(io_err(path))?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let position = match reader.headers() {
        Ok(h) => h.iter().position(|c| c == column),
        Err(e) => {
            log::warn!("{}: unreadable header ({e})", path.display());
            return Ok(Vec::new());
        }
    };
    let Some(position) = position else {
        log::warn!("{}: no {column} column", path.display());
        return Ok(Vec::new());
    };

    let mut values = Vec::new();
    for record in reader.records() {
        match record {
            Ok(r) => values.extend(r.get(position).map(String::from)),
            Err(e) => log::warn!("{}: skipping malformed row ({e})", path.display()),
        }
    }
    Ok(values)
}

fn parse_line(line: &str) -> Option<csv::StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => Some(record),
        _ => None,
    }
}

impl CheckpointStore for IndexCheckpointStore {
    fn load(&self, source_id: &str) -> Result<Checkpoint, CheckpointError> {
        let mut completed = 0;
        for table in &self.tables {
            let index = last_plan_index(&self.table_path(table))?;
            log::debug!("{source_id}: {table} ends at index {index}");
            completed = completed.max(index);
        }
        Ok(Checkpoint::new(completed))
    }

    fn save(&mut self, source_id: &str, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let stored = self.last_saved.get(source_id).copied().unwrap_or(0);
        if checkpoint.completed < stored {
            return Err(CheckpointError::Regression {
                source_id: source_id.to_string(),
                stored,
                attempted: checkpoint.completed,
            });
        }
        self.last_saved
            .insert(source_id.to_string(), checkpoint.completed);
        Ok(())
    }

    fn load_graph_total(&self, source_id: &str) -> Result<Option<usize>, CheckpointError> {
        match &self.state {
            Some(state) => state.get(&graph_total_key(source_id)),
            None => Ok(None),
        }
    }

    fn save_graph_total(&mut self, source_id: &str, total: usize) -> Result<(), CheckpointError> {
        match &self.state {
            Some(state) => state.set(&graph_total_key(source_id), total),
            None => Ok(()),
        }
    }

    fn load_recorded(&self, source_id: &str, column: &str) -> Result<Vec<String>, CheckpointError> {
        let mut values = Vec::new();
        for table in &self.tables {
            values.extend(recorded_values(&self.table_path(table), column)?);
        }
        log::debug!("{source_id}: {} rows already recorded", values.len());
        Ok(values)
    }
}

/// Goal counter kept under `total_units_retrieved (<source>)` in a state file
#[derive(Debug, Clone)]
pub struct GoalCheckpointStore {
    state: StateFile,
}

impl GoalCheckpointStore {
    pub fn new(state: StateFile) -> Self {
        Self { state }
    }
}

impl CheckpointStore for GoalCheckpointStore {
    fn load(&self, source_id: &str) -> Result<Checkpoint, CheckpointError> {
        let completed = self.state.get(&goal_key(source_id))?.unwrap_or(0);
        Ok(Checkpoint::new(completed))
    }

    fn save(&mut self, source_id: &str, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let stored = self.load(source_id)?.completed;
        if checkpoint.completed < stored {
            return Err(CheckpointError::Regression {
                source_id: source_id.to_string(),
                stored,
                attempted: checkpoint.completed,
            });
        }
        self.state.set(&goal_key(source_id), checkpoint.completed)
    }
}

/// In-memory checkpoints for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: HashMap<String, Checkpoint>,
    graph_totals: HashMap<String, usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `source_id` at an existing checkpoint
    pub fn with(mut self, source_id: &str, completed: usize) -> Self {
        self.checkpoints
            .insert(source_id.to_string(), Checkpoint::new(completed));
        self
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, source_id: &str) -> Result<Checkpoint, CheckpointError> {
        Ok(self.checkpoints.get(source_id).copied().unwrap_or_default())
    }

    fn save(&mut self, source_id: &str, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let stored = self.load(source_id)?;
        if checkpoint < stored {
            return Err(CheckpointError::Regression {
                source_id: source_id.to_string(),
                stored: stored.completed,
                attempted: checkpoint.completed,
            });
        }
        self.checkpoints.insert(source_id.to_string(), checkpoint);
        Ok(())
    }

    fn load_graph_total(&self, source_id: &str) -> Result<Option<usize>, CheckpointError> {
        Ok(self.graph_totals.get(source_id).copied())
    }

    fn save_graph_total(&mut self, source_id: &str, total: usize) -> Result<(), CheckpointError> {
        self.graph_totals.insert(source_id.to_string(), total);
        Ok(())
    }
}
