//! Harvest orchestrator: the resumable control loop
//!
//! ```text
//! INIT -> RUNNING -> { COMPLETED | LIMIT | QUOTA (credentials depleted) | FATAL | CANCELLED }
//! ```
//!
//! The checkpoint advances by exactly one unit after each row lands in the
//! sink, and never past an item that did not succeed.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::credentials::CredentialRotator;
use crate::error::{FetchError, HarvestError};
use crate::plan::{Plan, WorkItem};
use crate::retry::Retrier;
use crate::shutdown::is_shutdown_requested;
use crate::sink::RowSink;
use crate::source::{FetchResult, GraphSource, SourceAdapter, graph_work_item};
use crate::traverse::{TraversalError, TraversalStats, VisitFlow, traverse};

/// When a plan run counts as complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every item of the plan
    PlanLength,
    /// A goal counter of recorded items, capped at the plan length
    Goal(usize),
}

/// Terminal state of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestStatus {
    /// Plan exhausted or goal reached during this run
    Completed,
    /// Nothing to do; no network call was made
    AlreadyComplete,
    /// Stopped cleanly at the per-run limit
    LimitReached,
    /// Quota hit and no credential left; needs a new key
    CredentialsDepleted { index: usize, identifier: String },
    /// Non-retryable failure of one item
    Fatal {
        index: usize,
        identifier: String,
        error: String,
    },
    /// Interrupted between items
    Cancelled,
}

impl HarvestStatus {
    /// Completed, already complete or stopped at the limit
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::AlreadyComplete | Self::LimitReached
        )
    }
}

impl fmt::Display for HarvestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::AlreadyComplete => f.write_str("already complete"),
            Self::LimitReached => f.write_str("limit reached"),
            Self::CredentialsDepleted { index, identifier } => write!(
                f,
                "credentials depleted at index {index} ({identifier})"
            ),
            Self::Fatal {
                index,
                identifier,
                error,
            } => write!(f, "failed at index {index} ({identifier}): {error}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome and counters of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source: String,
    pub status: HarvestStatus,
    /// Checkpoint when the run started
    pub start: Checkpoint,
    /// Checkpoint when the run ended
    pub end: Checkpoint,
    /// Units fetched and recorded in this run
    pub processed: usize,
    /// Credential rotations performed
    pub rotations: usize,
    pub traversal: Option<TraversalStats>,
    pub elapsed: Duration,
}

/// Ties a source adapter to its sink, checkpoint store, credentials and
/// retry policy.
pub struct Harvester<A, S, K> {
    adapter: A,
    sink: S,
    store: K,
    credentials: CredentialRotator,
    retrier: Retrier,
    limit: Option<usize>,
    progress: ProgressBar,
}

impl<A, S, K> Harvester<A, S, K>
where
    A: SourceAdapter,
    S: RowSink,
    K: CheckpointStore,
{
    pub fn new(adapter: A, sink: S, store: K, retrier: Retrier) -> Self {
        Self {
            adapter,
            sink,
            store,
            credentials: CredentialRotator::empty(),
            retrier,
            limit: None,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_credentials(mut self, credentials: CredentialRotator) -> Self {
        self.credentials = credentials;
        self
    }

    /// Cap the units processed by one invocation
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn credentials(&self) -> &CredentialRotator {
        &self.credentials
    }

    /// Harvest `plan` from its checkpoint up to `target`.
    pub fn run_plan(&mut self, plan: &Plan, target: Target) -> Result<RunReport, HarvestError> {
        let started = Instant::now();
        let source = self.adapter.source_id().to_string();
        let start = self.store.load(&source)?;

        let goal = match target {
            Target::PlanLength => plan.completed_index(),
            Target::Goal(n) if n > plan.len() => {
                log::warn!(
                    "{source}: goal {n} exceeds plan length {}, stopping at plan end",
                    plan.len()
                );
                plan.len()
            }
            Target::Goal(n) => n,
        };

        let mut report = RunReport {
            source: source.clone(),
            status: HarvestStatus::Completed,
            start,
            end: start,
            processed: 0,
            rotations: 0,
            traversal: None,
            elapsed: Duration::ZERO,
        };

        if start.completed >= goal {
            log::info!("{source}: already complete ({}/{goal})", start.completed);
            report.status = HarvestStatus::AlreadyComplete;
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        log::info!(
            "{source}: resuming at index {} of {goal}",
            start.next_index()
        );
        self.progress.set_length(goal as u64);
        self.progress.set_position(start.completed as u64);

        for item in plan.remaining(start.completed) {
            if item.index > goal {
                break;
            }
            if let Some(status) = self.stop_before_next(report.processed) {
                report.status = status;
                break;
            }
            if report.processed > 0 {
                self.retrier.pace();
            }

            let outcome = fetch_with_rotation(
                &self.adapter,
                &mut self.retrier,
                &mut self.credentials,
                item,
                &mut report.rotations,
            );
            match outcome {
                Ok(result) => {
                    record(&self.adapter, &mut self.sink, &mut self.store, &source, item, &result)?;
                    report.processed += 1;
                    report.end = Checkpoint::new(item.index);
                    self.progress.inc(1);
                    self.progress.set_message(item.identifier.clone());
                }
                Err(status) => {
                    report.status = status;
                    break;
                }
            }
        }

        self.progress.finish_and_clear();
        report.elapsed = started.elapsed();
        log_outcome(&report);
        Ok(report)
    }

    fn stop_before_next(&self, processed: usize) -> Option<HarvestStatus> {
        if is_shutdown_requested() {
            log::warn!("Shutdown requested, stopping before next item");
            return Some(HarvestStatus::Cancelled);
        }
        if self.limit.is_some_and(|limit| processed >= limit) {
            log::info!("Limit of {processed} reached");
            return Some(HarvestStatus::LimitReached);
        }
        None
    }
}

/// Why a graph visit stopped the traversal
enum GraphStop {
    Status(HarvestStatus),
    Error(HarvestError),
}

impl<A, S, K> Harvester<A, S, K>
where
    A: GraphSource,
    S: RowSink,
    K: CheckpointStore,
{
    /// Traverse the category graph under `root`, recording one row per
    /// distinct canonical node.
    ///
    /// Nodes whose canonical name already has a row are walked through
    /// (their children still listed) but not re-fetched. New rows continue
    /// the index sequence after the checkpoint. The completion marker is
    /// only written once a traversal ends with every listing intact.
    pub fn run_graph(
        &mut self,
        root: &str,
        canonicalize: impl Fn(&str) -> String,
    ) -> Result<RunReport, HarvestError> {
        let started = Instant::now();
        let source = self.adapter.source_id().to_string();
        let start = self.store.load(&source)?;
        let canonicalize = &canonicalize;

        let mut report = RunReport {
            source: source.clone(),
            status: HarvestStatus::Completed,
            start,
            end: start,
            processed: 0,
            rotations: 0,
            traversal: None,
            elapsed: Duration::ZERO,
        };

        if let Some(total) = self.store.load_graph_total(&source)? {
            if start.completed >= total {
                log::info!("{source}: already complete ({}/{total} nodes)", start.completed);
                report.status = HarvestStatus::AlreadyComplete;
                report.elapsed = started.elapsed();
                return Ok(report);
            }
        }
        let recorded: HashSet<String> = self
            .store
            .load_recorded(&source, self.adapter.path_column())?
            .iter()
            .map(|path| canonicalize(leaf_name(path)))
            .collect();
        log::info!(
            "{source}: traversing from {root}, {} nodes already recorded",
            recorded.len()
        );

        let limit = self.limit;
        let adapter = &self.adapter;
        let retrier = RefCell::new(&mut self.retrier);
        let sink = &mut self.sink;
        let store = &mut self.store;
        let credentials = &mut self.credentials;
        let progress = &self.progress;
        let mut processed = 0usize;
        let mut rotations = 0usize;
        let mut end = start;
        let mut stop_status = None;

        let traversal = traverse(
            root,
            canonicalize,
            |node| {
                let label = format!("{source}: children of {}", node.path);
                retrier.borrow_mut().call(&label, || adapter.children(node))
            },
            |node| -> Result<VisitFlow, GraphStop> {
                progress.inc(1);
                if recorded.contains(&canonicalize(&node.name)) {
                    log::debug!("Skipping recorded node: {}", node.path);
                    return Ok(VisitFlow::Continue);
                }
                if is_shutdown_requested() {
                    log::warn!("Shutdown requested, stopping before next node");
                    stop_status = Some(HarvestStatus::Cancelled);
                    return Ok(VisitFlow::Stop);
                }
                if limit.is_some_and(|limit| processed >= limit) {
                    log::info!("Limit of {processed} reached");
                    stop_status = Some(HarvestStatus::LimitReached);
                    return Ok(VisitFlow::Stop);
                }
                if processed > 0 {
                    retrier.borrow().pace();
                }

                let item = graph_work_item(node, start.completed + processed + 1);
                let result = fetch_with_rotation(
                    adapter,
                    &mut **retrier.borrow_mut(),
                    credentials,
                    &item,
                    &mut rotations,
                )
                .map_err(GraphStop::Status)?;
                record(adapter, sink, store, &source, &item, &result).map_err(GraphStop::Error)?;
                processed += 1;
                end = Checkpoint::new(item.index);
                progress.set_message(node.path.clone());
                Ok(VisitFlow::Continue)
            },
        );

        report.processed = processed;
        report.rotations = rotations;
        report.end = end;

        match traversal {
            Ok(stats) => {
                if let Some(status) = stop_status {
                    report.status = status;
                } else if stats.child_fetch_failures > 0 {
                    log::warn!(
                        "{source}: {} child listings failed, the next run walks the graph again",
                        stats.child_fetch_failures
                    );
                } else {
                    self.store.save_graph_total(&source, stats.visited)?;
                }
                report.traversal = Some(stats);
            }
            Err(TraversalError::Visit { error, .. }) => match error {
                GraphStop::Status(status) => report.status = status,
                GraphStop::Error(e) => return Err(e),
            },
        }

        self.progress.finish_and_clear();
        report.elapsed = started.elapsed();
        log_outcome(&report);
        Ok(report)
    }
}

/// Last component of a slash-joined alias path
fn leaf_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, leaf)| leaf)
}

/// Run one item through the retrier, rotating credentials on quota errors
/// and retrying the same item with the next credential.
fn fetch_with_rotation<A: SourceAdapter>(
    adapter: &A,
    retrier: &mut Retrier,
    credentials: &mut CredentialRotator,
    item: &WorkItem,
    rotations: &mut usize,
) -> Result<FetchResult, HarvestStatus> {
    let label = format!("{} #{}", adapter.source_id(), item.index);
    loop {
        let credential = credentials.current().cloned();
        if adapter.requires_credential() && credential.is_none() {
            log::error!("No credential left for {item}");
            return Err(depleted(item));
        }

        match retrier.call(&label, || adapter.fetch(item, credential.as_ref())) {
            Ok(result) => return Ok(result),
            Err(e) if e.is_quota() => {
                log::warn!("{item}: {e}");
                if !credentials.rotate() {
                    log::error!("Credentials depleted at {item}");
                    return Err(depleted(item));
                }
                *rotations += 1;
            }
            Err(e) => {
                log::error!("{item}: {e}");
                return Err(fatal(item, &e));
            }
        }
    }
}

fn depleted(item: &WorkItem) -> HarvestStatus {
    HarvestStatus::CredentialsDepleted {
        index: item.index,
        identifier: item.identifier.clone(),
    }
}

fn fatal(item: &WorkItem, error: &FetchError) -> HarvestStatus {
    HarvestStatus::Fatal {
        index: item.index,
        identifier: item.identifier.clone(),
        error: error.to_string(),
    }
}

/// Write the row, then advance the checkpoint to the item's index
fn record<A: SourceAdapter, S: RowSink, K: CheckpointStore>(
    adapter: &A,
    sink: &mut S,
    store: &mut K,
    source: &str,
    item: &WorkItem,
    result: &FetchResult,
) -> Result<(), HarvestError> {
    let (table, row) = adapter.record(item, result);
    sink.append_row(table, &row)?;
    store.save(source, Checkpoint::new(item.index))?;
    log::info!("{item}: {}", result.count);
    Ok(())
}

fn log_outcome(report: &RunReport) {
    let summary = format!(
        "{}: {} ({} processed, checkpoint {} -> {}, {:.1}s)",
        report.source,
        report.status,
        report.processed,
        report.start.completed,
        report.end.completed,
        report.elapsed.as_secs_f64()
    );
    if report.status.is_success() || report.status == HarvestStatus::Cancelled {
        log::info!("{summary}");
    } else {
        log::error!("{summary}");
    }
}
