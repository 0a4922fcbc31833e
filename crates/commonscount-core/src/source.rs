//! Source adapter seam: one implementation per data source

use std::collections::BTreeMap;

use rand::Rng;

use crate::credentials::Credential;
use crate::error::FetchError;
use crate::plan::WorkItem;
use crate::sink::Row;
use crate::traverse::CategoryNode;

/// `extra` key carrying the full alias path of a graph node
pub const CATEGORY_PATH_KEY: &str = "category_path";

/// Output column holding a graph node's alias path
pub const CATEGORY_PATH_COLUMN: &str = "CATEGORY_PATH";

/// Range [`DevAdapter`] draws fabricated counts from
pub const DEV_COUNT_RANGE: std::ops::RangeInclusive<u64> = 666_000..=666_999;

/// Normalized result of one adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub identifier: String,
    pub count: u64,
    /// Secondary measures some sources report (e.g. page counts)
    pub details: BTreeMap<String, u64>,
}

impl FetchResult {
    pub fn new(identifier: impl Into<String>, count: u64) -> Self {
        Self {
            identifier: identifier.into(),
            count,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: u64) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    pub fn detail(&self, key: &str) -> Option<u64> {
        self.details.get(key).copied()
    }
}

/// Turns a [`WorkItem`] into one API call and a normalized count.
///
/// Implementations classify failures at this boundary, including any
/// source-specific "daily quota" heuristics.
pub trait SourceAdapter {
    /// Stable id used for checkpoints, e.g. `gcs`
    fn source_id(&self) -> &str;

    /// Output tables this source writes, without extension
    fn tables(&self) -> &'static [&'static str];

    /// Whether `fetch` needs an API credential
    fn requires_credential(&self) -> bool {
        false
    }

    fn fetch(
        &self,
        item: &WorkItem,
        credential: Option<&Credential>,
    ) -> Result<FetchResult, FetchError>;

    /// Map a successful fetch to its output table and row
    fn record(&self, item: &WorkItem, result: &FetchResult) -> (&'static str, Row);
}

/// A hierarchical source whose work items are discovered by traversal
pub trait GraphSource: SourceAdapter {
    fn children(&self, node: &CategoryNode) -> Result<Vec<String>, FetchError>;

    /// Column of the recorded rows that holds the node's alias path
    fn path_column(&self) -> &'static str {
        CATEGORY_PATH_COLUMN
    }
}

impl<T: SourceAdapter + ?Sized> SourceAdapter for Box<T> {
    fn source_id(&self) -> &str {
        (**self).source_id()
    }

    fn tables(&self) -> &'static [&'static str] {
        (**self).tables()
    }

    fn requires_credential(&self) -> bool {
        (**self).requires_credential()
    }

    fn fetch(
        &self,
        item: &WorkItem,
        credential: Option<&Credential>,
    ) -> Result<FetchResult, FetchError> {
        (**self).fetch(item, credential)
    }

    fn record(&self, item: &WorkItem, result: &FetchResult) -> (&'static str, Row) {
        (**self).record(item, result)
    }
}

impl<T: GraphSource + ?Sized> GraphSource for Box<T> {
    fn children(&self, node: &CategoryNode) -> Result<Vec<String>, FetchError> {
        (**self).children(node)
    }

    fn path_column(&self) -> &'static str {
        (**self).path_column()
    }
}

/// Work item for a graph node about to be recorded as row `index`
pub fn graph_work_item(node: &CategoryNode, index: usize) -> WorkItem {
    WorkItem {
        index,
        ..WorkItem::new(node.name.clone()).with_extra(CATEGORY_PATH_KEY, node.path.clone())
    }
}

/// Fabricates counts instead of calling the network (`--dev`).
///
/// Keeps the wrapped adapter's id, tables and row layout so output files
/// look like the real thing. Graph sources yield only the root.
#[derive(Debug, Clone)]
pub struct DevAdapter<A> {
    inner: A,
}

impl<A> DevAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

impl<A: SourceAdapter> SourceAdapter for DevAdapter<A> {
    fn source_id(&self) -> &str {
        self.inner.source_id()
    }

    fn tables(&self) -> &'static [&'static str] {
        self.inner.tables()
    }

    fn fetch(&self, item: &WorkItem, _: Option<&Credential>) -> Result<FetchResult, FetchError> {
        let mut rng = rand::rng();
        Ok(FetchResult::new(item.identifier.clone(), rng.random_range(DEV_COUNT_RANGE))
            .with_detail("pages", rng.random_range(DEV_COUNT_RANGE)))
    }

    fn record(&self, item: &WorkItem, result: &FetchResult) -> (&'static str, Row) {
        self.inner.record(item, result)
    }
}

impl<A: GraphSource> GraphSource for DevAdapter<A> {
    fn children(&self, _: &CategoryNode) -> Result<Vec<String>, FetchError> {
        Ok(Vec::new())
    }

    fn path_column(&self) -> &'static str {
        self.inner.path_column()
    }
}
