//! Plan model: an ordered, stably indexed enumeration of queries
//!
//! Resume position is nothing but a plan index, so the order produced here
//! must never depend on anything except the inputs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tool::{LegalTool, prioritize};

/// `extra` key holding the tool URL for tool-based plans
pub const TOOL_URL_KEY: &str = "tool_url";

/// Plan artifact header; row position (1-based, excluding header) is the index
pub const PLAN_HEADER: [&str; 6] = ["TOOL_URL", "TOOL_IDENTIFIER", "COUNTRY", "CR", "LANGUAGE", "LR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionKind {
    None,
    Country,
    Language,
}

/// One entry of a country/language collection: display label plus API code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionValue {
    pub label: String,
    pub code: String,
}

impl DimensionValue {
    pub fn new(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    None,
    Country(DimensionValue),
    Language(DimensionValue),
}

impl Dimension {
    pub fn kind(&self) -> DimensionKind {
        match self {
            Self::None => DimensionKind::None,
            Self::Country(_) => DimensionKind::Country,
            Self::Language(_) => DimensionKind::Language,
        }
    }

    pub fn value(&self) -> Option<&DimensionValue> {
        match self {
            Self::None => None,
            Self::Country(v) | Self::Language(v) => Some(v),
        }
    }
}

/// Which tools a dimension is crossed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolScope {
    All,
    /// 4.0 licenses, CC0 and PDM
    Primary,
}

impl ToolScope {
    fn includes(self, tool: &LegalTool) -> bool {
        match self {
            Self::All => true,
            Self::Primary => tool.is_primary(),
        }
    }
}

/// A cross-product dimension for [`build_plan`]
#[derive(Debug, Clone)]
pub struct DimensionSpec {
    pub kind: DimensionKind,
    pub values: Vec<DimensionValue>,
    pub scope: ToolScope,
}

impl DimensionSpec {
    pub fn countries(values: Vec<DimensionValue>, scope: ToolScope) -> Self {
        Self {
            kind: DimensionKind::Country,
            values,
            scope,
        }
    }

    pub fn languages(values: Vec<DimensionValue>, scope: ToolScope) -> Self {
        Self {
            kind: DimensionKind::Language,
            values,
            scope,
        }
    }

    fn dimension(&self, value: &DimensionValue) -> Dimension {
        match self.kind {
            DimensionKind::None => Dimension::None,
            DimensionKind::Country => Dimension::Country(value.clone()),
            DimensionKind::Language => Dimension::Language(value.clone()),
        }
    }
}

/// One addressable query of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 1-based position in the plan
    pub index: usize,
    /// Tool or category being measured
    pub identifier: String,
    pub dimension: Dimension,
    /// Adapter-specific parameters (tool URL, time window, ...)
    pub extra: BTreeMap<String, String>,
}

impl WorkItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            index: 0,
            identifier: identifier.into(),
            dimension: Dimension::None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index: {}, tool: {}", self.index, self.identifier)?;
        match &self.dimension {
            Dimension::None => Ok(()),
            Dimension::Country(v) => write!(f, ", country: {}", v.label),
            Dimension::Language(v) => write!(f, ", language: {}", v.label),
        }
    }
}

/// Ordered work items; `len()` is the completed index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    items: Vec<WorkItem>,
}

impl Plan {
    /// Take items in the given order, assigning indices `1..=n`
    pub fn new(items: Vec<WorkItem>) -> Self {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(i, mut item)| {
                item.index = i + 1;
                item
            })
            .collect();
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index at which the plan counts as fully harvested
    pub fn completed_index(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Item at a 1-based index
    pub fn get(&self, index: usize) -> Option<&WorkItem> {
        index.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// Items after `position` completed ones
    pub fn remaining(&self, position: usize) -> &[WorkItem] {
        &self.items[position.min(self.items.len())..]
    }

    /// Write the plan artifact CSV
    pub fn write_csv(&self, path: &Path) -> csv::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(path)?;
        writer.write_record(PLAN_HEADER)?;
        for item in &self.items {
            writer.serialize(PlanRow::from(item))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a plan artifact CSV; only `TOOL_URL` and `TOOL_IDENTIFIER` are required
    pub fn read_csv(path: &Path) -> csv::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let items = reader
            .deserialize::<PlanRow>()
            .map(|row| row.map(WorkItem::from))
            .collect::<csv::Result<Vec<_>>>()?;
        Ok(Self::new(items))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PlanRow {
    #[serde(rename = "TOOL_URL")]
    tool_url: String,
    #[serde(rename = "TOOL_IDENTIFIER")]
    tool_identifier: String,
    #[serde(rename = "COUNTRY", default)]
    country: Option<String>,
    #[serde(rename = "CR", default)]
    cr: Option<String>,
    #[serde(rename = "LANGUAGE", default)]
    language: Option<String>,
    #[serde(rename = "LR", default)]
    lr: Option<String>,
}

impl From<&WorkItem> for PlanRow {
    fn from(item: &WorkItem) -> Self {
        let (country, cr, language, lr) = match &item.dimension {
            Dimension::None => (None, None, None, None),
            Dimension::Country(v) => (Some(v.label.clone()), Some(v.code.clone()), None, None),
            Dimension::Language(v) => (None, None, Some(v.label.clone()), Some(v.code.clone())),
        };
        Self {
            tool_url: item.extra(TOOL_URL_KEY).unwrap_or_default().to_string(),
            tool_identifier: item.identifier.clone(),
            country,
            cr,
            language,
            lr,
        }
    }
}

impl From<PlanRow> for WorkItem {
    fn from(row: PlanRow) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
        let dimension = match (non_empty(row.country), non_empty(row.language)) {
            (Some(country), _) => Dimension::Country(DimensionValue {
                label: country,
                code: row.cr.unwrap_or_default(),
            }),
            (None, Some(language)) => Dimension::Language(DimensionValue {
                label: language,
                code: row.lr.unwrap_or_default(),
            }),
            (None, None) => Dimension::None,
        };
        WorkItem::new(row.tool_identifier)
            .with_dimension(dimension)
            .with_extra(TOOL_URL_KEY, row.tool_url)
    }
}

/// Build a plan from raw tool URLs and cross-product dimensions.
///
/// Order: every tool without a dimension, then each dimension in the order
/// given. Within a group tools follow [`prioritize`] order and dimension
/// values follow their collection order.
pub fn build_plan(tool_urls: &[String], dimensions: &[DimensionSpec]) -> Plan {
    let tools = prioritize(tool_urls);
    let tool_item = |tool: &LegalTool| {
        WorkItem::new(tool.identifier.clone()).with_extra(TOOL_URL_KEY, tool.url.clone())
    };

    let mut items: Vec<WorkItem> = tools.iter().map(tool_item).collect();

    for spec in dimensions {
        if spec.kind == DimensionKind::None {
            continue;
        }
        for tool in tools.iter().filter(|t| spec.scope.includes(t)) {
            for value in &spec.values {
                items.push(tool_item(tool).with_dimension(spec.dimension(value)));
            }
        }
    }

    Plan::new(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::TOOL_URL_PREFIX;
    use tempfile::TempDir;

    fn urls(paths: &[&str]) -> Vec<String> {
        paths
            .iter()
            .map(|p| format!("{TOOL_URL_PREFIX}{p}"))
            .collect()
    }

    fn sample_tools() -> Vec<String> {
        urls(&[
            "licenses/by/3.0/",
            "licenses/by/4.0/",
            "publicdomain/zero/1.0/",
            "licenses/by-sa/4.0/",
            "licenses/by/2.5/ar/",
        ])
    }

    fn sample_dimensions() -> Vec<DimensionSpec> {
        vec![
            DimensionSpec::languages(
                vec![
                    DimensionValue::new("Japanese", "lang_ja"),
                    DimensionValue::new("German", "lang_de"),
                ],
                ToolScope::Primary,
            ),
            DimensionSpec::countries(
                vec![DimensionValue::new("Brazil", "countryBR")],
                ToolScope::Primary,
            ),
        ]
    }

    #[test]
    fn indices_are_one_based_and_contiguous() {
        let plan = build_plan(&sample_tools(), &sample_dimensions());
        for (i, item) in plan.items().iter().enumerate() {
            assert_eq!(item.index, i + 1);
        }
        assert_eq!(plan.completed_index(), plan.len());
    }

    #[test]
    fn groups_in_documented_order() {
        let plan = build_plan(&sample_tools(), &sample_dimensions());
        // 5 tools, then 3 primary tools x 2 languages, then 3 x 1 country
        assert_eq!(plan.len(), 5 + 6 + 3);
        assert!(plan.items()[..5]
            .iter()
            .all(|i| i.dimension.kind() == DimensionKind::None));
        assert!(plan.items()[5..11]
            .iter()
            .all(|i| i.dimension.kind() == DimensionKind::Language));
        assert!(plan.items()[11..]
            .iter()
            .all(|i| i.dimension.kind() == DimensionKind::Country));
    }

    #[test]
    fn tools_follow_priority_then_values_follow_collection() {
        let plan = build_plan(&sample_tools(), &sample_dimensions());
        let ids: Vec<&str> = plan.items()[..5]
            .iter()
            .map(|i| i.identifier.as_str())
            .collect();
        assert_eq!(
            ids,
            ["CC BY 4.0", "CC BY-SA 4.0", "CC0 1.0", "CC BY 3.0", "CC BY 2.5 AR"]
        );

        let first_lang = &plan.items()[5];
        let second_lang = &plan.items()[6];
        assert_eq!(first_lang.identifier, "CC BY 4.0");
        assert_eq!(first_lang.dimension.value().unwrap().code, "lang_ja");
        assert_eq!(second_lang.identifier, "CC BY 4.0");
        assert_eq!(second_lang.dimension.value().unwrap().code, "lang_de");
    }

    #[test]
    fn build_plan_is_deterministic() {
        let a = build_plan(&sample_tools(), &sample_dimensions());
        let b = build_plan(&sample_tools(), &sample_dimensions());
        assert_eq!(a, b);

        let dir = TempDir::new().unwrap();
        let pa = dir.path().join("a.csv");
        let pb = dir.path().join("b.csv");
        a.write_csv(&pa).unwrap();
        b.write_csv(&pb).unwrap();
        assert_eq!(std::fs::read(&pa).unwrap(), std::fs::read(&pb).unwrap());
    }

    #[test]
    fn input_order_does_not_change_plan() {
        let mut shuffled = sample_tools();
        shuffled.reverse();
        assert_eq!(
            build_plan(&sample_tools(), &sample_dimensions()),
            build_plan(&shuffled, &sample_dimensions())
        );
    }

    #[test]
    fn unclassifiable_tools_sort_last() {
        let mut tools = sample_tools();
        tools.insert(0, "garbage".to_string());
        let plan = build_plan(&tools, &[]);
        assert_eq!(plan.items().last().unwrap().identifier, "GARBAGE");
    }

    #[test]
    fn csv_artifact_preserves_plan() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.csv");
        let plan = build_plan(&sample_tools(), &sample_dimensions());
        plan.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("TOOL_URL,TOOL_IDENTIFIER,COUNTRY,CR,LANGUAGE,LR\n"));

        let loaded = Plan::read_csv(&path).unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn read_csv_accepts_minimal_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.csv");
        std::fs::write(
            &path,
            "TOOL_URL,TOOL_IDENTIFIER\n//creativecommons.org/publicdomain/zero/1.0/,CC0 1.0\n",
        )
        .unwrap();
        let plan = Plan::read_csv(&path).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.get(1).unwrap().identifier, "CC0 1.0");
        assert_eq!(plan.get(1).unwrap().dimension, Dimension::None);
        assert!(plan.get(0).is_none());
    }

    #[test]
    fn remaining_skips_completed() {
        let plan = Plan::new(vec![
            WorkItem::new("CC0"),
            WorkItem::new("CC-BY"),
            WorkItem::new("CC-BY-SA"),
        ]);
        assert_eq!(plan.remaining(1)[0].index, 2);
        assert!(plan.remaining(3).is_empty());
        assert!(plan.remaining(10).is_empty());
    }

    #[test]
    fn work_item_display() {
        let item = WorkItem {
            index: 7,
            ..WorkItem::new("CC BY 4.0")
                .with_dimension(Dimension::Country(DimensionValue::new("Japan", "countryJP")))
        };
        assert_eq!(item.to_string(), "index: 7, tool: CC BY 4.0, country: Japan");
    }
}
