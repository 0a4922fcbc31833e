//! Bottom-up totals over the recorded category tree
//!
//! Every distinct category is recorded once, under the alias path by which
//! the traversal first reached it, so the path prefixes form a tree. A
//! category's total is its own count plus the counts of every row below its
//! path. A category reachable by several parents or through a cycle is
//! counted once, under its first parent.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use commonscount_core::sink::read_complete_rows;
use commonscount_core::source::CATEGORY_PATH_COLUMN;

use crate::adapter::COUNT_TABLE;

pub const TOTALS_TABLE: &str = "wikicommons_2_totals";

const HEADER: [&str; 4] = [
    CATEGORY_PATH_COLUMN,
    "SUBCATEGORIES",
    "TOTAL_FILE_COUNT",
    "TOTAL_PAGE_COUNT",
];

/// Own counts of one recorded category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCounts {
    pub path: String,
    pub files: u64,
    pub pages: u64,
}

impl CategoryCounts {
    pub fn new(path: impl Into<String>, files: u64, pages: u64) -> Self {
        Self {
            path: path.into(),
            files,
            pages,
        }
    }
}

/// Counts of a category and everything recorded below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeTotal {
    pub path: String,
    /// Distinct categories below this one
    pub subcategories: usize,
    pub files: u64,
    pub pages: u64,
}

/// Roll each row's counts up into every recorded ancestor path.
///
/// Output follows input order; a repeated path keeps its first row.
pub fn subtree_totals(rows: &[CategoryCounts]) -> Vec<SubtreeTotal> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<SubtreeTotal> = Vec::new();
    let mut own: Vec<&CategoryCounts> = Vec::new();
    for row in rows {
        if position.contains_key(row.path.as_str()) {
            log::debug!("Duplicate row for {}, keeping the first", row.path);
            continue;
        }
        position.insert(row.path.as_str(), totals.len());
        totals.push(SubtreeTotal {
            path: row.path.clone(),
            subcategories: 0,
            files: 0,
            pages: 0,
        });
        own.push(row);
    }

    for row in own {
        let ancestors = row
            .path
            .match_indices('/')
            .map(|(i, _)| &row.path[..i])
            .filter_map(|prefix| position.get(prefix).copied());
        for i in ancestors {
            totals[i].subcategories += 1;
            totals[i].files += row.files;
            totals[i].pages += row.pages;
        }
        let i = position[row.path.as_str()];
        totals[i].files += row.files;
        totals[i].pages += row.pages;
    }
    totals
}

/// Own counts from the count table; complete rows only
pub fn read_counts(path: &Path) -> anyhow::Result<Vec<CategoryCounts>> {
    let bytes = read_complete_rows(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|c| c == name)
            .with_context(|| format!("{}: no {name} column", path.display()))
    };
    let (path_col, files_col, pages_col) = (
        column(CATEGORY_PATH_COLUMN)?,
        column("FILE_COUNT")?,
        column("PAGE_COUNT")?,
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                log::warn!("{}: skipping malformed row ({e})", path.display());
                continue;
            }
        };
        let count = |i: usize| record.get(i).and_then(|v| v.trim().parse::<u64>().ok());
        match (record.get(path_col), count(files_col), count(pages_col)) {
            (Some(p), Some(files), Some(pages)) => rows.push(CategoryCounts::new(p, files, pages)),
            _ => log::warn!("{}: skipping malformed row {record:?}", path.display()),
        }
    }
    Ok(rows)
}

/// Rebuild the totals table from the count table in `dir`.
///
/// The table is written to a `.tmp` file and renamed into place.
pub fn write_totals(dir: &Path) -> anyhow::Result<PathBuf> {
    let rows = read_counts(&dir.join(format!("{COUNT_TABLE}.csv")))?;
    let totals = subtree_totals(&rows);

    let path = dir.join(format!("{TOTALS_TABLE}.csv"));
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        writer.write_record(HEADER)?;
        for total in &totals {
            writer.write_record([
                total.path.clone(),
                total.subcategories.to_string(),
                total.files.to_string(),
                total.pages.to_string(),
            ])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, &path).with_context(|| format!("renaming {}", tmp.display()))?;
    log::info!("{}: {} categories", path.display(), totals.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonscount_core::{CategoryNode, VisitFlow, traverse};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn total(totals: &[SubtreeTotal], path: &str) -> (usize, u64) {
        let t = totals.iter().find(|t| t.path == path).unwrap();
        (t.subcategories, t.files)
    }

    #[test]
    fn diamond_and_cycle_count_each_category_once() {
        // A -> B -> D, A -> C -> D, B -> A
        let edges: HashMap<&str, Vec<&str>> = HashMap::from([
            ("A", vec!["B", "C"]),
            ("B", vec!["D", "A"]),
            ("C", vec!["D"]),
        ]);
        let files: HashMap<&str, u64> = HashMap::from([("A", 1), ("B", 10), ("C", 100), ("D", 1000)]);

        let mut rows = Vec::new();
        traverse(
            "A",
            |s: &str| s.to_string(),
            |n: &CategoryNode| {
                Ok::<_, String>(
                    edges
                        .get(n.name.as_str())
                        .map(|c| c.iter().map(|s| s.to_string()).collect())
                        .unwrap_or_default(),
                )
            },
            |n| {
                rows.push(CategoryCounts::new(n.path.clone(), files[n.name.as_str()], 0));
                Ok::<_, String>(VisitFlow::Continue)
            },
        )
        .unwrap();

        let totals = subtree_totals(&rows);
        assert_eq!(totals.len(), 4);
        assert_eq!(total(&totals, "A"), (3, 1111));
        assert_eq!(total(&totals, "A/B"), (1, 1010));
        assert_eq!(total(&totals, "A/B/D"), (0, 1000));
        assert_eq!(total(&totals, "A/C"), (0, 100));
    }

    #[test]
    fn pages_roll_up_and_duplicates_are_ignored() {
        let rows = [
            CategoryCounts::new("Root", 1, 2),
            CategoryCounts::new("Root/CC-BY", 3, 4),
            CategoryCounts::new("Root/CC-BY", 99, 99),
        ];
        let totals = subtree_totals(&rows);
        assert_eq!(
            totals[0],
            SubtreeTotal {
                path: "Root".into(),
                subcategories: 1,
                files: 4,
                pages: 6
            }
        );
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn totals_table_from_count_table() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(format!("{COUNT_TABLE}.csv")),
            "PLAN_INDEX,CATEGORY_PATH,FILE_COUNT,PAGE_COUNT\n\
             1,Root,5,1\n2,Root/CC0,7,2\n3,Root/CC0/PD,11,0\n4,Root/CC-BY,x,0\n5,Root/Tor",
        )
        .unwrap();

        let path = write_totals(dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "CATEGORY_PATH,SUBCATEGORIES,TOTAL_FILE_COUNT,TOTAL_PAGE_COUNT\n\
             Root,2,23,3\nRoot/CC0,1,18,2\nRoot/CC0/PD,0,11,0\n"
        );
        assert!(!dir.path().join(format!("{TOTALS_TABLE}.csv.tmp")).exists());
    }
}
