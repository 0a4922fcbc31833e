//! MediaWiki action API adapter for WikiCommons categories

use commonscount_core::source::{CATEGORY_PATH_COLUMN, CATEGORY_PATH_KEY};
use commonscount_core::{
    CategoryNode, Credential, FetchError, FetchResult, GraphSource, PLAN_INDEX_COLUMN, Row,
    SourceAdapter, WorkItem, get_json,
};
use serde_json::Value;

use crate::config::Config;

pub const SOURCE_ID: &str = "wikicommons";
pub const COUNT_TABLE: &str = "wikicommons_1_count";

const TABLES: [&str; 1] = [COUNT_TABLE];

const CATEGORY_PREFIX: &str = "Category:";
/// Largest `cmlimit` anonymous clients may request
const MEMBER_PAGE_SIZE: &str = "500";
/// `FetchResult` detail holding the page count
pub const PAGES_DETAIL: &str = "pages";

/// API error codes that mean "slow down" rather than "bad request"
const TRANSIENT_API_ERRORS: [&str; 3] = ["ratelimited", "maxlag", "readonly"];

#[derive(Debug, Clone)]
pub struct WikiCommonsAdapter {
    api_url: String,
}

impl WikiCommonsAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            api_url: config.api_url.clone(),
        }
    }

    fn query(&self, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let body = get_json(&self.api_url, params).map_err(|f| f.classify())?;
        check_api_error(&body)?;
        Ok(body)
    }
}

impl SourceAdapter for WikiCommonsAdapter {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn tables(&self) -> &'static [&'static str] {
        &TABLES
    }

    fn fetch(&self, item: &WorkItem, _: Option<&Credential>) -> Result<FetchResult, FetchError> {
        let body = self.query(&[
            ("action", "query".to_string()),
            ("prop", "categoryinfo".to_string()),
            ("titles", category_title(&item.identifier)),
            ("format", "json".to_string()),
        ])?;
        let (files, pages) = category_info(&body)?;
        Ok(FetchResult::new(item.identifier.clone(), files).with_detail(PAGES_DETAIL, pages))
    }

    fn record(&self, item: &WorkItem, result: &FetchResult) -> (&'static str, Row) {
        let path = item.extra(CATEGORY_PATH_KEY).unwrap_or(&item.identifier);
        (
            COUNT_TABLE,
            Row::new()
                .with(PLAN_INDEX_COLUMN, item.index)
                .with(CATEGORY_PATH_COLUMN, path)
                .with("FILE_COUNT", result.count)
                .with("PAGE_COUNT", result.detail(PAGES_DETAIL).unwrap_or(0)),
        )
    }
}

impl GraphSource for WikiCommonsAdapter {
    /// Subcategories of `node`, following `cmcontinue` until exhausted
    fn children(&self, node: &CategoryNode) -> Result<Vec<String>, FetchError> {
        let mut children = Vec::new();
        let mut cont: Option<String> = None;
        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", category_title(&node.name)),
                ("cmtype", "subcat".to_string()),
                ("cmlimit", MEMBER_PAGE_SIZE.to_string()),
                ("format", "json".to_string()),
            ];
            if let Some(token) = cont.take() {
                params.push(("cmcontinue", token));
            }
            let body = self.query(&params)?;
            let (page, next) = subcategories(&body)?;
            children.extend(page);
            match next {
                Some(token) => cont = Some(token),
                None => break,
            }
        }
        log::debug!("{}: {} subcategories", node.path, children.len());
        Ok(children)
    }
}

/// MediaWiki title normalization: underscores are spaces, runs of
/// whitespace collapse, the namespace prefix is dropped and the first
/// letter is upper case.
pub fn canonicalize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let bare = collapsed
        .strip_prefix(CATEGORY_PREFIX)
        .map(str::trim_start)
        .unwrap_or(&collapsed);
    let mut chars = bare.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn category_title(name: &str) -> String {
    let bare = name.strip_prefix(CATEGORY_PREFIX).unwrap_or(name);
    format!("{CATEGORY_PREFIX}{bare}")
}

/// MediaWiki reports API-level errors in a 200 response
fn check_api_error(body: &Value) -> Result<(), FetchError> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_str).unwrap_or("unknown");
    let info = error.get("info").and_then(Value::as_str).unwrap_or_default();
    if TRANSIENT_API_ERRORS.contains(&code) {
        Err(FetchError::Transient {
            status: None,
            message: format!("{code}: {info}"),
        })
    } else {
        Err(FetchError::malformed(format!("API error {code}: {info}")))
    }
}

/// Sum of `files` and `pages` over the returned pages.
///
/// A category without members carries no `categoryinfo`; it counts as 0.
pub fn category_info(body: &Value) -> Result<(u64, u64), FetchError> {
    let pages = body
        .get("query")
        .and_then(|q| q.get("pages"))
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::malformed("missing query.pages"))?;

    let mut files = 0;
    let mut page_count = 0;
    for page in pages.values() {
        let Some(info) = page.get("categoryinfo") else {
            continue;
        };
        files += info.get("files").and_then(Value::as_u64).unwrap_or(0);
        page_count += info.get("pages").and_then(Value::as_u64).unwrap_or(0);
    }
    Ok((files, page_count))
}

/// One page of subcategory names plus the continuation token, if any
pub fn subcategories(body: &Value) -> Result<(Vec<String>, Option<String>), FetchError> {
    let members = body
        .get("query")
        .and_then(|q| q.get("categorymembers"))
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::malformed("missing query.categorymembers"))?;

    let names = members
        .iter()
        .filter_map(|m| m.get("title").and_then(Value::as_str))
        .map(|title| title.strip_prefix(CATEGORY_PREFIX).unwrap_or(title).to_string())
        .collect();
    let next = body
        .get("continue")
        .and_then(|c| c.get("cmcontinue"))
        .and_then(Value::as_str)
        .map(String::from);
    Ok((names, next))
}
