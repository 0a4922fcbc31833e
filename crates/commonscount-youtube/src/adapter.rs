//! YouTube Data API search adapter

use commonscount_core::{
    Credential, FetchError, FetchResult, HttpFailure, PLAN_INDEX_COLUMN, Row, SourceAdapter,
    WorkItem, get_json,
};
use serde_json::Value;

use crate::config::Config;
use crate::intervals::{INTERVAL_KEY, PUBLISHED_AFTER_KEY, PUBLISHED_BEFORE_KEY};

pub const SOURCE_ID: &str = "youtube";
pub const COUNT_TABLE: &str = "youtube_1_count";

const TABLES: [&str; 1] = [COUNT_TABLE];

/// 403 reasons that mean the key's daily units are spent
const QUOTA_REASONS: [&str; 2] = ["quotaExceeded", "dailyLimitExceeded"];

#[derive(Debug, Clone)]
pub struct YouTubeAdapter {
    api_url: String,
}

impl YouTubeAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            api_url: config.api_url.clone(),
        }
    }

    pub fn query_params(item: &WorkItem, key: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("type", "video".to_string()),
            ("videoLicense", "creativeCommon".to_string()),
        ];
        if let Some(after) = item.extra(PUBLISHED_AFTER_KEY) {
            params.push(("publishedAfter", after.to_string()));
        }
        if let Some(before) = item.extra(PUBLISHED_BEFORE_KEY) {
            params.push(("publishedBefore", before.to_string()));
        }
        params.push(("key", key.to_string()));
        params
    }
}

impl SourceAdapter for YouTubeAdapter {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn tables(&self) -> &'static [&'static str] {
        &TABLES
    }

    fn requires_credential(&self) -> bool {
        true
    }

    fn fetch(
        &self,
        item: &WorkItem,
        credential: Option<&Credential>,
    ) -> Result<FetchResult, FetchError> {
        let key = credential.map(Credential::expose).unwrap_or_default();
        let body = get_json(&self.api_url, &Self::query_params(item, key)).map_err(classify)?;
        Ok(FetchResult::new(item.identifier.clone(), total_results(&body)?))
    }

    fn record(&self, item: &WorkItem, result: &FetchResult) -> (&'static str, Row) {
        (
            COUNT_TABLE,
            Row::new()
                .with(PLAN_INDEX_COLUMN, item.index)
                .with("LICENSE_TYPE", &item.identifier)
                .with("INTERVAL", item.extra(INTERVAL_KEY).unwrap_or_default())
                .with("COUNT", result.count),
        )
    }
}

pub fn classify(failure: HttpFailure) -> FetchError {
    if let HttpFailure::Status { status: 403, body } = &failure {
        if let Some(reason) = QUOTA_REASONS.iter().find(|r| body.contains(*r)) {
            return FetchError::quota(*reason);
        }
    }
    failure.classify()
}

/// `pageInfo.totalResults`
pub fn total_results(body: &Value) -> Result<u64, FetchError> {
    body.get("pageInfo")
        .and_then(|info| info.get("totalResults"))
        .and_then(Value::as_u64)
        .ok_or_else(|| FetchError::malformed("missing pageInfo.totalResults"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::interval_plan;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn count_from_page_info() {
        let body = json!({"kind": "youtube#searchListResponse", "pageInfo": {"totalResults": 1000000, "resultsPerPage": 5}});
        assert_eq!(total_results(&body).unwrap(), 1_000_000);
        assert!(matches!(
            total_results(&json!({"items": []})).unwrap_err(),
            FetchError::MalformedResponse { .. }
        ));
    }

    #[test]
    fn quota_reasons_rotate() {
        let body = r#"{"error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}}"#;
        let failure = HttpFailure::Status {
            status: 403,
            body: body.into(),
        };
        assert!(classify(failure).is_quota());
    }

    #[test]
    fn other_forbidden_is_client_error() {
        let failure = HttpFailure::Status {
            status: 403,
            body: r#"{"error": {"errors": [{"reason": "forbidden"}]}}"#.into(),
        };
        assert!(matches!(classify(failure), FetchError::Client { status: 403, .. }));
    }

    #[test]
    fn params_include_window_and_key() {
        let plan = interval_plan("licenses/by/3.0", NaiveDate::from_ymd_opt(2009, 1, 31).unwrap());
        let params = YouTubeAdapter::query_params(plan.get(1).unwrap(), "k");
        assert!(params.contains(&("videoLicense", "creativeCommon".to_string())));
        assert!(params.contains(&("publishedAfter", "2009-01-01T00:00:00Z".to_string())));
        assert!(params.contains(&("publishedBefore", "2009-02-28T23:59:59Z".to_string())));
        assert_eq!(params.last(), Some(&("key", "k".to_string())));
    }

    #[test]
    fn row_layout() {
        let plan = interval_plan("licenses/by/3.0", NaiveDate::from_ymd_opt(2009, 3, 1).unwrap());
        let adapter = YouTubeAdapter::new(&Config::default());
        let (table, row) = adapter.record(plan.get(2).unwrap(), &FetchResult::new("x", 17));
        assert_eq!(table, COUNT_TABLE);
        assert_eq!(
            row.header().collect::<Vec<_>>(),
            ["PLAN_INDEX", "LICENSE_TYPE", "INTERVAL", "COUNT"]
        );
        assert_eq!(row.values().collect::<Vec<_>>(), ["2", "licenses/by/3.0", "2009-3", "17"]);
    }
}
