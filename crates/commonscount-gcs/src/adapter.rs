//! Google Custom Search adapter
//!
//! One request per plan item: the tool URL as an exact phrase, restricted to
//! pages linking to it, optionally narrowed by country (`cr`) or language
//! (`lr`). The count is `searchInformation.totalResults`.

use commonscount_core::plan::TOOL_URL_KEY;
use commonscount_core::{
    Credential, Dimension, FetchError, FetchResult, HttpFailure, PLAN_INDEX_COLUMN, Row,
    SourceAdapter, WorkItem, get_json,
};
use serde_json::Value;

use crate::config::Config;

pub const SOURCE_ID: &str = "gcs";

pub const COUNT_TABLE: &str = "gcs_1_count";
pub const LANGUAGE_TABLE: &str = "gcs_2_count_by_language";
pub const COUNTRY_TABLE: &str = "gcs_3_count_by_country";

const TABLES: [&str; 3] = [COUNT_TABLE, LANGUAGE_TABLE, COUNTRY_TABLE];

#[derive(Debug, Clone)]
pub struct GcsAdapter {
    base_url: String,
    cx: String,
}

impl GcsAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.base_url.clone(),
            cx: config.cx.clone(),
        }
    }

    /// Query parameters for `item`, developer key included
    pub fn query_params(&self, item: &WorkItem, key: &str) -> Vec<(&'static str, String)> {
        let tool_url = item.extra(TOOL_URL_KEY).unwrap_or_default();
        let mut params = vec![
            ("key", key.to_string()),
            ("cx", self.cx.clone()),
            ("linkSite", tool_url.trim_start_matches('/').to_string()),
            ("q", format!("\"{tool_url}\"")),
        ];
        match &item.dimension {
            Dimension::Country(v) => params.push(("cr", v.code.clone())),
            Dimension::Language(v) => params.push(("lr", v.code.clone())),
            Dimension::None => {}
        }
        params
    }
}

impl SourceAdapter for GcsAdapter {
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
        let params = self.query_params(item, key);
        let body = get_json(&self.base_url, &params).map_err(classify)?;
        Ok(FetchResult::new(item.identifier.clone(), total_results(&body)?))
    }

    fn record(&self, item: &WorkItem, result: &FetchResult) -> (&'static str, Row) {
        let row = Row::new()
            .with(PLAN_INDEX_COLUMN, item.index)
            .with("TOOL_IDENTIFIER", &item.identifier);
        match &item.dimension {
            Dimension::Country(v) => (
                COUNTRY_TABLE,
                row.with("COUNTRY", &v.label).with("COUNT", result.count),
            ),
            Dimension::Language(v) => (
                LANGUAGE_TABLE,
                row.with("LANGUAGE", &v.label).with("COUNT", result.count),
            ),
            Dimension::None => (COUNT_TABLE, row.with("COUNT", result.count)),
        }
    }
}

/// A 429 that names the per-day limit is a spent key; any other 429 is a
/// plain rate limit.
pub fn classify(failure: HttpFailure) -> FetchError {
    if let HttpFailure::Status { status: 429, body } = &failure {
        if body.contains("Quota exceeded") && body.contains("Queries per day") {
            return FetchError::quota("Queries per day");
        }
    }
    failure.classify()
}

/// `searchInformation.totalResults`, sent as a decimal string
pub fn total_results(body: &Value) -> Result<u64, FetchError> {
    let total = body
        .get("searchInformation")
        .and_then(|info| info.get("totalResults"))
        .ok_or_else(|| FetchError::malformed("missing searchInformation.totalResults"))?;
    match total {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| FetchError::malformed(format!("totalResults not a count: {s:?}"))),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| FetchError::malformed(format!("totalResults not a count: {n}"))),
        other => Err(FetchError::malformed(format!(
            "totalResults not a count: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonscount_core::DimensionValue;
    use serde_json::json;

    fn adapter() -> GcsAdapter {
        GcsAdapter::new(&Config {
            cx: "engine".into(),
            ..Default::default()
        })
    }

    fn item() -> WorkItem {
        WorkItem::new("CC BY 4.0").with_extra(TOOL_URL_KEY, "//creativecommons.org/licenses/by/4.0")
    }

    #[test]
    fn total_results_from_string() {
        let body = json!({"searchInformation": {"totalResults": "12345"}});
        assert_eq!(total_results(&body).unwrap(), 12345);
    }

    #[test]
    fn total_results_from_number() {
        let body = json!({"searchInformation": {"totalResults": 7}});
        assert_eq!(total_results(&body).unwrap(), 7);
    }

    #[test]
    fn missing_total_is_malformed() {
        let err = total_results(&json!({"items": []})).unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
        let err = total_results(&json!({"searchInformation": {"totalResults": "many"}}))
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn daily_quota_is_not_retried() {
        let failure = HttpFailure::Status {
            status: 429,
            body: r#"{"error": {"message": "Quota exceeded for quota metric 'Queries' and limit 'Queries per day'"}}"#.into(),
        };
        assert!(classify(failure).is_quota());
    }

    #[test]
    fn plain_rate_limit_is_transient() {
        let failure = HttpFailure::Status {
            status: 429,
            body: "Rate Limit Exceeded".into(),
        };
        assert!(classify(failure).is_retryable());
    }

    #[test]
    fn bad_request_is_client_error() {
        let failure = HttpFailure::Status {
            status: 400,
            body: "Invalid Value".into(),
        };
        assert!(matches!(classify(failure), FetchError::Client { status: 400, .. }));
    }

    #[test]
    fn params_for_plain_tool() {
        let params = adapter().query_params(&item(), "secret");
        assert!(params.contains(&("cx", "engine".to_string())));
        assert!(params.contains(&("key", "secret".to_string())));
        assert!(params.contains(&("linkSite", "creativecommons.org/licenses/by/4.0".to_string())));
        assert!(params.contains(&("q", "\"//creativecommons.org/licenses/by/4.0\"".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "cr" || *k == "lr"));
    }

    #[test]
    fn params_carry_country_or_language_code() {
        let by_country =
            item().with_dimension(Dimension::Country(DimensionValue::new("Germany", "countryDE")));
        let params = adapter().query_params(&by_country, "k");
        assert!(params.contains(&("cr", "countryDE".to_string())));

        let by_language =
            item().with_dimension(Dimension::Language(DimensionValue::new("German", "lang_de")));
        let params = adapter().query_params(&by_language, "k");
        assert!(params.contains(&("lr", "lang_de".to_string())));
    }

    #[test]
    fn rows_routed_by_dimension() {
        let result = FetchResult::new("CC BY 4.0", 42);
        let adapter = adapter();

        let plain = WorkItem { index: 3, ..item() };
        let (table, row) = adapter.record(&plain, &result);
        assert_eq!(table, COUNT_TABLE);
        assert_eq!(
            row.header().collect::<Vec<_>>(),
            ["PLAN_INDEX", "TOOL_IDENTIFIER", "COUNT"]
        );
        assert_eq!(row.values().collect::<Vec<_>>(), ["3", "CC BY 4.0", "42"]);

        let lang = plain
            .clone()
            .with_dimension(Dimension::Language(DimensionValue::new("German", "lang_de")));
        let (table, row) = adapter.record(&lang, &result);
        assert_eq!(table, LANGUAGE_TABLE);
        assert_eq!(row.get("LANGUAGE"), Some("German"));

        let country = plain.with_dimension(Dimension::Country(DimensionValue::new("Germany", "countryDE")));
        let (table, row) = adapter.record(&country, &result);
        assert_eq!(table, COUNTRY_TABLE);
        assert_eq!(
            row.header().collect::<Vec<_>>(),
            ["PLAN_INDEX", "TOOL_IDENTIFIER", "COUNTRY", "COUNT"]
        );
    }

    #[test]
    #[ignore = "requires network access and GCS_CX / GCS_DEVELOPER_KEY"]
    fn live_query() {
        let cx = std::env::var("GCS_CX").unwrap();
        let key = Credential::new(std::env::var("GCS_DEVELOPER_KEY").unwrap());
        let adapter = GcsAdapter::new(&Config {
            cx,
            ..Default::default()
        });
        let result = adapter.fetch(&item(), Some(&key)).unwrap();
        assert!(result.count > 0);
    }
}
