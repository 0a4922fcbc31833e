//! Blocking JSON GET over a shared async client.
//!
//! Uses async reqwest internally on a small shared tokio runtime, but presents
//! a sync interface: the harvester issues one request at a time, in plan order.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use crate::error::FetchError;

pub const USER_AGENT: &str = concat!(
    "commonscount/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/creativecommons/quantifying)"
);

/// Timeouts for the shared client
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

static SETTINGS: OnceLock<HttpSettings> = OnceLock::new();

/// Install client settings. Only the first call wins, and only if made
/// before the first request.
pub fn set_http_settings(settings: HttpSettings) {
    if SETTINGS.set(settings).is_err() {
        log::debug!("HTTP settings already installed, ignoring");
    }
}

pub fn http_settings() -> HttpSettings {
    SETTINGS.get().copied().unwrap_or_default()
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    let settings = http_settings();
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Raw failure of a GET, before the adapter classifies it.
#[derive(Debug)]
pub enum HttpFailure {
    /// Non-2xx response; `body` is kept for quota heuristics
    Status { status: u16, body: String },
    /// Connect/read failure or timeout
    Network { message: String },
    /// 2xx response whose body is not JSON
    Decode { message: String },
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "HTTP {status}: {}", truncate(body, 200)),
            Self::Network { message } => write!(f, "network: {message}"),
            Self::Decode { message } => write!(f, "decode: {message}"),
        }
    }
}

impl std::error::Error for HttpFailure {}

impl HttpFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Default classification into the fetch taxonomy
    pub fn classify(self) -> FetchError {
        match self {
            Self::Status { status, body } => FetchError::from_status(status, truncate(&body, 200)),
            Self::Network { message } => FetchError::Transient {
                status: None,
                message,
            },
            Self::Decode { message } => FetchError::MalformedResponse { message },
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// GET `url` with `query` and decode the body as JSON.
pub fn get_json(url: &str, query: &[(&str, String)]) -> Result<serde_json::Value, HttpFailure> {
    SHARED_RUNTIME.handle().block_on(async {
        let response = SHARED_CLIENT
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| HttpFailure::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| HttpFailure::Network {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(HttpFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| HttpFailure::Decode {
            message: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failure_is_transient() {
        let err = HttpFailure::Network {
            message: "connection refused".to_string(),
        }
        .classify();
        assert!(err.is_retryable());
    }

    #[test]
    fn decode_failure_is_malformed() {
        let err = HttpFailure::Decode {
            message: "expected value".to_string(),
        }
        .classify();
        assert!(matches!(err, FetchError::MalformedResponse { .. }));
    }

    #[test]
    fn status_failure_uses_default_table() {
        let err = HttpFailure::Status {
            status: 503,
            body: String::new(),
        }
        .classify();
        assert!(err.is_retryable());

        let err = HttpFailure::Status {
            status: 400,
            body: String::new(),
        }
        .classify();
        assert!(!err.is_retryable());
    }

    #[test]
    fn status_accessor() {
        let failure = HttpFailure::Status {
            status: 429,
            body: "x".to_string(),
        };
        assert_eq!(failure.status(), Some(429));
        assert_eq!(
            HttpFailure::Network {
                message: "x".to_string()
            }
            .status(),
            None
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn display_status_truncates_body() {
        let failure = HttpFailure::Status {
            status: 500,
            body: "x".repeat(500),
        };
        assert!(format!("{failure}").len() < 220);
    }
}
