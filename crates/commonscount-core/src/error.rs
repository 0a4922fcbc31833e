//! Failure taxonomy shared by adapters, the retry controller and the harvester

use crate::checkpoint::CheckpointError;

/// HTTP statuses worth retrying locally
pub const RETRYABLE_STATUSES: [u16; 7] = [408, 422, 429, 500, 502, 503, 504];

/// Classified failure of a single source adapter call.
///
/// Adapters classify once, at the boundary; everything above the
/// [`Retrier`](crate::retry::Retrier) reasons in these terms only.
#[derive(Debug)]
pub enum FetchError {
    /// Connection failure, timeout or retryable status
    Transient {
        status: Option<u16>,
        message: String,
    },
    /// The active credential hit its periodic (daily) limit
    QuotaExhausted { message: String },
    /// Non-retryable status (4xx other than the above)
    Client { status: u16, message: String },
    /// Response arrived but lacks the fields the adapter needs
    MalformedResponse { message: String },
    /// Transient failures outlasted the retry budget
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient {
                status: Some(s),
                message,
            } => write!(f, "transient HTTP {s}: {message}"),
            Self::Transient {
                status: None,
                message,
            } => write!(f, "transient network error: {message}"),
            Self::QuotaExhausted { message } => write!(f, "quota exhausted: {message}"),
            Self::Client { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::MalformedResponse { message } => write!(f, "malformed response: {message}"),
            Self::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::QuotaExhausted {
            message: message.into(),
        }
    }

    /// Default status classification, without any quota heuristics.
    ///
    /// Adapters that can tell a daily quota apart from a plain rate limit
    /// check for that first and fall back to this.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if RETRYABLE_STATUSES.contains(&status) {
            Self::Transient {
                status: Some(status),
                message,
            }
        } else {
            Self::Client { status, message }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }
}

/// Infrastructure failure that aborts a harvest run.
///
/// Per-item outcomes (quota, fatal responses) are reported through
/// [`HarvestStatus`](crate::harvest::HarvestStatus) instead.
#[derive(Debug)]
pub enum HarvestError {
    Sink(std::io::Error),
    Checkpoint(CheckpointError),
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sink(e) => write!(f, "sink: {e}"),
            Self::Checkpoint(e) => write!(f, "checkpoint: {e}"),
        }
    }
}

impl std::error::Error for HarvestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sink(e) => Some(e),
            Self::Checkpoint(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(e: std::io::Error) -> Self {
        Self::Sink(e)
    }
}

impl From<CheckpointError> for HarvestError {
    fn from(e: CheckpointError) -> Self {
        Self::Checkpoint(e)
    }
}
