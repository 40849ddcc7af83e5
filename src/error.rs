//! Error types for the aqviz dashboard.
//!
//! Every fallible operation in the crate returns [`AqVizError`]. The
//! dashboard controller turns these into per-panel error states, so none of
//! them ever escapes to the user as a crashed page.

use thiserror::Error;

/// Custom error type for aqviz operations.
#[derive(Debug, Error)]
pub enum AqVizError {
    /// Error reading fixture files from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing JSON data (fixtures or backend bodies).
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Transport-level failure talking to the backend (connect, timeout, body).
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The backend answered 2xx but the body breaks the documented contract.
    #[error("Invalid API response: {0}")]
    InvalidApiResponse(String),

    /// Local validation failure; the request is never sent.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Invalid date-time '{input}': {source}")]
    DateParse {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The configured backend URL cannot be used to build request URLs.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown city: {0}")]
    UnknownCity(String),

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

impl AqVizError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Connection failures, timeouts and 5xx answers are transient; contract
    /// violations and 4xx answers are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AqVizError::HttpRequest(e) => e.is_timeout() || e.is_connect(),
            AqVizError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
