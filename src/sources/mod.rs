//! Upstream literature sources.
//!
//! The [`Source`] trait is the seam between the search tool and the remote
//! literature database. It exposes exactly the two operations the tool needs:
//! an ordered identifier search and a batch metadata fetch.
//!
//! - [`PubMedSource`]: NCBI E-utilities (ESearch + EFetch)
//! - [`MockSource`]: scripted in-memory source for tests

mod pubmed;

pub mod mock;

pub use mock::MockSource;
pub use pubmed::PubMedSource;

use async_trait::async_trait;

use crate::models::{Citation, SearchRequest};

/// A remote literature database.
///
/// Implementations must be safe to call concurrently from many requests and
/// must not keep per-request state between calls.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Identifiers matching the request, in upstream order, at most `request.retmax`
    async fn search_ids(&self, request: &SearchRequest) -> Result<Vec<String>, SourceError>;

    /// Display metadata for the given identifiers, in any order
    async fn fetch_citations(&self, ids: &[String]) -> Result<Vec<Citation>, SourceError>;
}

/// Errors that can occur when talking to an upstream source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Connection failure or other transport error
    #[error("Network error: {0}")]
    Network(String),

    /// The upstream call exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Upstream answered with a 5xx status
    #[error("Upstream server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Upstream declared the request invalid (4xx status or an error payload)
    #[error("Upstream rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_) | SourceError::Timeout(_) | SourceError::Server { .. }
        )
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = summarize_body(status, body);
        if status.is_server_error() {
            SourceError::Server {
                status: status.as_u16(),
                message,
            }
        } else {
            SourceError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }
}

fn summarize_body(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }
    body.chars().take(200).collect()
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::from_status(status, "")
        } else if err.is_decode() || err.is_body() {
            SourceError::Network(format!("Failed to read response: {}", err))
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}
