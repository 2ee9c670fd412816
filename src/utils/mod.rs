//! Utility modules supporting upstream calls.
//!
//! - [`HttpClient`]: pooled HTTP client with request and connect timeouts
//! - [`RetryConfig`]: configuration for bounded retry with jittered backoff
//! - [`with_retry`]: execute an upstream call, retrying only transient failures
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use pubmed_mcp::sources::SourceError;
//! use pubmed_mcp::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let config = RetryConfig::default().max_retries(2);
//! let result = with_retry(config, || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod http;
mod retry;

pub use http::HttpClient;
pub use retry::{with_retry, RetryConfig};
