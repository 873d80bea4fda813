//! Gantry HTTP Client
//!
//! Reports scan results to a code-review discussion thread through the
//! GitHub issue comment API. Only the "create comment" operation is used.
//!
//! # Example
//!
//! ```no_run
//! use gantry_client::{GitHubClient, ScanReporter};
//! use gantry_core::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gantry_client::ClientError> {
//!     let client = GitHubClient::new();
//!     let token = SecretString::new("ghp_...");
//!
//!     let outcome = client
//!         .report("app/main.py:1:1: E501 line too long", "acme/app", "42", &token)
//!         .await?;
//!
//!     println!("Comment: {:?}", outcome.comment_url);
//!     Ok(())
//! }
//! ```

mod comments;
pub mod error;
mod reporter;

pub use comments::{CommentPayload, MAX_COMMENT_CHARS, format_scan_comment};
pub use error::{ClientError, Result};
pub use reporter::{ReportOutcome, ScanReporter};

use reqwest::Client;

/// Public GitHub API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Sent on every request; the API rejects requests without a user agent
pub const USER_AGENT: &str = concat!("gantry/", env!("CARGO_PKG_VERSION"));

/// REST API version requested from the server
pub const API_VERSION: &str = "2022-11-28";

/// HTTP client for the GitHub comment API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    /// Base URL of the API (e.g., "https://api.github.com")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl GitHubClient {
    /// Create a client for the public GitHub API
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_API_URL)
    }

    /// Create a client for another API endpoint (e.g., GitHub Enterprise)
    ///
    /// # Example
    /// ```
    /// use gantry_client::GitHubClient;
    ///
    /// let client = GitHubClient::with_base_url("https://github.example.com/api/v3/");
    /// assert_eq!(client.base_url(), "https://github.example.com/api/v3");
    /// ```
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use gantry_client::GitHubClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = GitHubClient::with_client("https://api.github.com", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}
