//! Scan reporter
//!
//! Formats captured scan output and posts it to the review thread. Reporting
//! is best-effort from the pipeline's point of view, but every failure is
//! returned to the caller so it can be surfaced as a warning.

use async_trait::async_trait;
use gantry_core::SecretString;
use tracing::{info, warn};

use crate::GitHubClient;
use crate::comments::format_scan_comment;
use crate::error::Result;

/// What a successful report produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Link to the created comment, when the API returned one
    pub comment_url: Option<String>,
    /// Whether the scan output was cut to fit the comment size limit
    pub truncated: bool,
}

/// Service trait for reporting scan output to a review thread
#[async_trait]
pub trait ScanReporter: Send + Sync {
    /// Posts the scan output as a comment
    ///
    /// # Arguments
    /// * `scan_output` - Raw output of the scan tool (may be empty)
    /// * `repo` - Repository in `owner/repo` form
    /// * `issue_number` - Pull request or issue number
    /// * `token` - API token
    async fn report(
        &self,
        scan_output: &str,
        repo: &str,
        issue_number: &str,
        token: &SecretString,
    ) -> Result<ReportOutcome>;
}

#[async_trait]
impl ScanReporter for GitHubClient {
    async fn report(
        &self,
        scan_output: &str,
        repo: &str,
        issue_number: &str,
        token: &SecretString,
    ) -> Result<ReportOutcome> {
        let (payload, truncated) = format_scan_comment(scan_output);
        if truncated {
            warn!(
                "Scan output of {} bytes truncated to fit the comment size limit",
                scan_output.len()
            );
        }

        info!("Posting scan results to {}#{}", repo, issue_number);
        let comment_url = self
            .create_comment(repo, issue_number, token, &payload)
            .await?;
        info!("Comment posted successfully");

        Ok(ReportOutcome {
            comment_url,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_failure_is_a_network_error() {
        // nothing listens on port 1
        let client = GitHubClient::with_base_url("http://127.0.0.1:1");
        let err = client
            .report("E501", "acme/app", "1", &SecretString::new("t"))
            .await
            .unwrap_err();

        assert!(err.is_network(), "unexpected error: {:?}", err);
    }
}
