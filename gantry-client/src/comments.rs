//! Issue comment endpoint

use gantry_core::SecretString;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::GitHubClient;
use crate::error::{ClientError, Result};

/// Largest comment body the API accepts, in characters
pub const MAX_COMMENT_CHARS: usize = 65_536;

const HEADER: &str = "## Scan Results\n\n```\n";
const FOOTER: &str = "\n```";
const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// JSON body of a create-comment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPayload {
    pub body: String,
}

/// Subset of the created comment returned by the API
#[derive(Debug, Deserialize)]
struct CreatedComment {
    html_url: Option<String>,
}

/// Wraps scan output in the report template
///
/// Output that would push the body past [`MAX_COMMENT_CHARS`] is cut on a
/// character boundary and marked, keeping the code fence closed.
///
/// # Returns
/// The payload and whether the output was truncated
pub fn format_scan_comment(output: &str) -> (CommentPayload, bool) {
    let budget = MAX_COMMENT_CHARS - HEADER.chars().count() - FOOTER.chars().count();

    let (output, truncated) = if output.chars().count() > budget {
        let keep = budget - TRUNCATION_MARKER.chars().count();
        let cut = output
            .char_indices()
            .nth(keep)
            .map(|(idx, _)| idx)
            .unwrap_or(output.len());
        (format!("{}{}", &output[..cut], TRUNCATION_MARKER), true)
    } else {
        (output.to_string(), false)
    };

    let body = format!("{}{}{}", HEADER, output, FOOTER);
    (CommentPayload { body }, truncated)
}

impl GitHubClient {
    // =============================================================================
    // Issue Comments
    // =============================================================================

    /// Build the create-comment request without sending it
    ///
    /// # Arguments
    /// * `repo` - Repository in `owner/repo` form
    /// * `issue_number` - Pull request or issue number
    /// * `token` - Bearer token
    /// * `payload` - Comment body
    pub fn comment_request(
        &self,
        repo: &str,
        issue_number: &str,
        token: &SecretString,
        payload: &CommentPayload,
    ) -> Result<reqwest::Request> {
        if !matches!(repo.split_once('/'), Some((owner, name)) if !owner.is_empty() && !name.is_empty())
        {
            return Err(ClientError::InvalidRequest(format!(
                "repository must be owner/repo, got '{}'",
                repo
            )));
        }
        if issue_number.is_empty() || !issue_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ClientError::InvalidRequest(format!(
                "issue number must be numeric, got '{}'",
                issue_number
            )));
        }

        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.base_url, repo, issue_number
        );

        let request = self
            .client
            .post(&url)
            .bearer_auth(token.expose())
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, crate::USER_AGENT)
            .header("X-GitHub-Api-Version", crate::API_VERSION)
            .json(payload)
            .build()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        Ok(request)
    }

    /// Create a comment on an issue or pull request
    ///
    /// A single attempt is made. Only 201 Created counts as success.
    ///
    /// # Returns
    /// The URL of the created comment, when the response carries one
    pub async fn create_comment(
        &self,
        repo: &str,
        issue_number: &str,
        token: &SecretString,
        payload: &CommentPayload,
    ) -> Result<Option<String>> {
        let request = self.comment_request(repo, issue_number, token, payload)?;
        debug!("POST {}", request.url());

        let response = self.client.execute(request).await?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        interpret_comment_response(status, &body)
    }
}

/// Maps a comment API response to the created comment's URL or an error
fn interpret_comment_response(status: u16, body: &str) -> Result<Option<String>> {
    if status != 201 {
        return Err(ClientError::rejected(status, body));
    }

    Ok(serde_json::from_str::<CreatedComment>(body)
        .ok()
        .and_then(|comment| comment.html_url))
}
