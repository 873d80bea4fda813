//! Step results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Captured output of a scan job
///
/// A non-zero exit code means the scan tool reported findings (or failed on
/// its own terms); it is data for the report, never a pipeline error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub output: String,
    pub exit_code: i32,
}

impl ScanResult {
    /// True when the tool exited cleanly and printed nothing
    pub fn is_clean(&self) -> bool {
        self.exit_code == 0 && self.output.trim().is_empty()
    }
}

/// Reference of a published image, as resolved by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedRef(String);

impl PublishedRef {
    /// Wraps an engine-reported reference; blank references are rejected
    pub fn new(reference: impl Into<String>) -> Option<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            None
        } else {
            Some(Self(reference))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublishedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_ref_rejects_blank() {
        assert!(PublishedRef::new("").is_none());
        assert!(PublishedRef::new("  ").is_none());
        let published = PublishedRef::new("ghcr.io/acme/app@sha256:abc").unwrap();
        assert_eq!(published.to_string(), "ghcr.io/acme/app@sha256:abc");
    }

    #[test]
    fn test_scan_result_clean() {
        assert!(ScanResult::default().is_clean());
        assert!(
            !ScanResult {
                output: "app/main.py:1:1: E501 line too long".to_string(),
                exit_code: 1,
            }
            .is_clean()
        );
    }
}
