//! Data models for test outcomes.
//!
//! A [`TestOutcome`] is created once when a test completes, streamed to the
//! reporting sink, and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Final status of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every assertion held.
    Passed,
    /// An assertion failed, an error escaped the test, or a known defect
    /// behaved differently than documented.
    Failed,
    /// A documented defect reproduced as expected.
    ExpectedFailure,
    /// The test did not run.
    Skipped,
}

impl OutcomeStatus {
    /// True for statuses that do not fail the run.
    pub fn is_acceptable(self) -> bool {
        !matches!(self, OutcomeStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Passed => "passed",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::ExpectedFailure => "expected_failure",
            OutcomeStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single assertion within a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Name of the assertion
    pub name: String,
    /// Whether the assertion passed
    pub passed: bool,
    /// Expected value/condition
    pub expected: String,
    /// Actual value/condition observed
    pub actual: String,
}

impl Assertion {
    /// Overrides the pass flag, keeping the description.
    pub fn with_passed(mut self, passed: bool) -> Self {
        self.passed = passed;
        self
    }
}

/// Kind of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Text,
    Json,
    Png,
}

impl AttachmentKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            AttachmentKind::Text => "text/plain",
            AttachmentKind::Json => "application/json",
            AttachmentKind::Png => "image/png",
        }
    }
}

/// Extra context recorded by a test: captured URLs, counts, screenshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    /// Inline content for text/json, file path for images.
    pub content: String,
}

impl Attachment {
    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Text,
            content: content.into(),
        }
    }

    pub fn json(name: impl Into<String>, value: &serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Json,
            content: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        }
    }

    pub fn screenshot(name: impl Into<String>, path: &std::path::Path) -> Self {
        Self {
            name: name.into(),
            kind: AttachmentKind::Png,
            content: path.display().to_string(),
        }
    }
}

/// Result of a single test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_id: String,
    pub title: String,
    pub suite: String,
    pub status: OutcomeStatus,
    /// How long the test took
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    /// Console errors captured during the browser session, in order.
    #[serde(default)]
    pub console_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Known defect this test characterises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defect_id: Option<String>,
    /// Why the test ended up in its status, for anything but a clean pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub markers: Vec<String>,
}

impl TestOutcome {
    /// An outcome for a test that never ran.
    pub fn skipped(
        test_id: impl Into<String>,
        title: impl Into<String>,
        suite: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            title: title.into(),
            suite: suite.into(),
            status: OutcomeStatus::Skipped,
            duration: Duration::ZERO,
            console_errors: Vec::new(),
            screenshot: None,
            assertions: Vec::new(),
            attachments: Vec::new(),
            defect_id: None,
            message: Some(reason.into()),
            markers: Vec::new(),
        }
    }

    /// Failed assertions only.
    pub fn failed_assertions(&self) -> impl Iterator<Item = &Assertion> {
        self.assertions.iter().filter(|a| !a.passed)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Serde helper storing a Duration as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_duration_as_millis() {
        let mut outcome = TestOutcome::skipped("t1", "Title", "functional", "not selected");
        outcome.duration = Duration::from_millis(1234);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["duration_ms"], 1234);
        assert_eq!(json["status"], "skipped");
        assert!(json.get("screenshot").is_none());

        let back: TestOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(1234));
    }

    #[test]
    fn test_acceptable_statuses() {
        assert!(OutcomeStatus::Passed.is_acceptable());
        assert!(OutcomeStatus::ExpectedFailure.is_acceptable());
        assert!(OutcomeStatus::Skipped.is_acceptable());
        assert!(!OutcomeStatus::Failed.is_acceptable());
    }

    #[test]
    fn test_expected_failure_serializes_snake_case() {
        let json = serde_json::to_string(&OutcomeStatus::ExpectedFailure).unwrap();
        assert_eq!(json, "\"expected_failure\"");
    }
}
