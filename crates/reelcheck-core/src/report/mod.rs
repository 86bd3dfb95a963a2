//! Reporters for a run.
//!
//! Every reporter is an [`EventSink`]. The runner hands its sinks to
//! [`spawn_sink`], which moves them into one task; that task is the only
//! writer of report files.
//!
//! - [`TerminalReporter`]: colored progress and summary
//! - [`JsonlWriter`]: `outcomes.jsonl`, one outcome per line as tests finish
//! - [`AllureWriter`]: `allure-results/<id>-result.json`
//! - [`ReportWriter`]: `report.json` and the HTML report once the run ends

mod allure;
mod html;
mod jsonl;
mod terminal;

pub use allure::{AllureResult, AllureWriter};
pub use html::HtmlReporter;
pub use jsonl::{JsonlWriter, OUTCOMES_FILE};
pub use terminal::TerminalReporter;

use crate::defects::{DefectRegistry, KnownDefect};
use crate::models::TestOutcome;
use crate::runner::{RunEvent, RunResults};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReporterError {
    /// Failed to write report file.
    #[error("failed to write report: {0}")]
    WriteError(#[from] std::io::Error),

    /// Failed to serialize report to JSON.
    #[error("failed to serialize report: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Consumer of run events.
pub trait EventSink: Send {
    /// Name used when logging failures of this sink.
    fn name(&self) -> &str;

    fn handle(&mut self, event: &RunEvent) -> Result<(), ReporterError>;
}

/// Moves `sinks` into a task fed by the returned sender.
///
/// The task ends once every sender is dropped. Sink errors are logged as
/// warnings and never reach the run.
pub fn spawn_sink(
    mut sinks: Vec<Box<dyn EventSink>>,
) -> (mpsc::UnboundedSender<RunEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<RunEvent>();
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            for sink in &mut sinks {
                if let Err(e) = sink.handle(&event) {
                    warn!(sink = sink.name(), error = %e, "Reporter failed");
                }
            }
        }
        debug!(sinks = sinks.len(), "Report sink closed");
    });
    (tx, task)
}

/// Full run report for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub reelcheck_version: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// True when no outcome failed.
    pub passed: bool,
    pub verdict: String,
    pub browser: String,
    pub driver: String,
    pub base_url: String,
    pub summary: ReportSummary,
    pub outcomes: Vec<TestOutcome>,
    pub defects: Vec<KnownDefect>,
}

/// Counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub expected_failures: usize,
    pub skipped: usize,
    pub leaked_sessions: usize,
}

impl ReportSummary {
    pub fn from_results(results: &RunResults) -> Self {
        Self {
            total: results.total_count(),
            passed: results.passed_count(),
            failed: results.failed_count(),
            expected_failures: results.expected_failure_count(),
            skipped: results.skipped_count(),
            leaked_sessions: results.leaked_sessions,
        }
    }
}

/// Generates machine-readable JSON reports.
#[derive(Debug, Default)]
pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn build_report(&self, results: &RunResults, registry: &DefectRegistry) -> RunReport {
        let passed = results.all_acceptable();
        let verdict = if passed {
            "All tests passed".to_string()
        } else {
            format!("{} tests failed", results.failed_count())
        };
        RunReport {
            timestamp: Utc::now(),
            reelcheck_version: crate::VERSION.to_string(),
            started_at: results.started_at,
            duration_ms: results.duration.as_millis() as u64,
            passed,
            verdict,
            browser: results.browser.clone(),
            driver: results.driver.clone(),
            base_url: results.base_url.clone(),
            summary: ReportSummary::from_results(results),
            outcomes: results.outcomes.clone(),
            defects: registry.all().cloned().collect(),
        }
    }

    pub fn generate(
        &self,
        results: &RunResults,
        registry: &DefectRegistry,
    ) -> Result<String, ReporterError> {
        let report = self.build_report(results, registry);
        serde_json::to_string_pretty(&report).map_err(ReporterError::from)
    }
}

/// Writes `report.json` and the HTML report when the run completes.
pub struct ReportWriter {
    output_dir: PathBuf,
    html_path: PathBuf,
    registry: Arc<DefectRegistry>,
    written: Vec<PathBuf>,
}

impl ReportWriter {
    pub fn new(output_dir: PathBuf, html_path: PathBuf, registry: Arc<DefectRegistry>) -> Self {
        Self {
            output_dir,
            html_path,
            registry,
            written: Vec::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes both reports and returns their paths.
    pub fn write(&mut self, results: &RunResults) -> Result<Vec<PathBuf>, ReporterError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let json = self.write_json(results)?;
        let html = self.write_html(results)?;
        self.written = vec![json, html];
        Ok(self.written.clone())
    }

    pub fn write_json(&self, results: &RunResults) -> Result<PathBuf, ReporterError> {
        let content = JsonReporter::new().generate(results, &self.registry)?;
        let path = self.output_dir.join("report.json");
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn write_html(&self, results: &RunResults) -> Result<PathBuf, ReporterError> {
        let content = HtmlReporter::new().generate(results, &self.registry);
        if let Some(parent) = self.html_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.html_path, content)?;
        Ok(self.html_path.clone())
    }
}

impl EventSink for ReportWriter {
    fn name(&self) -> &str {
        "report-writer"
    }

    fn handle(&mut self, event: &RunEvent) -> Result<(), ReporterError> {
        if let RunEvent::RunCompleted { results } = event {
            for path in self.write(results)? {
                debug!(path = %path.display(), "Report written");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{Assertion, Attachment, OutcomeStatus, TestOutcome};
    use crate::runner::RunResults;
    use std::time::Duration;

    pub fn outcome(id: &str, suite: &str, status: OutcomeStatus) -> TestOutcome {
        TestOutcome {
            test_id: id.to_string(),
            title: format!("{id} title"),
            suite: suite.to_string(),
            status,
            duration: Duration::from_millis(1250),
            console_errors: Vec::new(),
            screenshot: None,
            assertions: Vec::new(),
            attachments: Vec::new(),
            defect_id: None,
            message: None,
            markers: vec!["regression".to_string()],
        }
    }

    pub fn mixed_results() -> RunResults {
        let passed = outcome("TC-035", "functional", OutcomeStatus::Passed);

        let mut failed = outcome("TC-040", "negative", OutcomeStatus::Failed);
        failed.message = Some("year filter: expected <rejected>, got <accepted>".to_string());
        failed.assertions = vec![Assertion {
            name: "year filter".to_string(),
            passed: false,
            expected: "rejected".to_string(),
            actual: "accepted <1899>".to_string(),
        }];
        failed.console_errors = vec!["TypeError: x is undefined".to_string()];
        failed.attachments = vec![Attachment::text("url", "https://example.test/?year=1899")];

        let mut expected = outcome("TC-050", "negative", OutcomeStatus::ExpectedFailure);
        expected.defect_id = Some("DEF-001".to_string());
        expected.message = Some("DEF-001 still reproduces: 404 page".to_string());

        let mut skipped = outcome("API-001", "api", OutcomeStatus::Skipped);
        skipped.message = Some("no API key".to_string());

        RunResults {
            outcomes: vec![passed, failed, expected, skipped],
            duration: Duration::from_secs(7),
            browser: "chromium".to_string(),
            driver: "simulated".to_string(),
            base_url: "https://tmdb-discover.surge.sh/".to_string(),
            ..RunResults::default()
        }
    }
}
