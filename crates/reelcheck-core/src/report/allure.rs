//! Allure-compatible result files.
//!
//! One `<id>-<start ms>-result.json` per test in `allure-results/`, readable
//! by `allure serve`. Text and JSON attachments are written next to the
//! result, screenshots are copied in.

use super::{EventSink, ReporterError};
use crate::models::{AttachmentKind, OutcomeStatus, TestOutcome};
use crate::runner::{RunEvent, artifact_name};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

const EPIC: &str = "TMDB Discover";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AllureLabel {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AllureLink {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct AllureStatusDetails {
    /// Marks a failure caused by a known, open defect.
    pub known: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AllureAttachment {
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AllureStep {
    pub name: String,
    pub status: String,
    pub stage: String,
    #[serde(rename = "statusDetails", skip_serializing_if = "Option::is_none")]
    pub status_details: Option<AllureStatusDetails>,
}

/// One test in Allure's result schema.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllureResult {
    pub uuid: String,
    pub history_id: String,
    pub name: String,
    pub full_name: String,
    pub status: String,
    pub status_details: AllureStatusDetails,
    pub stage: String,
    pub start: i64,
    pub stop: i64,
    pub labels: Vec<AllureLabel>,
    pub links: Vec<AllureLink>,
    pub steps: Vec<AllureStep>,
    pub attachments: Vec<AllureAttachment>,
}

fn allure_status(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Passed => "passed",
        OutcomeStatus::Failed | OutcomeStatus::ExpectedFailure => "failed",
        OutcomeStatus::Skipped => "skipped",
    }
}

fn severity(markers: &[String]) -> Option<&'static str> {
    markers.iter().find_map(|m| match m.as_str() {
        "blocker" => Some("blocker"),
        "critical" | "high" => Some("critical"),
        "medium" | "normal" => Some("normal"),
        "low" | "minor" => Some("minor"),
        "trivial" => Some("trivial"),
        _ => None,
    })
}

fn label(name: &str, value: &str) -> AllureLabel {
    AllureLabel {
        name: name.to_string(),
        value: value.to_string(),
    }
}

impl AllureResult {
    /// Maps an outcome, naming attachment files with `uuid` as prefix.
    pub fn from_outcome(outcome: &TestOutcome, uuid: &str, stop_ms: i64) -> Self {
        let mut labels = vec![
            label("framework", "reelcheck"),
            label("epic", EPIC),
            label("suite", &outcome.suite),
            label("feature", &outcome.suite),
        ];
        if let Some(severity) = severity(&outcome.markers) {
            labels.push(label("severity", severity));
        }
        labels.extend(outcome.markers.iter().map(|m| label("tag", m)));

        let links = outcome
            .defect_id
            .iter()
            .map(|id| AllureLink {
                kind: "issue".to_string(),
                name: id.clone(),
                url: id.clone(),
            })
            .collect();

        let steps = outcome
            .assertions
            .iter()
            .map(|a| AllureStep {
                name: a.name.clone(),
                status: if a.passed { "passed" } else { "failed" }.to_string(),
                stage: "finished".to_string(),
                status_details: (!a.passed).then(|| AllureStatusDetails {
                    known: false,
                    message: Some(format!("expected {}, got {}", a.expected, a.actual)),
                    trace: None,
                }),
            })
            .collect();

        let attachments = outcome
            .attachments
            .iter()
            .enumerate()
            .map(|(i, a)| AllureAttachment {
                name: a.name.clone(),
                source: attachment_source(uuid, i, a.kind),
                mime_type: a.kind.mime_type().to_string(),
            })
            .collect();

        let trace = (!outcome.console_errors.is_empty())
            .then(|| format!("console errors:\n{}", outcome.console_errors.join("\n")));

        Self {
            uuid: uuid.to_string(),
            history_id: format!("{}::{}", outcome.suite, outcome.test_id),
            name: format!("{}: {}", outcome.test_id, outcome.title),
            full_name: format!("{}::{}", outcome.suite, outcome.test_id),
            status: allure_status(outcome.status).to_string(),
            status_details: AllureStatusDetails {
                known: outcome.status == OutcomeStatus::ExpectedFailure,
                message: outcome.message.clone(),
                trace,
            },
            stage: "finished".to_string(),
            start: stop_ms - outcome.duration_ms() as i64,
            stop: stop_ms,
            labels,
            links,
            steps,
            attachments,
        }
    }
}

fn attachment_source(uuid: &str, index: usize, kind: AttachmentKind) -> String {
    let ext = match kind {
        AttachmentKind::Text => "txt",
        AttachmentKind::Json => "json",
        AttachmentKind::Png => "png",
    };
    format!("{uuid}-attachment-{index}.{ext}")
}

/// Writes Allure result files as tests finish.
pub struct AllureWriter {
    dir: PathBuf,
}

impl AllureWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the result file and its attachments, returning the result path.
    pub fn write_outcome(&self, outcome: &TestOutcome) -> Result<PathBuf, ReporterError> {
        std::fs::create_dir_all(&self.dir)?;
        let stop_ms = Utc::now().timestamp_millis();
        let uuid = format!(
            "{}-{}",
            artifact_name(&outcome.test_id),
            stop_ms - outcome.duration_ms() as i64
        );
        let result = AllureResult::from_outcome(outcome, &uuid, stop_ms);

        for (attachment, target) in outcome.attachments.iter().zip(&result.attachments) {
            let path = self.dir.join(&target.source);
            match attachment.kind {
                AttachmentKind::Png => {
                    std::fs::copy(&attachment.content, &path)?;
                }
                AttachmentKind::Text | AttachmentKind::Json => {
                    std::fs::write(&path, &attachment.content)?;
                }
            }
        }

        let path = self.dir.join(format!("{uuid}-result.json"));
        std::fs::write(&path, serde_json::to_string_pretty(&result)?)?;
        Ok(path)
    }
}

impl EventSink for AllureWriter {
    fn name(&self) -> &str {
        "allure"
    }

    fn handle(&mut self, event: &RunEvent) -> Result<(), ReporterError> {
        match event {
            RunEvent::TestCompleted { outcome } | RunEvent::TestSkipped { outcome } => {
                self.write_outcome(outcome)?;
            }
            RunEvent::RunStarted { .. } => std::fs::create_dir_all(&self.dir)?,
            _ => {}
        }
        Ok(())
    }
}
