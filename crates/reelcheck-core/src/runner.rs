//! Test runner.
//!
//! Selects cases, runs them as tokio tasks bounded by `parallel_workers`,
//! then runs `serial` cases one at a time. Each case gets its own browser
//! session, is isolated from panics and a per-test timeout, and ends as
//! exactly one [`TestOutcome`]. Progress travels as [`RunEvent`]s over a
//! channel to a single sink task that owns every reporter.
//!
//! # Example
//!
//! ```no_run
//! use reelcheck_core::{DefectRegistry, RunConfiguration, Selection, TestRunner};
//! use reelcheck_core::testing::SimulatedDriver;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(RunConfiguration::default());
//! let mut runner = TestRunner::new(
//!     config,
//!     Arc::new(SimulatedDriver::new()),
//!     Arc::new(DefectRegistry::builtin()),
//!     Vec::new(),
//! )?;
//! let results = runner.run(&Selection::default()).await?;
//! std::process::exit(results.exit_code());
//! # }
//! ```

use crate::api::{ApiClient, ApiError};
use crate::browser::{BrowserDriver, BrowserSession, SessionProvider};
use crate::case::{CaseError, CaseReport, TestCase, TestContext};
use crate::config::{MarkerFilter, RunConfiguration};
use crate::defects::{DefectRegistry, DefectStatus};
use crate::models::{Attachment, OutcomeStatus, TestOutcome};
use crate::report::{EventSink, spawn_sink};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no tests matched the selection: {0}")]
    NoMatchingTests(String),

    #[error("invalid -k expression: {0}")]
    InvalidKeyword(#[from] regex::Error),

    #[error("failed to build API client: {0}")]
    Api(#[from] ApiError),
}

/// Events emitted during a run, in order per test.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted { total: usize, workers: usize },
    TestStarted { test_id: String, title: String, suite: String },
    TestCompleted { outcome: TestOutcome },
    TestSkipped { outcome: TestOutcome },
    RunCompleted { results: RunResults },
}

/// Aggregated results of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResults {
    pub outcomes: Vec<TestOutcome>,
    #[serde(rename = "duration_ms", with = "crate::models::duration_ms")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub browser: String,
    pub driver: String,
    pub base_url: String,
    /// Sessions still open after the run; zero unless something leaked.
    pub leaked_sessions: usize,
}

impl RunResults {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn passed_count(&self) -> usize {
        self.count(OutcomeStatus::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn expected_failure_count(&self) -> usize {
        self.count(OutcomeStatus::ExpectedFailure)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    pub fn total_count(&self) -> usize {
        self.outcomes.len()
    }

    /// True when nothing failed.
    pub fn all_acceptable(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_acceptable())
    }

    /// Process exit code: 0 when every outcome is acceptable, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_acceptable())
    }

    pub fn failures(&self) -> Vec<&TestOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .collect()
    }

    pub fn expected_failures(&self) -> Vec<&TestOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::ExpectedFailure)
            .collect()
    }

    /// Outcomes grouped by suite, suites sorted by name.
    pub fn by_suite(&self) -> Vec<(&str, Vec<&TestOutcome>)> {
        let mut suites: std::collections::BTreeMap<&str, Vec<&TestOutcome>> =
            std::collections::BTreeMap::new();
        for outcome in &self.outcomes {
            suites.entry(&outcome.suite).or_default().push(outcome);
        }
        suites.into_iter().collect()
    }
}

/// Which cases to run.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Path prefixes such as `negative` or `functional/combined_filters::TC-035`.
    pub paths: Vec<String>,
    /// Case-insensitive pattern matched against id, title and path.
    pub keyword: Option<Regex>,
    pub markers: MarkerFilter,
}

impl Selection {
    /// Compiles a `-k` expression.
    pub fn keyword(expr: &str) -> Result<Regex, RunnerError> {
        Ok(RegexBuilder::new(expr).case_insensitive(true).build()?)
    }

    pub fn is_filtered(&self) -> bool {
        !self.paths.is_empty() || self.keyword.is_some() || !self.markers.is_empty()
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.paths.is_empty() {
            parts.push(format!("paths {}", self.paths.join(", ")));
        }
        if let Some(k) = &self.keyword {
            parts.push(format!("-k {}", k.as_str()));
        }
        if !self.markers.include.is_empty() {
            parts.push(format!(
                "-m {}",
                self.markers.include.iter().cloned().collect::<Vec<_>>().join(",")
            ));
        }
        if !self.markers.exclude.is_empty() {
            parts.push(format!(
                "excluding {}",
                self.markers.exclude.iter().cloned().collect::<Vec<_>>().join(",")
            ));
        }
        parts.join("; ")
    }

    pub fn matches(&self, case: &dyn TestCase) -> bool {
        let path = case.path();
        if !self.paths.is_empty() && !self.paths.iter().any(|p| path_matches(&path, case.id(), p)) {
            return false;
        }
        if let Some(keyword) = &self.keyword
            && !(keyword.is_match(case.id())
                || keyword.is_match(case.title())
                || keyword.is_match(&path))
        {
            return false;
        }
        let mut markers = case.markers();
        markers.push(case.suite());
        self.markers.matches(&markers)
    }
}

fn path_matches(path: &str, id: &str, wanted: &str) -> bool {
    let wanted = wanted.trim().trim_end_matches('/').trim_end_matches(".rs");
    path == wanted
        || id == wanted
        || path.starts_with(&format!("{wanted}/"))
        || path.starts_with(&format!("{wanted}::"))
}

/// How a case ended before outcome resolution.
#[derive(Debug)]
pub enum CaseResult {
    Report(CaseReport),
    Error(CaseError),
    Panicked(String),
    TimedOut(Duration),
}

/// Final status of a case, with the reason for anything but a clean pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: OutcomeStatus,
    pub message: Option<String>,
    pub defect_id: Option<String>,
}

impl Resolution {
    fn new(status: OutcomeStatus, message: Option<String>, defect_id: Option<String>) -> Self {
        Self {
            status,
            message,
            defect_id,
        }
    }
}

/// Maps what a case observed to its final status.
///
/// | Observation | Registry | Status |
/// |-------------|----------|--------|
/// | failed assertion or error | - | failed |
/// | reproduced | open | expected_failure |
/// | not reproduced | open | failed (defect looks fixed) |
/// | reproduced | resolved | failed (regression) |
/// | not reproduced | resolved | passed |
/// | unknown defect id | - | failed |
pub fn resolve_outcome(
    result: &CaseResult,
    known_defect: Option<&str>,
    registry: &DefectRegistry,
) -> Resolution {
    let defect_id = known_defect.map(str::to_string);
    let report = match result {
        CaseResult::Report(report) => report,
        CaseResult::Error(CaseError::Skip(reason)) => {
            return Resolution::new(OutcomeStatus::Skipped, Some(reason.clone()), defect_id);
        }
        CaseResult::Error(e) => {
            return Resolution::new(OutcomeStatus::Failed, Some(e.to_string()), defect_id);
        }
        CaseResult::Panicked(msg) => {
            return Resolution::new(
                OutcomeStatus::Failed,
                Some(format!("test panicked: {msg}")),
                defect_id,
            );
        }
        CaseResult::TimedOut(limit) => {
            return Resolution::new(
                OutcomeStatus::Failed,
                Some(format!("test exceeded its {}ms timeout", limit.as_millis())),
                defect_id,
            );
        }
    };

    if let Some(failed) = report.first_failure() {
        let message = format!(
            "{}: expected {}, got {}",
            failed.name, failed.expected, failed.actual
        );
        let defect_id = report
            .defect
            .as_ref()
            .map(|d| d.defect_id.clone())
            .or(defect_id);
        return Resolution::new(OutcomeStatus::Failed, Some(message), defect_id);
    }

    let Some(observation) = &report.defect else {
        return Resolution::new(OutcomeStatus::Passed, None, defect_id);
    };
    let id = Some(observation.defect_id.clone());
    let Some(defect) = registry.lookup(&observation.defect_id) else {
        return Resolution::new(
            OutcomeStatus::Failed,
            Some(format!(
                "{} is not in the defect registry",
                observation.defect_id
            )),
            id,
        );
    };

    match (defect.status, observation.reproduced) {
        (DefectStatus::Open, true) => Resolution::new(
            OutcomeStatus::ExpectedFailure,
            Some(format!(
                "{} still reproduces: {}",
                defect.id, observation.evidence
            )),
            id,
        ),
        (DefectStatus::Open, false) => Resolution::new(
            OutcomeStatus::Failed,
            Some(format!(
                "{} no longer reproduces ({}); mark it resolved in the registry",
                defect.id, observation.evidence
            )),
            id,
        ),
        (DefectStatus::Resolved, true) => Resolution::new(
            OutcomeStatus::Failed,
            Some(format!(
                "regression: resolved defect {} reproduced: {}",
                defect.id, observation.evidence
            )),
            id,
        ),
        (DefectStatus::Resolved, false) => Resolution::new(OutcomeStatus::Passed, None, id),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// File-safe form of a test id.
pub fn artifact_name(test_id: &str) -> String {
    test_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Shared, read-only state handed to every test task.
struct RunEnv {
    config: Arc<RunConfiguration>,
    provider: Arc<SessionProvider>,
    api: ApiClient,
    registry: Arc<DefectRegistry>,
    events: mpsc::UnboundedSender<RunEvent>,
}

impl RunEnv {
    fn emit(&self, event: RunEvent) {
        // The sink only goes away after the run completes.
        let _ = self.events.send(event);
    }

    fn outcome(
        case: &dyn TestCase,
        resolution: Resolution,
        duration: Duration,
    ) -> TestOutcome {
        TestOutcome {
            test_id: case.id().to_string(),
            title: case.title().to_string(),
            suite: case.suite().to_string(),
            status: resolution.status,
            duration,
            console_errors: Vec::new(),
            screenshot: None,
            assertions: Vec::new(),
            attachments: Vec::new(),
            defect_id: resolution.defect_id,
            message: resolution.message,
            markers: case.markers().into_iter().map(str::to_string).collect(),
        }
    }

    /// Runs one case start to finish. Never fails: every exit path becomes
    /// an outcome and the session is always released.
    async fn execute(&self, case: &dyn TestCase) -> TestOutcome {
        let test_id = case.id().to_string();
        self.emit(RunEvent::TestStarted {
            test_id: test_id.clone(),
            title: case.title().to_string(),
            suite: case.suite().to_string(),
        });
        info!(test_id = %test_id, title = case.title(), "Test started");
        let start = Instant::now();

        let session = if case.needs_browser() {
            match self.provider.acquire(&test_id).await {
                Ok(session) => Some(session),
                Err(e) => {
                    error!(test_id = %test_id, error = %e, "Browser session failed to start");
                    let resolution = Resolution::new(
                        OutcomeStatus::Failed,
                        Some(e.to_string()),
                        case.known_defect().map(str::to_string),
                    );
                    let outcome = Self::outcome(case, resolution, start.elapsed());
                    self.emit(RunEvent::TestCompleted {
                        outcome: outcome.clone(),
                    });
                    return outcome;
                }
            }
        } else {
            None
        };

        let mut ctx = TestContext::new(
            test_id.clone(),
            Arc::clone(&self.config),
            session,
            self.api.clone(),
            Arc::clone(&self.registry),
        );

        let limit = self.config.test_timeout;
        let run = AssertUnwindSafe(case.run(&mut ctx)).catch_unwind();
        let result = match tokio::time::timeout(limit, run).await {
            Ok(Ok(Ok(report))) => CaseResult::Report(report),
            Ok(Ok(Err(e))) => CaseResult::Error(e),
            Ok(Err(payload)) => CaseResult::Panicked(panic_message(payload.as_ref())),
            Err(_) => CaseResult::TimedOut(limit),
        };

        let resolution = resolve_outcome(&result, case.known_defect(), &self.registry);
        let mut outcome = Self::outcome(case, resolution, Duration::ZERO);
        if let CaseResult::Report(report) = result {
            outcome.assertions = report.assertions;
            outcome.attachments = report.attachments;
        }

        if let Some(mut session) = ctx.take_session() {
            self.collect_artifacts(&mut session, &mut outcome).await;
            self.provider.release(session).await;
        }
        outcome.duration = start.elapsed();

        match outcome.status {
            OutcomeStatus::Failed => error!(
                test_id = %test_id,
                message = outcome.message.as_deref().unwrap_or(""),
                duration_ms = outcome.duration_ms(),
                "Test failed"
            ),
            OutcomeStatus::Skipped => info!(
                test_id = %test_id,
                reason = outcome.message.as_deref().unwrap_or(""),
                "Test skipped"
            ),
            status => info!(
                test_id = %test_id,
                %status,
                duration_ms = outcome.duration_ms(),
                "Test completed"
            ),
        }

        let event = if outcome.status == OutcomeStatus::Skipped {
            RunEvent::TestSkipped {
                outcome: outcome.clone(),
            }
        } else {
            RunEvent::TestCompleted {
                outcome: outcome.clone(),
            }
        };
        self.emit(event);
        outcome
    }

    /// Console errors always; a screenshot when the test failed.
    async fn collect_artifacts(&self, session: &mut BrowserSession, outcome: &mut TestOutcome) {
        match session.console_errors().await {
            Ok(errors) => outcome.console_errors = errors,
            Err(e) => warn!(test_id = %outcome.test_id, error = %e, "Could not read console"),
        }

        if outcome.status != OutcomeStatus::Failed {
            return;
        }
        let path = self
            .config
            .screenshots_dir()
            .join(format!("{}.png", artifact_name(&outcome.test_id)));
        match session.screenshot(&path).await {
            Ok(()) => {
                debug!(test_id = %outcome.test_id, path = %path.display(), "Failure screenshot saved");
                outcome
                    .attachments
                    .push(Attachment::screenshot("failure screenshot", &path));
                outcome.screenshot = Some(path);
            }
            Err(e) => warn!(test_id = %outcome.test_id, error = %e, "Failure screenshot not captured"),
        }
    }
}

/// Orchestrates case execution and reporting.
pub struct TestRunner {
    config: Arc<RunConfiguration>,
    provider: Arc<SessionProvider>,
    api: ApiClient,
    registry: Arc<DefectRegistry>,
    cases: Vec<Arc<dyn TestCase>>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl TestRunner {
    pub fn new(
        config: Arc<RunConfiguration>,
        driver: Arc<dyn BrowserDriver>,
        registry: Arc<DefectRegistry>,
        cases: Vec<Arc<dyn TestCase>>,
    ) -> Result<Self, RunnerError> {
        let api = ApiClient::from_config(&config)?;
        let provider = Arc::new(SessionProvider::new(driver, Arc::clone(&config)));
        Ok(Self {
            config,
            provider,
            api,
            registry,
            cases,
            sinks: Vec::new(),
        })
    }

    /// Replaces the API client, e.g. to point at a local server.
    pub fn with_api_client(mut self, api: ApiClient) -> Self {
        self.api = api;
        self
    }

    pub fn add_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn provider(&self) -> Arc<SessionProvider> {
        Arc::clone(&self.provider)
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Cases matching `selection`, in registration order.
    pub fn matching_cases(&self, selection: &Selection) -> Vec<Arc<dyn TestCase>> {
        self.cases
            .iter()
            .filter(|c| selection.matches(c.as_ref()))
            .cloned()
            .collect()
    }

    /// Runs every matching case. Reporters registered with
    /// [`TestRunner::add_sink`] are consumed by the run.
    pub async fn run(&mut self, selection: &Selection) -> Result<RunResults, RunnerError> {
        let selected = self.matching_cases(selection);
        if selected.is_empty() && selection.is_filtered() {
            return Err(RunnerError::NoMatchingTests(selection.describe()));
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let (events, sink_task) = spawn_sink(std::mem::take(&mut self.sinks));
        let env = Arc::new(RunEnv {
            config: Arc::clone(&self.config),
            provider: Arc::clone(&self.provider),
            api: self.api.clone(),
            registry: Arc::clone(&self.registry),
            events,
        });

        let workers = self.config.parallel_workers.max(1);
        env.emit(RunEvent::RunStarted {
            total: selected.len(),
            workers,
        });
        info!(
            total = selected.len(),
            workers,
            driver = self.provider.driver_name(),
            browser = %self.config.browser,
            "Run started"
        );

        let (serial, parallel): (Vec<_>, Vec<_>) = selected
            .iter()
            .cloned()
            .enumerate()
            .partition(|(_, case)| case.is_serial());

        let mut outcomes: Vec<(usize, TestOutcome)> = Vec::with_capacity(selected.len());

        let permits = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(parallel.len());
        for (index, case) in parallel {
            let env = Arc::clone(&env);
            let permits = Arc::clone(&permits);
            let task_case = Arc::clone(&case);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                env.execute(task_case.as_ref()).await
            });
            handles.push((index, case, handle));
        }
        for (index, case, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(test_id = case.id(), error = %e, "Test task aborted");
                    let outcome = RunEnv::outcome(
                        case.as_ref(),
                        Resolution::new(
                            OutcomeStatus::Failed,
                            Some(format!("test task aborted: {e}")),
                            case.known_defect().map(str::to_string),
                        ),
                        Duration::ZERO,
                    );
                    env.emit(RunEvent::TestCompleted {
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            };
            outcomes.push((index, outcome));
        }

        for (index, case) in serial {
            debug!(test_id = case.id(), "Running serial test");
            outcomes.push((index, env.execute(case.as_ref()).await));
        }

        outcomes.sort_by_key(|(index, _)| *index);
        let results = RunResults {
            outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
            duration: start.elapsed(),
            started_at,
            browser: self.config.browser.to_string(),
            driver: self.provider.driver_name().to_string(),
            base_url: self.config.base_url.to_string(),
            leaked_sessions: self.provider.active_sessions(),
        };

        if results.leaked_sessions > 0 {
            error!(leaked = results.leaked_sessions, "Browser sessions leaked");
        }
        info!(
            passed = results.passed_count(),
            failed = results.failed_count(),
            expected_failures = results.expected_failure_count(),
            skipped = results.skipped_count(),
            duration_ms = results.duration.as_millis() as u64,
            "Run completed"
        );

        env.emit(RunEvent::RunCompleted {
            results: results.clone(),
        });
        drop(env);
        if let Err(e) = sink_task.await {
            warn!(error = %e, "Report sink task failed");
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::SERIAL_MARKER;
    use crate::defects::DEF_001;
    use crate::report::ReporterError;
    use crate::testing::SimulatedDriver;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behaviour {
        Pass,
        FailAssertion,
        Panic,
        Hang,
        Skip,
        Reproduce(bool),
    }

    struct MockCase {
        id: String,
        markers: Vec<&'static str>,
        behaviour: Behaviour,
        browser: bool,
        running: Option<Arc<AtomicUsize>>,
        peak: Option<Arc<AtomicUsize>>,
    }

    impl MockCase {
        fn new(id: &str, behaviour: Behaviour) -> Self {
            Self {
                id: id.to_string(),
                markers: Vec::new(),
                behaviour,
                browser: true,
                running: None,
                peak: None,
            }
        }

        fn with_markers(mut self, markers: &[&'static str]) -> Self {
            self.markers = markers.to_vec();
            self
        }

        fn tracking(mut self, running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Self {
            self.running = Some(Arc::clone(running));
            self.peak = Some(Arc::clone(peak));
            self
        }
    }

    #[async_trait]
    impl TestCase for MockCase {
        fn id(&self) -> &str {
            &self.id
        }

        fn title(&self) -> &str {
            "Mock case"
        }

        fn suite(&self) -> &str {
            "mock"
        }

        fn markers(&self) -> Vec<&str> {
            self.markers.clone()
        }

        fn needs_browser(&self) -> bool {
            self.browser
        }

        async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
            if let (Some(running), Some(peak)) = (&self.running, &self.peak) {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
            if self.browser {
                ctx.discover_page()?.open("/").await?;
            }
            let mut report = CaseReport::new();
            match self.behaviour {
                Behaviour::Pass => {
                    report.check("ok", true, "true", "true");
                }
                Behaviour::FailAssertion => {
                    report.check("result count", false, "> 0", "0");
                }
                Behaviour::Panic => panic!("boom in {}", self.id),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Behaviour::Skip => return Err(CaseError::skip("no API key")),
                Behaviour::Reproduce(reproduced) => {
                    report.observe_defect(DEF_001, reproduced, "404 page");
                }
            }
            Ok(report)
        }
    }

    #[derive(Clone, Default)]
    struct Collector(Arc<Mutex<Vec<String>>>);

    impl EventSink for Collector {
        fn name(&self) -> &str {
            "collector"
        }

        fn handle(&mut self, event: &RunEvent) -> Result<(), ReporterError> {
            let label = match event {
                RunEvent::RunStarted { .. } => "run_started".to_string(),
                RunEvent::TestStarted { test_id, .. } => format!("started:{test_id}"),
                RunEvent::TestCompleted { outcome } => format!("completed:{}", outcome.test_id),
                RunEvent::TestSkipped { outcome } => format!("skipped:{}", outcome.test_id),
                RunEvent::RunCompleted { .. } => "run_completed".to_string(),
            };
            self.0.lock().unwrap().push(label);
            Ok(())
        }
    }

    fn config(dir: &std::path::Path) -> RunConfiguration {
        RunConfiguration {
            reports_dir: dir.to_path_buf(),
            parallel_workers: 2,
            test_timeout: Duration::from_millis(500),
            navigation_timeout: Duration::from_millis(500),
            action_timeout: Duration::from_millis(200),
            ..RunConfiguration::default()
        }
    }

    fn runner(config: RunConfiguration, cases: Vec<MockCase>) -> TestRunner {
        TestRunner::new(
            Arc::new(config),
            Arc::new(SimulatedDriver::new()),
            Arc::new(DefectRegistry::builtin()),
            cases
                .into_iter()
                .map(|c| Arc::new(c) as Arc<dyn TestCase>)
                .collect(),
        )
        .unwrap()
    }

    fn report_with(reproduced: bool) -> CaseResult {
        let mut report = CaseReport::new();
        report.observe_defect(DEF_001, reproduced, "404 page");
        CaseResult::Report(report)
    }

    #[test]
    fn test_resolution_table() {
        let open = DefectRegistry::builtin();
        let resolved = DefectRegistry::builtin().with_status(DEF_001, DefectStatus::Resolved);

        let status = |result: &CaseResult, registry: &DefectRegistry| {
            resolve_outcome(result, Some(DEF_001), registry).status
        };
        assert_eq!(status(&report_with(true), &open), OutcomeStatus::ExpectedFailure);
        assert_eq!(status(&report_with(false), &open), OutcomeStatus::Failed);
        assert_eq!(status(&report_with(true), &resolved), OutcomeStatus::Failed);
        assert_eq!(status(&report_with(false), &resolved), OutcomeStatus::Passed);
    }

    #[test]
    fn test_resolution_messages() {
        let open = DefectRegistry::builtin();
        let fixed = resolve_outcome(&report_with(false), None, &open);
        assert!(fixed.message.unwrap().contains("mark it resolved"));
        assert_eq!(fixed.defect_id.as_deref(), Some(DEF_001));

        let mut report = CaseReport::new();
        report.observe_defect("DEF-999", true, "?");
        let unknown = resolve_outcome(&CaseResult::Report(report), None, &open);
        assert_eq!(unknown.status, OutcomeStatus::Failed);
        assert!(unknown.message.unwrap().contains("DEF-999"));
    }

    #[test]
    fn test_failed_assertion_beats_defect_observation() {
        let mut report = CaseReport::new();
        report
            .check("banner", false, "visible", "hidden")
            .observe_defect(DEF_001, true, "404 page");
        let resolution =
            resolve_outcome(&CaseResult::Report(report), None, &DefectRegistry::builtin());
        assert_eq!(resolution.status, OutcomeStatus::Failed);
        assert!(resolution.message.unwrap().starts_with("banner"));
    }

    #[test]
    fn test_errors_panics_and_timeouts_fail() {
        let registry = DefectRegistry::builtin();
        let panicked = resolve_outcome(&CaseResult::Panicked("boom".into()), None, &registry);
        assert_eq!(panicked.status, OutcomeStatus::Failed);
        let timed_out = resolve_outcome(
            &CaseResult::TimedOut(Duration::from_secs(1)),
            None,
            &registry,
        );
        assert!(timed_out.message.unwrap().contains("1000ms"));
        let skipped = resolve_outcome(
            &CaseResult::Error(CaseError::skip("no key")),
            None,
            &registry,
        );
        assert_eq!(skipped.status, OutcomeStatus::Skipped);
    }

    #[test]
    fn test_selection_by_path_keyword_and_marker() {
        let case = MockCase::new("TC-035", Behaviour::Pass).with_markers(&["regression"]);
        let mut selection = Selection::default();
        assert!(selection.matches(&case));

        selection.paths = vec!["mock".to_string()];
        assert!(selection.matches(&case));
        selection.paths = vec!["functional".to_string()];
        assert!(!selection.matches(&case));
        selection.paths = vec!["TC-035".to_string()];
        assert!(selection.matches(&case));

        let mut selection = Selection {
            keyword: Some(Selection::keyword("tc-03").unwrap()),
            ..Selection::default()
        };
        assert!(selection.matches(&case));
        selection.markers.exclude.insert("regression".to_string());
        assert!(!selection.matches(&case));

        let by_suite = Selection {
            markers: MarkerFilter {
                include: ["mock".to_string()].into(),
                ..MarkerFilter::default()
            },
            ..Selection::default()
        };
        assert!(by_suite.matches(&case));
    }

    #[test]
    fn test_artifact_name_is_file_safe() {
        assert_eq!(artifact_name("TC-035"), "TC-035");
        assert_eq!(artifact_name("api/scenario C"), "api_scenario_C");
    }

    #[tokio::test]
    async fn test_run_mixed_outcomes_releases_every_session() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::default();
        let mut runner = runner(
            config(dir.path()),
            vec![
                MockCase::new("pass", Behaviour::Pass),
                MockCase::new("fail", Behaviour::FailAssertion),
                MockCase::new("panic", Behaviour::Panic),
                MockCase::new("hang", Behaviour::Hang),
                MockCase::new("skip", Behaviour::Skip),
                MockCase::new("def", Behaviour::Reproduce(true)),
            ],
        )
        .add_sink(collector.clone());
        let provider = runner.provider();

        let results = runner.run(&Selection::default()).await.unwrap();

        let status_of = |id: &str| {
            results
                .outcomes
                .iter()
                .find(|o| o.test_id == id)
                .map(|o| o.status)
                .unwrap()
        };
        assert_eq!(status_of("pass"), OutcomeStatus::Passed);
        assert_eq!(status_of("fail"), OutcomeStatus::Failed);
        assert_eq!(status_of("panic"), OutcomeStatus::Failed);
        assert_eq!(status_of("hang"), OutcomeStatus::Failed);
        assert_eq!(status_of("skip"), OutcomeStatus::Skipped);
        assert_eq!(status_of("def"), OutcomeStatus::ExpectedFailure);

        assert_eq!(results.exit_code(), 1);
        assert_eq!(results.leaked_sessions, 0);
        assert_eq!(provider.active_sessions(), 0);
        assert_eq!(provider.total_acquired(), 6);

        let failed = results.outcomes.iter().find(|o| o.test_id == "fail").unwrap();
        let screenshot = failed.screenshot.as_ref().unwrap();
        assert!(screenshot.exists());
        assert_eq!(results.outcomes[0].test_id, "pass");

        let events = collector.0.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("run_started"));
        assert_eq!(events.last().map(String::as_str), Some("run_completed"));
        assert!(events.contains(&"skipped:skip".to_string()));
        assert_eq!(events.len(), 2 + 6 * 2);
    }

    #[tokio::test]
    async fn test_workers_bound_concurrency_and_serial_runs_alone() {
        let dir = tempfile::tempdir().unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut cases: Vec<MockCase> = (0..6)
            .map(|i| {
                let mut case = MockCase::new(&format!("p{i}"), Behaviour::Pass).tracking(&running, &peak);
                case.browser = false;
                case
            })
            .collect();
        let mut serial = MockCase::new("s0", Behaviour::Pass)
            .with_markers(&[SERIAL_MARKER])
            .tracking(&running, &peak);
        serial.browser = false;
        cases.push(serial);

        let mut runner = runner(config(dir.path()), cases);
        let results = runner.run(&Selection::default()).await.unwrap();

        assert_eq!(results.passed_count(), 7);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(results.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_session_start_failure_fails_only_that_test() {
        let dir = tempfile::tempdir().unwrap();
        let mut api_only = MockCase::new("api", Behaviour::Pass);
        api_only.browser = false;
        let mut runner = TestRunner::new(
            Arc::new(config(dir.path())),
            Arc::new(SimulatedDriver::new().failing_launch("webkit not installed")),
            Arc::new(DefectRegistry::builtin()),
            vec![
                Arc::new(MockCase::new("ui", Behaviour::Pass)) as Arc<dyn TestCase>,
                Arc::new(api_only),
            ],
        )
        .unwrap();

        let results = runner.run(&Selection::default()).await.unwrap();
        assert_eq!(results.failed_count(), 1);
        assert_eq!(results.passed_count(), 1);
        let ui = &results.outcomes[0];
        assert!(ui.message.as_deref().unwrap().contains("webkit not installed"));
    }

    #[tokio::test]
    async fn test_unmatched_selection_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner(config(dir.path()), vec![MockCase::new("a", Behaviour::Pass)]);
        let selection = Selection {
            paths: vec!["negative".to_string()],
            ..Selection::default()
        };
        let err = runner.run(&selection).await.unwrap_err();
        assert!(matches!(err, RunnerError::NoMatchingTests(_)));
    }
}
