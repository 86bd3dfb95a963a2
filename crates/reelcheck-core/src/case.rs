//! Test cases and the context they run in.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         TestCase                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  metadata  → id, title, suite, path, markers, known_defect   │
//! │  run(ctx)  → drives pages / API client, returns CaseReport   │
//! └──────────────────────────────────────────────────────────────┘
//!                  │ CaseReport { assertions, attachments, defect }
//!                  ▼
//!          runner resolves it against the DefectRegistry
//! ```
//!
//! A case never decides its own final status: it records what it observed
//! and the runner turns that into a [`crate::models::OutcomeStatus`].

use crate::api::{ApiClient, ApiError};
use crate::browser::{BrowserSession, InteractionError};
use crate::config::RunConfiguration;
use crate::defects::DefectRegistry;
use crate::filters::FilterError;
use crate::models::{Assertion, Attachment};
use crate::pages::{BasePage, DiscoverPage, PageError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Marker that forces a case to run after the parallel batch, alone.
pub const SERIAL_MARKER: &str = "serial";

/// Errors that end a case early.
#[derive(Debug, Error)]
pub enum CaseError {
    /// The case decided not to run, e.g. missing API credentials.
    #[error("skipped: {0}")]
    Skip(String),

    #[error(transparent)]
    Interaction(#[from] InteractionError),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("case needs a browser session but none was acquired")]
    NoBrowser,

    #[error("{0}")]
    Other(String),
}

impl CaseError {
    pub fn skip(reason: impl Into<String>) -> Self {
        CaseError::Skip(reason.into())
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            CaseError::Interaction(e) => e.is_timeout(),
            CaseError::Page(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// What a case saw of the known defect it characterises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectObservation {
    pub defect_id: String,
    /// The documented symptom showed up.
    pub reproduced: bool,
    /// What was actually observed.
    pub evidence: String,
}

/// Everything a case recorded while running.
#[derive(Debug, Clone, Default)]
pub struct CaseReport {
    pub assertions: Vec<Assertion>,
    pub attachments: Vec<Attachment>,
    pub defect: Option<DefectObservation>,
}

impl CaseReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assert(&mut self, assertion: Assertion) -> &mut Self {
        self.assertions.push(assertion);
        self
    }

    /// Records a named check.
    pub fn check(
        &mut self,
        name: impl Into<String>,
        passed: bool,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> &mut Self {
        self.assert(Assertion {
            name: name.into(),
            passed,
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    pub fn attach(&mut self, attachment: Attachment) -> &mut Self {
        self.attachments.push(attachment);
        self
    }

    /// Records whether `defect_id` reproduced.
    pub fn observe_defect(
        &mut self,
        defect_id: impl Into<String>,
        reproduced: bool,
        evidence: impl Into<String>,
    ) -> &mut Self {
        self.defect = Some(DefectObservation {
            defect_id: defect_id.into(),
            reproduced,
            evidence: evidence.into(),
        });
        self
    }

    pub fn all_passed(&self) -> bool {
        self.assertions.iter().all(|a| a.passed)
    }

    pub fn first_failure(&self) -> Option<&Assertion> {
        self.assertions.iter().find(|a| !a.passed)
    }
}

/// Builder for creating assertions with a fluent API.
#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    name: String,
    expected: String,
    actual: String,
    passed: bool,
}

impl AssertionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: String::new(),
            actual: String::new(),
            passed: false,
        }
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = expected.into();
        self
    }

    pub fn actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = actual.into();
        self
    }

    /// Sets the pass flag from a condition.
    pub fn holds(mut self, condition: bool) -> Self {
        self.passed = condition;
        self
    }

    pub fn build(self) -> Assertion {
        Assertion {
            name: self.name,
            passed: self.passed,
            expected: self.expected,
            actual: self.actual,
        }
    }
}

/// Per-case view of the run: configuration, the case's own browser session,
/// the API client and the defect registry.
pub struct TestContext {
    test_id: String,
    config: Arc<RunConfiguration>,
    session: Option<BrowserSession>,
    api: ApiClient,
    registry: Arc<DefectRegistry>,
}

impl TestContext {
    pub fn new(
        test_id: impl Into<String>,
        config: Arc<RunConfiguration>,
        session: Option<BrowserSession>,
        api: ApiClient,
        registry: Arc<DefectRegistry>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            config,
            session,
            api,
            registry,
        }
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn registry(&self) -> &DefectRegistry {
        &self.registry
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&mut self) -> Result<&mut BrowserSession, CaseError> {
        self.session.as_mut().ok_or(CaseError::NoBrowser)
    }

    pub fn base_page(&mut self) -> Result<BasePage<'_>, CaseError> {
        let session = self.session.as_mut().ok_or(CaseError::NoBrowser)?;
        Ok(BasePage::new(session, &self.config))
    }

    /// A Discover page object bound to this case's session.
    pub fn discover_page(&mut self) -> Result<DiscoverPage<'_>, CaseError> {
        let session = self.session.as_mut().ok_or(CaseError::NoBrowser)?;
        Ok(DiscoverPage::new(session, &self.config))
    }

    /// Hands the session back to the runner for release.
    pub fn take_session(&mut self) -> Option<BrowserSession> {
        self.session.take()
    }
}

/// A single test.
#[async_trait]
pub trait TestCase: Send + Sync {
    /// Stable identifier, e.g. `TC-035`.
    fn id(&self) -> &str;

    fn title(&self) -> &str;

    /// Suite name: `functional`, `negative` or `api`.
    fn suite(&self) -> &str;

    /// Source module within the suite, e.g. `combined_filters`.
    fn module(&self) -> Option<&str> {
        None
    }

    /// Selection path: `<suite>/<module>::<id>`, or `<suite>::<id>` without
    /// a module.
    fn path(&self) -> String {
        match self.module() {
            Some(module) => format!("{}/{}::{}", self.suite(), module, self.id()),
            None => format!("{}::{}", self.suite(), self.id()),
        }
    }

    fn markers(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Defect this case characterises, if any.
    fn known_defect(&self) -> Option<&str> {
        None
    }

    fn needs_browser(&self) -> bool {
        true
    }

    fn is_serial(&self) -> bool {
        self.markers().contains(&SERIAL_MARKER)
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Probe;

    #[async_trait]
    impl TestCase for Probe {
        fn id(&self) -> &str {
            "TC-900"
        }

        fn title(&self) -> &str {
            "Probe"
        }

        fn suite(&self) -> &str {
            "functional"
        }

        fn markers(&self) -> Vec<&str> {
            vec!["smoke", SERIAL_MARKER]
        }

        async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
            ctx.discover_page()?;
            Ok(CaseReport::new())
        }
    }

    fn context() -> TestContext {
        let config = Arc::new(RunConfiguration::default());
        let api = ApiClient::new("http://127.0.0.1:9/3", None, Duration::from_secs(1)).unwrap();
        TestContext::new(
            "TC-900",
            config,
            None,
            api,
            Arc::new(DefectRegistry::builtin()),
        )
    }

    #[test]
    fn test_default_metadata() {
        let probe = Probe;
        assert_eq!(probe.path(), "functional::TC-900");
        assert!(probe.is_serial());
        assert!(probe.known_defect().is_none());
        assert!(probe.needs_browser());
    }

    #[tokio::test]
    async fn test_page_without_session_is_an_error() {
        let mut ctx = context();
        let err = Probe.run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, CaseError::NoBrowser));
    }

    #[test]
    fn test_report_tracks_failures_and_defects() {
        let mut report = CaseReport::new();
        report
            .check("results shown", true, "> 0", "20")
            .assert(
                AssertionBuilder::new("no console errors")
                    .expected("0")
                    .actual("1")
                    .holds(false)
                    .build(),
            )
            .observe_defect("DEF-001", true, "404 page");

        assert!(!report.all_passed());
        assert_eq!(report.first_failure().unwrap().name, "no console errors");
        assert!(report.defect.as_ref().unwrap().reproduced);
    }

    #[test]
    fn test_timeout_errors_are_recognised() {
        let err = CaseError::from(InteractionError::Timeout {
            action: "spinner".to_string(),
            timeout: Duration::from_millis(10),
        });
        assert!(err.is_timeout());
        assert!(!CaseError::skip("no key").is_timeout());
    }
}
