//! # reelcheck-core
//!
//! Test-orchestration core for browser QA of the Discover movie app.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ ConfigResolver   │──▶│ TestRunner       │──▶│ SessionProvider  │
//! └──────────────────┘   └──────────────────┘   └──────────────────┘
//!                               │    │                   │
//!                     RunEvent  │    ▼                   ▼
//!                               │  TestCase ──▶ DiscoverPage / ApiClient
//!                               ▼
//!                      ┌──────────────────┐
//!                      │ sink task        │ terminal, jsonl, allure,
//!                      └──────────────────┘ report.json + HTML
//! ```
//!
//! ## Modules
//!
//! - `config`: run configuration from flags, env, YAML and defaults
//! - `browser`: driver trait, per-test sessions, Playwright bridge
//! - `pages`: page objects for the Discover UI
//! - `filters`: filter state and its validation
//! - `api`: data API client and browser network capture
//! - `case`: the `TestCase` trait and its context
//! - `defects`: known-defect registry
//! - `runner`: selection, parallel execution, outcome resolution
//! - `report`: reporters consuming run events
//! - `logging`: leveled log files and console output
//! - `testing`: simulated Discover app and data API for offline runs

pub mod api;
pub mod browser;
pub mod case;
pub mod config;
pub mod defects;
pub mod filters;
pub mod logging;
pub mod models;
pub mod pages;
pub mod report;
pub mod runner;
pub mod testing;

/// Crate version, recorded in reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::api::{ApiClient, ApiError, ApiResponse, NetworkCapture, validate_shape};
pub use crate::browser::{
    BrowserDriver, BrowserSession, ElementState, InteractionError, PlaywrightBridgeDriver,
    SessionProvider, SessionStartError,
};
pub use crate::case::{
    AssertionBuilder, CaseError, CaseReport, SERIAL_MARKER, TestCase, TestContext,
};
pub use crate::config::{
    BrowserKind, ConfigOverrides, ConfigResolver, ConfigurationError, DriverKind, MarkerFilter,
    RunConfiguration,
};
pub use crate::defects::{DEF_001, DEF_002, DefectRegistry, DefectStatus, KnownDefect, Severity};
pub use crate::filters::{Category, FilterError, FilterState, MediaType};
pub use crate::logging::Verbosity;
pub use crate::models::{Assertion, Attachment, AttachmentKind, OutcomeStatus, TestOutcome};
pub use crate::pages::{
    BasePage, ChangeMark, DiscoverPage, PageError, PaginationState, ResultItem,
};
pub use crate::report::{
    AllureWriter, EventSink, HtmlReporter, JsonReporter, JsonlWriter, ReportWriter, ReporterError,
    TerminalReporter,
};
pub use crate::runner::{RunEvent, RunResults, RunnerError, Selection, TestRunner};
