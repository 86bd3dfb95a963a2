//! Browser drivers and per-test sessions.
//!
//! A [`BrowserDriver`] launches one isolated browser context per test and
//! hands back a [`BrowserHandle`]. Handles answer immediately: waiting for
//! the UI to settle is done above them, in [`wait`] and the page objects.
//!
//! ```text
//! SessionProvider ──acquire──▶ BrowserDriver::launch ──▶ Box<dyn BrowserHandle>
//!        │                                                     │
//!        └────────────── BrowserSession (one per test) ◀───────┘
//! ```

mod bridge;
mod session;
pub mod wait;

pub use bridge::PlaywrightBridgeDriver;
pub use session::{BrowserSession, SessionProvider};

use crate::config::BrowserKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// A browser could not be started. Fatal to the current test only.
#[derive(Debug, Error)]
#[error("failed to start {browser} session: {reason}")]
pub struct SessionStartError {
    pub browser: BrowserKind,
    pub reason: String,
}

impl SessionStartError {
    pub fn new(browser: BrowserKind, reason: impl Into<String>) -> Self {
        Self {
            browser,
            reason: reason.into(),
        }
    }
}

/// Errors from a single browser interaction.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The UI did not reach the expected state in time.
    #[error("timed out after {}ms waiting for {action}", timeout.as_millis())]
    Timeout { action: String, timeout: Duration },

    /// The driver reported a failure other than a timeout.
    #[error("browser interaction failed: {0}")]
    Driver(String),

    /// The session was already released.
    #[error("browser session is closed")]
    Closed,
}

impl InteractionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InteractionError::Timeout { .. })
    }
}

/// Element states a page can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Present and rendered.
    Visible,
    /// Absent or not rendered.
    Hidden,
    /// Present in the DOM.
    Attached,
    /// Absent from the DOM.
    Detached,
}

impl std::fmt::Display for ElementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElementState::Visible => "visible",
            ElementState::Hidden => "hidden",
            ElementState::Attached => "attached",
            ElementState::Detached => "detached",
        };
        f.write_str(s)
    }
}

/// Parameters for launching a browser context.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub browser: BrowserKind,
    pub headless: bool,
    pub base_url: String,
    /// Requests whose URL starts with this prefix are recorded for
    /// network capture.
    pub api_base_url: String,
    pub navigation_timeout: Duration,
    pub action_timeout: Duration,
}

/// A browser console message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// `error`, `warning`, `info`, `log` or `debug`.
    pub level: String,
    pub text: String,
}

impl ConsoleMessage {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: "error".to_string(),
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == "error"
    }
}

/// A data request made by the page, with its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkExchange {
    pub method: String,
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub body: String,
    pub timestamp: String,
}

/// Rendered text and attributes of one matched element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Launches browser contexts.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Starts a new isolated context with one open page.
    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserHandle>, SessionStartError>;
}

/// One browser context with one page.
///
/// Every call answers from the current rendered state; none of them wait for
/// the UI to change. `goto`, `click`, `fill` and `select` may use `timeout`
/// for the driver's own actionability checks.
#[async_trait]
pub trait BrowserHandle: Send {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), InteractionError>;

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), InteractionError>;

    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), InteractionError>;

    async fn select(
        &mut self,
        selector: &str,
        values: &[String],
        timeout: Duration,
    ) -> Result<(), InteractionError>;

    /// Text of the first match, `None` when nothing matches.
    async fn text(&mut self, selector: &str) -> Result<Option<String>, InteractionError>;

    async fn count(&mut self, selector: &str) -> Result<usize, InteractionError>;

    async fn is_visible(&mut self, selector: &str) -> Result<bool, InteractionError>;

    async fn snapshot(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, InteractionError>;

    async fn url(&mut self) -> Result<String, InteractionError>;

    async fn reload(&mut self, timeout: Duration) -> Result<(), InteractionError>;

    async fn screenshot(&mut self, path: &Path) -> Result<(), InteractionError>;

    /// Console messages since the last call.
    async fn drain_console(&mut self) -> Result<Vec<ConsoleMessage>, InteractionError>;

    /// Data exchanges since the last call.
    async fn drain_network(&mut self) -> Result<Vec<NetworkExchange>, InteractionError>;

    /// Closes the context. Must be safe to call on an already-broken context.
    async fn close(&mut self) -> Result<(), InteractionError>;
}
