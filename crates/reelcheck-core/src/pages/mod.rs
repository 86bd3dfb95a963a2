//! Page objects for the Discover app.
//!
//! [`BasePage`] wraps a [`BrowserSession`] with waiting, retries and logging.
//! [`DiscoverPage`] builds domain actions and queries on top of it so tests
//! never touch a selector.

mod discover;
pub mod locators;

pub use discover::{DiscoverPage, PaginationState, ResultItem};

use crate::browser::wait::Deadline;
use crate::browser::{BrowserSession, ElementState, InteractionError};
use crate::config::RunConfiguration;
use crate::filters::FilterError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of a page-object action.
#[derive(Debug, Error)]
pub enum PageError {
    /// Input rejected before anything was sent to the browser.
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Interaction(#[from] InteractionError),
}

impl PageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Interaction(e) if e.is_timeout())
    }
}

#[derive(Debug, Clone, Copy)]
enum Action<'s> {
    Goto(&'s str),
    Click(&'s str),
    Fill(&'s str, &'s str),
    Select(&'s str, &'s [String]),
    Reload,
}

impl std::fmt::Display for Action<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Goto(url) => write!(f, "goto {url}"),
            Action::Click(sel) => write!(f, "click {sel}"),
            Action::Fill(sel, _) => write!(f, "fill {sel}"),
            Action::Select(sel, _) => write!(f, "select {sel}"),
            Action::Reload => f.write_str("reload"),
        }
    }
}

/// Data exchanges completed before an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeMark {
    exchanges: usize,
}

/// Helpers shared by every page object.
pub struct BasePage<'a> {
    session: &'a mut BrowserSession,
    config: &'a RunConfiguration,
}

impl<'a> BasePage<'a> {
    pub fn new(session: &'a mut BrowserSession, config: &'a RunConfiguration) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &RunConfiguration {
        self.config
    }

    pub fn session(&mut self) -> &mut BrowserSession {
        &mut *self.session
    }

    /// Runs `action`, retrying timeouts up to `interaction_retries` times.
    async fn perform(&mut self, action: Action<'_>) -> Result<(), InteractionError> {
        let nav = self.config.navigation_timeout;
        let act = self.config.action_timeout;
        let mut attempt = 0;
        loop {
            let result = match action {
                Action::Goto(url) => self.session.goto(url, nav).await,
                Action::Click(sel) => self.session.click(sel, act).await,
                Action::Fill(sel, value) => self.session.fill(sel, value, act).await,
                Action::Select(sel, values) => self.session.select(sel, values, act).await,
                Action::Reload => self.session.reload(nav).await,
            };
            match result {
                Err(e) if e.is_timeout() && attempt < self.config.interaction_retries => {
                    attempt += 1;
                    warn!(%action, attempt, "Interaction timed out, retrying");
                }
                other => return other,
            }
        }
    }

    /// Navigates to `path` relative to the base URL and waits for the page to
    /// settle.
    pub async fn navigate(&mut self, path: &str) -> Result<(), InteractionError> {
        let url = self.config.url_for(path);
        info!(url = %url, "Navigating");
        let mark = self.mark().await?;
        self.perform(Action::Goto(&url)).await?;
        self.wait_for_change(mark, &[locators::NOT_FOUND], self.config.navigation_timeout)
            .await?;
        debug!("Page loaded");
        Ok(())
    }

    /// Waits until no loading indicator is shown.
    pub async fn wait_for_page_load(&mut self) -> Result<(), InteractionError> {
        self.wait_until_idle(self.config.navigation_timeout).await?;
        debug!("Page loaded");
        Ok(())
    }

    /// Waits until no loading indicator is shown, within `timeout`.
    pub async fn wait_until_idle(&mut self, timeout: Duration) -> Result<(), InteractionError> {
        self.wait_for_element(locators::LOADING_SPINNER, ElementState::Hidden, Some(timeout))
            .await
    }

    /// Snapshot taken before an action so [`BasePage::wait_for_change`] can
    /// tell when the action's effect has landed.
    pub async fn mark(&mut self) -> Result<ChangeMark, InteractionError> {
        Ok(ChangeMark {
            exchanges: self.session.exchange_count().await?,
        })
    }

    /// Waits until the page has reacted to an action and finished updating.
    ///
    /// The page has reacted once a data exchange newer than `mark` has
    /// completed, or once one of `signals` is shown (for outcomes that make
    /// no request, such as a validation message). It has finished once the
    /// loading indicator is gone.
    pub async fn wait_for_change(
        &mut self,
        mark: ChangeMark,
        signals: &[&str],
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        let deadline = Deadline::new(timeout);
        let mut reacted = false;
        loop {
            if !reacted {
                reacted = self.session.exchange_count().await? > mark.exchanges
                    || self.any_visible(signals).await?;
            }
            if reacted && !self.session.is_visible(locators::LOADING_SPINNER).await? {
                return Ok(());
            }
            let waiting_for = if reacted {
                "the page to finish loading"
            } else {
                "the page to react"
            };
            deadline.tick(waiting_for).await?;
        }
    }

    async fn any_visible(&mut self, selectors: &[&str]) -> Result<bool, InteractionError> {
        for selector in selectors {
            if self.session.is_visible(selector).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn click_element(
        &mut self,
        selector: &str,
        description: &str,
    ) -> Result<(), InteractionError> {
        info!(element = description, "Clicking");
        self.perform(Action::Click(selector)).await
    }

    pub async fn fill_input(
        &mut self,
        selector: &str,
        text: &str,
        description: &str,
    ) -> Result<(), InteractionError> {
        info!(input = description, text, "Filling input");
        self.perform(Action::Fill(selector, text)).await
    }

    pub async fn select_option(
        &mut self,
        selector: &str,
        values: &[String],
        description: &str,
    ) -> Result<(), InteractionError> {
        info!(select = description, ?values, "Selecting option");
        self.perform(Action::Select(selector, values)).await
    }

    /// Text of the first match, empty when nothing matches.
    pub async fn get_text(&mut self, selector: &str) -> Result<String, InteractionError> {
        let text = self.session.text(selector).await?.unwrap_or_default();
        debug!(selector, text = %text, "Retrieved text");
        Ok(text)
    }

    pub async fn get_element_count(&mut self, selector: &str) -> Result<usize, InteractionError> {
        let count = self.session.count(selector).await?;
        debug!(selector, count, "Element count");
        Ok(count)
    }

    /// Current visibility; does not wait.
    pub async fn is_visible(&mut self, selector: &str) -> Result<bool, InteractionError> {
        self.session.is_visible(selector).await
    }

    /// Polls until `selector` reaches `state`. Defaults to the action timeout.
    pub async fn wait_for_element(
        &mut self,
        selector: &str,
        state: ElementState,
        timeout: Option<Duration>,
    ) -> Result<(), InteractionError> {
        let deadline = Deadline::new(timeout.unwrap_or(self.config.action_timeout));
        debug!(selector, %state, "Waiting for element");
        loop {
            let reached = match state {
                ElementState::Visible => self.session.is_visible(selector).await?,
                ElementState::Hidden => !self.session.is_visible(selector).await?,
                ElementState::Attached => self.session.count(selector).await? > 0,
                ElementState::Detached => self.session.count(selector).await? == 0,
            };
            if reached {
                return Ok(());
            }
            deadline.tick(&format!("{selector} to be {state}")).await?;
        }
    }

    /// Saves a screenshot as `<screenshots_dir>/<name>.png`.
    pub async fn take_screenshot(&mut self, name: &str) -> Result<PathBuf, InteractionError> {
        let path = self.config.screenshots_dir().join(format!("{name}.png"));
        self.session.screenshot(&path).await?;
        info!(path = %path.display(), "Screenshot saved");
        Ok(path)
    }

    pub async fn current_url(&mut self) -> Result<String, InteractionError> {
        self.session.url().await
    }

    pub async fn reload_page(&mut self) -> Result<(), InteractionError> {
        info!("Reloading page");
        let mark = self.mark().await?;
        self.perform(Action::Reload).await?;
        self.wait_for_change(mark, &[locators::NOT_FOUND], self.config.navigation_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SessionProvider;
    use crate::testing::SimulatedDriver;
    use std::sync::Arc;

    fn config() -> RunConfiguration {
        let dir = std::env::temp_dir().join("reelcheck-base-page");
        RunConfiguration {
            action_timeout: Duration::from_millis(200),
            navigation_timeout: Duration::from_millis(500),
            reports_dir: dir,
            ..RunConfiguration::default()
        }
    }

    async fn session(config: &RunConfiguration) -> (SessionProvider, BrowserSession) {
        let provider = SessionProvider::new(
            Arc::new(SimulatedDriver::new()),
            Arc::new(config.clone()),
        );
        let session = provider.acquire("base-page").await.unwrap();
        (provider, session)
    }

    #[tokio::test]
    async fn test_navigate_waits_for_results() {
        let config = config();
        let (provider, mut session) = session(&config).await;
        {
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("/").await.unwrap();
            assert!(!page.is_visible(locators::LOADING_SPINNER).await.unwrap());
            assert_eq!(page.get_element_count(locators::RESULT_CARD).await.unwrap(), 20);
            assert_eq!(page.current_url().await.unwrap(), "https://tmdb-discover.surge.sh/");
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_wait_for_missing_element_times_out() {
        let config = config();
        let (provider, mut session) = session(&config).await;
        {
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("/").await.unwrap();
            let err = page
                .wait_for_element(
                    locators::ERROR_BANNER,
                    ElementState::Visible,
                    Some(Duration::from_millis(120)),
                )
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            page.wait_for_element(locators::ERROR_BANNER, ElementState::Detached, None)
                .await
                .unwrap();
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_click_missing_element_fails_after_retries() {
        let config = RunConfiguration {
            interaction_retries: 2,
            ..config()
        };
        let (provider, mut session) = session(&config).await;
        {
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("/popular").await.unwrap();
            let err = page
                .click_element(locators::NEXT_PAGE, "next page")
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_take_screenshot_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfiguration {
            reports_dir: dir.path().to_path_buf(),
            ..config()
        };
        let (provider, mut session) = session(&config).await;
        {
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("/").await.unwrap();
            let path = page.take_screenshot("home").await.unwrap();
            assert_eq!(path, dir.path().join("screenshots").join("home.png"));
            assert!(path.exists());
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_navigate_waits_for_delayed_request() {
        let config = config();
        let provider = SessionProvider::new(
            Arc::new(SimulatedDriver::new().with_render_delay(Duration::from_millis(120))),
            Arc::new(config.clone()),
        );
        let mut session = provider.acquire("base-page").await.unwrap();
        {
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("/").await.unwrap();
            assert_eq!(page.get_element_count(locators::RESULT_CARD).await.unwrap(), 20);

            page.reload_page().await.unwrap();
            page.wait_for_page_load().await.unwrap();
            assert_eq!(page.get_element_count(locators::RESULT_CARD).await.unwrap(), 20);
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_wait_for_change_times_out_when_nothing_happens() {
        let config = config();
        let (provider, mut session) = session(&config).await;
        {
            let mut page = BasePage::new(&mut session, &config);
            page.navigate("/").await.unwrap();
            let mark = page.mark().await.unwrap();
            let err = page
                .wait_for_change(mark, &[locators::NOT_FOUND], Duration::from_millis(120))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }
        provider.release(session).await;
    }
}

