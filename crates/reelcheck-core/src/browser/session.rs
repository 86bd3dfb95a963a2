//! Per-test browser sessions with guaranteed release.

use super::{
    BrowserDriver, BrowserHandle, ConsoleMessage, ElementSnapshot, InteractionError,
    LaunchOptions, SessionStartError,
};
use crate::api::NetworkCapture;
use crate::config::RunConfiguration;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hands out one [`BrowserSession`] per test and tracks how many are open.
pub struct SessionProvider {
    driver: Arc<dyn BrowserDriver>,
    config: Arc<RunConfiguration>,
    active: Arc<AtomicUsize>,
    acquired: AtomicUsize,
}

impl SessionProvider {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: Arc<RunConfiguration>) -> Self {
        Self {
            driver,
            config,
            active: Arc::new(AtomicUsize::new(0)),
            acquired: AtomicUsize::new(0),
        }
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            browser: self.config.browser,
            headless: self.config.headless,
            base_url: self.config.base_url.to_string(),
            api_base_url: self.config.api_base_url.to_string(),
            navigation_timeout: self.config.navigation_timeout,
            action_timeout: self.config.action_timeout,
        }
    }

    /// Launches a fresh context for `test_id`.
    pub async fn acquire(&self, test_id: &str) -> Result<BrowserSession, SessionStartError> {
        let options = self.launch_options();
        debug!(
            test_id,
            driver = self.driver.name(),
            browser = options.browser.as_str(),
            headless = options.headless,
            "Launching browser session"
        );

        let handle = self.driver.launch(&options).await?;

        self.active.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        info!(test_id, browser = %options.browser, "Browser session acquired");

        Ok(BrowserSession {
            test_id: test_id.to_string(),
            handle: Some(handle),
            active: Arc::clone(&self.active),
            console: Vec::new(),
            capture: NetworkCapture::new(options.api_base_url),
            exchanges_seen: 0,
        })
    }

    /// Closes the session. Close failures are logged, never raised.
    pub async fn release(&self, session: BrowserSession) {
        let test_id = session.test_id.clone();
        if let Err(e) = session.release().await {
            warn!(test_id, error = %e, "Browser session did not close cleanly");
        } else {
            debug!(test_id, "Browser session released");
        }
    }

    /// Sessions acquired and not yet released.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Sessions acquired over the provider's lifetime.
    pub fn total_acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

/// One browser context owned by exactly one test.
///
/// Released through [`SessionProvider::release`]. A session dropped without
/// release (panic, cancelled future) closes itself on the runtime.
pub struct BrowserSession {
    test_id: String,
    handle: Option<Box<dyn BrowserHandle>>,
    active: Arc<AtomicUsize>,
    console: Vec<ConsoleMessage>,
    capture: NetworkCapture,
    exchanges_seen: usize,
}

impl BrowserSession {
    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    fn handle(&mut self) -> Result<&mut Box<dyn BrowserHandle>, InteractionError> {
        self.handle.as_mut().ok_or(InteractionError::Closed)
    }

    pub async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), InteractionError> {
        self.handle()?.goto(url, timeout).await
    }

    pub async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), InteractionError> {
        self.handle()?.click(selector, timeout).await
    }

    pub async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.handle()?.fill(selector, value, timeout).await
    }

    pub async fn select(
        &mut self,
        selector: &str,
        values: &[String],
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.handle()?.select(selector, values, timeout).await
    }

    pub async fn text(&mut self, selector: &str) -> Result<Option<String>, InteractionError> {
        self.handle()?.text(selector).await
    }

    pub async fn count(&mut self, selector: &str) -> Result<usize, InteractionError> {
        self.handle()?.count(selector).await
    }

    pub async fn is_visible(&mut self, selector: &str) -> Result<bool, InteractionError> {
        self.handle()?.is_visible(selector).await
    }

    pub async fn snapshot(
        &mut self,
        selector: &str,
    ) -> Result<Vec<ElementSnapshot>, InteractionError> {
        self.handle()?.snapshot(selector).await
    }

    pub async fn url(&mut self) -> Result<String, InteractionError> {
        self.handle()?.url().await
    }

    pub async fn reload(&mut self, timeout: Duration) -> Result<(), InteractionError> {
        self.handle()?.reload(timeout).await
    }

    pub async fn screenshot(&mut self, path: &Path) -> Result<(), InteractionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| InteractionError::Driver(format!("screenshot dir: {e}")))?;
        }
        self.handle()?.screenshot(path).await
    }

    async fn pull_console(&mut self) -> Result<(), InteractionError> {
        let messages = self.handle()?.drain_console().await?;
        self.console.extend(messages);
        Ok(())
    }

    /// Error-level console messages seen so far, in order.
    pub async fn console_errors(&mut self) -> Result<Vec<String>, InteractionError> {
        self.pull_console().await?;
        Ok(self
            .console
            .iter()
            .filter(|m| m.is_error())
            .map(|m| m.text.clone())
            .collect())
    }

    /// Data exchanges recorded during this session.
    pub async fn network(&mut self) -> Result<&mut NetworkCapture, InteractionError> {
        let exchanges = self.handle()?.drain_network().await?;
        self.exchanges_seen += exchanges.len();
        self.capture.record_all(exchanges);
        Ok(&mut self.capture)
    }

    /// Data exchanges the page has completed so far. Unlike the capture this
    /// count never goes down, so it tells whether an action reached the API.
    pub async fn exchange_count(&mut self) -> Result<usize, InteractionError> {
        self.network().await?;
        Ok(self.exchanges_seen)
    }

    /// Closes the context. Consumes the session so it cannot be released twice.
    pub async fn release(mut self) -> Result<(), InteractionError> {
        match self.handle.take() {
            Some(mut handle) => {
                self.active.fetch_sub(1, Ordering::SeqCst);
                handle.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        warn!(
            test_id = %self.test_id,
            "Browser session dropped without release; closing in background"
        );
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = handle.close().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedDriver;

    fn provider() -> SessionProvider {
        SessionProvider::new(
            Arc::new(SimulatedDriver::new()),
            Arc::new(RunConfiguration::default()),
        )
    }

    #[tokio::test]
    async fn test_acquire_and_release_balance_counter() {
        let provider = provider();
        let session = provider.acquire("t1").await.unwrap();
        assert_eq!(provider.active_sessions(), 1);

        provider.release(session).await;
        assert_eq!(provider.active_sessions(), 0);
        assert_eq!(provider.total_acquired(), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_is_released() {
        let provider = provider();
        {
            let _session = provider.acquire("t1").await.unwrap();
            let _other = provider.acquire("t2").await.unwrap();
            assert_eq!(provider.active_sessions(), 2);
        }
        assert_eq!(provider.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_does_not_count() {
        let provider = SessionProvider::new(
            Arc::new(SimulatedDriver::new().failing_launch("chromium not installed")),
            Arc::new(RunConfiguration::default()),
        );
        let err = provider.acquire("t1").await.err().unwrap();
        assert!(err.to_string().contains("chromium not installed"));
        assert_eq!(provider.active_sessions(), 0);
        assert_eq!(provider.total_acquired(), 0);
    }

    #[tokio::test]
    async fn test_console_errors_accumulate_across_drains() {
        let provider = provider();
        let mut session = provider.acquire("t1").await.unwrap();
        session
            .goto(
                "https://tmdb-discover.surge.sh/popular",
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let first = session.console_errors().await.unwrap();
        let second = session.console_errors().await.unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);

        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_exchange_count_survives_clearing_the_capture() {
        let provider = provider();
        let mut session = provider.acquire("t1").await.unwrap();
        assert_eq!(session.exchange_count().await.unwrap(), 0);
        session
            .goto("https://tmdb-discover.surge.sh/", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(session.exchange_count().await.unwrap(), 1);
        session.network().await.unwrap().clear();
        assert!(session.network().await.unwrap().is_empty());
        assert_eq!(session.exchange_count().await.unwrap(), 1);

        provider.release(session).await;
    }
}
