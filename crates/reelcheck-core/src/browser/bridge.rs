//! Playwright through a bridge process.
//!
//! Each session spawns the bridge (`node bridge/playwright-bridge.mjs` by
//! default) and exchanges one JSON object per line over stdin/stdout:
//!
//! ```text
//! → {"id":1,"op":"launch","browser":"chromium","headless":true,...}
//! ← {"id":1,"ok":true,"value":null}
//! → {"id":2,"op":"count","selector":".movie-card"}
//! ← {"id":2,"ok":true,"value":20}
//! → {"id":3,"op":"click","selector":".pagination-last","timeout_ms":10000}
//! ← {"id":3,"ok":false,"error":"locator.click: Timeout 10000ms exceeded","timeout":true}
//! ```

use super::{
    BrowserDriver, BrowserHandle, ConsoleMessage, ElementSnapshot, InteractionError,
    LaunchOptions, NetworkExchange, SessionStartError,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

/// Extra time granted to the bridge beyond the browser-side timeout.
const RESPONSE_GRACE: Duration = Duration::from_secs(5);

/// Time allowed for launching the browser itself.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Launches browsers through the Playwright bridge process.
#[derive(Debug, Clone)]
pub struct PlaywrightBridgeDriver {
    program: String,
    args: Vec<String>,
}

impl PlaywrightBridgeDriver {
    /// Creates a driver from a command line such as
    /// `node bridge/playwright-bridge.mjs`.
    pub fn from_command(command: &str) -> Result<Self, SessionStartError> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().ok_or_else(|| {
            SessionStartError::new(crate::config::BrowserKind::Chromium, "empty bridge command")
        })?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl BrowserDriver for PlaywrightBridgeDriver {
    fn name(&self) -> &str {
        "playwright"
    }

    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserHandle>, SessionStartError> {
        let fail = |reason: String| SessionStartError::new(options.browser, reason);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| fail(format!("cannot spawn '{}': {e}", self.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| fail("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| fail("bridge stdout unavailable".to_string()))?;

        // Bridge diagnostics go to the debug log.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "reelcheck::bridge", "{line}");
                }
            });
        }

        let mut handle = BridgeHandle {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            closed: false,
        };

        let launch = json!({
            "op": "launch",
            "browser": options.browser.as_str(),
            "headless": options.headless,
            "base_url": options.base_url,
            "api_prefix": options.api_base_url,
            "navigation_timeout_ms": options.navigation_timeout.as_millis() as u64,
            "action_timeout_ms": options.action_timeout.as_millis() as u64,
        });
        if let Err(e) = handle.call_value(launch, LAUNCH_TIMEOUT).await {
            let _ = handle.child.kill().await;
            return Err(fail(e.to_string()));
        }

        Ok(Box::new(handle))
    }
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
}

struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    closed: bool,
}

impl BridgeHandle {
    async fn call_value(
        &mut self,
        mut request: Value,
        timeout: Duration,
    ) -> Result<Value, InteractionError> {
        if self.closed {
            return Err(InteractionError::Closed);
        }
        self.next_id += 1;
        let id = self.next_id;
        let op = request["op"].as_str().unwrap_or("?").to_string();
        request["id"] = json!(id);

        let mut line = request.to_string();
        trace!(id, op = %op, "bridge request");
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| InteractionError::Driver(format!("bridge write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| InteractionError::Driver(format!("bridge flush failed: {e}")))?;

        let wait = timeout + RESPONSE_GRACE;
        loop {
            let next = tokio::time::timeout(wait, self.stdout.next_line())
                .await
                .map_err(|_| InteractionError::Timeout {
                    action: format!("bridge response to '{op}'"),
                    timeout: wait,
                })?
                .map_err(|e| InteractionError::Driver(format!("bridge read failed: {e}")))?;

            let Some(raw) = next else {
                self.closed = true;
                return Err(InteractionError::Driver("bridge process exited".to_string()));
            };

            let response: BridgeResponse = match serde_json::from_str(&raw) {
                Ok(r) => r,
                Err(_) => {
                    // Stray stdout output from node or Playwright.
                    debug!(target: "reelcheck::bridge", "{raw}");
                    continue;
                }
            };
            if response.id != id {
                warn!(expected = id, got = response.id, "Discarding out-of-order bridge response");
                continue;
            }

            return if response.ok {
                Ok(response.value)
            } else if response.timeout {
                Err(InteractionError::Timeout {
                    action: op,
                    timeout,
                })
            } else {
                Err(InteractionError::Driver(
                    response.error.unwrap_or_else(|| format!("'{op}' failed")),
                ))
            };
        }
    }

    async fn call<T: DeserializeOwned>(
        &mut self,
        request: Value,
        timeout: Duration,
    ) -> Result<T, InteractionError> {
        let value = self.call_value(request, timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| InteractionError::Driver(format!("unexpected bridge value: {e}")))
    }
}

/// Queries are answered from the current render and never wait long.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
impl BrowserHandle for BridgeHandle {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), InteractionError> {
        self.call_value(
            json!({"op": "goto", "url": url, "timeout_ms": timeout.as_millis() as u64}),
            timeout,
        )
        .await
        .map(drop)
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), InteractionError> {
        self.call_value(
            json!({"op": "click", "selector": selector, "timeout_ms": timeout.as_millis() as u64}),
            timeout,
        )
        .await
        .map(drop)
    }

    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.call_value(
            json!({
                "op": "fill",
                "selector": selector,
                "value": value,
                "timeout_ms": timeout.as_millis() as u64,
            }),
            timeout,
        )
        .await
        .map(drop)
    }

    async fn select(
        &mut self,
        selector: &str,
        values: &[String],
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.call_value(
            json!({
                "op": "select",
                "selector": selector,
                "values": values,
                "timeout_ms": timeout.as_millis() as u64,
            }),
            timeout,
        )
        .await
        .map(drop)
    }

    async fn text(&mut self, selector: &str) -> Result<Option<String>, InteractionError> {
        self.call(json!({"op": "text", "selector": selector}), QUERY_TIMEOUT)
            .await
    }

    async fn count(&mut self, selector: &str) -> Result<usize, InteractionError> {
        self.call(json!({"op": "count", "selector": selector}), QUERY_TIMEOUT)
            .await
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool, InteractionError> {
        self.call(json!({"op": "visible", "selector": selector}), QUERY_TIMEOUT)
            .await
    }

    async fn snapshot(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, InteractionError> {
        self.call(json!({"op": "snapshot", "selector": selector}), QUERY_TIMEOUT)
            .await
    }

    async fn url(&mut self) -> Result<String, InteractionError> {
        self.call(json!({"op": "url"}), QUERY_TIMEOUT).await
    }

    async fn reload(&mut self, timeout: Duration) -> Result<(), InteractionError> {
        self.call_value(
            json!({"op": "reload", "timeout_ms": timeout.as_millis() as u64}),
            timeout,
        )
        .await
        .map(drop)
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), InteractionError> {
        self.call_value(
            json!({"op": "screenshot", "path": path.display().to_string()}),
            QUERY_TIMEOUT,
        )
        .await
        .map(drop)
    }

    async fn drain_console(&mut self) -> Result<Vec<ConsoleMessage>, InteractionError> {
        self.call(json!({"op": "console"}), QUERY_TIMEOUT).await
    }

    async fn drain_network(&mut self) -> Result<Vec<NetworkExchange>, InteractionError> {
        self.call(json!({"op": "network"}), QUERY_TIMEOUT).await
    }

    async fn close(&mut self) -> Result<(), InteractionError> {
        if self.closed {
            let _ = self.child.kill().await;
            return Ok(());
        }
        let result = self.call_value(json!({"op": "close"}), QUERY_TIMEOUT).await;
        self.closed = true;

        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(Ok(_)) => {}
            _ => {
                let _ = self.child.kill().await;
            }
        }
        result.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserKind;

    fn options() -> LaunchOptions {
        LaunchOptions {
            browser: BrowserKind::Firefox,
            headless: true,
            base_url: "http://localhost:1/".to_string(),
            api_base_url: "http://localhost:2/".to_string(),
            navigation_timeout: Duration::from_secs(1),
            action_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_from_command_splits_program_and_args() {
        let driver = PlaywrightBridgeDriver::from_command("node bridge/playwright-bridge.mjs").unwrap();
        assert_eq!(driver.program, "node");
        assert_eq!(driver.args, vec!["bridge/playwright-bridge.mjs"]);
        assert!(PlaywrightBridgeDriver::from_command("   ").is_err());
    }

    #[tokio::test]
    async fn test_missing_program_is_session_start_error() {
        let driver =
            PlaywrightBridgeDriver::from_command("reelcheck-no-such-bridge-binary").unwrap();
        let err = driver.launch(&options()).await.err().unwrap();
        assert_eq!(err.browser, BrowserKind::Firefox);
        assert!(err.reason.contains("cannot spawn"));
    }

    #[tokio::test]
    async fn test_bridge_exiting_early_is_session_start_error() {
        // `true` exits immediately without answering the launch request.
        let driver = PlaywrightBridgeDriver::from_command("true").unwrap();
        let err = driver.launch(&options()).await.err().unwrap();
        assert!(err.reason.contains("exited") || err.reason.contains("write failed"));
    }

    #[tokio::test]
    async fn test_echoing_bridge_answers_requests() {
        // A shell loop standing in for node: answers every request with ok.
        let script = r#"while read -r line; do id=$(echo "$line" | sed -E 's/.*"id":([0-9]+).*/\1/'); echo "{\"id\":$id,\"ok\":true,\"value\":3}"; done"#;
        let driver = PlaywrightBridgeDriver {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        };
        let mut handle = driver.launch(&options()).await.unwrap();
        assert_eq!(handle.count(".movie-card").await.unwrap(), 3);
        handle.close().await.unwrap();
    }
}
