//! Records the data calls a browser session makes.
//!
//! The session feeds every [`NetworkExchange`] whose URL starts with the API
//! prefix into a [`NetworkCapture`]; tests then assert on what the UI
//! actually requested and received.

use crate::browser::NetworkExchange;
use serde_json::Value;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub timestamp: String,
}

/// Request/response history of one session.
#[derive(Debug, Clone, Default)]
pub struct NetworkCapture {
    prefix: String,
    requests: Vec<CapturedRequest>,
    responses: Vec<CapturedResponse>,
}

impl NetworkCapture {
    /// Captures exchanges whose URL starts with `prefix` (empty = all).
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            requests: Vec::new(),
            responses: Vec::new(),
        }
    }

    pub fn record(&mut self, exchange: NetworkExchange) {
        if !exchange.url.starts_with(&self.prefix) {
            return;
        }
        debug!(method = %exchange.method, url = %exchange.url, status = exchange.status, "Captured exchange");
        self.requests.push(CapturedRequest {
            url: exchange.url.clone(),
            method: exchange.method,
            timestamp: exchange.timestamp.clone(),
        });
        self.responses.push(CapturedResponse {
            url: exchange.url,
            status: exchange.status,
            body: exchange.body,
            timestamp: exchange.timestamp,
        });
    }

    pub fn record_all(&mut self, exchanges: impl IntoIterator<Item = NetworkExchange>) {
        for exchange in exchanges {
            self.record(exchange);
        }
    }

    /// Requests whose URL contains `filter` (all when `None`).
    pub fn requests(&self, filter: Option<&str>) -> Vec<&CapturedRequest> {
        self.requests
            .iter()
            .filter(|r| filter.is_none_or(|f| r.url.contains(f)))
            .collect()
    }

    /// Responses whose URL contains `filter` (all when `None`).
    pub fn responses(&self, filter: Option<&str>) -> Vec<&CapturedResponse> {
        self.responses
            .iter()
            .filter(|r| filter.is_none_or(|f| r.url.contains(f)))
            .collect()
    }

    pub fn last_request(&self) -> Option<&CapturedRequest> {
        self.requests.last()
    }

    pub fn last_response(&self) -> Option<&CapturedResponse> {
        self.responses.last()
    }

    /// True when the latest request matching `url_part` carries every
    /// `key=value` pair.
    pub fn validate_request_contains(&self, url_part: &str, params: &[(&str, &str)]) -> bool {
        let Some(request) = self.requests(Some(url_part)).last().copied() else {
            error!(url_part, "No requests found matching");
            return false;
        };
        for (key, value) in params {
            let pair = format!("{key}={value}");
            if !request.url.contains(&pair) {
                error!(url = %request.url, pair = %pair, "Expected parameter not found");
                return false;
            }
        }
        info!(url_part, "Request validation passed");
        true
    }

    /// True when the latest response matching `url_part` has `status`.
    pub fn validate_response_status(&self, url_part: &str, status: u16) -> bool {
        let Some(response) = self.responses(Some(url_part)).last().copied() else {
            error!(url_part, "No responses found matching");
            return false;
        };
        if response.status != status {
            error!(expected = status, actual = response.status, "Status mismatch");
            return false;
        }
        true
    }

    /// True when the latest response matching `url_part` is a JSON object
    /// carrying every key in `keys`.
    pub fn validate_response_json_schema(&self, url_part: &str, keys: &[&str]) -> bool {
        let Some(response) = self.responses(Some(url_part)).last().copied() else {
            error!(url_part, "No responses found matching");
            return false;
        };
        let json: Value = match serde_json::from_str(&response.body) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "Invalid JSON response");
                return false;
            }
        };
        match keys.iter().find(|k| json.get(**k).is_none()) {
            Some(missing) => {
                error!(key = *missing, "Expected key not found in response");
                false
            }
            None => true,
        }
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.responses.clear();
        debug!("Network capture cleared");
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(url: &str, status: u16, body: &str) -> NetworkExchange {
        NetworkExchange {
            method: "GET".to_string(),
            url: url.to_string(),
            status,
            body: body.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn capture() -> NetworkCapture {
        let mut capture = NetworkCapture::new("https://api.themoviedb.org/3/");
        capture.record_all([
            exchange(
                "https://api.themoviedb.org/3/movie/popular?page=1",
                200,
                r#"{"page":1,"results":[]}"#,
            ),
            exchange("https://cdn.example.com/poster.jpg", 200, ""),
            exchange(
                "https://api.themoviedb.org/3/movie/top_rated?page=501",
                422,
                r#"{"status_message":"Invalid page"}"#,
            ),
        ]);
        capture
    }

    #[test]
    fn test_only_api_prefix_is_captured() {
        let capture = capture();
        assert_eq!(capture.requests(None).len(), 2);
        assert_eq!(capture.requests(Some("top_rated")).len(), 1);
        assert!(capture.last_request().unwrap().url.contains("page=501"));
        assert_eq!(capture.last_response().unwrap().status, 422);
    }

    #[test]
    fn test_validate_request_contains() {
        let capture = capture();
        assert!(capture.validate_request_contains("popular", &[("page", "1")]));
        assert!(!capture.validate_request_contains("popular", &[("page", "2")]));
        assert!(!capture.validate_request_contains("trending", &[]));
    }

    #[test]
    fn test_validate_response_status_and_schema() {
        let capture = capture();
        assert!(capture.validate_response_status("popular", 200));
        assert!(!capture.validate_response_status("top_rated", 200));
        assert!(capture.validate_response_json_schema("popular", &["page", "results"]));
        assert!(!capture.validate_response_json_schema("popular", &["total_pages"]));
    }

    #[test]
    fn test_clear_empties_history() {
        let mut capture = capture();
        capture.clear();
        assert!(capture.is_empty());
        assert!(capture.last_response().is_none());
    }
}
