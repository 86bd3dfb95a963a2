//! Data API validation client.
//!
//! Issues the same requests the Discover UI makes and checks status and
//! response shape without a browser. Requests are never retried: a flaky
//! endpoint shows up as a failed test.

mod interceptor;

pub use interceptor::{CapturedRequest, CapturedResponse, NetworkCapture};

use crate::config::RunConfiguration;
use crate::filters::{Category, FilterState, MediaType};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Keys every paged list response carries.
pub const PAGE_KEYS: &[&str] = &["page", "results", "total_pages", "total_results"];

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response.
    #[error("{url} returned {status}: {body}")]
    Status { status: u16, body: String, url: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A 2xx response whose body is not JSON.
    #[error("response from {url} is not JSON: {reason}")]
    InvalidJson { url: String, reason: String },

    /// The body lacks keys the caller required.
    #[error("response is missing keys: {}", missing.join(", "))]
    Shape { missing: Vec<String> },
}

impl ApiError {
    /// HTTP status for [`ApiError::Status`].
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A successful JSON response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub url: String,
    pub body: Value,
}

impl ApiResponse {
    /// Entries of the `results` array, empty when absent.
    pub fn results(&self) -> &[Value] {
        self.body
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.body.get("total_pages").and_then(Value::as_u64)
    }

    pub fn page(&self) -> Option<u64> {
        self.body.get("page").and_then(Value::as_u64)
    }
}

/// Client for the data API behind the Discover app.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &RunConfiguration) -> Result<Self, ApiError> {
        Self::new(
            config.api_base_url.as_str(),
            config.api_key.clone(),
            config.navigation_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Full URL of an endpoint relative to the base.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// GETs `endpoint` with `params`. Non-2xx responses become
    /// [`ApiError::Status`] carrying the body.
    pub async fn request(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, ?params, "API request");

        let mut builder = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(params);
        if let Some(key) = &self.api_key {
            // v4 read tokens are JWTs and go in the header; v3 keys are query params.
            builder = if key.starts_with("eyJ") {
                builder.bearer_auth(key)
            } else {
                builder.query(&[("api_key", key)])
            };
        }

        let response = builder.send().await?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            let body = error_body(response.text().await);
            info!(url = %url, status = status.as_u16(), "API returned error status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
                url,
            });
        }

        let text = response.text().await?;
        let body = serde_json::from_str(&text).map_err(|e| ApiError::InvalidJson {
            url: final_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(ApiResponse {
            status: status.as_u16(),
            url: final_url,
            body,
        })
    }

    /// One page of a category list.
    pub async fn fetch_category(
        &self,
        category: Category,
        media: MediaType,
        page: u32,
    ) -> Result<ApiResponse, ApiError> {
        let params = vec![("page".to_string(), page.to_string())];
        self.request(&category.api_path(media), &params).await
    }

    /// The request the UI makes for `state`.
    pub async fn discover(&self, state: &FilterState) -> Result<ApiResponse, ApiError> {
        self.request(&state.api_path(), &state.query_params()).await
    }
}

/// Checks that `body` is an object carrying every key in `keys`.
pub fn validate_shape(body: &Value, keys: &[&str]) -> Result<(), ApiError> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|k| body.get(**k).is_none())
        .map(|k| (*k).to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Shape { missing })
    }
}

/// Body text of an error response. A body that could not be read says so
/// instead of looking empty.
fn error_body(read: Result<String, reqwest::Error>) -> String {
    match read {
        Ok(text) => text,
        Err(e) => format!("<unreadable body: {e}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedApiServer;
    use serde_json::json;

    #[tokio::test]
    async fn test_unreadable_error_body_is_not_empty() {
        assert_eq!(error_body(Ok(String::new())), "");
        assert_eq!(error_body(Ok("{\"status_code\":34}".to_string())), "{\"status_code\":34}");

        let read_error = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        let body = error_body(Err(read_error));
        assert!(body.starts_with("<unreadable body: "), "{body}");
    }

    #[test]
    fn test_validate_shape_reports_missing_keys() {
        let body = json!({"page": 1, "results": []});
        assert!(validate_shape(&body, &["page", "results"]).is_ok());

        let err = validate_shape(&body, PAGE_KEYS).unwrap_err();
        match err {
            ApiError::Shape { missing } => {
                assert_eq!(missing, vec!["total_pages", "total_results"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let client = ApiClient::new(
            "https://api.themoviedb.org/3/",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.endpoint_url("/movie/popular"),
            "https://api.themoviedb.org/3/movie/popular"
        );
    }

    #[tokio::test]
    async fn test_fetch_category_returns_page_shape() {
        let server = SimulatedApiServer::start().await.unwrap();
        let client = ApiClient::new(server.base_url(), None, Duration::from_secs(5)).unwrap();

        let response = client
            .fetch_category(Category::Popular, MediaType::Movie, 1)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert!(validate_shape(&response.body, PAGE_KEYS).is_ok());
        assert_eq!(response.results().len(), 20);
        assert_eq!(response.page(), Some(1));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_page_beyond_cap_is_status_error() {
        let server = SimulatedApiServer::start().await.unwrap();
        let client = ApiClient::new(server.base_url(), None, Duration::from_secs(5)).unwrap();

        let err = client
            .fetch_category(Category::Trending, MediaType::Movie, 999)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
        match err {
            ApiError::Status { body, .. } => assert!(body.contains("page")),
            other => panic!("unexpected error: {other}"),
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_discover_uses_filter_params() {
        let server = SimulatedApiServer::start().await.unwrap();
        let client = ApiClient::new(server.base_url(), None, Duration::from_secs(5)).unwrap();

        let mut state = FilterState::new();
        state.set_year_range(2000, 2010).unwrap();
        let response = client.discover(&state).await.unwrap();

        assert!(response.url.contains("discover/movie"));
        assert!(response.url.contains("primary_release_date.gte=2000-01-01"));
        for item in response.results() {
            let date = item["release_date"].as_str().unwrap();
            let year: i32 = date[..4].parse().unwrap();
            assert!((2000..=2010).contains(&year));
        }

        server.shutdown().await;
    }
}
