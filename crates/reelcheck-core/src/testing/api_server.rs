//! Simulated data API served over HTTP with axum.
//!
//! Answers the category and discover endpoints from the same catalogue the
//! simulated UI renders, and rejects pages above the cap with the data API's
//! 422 body.

use super::catalogue::CatalogueQuery;
use super::driver::SimulatedApp;
use crate::filters::{Category, MediaType};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "status_code": 34,
            "status_message": "The resource you requested could not be found.",
        })),
    )
}

fn invalid_page(cap: u32) -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "success": false,
            "status_code": 22,
            "status_message": format!(
                "Invalid page: Pages start at 1 and max at {cap}. They are expected to be an integer."
            ),
        })),
    )
}

/// Maps an endpoint path to the query it serves.
fn route(path: &str) -> Option<CatalogueQuery> {
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (category, media) = match parts.as_slice() {
        ["discover", media] => (Category::Popular, media.parse::<MediaType>().ok()?),
        ["trending", media, "week" | "day"] => (Category::Trending, media.parse().ok()?),
        ["movie", "now_playing"] => (Category::Newest, MediaType::Movie),
        ["tv", "on_the_air"] => (Category::Newest, MediaType::Tv),
        [media, list] => {
            let media: MediaType = media.parse().ok()?;
            let category = match *list {
                "popular" => Category::Popular,
                "top_rated" => Category::TopRated,
                _ => return None,
            };
            (category, media)
        }
        _ => return None,
    };
    Some(CatalogueQuery {
        category,
        media,
        ..CatalogueQuery::default()
    })
}

fn apply_discover_params(query: &mut CatalogueQuery, params: &HashMap<String, String>) {
    let year_of = |key: &str| {
        params
            .get(key)
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse::<i32>().ok())
    };
    let date_prefix = match query.media {
        MediaType::Movie => "primary_release_date",
        MediaType::Tv => "first_air_date",
    };
    let (gte, lte) = (
        year_of(&format!("{date_prefix}.gte")),
        year_of(&format!("{date_prefix}.lte")),
    );
    if gte.is_some() || lte.is_some() {
        query.years = Some((gte.unwrap_or(i32::MIN), lte.unwrap_or(i32::MAX)));
    }

    let rating_of = |key: &str| params.get(key).and_then(|r| r.parse::<f32>().ok());
    let (lo, hi) = (rating_of("vote_average.gte"), rating_of("vote_average.lte"));
    if lo.is_some() || hi.is_some() {
        query.rating = Some((lo.unwrap_or(f32::MIN), hi.unwrap_or(f32::MAX)));
    }

    if let Some(genres) = params.get("with_genres") {
        let mut ids: Vec<u32> = genres
            .split(',')
            .filter_map(|g| g.trim().parse().ok())
            .collect();
        ids.sort_unstable();
        query.genres = ids;
    }

    query.category = match params.get("sort_by").map(String::as_str) {
        Some("vote_average.desc") => Category::TopRated,
        Some("primary_release_date.desc" | "first_air_date.desc") => Category::Newest,
        _ => Category::Popular,
    };
}

async fn list(
    State(app): State<Arc<SimulatedApp>>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    debug!(path = %path, ?params, "Simulated API request");
    let mut query = route(&path).ok_or_else(not_found)?;
    if path.starts_with("discover") {
        apply_discover_params(&mut query, &params);
    }

    let page = match params.get("page") {
        None => 1,
        Some(raw) => match raw.parse::<u32>() {
            Ok(p) if p >= 1 && p <= app.page_cap => p,
            _ => return Err(invalid_page(app.page_cap)),
        },
    };

    Ok(Json(app.catalogue.page(&query, page).to_json()))
}

/// Router for the simulated data API.
pub fn router(app: SimulatedApp) -> Router {
    Router::new()
        .route("/3/{*path}", get(list))
        .with_state(Arc::new(app))
}

/// A running simulated API bound to a local port.
pub struct SimulatedApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SimulatedApiServer {
    /// Starts the server with the default simulated app.
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(SimulatedApp::default()).await
    }

    pub async fn start_with(app: SimulatedApp) -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router(app))
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::warn!("Simulated API stopped with error: {}", e);
            }
        });

        info!("Simulated API listening on {}", addr);
        Ok(Self {
            addr,
            shutdown: Some(tx),
            task,
        })
    }

    /// Base URL including the API version segment.
    pub fn base_url(&self) -> String {
        format!("http://{}/3", self.addr)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SimulatedApiServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
