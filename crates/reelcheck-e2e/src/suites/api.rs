//! Data API suite. Runs without a browser.

use super::{API, describe_outliers, require_api_access};
use async_trait::async_trait;
use reelcheck_core::api::PAGE_KEYS;
use reelcheck_core::{
    ApiError, ApiResponse, Attachment, CaseError, CaseReport, Category, FilterState, MediaType,
    TestCase, TestContext, validate_shape,
};
use serde_json::Value;
use std::sync::Arc;

/// Results per page the API promises.
const PAGE_SIZE: usize = 20;

pub(super) fn cases() -> Vec<Arc<dyn TestCase>> {
    vec![
        Arc::new(CategoryEndpoints),
        Arc::new(DiscoverByYear),
        Arc::new(DiscoverByRating),
        Arc::new(DiscoverByGenre),
        Arc::new(ParamOrderIndependence),
        Arc::new(PageBeyondRange),
        Arc::new(UnknownEndpoint),
    ]
}

fn release_year(entry: &Value) -> Option<i32> {
    ["release_date", "first_air_date"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .and_then(|date| date.get(..4))
        .and_then(|year| year.parse().ok())
}

fn label(entry: &Value) -> String {
    entry
        .get("title")
        .or_else(|| entry.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("untitled")
        .to_string()
}

fn ids(response: &ApiResponse) -> Vec<u64> {
    response
        .results()
        .iter()
        .filter_map(|e| e.get("id").and_then(Value::as_u64))
        .collect()
}

/// Records the response shape checks shared by every list endpoint.
fn check_page_shape(report: &mut CaseReport, name: &str, response: &ApiResponse, page: u64) {
    let shape = validate_shape(&response.body, PAGE_KEYS);
    let count = response.results().len();
    report
        .check(
            format!("{name} has page keys"),
            shape.is_ok(),
            PAGE_KEYS.join(", "),
            shape.err().map_or_else(|| "all present".to_string(), |e| e.to_string()),
        )
        .check(
            format!("{name} is page {page}"),
            response.page() == Some(page),
            page.to_string(),
            format!("{:?}", response.page()),
        )
        .check(
            format!("{name} page size"),
            count <= PAGE_SIZE,
            format!("<= {PAGE_SIZE}"),
            count.to_string(),
        );
}

pub struct CategoryEndpoints;

#[async_trait]
impl TestCase for CategoryEndpoints {
    fn id(&self) -> &str {
        "API-001"
    }

    fn title(&self) -> &str {
        "Category endpoints return a first page of results"
    }

    fn suite(&self) -> &str {
        API
    }

    fn markers(&self) -> Vec<&str> {
        vec!["smoke"]
    }

    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        require_api_access(ctx)?;
        let mut report = CaseReport::new();
        for category in Category::all() {
            for media in [MediaType::Movie, MediaType::Tv] {
                let name = category.api_path(media);
                let response = ctx.api().fetch_category(*category, media, 1).await?;
                check_page_shape(&mut report, &name, &response, 1);
                let count = response.results().len();
                report.check(format!("{name} not empty"), count > 0, "> 0", count.to_string());
            }
        }
        Ok(report)
    }
}

pub struct DiscoverByYear;

#[async_trait]
impl TestCase for DiscoverByYear {
    fn id(&self) -> &str {
        "API-002"
    }

    fn title(&self) -> &str {
        "Discover honours the release year range"
    }

    fn suite(&self) -> &str {
        API
    }

    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        require_api_access(ctx)?;
        let mut report = CaseReport::new();
        let mut state = FilterState::new();
        state.set_year_range(1990, 2010)?;

        let response = ctx.api().discover(&state).await?;
        report.attach(Attachment::text("Request URL", response.url.clone()));
        check_page_shape(&mut report, "discover", &response, 1);

        let outside: Vec<String> = response
            .results()
            .iter()
            .filter(|e| release_year(e).is_none_or(|y| !(1990..=2010).contains(&y)))
            .map(label)
            .collect();
        report.check(
            "release years within 1990-2010",
            outside.is_empty(),
            "none outside",
            describe_outliers(&outside),
        );
        Ok(report)
    }
}

pub struct DiscoverByRating;

#[async_trait]
impl TestCase for DiscoverByRating {
    fn id(&self) -> &str {
        "API-003"
    }

    fn title(&self) -> &str {
        "Discover honours the rating range"
    }

    fn suite(&self) -> &str {
        API
    }

    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        require_api_access(ctx)?;
        let mut report = CaseReport::new();
        let mut state = FilterState::new().with_media_type(MediaType::Tv);
        state.set_rating_range(6.0, 9.0)?;

        let response = ctx.api().discover(&state).await?;
        check_page_shape(&mut report, "discover", &response, 1);

        let outside: Vec<String> = response
            .results()
            .iter()
            .filter(|e| {
                e.get("vote_average")
                    .and_then(Value::as_f64)
                    .is_none_or(|r| !(6.0..=9.0).contains(&r))
            })
            .map(label)
            .collect();
        report.check(
            "ratings within 6.0-9.0",
            outside.is_empty(),
            "none outside",
            describe_outliers(&outside),
        );
        Ok(report)
    }
}

pub struct DiscoverByGenre;

#[async_trait]
impl TestCase for DiscoverByGenre {
    fn id(&self) -> &str {
        "API-004"
    }

    fn title(&self) -> &str {
        "Discover honours the genre filter"
    }

    fn suite(&self) -> &str {
        API
    }

    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        require_api_access(ctx)?;
        let mut report = CaseReport::new();
        let mut state = FilterState::new();
        state.set_genres(["Drama"]);

        let response = ctx.api().discover(&state).await?;
        report.check(
            "request names the genre id",
            response.url.contains("with_genres=18"),
            "with_genres=18",
            response.url.clone(),
        );

        let others: Vec<String> = response
            .results()
            .iter()
            .filter(|e| {
                !e.get("genre_ids")
                    .and_then(Value::as_array)
                    .is_some_and(|ids| ids.iter().any(|id| id.as_u64() == Some(18)))
            })
            .map(label)
            .collect();
        report.check(
            "every result is a drama",
            others.is_empty(),
            "none without 18",
            describe_outliers(&others),
        );
        Ok(report)
    }
}

/// The same filters sent in a different parameter order give the same page.
pub struct ParamOrderIndependence;

#[async_trait]
impl TestCase for ParamOrderIndependence {
    fn id(&self) -> &str {
        "API-005"
    }

    fn title(&self) -> &str {
        "Query parameter order does not change results"
    }

    fn suite(&self) -> &str {
        API
    }

    fn markers(&self) -> Vec<&str> {
        vec!["regression"]
    }

    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        require_api_access(ctx)?;
        let mut report = CaseReport::new();
        let mut state = FilterState::new();
        state.set_year_range(1980, 2020)?;
        state.set_rating_range(5.0, 9.5)?;
        state.set_genres(["Drama", "Comedy"]);

        let endpoint = state.api_path();
        let params = state.query_params();
        let mut reversed = params.clone();
        reversed.reverse();

        let forward = ctx.api().request(&endpoint, &params).await?;
        let backward = ctx.api().request(&endpoint, &reversed).await?;
        let (a, b) = (ids(&forward), ids(&backward));
        report
            .check(
                "same results",
                a == b,
                format!("{a:?}"),
                format!("{b:?}"),
            )
            .check(
                "same total pages",
                forward.total_pages() == backward.total_pages(),
                format!("{:?}", forward.total_pages()),
                format!("{:?}", backward.total_pages()),
            );
        Ok(report)
    }
}

/// A page far past the data must fail cleanly or come back empty.
pub struct PageBeyondRange;

#[async_trait]
impl TestCase for PageBeyondRange {
    fn id(&self) -> &str {
        "API-006"
    }

    fn title(&self) -> &str {
        "Trending page 999 is refused or empty"
    }

    fn suite(&self) -> &str {
        API
    }

    fn markers(&self) -> Vec<&str> {
        vec!["regression"]
    }

    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        require_api_access(ctx)?;
        let mut report = CaseReport::new();
        match ctx
            .api()
            .fetch_category(Category::Trending, MediaType::Movie, 999)
            .await
        {
            Err(ApiError::Status { status, body, .. }) => {
                report.attach(Attachment::text("Error body", body));
                report.check(
                    "refused with a client error",
                    (400..500).contains(&status),
                    "4xx",
                    status.to_string(),
                );
            }
            Err(e) => return Err(e.into()),
            Ok(response) => {
                let count = response.results().len();
                report.attach(Attachment::json("Response", &response.body));
                report.check("empty result page", count == 0, "0 results", count.to_string());
            }
        }
        Ok(report)
    }
}

pub struct UnknownEndpoint;

#[async_trait]
impl TestCase for UnknownEndpoint {
    fn id(&self) -> &str {
        "API-007"
    }

    fn title(&self) -> &str {
        "Unknown endpoint returns 404"
    }

    fn suite(&self) -> &str {
        API
    }

    fn needs_browser(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        require_api_access(ctx)?;
        let mut report = CaseReport::new();
        let status = match ctx.api().request("movie/not_a_list", &[]).await {
            Err(e) => e.status(),
            Ok(response) => Some(response.status),
        };
        report.check("status is 404", status == Some(404), "404", format!("{status:?}"));
        Ok(report)
    }
}
