//! Functional suite: categories, media type, filters and pagination on the
//! happy path.

use super::{
    FUNCTIONAL, attach_url, check_has_content, check_last_request, describe_outliers,
    ratings_outside, years_outside,
};
use async_trait::async_trait;
use reelcheck_core::{
    Attachment, CaseError, CaseReport, Category, MediaType, TestCase, TestContext,
};
use std::sync::Arc;

pub(super) fn cases() -> Vec<Arc<dyn TestCase>> {
    vec![
        Arc::new(PopularMoviesLoad),
        Arc::new(CategoryTabs),
        Arc::new(TvMediaType),
        Arc::new(YearRangeFilter),
        Arc::new(RatingRangeFilter),
        Arc::new(GenreFilter),
        Arc::new(FilterOrderIdempotence),
        Arc::new(NextPage),
        Arc::new(CategoryAndType),
        Arc::new(CategoryTypeYear),
        Arc::new(AllFiltersCombined),
        Arc::new(FiltersPersistDuringPagination),
    ]
}

/// Popular movies, first page: results render without console errors.
pub struct PopularMoviesLoad;

#[async_trait]
impl TestCase for PopularMoviesLoad {
    fn id(&self) -> &str {
        "TC-001"
    }

    fn title(&self) -> &str {
        "Popular movies load on the first page"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("categories")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["smoke", "critical"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.select_category(Category::Popular).await?;
        page.set_media_type(MediaType::Movie).await?;

        let count = page.result_count().await?;
        report.check("results shown", count > 0, "> 0", count.to_string());
        let current = page.current_page_number().await?;
        report.check(
            "on page 1",
            current == Some(1),
            "Some(1)",
            format!("{current:?}"),
        );
        let errors = page.console_errors().await?;
        report.check(
            "no console errors",
            errors.is_empty(),
            "none",
            describe_outliers(&errors),
        );
        attach_url(&mut page, &mut report, "Current URL").await?;
        Ok(report)
    }
}

/// Every category tab shows results and is reflected in the URL.
pub struct CategoryTabs;

#[async_trait]
impl TestCase for CategoryTabs {
    fn id(&self) -> &str {
        "TC-002"
    }

    fn title(&self) -> &str {
        "Each category tab loads its own results"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("categories")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["regression"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;

        for category in Category::all() {
            page.select_category(*category).await?;
            let count = page.result_count().await?;
            report.check(
                format!("{category} shows results"),
                count > 0,
                "> 0",
                count.to_string(),
            );
            let url = page.current_url().await?;
            report.check(
                format!("{category} in URL"),
                url.contains(category.slug()),
                category.slug(),
                url,
            );
        }
        Ok(report)
    }
}

/// Switching to TV shows lists only TV shows.
pub struct TvMediaType;

#[async_trait]
impl TestCase for TvMediaType {
    fn id(&self) -> &str {
        "TC-003"
    }

    fn title(&self) -> &str {
        "TV media type lists TV shows only"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("categories")
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.set_media_type(MediaType::Tv).await?;

        let items = page.visible_items().await?;
        report.check("results shown", !items.is_empty(), "> 0", items.len().to_string());
        let others: Vec<String> = items
            .iter()
            .filter(|i| i.media_type.is_some_and(|m| m != MediaType::Tv))
            .map(|i| i.title.clone())
            .collect();
        report.check(
            "only TV shows",
            others.is_empty(),
            "none",
            describe_outliers(&others),
        );

        let capture = page.network().await?;
        let tv_requests = capture.requests(Some("/tv/")).len();
        report.check(
            "TV endpoint requested",
            tv_requests > 0,
            "> 0 requests to /tv/",
            tv_requests.to_string(),
        );
        Ok(report)
    }
}

/// Year range filter: every card falls inside the range.
pub struct YearRangeFilter;

#[async_trait]
impl TestCase for YearRangeFilter {
    fn id(&self) -> &str {
        "TC-010"
    }

    fn title(&self) -> &str {
        "Year range filter limits results to the range"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("filters")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["regression"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.set_year_range(1990, 2010).await?;

        check_has_content(&mut page, &mut report).await?;
        let items = page.visible_items().await?;
        let outside = years_outside(&items, 1990, 2010);
        report.check(
            "years within 1990-2010",
            outside.is_empty(),
            "none outside",
            describe_outliers(&outside),
        );
        check_last_request(
            &mut page,
            &mut report,
            &[
                ("primary_release_date.gte", "1990-01-01"),
                ("primary_release_date.lte", "2010-12-31"),
            ],
        )
        .await?;
        Ok(report)
    }
}

pub struct RatingRangeFilter;

#[async_trait]
impl TestCase for RatingRangeFilter {
    fn id(&self) -> &str {
        "TC-011"
    }

    fn title(&self) -> &str {
        "Rating range filter limits results to the range"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("filters")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["regression"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.set_rating_range(6.0, 9.0).await?;

        check_has_content(&mut page, &mut report).await?;
        let items = page.visible_items().await?;
        let outside = ratings_outside(&items, 6.0, 9.0);
        report.check(
            "ratings within 6.0-9.0",
            outside.is_empty(),
            "none outside",
            describe_outliers(&outside),
        );
        check_last_request(
            &mut page,
            &mut report,
            &[("vote_average.gte", "6.0"), ("vote_average.lte", "9.0")],
        )
        .await?;
        Ok(report)
    }
}

pub struct GenreFilter;

#[async_trait]
impl TestCase for GenreFilter {
    fn id(&self) -> &str {
        "TC-012"
    }

    fn title(&self) -> &str {
        "Genre filter shows only the selected genre"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("filters")
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.select_genres(&["Drama"]).await?;

        check_has_content(&mut page, &mut report).await?;
        let items = page.visible_items().await?;
        let others: Vec<String> = items
            .iter()
            .filter(|i| !i.genres.is_empty() && !i.genres.iter().any(|g| g == "Drama"))
            .map(|i| i.title.clone())
            .collect();
        report.check(
            "every card is a drama",
            others.is_empty(),
            "none without Drama",
            describe_outliers(&others),
        );
        check_last_request(&mut page, &mut report, &[("with_genres", "18")]).await?;
        Ok(report)
    }
}

/// Applying the same filters in a different order gives the same page and
/// the same data request.
pub struct FilterOrderIdempotence;

#[async_trait]
impl TestCase for FilterOrderIdempotence {
    fn id(&self) -> &str {
        "TC-020"
    }

    fn title(&self) -> &str {
        "Filter order does not change the results"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("filters")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["regression"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;

        page.open("/").await?;
        page.set_year_range(1980, 2020).await?;
        page.set_rating_range(5.0, 9.0).await?;
        let first_state = page.filter_state().clone();
        let first_ids: Vec<Option<u32>> =
            page.visible_items().await?.iter().map(|i| i.id).collect();
        let first_request = page.network().await?.last_request().map(|r| r.url.clone());

        page.open("/").await?;
        page.set_rating_range(5.0, 9.0).await?;
        page.set_year_range(1980, 2020).await?;
        let second_state = page.filter_state().clone();
        let second_ids: Vec<Option<u32>> =
            page.visible_items().await?.iter().map(|i| i.id).collect();
        let second_request = page.network().await?.last_request().map(|r| r.url.clone());

        report
            .check(
                "same filter state",
                first_state == second_state,
                format!("{first_state:?}"),
                format!("{second_state:?}"),
            )
            .check(
                "same results in the same order",
                first_ids == second_ids,
                format!("{} ids", first_ids.len()),
                format!("{} ids, equal={}", second_ids.len(), first_ids == second_ids),
            )
            .check(
                "same data request",
                first_request == second_request,
                first_request.clone().unwrap_or_default(),
                second_request.unwrap_or_default(),
            );
        Ok(report)
    }
}

pub struct NextPage;

#[async_trait]
impl TestCase for NextPage {
    fn id(&self) -> &str {
        "TC-030"
    }

    fn title(&self) -> &str {
        "Next page shows a new set of results"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("pagination")
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;

        let before: Vec<Option<u32>> = page.visible_items().await?.iter().map(|i| i.id).collect();
        let available = page.is_next_page_available().await?;
        report.check("next page offered", available, "true", available.to_string());
        if !available {
            return Ok(report);
        }

        page.next_page().await?;
        let after: Vec<Option<u32>> = page.visible_items().await?.iter().map(|i| i.id).collect();
        let current = page.current_page_number().await?;
        report
            .check("on page 2", current == Some(2), "Some(2)", format!("{current:?}"))
            .check(
                "different results",
                !after.is_empty() && before.iter().all(|id| !after.contains(id)),
                "no overlap with page 1",
                format!("{} results", after.len()),
            );
        let url = attach_url(&mut page, &mut report, "URL after pagination").await?;
        report.check("page in URL", url.contains("page=2"), "page=2", url);
        Ok(report)
    }
}

/// TC-035: category and media type together.
pub struct CategoryAndType;

#[async_trait]
impl TestCase for CategoryAndType {
    fn id(&self) -> &str {
        "TC-035"
    }

    fn title(&self) -> &str {
        "Verify Category + Type Combined Filters"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("combined_filters")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["high", "regression"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.select_category(Category::TopRated).await?;
        page.set_media_type(MediaType::Movie).await?;

        let url = attach_url(&mut page, &mut report, "Current URL").await?;
        report.check(
            "URL reflects both filters",
            url.contains(Category::TopRated.slug()) && url.contains("movie"),
            "top-rated and movie",
            url,
        );

        let count = page.result_count().await?;
        report.attach(Attachment::text("Results Count", count.to_string()));
        report.check("results shown", count > 0, "> 0", count.to_string());

        let last = page.network().await?.last_request().map(|r| r.url.clone());
        match last {
            Some(url) => {
                report.attach(Attachment::text("API Request URL", url.clone()));
                report.check(
                    "API request for top rated movies",
                    url.contains("top_rated") && url.contains("movie"),
                    "top_rated and movie",
                    url,
                );
            }
            None => {
                report.check("API request captured", false, "a request", "none");
            }
        }
        Ok(report)
    }
}

/// TC-036: category, media type and a single release year.
pub struct CategoryTypeYear;

#[async_trait]
impl TestCase for CategoryTypeYear {
    fn id(&self) -> &str {
        "TC-036"
    }

    fn title(&self) -> &str {
        "Verify Category + Type + Year Combined Filters"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("combined_filters")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["high"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.select_category(Category::Popular).await?;
        page.set_media_type(MediaType::Movie).await?;
        page.set_year_range(2020, 2020).await?;

        check_has_content(&mut page, &mut report).await?;
        let state = page.filter_state();
        let persisted = state.category == Category::Popular
            && state.media_type == MediaType::Movie
            && state.year_range.is_some_and(|r| r.min == 2020 && r.max == 2020);
        report.check(
            "all filters persist",
            persisted,
            "popular, movie, 2020",
            format!("{state:?}"),
        );
        let outside = years_outside(&page.visible_items().await?, 2020, 2020);
        report.check(
            "only 2020 releases",
            outside.is_empty(),
            "none outside",
            describe_outliers(&outside),
        );
        Ok(report)
    }
}

/// TC-037: every filter dimension at once.
pub struct AllFiltersCombined;

#[async_trait]
impl TestCase for AllFiltersCombined {
    fn id(&self) -> &str {
        "TC-037"
    }

    fn title(&self) -> &str {
        "Verify All Filters Combined"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("combined_filters")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["medium", "regression"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.select_category(Category::TopRated).await?;
        page.set_media_type(MediaType::Movie).await?;
        page.set_year_range(2020, 2020).await?;
        page.set_rating_range(8.0, 10.0).await?;

        let count = page.result_count().await?;
        report.attach(Attachment::text("Results Count", count.to_string()));
        check_has_content(&mut page, &mut report).await?;

        let items = page.visible_items().await?;
        let outside: Vec<String> = years_outside(&items, 2020, 2020)
            .into_iter()
            .chain(ratings_outside(&items, 8.0, 10.0))
            .collect();
        report.check(
            "results match every filter",
            outside.is_empty(),
            "none outside",
            describe_outliers(&outside),
        );
        Ok(report)
    }
}

/// TC-038: filters survive a page change.
pub struct FiltersPersistDuringPagination;

#[async_trait]
impl TestCase for FiltersPersistDuringPagination {
    fn id(&self) -> &str {
        "TC-038"
    }

    fn title(&self) -> &str {
        "Verify Filters Persist During Pagination"
    }

    fn suite(&self) -> &str {
        FUNCTIONAL
    }

    fn module(&self) -> Option<&str> {
        Some("combined_filters")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["medium"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.select_category(Category::Popular).await?;
        page.set_media_type(MediaType::Movie).await?;

        attach_url(&mut page, &mut report, "URL Before Pagination").await?;
        if page.is_next_page_available().await? {
            page.next_page().await?;
        }
        let after = attach_url(&mut page, &mut report, "URL After Pagination").await?;
        let lower = after.to_lowercase();
        report.check(
            "filters persist in URL",
            lower.contains("popular") && lower.contains("movie"),
            "popular and movie",
            after,
        );
        let state = page.filter_state();
        report.check(
            "tracked filters unchanged",
            state.category == Category::Popular && state.media_type == MediaType::Movie,
            "popular, movie",
            format!("{}, {}", state.category, state.media_type),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_filter_paths() {
        assert_eq!(CategoryAndType.path(), "functional/combined_filters::TC-035");
        assert_eq!(PopularMoviesLoad.path(), "functional/categories::TC-001");
        assert!(cases().iter().all(|c| c.needs_browser()));
    }
}
