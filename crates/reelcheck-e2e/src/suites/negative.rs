//! Negative and edge cases: filter boundaries and the known defects.

use super::{NEGATIVE, check_has_content};
use async_trait::async_trait;
use reelcheck_core::{
    CaseError, CaseReport, DEF_001, DEF_002, DiscoverPage, PageError, PaginationState,
    SERIAL_MARKER, TestCase, TestContext,
};
use std::sync::Arc;

pub(super) fn cases() -> Vec<Arc<dyn TestCase>> {
    vec![
        Arc::new(RejectedRange {
            id: "TC-040",
            title: "Year below 1900 is rejected, never silently applied",
            bounds: Bounds::Year(1899, 2026),
        }),
        Arc::new(RejectedRange {
            id: "TC-041",
            title: "Year after 2026 is rejected",
            bounds: Bounds::Year(1900, 2027),
        }),
        Arc::new(RejectedRange {
            id: "TC-042",
            title: "Inverted year range is rejected",
            bounds: Bounds::Year(2010, 1990),
        }),
        Arc::new(RejectedRange {
            id: "TC-043",
            title: "Rating below 0 is rejected",
            bounds: Bounds::Rating(-1.0, 5.0),
        }),
        Arc::new(RejectedRange {
            id: "TC-044",
            title: "Rating above 10 is rejected",
            bounds: Bounds::Rating(5.0, 10.5),
        }),
        Arc::new(RejectedRange {
            id: "TC-045",
            title: "Inverted rating range is rejected",
            bounds: Bounds::Rating(8.0, 3.0),
        }),
        Arc::new(BoundaryValuesAccepted),
        Arc::new(DirectSlugNavigation),
        Arc::new(LastPagePagination),
        Arc::new(PaginationPastData),
    ]
}

#[derive(Debug, Clone, Copy)]
enum Bounds {
    Year(i32, i32),
    Rating(f32, f32),
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bounds::Year(min, max) => write!(f, "years {min}-{max}"),
            Bounds::Rating(min, max) => write!(f, "rating {min:.1}-{max:.1}"),
        }
    }
}

/// An invalid range must be refused twice: by the page object before
/// anything is typed, and by the app itself when typed in anyway.
struct RejectedRange {
    id: &'static str,
    title: &'static str,
    bounds: Bounds,
}

impl RejectedRange {
    async fn apply_checked(&self, page: &mut DiscoverPage<'_>) -> Result<(), PageError> {
        match self.bounds {
            Bounds::Year(min, max) => page.set_year_range(min, max).await,
            Bounds::Rating(min, max) => page.set_rating_range(min, max).await,
        }
    }

    async fn submit_raw(&self, page: &mut DiscoverPage<'_>) -> Result<(), CaseError> {
        match self.bounds {
            Bounds::Year(min, max) => page.submit_raw_year_range(min, max).await?,
            Bounds::Rating(min, max) => page.submit_raw_rating_range(min, max).await?,
        }
        Ok(())
    }
}

#[async_trait]
impl TestCase for RejectedRange {
    fn id(&self) -> &str {
        self.id
    }

    fn title(&self) -> &str {
        self.title
    }

    fn suite(&self) -> &str {
        NEGATIVE
    }

    fn module(&self) -> Option<&str> {
        Some("boundaries")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["regression"]
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        let state_before = page.filter_state().clone();

        match self.apply_checked(&mut page).await {
            Err(PageError::Filter(e)) => {
                report.check("refused before typing", true, "a filter error", e.to_string());
            }
            Err(e) => return Err(e.into()),
            Ok(()) => {
                report.check("refused before typing", false, "a filter error", "accepted");
            }
        }

        let sent_before = page.network().await?.requests(None).len();
        self.submit_raw(&mut page).await?;
        let message = page.validation_message().await?;
        let sent_after = page.network().await?.requests(None).len();

        report
            .check(
                format!("app rejects {}", self.bounds),
                message.is_some(),
                "a validation message",
                message.unwrap_or_else(|| "none".to_string()),
            )
            .check(
                "no data request for rejected input",
                sent_after == sent_before,
                sent_before.to_string(),
                sent_after.to_string(),
            )
            .check(
                "tracked filters unchanged",
                *page.filter_state() == state_before,
                format!("{state_before:?}"),
                format!("{:?}", page.filter_state()),
            );
        Ok(report)
    }
}

/// The outermost valid values are accepted.
pub struct BoundaryValuesAccepted;

#[async_trait]
impl TestCase for BoundaryValuesAccepted {
    fn id(&self) -> &str {
        "TC-046"
    }

    fn title(&self) -> &str {
        "Boundary years 1900-2026 and ratings 0-10 are accepted"
    }

    fn suite(&self) -> &str {
        NEGATIVE
    }

    fn module(&self) -> Option<&str> {
        Some("boundaries")
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;

        page.set_year_range(1900, 2026).await?;
        let rejected = page.has_validation_message().await?;
        report.check("years 1900-2026 accepted", !rejected, "no validation message", rejected.to_string());

        page.set_rating_range(0.0, 10.0).await?;
        let rejected = page.has_validation_message().await?;
        report.check("ratings 0-10 accepted", !rejected, "no validation message", rejected.to_string());

        check_has_content(&mut page, &mut report).await?;
        Ok(report)
    }
}

/// DEF-001: loading a category by its slug URL.
pub struct DirectSlugNavigation;

#[async_trait]
impl TestCase for DirectSlugNavigation {
    fn id(&self) -> &str {
        "TC-050"
    }

    fn title(&self) -> &str {
        "Direct navigation to a category slug renders the category"
    }

    fn suite(&self) -> &str {
        NEGATIVE
    }

    fn module(&self) -> Option<&str> {
        Some("known_defects")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["defect"]
    }

    fn known_defect(&self) -> Option<&str> {
        Some(DEF_001)
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/popular").await?;

        let not_found = page.has_not_found().await?;
        let results = page.has_results().await?;
        let url = page.current_url().await?;
        report.observe_defect(
            DEF_001,
            not_found || !results,
            format!("{url}: not_found={not_found}, results={results}"),
        );
        Ok(report)
    }
}

/// Reads the pagination state after a page change. A page that never
/// finishes loading counts as `Loading`.
async fn settled_state(
    page: &mut DiscoverPage<'_>,
    moved: Result<(), CaseError>,
) -> Result<PaginationState, CaseError> {
    match moved {
        Ok(()) => Ok(page.pagination_state().await?),
        Err(e) if e.is_timeout() => Ok(PaginationState::Loading),
        Err(e) => Err(e),
    }
}

fn defect_002_shows(state: PaginationState) -> bool {
    matches!(state, PaginationState::Error | PaginationState::Loading)
}

/// DEF-002: the paginator's own last page.
pub struct LastPagePagination;

#[async_trait]
impl TestCase for LastPagePagination {
    fn id(&self) -> &str {
        "TC-051"
    }

    fn title(&self) -> &str {
        "Last page advertised by the paginator loads"
    }

    fn suite(&self) -> &str {
        NEGATIVE
    }

    fn module(&self) -> Option<&str> {
        Some("known_defects")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["defect", SERIAL_MARKER]
    }

    fn known_defect(&self) -> Option<&str> {
        Some(DEF_002)
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;

        let advertised = page.last_page_number().await?;
        report.check(
            "paginator offers a last page",
            advertised.is_some(),
            "a page number",
            format!("{advertised:?}"),
        );
        if advertised.is_none() {
            return Ok(report);
        }

        let moved = page.go_to_last_page().await.map(|_| ()).map_err(CaseError::from);
        let state = settled_state(&mut page, moved).await?;
        report.observe_defect(
            DEF_002,
            defect_002_shows(state),
            format!("page {} ended {state}", advertised.unwrap_or_default()),
        );
        Ok(report)
    }
}

/// DEF-002: a page number beyond a filtered result set.
pub struct PaginationPastData;

#[async_trait]
impl TestCase for PaginationPastData {
    fn id(&self) -> &str {
        "TC-052"
    }

    fn title(&self) -> &str {
        "Page beyond the filtered results ends cleanly"
    }

    fn suite(&self) -> &str {
        NEGATIVE
    }

    fn module(&self) -> Option<&str> {
        Some("known_defects")
    }

    fn markers(&self) -> Vec<&str> {
        vec!["defect"]
    }

    fn known_defect(&self) -> Option<&str> {
        Some(DEF_002)
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<CaseReport, CaseError> {
        let mut report = CaseReport::new();
        let mut page = ctx.discover_page()?;
        page.open("/").await?;
        page.set_year_range(2020, 2020).await?;

        let moved = page.go_to_page(5).await.map_err(CaseError::from);
        let state = settled_state(&mut page, moved).await?;
        report.observe_defect(DEF_002, defect_002_shows(state), format!("page 5 ended {state}"));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defect_002_states() {
        assert!(defect_002_shows(PaginationState::Error));
        assert!(defect_002_shows(PaginationState::Loading));
        assert!(!defect_002_shows(PaginationState::EndOfResults));
        assert!(!defect_002_shows(PaginationState::Loaded));
    }

    #[test]
    fn test_last_page_case_runs_alone() {
        assert!(LastPagePagination.is_serial());
        assert!(!PaginationPastData.is_serial());
        assert_eq!(LastPagePagination.path(), "negative/known_defects::TC-051");
    }

    #[test]
    fn test_bounds_display() {
        assert_eq!(Bounds::Year(1899, 2026).to_string(), "years 1899-2026");
        assert_eq!(Bounds::Rating(5.0, 10.5).to_string(), "rating 5.0-10.5");
    }
}
