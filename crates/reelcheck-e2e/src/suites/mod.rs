//! Test suites.
//!
//! Each case records what it observed in a [`CaseReport`]; the runner
//! decides the final status. Cases that characterise a known defect report
//! whether its symptom showed up with [`CaseReport::observe_defect`] instead
//! of asserting on it.

mod api;
mod functional;
mod negative;

use reelcheck_core::config::DEFAULT_API_BASE_URL;
use reelcheck_core::pages::ResultItem;
use reelcheck_core::{Attachment, CaseError, CaseReport, DiscoverPage, TestCase, TestContext};
use std::sync::Arc;

pub const FUNCTIONAL: &str = "functional";
pub const NEGATIVE: &str = "negative";
pub const API: &str = "api";

/// Every case, functional first.
pub fn all_cases() -> Vec<Arc<dyn TestCase>> {
    let mut cases = functional::cases();
    cases.extend(negative::cases());
    cases.extend(api::cases());
    cases
}

/// Attaches the page's current URL under `name`.
async fn attach_url(
    page: &mut DiscoverPage<'_>,
    report: &mut CaseReport,
    name: &str,
) -> Result<String, CaseError> {
    let url = page.current_url().await?;
    report.attach(Attachment::text(name, url.clone()));
    Ok(url)
}

/// Records that the page shows either results or the no-results message.
async fn check_has_content(
    page: &mut DiscoverPage<'_>,
    report: &mut CaseReport,
) -> Result<(), CaseError> {
    let results = page.has_results().await?;
    let empty = page.has_no_results_message().await?;
    report.check(
        "results or no-results message shown",
        results || empty,
        "results grid or no-results message",
        format!("results={results}, no_results={empty}"),
    );
    Ok(())
}

/// Records that the last data request carried each `param`.
async fn check_last_request(
    page: &mut DiscoverPage<'_>,
    report: &mut CaseReport,
    params: &[(&str, &str)],
) -> Result<(), CaseError> {
    let capture = page.network().await?;
    let last = capture.last_request().map(|r| r.url.clone());
    let matches = capture.validate_request_contains("", params);
    report.check(
        "data request carries the filters",
        matches,
        format!("{params:?}"),
        last.clone().unwrap_or_else(|| "no request".to_string()),
    );
    if let Some(url) = last {
        report.attach(Attachment::text("API request URL", url));
    }
    Ok(())
}

/// Items whose year lies outside `min..=max`, as `title (year)`.
fn years_outside(items: &[ResultItem], min: i32, max: i32) -> Vec<String> {
    items
        .iter()
        .filter(|i| i.year.is_none_or(|y| y < min || y > max))
        .map(|i| format!("{} ({:?})", i.title, i.year))
        .collect()
}

fn ratings_outside(items: &[ResultItem], min: f32, max: f32) -> Vec<String> {
    items
        .iter()
        .filter(|i| i.rating.is_none_or(|r| r < min || r > max))
        .map(|i| format!("{} ({:?})", i.title, i.rating))
        .collect()
}

fn describe_outliers(outliers: &[String]) -> String {
    if outliers.is_empty() {
        "none".to_string()
    } else {
        outliers.join(", ")
    }
}

/// Skips when the data API needs a key and none is configured.
fn require_api_access(ctx: &TestContext) -> Result<(), CaseError> {
    let base = ctx.api().base_url().trim_end_matches('/');
    if !ctx.api().has_credentials() && base == DEFAULT_API_BASE_URL {
        return Err(CaseError::skip("API_KEY is not set for the public data API"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_ids_and_paths_are_unique() {
        let cases = all_cases();
        let ids: BTreeSet<&str> = cases.iter().map(|c| c.id()).collect();
        assert_eq!(ids.len(), cases.len());
        let paths: BTreeSet<String> = cases.iter().map(|c| c.path()).collect();
        assert_eq!(paths.len(), cases.len());
    }

    #[test]
    fn test_every_suite_is_populated() {
        let cases = all_cases();
        for suite in [FUNCTIONAL, NEGATIVE, API] {
            assert!(cases.iter().any(|c| c.suite() == suite), "{suite} is empty");
        }
        assert!(
            cases
                .iter()
                .filter(|c| c.suite() == API)
                .all(|c| !c.needs_browser())
        );
    }

    #[test]
    fn test_known_defects_are_registered() {
        let registry = reelcheck_core::DefectRegistry::builtin();
        for case in all_cases() {
            if let Some(defect) = case.known_defect() {
                assert!(registry.lookup(defect).is_some(), "{defect} unknown");
            }
        }
    }

    #[test]
    fn test_outlier_helpers() {
        let item = |year: Option<i32>, rating: Option<f32>| ResultItem {
            id: Some(1),
            title: "Echo Line 1".to_string(),
            year,
            rating,
            media_type: None,
            genres: Vec::new(),
        };
        let items = vec![item(Some(1995), Some(7.5)), item(Some(2012), None)];
        assert_eq!(years_outside(&items, 1990, 2010).len(), 1);
        assert_eq!(ratings_outside(&items, 5.0, 8.0).len(), 1);
        assert_eq!(describe_outliers(&[]), "none");
    }
}
