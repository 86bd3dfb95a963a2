//! # reelcheck-e2e
//!
//! Functional, negative and API suites for the Discover app.
//!
//! ## Suites
//!
//! | Suite | Covers |
//! |-------|--------|
//! | `functional` | categories, media type, single and combined filters, pagination |
//! | `negative` | boundary values, inverted ranges, known defects DEF-001 and DEF-002 |
//! | `api` | category and discover endpoints, response shape, invalid pages |
//!
//! Cases are plain [`TestCase`] implementations; [`all_cases`] returns them
//! in execution order for [`reelcheck_core::TestRunner`].

pub mod suites;

use reelcheck_core::TestCase;
use std::sync::Arc;

pub use suites::all_cases;

/// Case ids, paths and markers, one line each, as printed by `--list`.
pub fn describe_cases(cases: &[Arc<dyn TestCase>]) -> Vec<String> {
    cases
        .iter()
        .map(|c| {
            let mut line = format!("{:<48} {}", c.path(), c.title());
            let markers = c.markers();
            if !markers.is_empty() {
                line.push_str(&format!(" [{}]", markers.join(", ")));
            }
            if let Some(defect) = c.known_defect() {
                line.push_str(&format!(" ({defect})"));
            }
            line
        })
        .collect()
}
