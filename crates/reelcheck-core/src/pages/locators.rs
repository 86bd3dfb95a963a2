//! CSS selectors for the Discover app.
//!
//! Only page objects (and the simulated app that renders them) refer to
//! these; test cases talk in domain actions.

use crate::filters::Category;

// Result area
pub const RESULTS_GRID: &str = ".movies-grid";
pub const RESULT_CARD: &str = ".movie-card";
pub const LOADING_SPINNER: &str = ".loading-spinner";
pub const ERROR_BANNER: &str = ".error-banner";
pub const NO_RESULTS: &str = ".no-results";
pub const END_OF_RESULTS: &str = ".end-of-results";
pub const NOT_FOUND: &str = ".not-found";
pub const VALIDATION_MESSAGE: &str = ".validation-error";

// Filter form
pub const MEDIA_TYPE_SELECT: &str = "select#media-type";
pub const GENRE_SELECT: &str = "select#genres";
pub const YEAR_MIN_INPUT: &str = "input#year-min";
pub const YEAR_MAX_INPUT: &str = "input#year-max";
pub const RATING_MIN_INPUT: &str = "input#rating-min";
pub const RATING_MAX_INPUT: &str = "input#rating-max";
pub const APPLY_FILTERS: &str = "button#apply-filters";

// Pagination
pub const PAGINATION: &str = ".pagination";
pub const CURRENT_PAGE: &str = ".pagination-current";
pub const NEXT_PAGE: &str = ".pagination-next";
pub const LAST_PAGE: &str = ".pagination-last";
pub const PAGE_INPUT: &str = "input#page-input";
pub const PAGE_GO: &str = "button#page-go";

/// Tab that switches to `category`.
pub fn category_button(category: Category) -> String {
    format!("[data-category=\"{}\"]", category.slug())
}
