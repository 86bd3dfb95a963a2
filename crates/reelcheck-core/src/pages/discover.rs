//! The Discover page: category tabs, filter form, result grid, paginator.

use super::{BasePage, ChangeMark, PageError, locators};
use crate::api::NetworkCapture;
use crate::browser::{BrowserSession, InteractionError};
use crate::config::RunConfiguration;
use crate::filters::{Category, FilterError, FilterState, MediaType, format_rating};
use serde::Serialize;
use tracing::{debug, info};

/// What the result area shows after a page change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationState {
    Loaded,
    Loading,
    Error,
    EndOfResults,
}

impl std::fmt::Display for PaginationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaginationState::Loaded => "loaded",
            PaginationState::Loading => "loading",
            PaginationState::Error => "error",
            PaginationState::EndOfResults => "end_of_results",
        };
        f.write_str(s)
    }
}

/// One rendered result card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    pub id: Option<u32>,
    pub title: String,
    pub year: Option<i32>,
    pub rating: Option<f32>,
    pub media_type: Option<MediaType>,
    pub genres: Vec<String>,
}

/// Page object for the Discover screen.
///
/// Tracks the [`FilterState`] it has applied through the UI. Actions return
/// once the app has answered (a new data exchange or a validation message)
/// and the loading indicator is gone; queries answer from the current render
/// and never change it.
pub struct DiscoverPage<'a> {
    base: BasePage<'a>,
    state: FilterState,
}

impl<'a> DiscoverPage<'a> {
    pub fn new(session: &'a mut BrowserSession, config: &'a RunConfiguration) -> Self {
        Self {
            base: BasePage::new(session, config),
            state: FilterState::default(),
        }
    }

    pub fn base(&mut self) -> &mut BasePage<'a> {
        &mut self.base
    }

    /// Waits for the update started after `mark`. A validation message also
    /// counts as the app's answer, since rejected input makes no request.
    async fn settle(&mut self, mark: ChangeMark) -> Result<(), InteractionError> {
        let timeout = self.base.config().action_timeout;
        self.base
            .wait_for_change(mark, &[locators::VALIDATION_MESSAGE], timeout)
            .await
    }

    async fn settle_idle(&mut self) -> Result<(), InteractionError> {
        let timeout = self.base.config().action_timeout;
        self.base.wait_until_idle(timeout).await
    }

    async fn click_and_settle(
        &mut self,
        selector: &str,
        description: &str,
    ) -> Result<(), InteractionError> {
        let mark = self.base.mark().await?;
        self.base.click_element(selector, description).await?;
        self.settle(mark).await
    }

    async fn is_active_tab(&mut self, category: Category) -> Result<bool, InteractionError> {
        let tabs = self
            .base
            .session()
            .snapshot(&locators::category_button(category))
            .await?;
        Ok(tabs.first().and_then(|t| t.attr("data-active")) == Some("true"))
    }

    /// Loads `path` (usually `/`) and resets the tracked state.
    pub async fn open(&mut self, path: &str) -> Result<(), InteractionError> {
        self.state = FilterState::default();
        if let Ok(category) = path.trim_matches('/').parse::<Category>() {
            self.state.category = category;
        }
        self.base.navigate(path).await
    }

    pub async fn select_category(&mut self, category: Category) -> Result<(), InteractionError> {
        let selector = locators::category_button(category);
        // Re-clicking the tab already on page 1 fetches nothing new.
        let shown = self.is_active_tab(category).await? && self.state.page == 1;
        let mark = self.base.mark().await?;
        self.base
            .click_element(&selector, &format!("{category} tab"))
            .await?;
        if shown {
            debug!(%category, "Category already shown");
            self.settle_idle().await?;
        } else {
            self.settle(mark).await?;
        }
        self.state.category = category;
        self.state.page = 1;
        Ok(())
    }

    pub async fn set_media_type(&mut self, media: MediaType) -> Result<(), InteractionError> {
        let shown = self.state.media_type == media;
        let mark = self.base.mark().await?;
        self.base
            .select_option(
                locators::MEDIA_TYPE_SELECT,
                &[media.as_str().to_string()],
                "media type",
            )
            .await?;
        if shown {
            self.settle_idle().await?;
        } else {
            self.settle(mark).await?;
        }
        self.state.media_type = media;
        self.state.page = 1;
        Ok(())
    }

    async fn apply_filters(&mut self) -> Result<(), InteractionError> {
        self.click_and_settle(locators::APPLY_FILTERS, "apply filters")
            .await
    }

    /// Applies a validated year range. Out-of-range or inverted bounds are
    /// rejected before the browser is touched.
    pub async fn set_year_range(&mut self, min: i32, max: i32) -> Result<(), PageError> {
        let mut next = self.state.clone();
        next.set_year_range(min, max)?;
        self.fill_year_inputs(&min.to_string(), &max.to_string())
            .await?;
        self.apply_filters().await?;
        next.page = 1;
        self.state = next;
        Ok(())
    }

    /// Applies a validated rating range.
    pub async fn set_rating_range(&mut self, min: f32, max: f32) -> Result<(), PageError> {
        let mut next = self.state.clone();
        next.set_rating_range(min, max)?;
        self.fill_rating_inputs(&format_rating(min), &format_rating(max))
            .await?;
        self.apply_filters().await?;
        next.page = 1;
        self.state = next;
        Ok(())
    }

    pub async fn select_genres(&mut self, genres: &[&str]) -> Result<(), InteractionError> {
        let values: Vec<String> = genres.iter().map(|g| (*g).to_string()).collect();
        self.base
            .select_option(locators::GENRE_SELECT, &values, "genres")
            .await?;
        self.apply_filters().await?;
        self.state.set_genres(values);
        self.state.page = 1;
        Ok(())
    }

    async fn fill_year_inputs(&mut self, min: &str, max: &str) -> Result<(), InteractionError> {
        self.base
            .fill_input(locators::YEAR_MIN_INPUT, min, "year from")
            .await?;
        self.base
            .fill_input(locators::YEAR_MAX_INPUT, max, "year to")
            .await
    }

    async fn fill_rating_inputs(&mut self, min: &str, max: &str) -> Result<(), InteractionError> {
        self.base
            .fill_input(locators::RATING_MIN_INPUT, min, "rating from")
            .await?;
        self.base
            .fill_input(locators::RATING_MAX_INPUT, max, "rating to")
            .await
    }

    /// Submits a year range without local validation, for boundary tests.
    /// The tracked state is left unchanged.
    pub async fn submit_raw_year_range(&mut self, min: i32, max: i32) -> Result<(), InteractionError> {
        info!(min, max, "Submitting unchecked year range");
        self.fill_year_inputs(&min.to_string(), &max.to_string())
            .await?;
        self.apply_filters().await
    }

    /// Submits a rating range without local validation.
    pub async fn submit_raw_rating_range(
        &mut self,
        min: f32,
        max: f32,
    ) -> Result<(), InteractionError> {
        info!(min, max, "Submitting unchecked rating range");
        self.fill_rating_inputs(&format_rating(min), &format_rating(max))
            .await?;
        self.apply_filters().await
    }

    /// Jumps to `page` through the page input.
    pub async fn go_to_page(&mut self, page: u32) -> Result<(), PageError> {
        if page < 1 {
            return Err(FilterError::InvalidPage(page).into());
        }
        self.base
            .fill_input(locators::PAGE_INPUT, &page.to_string(), "page number")
            .await?;
        let mark = self.base.mark().await?;
        self.base.click_element(locators::PAGE_GO, "go to page").await?;
        // The app has moved on even if the new page never finishes loading.
        self.state.page = page;
        self.settle(mark).await?;
        Ok(())
    }

    pub async fn next_page(&mut self) -> Result<(), InteractionError> {
        let mark = self.base.mark().await?;
        self.base.click_element(locators::NEXT_PAGE, "next page").await?;
        self.state.page += 1;
        self.settle(mark).await
    }

    /// Clicks the paginator's last-page link. Returns the page it advertised.
    pub async fn go_to_last_page(&mut self) -> Result<u32, InteractionError> {
        let last = self
            .last_page_number()
            .await?
            .ok_or_else(|| InteractionError::Driver("paginator shows no last page".to_string()))?;
        let mark = self.base.mark().await?;
        self.base.click_element(locators::LAST_PAGE, "last page").await?;
        self.state.page = last;
        self.settle(mark).await?;
        Ok(last)
    }

    pub async fn result_count(&mut self) -> Result<usize, InteractionError> {
        self.base.get_element_count(locators::RESULT_CARD).await
    }

    pub async fn visible_items(&mut self) -> Result<Vec<ResultItem>, InteractionError> {
        let cards = self.base.session().snapshot(locators::RESULT_CARD).await?;
        Ok(cards
            .into_iter()
            .map(|card| ResultItem {
                id: card.attr("data-id").and_then(|v| v.parse().ok()),
                year: card.attr("data-year").and_then(|v| v.parse().ok()),
                rating: card.attr("data-rating").and_then(|v| v.parse().ok()),
                media_type: card.attr("data-media-type").and_then(|v| v.parse().ok()),
                genres: card
                    .attr("data-genres")
                    .map(|g| {
                        g.split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                title: card.text,
            })
            .collect())
    }

    pub async fn has_error_banner(&mut self) -> Result<bool, InteractionError> {
        self.base.is_visible(locators::ERROR_BANNER).await
    }

    pub async fn has_results(&mut self) -> Result<bool, InteractionError> {
        self.base.is_visible(locators::RESULTS_GRID).await
    }

    pub async fn has_no_results_message(&mut self) -> Result<bool, InteractionError> {
        self.base.is_visible(locators::NO_RESULTS).await
    }

    /// True when the app rendered its 404 page.
    pub async fn has_not_found(&mut self) -> Result<bool, InteractionError> {
        self.base.is_visible(locators::NOT_FOUND).await
    }

    pub async fn has_validation_message(&mut self) -> Result<bool, InteractionError> {
        self.base.is_visible(locators::VALIDATION_MESSAGE).await
    }

    pub async fn validation_message(&mut self) -> Result<Option<String>, InteractionError> {
        self.base.session().text(locators::VALIDATION_MESSAGE).await
    }

    pub async fn is_next_page_available(&mut self) -> Result<bool, InteractionError> {
        self.base.is_visible(locators::NEXT_PAGE).await
    }

    pub async fn pagination_state(&mut self) -> Result<PaginationState, InteractionError> {
        let state = if self.base.is_visible(locators::LOADING_SPINNER).await? {
            PaginationState::Loading
        } else if self.has_error_banner().await? {
            PaginationState::Error
        } else if self.base.is_visible(locators::END_OF_RESULTS).await? {
            PaginationState::EndOfResults
        } else {
            PaginationState::Loaded
        };
        debug!(%state, page = self.state.page, "Pagination state");
        Ok(state)
    }

    /// Highest page the paginator offers, if it is shown.
    pub async fn last_page_number(&mut self) -> Result<Option<u32>, InteractionError> {
        let text = self.base.session().text(locators::LAST_PAGE).await?;
        Ok(text.and_then(|t| t.trim().parse().ok()))
    }

    pub async fn current_page_number(&mut self) -> Result<Option<u32>, InteractionError> {
        let text = self.base.session().text(locators::CURRENT_PAGE).await?;
        Ok(text.and_then(|t| t.trim().parse().ok()))
    }

    pub async fn current_url(&mut self) -> Result<String, InteractionError> {
        self.base.current_url().await
    }

    /// Filters applied through this page object so far.
    pub fn filter_state(&self) -> &FilterState {
        &self.state
    }

    /// Data requests the page has made.
    pub async fn network(&mut self) -> Result<&mut NetworkCapture, InteractionError> {
        self.base.session().network().await
    }

    pub async fn console_errors(&mut self) -> Result<Vec<String>, InteractionError> {
        self.base.session().console_errors().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::SessionProvider;
    use crate::defects::DEF_002;
    use crate::testing::{CatalogueQuery, SimulatedDriver};
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> RunConfiguration {
        RunConfiguration {
            action_timeout: Duration::from_millis(300),
            navigation_timeout: Duration::from_millis(500),
            ..RunConfiguration::default()
        }
    }

    async fn acquire(driver: SimulatedDriver, config: &RunConfiguration) -> (SessionProvider, BrowserSession) {
        let provider = SessionProvider::new(Arc::new(driver), Arc::new(config.clone()));
        let session = provider.acquire("discover").await.unwrap();
        (provider, session)
    }

    #[tokio::test]
    async fn test_category_and_media_type_are_tracked() {
        let config = config();
        let (provider, mut session) = acquire(SimulatedDriver::new(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.select_category(Category::TopRated).await.unwrap();
            page.set_media_type(MediaType::Tv).await.unwrap();

            assert_eq!(page.filter_state().category, Category::TopRated);
            assert_eq!(page.filter_state().media_type, MediaType::Tv);
            assert_eq!(page.result_count().await.unwrap(), 20);
            let url = page.current_url().await.unwrap();
            assert!(url.contains("top-rated"));
            assert!(url.contains("type=tv"));

            let items = page.visible_items().await.unwrap();
            assert!(items.iter().all(|i| i.media_type == Some(MediaType::Tv)));
            let ratings: Vec<f32> = items.iter().filter_map(|i| i.rating).collect();
            assert!(ratings.windows(2).all(|w| w[0] >= w[1]));
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_year_range_filters_results() {
        let config = config();
        let (provider, mut session) = acquire(SimulatedDriver::new(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.set_year_range(1980, 1999).await.unwrap();

            let items = page.visible_items().await.unwrap();
            assert!(!items.is_empty());
            assert!(
                items
                    .iter()
                    .all(|i| i.year.is_some_and(|y| (1980..=1999).contains(&y)))
            );
            let network = page.network().await.unwrap();
            assert!(network.validate_request_contains(
                "discover/movie",
                &[("primary_release_date.gte", "1980-01-01")]
            ));
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_invalid_range_is_rejected_locally() {
        let config = config();
        let (provider, mut session) = acquire(SimulatedDriver::new(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            let err = page.set_year_range(2010, 2000).await.unwrap_err();
            assert!(matches!(err, PageError::Filter(FilterError::InvertedYearRange { .. })));
            assert!(page.filter_state().year_range.is_none());
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_raw_out_of_range_year_shows_validation() {
        let config = config();
        let (provider, mut session) = acquire(SimulatedDriver::new(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.submit_raw_year_range(1899, 2026).await.unwrap();
            assert!(page.has_validation_message().await.unwrap());
            assert!(page.validation_message().await.unwrap().is_some());
            assert!(page.filter_state().year_range.is_none());
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_last_page_errors_while_defect_is_open() {
        let config = config();
        let (provider, mut session) = acquire(SimulatedDriver::new(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            assert_eq!(page.pagination_state().await.unwrap(), PaginationState::Loaded);
            let last = page.go_to_last_page().await.unwrap();
            assert_eq!(last, 12);
            assert_eq!(page.pagination_state().await.unwrap(), PaginationState::Error);
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_page_past_data_ends_cleanly_when_fixed() {
        let config = config();
        let driver = SimulatedDriver::new().with_fixed_defect(DEF_002);
        let (provider, mut session) = acquire(driver, &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.go_to_page(11).await.unwrap();
            assert_eq!(
                page.pagination_state().await.unwrap(),
                PaginationState::EndOfResults
            );
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_empty_page_hangs_while_defect_is_open() {
        let config = config();
        let (provider, mut session) = acquire(SimulatedDriver::new(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.set_year_range(2020, 2020).await.unwrap();
            let err = page.go_to_page(5).await.unwrap_err();
            assert!(err.is_timeout());
            assert_eq!(page.pagination_state().await.unwrap(), PaginationState::Loading);
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_next_page_keeps_filters_in_url() {
        let config = config();
        let (provider, mut session) = acquire(SimulatedDriver::new(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.select_category(Category::Popular).await.unwrap();
            assert!(page.is_next_page_available().await.unwrap());
            page.next_page().await.unwrap();
            assert_eq!(page.current_page_number().await.unwrap(), Some(2));
            let url = page.current_url().await.unwrap();
            assert!(url.contains("popular") && url.contains("type=movie") && url.contains("page=2"));
        }
        provider.release(session).await;
    }

    /// Requests start well after the action returns, so a page object that
    /// only waits for the spinner to go away would read the previous render.
    fn delayed() -> SimulatedDriver {
        SimulatedDriver::new().with_render_delay(Duration::from_millis(120))
    }

    fn expected_ids(driver: &SimulatedDriver, state: &FilterState) -> Vec<Option<u32>> {
        let query = CatalogueQuery::from_filter_state(state);
        driver
            .app()
            .catalogue
            .page(&query, state.page)
            .items
            .iter()
            .map(|i| Some(i.id))
            .collect()
    }

    fn ids(items: &[ResultItem]) -> Vec<Option<u32>> {
        items.iter().map(|i| i.id).collect()
    }

    #[tokio::test]
    async fn test_open_waits_for_first_render() {
        let config = config();
        let (provider, mut session) = acquire(delayed(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            assert_eq!(page.result_count().await.unwrap(), 20);
            assert_eq!(page.pagination_state().await.unwrap(), PaginationState::Loaded);
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_select_category_waits_for_new_results() {
        let config = config();
        let driver = delayed();
        let (provider, mut session) = acquire(driver.clone(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.select_category(Category::TopRated).await.unwrap();

            let items = page.visible_items().await.unwrap();
            assert_eq!(ids(&items), expected_ids(&driver, page.filter_state()));
            let network = page.network().await.unwrap();
            assert!(network.last_request().unwrap().url.contains("movie/top_rated"));
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_reselecting_shown_category_does_not_wait_for_a_request() {
        let config = config();
        let (provider, mut session) = acquire(delayed(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.select_category(Category::Popular).await.unwrap();
            page.set_media_type(MediaType::Movie).await.unwrap();
            assert_eq!(page.result_count().await.unwrap(), 20);
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_set_media_type_waits_for_new_results() {
        let config = config();
        let (provider, mut session) = acquire(delayed(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.set_media_type(MediaType::Tv).await.unwrap();

            let items = page.visible_items().await.unwrap();
            assert_eq!(items.len(), 20);
            assert!(items.iter().all(|i| i.media_type == Some(MediaType::Tv)));
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_set_year_range_waits_for_filtered_results() {
        let config = config();
        let (provider, mut session) = acquire(delayed(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.set_year_range(1980, 1999).await.unwrap();

            let items = page.visible_items().await.unwrap();
            assert!(!items.is_empty());
            assert!(
                items
                    .iter()
                    .all(|i| i.year.is_some_and(|y| (1980..=1999).contains(&y)))
            );
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_go_to_page_waits_for_the_page() {
        let config = config();
        let driver = delayed();
        let (provider, mut session) = acquire(driver.clone(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            page.go_to_page(3).await.unwrap();

            assert_eq!(page.current_page_number().await.unwrap(), Some(3));
            let items = page.visible_items().await.unwrap();
            assert_eq!(ids(&items), expected_ids(&driver, page.filter_state()));
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_rejected_raw_input_settles_without_a_request() {
        let config = config();
        let (provider, mut session) = acquire(delayed(), &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            let before = page.network().await.unwrap().requests(None).len();
            page.submit_raw_rating_range(8.0, 3.0).await.unwrap();
            assert!(page.has_validation_message().await.unwrap());
            assert_eq!(page.network().await.unwrap().requests(None).len(), before);
        }
        provider.release(session).await;
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_previous_filters() {
        // The request never starts within the action timeout.
        let config = config();
        let driver = SimulatedDriver::new().with_render_delay(Duration::from_millis(150));
        let (provider, mut session) = acquire(driver, &config).await;
        {
            let mut page = DiscoverPage::new(&mut session, &config);
            page.open("/").await.unwrap();
            let tight = RunConfiguration {
                action_timeout: Duration::from_millis(60),
                ..config.clone()
            };
            let mut rushed = DiscoverPage::new(page.base().session(), &tight);

            let err = rushed.set_year_range(1990, 2000).await.unwrap_err();
            assert!(err.is_timeout());
            assert!(rushed.filter_state().year_range.is_none());

            let err = rushed.set_rating_range(6.0, 9.0).await.unwrap_err();
            assert!(err.is_timeout());
            assert!(rushed.filter_state().rating_range.is_none());
        }
        provider.release(session).await;
    }
}
