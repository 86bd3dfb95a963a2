//! In-process model of the Discover app.
//!
//! Renders the same elements the real app does (see [`crate::pages::locators`])
//! from a deterministic catalogue, including its two documented bugs:
//!
//! - `DEF-001`: loading a category slug such as `/popular` directly renders a
//!   404 page.
//! - `DEF-002`: the paginator advertises every data page even though the API
//!   refuses pages above its cap, so the last page shows an error banner; a
//!   page past the data leaves the spinner up forever.
//!
//! Either bug can be switched off with [`SimulatedDriver::with_fixed_defect`].

use super::catalogue::{Catalogue, CatalogueQuery, genre_names};
use crate::browser::{
    BrowserDriver, BrowserHandle, ConsoleMessage, ElementSnapshot, InteractionError,
    LaunchOptions, NetworkExchange, SessionStartError,
};
use crate::defects::{DEF_001, DEF_002};
use crate::filters::{
    Category, FilterState, MediaType, RATING_MAX, RATING_MIN, RatingRange, YEAR_MAX, YEAR_MIN,
    YearRange, format_rating,
};
use crate::pages::locators;
use async_trait::async_trait;
use reqwest::Url;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Movies (and TV shows) in the default catalogue.
pub const DEFAULT_CATALOGUE_SIZE: usize = 240;

/// Highest page the simulated API serves by default.
pub const DEFAULT_PAGE_CAP: u32 = 10;

/// A 1x1 transparent PNG written for screenshots.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Shared behaviour of the simulated app and API.
#[derive(Debug, Clone)]
pub struct SimulatedApp {
    pub catalogue: Arc<Catalogue>,
    /// Pages above this are rejected by the API with 422.
    pub page_cap: u32,
    /// Time between an action and the UI settling.
    pub latency: Duration,
    /// Time between an action and its data request starting. Until then the
    /// page keeps showing what it showed before, without a spinner.
    pub render_delay: Duration,
    /// Defects that behave correctly in this instance.
    pub fixed: BTreeSet<String>,
}

impl Default for SimulatedApp {
    fn default() -> Self {
        Self {
            catalogue: Arc::new(Catalogue::generate(DEFAULT_CATALOGUE_SIZE)),
            page_cap: DEFAULT_PAGE_CAP,
            latency: Duration::from_millis(10),
            render_delay: Duration::ZERO,
            fixed: BTreeSet::new(),
        }
    }
}

impl SimulatedApp {
    pub fn is_fixed(&self, defect: &str) -> bool {
        self.fixed.contains(defect)
    }
}

/// Launches simulated browser contexts.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    app: SimulatedApp,
    launch_failure: Option<String>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `defect` behave as if it were fixed.
    pub fn with_fixed_defect(mut self, defect: &str) -> Self {
        self.app.fixed.insert(defect.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.app.latency = latency;
        self
    }

    /// Delays the start of every data request, like a browser whose click
    /// resolves before the app's fetch begins.
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.app.render_delay = delay;
        self
    }

    pub fn with_page_cap(mut self, cap: u32) -> Self {
        self.app.page_cap = cap;
        self
    }

    /// Every launch fails with `reason`, like a browser that is not installed.
    pub fn failing_launch(mut self, reason: impl Into<String>) -> Self {
        self.launch_failure = Some(reason.into());
        self
    }

    pub fn app(&self) -> &SimulatedApp {
        &self.app
    }
}

#[async_trait]
impl BrowserDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn launch(
        &self,
        options: &LaunchOptions,
    ) -> Result<Box<dyn BrowserHandle>, SessionStartError> {
        if let Some(reason) = &self.launch_failure {
            return Err(SessionStartError::new(options.browser, reason.clone()));
        }
        let origin = Url::parse(&options.base_url)
            .map_err(|e| SessionStartError::new(options.browser, format!("bad base URL: {e}")))?;
        Ok(Box::new(SimulatedPage::new(
            self.app.clone(),
            origin,
            options.api_base_url.trim_end_matches('/').to_string(),
        )))
    }
}

#[derive(Debug, Clone)]
struct Card {
    id: u32,
    title: String,
    year: i32,
    rating: f32,
    media: MediaType,
    genres: String,
}

#[derive(Debug, Clone)]
enum Content {
    Results {
        cards: Vec<Card>,
        last_page: u32,
    },
    NoResults,
    Error(String),
    EndOfResults,
}

#[derive(Debug, Clone)]
enum Screen {
    Blank,
    NotFound,
    Discover,
}

#[derive(Debug, Clone)]
enum Render {
    /// Nothing rendered yet.
    Idle,
    Settled(Content),
    Loading { until: Instant, then: Content },
    Stuck,
}

/// What a data request will show once it completes.
#[derive(Debug, Clone)]
enum Outcome {
    Show(Content),
    Stuck,
}

/// A data request that has been triggered but not started yet.
#[derive(Debug, Clone)]
struct Fetch {
    starts: Instant,
    exchange: NetworkExchange,
    console: Option<ConsoleMessage>,
    outcome: Outcome,
}

struct SimulatedPage {
    app: SimulatedApp,
    origin: Url,
    api_base: String,
    url: String,
    screen: Screen,
    render: Render,
    pending: Option<Fetch>,
    state: FilterState,
    inputs: HashMap<&'static str, String>,
    pending_genres: Vec<String>,
    validation: Option<String>,
    console: Vec<ConsoleMessage>,
    network: Vec<NetworkExchange>,
    closed: bool,
}

impl SimulatedPage {
    fn new(app: SimulatedApp, origin: Url, api_base: String) -> Self {
        Self {
            app,
            origin,
            api_base,
            url: "about:blank".to_string(),
            screen: Screen::Blank,
            render: Render::Idle,
            pending: None,
            state: FilterState::default(),
            inputs: HashMap::new(),
            pending_genres: Vec::new(),
            validation: None,
            console: Vec::new(),
            network: Vec::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), InteractionError> {
        if self.closed {
            Err(InteractionError::Closed)
        } else {
            Ok(())
        }
    }

    fn origin_str(&self) -> String {
        self.origin.as_str().trim_end_matches('/').to_string()
    }

    fn navigate(&mut self, raw: &str) -> Result<(), InteractionError> {
        let url = Url::parse(raw)
            .map_err(|e| InteractionError::Driver(format!("invalid URL '{raw}': {e}")))?;
        if url.host_str() != self.origin.host_str() {
            return Err(InteractionError::Driver(format!(
                "net::ERR_NAME_NOT_RESOLVED at {raw}"
            )));
        }

        self.url = url.to_string();
        self.validation = None;
        self.inputs.clear();
        self.render = Render::Idle;
        self.pending = None;
        self.state = FilterState::default();

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        if let Some(media) = query.get("type").and_then(|t| t.parse::<MediaType>().ok()) {
            self.state.media_type = media;
        }
        if let Some(page) = query.get("page").and_then(|p| p.parse::<u32>().ok())
            && page >= 1
        {
            self.state.page = page;
        }

        let path = url.path().trim_matches('/');
        if path.is_empty() {
            self.screen = Screen::Discover;
            self.load();
            return Ok(());
        }

        match path.parse::<Category>() {
            Ok(category) if self.app.is_fixed(DEF_001) => {
                self.state.category = category;
                self.screen = Screen::Discover;
                self.load();
            }
            _ => {
                // Static host without a SPA fallback.
                self.screen = Screen::NotFound;
                self.console.push(ConsoleMessage::error(format!(
                    "Failed to load resource: the server responded with a status of 404 (Not Found) {}",
                    self.url
                )));
            }
        }
        Ok(())
    }

    fn sync_url(&mut self) {
        self.url = format!(
            "{}/{}?type={}&page={}",
            self.origin_str(),
            self.state.category.slug(),
            self.state.media_type,
            self.state.page
        );
    }

    fn exchange(url: String, status: u16, body: String) -> NetworkExchange {
        NetworkExchange {
            method: "GET".to_string(),
            url,
            status,
            body,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Queues the request; it starts after the render delay.
    fn begin(
        &mut self,
        exchange: NetworkExchange,
        console: Option<ConsoleMessage>,
        outcome: Outcome,
    ) {
        self.pending = Some(Fetch {
            starts: Instant::now() + self.app.render_delay,
            exchange,
            console,
            outcome,
        });
        self.start_due();
    }

    /// Starts a queued request whose delay has passed: the exchange is
    /// recorded and the spinner shows until the latency has elapsed.
    fn start_due(&mut self) {
        let Some(fetch) = self.pending.take_if(|f| Instant::now() >= f.starts) else {
            return;
        };
        self.network.push(fetch.exchange);
        self.console.extend(fetch.console);
        self.render = match fetch.outcome {
            Outcome::Show(then) => Render::Loading {
                until: fetch.starts + self.app.latency,
                then,
            },
            Outcome::Stuck => Render::Stuck,
        };
    }

    /// Fetches the current page and schedules the render.
    fn load(&mut self) {
        let page = self.state.page;
        let query = CatalogueQuery::from_filter_state(&self.state);
        let params: Vec<String> = self
            .state
            .query_params()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let request_url = format!(
            "{}/{}?{}",
            self.api_base,
            self.state.api_path(),
            params.join("&")
        );

        let def002_open = !self.app.is_fixed(DEF_002);

        if page > self.app.page_cap {
            let body = serde_json::json!({
                "success": false,
                "status_code": 22,
                "status_message": format!(
                    "Invalid page: Pages start at 1 and max at {}. They are expected to be an integer.",
                    self.app.page_cap
                ),
            })
            .to_string();
            let exchange = Self::exchange(request_url, 422, body);
            if def002_open {
                self.begin(
                    exchange,
                    Some(ConsoleMessage::error(
                        "Failed to load resource: the server responded with a status of 422 ()",
                    )),
                    Outcome::Show(Content::Error(
                        "Something went wrong. Please try again.".to_string(),
                    )),
                );
            } else {
                self.begin(exchange, None, Outcome::Show(Content::EndOfResults));
            }
            return;
        }

        let result = self.app.catalogue.page(&query, page);
        let body = result.to_json().to_string();
        let total_pages = result.total_pages;
        let cards: Vec<Card> = result
            .items
            .iter()
            .map(|item| Card {
                id: item.id,
                title: item.title.clone(),
                year: item.year,
                rating: item.rating,
                media: item.media_type,
                genres: genre_names(item).join(","),
            })
            .collect();
        let exchange = Self::exchange(request_url, 200, body);

        let last_page = if def002_open {
            total_pages
        } else {
            total_pages.min(self.app.page_cap)
        };

        let outcome = if !cards.is_empty() {
            Outcome::Show(Content::Results { cards, last_page })
        } else if page == 1 {
            Outcome::Show(Content::NoResults)
        } else if def002_open {
            // Waits for results that never arrive.
            Outcome::Stuck
        } else {
            Outcome::Show(Content::EndOfResults)
        };
        self.begin(exchange, None, outcome);
    }

    fn settle(&mut self) {
        self.start_due();
        if let Render::Loading { until, then } = &self.render
            && Instant::now() >= *until
        {
            self.render = Render::Settled(then.clone());
        }
    }

    fn content(&self) -> Option<&Content> {
        match &self.render {
            Render::Settled(c) => Some(c),
            _ => None,
        }
    }

    fn is_loading(&self) -> bool {
        matches!(self.render, Render::Loading { .. } | Render::Stuck)
    }

    fn last_page(&self) -> Option<u32> {
        match self.content() {
            Some(Content::Results { last_page, .. }) => Some(*last_page),
            _ => None,
        }
    }

    /// Rendered matches for `selector`.
    fn elements(&mut self, selector: &str) -> Vec<ElementSnapshot> {
        self.settle();
        let one = |text: String| vec![snapshot(text, &[])];

        match self.screen {
            Screen::Blank => return Vec::new(),
            Screen::NotFound => {
                return if selector == locators::NOT_FOUND {
                    one("404 - Page not found".to_string())
                } else {
                    Vec::new()
                };
            }
            Screen::Discover => {}
        }

        if let Some(category) = category_from_selector(selector) {
            let active = category == self.state.category;
            return vec![snapshot(
                category.slug().to_string(),
                &[("data-active", if active { "true" } else { "false" })],
            )];
        }

        match selector {
            s if s == locators::RESULT_CARD => match self.content() {
                Some(Content::Results { cards, .. }) => cards
                    .iter()
                    .map(|c| {
                        let id = c.id.to_string();
                        let year = c.year.to_string();
                        let rating = format_rating(c.rating);
                        snapshot(
                            c.title.clone(),
                            &[
                                ("data-id", id.as_str()),
                                ("data-year", year.as_str()),
                                ("data-rating", rating.as_str()),
                                ("data-media-type", c.media.as_str()),
                                ("data-genres", c.genres.as_str()),
                            ],
                        )
                    })
                    .collect(),
                _ => Vec::new(),
            },
            s if s == locators::RESULTS_GRID => match self.content() {
                Some(Content::Results { .. }) => one(String::new()),
                _ => Vec::new(),
            },
            s if s == locators::LOADING_SPINNER => {
                if self.is_loading() {
                    one("Loading...".to_string())
                } else {
                    Vec::new()
                }
            }
            s if s == locators::ERROR_BANNER => match self.content() {
                Some(Content::Error(msg)) => one(msg.clone()),
                _ => Vec::new(),
            },
            s if s == locators::NO_RESULTS => match self.content() {
                Some(Content::NoResults) => one("No results found".to_string()),
                _ => Vec::new(),
            },
            s if s == locators::END_OF_RESULTS => match self.content() {
                Some(Content::EndOfResults) => one("You've reached the end".to_string()),
                _ => Vec::new(),
            },
            s if s == locators::VALIDATION_MESSAGE => match &self.validation {
                Some(msg) => one(msg.clone()),
                None => Vec::new(),
            },
            s if s == locators::CURRENT_PAGE => match self.content() {
                Some(Content::Results { .. }) => one(self.state.page.to_string()),
                _ => Vec::new(),
            },
            s if s == locators::NEXT_PAGE => match self.last_page() {
                Some(last) if self.state.page < last => one("Next".to_string()),
                _ => Vec::new(),
            },
            s if s == locators::LAST_PAGE => match self.last_page() {
                Some(last) if last > 1 => one(last.to_string()),
                _ => Vec::new(),
            },
            s if s == locators::PAGINATION => match self.last_page() {
                Some(last) if last > 1 => one(String::new()),
                _ => Vec::new(),
            },
            s if s == locators::MEDIA_TYPE_SELECT => {
                one(self.state.media_type.as_str().to_string())
            }
            s if s == locators::GENRE_SELECT => one(self.pending_genres.join(",")),
            s if INPUTS.iter().any(|i| *i == s) => one(self.input(s).unwrap_or_default().to_string()),
            s if s == locators::APPLY_FILTERS || s == locators::PAGE_GO => {
                one("Apply".to_string())
            }
            _ => Vec::new(),
        }
    }

    fn input(&self, selector: &str) -> Option<&str> {
        self.inputs.get(selector).map(String::as_str)
    }

    fn missing(&self, action: &str, selector: &str, timeout: Duration) -> InteractionError {
        InteractionError::Timeout {
            action: format!("{action} {selector}"),
            timeout,
        }
    }

    /// Applies the filter form, or shows a validation message.
    fn apply_filters(&mut self) {
        match self.read_filter_form() {
            Ok((years, rating)) => {
                self.validation = None;
                self.state.year_range = years;
                self.state.rating_range = rating;
                self.state.set_genres(self.pending_genres.clone());
                self.state.page = 1;
                self.sync_url();
                self.load();
            }
            Err(message) => {
                self.validation = Some(message);
            }
        }
    }

    fn read_filter_form(&self) -> Result<(Option<YearRange>, Option<RatingRange>), String> {
        let year = |sel: &str| -> Result<Option<i32>, String> {
            match self.input(sel).map(str::trim).filter(|v| !v.is_empty()) {
                None => Ok(None),
                Some(v) => v
                    .parse::<i32>()
                    .map(Some)
                    .map_err(|_| format!("'{v}' is not a valid year")),
            }
        };
        let rating = |sel: &str| -> Result<Option<f32>, String> {
            match self.input(sel).map(str::trim).filter(|v| !v.is_empty()) {
                None => Ok(None),
                Some(v) => v
                    .parse::<f32>()
                    .map(Some)
                    .map_err(|_| format!("'{v}' is not a valid rating")),
            }
        };

        let years = match (year(locators::YEAR_MIN_INPUT)?, year(locators::YEAR_MAX_INPUT)?) {
            (None, None) => None,
            (min, max) => {
                let min = min.unwrap_or(YEAR_MIN);
                let max = max.unwrap_or(YEAR_MAX);
                if !(YEAR_MIN..=YEAR_MAX).contains(&min) || !(YEAR_MIN..=YEAR_MAX).contains(&max) {
                    return Err(format!("Year must be between {YEAR_MIN} and {YEAR_MAX}"));
                }
                if min > max {
                    return Err("Start year must not be after end year".to_string());
                }
                Some(YearRange { min, max })
            }
        };

        let ratings = match (
            rating(locators::RATING_MIN_INPUT)?,
            rating(locators::RATING_MAX_INPUT)?,
        ) {
            (None, None) => None,
            (min, max) => {
                let min = min.unwrap_or(RATING_MIN);
                let max = max.unwrap_or(RATING_MAX);
                let valid = |r: f32| (RATING_MIN..=RATING_MAX).contains(&r);
                if !valid(min) || !valid(max) {
                    return Err("Rating must be between 0 and 10".to_string());
                }
                if min > max {
                    return Err("Minimum rating must not exceed maximum rating".to_string());
                }
                Some(RatingRange { min, max })
            }
        };

        Ok((years, ratings))
    }

    fn change_page(&mut self, page: u32) {
        self.validation = None;
        self.state.page = page;
        self.sync_url();
        self.load();
    }
}

const INPUTS: [&str; 5] = [
    locators::YEAR_MIN_INPUT,
    locators::YEAR_MAX_INPUT,
    locators::RATING_MIN_INPUT,
    locators::RATING_MAX_INPUT,
    locators::PAGE_INPUT,
];

fn snapshot(text: String, attrs: &[(&str, &str)]) -> ElementSnapshot {
    ElementSnapshot {
        text,
        attributes: attrs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn category_from_selector(selector: &str) -> Option<Category> {
    Category::all()
        .iter()
        .copied()
        .find(|c| locators::category_button(*c) == selector)
}

#[async_trait]
impl BrowserHandle for SimulatedPage {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<(), InteractionError> {
        self.ensure_open()?;
        self.navigate(url)
    }

    async fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), InteractionError> {
        self.ensure_open()?;
        if self.elements(selector).is_empty() {
            return Err(self.missing("click", selector, timeout));
        }

        if let Some(category) = category_from_selector(selector) {
            self.state.category = category;
            self.change_page(1);
        } else if selector == locators::APPLY_FILTERS {
            self.apply_filters();
        } else if selector == locators::NEXT_PAGE {
            let next = self.state.page + 1;
            self.change_page(next);
        } else if selector == locators::LAST_PAGE {
            if let Some(last) = self.last_page() {
                self.change_page(last);
            }
        } else if selector == locators::PAGE_GO {
            match self
                .input(locators::PAGE_INPUT)
                .and_then(|v| v.trim().parse::<u32>().ok())
            {
                Some(page) if page >= 1 => self.change_page(page),
                _ => self.validation = Some("Enter a valid page number".to_string()),
            }
        }
        Ok(())
    }

    async fn fill(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.ensure_open()?;
        match INPUTS.iter().find(|s| **s == selector) {
            Some(key) if !matches!(self.screen, Screen::NotFound | Screen::Blank) => {
                self.inputs.insert(*key, value.to_string());
                Ok(())
            }
            _ => Err(self.missing("fill", selector, timeout)),
        }
    }

    async fn select(
        &mut self,
        selector: &str,
        values: &[String],
        timeout: Duration,
    ) -> Result<(), InteractionError> {
        self.ensure_open()?;
        if self.elements(selector).is_empty() {
            return Err(self.missing("select", selector, timeout));
        }
        if selector == locators::MEDIA_TYPE_SELECT {
            let media = values
                .first()
                .and_then(|v| v.parse::<MediaType>().ok())
                .ok_or_else(|| InteractionError::Driver(format!("no option {values:?}")))?;
            self.state.media_type = media;
            self.change_page(1);
            Ok(())
        } else if selector == locators::GENRE_SELECT {
            self.pending_genres = values.to_vec();
            Ok(())
        } else {
            Err(InteractionError::Driver(format!(
                "element {selector} is not a <select>"
            )))
        }
    }

    async fn text(&mut self, selector: &str) -> Result<Option<String>, InteractionError> {
        self.ensure_open()?;
        Ok(self.elements(selector).into_iter().next().map(|e| e.text))
    }

    async fn count(&mut self, selector: &str) -> Result<usize, InteractionError> {
        self.ensure_open()?;
        Ok(self.elements(selector).len())
    }

    async fn is_visible(&mut self, selector: &str) -> Result<bool, InteractionError> {
        self.ensure_open()?;
        Ok(!self.elements(selector).is_empty())
    }

    async fn snapshot(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, InteractionError> {
        self.ensure_open()?;
        Ok(self.elements(selector))
    }

    async fn url(&mut self) -> Result<String, InteractionError> {
        self.ensure_open()?;
        Ok(self.url.clone())
    }

    async fn reload(&mut self, _timeout: Duration) -> Result<(), InteractionError> {
        self.ensure_open()?;
        let url = self.url.clone();
        self.navigate(&url)
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), InteractionError> {
        self.ensure_open()?;
        std::fs::write(path, PLACEHOLDER_PNG)
            .map_err(|e| InteractionError::Driver(format!("screenshot failed: {e}")))
    }

    async fn drain_console(&mut self) -> Result<Vec<ConsoleMessage>, InteractionError> {
        self.ensure_open()?;
        self.settle();
        Ok(std::mem::take(&mut self.console))
    }

    async fn drain_network(&mut self) -> Result<Vec<NetworkExchange>, InteractionError> {
        self.ensure_open()?;
        self.settle();
        Ok(std::mem::take(&mut self.network))
    }

    async fn close(&mut self) -> Result<(), InteractionError> {
        self.closed = true;
        Ok(())
    }
}
