//! Filter and pagination state of the Discover page.
//!
//! [`FilterState`] is owned by a single page object. Its setters validate
//! bounds locally; out-of-range values can still reach the app through the
//! page object's raw submitters, which boundary tests use on purpose.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Earliest release year the app accepts.
pub const YEAR_MIN: i32 = 1900;

/// Latest release year the app accepts.
pub const YEAR_MAX: i32 = 2026;

/// Lowest accepted rating.
pub const RATING_MIN: f32 = 0.0;

/// Highest accepted rating.
pub const RATING_MAX: f32 = 10.0;

/// Local validation failures raised by [`FilterState`] setters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("year {0} is outside {YEAR_MIN}..={YEAR_MAX}")]
    YearOutOfRange(i32),

    #[error("year range is inverted: {min} > {max}")]
    InvertedYearRange { min: i32, max: i32 },

    #[error("rating {0} is outside 0..=10")]
    RatingOutOfRange(f32),

    #[error("rating range is inverted: {min} > {max}")]
    InvertedRatingRange { min: f32, max: f32 },

    #[error("page must be at least 1, got {0}")]
    InvalidPage(u32),

    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    #[error("unknown media type '{0}'")]
    UnknownMediaType(String),
}

/// Result lists the app offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Popular,
    Trending,
    Newest,
    TopRated,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::Popular,
            Category::Trending,
            Category::Newest,
            Category::TopRated,
        ]
    }

    /// URL slug used by the app's routes and category buttons.
    pub fn slug(self) -> &'static str {
        match self {
            Category::Popular => "popular",
            Category::Trending => "trending",
            Category::Newest => "newest",
            Category::TopRated => "top-rated",
        }
    }

    /// Data API path for this category.
    pub fn api_path(self, media: MediaType) -> String {
        let media = media.as_str();
        match self {
            Category::Popular => format!("{media}/popular"),
            Category::Trending => format!("trending/{media}/week"),
            Category::Newest => match media {
                "tv" => "tv/on_the_air".to_string(),
                _ => "movie/now_playing".to_string(),
            },
            Category::TopRated => format!("{media}/top_rated"),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Category {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "popular" => Ok(Category::Popular),
            "trending" => Ok(Category::Trending),
            "newest" | "now-playing" => Ok(Category::Newest),
            "top-rated" | "toprated" => Ok(Category::TopRated),
            _ => Err(FilterError::UnknownCategory(s.to_string())),
        }
    }
}

/// Movies or TV shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    /// Release-date parameter prefix used by the discover endpoint.
    fn date_param(self) -> &'static str {
        match self {
            MediaType::Movie => "primary_release_date",
            MediaType::Tv => "first_air_date",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaType::Movie),
            "tv" | "tv-shows" | "tv shows" => Ok(MediaType::Tv),
            _ => Err(FilterError::UnknownMediaType(s.to_string())),
        }
    }
}

/// Inclusive release-year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    /// Builds a validated range.
    pub fn new(min: i32, max: i32) -> Result<Self, FilterError> {
        for year in [min, max] {
            if !(YEAR_MIN..=YEAR_MAX).contains(&year) {
                return Err(FilterError::YearOutOfRange(year));
            }
        }
        if min > max {
            return Err(FilterError::InvertedYearRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

/// Inclusive rating range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRange {
    pub min: f32,
    pub max: f32,
}

impl RatingRange {
    /// Builds a validated range.
    pub fn new(min: f32, max: f32) -> Result<Self, FilterError> {
        for rating in [min, max] {
            if !(RATING_MIN..=RATING_MAX).contains(&rating) {
                return Err(FilterError::RatingOutOfRange(rating));
            }
        }
        if min > max {
            return Err(FilterError::InvertedRatingRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, rating: f32) -> bool {
        rating >= self.min && rating <= self.max
    }
}

/// TMDB genre ids by display name.
const GENRES: &[(&str, u32)] = &[
    ("Action", 28),
    ("Adventure", 12),
    ("Animation", 16),
    ("Comedy", 35),
    ("Crime", 80),
    ("Documentary", 99),
    ("Drama", 18),
    ("Family", 10751),
    ("Fantasy", 14),
    ("History", 36),
    ("Horror", 27),
    ("Music", 10402),
    ("Mystery", 9648),
    ("Romance", 10749),
    ("Science Fiction", 878),
    ("Thriller", 53),
    ("War", 10752),
    ("Western", 37),
];

/// Looks up a genre id by (case-insensitive) name.
pub fn genre_id(name: &str) -> Option<u32> {
    GENRES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
        .map(|(_, id)| *id)
}

/// Looks up a genre name by id.
pub fn genre_name(id: u32) -> Option<&'static str> {
    GENRES.iter().find(|(_, i)| *i == id).map(|(n, _)| *n)
}

/// Every known genre id, in display order.
pub fn genre_ids() -> impl Iterator<Item = u32> {
    GENRES.iter().map(|(_, id)| *id)
}

/// Complete filter and pagination state of one Discover page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub category: Category,
    pub media_type: MediaType,
    pub year_range: Option<YearRange>,
    pub rating_range: Option<RatingRange>,
    pub genres: BTreeSet<String>,
    pub page: u32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            category: Category::default(),
            media_type: MediaType::default(),
            year_range: None,
            rating_range: None,
            genres: BTreeSet::new(),
            page: 1,
        }
    }
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    /// Sets the year range, rejecting out-of-range or inverted bounds.
    pub fn set_year_range(&mut self, min: i32, max: i32) -> Result<(), FilterError> {
        self.year_range = Some(YearRange::new(min, max)?);
        Ok(())
    }

    /// Sets the rating range, rejecting out-of-range or inverted bounds.
    pub fn set_rating_range(&mut self, min: f32, max: f32) -> Result<(), FilterError> {
        self.rating_range = Some(RatingRange::new(min, max)?);
        Ok(())
    }

    pub fn set_genres<I, S>(&mut self, genres: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
    }

    pub fn set_page(&mut self, page: u32) -> Result<(), FilterError> {
        if page < 1 {
            return Err(FilterError::InvalidPage(page));
        }
        self.page = page;
        Ok(())
    }

    /// True when any filter beyond category and media type is active.
    pub fn has_discover_filters(&self) -> bool {
        self.year_range.is_some() || self.rating_range.is_some() || !self.genres.is_empty()
    }

    /// Data API path the app calls for this state.
    pub fn api_path(&self) -> String {
        if self.has_discover_filters() {
            format!("discover/{}", self.media_type)
        } else {
            self.category.api_path(self.media_type)
        }
    }

    /// Query parameters for the data API, sorted by key so equivalent states
    /// produce identical requests regardless of the order filters were set.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("page".to_string(), self.page.to_string())];

        if self.has_discover_filters() {
            let sort = match self.category {
                Category::Popular | Category::Trending => "popularity.desc",
                Category::Newest => match self.media_type {
                    MediaType::Movie => "primary_release_date.desc",
                    MediaType::Tv => "first_air_date.desc",
                },
                Category::TopRated => "vote_average.desc",
            };
            params.push(("sort_by".to_string(), sort.to_string()));
        }
        if let Some(years) = self.year_range {
            let prefix = self.media_type.date_param();
            params.push((format!("{prefix}.gte"), format!("{}-01-01", years.min)));
            params.push((format!("{prefix}.lte"), format!("{}-12-31", years.max)));
        }
        if let Some(rating) = self.rating_range {
            params.push(("vote_average.gte".to_string(), format_rating(rating.min)));
            params.push(("vote_average.lte".to_string(), format_rating(rating.max)));
        }
        if !self.genres.is_empty() {
            let mut ids: Vec<String> = self
                .genres
                .iter()
                .map(|g| genre_id(g).map_or_else(|| g.clone(), |id| id.to_string()))
                .collect();
            ids.sort();
            params.push(("with_genres".to_string(), ids.join(",")));
        }

        params.sort();
        params
    }
}

/// Formats a rating without a trailing `.0` noise beyond one decimal.
pub fn format_rating(value: f32) -> String {
    format!("{value:.1}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_range_bounds() {
        assert!(YearRange::new(1900, 2026).is_ok());
        assert_eq!(
            YearRange::new(1899, 2026),
            Err(FilterError::YearOutOfRange(1899))
        );
        assert_eq!(
            YearRange::new(2000, 2027),
            Err(FilterError::YearOutOfRange(2027))
        );
        assert_eq!(
            YearRange::new(2010, 2000),
            Err(FilterError::InvertedYearRange {
                min: 2010,
                max: 2000
            })
        );
    }

    #[test]
    fn test_rating_range_bounds() {
        assert!(RatingRange::new(0.0, 10.0).is_ok());
        assert!(matches!(
            RatingRange::new(-0.1, 5.0),
            Err(FilterError::RatingOutOfRange(_))
        ));
        assert!(matches!(
            RatingRange::new(5.0, 10.5),
            Err(FilterError::RatingOutOfRange(_))
        ));
        assert!(matches!(
            RatingRange::new(8.0, 2.0),
            Err(FilterError::InvertedRatingRange { .. })
        ));
    }

    #[test]
    fn test_rejected_setter_leaves_state_unchanged() {
        let mut state = FilterState::new();
        state.set_year_range(1990, 2000).unwrap();
        assert!(state.set_year_range(1899, 2000).is_err());
        assert_eq!(state.year_range, Some(YearRange { min: 1990, max: 2000 }));
    }

    #[test]
    fn test_page_must_be_positive() {
        let mut state = FilterState::new();
        assert_eq!(state.set_page(0), Err(FilterError::InvalidPage(0)));
        state.set_page(3).unwrap();
        assert_eq!(state.page, 3);
    }

    #[test]
    fn test_query_params_independent_of_setter_order() {
        let mut a = FilterState::new().with_media_type(MediaType::Tv);
        a.set_year_range(2000, 2010).unwrap();
        a.set_rating_range(6.0, 9.0).unwrap();
        a.set_genres(["Drama", "Comedy"]);

        let mut b = FilterState::new();
        b.set_genres(["Comedy", "Drama"]);
        b.set_rating_range(6.0, 9.0).unwrap();
        b = b.with_media_type(MediaType::Tv);
        b.set_year_range(2000, 2010).unwrap();

        assert_eq!(a.query_params(), b.query_params());
        assert_eq!(a.api_path(), "discover/tv");
    }

    #[test]
    fn test_query_params_for_plain_category() {
        let state = FilterState::new().with_category(Category::TopRated);
        assert_eq!(state.api_path(), "movie/top_rated");
        assert_eq!(
            state.query_params(),
            vec![("page".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn test_genre_names_map_to_ids() {
        let mut state = FilterState::new();
        state.set_genres(["Action", "Unlisted"]);
        let params = state.query_params();
        let genres = params
            .iter()
            .find(|(k, _)| k == "with_genres")
            .map(|(_, v)| v.as_str());
        assert_eq!(genres, Some("28,Unlisted"));
    }

    #[test]
    fn test_category_parsing_accepts_slugs_and_api_names() {
        assert_eq!("top-rated".parse::<Category>().unwrap(), Category::TopRated);
        assert_eq!("top_rated".parse::<Category>().unwrap(), Category::TopRated);
        assert!("upcoming".parse::<Category>().is_err());
        assert_eq!(Category::Trending.api_path(MediaType::Tv), "trending/tv/week");
    }
}
