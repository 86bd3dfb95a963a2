//! Deterministic movie/TV catalogue shared by the simulated UI and API.

use crate::filters::{Category, FilterState, MediaType, genre_id, genre_ids, genre_name};
use serde_json::{Value, json};

/// Results per page, as the real API returns.
pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueItem {
    pub id: u32,
    pub title: String,
    pub media_type: MediaType,
    pub year: i32,
    pub rating: f32,
    pub popularity: f32,
    pub trending_rank: u32,
    pub genre_ids: Vec<u32>,
}

impl CatalogueItem {
    /// JSON shape of a list entry.
    pub fn to_json(&self) -> Value {
        let (title_key, date_key) = match self.media_type {
            MediaType::Movie => ("title", "release_date"),
            MediaType::Tv => ("name", "first_air_date"),
        };
        json!({
            "id": self.id,
            title_key: self.title,
            date_key: format!("{}-06-15", self.year),
            "vote_average": self.rating,
            "popularity": self.popularity,
            "genre_ids": self.genre_ids,
            "media_type": self.media_type.as_str(),
        })
    }
}

/// Everything that selects and orders a result list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogueQuery {
    pub category: Category,
    pub media: MediaType,
    pub years: Option<(i32, i32)>,
    pub rating: Option<(f32, f32)>,
    pub genres: Vec<u32>,
}

impl CatalogueQuery {
    pub fn from_filter_state(state: &FilterState) -> Self {
        let mut genres: Vec<u32> = state.genres.iter().filter_map(|g| resolve_genre(g)).collect();
        genres.sort_unstable();
        Self {
            category: state.category,
            media: state.media_type,
            years: state.year_range.map(|r| (r.min, r.max)),
            rating: state.rating_range.map(|r| (r.min, r.max)),
            genres,
        }
    }
}

fn resolve_genre(raw: &str) -> Option<u32> {
    raw.trim().parse().ok().or_else(|| genre_id(raw))
}

/// A page of query results.
#[derive(Debug, Clone)]
pub struct CataloguePage<'a> {
    pub page: u32,
    pub items: Vec<&'a CatalogueItem>,
    pub total_pages: u32,
    pub total_results: usize,
}

impl CataloguePage<'_> {
    pub fn to_json(&self) -> Value {
        json!({
            "page": self.page,
            "results": self.items.iter().map(|i| i.to_json()).collect::<Vec<_>>(),
            "total_pages": self.total_pages,
            "total_results": self.total_results,
        })
    }
}

const TITLE_WORDS: &[&str] = &[
    "Midnight", "Harbor", "Echo", "Silent", "Crimson", "Atlas", "Paper", "Glass", "Northern",
    "Last", "Wild", "Hollow", "Golden", "Iron", "Distant", "Little", "Broken", "Summer",
];

const TITLE_NOUNS: &[&str] = &[
    "Line", "Garden", "Protocol", "Kingdom", "Letters", "Run", "Signal", "Voyage", "Witness",
    "Frontier", "House", "Circuit", "Promise", "Tide",
];

/// Small deterministic generator so every run sees the same catalogue.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    fn below(&mut self, n: u32) -> u32 {
        self.next() % n
    }
}

#[derive(Debug, Clone)]
pub struct Catalogue {
    items: Vec<CatalogueItem>,
}

impl Catalogue {
    /// `per_media` movies and `per_media` TV shows.
    pub fn generate(per_media: usize) -> Self {
        let mut rng = Lcg(0x5eed_cafe);
        let all_genres: Vec<u32> = genre_ids().collect();
        let mut items = Vec::with_capacity(per_media * 2);

        for (offset, media) in [(0u32, MediaType::Movie), (100_000, MediaType::Tv)] {
            for n in 0..per_media as u32 {
                let word = TITLE_WORDS[rng.below(TITLE_WORDS.len() as u32) as usize];
                let noun = TITLE_NOUNS[rng.below(TITLE_NOUNS.len() as u32) as usize];
                let genre_count = 1 + rng.below(3) as usize;
                let mut genres: Vec<u32> = (0..genre_count)
                    .map(|_| all_genres[rng.below(all_genres.len() as u32) as usize])
                    .collect();
                genres.sort_unstable();
                genres.dedup();

                items.push(CatalogueItem {
                    id: offset + n + 1,
                    title: format!("{word} {noun} {}", n + 1),
                    media_type: media,
                    year: 1950 + rng.below(76) as i32,
                    rating: (10 + rng.below(88)) as f32 / 10.0,
                    popularity: (rng.below(100_000) as f32) / 100.0,
                    trending_rank: rng.below(1_000_000),
                    genre_ids: genres,
                });
            }
        }
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All matching items in category order.
    pub fn query(&self, query: &CatalogueQuery) -> Vec<&CatalogueItem> {
        let mut matched: Vec<&CatalogueItem> = self
            .items
            .iter()
            .filter(|i| i.media_type == query.media)
            .filter(|i| query.years.is_none_or(|(lo, hi)| i.year >= lo && i.year <= hi))
            .filter(|i| {
                query
                    .rating
                    .is_none_or(|(lo, hi)| i.rating >= lo && i.rating <= hi)
            })
            .filter(|i| query.genres.iter().all(|g| i.genre_ids.contains(g)))
            .collect();

        match query.category {
            Category::Popular => {
                matched.sort_by(|a, b| b.popularity.total_cmp(&a.popularity).then(a.id.cmp(&b.id)));
            }
            Category::Trending => matched.sort_by_key(|i| (i.trending_rank, i.id)),
            Category::Newest => matched.sort_by(|a, b| b.year.cmp(&a.year).then(a.id.cmp(&b.id))),
            Category::TopRated => {
                matched.sort_by(|a, b| b.rating.total_cmp(&a.rating).then(a.id.cmp(&b.id)));
            }
        }
        matched
    }

    /// One page of matching items; `page` past the data yields an empty page.
    pub fn page(&self, query: &CatalogueQuery, page: u32) -> CataloguePage<'_> {
        let matched = self.query(query);
        let total_results = matched.len();
        let total_pages = total_results.div_ceil(PAGE_SIZE) as u32;
        let start = (page.saturating_sub(1) as usize).saturating_mul(PAGE_SIZE);
        let items = matched.into_iter().skip(start).take(PAGE_SIZE).collect();
        CataloguePage {
            page,
            items,
            total_pages,
            total_results,
        }
    }
}

/// Display names of an item's genres.
pub fn genre_names(item: &CatalogueItem) -> Vec<&'static str> {
    item.genre_ids.iter().filter_map(|id| genre_name(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = Catalogue::generate(50);
        let b = Catalogue::generate(50);
        assert_eq!(a.items, b.items);
        assert_eq!(a.len(), 100);
    }

    #[test]
    fn test_query_respects_filters() {
        let catalogue = Catalogue::generate(240);
        let query = CatalogueQuery {
            years: Some((1990, 2000)),
            rating: Some((3.0, 9.0)),
            ..CatalogueQuery::default()
        };
        let items = catalogue.query(&query);
        assert!(!items.is_empty());
        for item in items {
            assert_eq!(item.media_type, MediaType::Movie);
            assert!((1990..=2000).contains(&item.year));
            assert!(item.rating >= 3.0 && item.rating <= 9.0);
        }
    }

    #[test]
    fn test_category_changes_order_not_membership() {
        let catalogue = Catalogue::generate(240);
        let popular = CatalogueQuery::default();
        let top = CatalogueQuery {
            category: Category::TopRated,
            ..CatalogueQuery::default()
        };
        assert_eq!(catalogue.query(&popular).len(), catalogue.query(&top).len());
        let ratings: Vec<f32> = catalogue.query(&top).iter().map(|i| i.rating).collect();
        assert!(ratings.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_paging() {
        let catalogue = Catalogue::generate(240);
        let query = CatalogueQuery::default();

        let first = catalogue.page(&query, 1);
        assert_eq!(first.items.len(), PAGE_SIZE);
        assert_eq!(first.total_pages, 12);
        assert_eq!(first.total_results, 240);

        let beyond = catalogue.page(&query, 13);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_pages, 12);
    }
}
