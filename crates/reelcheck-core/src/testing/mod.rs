//! Simulated Discover app for offline runs and tests.
//!
//! [`SimulatedDriver`] stands in for a real browser and [`SimulatedApiServer`]
//! for the data API. Both draw from the same deterministic [`Catalogue`].

mod api_server;
mod catalogue;
mod driver;

pub use api_server::{SimulatedApiServer, router};
pub use catalogue::{Catalogue, CatalogueItem, CatalogueQuery, PAGE_SIZE};
pub use driver::{DEFAULT_CATALOGUE_SIZE, DEFAULT_PAGE_CAP, SimulatedApp, SimulatedDriver};
