//! Application state shared across all request handlers.

use pricefeed_core::catalog::CatalogService;
use pricefeed_core::projection::LatestPrices;
use std::sync::Arc;

/// Cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    /// Prices observed by this instance's broker subscriber.
    pub prices: Arc<LatestPrices>,
}

impl AppState {
    pub fn new(catalog: CatalogService, prices: Arc<LatestPrices>) -> Self {
        Self { catalog, prices }
    }
}
