//! Catalog HTTP API.
//!
//! # Endpoints
//!
//! - `GET    /api/items`              – list items
//! - `POST   /api/items`              – create an item (sends its price)
//! - `GET    /api/items/{id}`         – fetch one item
//! - `DELETE /api/items/{id}`         – delete an item
//! - `PUT    /api/items/{id}/price`   – change an item's price (sends it)
//! - `GET    /api/prices`             – latest prices seen by the subscriber
//! - `GET    /api/prices/{id}`        – latest price of one item

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use pricefeed_core::catalog::{CatalogError, CatalogItem};
use pricefeed_sdk::objects::ItemResponse;

use crate::state::AppState;

mod items;
mod prices;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/items", get(items::list_items).post(items::create_item))
        .route("/items/{id}", get(items::get_item).delete(items::delete_item))
        .route("/items/{id}/price", put(items::update_price))
        .route("/prices", get(prices::list_prices))
        .route("/prices/{id}", get(prices::get_price))
}

fn to_response(item: CatalogItem) -> ItemResponse {
    ItemResponse {
        id: item.id,
        name: item.name,
        color: item.color,
        age: item.age,
        price: item.price,
    }
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ApiError {
    ItemNotFound,
    /// No price has been observed for this item yet.
    PriceNotFound,
    InvalidPrice,
    /// The price event could not be sent, or the item was never stored.
    Internal(CatalogError),
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(_) => ApiError::ItemNotFound,
            CatalogError::InvalidPrice(_) => ApiError::InvalidPrice,
            e @ (CatalogError::Produce { .. } | CatalogError::DuplicateId(_)) => {
                ApiError::Internal(e)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::ItemNotFound => (StatusCode::NOT_FOUND, "item not found").into_response(),
            ApiError::PriceNotFound => {
                (StatusCode::NOT_FOUND, "no price observed for item").into_response()
            }
            ApiError::InvalidPrice => (
                StatusCode::BAD_REQUEST,
                "price must be a non-negative finite number",
            )
                .into_response(),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Catalog operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
