//! Catalog HTTP API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for `POST /api/items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub color: String,
    pub age: u32,
    pub price: f64,
}

/// Response returned after an item is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItemResponse {
    pub id: Uuid,
}

/// Request body for `PUT /api/items/{id}/price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePriceRequest {
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub age: u32,
    pub price: f64,
}

/// Latest price seen by this instance's subscriber for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub id: Uuid,
    pub price: f64,
}
