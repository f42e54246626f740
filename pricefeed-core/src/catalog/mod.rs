//! Catalog of priced items and its write path.
//!
//! Each create and price update is followed by exactly one send on the
//! configured [`PriceChannel`](crate::channel::PriceChannel). The store
//! write and the send are not atomic: if the send fails the write stays.

pub mod service;
pub mod store;

pub use service::CatalogService;
pub use store::{DeleteItem, GetItemById, InsertItem, ListItems, MemoryCatalog, UpdateItemPrice};

use crate::channel::PriceChannelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub age: u32,
    pub price: f64,
}

/// Fields supplied by the caller when creating an item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub color: String,
    pub age: u32,
    pub price: f64,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog item {0} not found")]
    NotFound(Uuid),

    #[error("invalid price {0}")]
    InvalidPrice(f64),

    #[error("catalog item {0} already exists")]
    DuplicateId(Uuid),

    /// The store write succeeded but the price event was not sent.
    #[error("item {id} saved but price event was not sent: {source}")]
    Produce {
        id: Uuid,
        #[source]
        source: PriceChannelError,
    },
}

pub(crate) fn validate_price(price: f64) -> Result<(), CatalogError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(CatalogError::InvalidPrice(price))
    }
}
