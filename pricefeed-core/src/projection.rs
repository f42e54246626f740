//! Latest known price per entity, as observed by a subscriber.
//!
//! Events carry absolute prices, not deltas, so applying one twice leaves
//! the projection unchanged. That is what makes duplicate deliveries from
//! the relay harmless.

use crate::consumer::PriceHandler;
use async_trait::async_trait;
use pricefeed_sdk::PriceEvent;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct LatestPrices {
    prices: RwLock<HashMap<Uuid, f64>>,
    applied: AtomicU64,
}

impl LatestPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply(&self, event: PriceEvent) {
        self.prices.write().await.insert(event.id, event.price);
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn get(&self, id: Uuid) -> Option<f64> {
        self.prices.read().await.get(&id).copied()
    }

    pub async fn snapshot(&self) -> HashMap<Uuid, f64> {
        self.prices.read().await.clone()
    }

    /// Events applied so far, duplicates included.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PriceHandler for LatestPrices {
    type Error = Infallible;

    async fn handle(&self, event: PriceEvent) -> Result<(), Infallible> {
        self.apply(event).await;
        Ok(())
    }
}
