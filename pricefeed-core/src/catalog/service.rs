use super::store::{DeleteItem, GetItemById, InsertItem, ListItems, MemoryCatalog, UpdateItemPrice};
use super::{CatalogError, CatalogItem, NewItem, validate_price};
use crate::channel::PriceChannel;
use kanau::processor::Processor;
use pricefeed_sdk::PriceEvent;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Catalog operations with price-change propagation.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<MemoryCatalog>,
    channel: Arc<dyn PriceChannel>,
}

fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

impl CatalogService {
    pub fn new(store: Arc<MemoryCatalog>, channel: Arc<dyn PriceChannel>) -> Self {
        Self { store, channel }
    }

    pub fn channel_kind(&self) -> &'static str {
        self.channel.kind()
    }

    pub async fn list(&self) -> Vec<CatalogItem> {
        infallible(self.store.process(ListItems).await)
    }

    pub async fn get(&self, id: Uuid) -> Result<CatalogItem, CatalogError> {
        infallible(self.store.process(GetItemById { id }).await).ok_or(CatalogError::NotFound(id))
    }

    /// Store a new item, then send its initial price.
    pub async fn create(&self, new: NewItem) -> Result<CatalogItem, CatalogError> {
        validate_price(new.price)?;
        self.insert(CatalogItem {
            id: Uuid::now_v7(),
            name: new.name,
            color: new.color,
            age: new.age,
            price: new.price,
        })
        .await
    }

    async fn insert(&self, item: CatalogItem) -> Result<CatalogItem, CatalogError> {
        if !infallible(self.store.process(InsertItem { item: item.clone() }).await) {
            return Err(CatalogError::DuplicateId(item.id));
        }
        info!(id = %item.id, price = item.price, "Created catalog item");

        self.send(PriceEvent::new(item.id, item.price)).await?;
        Ok(item)
    }

    /// Change an item's price, then send the new price.
    pub async fn update_price(&self, id: Uuid, price: f64) -> Result<(), CatalogError> {
        validate_price(price)?;
        if !infallible(self.store.process(UpdateItemPrice { id, price }).await) {
            return Err(CatalogError::NotFound(id));
        }
        info!(%id, price, "Updated catalog item price");

        self.send(PriceEvent::new(id, price)).await
    }

    /// Remove an item. No price event is sent.
    pub async fn delete(&self, id: Uuid) -> Result<(), CatalogError> {
        if infallible(self.store.process(DeleteItem { id }).await) {
            info!(%id, "Deleted catalog item");
            Ok(())
        } else {
            Err(CatalogError::NotFound(id))
        }
    }

    async fn send(&self, event: PriceEvent) -> Result<(), CatalogError> {
        self.channel.send(&event).await.map_err(|source| {
            warn!(
                id = %event.id,
                channel = self.channel.kind(),
                error = %source,
                "Price event not sent after catalog write"
            );
            CatalogError::Produce {
                id: event.id,
                source,
            }
        })
    }
}
