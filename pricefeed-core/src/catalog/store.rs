use super::CatalogItem;
use kanau::processor::Processor;
use std::collections::BTreeMap;
use std::convert::Infallible;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Keyed item store. Ids are v7 UUIDs, so iteration follows creation order.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    items: RwLock<BTreeMap<Uuid, CatalogItem>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Insert an item. Returns `false` and leaves the store unchanged if the id
/// is already taken.
#[derive(Debug, Clone)]
pub struct InsertItem {
    pub item: CatalogItem,
}

impl Processor<InsertItem> for MemoryCatalog {
    type Output = bool;
    type Error = Infallible;
    #[tracing::instrument(skip_all, name = "Catalog:InsertItem")]
    async fn process(&self, insert: InsertItem) -> Result<bool, Infallible> {
        let mut items = self.items.write().await;
        if items.contains_key(&insert.item.id) {
            return Ok(false);
        }
        items.insert(insert.item.id, insert.item);
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListItems;

impl Processor<ListItems> for MemoryCatalog {
    type Output = Vec<CatalogItem>;
    type Error = Infallible;
    #[tracing::instrument(skip_all, name = "Catalog:ListItems")]
    async fn process(&self, _: ListItems) -> Result<Vec<CatalogItem>, Infallible> {
        Ok(self.items.read().await.values().cloned().collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetItemById {
    pub id: Uuid,
}

impl Processor<GetItemById> for MemoryCatalog {
    type Output = Option<CatalogItem>;
    type Error = Infallible;
    #[tracing::instrument(skip_all, name = "Catalog:GetItemById")]
    async fn process(&self, query: GetItemById) -> Result<Option<CatalogItem>, Infallible> {
        Ok(self.items.read().await.get(&query.id).cloned())
    }
}

/// Returns `false` if no item has this id.
#[derive(Debug, Clone, Copy)]
pub struct UpdateItemPrice {
    pub id: Uuid,
    pub price: f64,
}

impl Processor<UpdateItemPrice> for MemoryCatalog {
    type Output = bool;
    type Error = Infallible;
    #[tracing::instrument(skip_all, name = "Catalog:UpdateItemPrice")]
    async fn process(&self, update: UpdateItemPrice) -> Result<bool, Infallible> {
        let mut items = self.items.write().await;
        match items.get_mut(&update.id) {
            Some(item) => {
                item.price = update.price;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeleteItem {
    pub id: Uuid,
}

impl Processor<DeleteItem> for MemoryCatalog {
    type Output = bool;
    type Error = Infallible;
    #[tracing::instrument(skip_all, name = "Catalog:DeleteItem")]
    async fn process(&self, delete: DeleteItem) -> Result<bool, Infallible> {
        Ok(self.items.write().await.remove(&delete.id).is_some())
    }
}
