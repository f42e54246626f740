pub mod catalog;
pub mod price;

pub use catalog::{
    CreateItemRequest, CreateItemResponse, ItemResponse, PriceResponse, UpdatePriceRequest,
};
pub use price::{BrokerPriceMessage, PriceEvent};
