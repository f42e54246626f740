#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod broker;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod consumer;
pub mod log;
pub mod producer;
pub mod projection;
pub mod relay;
pub mod utils;

pub use pricefeed_sdk::{DecodeError, EncodeError, PriceEvent};
