//! Wire objects and codecs shared by every component of the pricefeed pipeline.
//!
//! All encoding and decoding of price events goes through [`codec`]; nothing
//! else in the workspace touches raw field maps or JSON bodies.

#![forbid(unsafe_code)]

pub mod codec;
pub mod objects;

pub use codec::{DecodeError, EncodeError};
pub use objects::PriceEvent;
