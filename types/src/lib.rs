//! Core domain types for Glimpse.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the gateway.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

pub mod bus;
mod ids;
mod message;
mod model;
mod pricing;
mod summary;

pub use bus::{BusRequest, BusResponse, BusStatus};
pub use ids::CorrelationId;
pub use message::{ChatMessage, EmptyContentError, MessageContent, ResponseFormat, Role};
pub use model::{ApiKey, ModelId, ModelParseError};
pub use pricing::{Freshness, PriceEntry, PriceLookup, PriceTable, epoch_millis};
pub use summary::ParsedSummary;
