//! Pure response-processing logic for Glimpse.
//!
//! Turns unreliable "structured" model output into a well-formed list of
//! items. No IO, no async; safe to call from any layer.

pub mod markdown;
pub mod recovery;

pub use markdown::normalize_emphasis;
pub use recovery::{ParseFailure, Recovered, Strategy, parse_summary, recover};
