//! Cached per-model pricing.
//!
//! Timestamps are stored as Unix epoch milliseconds. Constructors and freshness
//! checks take `SystemTime` explicitly; callers own the clock.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, saturating at zero for pre-epoch clocks.
#[must_use]
pub fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub price_per_unit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_price_per_unit: Option<f64>,
    pub observed_at: u64,
}

impl PriceEntry {
    #[must_use]
    pub fn observed(
        price_per_unit: f64,
        completion_price_per_unit: Option<f64>,
        at: SystemTime,
    ) -> Self {
        Self {
            price_per_unit,
            completion_price_per_unit,
            observed_at: epoch_millis(at),
        }
    }

    /// Fresh while `now - observed_at < ttl`. An entry from the future counts as fresh.
    #[must_use]
    pub fn is_fresh(&self, now: SystemTime, ttl: Duration) -> bool {
        let age_ms = epoch_millis(now).saturating_sub(self.observed_at);
        u128::from(age_ms) < ttl.as_millis()
    }
}

/// The persisted `modelId -> entry` mapping. Ordered so the stored document is stable.
pub type PriceTable = BTreeMap<String, PriceEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Served only after a refresh attempt failed.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLookup {
    pub entry: PriceEntry,
    pub freshness: Freshness,
}
