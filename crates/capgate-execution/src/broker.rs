//! Broker adapter contract. No authentication, no retries, no
//! broker-specific fields — just submit/cancel/poll-fills.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use capgate_types::{instrument::Side, MarketSnapshot, OrderIntent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    /// RFC 3339 UTC, inherited from the intent that produced this fill.
    pub timestamp: String,
}

/// A broker adapter: submit an intent, cancel a pending order, poll fills
/// since a given timestamp. Implementors may fill synchronously (a
/// simulator) or asynchronously (a live broker polled later).
pub trait Broker {
    fn submit(&mut self, intent: &OrderIntent, market: &MarketSnapshot) -> Result<String>;
    fn cancel(&mut self, order_id: &str) -> Result<()>;
    fn poll_fills(&mut self, since_ts: Option<&str>) -> Result<Vec<Fill>>;
}
