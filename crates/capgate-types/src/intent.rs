use serde::{Deserialize, Serialize};

use crate::instrument::{Instrument, OrderType, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderIntent {
    pub intent_id: String,
    /// RFC 3339 UTC.
    pub timestamp: String,
    pub strategy_id: String,
    pub account_id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<f64>,
}

impl OrderIntent {
    /// Bounds the derive macros can't express: qty > 0, limit orders need a
    /// limit price, limit_price (if present) >= 0, symbol non-empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.instrument.symbol.is_empty() {
            return Err("instrument.symbol must not be empty".to_string());
        }
        if !(self.qty > 0.0) {
            return Err("qty must be > 0".to_string());
        }
        if let Some(lp) = self.limit_price {
            if lp < 0.0 {
                return Err("limit_price must be >= 0".to_string());
            }
        }
        if matches!(self.order_type, OrderType::Limit) && self.limit_price.is_none() {
            return Err("limit orders require limit_price".to_string());
        }
        Ok(())
    }

    pub fn with_qty(&self, qty: f64) -> Self {
        let mut copy = self.clone();
        copy.qty = qty;
        copy
    }
}
