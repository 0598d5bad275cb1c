use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketSnapshot {
    pub timestamp: String,
    pub prices: BTreeMap<String, f64>,
}

impl MarketSnapshot {
    pub fn validate(&self) -> Result<(), String> {
        for (sym, px) in &self.prices {
            if !px.is_finite() {
                return Err(format!("price for '{sym}' is not a finite number"));
            }
        }
        Ok(())
    }

    pub fn price_for(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied().filter(|p| *p > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortfolioState {
    pub equity: f64,
    pub start_of_day_equity: f64,
    pub peak_equity: f64,
    #[serde(default)]
    pub positions: BTreeMap<String, f64>,
    #[serde(default)]
    pub realized_pnl_today: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
}

impl PortfolioState {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.equity > 0.0) {
            return Err("equity must be > 0".to_string());
        }
        if !(self.start_of_day_equity > 0.0) {
            return Err("start_of_day_equity must be > 0".to_string());
        }
        if !(self.peak_equity > 0.0) {
            return Err("peak_equity must be > 0".to_string());
        }
        Ok(())
    }

    pub fn position(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).copied().unwrap_or(0.0)
    }

    /// Applies a fill: add on buy, subtract on sell, drop the entry once the
    /// remaining quantity is indistinguishable from flat.
    pub fn apply_fill_qty(&mut self, symbol: &str, signed_delta: f64) {
        let new_qty = self.position(symbol) + signed_delta;
        if new_qty.abs() < 1e-10 {
            self.positions.remove(symbol);
        } else {
            self.positions.insert(symbol.to_string(), new_qty);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionState {
    #[serde(default)]
    pub orders_last_60s_global: u64,
    #[serde(default)]
    pub orders_last_60s_by_strategy: BTreeMap<String, u64>,
    #[serde(default)]
    pub violations_last_window: Vec<(String, String)>,
    #[serde(default)]
    pub kill_switch_active: bool,
}

impl ExecutionState {
    pub fn record_order(&mut self, strategy_id: &str) {
        self.orders_last_60s_global += 1;
        *self
            .orders_last_60s_by_strategy
            .entry(strategy_id.to_string())
            .or_insert(0) += 1;
    }
}
