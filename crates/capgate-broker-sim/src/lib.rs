//! Deterministic in-memory simulated broker.
//!
//! Rules:
//!   - Market orders fill immediately at the snapshot price.
//!   - Limit buy fills if `limit_price >= price`.
//!   - Limit sell fills if `limit_price <= price`.
//!   - No partial fills, no slippage, no fees.
//!   - A missing or non-positive price rejects the order outright.
//!
//! All behavior is a pure function of the intent and the market snapshot
//! passed to `submit` — no randomness, no wall-clock reads.

use std::collections::BTreeMap;

use capgate_execution::{Broker, Fill};
use capgate_types::instrument::{OrderType, Side};
use capgate_types::{MarketSnapshot, OrderIntent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BrokerOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub status: OrderStatus,
}

/// Deterministic paper broker for testing and demos. One instance tracks
/// every order it has ever seen and every fill it has ever produced.
#[derive(Debug)]
pub struct SimulatedBroker {
    orders: BTreeMap<String, BrokerOrder>,
    fills: Vec<Fill>,
    next_id: u64,
}

impl SimulatedBroker {
    pub fn new() -> Self {
        SimulatedBroker {
            orders: BTreeMap::new(),
            fills: Vec::new(),
            next_id: 1,
        }
    }

    pub fn get_order(&self, order_id: &str) -> Option<&BrokerOrder> {
        self.orders.get(order_id)
    }

    fn next_order_id(&mut self) -> String {
        let id = format!("SIM-{:06}", self.next_id);
        self.next_id += 1;
        id
    }
}

fn order_fills(intent: &OrderIntent, price: f64) -> bool {
    match intent.order_type {
        OrderType::Market => true,
        OrderType::Limit => match (intent.limit_price, intent.side) {
            (Some(limit), Side::Buy) => limit >= price,
            (Some(limit), Side::Sell) => limit <= price,
            (None, _) => false,
        },
    }
}

impl Broker for SimulatedBroker {
    fn submit(&mut self, intent: &OrderIntent, market: &MarketSnapshot) -> anyhow::Result<String> {
        let symbol = intent.instrument.symbol.clone();
        let order_id = self.next_order_id();
        let price = market.price_for(&symbol);

        let status = match price {
            Some(p) if order_fills(intent, p) => OrderStatus::Filled,
            _ => OrderStatus::Rejected,
        };

        if let (OrderStatus::Filled, Some(price)) = (status, price) {
            self.fills.push(Fill {
                order_id: order_id.clone(),
                symbol: symbol.clone(),
                side: intent.side,
                qty: intent.qty,
                price,
                timestamp: intent.timestamp.clone(),
            });
        }

        self.orders.insert(
            order_id.clone(),
            BrokerOrder {
                order_id: order_id.clone(),
                symbol,
                side: intent.side,
                qty: intent.qty,
                order_type: intent.order_type,
                limit_price: intent.limit_price,
                status,
            },
        );

        Ok(order_id)
    }

    fn cancel(&mut self, order_id: &str) -> anyhow::Result<()> {
        // Nothing in this broker is ever left pending, so cancel is a no-op
        // on any order that already exists; it deliberately does not error
        // on an unknown id, matching the adapter contract's idempotence.
        let _ = order_id;
        Ok(())
    }

    fn poll_fills(&mut self, since_ts: Option<&str>) -> anyhow::Result<Vec<Fill>> {
        let fills = match since_ts {
            None => self.fills.clone(),
            Some(ts) => self
                .fills
                .iter()
                .filter(|f| f.timestamp.as_str() >= ts)
                .cloned()
                .collect(),
        };
        Ok(fills)
    }
}

#[cfg(test)]
mod tests {
    use capgate_types::instrument::{AssetClass, OrderType, Side};
    use capgate_types::Instrument;

    use super::*;

    fn market(price: f64) -> MarketSnapshot {
        let mut prices = BTreeMap::new();
        prices.insert("AAPL".to_string(), price);
        MarketSnapshot {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            prices,
        }
    }

    fn intent(side: Side, order_type: OrderType, qty: f64, limit_price: Option<f64>) -> OrderIntent {
        OrderIntent {
            intent_id: "i-1".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            strategy_id: "strat-a".to_string(),
            account_id: "acct-1".to_string(),
            instrument: Instrument {
                symbol: "AAPL".to_string(),
                asset_class: AssetClass::Equity,
            },
            side,
            order_type,
            qty,
            limit_price,
        }
    }

    #[test]
    fn market_order_fills_immediately_at_snapshot_price() {
        let mut broker = SimulatedBroker::new();
        let order_id = broker
            .submit(&intent(Side::Buy, OrderType::Market, 10.0, None), &market(200.0))
            .unwrap();
        let fills = broker.poll_fills(None).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].order_id, order_id);
        assert_eq!(fills[0].price, 200.0);
    }

    #[test]
    fn limit_buy_fills_only_when_limit_at_or_above_price() {
        let mut broker = SimulatedBroker::new();
        broker
            .submit(
                &intent(Side::Buy, OrderType::Limit, 10.0, Some(199.0)),
                &market(200.0),
            )
            .unwrap();
        assert!(broker.poll_fills(None).unwrap().is_empty());

        broker
            .submit(
                &intent(Side::Buy, OrderType::Limit, 10.0, Some(200.0)),
                &market(200.0),
            )
            .unwrap();
        assert_eq!(broker.poll_fills(None).unwrap().len(), 1);
    }

    #[test]
    fn limit_sell_fills_only_when_limit_at_or_below_price() {
        let mut broker = SimulatedBroker::new();
        broker
            .submit(
                &intent(Side::Sell, OrderType::Limit, 10.0, Some(201.0)),
                &market(200.0),
            )
            .unwrap();
        assert!(broker.poll_fills(None).unwrap().is_empty());

        broker
            .submit(
                &intent(Side::Sell, OrderType::Limit, 10.0, Some(200.0)),
                &market(200.0),
            )
            .unwrap();
        assert_eq!(broker.poll_fills(None).unwrap().len(), 1);
    }

    #[test]
    fn missing_price_rejects_the_order() {
        let mut broker = SimulatedBroker::new();
        let order_id = broker
            .submit(&intent(Side::Buy, OrderType::Market, 10.0, None), &market(0.0))
            .unwrap();
        assert!(broker.poll_fills(None).unwrap().is_empty());
        assert_eq!(
            broker.get_order(&order_id).unwrap().status,
            OrderStatus::Rejected
        );
    }

    #[test]
    fn order_ids_are_sequential_and_deterministic() {
        let mut broker = SimulatedBroker::new();
        let a = broker
            .submit(&intent(Side::Buy, OrderType::Market, 1.0, None), &market(200.0))
            .unwrap();
        let b = broker
            .submit(&intent(Side::Buy, OrderType::Market, 1.0, None), &market(200.0))
            .unwrap();
        assert_eq!(a, "SIM-000001");
        assert_eq!(b, "SIM-000002");
    }
}
