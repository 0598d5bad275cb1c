//! capgate-engine
//!
//! The deterministic capital-risk rule pipeline: pure rule functions, the
//! fixed-order evaluator, and a thin facade that pairs a loaded policy with
//! `evaluate()` and measures evaluation latency.
//!
//! No IO, no time reads inside the pipeline itself — `PolicyEngine::evaluate`
//! is the only place wall-clock time is consulted, and only to stamp
//! `eval_ms`, which replay must ignore.

pub mod evaluator;
pub mod rules;

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use capgate_types::{CapitalPolicy, Decision, ExecutionState, MarketSnapshot, OrderIntent, PortfolioState};

pub use evaluator::{apply_monitor_mode, evaluate};

/// Holds a loaded, validated policy and its content hash; evaluates intents
/// against it and measures evaluation latency.
pub struct PolicyEngine {
    policy: CapitalPolicy,
    policy_hash: String,
}

impl PolicyEngine {
    pub fn load(policy_path: impl AsRef<Path>) -> Result<Self> {
        let loaded = capgate_policy::load(policy_path)?;
        Ok(PolicyEngine {
            policy: loaded.policy,
            policy_hash: loaded.policy_hash,
        })
    }

    pub fn from_loaded(loaded: capgate_policy::LoadedPolicy) -> Self {
        PolicyEngine {
            policy: loaded.policy,
            policy_hash: loaded.policy_hash,
        }
    }

    pub fn policy(&self) -> &CapitalPolicy {
        &self.policy
    }

    pub fn policy_hash(&self) -> &str {
        &self.policy_hash
    }

    /// Evaluate an order intent against the loaded policy, applying monitor
    /// mode if configured, and stamping `eval_ms`.
    pub fn evaluate(
        &self,
        intent: &OrderIntent,
        portfolio: &PortfolioState,
        market: &MarketSnapshot,
        execution: &ExecutionState,
    ) -> Decision {
        let t0 = Instant::now();
        let mut decision = evaluate(intent, &self.policy, portfolio, market, execution);
        if matches!(self.policy.defaults.mode, capgate_types::Mode::Monitor) {
            decision = apply_monitor_mode(decision);
        }
        decision.eval_ms = Some(t0.elapsed().as_secs_f64() * 1000.0);
        decision
    }
}

#[cfg(test)]
mod scenario_tests {
    //! Concrete end-to-end scenarios, fixed values reused across tests.

    use std::collections::BTreeMap;

    use capgate_types::instrument::{AssetClass, OrderType, Side};
    use capgate_types::{
        CapitalPolicy, Defaults, ExecutionLimits, ExecutionState, ExposureLimits, Instrument,
        KillSwitchConfig, Limits, LossLimits, MarketSnapshot, Mode, OrderIntent, Overrides,
        PortfolioState, Verdict,
    };

    use super::*;

    fn policy() -> CapitalPolicy {
        CapitalPolicy {
            version: "0.1".to_string(),
            timezone: "UTC".to_string(),
            defaults: Defaults::default(),
            limits: Limits {
                exposure: ExposureLimits {
                    max_position_pct: 0.10,
                    max_gross_exposure_x: 2.0,
                    max_net_exposure_x: None,
                },
                loss: LossLimits {
                    daily_loss_limit_pct: 0.02,
                    max_drawdown_pct: 0.05,
                },
                execution: ExecutionLimits {
                    max_orders_per_minute_global: 20,
                    max_orders_per_minute_by_strategy: 10,
                },
                kill_switch: KillSwitchConfig {
                    trip_on_rules: vec!["LOSS-002".to_string()],
                    trip_after_n_violations: 3,
                    violation_window_seconds: 300,
                },
            },
            overrides: Overrides::default(),
        }
    }

    fn market() -> MarketSnapshot {
        let mut prices = BTreeMap::new();
        prices.insert("AAPL".to_string(), 200.0);
        prices.insert("TSLA".to_string(), 400.0);
        MarketSnapshot {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            prices,
        }
    }

    fn portfolio() -> PortfolioState {
        PortfolioState {
            equity: 100_000.0,
            start_of_day_equity: 100_000.0,
            peak_equity: 100_000.0,
            positions: BTreeMap::new(),
            realized_pnl_today: 0.0,
            unrealized_pnl: 0.0,
        }
    }

    fn intent(symbol: &str, side: Side, qty: f64) -> OrderIntent {
        OrderIntent {
            intent_id: "i-1".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            strategy_id: "strat-a".to_string(),
            account_id: "acct-1".to_string(),
            instrument: Instrument {
                symbol: symbol.to_string(),
                asset_class: AssetClass::Equity,
            },
            side,
            order_type: OrderType::Market,
            qty,
            limit_price: None,
        }
    }

    #[test]
    fn scenario_1_allow_small_buy() {
        let d = evaluate(&intent("AAPL", Side::Buy, 10.0), &policy(), &portfolio(), &market(), &ExecutionState::default());
        assert_eq!(d.decision, Verdict::Allow);
        assert!(d.violations.is_empty());
        let pct = d.evidence.iter().find(|e| e.metric == "new_position_pct").unwrap();
        assert_eq!(pct.value, 0.02);
    }

    #[test]
    fn scenario_2_modify_on_position_cap() {
        let mut p = portfolio();
        p.positions.insert("AAPL".to_string(), 10.0);
        let d = evaluate(&intent("AAPL", Side::Buy, 50.0), &policy(), &p, &market(), &ExecutionState::default());
        assert_eq!(d.decision, Verdict::Modify);
        assert_eq!(d.modified_intent.unwrap().qty, 40.0);
        assert!(d.violations.iter().any(|v| v.rule_id == "EXP-001"));
    }

    #[test]
    fn scenario_3_deny_on_gross_exposure() {
        let mut p = portfolio();
        p.positions.insert("AAPL".to_string(), 600.0);
        p.positions.insert("TSLA".to_string(), 300.0);
        let d = evaluate(&intent("AAPL", Side::Buy, 1.0), &policy(), &p, &market(), &ExecutionState::default());
        assert_eq!(d.decision, Verdict::Deny);
        assert!(d.violations.iter().any(|v| v.rule_id == "EXP-002"));
    }

    #[test]
    fn scenario_4_deny_and_trip_kill_switch_on_drawdown() {
        let mut p = portfolio();
        p.equity = 90_000.0;
        p.peak_equity = 100_000.0;
        let d = evaluate(&intent("AAPL", Side::Buy, 1.0), &policy(), &p, &market(), &ExecutionState::default());
        assert_eq!(d.decision, Verdict::Deny);
        assert!(d.violations.iter().any(|v| v.rule_id == "LOSS-002"));
        assert!(d.kill_switch_triggered);
    }

    #[test]
    fn scenario_5_deny_on_kill_switch_active_short_circuits() {
        let mut e = ExecutionState::default();
        e.kill_switch_active = true;
        let d = evaluate(&intent("AAPL", Side::Buy, 1.0), &policy(), &portfolio(), &market(), &e);
        assert_eq!(d.decision, Verdict::Deny);
        assert_eq!(d.violations.len(), 1);
        assert_eq!(d.violations[0].rule_id, "KILL-001");
    }

    #[test]
    fn fail_closed_on_missing_price() {
        let d = evaluate(&intent("ZZZZ", Side::Buy, 1.0), &policy(), &portfolio(), &market(), &ExecutionState::default());
        assert_eq!(d.decision, Verdict::Deny);
        assert_eq!(d.violations.len(), 1);
        assert_eq!(d.violations[0].rule_id, "SYS-001");
        assert!(d.evidence.is_empty());
    }

    #[test]
    fn determinism_across_repeated_calls() {
        let a = evaluate(&intent("AAPL", Side::Buy, 10.0), &policy(), &portfolio(), &market(), &ExecutionState::default());
        let b = evaluate(&intent("AAPL", Side::Buy, 10.0), &policy(), &portfolio(), &market(), &ExecutionState::default());
        assert_eq!(a.decision, b.decision);
        assert_eq!(a.evidence, b.evidence);
        assert_eq!(a.violations, b.violations);
    }

    #[test]
    fn monitor_mode_allows_non_sys001_denies_but_keeps_violations() {
        let mut pol = policy();
        pol.defaults.mode = Mode::Monitor;
        let mut e = ExecutionState::default();
        e.kill_switch_active = true;
        let d = evaluate(&intent("AAPL", Side::Buy, 1.0), &pol, &portfolio(), &market(), &e);
        let monitored = apply_monitor_mode(d);
        assert_eq!(monitored.decision, Verdict::Allow);
        assert!(!monitored.violations.is_empty());
    }

    #[test]
    fn monitor_mode_still_denies_sys001() {
        let mut pol = policy();
        pol.defaults.mode = Mode::Monitor;
        let d = evaluate(&intent("ZZZZ", Side::Buy, 1.0), &pol, &portfolio(), &market(), &ExecutionState::default());
        let monitored = apply_monitor_mode(d);
        assert_eq!(monitored.decision, Verdict::Deny);
    }

    #[test]
    fn modify_implies_strictly_smaller_qty_and_within_cap() {
        let mut p = portfolio();
        p.positions.insert("AAPL".to_string(), 10.0);
        let original_qty = 50.0;
        let d = evaluate(&intent("AAPL", Side::Buy, original_qty), &policy(), &p, &market(), &ExecutionState::default());
        assert_eq!(d.decision, Verdict::Modify);
        let modified = d.modified_intent.unwrap();
        assert!(modified.qty > 0.0);
        assert!(modified.qty < original_qty);
        let new_pct = (10.0 + modified.qty) * 200.0 / p.equity;
        assert!(new_pct <= 0.10 + 1e-9);
    }

    #[test]
    fn override_precedence_symbol_beats_strategy_beats_defaults() {
        let mut pol = policy();
        pol.overrides.strategies.insert(
            "strat-a".to_string(),
            capgate_types::StrategyOverride {
                exposure: Some(ExposureLimits {
                    max_position_pct: 0.50,
                    max_gross_exposure_x: 5.0,
                    max_net_exposure_x: None,
                }),
                loss: None,
                execution: None,
            },
        );
        pol.overrides.symbols.insert(
            "AAPL".to_string(),
            capgate_types::SymbolOverride {
                exposure: Some(ExposureLimits {
                    max_position_pct: 0.01,
                    max_gross_exposure_x: 5.0,
                    max_net_exposure_x: None,
                }),
                loss: None,
                execution: None,
            },
        );
        // Symbol override (1%) should win over strategy override (50%) and deny.
        let d = evaluate(&intent("AAPL", Side::Buy, 10.0), &pol, &portfolio(), &market(), &ExecutionState::default());
        assert!(d.violations.iter().any(|v| v.rule_id == "EXP-001"));
    }
}
