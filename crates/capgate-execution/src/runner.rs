//! Stream runner: evaluate a sequence of intents, submit routable ones to a
//! broker, and evolve execution/portfolio state between intents.
//!
//! This sits between signal generation and execution, enforcing capital
//! policy on every order. It owns execution-state evolution: order
//! counters, the rolling violation window, and kill-switch latching.

use std::collections::BTreeMap;

use anyhow::Result;
use capgate_engine::PolicyEngine;
use capgate_types::{Decision, ExecutionState, MarketSnapshot, OrderIntent, PortfolioState, Verdict};
use chrono::{DateTime, Duration};
use uuid::Uuid;

use crate::broker::{Broker, Fill};
use crate::events::{write_execution_event, ExecutionEvent};
use capgate_audit::{build_audit_event, AuditLog};

fn verdict_key(v: Verdict) -> &'static str {
    match v {
        Verdict::Allow => "ALLOW",
        Verdict::Modify => "MODIFY",
        Verdict::Deny => "DENY",
    }
}

/// Accumulates per-run statistics as intents are evaluated.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub total: u64,
    pub counts: BTreeMap<String, u64>,
    pub rule_histogram: BTreeMap<String, u64>,
    pub submitted: u64,
    pub filled: u64,
}

impl Default for RunSummary {
    fn default() -> Self {
        let mut counts = BTreeMap::new();
        for key in ["ALLOW", "DENY", "MODIFY"] {
            counts.insert(key.to_string(), 0);
        }
        RunSummary {
            total: 0,
            counts,
            rule_histogram: BTreeMap::new(),
            submitted: 0,
            filled: 0,
        }
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, decision: &Decision) {
        self.total += 1;
        *self
            .counts
            .entry(verdict_key(decision.decision).to_string())
            .or_insert(0) += 1;
        for v in &decision.violations {
            *self.rule_histogram.entry(v.rule_id.clone()).or_insert(0) += 1;
        }
    }

    pub fn to_report(&self, portfolio: &PortfolioState, execution: &ExecutionState) -> RunSummaryReport {
        RunSummaryReport {
            total_intents: self.total,
            decisions: self.counts.clone(),
            rule_histogram: self.rule_histogram.clone(),
            orders_submitted: self.submitted,
            orders_filled: self.filled,
            final_equity: portfolio.equity,
            final_positions: portfolio.positions.clone(),
            kill_switch_active: execution.kill_switch_active,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummaryReport {
    pub total_intents: u64,
    pub decisions: BTreeMap<String, u64>,
    pub rule_histogram: BTreeMap<String, u64>,
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub final_equity: f64,
    pub final_positions: BTreeMap<String, f64>,
    pub kill_switch_active: bool,
}

/// Drops violations older than `window_seconds` relative to `current_ts`.
/// A timestamp that fails to parse as RFC 3339 is kept rather than dropped —
/// a corrupt clock must never silently widen the kill-switch trigger window.
pub fn evict_window(
    violations: &[(String, String)],
    current_ts: &str,
    window_seconds: u64,
) -> Vec<(String, String)> {
    let now = match DateTime::parse_from_rfc3339(current_ts) {
        Ok(dt) => dt,
        Err(_) => return violations.to_vec(),
    };
    let cutoff = now - Duration::seconds(window_seconds as i64);
    violations
        .iter()
        .filter(|(ts, _)| match DateTime::parse_from_rfc3339(ts) {
            Ok(t) => t >= cutoff,
            Err(_) => true,
        })
        .cloned()
        .collect()
}

/// Updates `portfolio` for one fill: adds on a buy, subtracts on a sell.
/// Shared by the stream runner and the HTTP daemon so both apply fills
/// identically.
pub fn apply_fill(portfolio: &mut PortfolioState, fill: &Fill) {
    let signed_delta = match fill.side {
        capgate_types::instrument::Side::Buy => fill.qty,
        capgate_types::instrument::Side::Sell => -fill.qty,
    };
    portfolio.apply_fill_qty(&fill.symbol, signed_delta);
}

/// Runs a stream of intents through `engine` and `broker`, mutating
/// `portfolio` and `execution` in place. Returns run statistics.
///
/// Per intent: evaluate, audit (before any broker call), submit if
/// routable, apply fills, update counters, evict the violation window,
/// latch the kill switch. The kill switch only ever turns on within a run —
/// nothing here clears it.
#[allow(clippy::too_many_arguments)]
pub fn run_stream<B: Broker>(
    engine: &PolicyEngine,
    broker: &mut B,
    intents: &[OrderIntent],
    portfolio: &mut PortfolioState,
    execution: &mut ExecutionState,
    market: &MarketSnapshot,
    audit_log: Option<&AuditLog>,
    exec_log_path: Option<&std::path::Path>,
    run_id: Option<Uuid>,
) -> Result<RunSummary> {
    let mut summary = RunSummary::new();
    let kill_cfg = engine.policy().limits.kill_switch.clone();
    let policy_hash = engine.policy_hash().to_string();

    for intent in intents {
        let decision = engine.evaluate(intent, portfolio, market, execution);
        summary.record(&decision);

        if let Some(log) = audit_log {
            let event = build_audit_event(
                intent,
                portfolio,
                market,
                execution,
                &decision,
                &policy_hash,
                run_id,
            );
            log.append(&event)?;
        }

        if decision.is_routable() {
            let effective = decision.modified_intent.as_ref().unwrap_or(intent);
            match broker.submit(effective, market) {
                Ok(order_id) => {
                    summary.submitted += 1;
                    if let Some(path) = exec_log_path {
                        write_execution_event(
                            path,
                            &ExecutionEvent::submitted(
                                &intent.intent_id,
                                &order_id,
                                run_id,
                                Some(&policy_hash),
                                &effective.instrument.symbol,
                                effective.side,
                                effective.qty,
                                order_type_str(effective.order_type),
                            ),
                        )?;
                    }

                    let fills = broker.poll_fills(Some(&intent.timestamp))?;
                    for fill in &fills {
                        apply_fill(portfolio, fill);
                        summary.filled += 1;
                        if let Some(path) = exec_log_path {
                            write_execution_event(
                                path,
                                &ExecutionEvent::filled(
                                    &intent.intent_id,
                                    &fill.order_id,
                                    run_id,
                                    Some(&policy_hash),
                                    &fill.symbol,
                                    fill.side,
                                    fill.qty,
                                    fill.price,
                                ),
                            )?;
                        }
                    }

                    execution.record_order(&intent.strategy_id);
                }
                Err(e) => {
                    if let Some(path) = exec_log_path {
                        write_execution_event(
                            path,
                            &ExecutionEvent::rejected(
                                &intent.intent_id,
                                run_id,
                                Some(&policy_hash),
                                &effective.instrument.symbol,
                            ),
                        )?;
                    }
                    return Err(e);
                }
            }
        }

        for v in &decision.violations {
            execution
                .violations_last_window
                .push((intent.timestamp.clone(), v.rule_id.clone()));
        }
        execution.violations_last_window = evict_window(
            &execution.violations_last_window,
            &intent.timestamp,
            kill_cfg.violation_window_seconds,
        );

        if decision.kill_switch_triggered {
            execution.kill_switch_active = true;
        }
        if !execution.kill_switch_active
            && execution.violations_last_window.len() as u32 >= kill_cfg.trip_after_n_violations
        {
            execution.kill_switch_active = true;
        }
    }

    Ok(summary)
}

pub fn order_type_str(ot: capgate_types::instrument::OrderType) -> &'static str {
    match ot {
        capgate_types::instrument::OrderType::Market => "market",
        capgate_types::instrument::OrderType::Limit => "limit",
    }
}
