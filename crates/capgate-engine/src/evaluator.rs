//! Derived metric computation and the deterministic evaluation pipeline.
//!
//! Evaluation order (fixed):
//!   1. Fail-closed price check (SYS-001, short-circuits)
//!   2. Kill switch (KILL-001, short-circuits)
//!   3. Loss limits (daily loss, drawdown)
//!   4. Execution throttles (global, per-strategy)
//!   5. Exposure checks (position, gross, net) — with MODIFY support
//!   6. All clear -> ALLOW

use std::collections::BTreeMap;

use capgate_types::decision::round6;
use capgate_types::{
    CapitalPolicy, Decision, Evidence, ExecutionState, MarketSnapshot, OrderIntent,
    PortfolioState, Severity, Verdict, Violation,
};

use crate::rules::{
    check_daily_loss, check_drawdown, check_global_rate, check_gross_exposure, check_kill_switch,
    check_net_exposure, check_position_limit, check_strategy_rate,
};

/// Evaluate an order intent against a capital policy. Deterministic and
/// total: never panics, never consults wall-clock time or randomness.
pub fn evaluate(
    intent: &OrderIntent,
    policy: &CapitalPolicy,
    portfolio: &PortfolioState,
    market: &MarketSnapshot,
    execution: &ExecutionState,
) -> Decision {
    let symbol = &intent.instrument.symbol;

    // --- Fail-closed: missing or invalid price ---
    let price = match market.price_for(symbol) {
        Some(p) => p,
        None => {
            return Decision {
                decision: Verdict::Deny,
                intent_id: intent.intent_id.clone(),
                modified_intent: None,
                violations: vec![Violation::new(
                    "SYS-001",
                    Severity::Crit,
                    format!("Missing or invalid price for symbol '{symbol}'."),
                )
                .with_input("symbol", symbol.as_str())],
                evidence: vec![],
                kill_switch_triggered: false,
                eval_ms: None,
            };
        }
    };

    // --- Derived metrics ---
    let equity = portfolio.equity;
    let sod_equity = portfolio.start_of_day_equity;
    let peak_equity = portfolio.peak_equity;
    let current_qty = portfolio.position(symbol);
    let side_is_buy = matches!(intent.side, capgate_types::Side::Buy);

    let daily_return = (equity - sod_equity) / sod_equity;
    let drawdown = if peak_equity > 0.0 {
        (peak_equity - equity) / peak_equity
    } else {
        0.0
    };

    let new_qty = if side_is_buy {
        current_qty + intent.qty
    } else {
        current_qty - intent.qty
    };

    let new_position_value = (new_qty * price).abs();
    let new_position_pct = new_position_value / equity;

    // Position-value map spans every existing position symbol plus the
    // intent's symbol, for symbols with a known price; this one is then
    // overridden with the proposed post-trade value.
    let mut position_values: BTreeMap<&str, f64> = BTreeMap::new();
    for sym in portfolio.positions.keys() {
        if let Some(px) = market.prices.get(sym) {
            position_values.insert(sym.as_str(), portfolio.position(sym) * px);
        }
    }
    position_values.insert(symbol.as_str(), new_qty * price);

    let gross_exposure: f64 = position_values.values().map(|v| v.abs()).sum();
    let net_exposure: f64 = position_values.values().sum::<f64>().abs();
    let new_gross_x = if equity > 0.0 {
        gross_exposure / equity
    } else {
        0.0
    };
    let new_net_x = if equity > 0.0 {
        net_exposure / equity
    } else {
        0.0
    };

    let exposure_for_evidence = policy.resolve_exposure(symbol, &intent.strategy_id);
    let evidence = vec![
        Evidence::new(
            "daily_return",
            round6(daily_return),
            -policy.limits.loss.daily_loss_limit_pct,
        ),
        Evidence::new(
            "drawdown",
            round6(drawdown),
            policy.limits.loss.max_drawdown_pct,
        ),
        Evidence::new(
            "new_position_pct",
            round6(new_position_pct),
            exposure_for_evidence.max_position_pct,
        ),
        Evidence::new(
            "gross_exposure_x",
            round6(new_gross_x),
            policy.limits.exposure.max_gross_exposure_x,
        ),
        Evidence::new(
            "net_exposure_x",
            round6(new_net_x),
            exposure_for_evidence.max_net_exposure_x.unwrap_or(0.0),
        ),
    ];

    let mut violations: Vec<Violation> = Vec::new();
    let mut kill_switch_triggered = false;

    let deny = |violations: Vec<Violation>, evidence: Vec<Evidence>, ksw: bool| Decision {
        decision: Verdict::Deny,
        intent_id: intent.intent_id.clone(),
        modified_intent: None,
        violations,
        evidence,
        kill_switch_triggered: ksw,
        eval_ms: None,
    };

    // === 1. Kill switch ===
    if let Some(v) = check_kill_switch(execution.kill_switch_active) {
        violations.push(v);
        return deny(violations, evidence, false);
    }

    // === 2. Loss limits ===
    if let Some(v) = check_daily_loss(daily_return, policy.limits.loss.daily_loss_limit_pct) {
        violations.push(v);
    }
    if let Some(v) = check_drawdown(drawdown, policy.limits.loss.max_drawdown_pct) {
        violations.push(v);
        if policy
            .limits
            .kill_switch
            .trip_on_rules
            .iter()
            .any(|r| r == "LOSS-002")
        {
            kill_switch_triggered = true;
        }
    }
    if !violations.is_empty() {
        return deny(violations, evidence, kill_switch_triggered);
    }

    // === 3. Execution throttles ===
    let exec_limits = policy.resolve_execution(&intent.strategy_id);

    if let Some(v) = check_global_rate(execution.orders_last_60s_global, exec_limits) {
        violations.push(v);
    }
    let strategy_orders = execution
        .orders_last_60s_by_strategy
        .get(&intent.strategy_id)
        .copied()
        .unwrap_or(0);
    if let Some(v) = check_strategy_rate(strategy_orders, &intent.strategy_id, exec_limits) {
        violations.push(v);
    }
    if !violations.is_empty() {
        return deny(violations, evidence, false);
    }

    // === 4. Exposure checks ===
    let exp_limits = policy.resolve_exposure(symbol, &intent.strategy_id);

    let (v_pos, allowed_qty) = check_position_limit(
        new_position_pct,
        intent.qty,
        current_qty,
        price,
        equity,
        side_is_buy,
        exp_limits,
    );
    let v_gross = check_gross_exposure(new_gross_x, exp_limits.max_gross_exposure_x);
    let v_net = exp_limits
        .max_net_exposure_x
        .and_then(|limit| check_net_exposure(new_net_x, limit));

    if let Some(v_pos) = v_pos {
        violations.push(v_pos);
        if let Some(qty) = allowed_qty {
            if qty > 0.0 && v_gross.is_none() && v_net.is_none() {
                let modified = intent.with_qty(qty);
                return Decision {
                    decision: Verdict::Modify,
                    intent_id: intent.intent_id.clone(),
                    modified_intent: Some(modified),
                    violations,
                    evidence,
                    kill_switch_triggered: false,
                    eval_ms: None,
                };
            }
        }
        if let Some(v) = v_gross {
            violations.push(v);
        }
        if let Some(v) = v_net {
            violations.push(v);
        }
        return deny(violations, evidence, false);
    }

    if let Some(v) = v_gross {
        violations.push(v);
    }
    if let Some(v) = v_net {
        violations.push(v);
    }
    if !violations.is_empty() {
        return deny(violations, evidence, false);
    }

    // === 5. All clear ===
    Decision {
        decision: Verdict::Allow,
        intent_id: intent.intent_id.clone(),
        modified_intent: None,
        violations: vec![],
        evidence,
        kill_switch_triggered: false,
        eval_ms: None,
    }
}

/// Applies monitor-mode semantics: force ALLOW unless SYS-001 fired. MODIFY
/// decisions are preserved (not downgraded to ALLOW) per the policy owner's
/// resolution of the monitor-mode open question.
pub fn apply_monitor_mode(decision: Decision) -> Decision {
    if decision.decision != Verdict::Deny {
        return decision;
    }
    let is_sys001 = decision.violations.iter().any(|v| v.rule_id == "SYS-001");
    if is_sys001 {
        return decision;
    }
    Decision {
        decision: Verdict::Allow,
        ..decision
    }
}
