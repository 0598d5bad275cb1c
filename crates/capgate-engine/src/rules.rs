//! Individual rule functions.
//!
//! Each rule receives its scalar evaluation context and returns a Violation
//! if triggered, or None if it passes. Rules are pure — no side effects, no
//! wall-clock reads.

use capgate_types::policy::{ExecutionLimits, ExposureLimits};
use capgate_types::{Severity, Violation};

pub fn check_kill_switch(kill_switch_active: bool) -> Option<Violation> {
    if !kill_switch_active {
        return None;
    }
    Some(
        Violation::new(
            "KILL-001",
            Severity::Crit,
            "Kill switch is active — all orders denied.",
        )
        .with_input("kill_switch_active", true),
    )
}

/// LOSS-001: daily loss limit breached.
pub fn check_daily_loss(daily_return: f64, limit_pct: f64) -> Option<Violation> {
    if daily_return > -limit_pct {
        return None;
    }
    Some(
        Violation::new(
            "LOSS-001",
            Severity::High,
            format!("Daily loss {daily_return:.4} breaches limit -{limit_pct:.4}."),
        )
        .with_input("daily_loss_limit_pct", limit_pct)
        .with_computed("daily_return", daily_return),
    )
}

/// LOSS-002: max drawdown breached (also conditionally trips the kill switch).
pub fn check_drawdown(drawdown: f64, limit_pct: f64) -> Option<Violation> {
    if drawdown < limit_pct {
        return None;
    }
    Some(
        Violation::new(
            "LOSS-002",
            Severity::Crit,
            format!("Drawdown {drawdown:.4} breaches limit {limit_pct:.4}."),
        )
        .with_input("max_drawdown_pct", limit_pct)
        .with_computed("drawdown", drawdown),
    )
}

/// EXEC-001: global order rate limit breached.
pub fn check_global_rate(orders_last_60s: u64, limits: &ExecutionLimits) -> Option<Violation> {
    if orders_last_60s < limits.max_orders_per_minute_global as u64 {
        return None;
    }
    Some(
        Violation::new(
            "EXEC-001",
            Severity::High,
            format!(
                "Global rate {orders_last_60s} orders/min exceeds limit {}.",
                limits.max_orders_per_minute_global
            ),
        )
        .with_input(
            "max_orders_per_minute_global",
            limits.max_orders_per_minute_global,
        )
        .with_computed("orders_last_60s_global", orders_last_60s),
    )
}

/// EXEC-002: per-strategy order rate limit breached.
pub fn check_strategy_rate(
    orders_last_60s: u64,
    strategy_id: &str,
    limits: &ExecutionLimits,
) -> Option<Violation> {
    if orders_last_60s < limits.max_orders_per_minute_by_strategy as u64 {
        return None;
    }
    Some(
        Violation::new(
            "EXEC-002",
            Severity::High,
            format!(
                "Strategy '{strategy_id}' rate {orders_last_60s} orders/min exceeds limit {}.",
                limits.max_orders_per_minute_by_strategy
            ),
        )
        .with_input("strategy_id", strategy_id)
        .with_input(
            "max_orders_per_minute_by_strategy",
            limits.max_orders_per_minute_by_strategy,
        )
        .with_computed("orders_last_60s_strategy", orders_last_60s),
    )
}

/// EXP-001: per-symbol position limit. Returns the violation (if any) and the
/// largest signed quantity delta that would keep the post-trade position at
/// or below the cap, clamped to >= 0.
pub fn check_position_limit(
    new_position_pct: f64,
    requested_qty: f64,
    current_qty: f64,
    price: f64,
    equity: f64,
    side_is_buy: bool,
    limits: &ExposureLimits,
) -> (Option<Violation>, Option<f64>) {
    if new_position_pct <= limits.max_position_pct {
        return (None, None);
    }

    let max_value = limits.max_position_pct * equity;
    let allowed_delta = if side_is_buy {
        let max_new_qty = max_value / price;
        max_new_qty - current_qty
    } else {
        let max_new_qty = -(max_value / price);
        current_qty - (-max_new_qty)
    };
    let allowed_delta = allowed_delta.max(0.0);
    let allowed_delta = (allowed_delta * 1e8).round() / 1e8;

    let violation = Violation::new(
        "EXP-001",
        Severity::High,
        format!(
            "Position {new_position_pct:.4} breaches limit {}.",
            limits.max_position_pct
        ),
    )
    .with_input("max_position_pct", limits.max_position_pct)
    .with_computed("new_position_pct", new_position_pct)
    .with_computed("requested_qty", requested_qty)
    .with_computed("allowed_qty", allowed_delta);

    (Some(violation), Some(allowed_delta))
}

/// EXP-002: gross exposure limit breached.
pub fn check_gross_exposure(new_gross_x: f64, limit_x: f64) -> Option<Violation> {
    if new_gross_x <= limit_x {
        return None;
    }
    Some(
        Violation::new(
            "EXP-002",
            Severity::High,
            format!("Gross exposure {new_gross_x:.4}x breaches limit {limit_x:.4}x."),
        )
        .with_input("max_gross_exposure_x", limit_x)
        .with_computed("gross_exposure_x", new_gross_x),
    )
}

/// EXP-003: net exposure limit breached.
pub fn check_net_exposure(new_net_x: f64, limit_x: f64) -> Option<Violation> {
    if new_net_x <= limit_x {
        return None;
    }
    Some(
        Violation::new(
            "EXP-003",
            Severity::High,
            format!("Net exposure {new_net_x:.4}x breaches limit {limit_x:.4}x."),
        )
        .with_input("max_net_exposure_x", limit_x)
        .with_computed("net_exposure_x", new_net_x),
    )
}
