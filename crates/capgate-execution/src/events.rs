//! Execution event log: one compact JSON line per broker-facing action
//! (submit, fill, rejection). Distinct from the audit log — this is
//! operational telemetry, not the governance record, so lines are compact
//! but not canonicalized.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use capgate_types::instrument::Side;

pub const EVENT_ORDER_SUBMITTED: &str = "ORDER_SUBMITTED";
pub const EVENT_ORDER_FILLED: &str = "ORDER_FILLED";
pub const EVENT_ORDER_REJECTED: &str = "ORDER_REJECTED";

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEvent {
    pub ts: DateTime<Utc>,
    pub event: String,
    pub intent_id: String,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionEvent {
    pub fn submitted(
        intent_id: &str,
        order_id: &str,
        run_id: Option<Uuid>,
        policy_hash: Option<&str>,
        symbol: &str,
        side: Side,
        qty: f64,
        order_type: &str,
    ) -> Self {
        let mut extra = Map::new();
        extra.insert("symbol".to_string(), Value::String(symbol.to_string()));
        extra.insert("side".to_string(), serde_json::to_value(side).unwrap());
        extra.insert("qty".to_string(), serde_json::json!(qty));
        extra.insert(
            "order_type".to_string(),
            Value::String(order_type.to_string()),
        );
        ExecutionEvent {
            ts: Utc::now(),
            event: EVENT_ORDER_SUBMITTED.to_string(),
            intent_id: intent_id.to_string(),
            order_id: order_id.to_string(),
            run_id,
            policy_hash: policy_hash.map(str::to_string),
            extra,
        }
    }

    pub fn filled(
        intent_id: &str,
        order_id: &str,
        run_id: Option<Uuid>,
        policy_hash: Option<&str>,
        symbol: &str,
        side: Side,
        qty: f64,
        price: f64,
    ) -> Self {
        let mut extra = Map::new();
        extra.insert("symbol".to_string(), Value::String(symbol.to_string()));
        extra.insert("side".to_string(), serde_json::to_value(side).unwrap());
        extra.insert("qty".to_string(), serde_json::json!(qty));
        extra.insert("price".to_string(), serde_json::json!(price));
        ExecutionEvent {
            ts: Utc::now(),
            event: EVENT_ORDER_FILLED.to_string(),
            intent_id: intent_id.to_string(),
            order_id: order_id.to_string(),
            run_id,
            policy_hash: policy_hash.map(str::to_string),
            extra,
        }
    }

    pub fn rejected(
        intent_id: &str,
        run_id: Option<Uuid>,
        policy_hash: Option<&str>,
        symbol: &str,
    ) -> Self {
        let mut extra = Map::new();
        extra.insert("symbol".to_string(), Value::String(symbol.to_string()));
        ExecutionEvent {
            ts: Utc::now(),
            event: EVENT_ORDER_REJECTED.to_string(),
            intent_id: intent_id.to_string(),
            order_id: String::new(),
            run_id,
            policy_hash: policy_hash.map(str::to_string),
            extra,
        }
    }
}

/// Appends one compact JSON line to the execution event log at `path`.
pub fn write_execution_event(path: impl AsRef<Path>, event: &ExecutionEvent) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create execution log directory {parent:?}"))?;
        }
    }
    let line = serde_json::to_string(event).context("serialize execution event failed")?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open execution log {path:?}"))?;
    f.write_all(line.as_bytes())
        .context("write execution event failed")?;
    f.write_all(b"\n").context("write execution newline failed")?;
    Ok(())
}
