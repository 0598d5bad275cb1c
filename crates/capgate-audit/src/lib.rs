//! capgate-audit
//!
//! Append-only audit trail and replay. Every evaluated intent is written as
//! one canonical JSON line before any broker action is taken on its verdict;
//! the log is the system of record for "what did the gate decide, and why,"
//! and the input to replay.
//!
//! Lines are canonicalized by recursively sorting object keys and emitting
//! compact JSON, so the same event always serializes to the same bytes
//! regardless of field order.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use capgate_types::{CapitalPolicy, Decision, ExecutionState, MarketSnapshot, OrderIntent, PortfolioState};

/// One evaluated intent, captured with everything needed to replay it:
/// the inputs the evaluator saw and the decision it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditEvent {
    pub event_id: Uuid,
    /// Correlates events from the same stream-runner invocation. Absent for
    /// one-off `eval` calls outside a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub engine_version: String,
    pub policy_hash: String,
    pub intent: OrderIntent,
    pub portfolio_state: PortfolioState,
    pub market_snapshot: MarketSnapshot,
    pub execution_state: ExecutionState,
    pub decision: Decision,
}

/// The running binary's own version, stamped into every audit event so a
/// replay tool can tell which engine produced a decision.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the audit event for one evaluated intent. Pure aside from the
/// fresh `event_id` and `timestamp`, which the audit trail owns, not the
/// evaluator.
#[allow(clippy::too_many_arguments)]
pub fn build_audit_event(
    intent: &OrderIntent,
    portfolio: &PortfolioState,
    market: &MarketSnapshot,
    execution: &ExecutionState,
    decision: &Decision,
    policy_hash: &str,
    run_id: Option<Uuid>,
) -> AuditEvent {
    AuditEvent {
        event_id: Uuid::new_v4(),
        run_id,
        timestamp: Utc::now(),
        engine_version: ENGINE_VERSION.to_string(),
        policy_hash: policy_hash.to_string(),
        intent: intent.clone(),
        portfolio_state: portfolio.clone(),
        market_snapshot: market.clone(),
        execution_state: execution.clone(),
        decision: decision.clone(),
    }
}

/// Appends one canonical JSON line to the audit log at `path`, creating the
/// file and its parent directories if needed. Each call opens, writes, and
/// closes the file — no long-lived handle, no caller-visible buffering, so a
/// crash mid-run never loses anything but the in-flight event.
pub fn write_audit_event(path: impl AsRef<Path>, event: &AuditEvent) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create audit log directory {parent:?}"))?;
        }
    }
    let line = canonical_json_line(event)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {path:?}"))?;
    f.write_all(line.as_bytes())
        .context("write audit event failed")?;
    f.write_all(b"\n").context("write audit newline failed")?;
    Ok(())
}

/// Reads every event from an audit log, in file order. A blank line is
/// skipped; anything else that fails to parse is an error, since audit logs
/// are append-only and never hand-edited.
pub fn read_audit_events(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>> {
    let path = path.as_ref();
    let f = fs::File::open(path).with_context(|| format!("open audit log {path:?}"))?;
    let reader = BufReader::new(f);
    let mut events = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of {path:?}", i + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit event at line {} of {path:?}", i + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// A handle on a single audit log file. Thin wrapper over
/// [`write_audit_event`]/[`read_audit_events`] for callers that want to hold
/// a path once (the stream runner) rather than thread it through every call.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AuditLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        write_audit_event(&self.path, event)
    }

    pub fn read_all(&self) -> Result<Vec<AuditEvent>> {
        read_audit_events(&self.path)
    }
}

/// Re-evaluates the intent captured in `event` against `policy` and returns
/// `(original_decision, replayed_decision)`. The caller compares the pair
/// with [`decisions_match`]; `eval_ms` is expected to differ and is not part
/// of that comparison.
pub fn replay_event(event: &AuditEvent, policy: &CapitalPolicy) -> (Decision, Decision) {
    let mut replayed = capgate_engine::evaluate(
        &event.intent,
        policy,
        &event.portfolio_state,
        &event.market_snapshot,
        &event.execution_state,
    );
    if matches!(policy.defaults.mode, capgate_types::Mode::Monitor) {
        replayed = capgate_engine::apply_monitor_mode(replayed);
    }
    (event.decision.clone(), replayed)
}

/// Logical equality for replay: the verdict, which intent it applies to, the
/// full violation list in order, whether the kill switch tripped, and the
/// modified intent (if any) must match exactly. `eval_ms` and `evidence` are
/// excluded — both are measurement/diagnostic detail, not the decision
/// itself.
pub fn decisions_match(a: &Decision, b: &Decision) -> bool {
    a.decision == b.decision
        && a.intent_id == b.intent_id
        && a.violations == b.violations
        && a.kill_switch_triggered == b.kill_switch_triggered
        && a.modified_intent == b.modified_intent
}

fn canonical_json_line<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value).context("serialize audit event failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("stringify audit event failed")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
