//! Shared runtime state for policygate-daemon.
//!
//! Everything the intake handler touches — portfolio, market override,
//! execution counters, the broker, both log writers — lives behind one
//! `tokio::sync::Mutex`, mirroring the single `threading.Lock` the original
//! HTTP server uses to serialise evaluate + state mutation + broker submit.
//! A slow broker call blocks other requests; acceptable for a v0.1 gate.

use std::path::PathBuf;
use std::sync::Arc;

use capgate_audit::AuditLog;
use capgate_broker_sim::SimulatedBroker;
use capgate_engine::PolicyEngine;
use capgate_types::{ExecutionState, MarketSnapshot, PortfolioState};
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct ServerState {
    pub engine: PolicyEngine,
    pub portfolio: PortfolioState,
    pub market: MarketSnapshot,
    pub execution: ExecutionState,
    pub broker: SimulatedBroker,
    pub run_id: Uuid,
    pub audit_log: Option<AuditLog>,
    pub exec_log_path: Option<PathBuf>,
}

/// Handle shared across every Axum handler. `token` never changes after
/// startup, so it is read without taking the lock — the same way the
/// original server reads `_ServerState.token` outside its own lock.
pub struct AppState {
    pub token: Option<String>,
    pub inner: Mutex<ServerState>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(state: ServerState, token: Option<String>) -> SharedState {
        Arc::new(AppState {
            token,
            inner: Mutex::new(state),
        })
    }
}
