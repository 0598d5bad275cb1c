//! Wire types for the HTTP intake surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// POST /intent request body: `{"intent": {...}, "market_snapshot": {...}?}`.
#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    pub intent: Value,
    #[serde(default)]
    pub market_snapshot: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: None,
        }
    }

    pub fn with_message(error: &str, message: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.to_string(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub run_id: Uuid,
    pub policy_hash: String,
    pub positions_count: usize,
    pub kill_switch_active: bool,
    pub orders_last_60s_global: u64,
}
