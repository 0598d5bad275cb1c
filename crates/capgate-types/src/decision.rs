use serde::{Deserialize, Serialize};

use crate::intent::OrderIntent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Low,
    Med,
    High,
    Crit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Deny,
    Modify,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Violation {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub computed: serde_json::Map<String, serde_json::Value>,
}

impl Violation {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Violation {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            inputs: serde_json::Map::new(),
            computed: serde_json::Map::new(),
        }
    }

    pub fn with_input(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(key.to_string(), value.into());
        self
    }

    pub fn with_computed(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.computed.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Evidence {
    pub metric: String,
    pub value: f64,
    pub limit: f64,
}

impl Evidence {
    pub fn new(metric: impl Into<String>, value: f64, limit: f64) -> Self {
        Evidence {
            metric: metric.into(),
            value: round6(value),
            limit: round6(limit),
        }
    }
}

pub fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Decision {
    pub decision: Verdict,
    pub intent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_intent: Option<OrderIntent>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub kill_switch_triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_ms: Option<f64>,
}

impl Decision {
    pub fn is_routable(&self) -> bool {
        matches!(self.decision, Verdict::Allow | Verdict::Modify)
    }
}
