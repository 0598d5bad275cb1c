use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Enforce,
    Monitor,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Enforce
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionDefault {
    Deny,
    Allow,
}

impl Default for DecisionDefault {
    fn default() -> Self {
        DecisionDefault::Deny
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExposureLimits {
    pub max_position_pct: f64,
    pub max_gross_exposure_x: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_net_exposure_x: Option<f64>,
}

impl ExposureLimits {
    fn validate(&self) -> Result<(), String> {
        if !(self.max_position_pct > 0.0 && self.max_position_pct <= 1.0) {
            return Err("limits.exposure.max_position_pct must be in (0, 1]".to_string());
        }
        if !(self.max_gross_exposure_x > 0.0) {
            return Err("limits.exposure.max_gross_exposure_x must be > 0".to_string());
        }
        if let Some(x) = self.max_net_exposure_x {
            if !(x > 0.0) {
                return Err("limits.exposure.max_net_exposure_x must be > 0".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LossLimits {
    pub daily_loss_limit_pct: f64,
    pub max_drawdown_pct: f64,
}

impl LossLimits {
    fn validate(&self) -> Result<(), String> {
        if !(self.daily_loss_limit_pct > 0.0 && self.daily_loss_limit_pct <= 1.0) {
            return Err("limits.loss.daily_loss_limit_pct must be in (0, 1]".to_string());
        }
        if !(self.max_drawdown_pct > 0.0 && self.max_drawdown_pct <= 1.0) {
            return Err("limits.loss.max_drawdown_pct must be in (0, 1]".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionLimits {
    pub max_orders_per_minute_global: u32,
    pub max_orders_per_minute_by_strategy: u32,
}

impl ExecutionLimits {
    fn validate(&self) -> Result<(), String> {
        if !(1..=10_000).contains(&self.max_orders_per_minute_global) {
            return Err(
                "limits.execution.max_orders_per_minute_global must be in [1, 10000]".to_string(),
            );
        }
        if !(1..=10_000).contains(&self.max_orders_per_minute_by_strategy) {
            return Err(
                "limits.execution.max_orders_per_minute_by_strategy must be in [1, 10000]"
                    .to_string(),
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KillSwitchConfig {
    #[serde(default)]
    pub trip_on_rules: Vec<String>,
    pub trip_after_n_violations: u32,
    pub violation_window_seconds: u64,
}

impl KillSwitchConfig {
    const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 3600;

    fn validate(&self) -> Result<(), String> {
        if !(1..=10_000).contains(&self.trip_after_n_violations) {
            return Err(
                "limits.kill_switch.trip_after_n_violations must be in [1, 10000]".to_string(),
            );
        }
        if self.violation_window_seconds == 0
            || self.violation_window_seconds > Self::MAX_WINDOW_SECONDS
        {
            return Err(format!(
                "limits.kill_switch.violation_window_seconds must be in [1, {}]",
                Self::MAX_WINDOW_SECONDS
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub decision: DecisionDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    pub exposure: ExposureLimits,
    pub loss: LossLimits,
    pub execution: ExecutionLimits,
    pub kill_switch: KillSwitchConfig,
}

impl Limits {
    fn validate(&self) -> Result<(), String> {
        self.exposure.validate()?;
        self.loss.validate()?;
        self.execution.validate()?;
        self.kill_switch.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<ExposureLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<LossLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionLimits>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<ExposureLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<LossLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionLimits>,
}

fn validate_override(
    exposure: &Option<ExposureLimits>,
    loss: &Option<LossLimits>,
    execution: &Option<ExecutionLimits>,
) -> Result<(), String> {
    if let Some(e) = exposure {
        e.validate()?;
    }
    if let Some(l) = loss {
        l.validate()?;
    }
    if let Some(x) = execution {
        x.validate()?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Overrides {
    #[serde(default)]
    pub symbols: BTreeMap<String, SymbolOverride>,
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyOverride>,
}

impl Overrides {
    fn validate(&self) -> Result<(), String> {
        for (sym, o) in &self.symbols {
            validate_override(&o.exposure, &o.loss, &o.execution)
                .map_err(|e| format!("overrides.symbols.{sym}: {e}"))?;
        }
        for (sid, o) in &self.strategies {
            validate_override(&o.exposure, &o.loss, &o.execution)
                .map_err(|e| format!("overrides.strategies.{sid}: {e}"))?;
        }
        Ok(())
    }
}

fn default_version() -> String {
    "0.1".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Policy DSL v0.1 — strict, deterministic, fail-closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapitalPolicy {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub defaults: Defaults,
    pub limits: Limits,
    #[serde(default)]
    pub overrides: Overrides,
}

impl CapitalPolicy {
    /// Bounds and schema checks that serde's derive can't express. Mutates
    /// `timezone` to the canonical "UTC" spelling on success, matching the
    /// source policy model's validator.
    pub fn validate_and_normalize(&mut self) -> Result<(), String> {
        if self.version != "0.1" {
            return Err(format!(
                "policy version must be \"0.1\", got \"{}\"",
                self.version
            ));
        }
        if self.timezone.to_uppercase() != "UTC" {
            return Err("v0.1 requires timezone: UTC".to_string());
        }
        self.timezone = "UTC".to_string();
        self.limits.validate()?;
        self.overrides.validate()?;
        Ok(())
    }

    /// Effective exposure limits after applying overrides.
    /// Precedence: symbol > strategy > defaults.
    pub fn resolve_exposure(&self, symbol: &str, strategy_id: &str) -> &ExposureLimits {
        if let Some(o) = self.overrides.symbols.get(symbol) {
            if let Some(e) = &o.exposure {
                return e;
            }
        }
        if let Some(o) = self.overrides.strategies.get(strategy_id) {
            if let Some(e) = &o.exposure {
                return e;
            }
        }
        &self.limits.exposure
    }

    /// Effective execution limits after applying overrides.
    /// Precedence: strategy > defaults. (No symbol-level execution override.)
    pub fn resolve_execution(&self, strategy_id: &str) -> &ExecutionLimits {
        if let Some(o) = self.overrides.strategies.get(strategy_id) {
            if let Some(x) = &o.execution {
                return x;
            }
        }
        &self.limits.execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_policy() -> CapitalPolicy {
        CapitalPolicy {
            version: "0.1".to_string(),
            timezone: "utc".to_string(),
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

    #[test]
    fn normalizes_lowercase_timezone() {
        let mut p = base_policy();
        p.validate_and_normalize().unwrap();
        assert_eq!(p.timezone, "UTC");
    }

    #[test]
    fn rejects_non_utc_timezone() {
        let mut p = base_policy();
        p.timezone = "EST".to_string();
        assert!(p.validate_and_normalize().is_err());
    }

    #[test]
    fn rejects_out_of_range_max_position_pct() {
        let mut p = base_policy();
        p.limits.exposure.max_position_pct = 1.5;
        assert!(p.validate_and_normalize().is_err());
    }

    #[test]
    fn symbol_override_beats_strategy_and_defaults() {
        let mut p = base_policy();
        p.overrides.strategies.insert(
            "strat-a".to_string(),
            StrategyOverride {
                exposure: Some(ExposureLimits {
                    max_position_pct: 0.20,
                    max_gross_exposure_x: 3.0,
                    max_net_exposure_x: None,
                }),
                loss: None,
                execution: None,
            },
        );
        p.overrides.symbols.insert(
            "AAPL".to_string(),
            SymbolOverride {
                exposure: Some(ExposureLimits {
                    max_position_pct: 0.30,
                    max_gross_exposure_x: 4.0,
                    max_net_exposure_x: None,
                }),
                loss: None,
                execution: None,
            },
        );

        let resolved = p.resolve_exposure("AAPL", "strat-a");
        assert_eq!(resolved.max_position_pct, 0.30);

        let resolved = p.resolve_exposure("TSLA", "strat-a");
        assert_eq!(resolved.max_position_pct, 0.20);

        let resolved = p.resolve_exposure("TSLA", "strat-b");
        assert_eq!(resolved.max_position_pct, 0.10);
    }

    #[test]
    fn deserialize_rejects_unknown_top_level_key() {
        let yaml = r#"
version: "0.1"
timezone: "UTC"
bogus_key: true
limits:
  exposure: { max_position_pct: 0.1, max_gross_exposure_x: 2.0 }
  loss: { daily_loss_limit_pct: 0.02, max_drawdown_pct: 0.05 }
  execution: { max_orders_per_minute_global: 20, max_orders_per_minute_by_strategy: 10 }
  kill_switch: { trip_after_n_violations: 3, violation_window_seconds: 300 }
"#;
        let result: Result<CapitalPolicy, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }
}
