//! Loads and validates the declarative capital policy document.
//!
//! The policy hash is the SHA-256 of the raw source bytes exactly as read —
//! not a canonicalised re-serialisation — so the stamped hash in every audit
//! record is reproducible from the file on disk with nothing more than
//! `sha256sum`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use capgate_types::CapitalPolicy;
use sha2::{Digest, Sha256};

/// A policy document plus its source text and content hash.
#[derive(Debug)]
pub struct LoadedPolicy {
    pub policy: CapitalPolicy,
    pub policy_hash: String,
    pub raw_text: String,
}

/// SHA-256 hex digest of the raw policy source bytes.
pub fn policy_hash(raw_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Load, parse, and validate a capital policy YAML document.
pub fn load(path: impl AsRef<Path>) -> Result<LoadedPolicy> {
    let path = path.as_ref();
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("reading policy file {}", path.display()))?;
    load_str(&raw_text).with_context(|| format!("loading policy {}", path.display()))
}

/// Load a policy from an in-memory string. Used directly by tests and by
/// `load` above once the file has been read.
pub fn load_str(raw_text: &str) -> Result<LoadedPolicy> {
    let mut policy: CapitalPolicy =
        serde_yaml::from_str(raw_text).context("parsing policy YAML")?;

    policy
        .validate_and_normalize()
        .map_err(|msg| anyhow::anyhow!("policy validation failed: {msg}"))?;

    let policy_hash = policy_hash(raw_text);

    Ok(LoadedPolicy {
        policy,
        policy_hash,
        raw_text: raw_text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML: &str = r#"
version: "0.1"
timezone: "UTC"
defaults:
  mode: enforce
  decision: deny
limits:
  exposure:
    max_position_pct: 0.10
    max_gross_exposure_x: 2.0
  loss:
    daily_loss_limit_pct: 0.02
    max_drawdown_pct: 0.05
  execution:
    max_orders_per_minute_global: 20
    max_orders_per_minute_by_strategy: 10
  kill_switch:
    trip_on_rules: ["LOSS-002"]
    trip_after_n_violations: 3
    violation_window_seconds: 300
"#;

    #[test]
    fn hash_is_over_raw_bytes_not_canonical_form() {
        let h1 = policy_hash(VALID_YAML);
        let h2 = policy_hash(VALID_YAML);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);

        // Whitespace-only reformatting changes the raw bytes, hence the hash —
        // unlike a canonicalised-JSON hash, which would be insensitive to it.
        let reformatted = format!("{VALID_YAML}\n");
        assert_ne!(h1, policy_hash(&reformatted));
    }

    #[test]
    fn loads_valid_policy_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        fs::write(&path, VALID_YAML).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.policy.timezone, "UTC");
        assert_eq!(loaded.policy_hash, policy_hash(VALID_YAML));
    }

    #[test]
    fn rejects_unknown_field() {
        let bad = VALID_YAML.replace("version:", "bogus_key: 1\nversion:");
        let err = load_str(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("parsing policy YAML"));
    }

    #[test]
    fn rejects_non_utc_timezone() {
        let bad = VALID_YAML.replace("UTC", "America/New_York");
        let err = load_str(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("UTC"));
    }

    #[test]
    fn lowercase_utc_normalizes() {
        let lowered = VALID_YAML.replace("\"UTC\"", "\"utc\"");
        let loaded = load_str(&lowered).unwrap();
        assert_eq!(loaded.policy.timezone, "UTC");
    }
}
