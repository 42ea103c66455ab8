//! Harness configuration types.

use parley_journal::AppliedConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Planner-internal settings derived from the user's applied configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HarnessConfig(Map<String, Value>);

impl HarnessConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Look up a setting.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether no settings are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of settings.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Catalog-level mapping from applied configuration to harness configuration.
pub type ConfigMapper = fn(Option<&AppliedConfig>) -> Result<HarnessConfig>;

/// Who the planner is talking to and with which model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessContext {
    pub counterpart_id: String,
    pub model: String,
}

impl HarnessContext {
    /// Create a context.
    pub fn new(counterpart_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            counterpart_id: counterpart_id.into(),
            model: model.into(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn should_build_config_fluently() {
        let config = HarnessConfig::new().with("temperature", Value::from(0.3));
        assert_eq!(config.len(), 1);
        assert_eq!(config.get("temperature"), Some(&Value::from(0.3)));
        assert!(HarnessConfig::new().is_empty());
    }
}
