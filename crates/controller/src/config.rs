//! Controller and session configuration.

use std::path::Path;

use parley_core::Error;
use parley_planner::ProviderConfig;
use serde::{Deserialize, Serialize};

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Model used when the applied configuration names none.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Counterpart identity placed in every harness context.
    #[serde(default = "default_counterpart_id")]
    pub counterpart_id: String,

    /// Capacity of the store's transition channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            counterpart_id: default_counterpart_id(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ControllerConfig {
    /// Set the default model.
    #[must_use]
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the counterpart id.
    #[must_use]
    pub fn counterpart_id(mut self, id: impl Into<String>) -> Self {
        self.counterpart_id = id.into();
        self
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for blank identifiers or a zero capacity.
    pub fn validate(&self) -> parley_core::Result<()> {
        if self.default_model.trim().is_empty() {
            return Err(Error::invalid_config("default_model must not be blank"));
        }
        if self.counterpart_id.trim().is_empty() {
            return Err(Error::invalid_config("counterpart_id must not be blank"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::invalid_config(
                "channel_capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

impl ParleyConfig {
    /// Load configuration from a file. `.json` files are parsed as JSON,
    /// anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or when the
    /// result fails validation.
    pub fn from_file(path: &Path) -> parley_core::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| Error::json_parse_failed(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| Error::toml_parse_failed(e.to_string()))?
        };

        config.controller.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `PARLEY_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(model) = lookup("PARLEY_DEFAULT_MODEL").filter(|m| !m.trim().is_empty()) {
            self.controller.default_model = model;
        }

        if let Some(id) = lookup("PARLEY_COUNTERPART_ID").filter(|id| !id.trim().is_empty()) {
            self.controller.counterpart_id = id;
        }

        if let Some(capacity) = lookup("PARLEY_CHANNEL_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(parsed) if parsed > 0 => self.controller.channel_capacity = parsed,
                _ => tracing::warn!(
                    value = %capacity,
                    "Ignoring invalid PARLEY_CHANNEL_CAPACITY"
                ),
            }
        }

        self
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns `TomlSerializeFailed` if serialization fails.
    pub fn to_toml(&self) -> parley_core::Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::toml_serialize_failed(e.to_string()))
    }
}

fn default_model() -> String {
    "chitchat-small".to_string()
}

fn default_counterpart_id() -> String {
    "counterpart".to_string()
}

const fn default_channel_capacity() -> usize {
    parley_journal::store::DEFAULT_CHANNEL_CAPACITY
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
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ParleyConfig::default();
        assert_eq!(config.controller.default_model, "chitchat-small");
        assert_eq!(config.controller.counterpart_id, "counterpart");
        assert_eq!(config.controller.channel_capacity, 1024);
        assert!(config.controller.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[controller]\ndefault_model = \"big\"\n\n[provider]\nreplies = [\"hi\"]"
        )
        .unwrap();

        let config = ParleyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.controller.default_model, "big");
        assert_eq!(config.controller.counterpart_id, "counterpart");
        assert_eq!(config.provider.replies, vec!["hi".to_string()]);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"controller": {{"counterpart_id": "bob"}}}}"#).unwrap();

        let config = ParleyConfig::from_file(file.path()).unwrap();
        assert_eq!(config.controller.counterpart_id, "bob");
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[controller]\nchannel_capacity = 0").unwrap();

        let err = ParleyConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = ParleyConfig::from_file(Path::new("/nonexistent/parley.toml")).unwrap_err();
        assert!(matches!(err, Error::FileReadFailed { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PARLEY_DEFAULT_MODEL", "env-model"),
            ("PARLEY_CHANNEL_CAPACITY", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ParleyConfig::default()
            .with_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.controller.default_model, "env-model");
        assert_eq!(config.controller.channel_capacity, 1024);
    }

    #[test]
    fn test_to_toml_round_trips_controller_section() {
        let config = ParleyConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: ParleyConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
