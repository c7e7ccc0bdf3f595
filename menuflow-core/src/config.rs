//! Compiler configuration.
//!
//! Naming prefixes used by the dataset namespace and the switches the
//! compiler honours. Both structs deserialize from partial JSON; missing
//! fields take their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::naming::validate_name;

/// Prefixes and lengths used to derive node names and keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Prefix of step names ("Step" gives "Step1", "Step2", ...).
    pub step_prefix: String,
    /// Prefix of filter node names.
    pub filter_prefix: String,
    /// Prefix of input maker node names.
    pub input_maker_prefix: String,
    /// Prefix of combo hypo node names.
    pub combo_prefix: String,
    /// Name of the summary node, also the prefix of terminal keys.
    pub summary_name: String,
    /// Number of hex characters of the input digest in filter names.
    pub digest_len: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            step_prefix: "Step".to_string(),
            filter_prefix: "Filter".to_string(),
            input_maker_prefix: "IM".to_string(),
            combo_prefix: "ComboHypo".to_string(),
            summary_name: "HLTNav_Summary".to_string(),
            digest_len: 8,
        }
    }
}

impl NamingConfig {
    fn validate(&self) -> Result<()> {
        let prefixes = [
            ("step_prefix", &self.step_prefix),
            ("filter_prefix", &self.filter_prefix),
            ("input_maker_prefix", &self.input_maker_prefix),
            ("combo_prefix", &self.combo_prefix),
            ("summary_name", &self.summary_name),
        ];
        for (field, value) in prefixes {
            if validate_name(value).is_err() {
                return Err(Error::Config(format!(
                    "{} must be a valid key name, got '{}'",
                    field, value
                )));
            }
        }
        // sha256 gives 64 hex characters
        if self.digest_len == 0 || self.digest_len > 64 {
            return Err(Error::Config(format!(
                "digest_len must be in 1..=64, got {}",
                self.digest_len
            )));
        }
        Ok(())
    }
}

/// Configuration for a decision-flow compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Naming scheme for derived nodes and keys.
    pub naming: NamingConfig,
    /// Verify during linking that every key produced inside the graph is
    /// produced in an earlier layer than any of its consumers.
    pub validate_data_flow: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            naming: NamingConfig::default(),
            validate_data_flow: true,
        }
    }
}

impl CompilerConfig {
    /// Parse a configuration from JSON; omitted fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check that the configuration can produce valid names.
    pub fn validate(&self) -> Result<()> {
        self.naming.validate()
    }

    /// Set the naming scheme.
    pub fn with_naming(mut self, naming: NamingConfig) -> Self {
        self.naming = naming;
        self
    }

    /// Set the summary node name.
    pub fn with_summary_name(mut self, name: impl Into<String>) -> Self {
        self.naming.summary_name = name.into();
        self
    }

    /// Set the filter-name digest length.
    pub fn with_digest_len(mut self, len: usize) -> Self {
        self.naming.digest_len = len;
        self
    }

    /// Enable or disable data-flow order validation.
    pub fn with_data_flow_validation(mut self, enabled: bool) -> Self {
        self.validate_data_flow = enabled;
        self
    }
}
