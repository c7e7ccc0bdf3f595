//! Dataset namespace: keys and derived names.
//!
//! Every input and output of every node is a [`Key`]. Dependency and reuse
//! relationships are inferred purely from key equality, so all derived names
//! go through [`DatasetNamespace`] and nowhere else.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::config::NamingConfig;
use crate::error::{Error, Result};

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.:\-]*$").expect("valid name regex"));

/// Check that a name can be embedded in keys.
pub fn validate_name(name: &str) -> Result<()> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidKey(name.to_string()))
    }
}

/// Identifier of one dataset instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Create a validated key.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    /// Build a key from parts that are already valid names.
    pub(crate) fn derived(name: String) -> Self {
        debug_assert!(NAME_PATTERN.is_match(&name), "derived key '{}'", name);
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Key {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Order-independent set of keys.
pub type KeySet = BTreeSet<Key>;

/// Derives every node name and key the compiler emits.
#[derive(Debug, Clone, Default)]
pub struct DatasetNamespace {
    config: NamingConfig,
}

impl DatasetNamespace {
    pub fn new(config: NamingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NamingConfig {
        &self.config
    }

    /// Label of a 0-based step index ("Step1" for index 0).
    pub fn step_label(&self, index: usize) -> String {
        format!("{}{}", self.config.step_prefix, index + 1)
    }

    /// Filter name for a step fed by the given inputs.
    ///
    /// Equal step names with equal input sets give equal filter names,
    /// regardless of the order the inputs were supplied in.
    pub fn filter_name(&self, index: usize, step_name: &str, inputs: &KeySet) -> String {
        format!(
            "{}_{}_{}_{}",
            self.config.filter_prefix,
            self.step_label(index),
            step_name,
            self.input_digest(inputs)
        )
    }

    /// Output key a filter writes for one of its inputs.
    pub fn filter_output(&self, filter: &str, input: &Key) -> Key {
        Key::derived(format!("{}__{}", filter, input))
    }

    pub fn input_maker_name(&self, sequence: &str) -> String {
        format!("{}_{}", self.config.input_maker_prefix, sequence)
    }

    /// Decision key an input maker writes.
    pub fn input_maker_output(&self, sequence: &str) -> Key {
        Key::derived(format!("{}__out", self.input_maker_name(sequence)))
    }

    /// Decision key a hypo node writes.
    pub fn hypo_output(&self, hypo: &str) -> Key {
        Key::derived(format!("{}__out", hypo))
    }

    pub fn combo_name(&self, index: usize, step_name: &str) -> String {
        format!(
            "{}_{}_{}",
            self.config.combo_prefix,
            self.step_label(index),
            step_name
        )
    }

    /// Decision key a combo node writes for one leg.
    pub fn combo_output(&self, combo: &str, leg: usize) -> Key {
        Key::derived(format!("{}__leg{:03}", combo, leg))
    }

    pub fn summary_name(&self) -> &str {
        &self.config.summary_name
    }

    /// Terminal accept/reject key of a chain.
    pub fn terminal_key(&self, chain: &str) -> Key {
        Key::derived(format!("{}__{}", self.config.summary_name, chain))
    }

    fn input_digest(&self, inputs: &KeySet) -> String {
        let mut hasher = Sha256::new();
        for key in inputs {
            hasher.update(key.as_str().as_bytes());
            hasher.update(b"\n");
        }
        let hash = format!("{:x}", hasher.finalize());
        hash[..self.config.digest_len.min(hash.len())].to_string()
    }
}
