//! Error types for menuflow-core.

use thiserror::Error;

/// Result type alias using menuflow-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while defining, compiling or emulating a menu.
///
/// Every compile-time variant is fatal for the whole menu: the compiler
/// never returns a partially built graph.
#[derive(Error, Debug)]
pub enum Error {
    /// Two definitions share a name but not a shape
    #[error("Configuration conflict on '{name}': {reason}")]
    ConfigurationConflict { name: String, reason: String },

    /// A filter would be created without any input key
    #[error("Filter '{filter}' has no input keys (chain '{chain}')")]
    UnderspecifiedFilter { filter: String, chain: String },

    /// A step requires more legs than it offers
    #[error("Step '{step}' requires multiplicity {required} but offers {legs} leg(s)")]
    MultiplicityOverflow {
        step: String,
        required: usize,
        legs: usize,
    },

    /// A chain references a sequence defined nowhere in the menu
    #[error("Chain '{chain}' step '{step}' references unknown sequence '{sequence}'")]
    OrphanChain {
        chain: String,
        step: String,
        sequence: String,
    },

    /// A step's leg count disagrees with the chain's seed count
    #[error("Chain '{chain}' step '{step}' has {legs} leg(s) but {seeds} seed(s)")]
    LegCountMismatch {
        chain: String,
        step: String,
        legs: usize,
        seeds: usize,
    },

    /// A dataset key failed validation
    #[error("Invalid key '{0}'")]
    InvalidKey(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event emulation error
    #[error("Emulation error: {0}")]
    Emulation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File access error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration conflict error.
    pub fn conflict(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationConflict {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an underspecified filter error.
    pub fn underspecified_filter(filter: impl Into<String>, chain: impl Into<String>) -> Self {
        Self::UnderspecifiedFilter {
            filter: filter.into(),
            chain: chain.into(),
        }
    }

    /// Create a multiplicity overflow error.
    pub fn multiplicity_overflow(step: impl Into<String>, required: usize, legs: usize) -> Self {
        Self::MultiplicityOverflow {
            step: step.into(),
            required,
            legs,
        }
    }

    /// Create an orphan chain error.
    pub fn orphan_chain(
        chain: impl Into<String>,
        step: impl Into<String>,
        sequence: impl Into<String>,
    ) -> Self {
        Self::OrphanChain {
            chain: chain.into(),
            step: step.into(),
            sequence: sequence.into(),
        }
    }

    /// Whether this error aborts a menu compilation (as opposed to I/O or
    /// emulation failures around it).
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationConflict { .. }
                | Self::UnderspecifiedFilter { .. }
                | Self::MultiplicityOverflow { .. }
                | Self::OrphanChain { .. }
                | Self::LegCountMismatch { .. }
                | Self::InvalidKey(_)
        )
    }
}
