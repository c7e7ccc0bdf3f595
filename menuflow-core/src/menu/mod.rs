//! Declarative menu definitions: chains, steps and sequences.
//!
//! A [`Menu`] is what the menu-definition layer hands to the compiler. It is
//! read-only from the compiler's point of view.
//!
//! ## Example
//!
//! ```rust,ignore
//! use menuflow_core::menu::{Chain, ChainStep, Menu, MenuSequence, StepLeg};
//!
//! let menu = Menu::new("physics")
//!     .with_sequence(mu_fast)
//!     .with_chain(Chain::new(
//!         "HLT_mu6",
//!         vec![Key::new("L1MU6")?],
//!         vec![ChainStep::single(StepLeg::named("muFast", tool))],
//!     )?);
//! ```

mod chain;
mod sequence;

pub use chain::{Chain, ChainStep, SequenceRef, StepLeg};
pub use sequence::{AlgorithmSpec, HypoAlgSpec, MenuSequence};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// A full trigger menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    #[serde(default)]
    pub name: String,
    /// Sequences legs may reference by name.
    #[serde(default)]
    pub sequences: Vec<MenuSequence>,
    /// Chains in declaration order; the order fixes compilation order.
    #[serde(default)]
    pub chains: Vec<Chain>,
}

impl Menu {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_sequence(mut self, sequence: MenuSequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn chain(&self, name: &str) -> Option<&Chain> {
        self.chains.iter().find(|c| c.name() == name)
    }

    /// Parse a menu from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let menu: Self = serde_json::from_str(json)?;
        menu.validate()?;
        Ok(menu)
    }

    /// Load a menu from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the names of every sequence, catalogued or inline.
    pub fn validate(&self) -> Result<()> {
        for sequence in &self.sequences {
            sequence.validate()?;
        }
        for chain in &self.chains {
            for step in chain.steps() {
                for leg in step.legs() {
                    if let SequenceRef::Inline(sequence) = &leg.sequence {
                        sequence.validate()?;
                    }
                }
            }
        }
        Ok(())
    }
}
