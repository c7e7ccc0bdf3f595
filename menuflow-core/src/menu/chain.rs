//! Chains and their steps.
//!
//! Structural checks that need no other chain (multiplicity against legs,
//! legs against seeds) run at construction, including deserialization, so a
//! malformed step never reaches the compiler.

use serde::{Deserialize, Serialize};

use super::sequence::MenuSequence;
use crate::error::{Error, Result};
use crate::hypo::{has_leg_prefix, HypoTool, LegMatching};
use crate::naming::{validate_name, Key};

/// A leg's sequence: defined inline or by name elsewhere in the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceRef {
    Named(String),
    Inline(Box<MenuSequence>),
}

impl SequenceRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Inline(seq) => &seq.name,
        }
    }
}

impl From<MenuSequence> for SequenceRef {
    fn from(seq: MenuSequence) -> Self {
        Self::Inline(Box::new(seq))
    }
}

/// One leg of a step: the sequence to run and the chain's predicate on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLeg {
    pub sequence: SequenceRef,
    #[serde(default)]
    pub hypo_tool: HypoTool,
}

impl StepLeg {
    pub fn new(sequence: impl Into<SequenceRef>, hypo_tool: HypoTool) -> Self {
        Self {
            sequence: sequence.into(),
            hypo_tool,
        }
    }

    /// Leg whose sequence is defined elsewhere in the menu.
    pub fn named(sequence: impl Into<String>, hypo_tool: HypoTool) -> Self {
        Self {
            sequence: SequenceRef::Named(sequence.into()),
            hypo_tool,
        }
    }
}

#[derive(Deserialize)]
struct RawChainStep {
    name: String,
    #[serde(default)]
    legs: Vec<StepLeg>,
    #[serde(default)]
    multiplicity: Option<usize>,
    #[serde(default)]
    matching: LegMatching,
    #[serde(default)]
    combo: bool,
}

impl TryFrom<RawChainStep> for ChainStep {
    type Error = Error;

    fn try_from(raw: RawChainStep) -> Result<Self> {
        if raw.legs.is_empty() && raw.multiplicity.unwrap_or(0) == 0 {
            return ChainStep::empty(raw.name);
        }
        let multiplicity = raw.multiplicity.unwrap_or(raw.legs.len());
        let mut step = ChainStep::new(raw.name, raw.legs, multiplicity)?.with_matching(raw.matching);
        step.combo |= raw.combo;
        Ok(step)
    }
}

/// One ordered stage of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChainStep")]
pub struct ChainStep {
    name: String,
    legs: Vec<StepLeg>,
    multiplicity: usize,
    matching: LegMatching,
    combo: bool,
}

impl ChainStep {
    /// Create a step requiring `multiplicity` of its legs to pass.
    pub fn new(name: impl Into<String>, legs: Vec<StepLeg>, multiplicity: usize) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        if multiplicity == 0 {
            return Err(Error::Config(format!(
                "step '{}' must require at least one leg",
                name
            )));
        }
        if multiplicity > legs.len() {
            return Err(Error::multiplicity_overflow(name, multiplicity, legs.len()));
        }
        Ok(Self {
            name,
            legs,
            multiplicity,
            matching: LegMatching::default(),
            combo: false,
        })
    }

    /// Single-leg step named after its sequence.
    pub fn single(leg: StepLeg) -> Self {
        Self {
            name: leg.sequence.name().to_string(),
            legs: vec![leg],
            multiplicity: 1,
            matching: LegMatching::default(),
            combo: false,
        }
    }

    /// Pass-through step: the chain waits while other chains reconstruct.
    pub fn empty(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            legs: Vec::new(),
            multiplicity: 0,
            matching: LegMatching::default(),
            combo: false,
        })
    }

    pub fn with_matching(mut self, matching: LegMatching) -> Self {
        self.matching = matching;
        self
    }

    /// Route a single-leg step through a combo node anyway.
    pub fn with_combo(mut self) -> Self {
        self.combo = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn legs(&self) -> &[StepLeg] {
        &self.legs
    }

    pub fn multiplicity(&self) -> usize {
        self.multiplicity
    }

    pub fn matching(&self) -> LegMatching {
        self.matching
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Whether this step's decisions go through a combo node.
    pub fn is_combo(&self) -> bool {
        !self.is_empty() && (self.combo || self.legs.len() > 1)
    }

    pub fn sequence_names(&self) -> Vec<String> {
        self.legs
            .iter()
            .map(|leg| leg.sequence.name().to_string())
            .collect()
    }
}

#[derive(Deserialize)]
struct RawChain {
    name: String,
    #[serde(default)]
    seeds: Vec<Key>,
    #[serde(default)]
    steps: Vec<ChainStep>,
}

impl TryFrom<RawChain> for Chain {
    type Error = Error;

    fn try_from(raw: RawChain) -> Result<Self> {
        Chain::new(raw.name, raw.seeds, raw.steps)
    }
}

/// An independently named selection path through the menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChain")]
pub struct Chain {
    name: String,
    seeds: Vec<Key>,
    steps: Vec<ChainStep>,
}

impl Chain {
    /// Create a chain with one seed per leg.
    ///
    /// A chain without seeds is accepted here; it fails to compile because
    /// its first filter has nothing to read.
    pub fn new(name: impl Into<String>, seeds: Vec<Key>, steps: Vec<ChainStep>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        if has_leg_prefix(&name) {
            return Err(Error::Config(format!(
                "chain name '{}' must not start with a legNNN_ prefix",
                name
            )));
        }
        if !seeds.is_empty() {
            if let Some(step) = steps
                .iter()
                .find(|s| !s.is_empty() && s.legs().len() != seeds.len())
            {
                return Err(Error::LegCountMismatch {
                    chain: name,
                    step: step.name().to_string(),
                    legs: step.legs().len(),
                    seeds: seeds.len(),
                });
            }
        }
        Ok(Self { name, seeds, steps })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seeds(&self) -> &[Key] {
        &self.seeds
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&ChainStep> {
        self.steps.get(index)
    }

    /// Number of legs (one per seed).
    pub fn legs(&self) -> usize {
        self.seeds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypo::Cut;

    fn key(name: &str) -> Key {
        Key::new(name).unwrap()
    }

    fn leg(seq: &str) -> StepLeg {
        StepLeg::named(seq, HypoTool::default().with_cut(Cut::min("pt", 6.0)))
    }

    #[test]
    fn test_multiplicity_overflow_at_construction() {
        let err = ChainStep::new("Step1_2mu", vec![leg("muFast")], 2).unwrap_err();
        assert!(matches!(
            err,
            Error::MultiplicityOverflow { required: 2, legs: 1, .. }
        ));
    }

    #[test]
    fn test_zero_multiplicity_rejected() {
        assert!(matches!(
            ChainStep::new("s", vec![leg("muFast")], 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_combo_flag() {
        assert!(!ChainStep::single(leg("muFast")).is_combo());
        assert!(ChainStep::single(leg("muFast")).with_combo().is_combo());
        assert!(ChainStep::new("mu_e", vec![leg("muFast"), leg("eFast")], 1)
            .unwrap()
            .is_combo());
        assert!(!ChainStep::empty("wait").unwrap().is_combo());
    }

    #[test]
    fn test_single_step_named_after_sequence() {
        let step = ChainStep::single(leg("muFast"));
        assert_eq!(step.name(), "muFast");
        assert_eq!(step.multiplicity(), 1);
        assert_eq!(step.sequence_names(), vec!["muFast".to_string()]);
    }

    #[test]
    fn test_leg_count_mismatch() {
        let step = ChainStep::new("mu_e", vec![leg("muFast"), leg("eFast")], 2).unwrap();
        let err = Chain::new("HLT_mu_e", vec![key("L1MU6")], vec![step]).unwrap_err();
        assert!(matches!(err, Error::LegCountMismatch { legs: 2, seeds: 1, .. }));
    }

    #[test]
    fn test_leg_prefixed_chain_names_rejected() {
        let steps = || vec![ChainStep::single(leg("muFast"))];
        let err = Chain::new("leg001_HLT_x", vec![key("L1MU6")], steps()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = serde_json::from_str::<Chain>(
            r#"{"name": "leg000_foo", "seeds": ["L1MU6"], "steps": []}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("legNNN_"));

        assert!(Chain::new("legacy_HLT_x", vec![key("L1MU6")], steps()).is_ok());
        assert!(Chain::new("HLT_leg001_x", vec![key("L1MU6")], steps()).is_ok());
    }

    #[test]
    fn test_empty_steps_skip_leg_check() {
        let chain = Chain::new(
            "HLT_mu_e",
            vec![key("L1MU6"), key("L1EM10")],
            vec![ChainStep::empty("wait").unwrap()],
        )
        .unwrap();
        assert_eq!(chain.legs(), 2);
    }

    #[test]
    fn test_step_json_validation() {
        let ok: ChainStep = serde_json::from_str(
            r#"{"name": "mu_e", "legs": [{"sequence": "muFast"}, {"sequence": "eFast"}], "multiplicity": 1}"#,
        )
        .unwrap();
        assert_eq!(ok.multiplicity(), 1);
        assert!(ok.is_combo());

        let err = serde_json::from_str::<ChainStep>(
            r#"{"name": "2mu", "legs": [{"sequence": "muFast"}], "multiplicity": 2}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("multiplicity 2"));

        let empty: ChainStep = serde_json::from_str(r#"{"name": "wait"}"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_chain_json_round_trip() {
        let chain = Chain::new(
            "HLT_mu6",
            vec![key("L1MU6")],
            vec![ChainStep::single(leg("muFast"))],
        )
        .unwrap();
        let json = serde_json::to_string(&chain).unwrap();
        let back: Chain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain);
    }
}
