//! Hypo tools: per-chain pass/fail predicates over candidates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a reconstructed object within one event.
pub type CandidateId = u32;

/// A reconstructed object with named features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

impl Candidate {
    pub fn new(id: CandidateId) -> Self {
        Self {
            id,
            features: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }
}

/// Bound on one feature. A missing feature fails the cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    pub feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Cut {
    /// `feature >= value`.
    pub fn min(feature: impl Into<String>, value: f64) -> Self {
        Self {
            feature: feature.into(),
            min: Some(value),
            max: None,
        }
    }

    /// `feature < value`.
    pub fn max(feature: impl Into<String>, value: f64) -> Self {
        Self {
            feature: feature.into(),
            min: None,
            max: Some(value),
        }
    }

    /// `low <= feature < high`.
    pub fn window(feature: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            feature: feature.into(),
            min: Some(low),
            max: Some(high),
        }
    }

    pub fn accepts(&self, candidate: &Candidate) -> bool {
        let Some(value) = candidate.feature(&self.feature) else {
            return false;
        };
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value < max)
    }
}

/// A chain's predicate for one leg of one step: all cuts must pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HypoTool {
    #[serde(default)]
    pub cuts: Vec<Cut>,
}

impl HypoTool {
    /// A tool that accepts every candidate.
    pub fn pass_all() -> Self {
        Self::default()
    }

    pub fn with_cut(mut self, cut: Cut) -> Self {
        self.cuts.push(cut);
        self
    }

    pub fn accepts(&self, candidate: &Candidate) -> bool {
        self.cuts.iter().all(|cut| cut.accepts(candidate))
    }
}

/// A hypo tool attached to a hypo node on behalf of one chain leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedTool {
    /// Decision id the tool reads and writes (see [`leg_id`]).
    pub id: String,
    pub chain: String,
    pub leg: usize,
    pub tool: HypoTool,
}

/// Decision id of one chain leg.
///
/// Single-leg chains use the chain name; multi-leg chains prefix it with
/// `legNNN_`.
pub fn leg_id(chain: &str, leg: usize, legs: usize) -> String {
    if legs <= 1 {
        chain.to_string()
    } else {
        format!("leg{:03}_{}", leg, chain)
    }
}

/// Whether `id` carries the `legNNN_` prefix of a multi-leg decision id.
///
/// Chain names must not, or their ids would be attributed to another chain.
pub fn has_leg_prefix(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() > 7
        && id.starts_with("leg")
        && bytes[3..6].iter().all(u8::is_ascii_digit)
        && bytes[6] == b'_'
}

/// Chain name a decision id belongs to.
pub fn chain_of(id: &str) -> &str {
    if has_leg_prefix(id) {
        &id[7..]
    } else {
        id
    }
}

/// Candidates still alive, each tagged with the decision ids that accept it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decisions(BTreeMap<CandidateId, BTreeSet<String>>);

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, candidate: CandidateId, id: impl Into<String>) {
        self.0.entry(candidate).or_default().insert(id.into());
    }

    /// Union another decision set into this one.
    pub fn merge(&mut self, other: &Decisions) {
        for (candidate, ids) in &other.0 {
            self.0.entry(*candidate).or_default().extend(ids.iter().cloned());
        }
    }

    /// Keep only ids belonging to one of `chains`; drops emptied candidates.
    pub fn retain_chains(&self, chains: &BTreeSet<String>) -> Decisions {
        let mut out = Decisions::new();
        for (candidate, ids) in &self.0 {
            for id in ids {
                if chains.contains(chain_of(id)) {
                    out.insert(*candidate, id.clone());
                }
            }
        }
        out
    }

    /// Candidates carrying a given decision id.
    pub fn candidates_with(&self, id: &str) -> BTreeSet<CandidateId> {
        self.0
            .iter()
            .filter(|(_, ids)| ids.contains(id))
            .map(|(candidate, _)| *candidate)
            .collect()
    }

    pub fn carries_chain(&self, chain: &str) -> bool {
        self.0
            .values()
            .any(|ids| ids.iter().any(|id| chain_of(id) == chain))
    }

    pub fn ids(&self, candidate: CandidateId) -> Option<&BTreeSet<String>> {
        self.0.get(&candidate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CandidateId, &BTreeSet<String>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Evaluate a single-object hypo node.
///
/// A candidate passes for every attached tool whose id it carries and whose
/// cuts accept the candidate's reconstructed features. Candidates without a
/// reconstructed counterpart in `features` fail every tool.
pub fn evaluate_hypo(
    tools: &[AttachedTool],
    incoming: &Decisions,
    features: &[Candidate],
) -> Decisions {
    let by_id: BTreeMap<CandidateId, &Candidate> = features.iter().map(|c| (c.id, c)).collect();
    let mut out = Decisions::new();

    for (candidate, ids) in incoming.iter() {
        let Some(reconstructed) = by_id.get(candidate) else {
            continue;
        };
        for tool in tools {
            if ids.contains(&tool.id) && tool.tool.accepts(reconstructed) {
                out.insert(*candidate, tool.id.clone());
            }
        }
    }

    out
}
