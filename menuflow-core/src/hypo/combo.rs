//! Combo evaluation: multiplicity across the legs of a step.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::tool::{leg_id, CandidateId, Decisions};

/// How legs are counted as satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegMatching {
    /// A leg counts when any of its candidates passed.
    #[default]
    Independent,
    /// Legs count only when each can be given a different candidate.
    Distinct,
}

/// One chain's requirement on a combo node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboRequirement {
    /// Minimum number of satisfied legs.
    pub required: usize,
    /// Legs the chain offers at this step.
    pub legs: usize,
}

/// Number of legs of `chain` satisfied by the per-leg decisions.
pub fn satisfied_legs(
    chain: &str,
    requirement: ComboRequirement,
    legs: &[Decisions],
    matching: LegMatching,
) -> usize {
    let per_leg: Vec<BTreeSet<CandidateId>> = (0..requirement.legs)
        .map(|leg| {
            legs.get(leg)
                .map(|d| d.candidates_with(&leg_id(chain, leg, requirement.legs)))
                .unwrap_or_default()
        })
        .collect();

    match matching {
        LegMatching::Independent => per_leg.iter().filter(|c| !c.is_empty()).count(),
        LegMatching::Distinct => max_matching(&per_leg),
    }
}

/// Evaluate a combo node.
///
/// Returns the per-leg output decisions, holding only the decision ids of
/// accepted chains, and the set of accepted chains.
pub fn evaluate_combo(
    requirements: &BTreeMap<String, ComboRequirement>,
    legs: &[Decisions],
    matching: LegMatching,
) -> (Vec<Decisions>, BTreeSet<String>) {
    let mut outputs = vec![Decisions::new(); legs.len()];
    let mut accepted = BTreeSet::new();

    for (chain, requirement) in requirements {
        if satisfied_legs(chain, *requirement, legs, matching) < requirement.required {
            continue;
        }
        accepted.insert(chain.clone());
        for (leg, output) in outputs.iter_mut().enumerate().take(requirement.legs) {
            let id = leg_id(chain, leg, requirement.legs);
            for candidate in legs[leg].candidates_with(&id) {
                output.insert(candidate, id.clone());
            }
        }
    }

    (outputs, accepted)
}

/// Size of a maximum matching of legs to distinct candidates.
fn max_matching(per_leg: &[BTreeSet<CandidateId>]) -> usize {
    let mut owner: BTreeMap<CandidateId, usize> = BTreeMap::new();
    let mut matched = 0;

    for leg in 0..per_leg.len() {
        let mut visited = BTreeSet::new();
        if augment(leg, per_leg, &mut owner, &mut visited) {
            matched += 1;
        }
    }

    matched
}

fn augment(
    leg: usize,
    per_leg: &[BTreeSet<CandidateId>],
    owner: &mut BTreeMap<CandidateId, usize>,
    visited: &mut BTreeSet<CandidateId>,
) -> bool {
    for &candidate in &per_leg[leg] {
        if !visited.insert(candidate) {
            continue;
        }
        let free = match owner.get(&candidate) {
            None => true,
            Some(&other) => augment(other, per_leg, owner, visited),
        };
        if free {
            owner.insert(candidate, leg);
            return true;
        }
    }
    false
}
