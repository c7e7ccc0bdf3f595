//! Step occupancy: which chains use which sequence at which step.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::cf_sequence::{push_unique, CFSequence};
use crate::naming::Key;

/// One sequence at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceOccupancy {
    pub sequence: String,
    /// Filters gating the sequence at this step.
    pub filters: Vec<String>,
    pub chains: Vec<String>,
}

/// One filter at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOccupancy {
    pub filter: String,
    pub chains: Vec<String>,
    /// Decision keys written behind this filter.
    pub decisions: Vec<Key>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOccupancy {
    pub index: usize,
    pub label: String,
    pub filters: Vec<FilterOccupancy>,
    pub sequences: Vec<SequenceOccupancy>,
    /// Chains sitting out this step on an empty step.
    pub pass_through: Vec<String>,
}

/// Per-step, per-sequence chain membership of a compiled menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccupancyTable {
    pub steps: Vec<StepOccupancy>,
}

impl OccupancyTable {
    pub(crate) fn from_cf_sequences(labels: &[String], per_step: &[Vec<CFSequence>]) -> Self {
        let steps = per_step
            .iter()
            .enumerate()
            .map(|(index, cfs)| {
                let mut sequences: Vec<SequenceOccupancy> = Vec::new();
                let mut pass_through = Vec::new();
                for cf in cfs {
                    for chain in &cf.pass_through {
                        push_unique(&mut pass_through, chain);
                    }
                    for (sequence, chains) in cf.sequences.iter().zip(&cf.sequence_chains) {
                        let entry = match sequences.iter().position(|s| &s.sequence == sequence) {
                            Some(pos) => &mut sequences[pos],
                            None => {
                                sequences.push(SequenceOccupancy {
                                    sequence: sequence.clone(),
                                    filters: Vec::new(),
                                    chains: Vec::new(),
                                });
                                let last = sequences.len() - 1;
                                &mut sequences[last]
                            }
                        };
                        push_unique(&mut entry.filters, &cf.filter_name);
                        for chain in chains {
                            push_unique(&mut entry.chains, chain);
                        }
                    }
                }
                let filters = cfs
                    .iter()
                    .map(|cf| FilterOccupancy {
                        filter: cf.filter_name.clone(),
                        chains: cf.chains.clone(),
                        decisions: cf.decisions.iter().cloned().collect(),
                    })
                    .collect();
                StepOccupancy {
                    index,
                    label: labels.get(index).cloned().unwrap_or_default(),
                    filters,
                    sequences,
                    pass_through,
                }
            })
            .collect();
        Self { steps }
    }

    /// Chains running `sequence` at step `index`.
    pub fn chains_using(&self, index: usize, sequence: &str) -> Option<&[String]> {
        self.steps
            .get(index)?
            .sequences
            .iter()
            .find(|s| s.sequence == sequence)
            .map(|s| s.chains.as_slice())
    }

    /// `(step, sequence)` pairs a chain runs, in step order.
    pub fn membership(&self, chain: &str) -> Vec<(usize, String)> {
        self.steps
            .iter()
            .flat_map(|step| {
                step.sequences
                    .iter()
                    .filter(|s| s.chains.iter().any(|c| c == chain))
                    .map(move |s| (step.index, s.sequence.clone()))
            })
            .collect()
    }

    /// Filters gating `chain`, in step order.
    pub fn filters_of(&self, chain: &str) -> Vec<(usize, String)> {
        self.steps
            .iter()
            .flat_map(|step| {
                step.filters
                    .iter()
                    .filter(|f| f.chains.iter().any(|c| c == chain))
                    .map(move |f| (step.index, f.filter.clone()))
            })
            .collect()
    }

    /// Plain-text table, one line per sequence.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            let _ = writeln!(out, "{} ({} filter(s))", step.label, step.filters.len());
            for seq in &step.sequences {
                let _ = writeln!(
                    out,
                    "  {:<24} {:>3} chain(s): {}",
                    seq.sequence,
                    seq.chains.len(),
                    seq.chains.join(", ")
                );
            }
            if !step.pass_through.is_empty() {
                let _ = writeln!(
                    out,
                    "  {:<24} {:>3} chain(s): {}",
                    "(empty)",
                    step.pass_through.len(),
                    step.pass_through.join(", ")
                );
            }
        }
        out
    }
}
