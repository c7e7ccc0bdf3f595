//! Control-flow sequences: per-step, per-filter bookkeeping.

use crate::naming::{Key, KeySet};
use crate::node::NodeId;

/// Everything gated by one filter at one step index.
///
/// Lives only for the duration of a compilation; its content is folded into
/// the emitted step graphs and the occupancy table.
#[derive(Debug, Clone)]
pub(crate) struct CFSequence {
    pub filter: NodeId,
    pub filter_name: String,
    /// Sequences reached through this filter, first-seen order.
    pub sequences: Vec<String>,
    /// Chains gated by this filter, declaration order.
    pub chains: Vec<String>,
    /// Chains that only pass through (empty step).
    pub pass_through: Vec<String>,
    /// Chains using each sequence, parallel to `sequences`.
    pub sequence_chains: Vec<Vec<String>>,
    pub decisions: KeySet,
}

impl CFSequence {
    pub fn new(filter: NodeId, filter_name: impl Into<String>) -> Self {
        Self {
            filter,
            filter_name: filter_name.into(),
            sequences: Vec::new(),
            chains: Vec::new(),
            pass_through: Vec::new(),
            sequence_chains: Vec::new(),
            decisions: KeySet::new(),
        }
    }

    pub fn add_chain(&mut self, chain: &str) {
        push_unique(&mut self.chains, chain);
    }

    pub fn add_pass_through(&mut self, chain: &str) {
        push_unique(&mut self.pass_through, chain);
    }

    /// Record that `chain` runs `sequence` behind this filter.
    pub fn add_sequence(&mut self, sequence: &str, chain: &str) {
        match self.sequences.iter().position(|s| s == sequence) {
            Some(index) => push_unique(&mut self.sequence_chains[index], chain),
            None => {
                self.sequences.push(sequence.to_string());
                self.sequence_chains.push(vec![chain.to_string()]);
            }
        }
    }

    pub fn add_decisions<'a>(&mut self, keys: impl IntoIterator<Item = &'a Key>) {
        self.decisions.extend(keys.into_iter().cloned());
    }
}

pub(crate) fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}
