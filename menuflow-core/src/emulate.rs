//! Event emulation: run a compiled menu over one synthetic event.
//!
//! Reconstruction is not performed; the event carries the features every
//! reconstruction collection would hold. The emulator walks the schedule,
//! skipping any input maker whose filters let nothing through, and reports
//! which chains reach their terminal key.
//!
//! ## Example
//!
//! ```rust,ignore
//! use menuflow_core::emulate::{Event, EventEmulator};
//! use menuflow_core::hypo::Candidate;
//!
//! let event = Event::new()
//!     .with_seed(Key::new("L1MU6")?, [0, 1])
//!     .with_features(Key::new("HLT_MuonsFast")?, [Candidate::new(0).with_feature("pt", 7.5)]);
//! let outcome = EventEmulator::new(&compiled).run(&event)?;
//! assert!(outcome.is_accepted("HLT_mu6"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, instrument};

use crate::compiler::{CompiledMenu, Layer};
use crate::error::{Error, Result};
use crate::hypo::{evaluate_combo, evaluate_hypo, leg_id, Candidate, CandidateId, Decisions};
use crate::naming::Key;
use crate::node::AlgNode;
use crate::params::NodeParams;

/// Seeds and reconstructed features of one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Candidates present in each seed collection.
    #[serde(default)]
    pub seeds: BTreeMap<Key, Vec<CandidateId>>,
    /// Contents of each reconstruction collection.
    #[serde(default)]
    pub features: BTreeMap<Key, Vec<Candidate>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, key: Key, candidates: impl IntoIterator<Item = CandidateId>) -> Self {
        self.seeds.entry(key).or_default().extend(candidates);
        self
    }

    pub fn with_features(mut self, key: Key, candidates: impl IntoIterator<Item = Candidate>) -> Self {
        self.features.entry(key).or_default().extend(candidates);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// What happened while emulating one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmulationOutcome {
    pub accepted: BTreeSet<String>,
    /// Decisions written to every decision key, including empty ones.
    pub decisions: BTreeMap<Key, Decisions>,
    /// Nodes that ran, in execution order.
    pub executed: Vec<String>,
    /// Nodes gated off, in execution order.
    pub skipped: Vec<String>,
}

impl EmulationOutcome {
    pub fn is_accepted(&self, chain: &str) -> bool {
        self.accepted.contains(chain)
    }

    pub fn ran(&self, node: &str) -> bool {
        self.executed.iter().any(|n| n == node)
    }

    pub fn decisions(&self, key: &Key) -> Option<&Decisions> {
        self.decisions.get(key)
    }
}

/// Runs a [`CompiledMenu`] over events.
pub struct EventEmulator<'a> {
    menu: &'a CompiledMenu,
}

impl<'a> EventEmulator<'a> {
    pub fn new(menu: &'a CompiledMenu) -> Self {
        Self { menu }
    }

    #[instrument(skip(self, event), fields(menu = %self.menu.name))]
    pub fn run(&self, event: &Event) -> Result<EmulationOutcome> {
        let mut state = EventState {
            event,
            outcome: EmulationOutcome::default(),
            available: HashSet::new(),
        };
        state.seed(self.menu);

        for layer in self.menu.schedule() {
            for id in &layer.nodes {
                let node = self
                    .menu
                    .node(*id)
                    .ok_or_else(|| Error::Emulation(format!("schedule names unknown node {}", id)))?;
                match layer.layer {
                    Layer::Filter => state.filter(node),
                    Layer::Reco => state.reco(node),
                    Layer::Hypo => state.hypo(node)?,
                    Layer::Combo => state.combo(node)?,
                    Layer::Summary => state.summary(node),
                }
            }
        }

        debug!(
            accepted = state.outcome.accepted.len(),
            executed = state.outcome.executed.len(),
            skipped = state.outcome.skipped.len(),
            "Emulated event"
        );
        Ok(state.outcome)
    }
}

struct EventState<'e> {
    event: &'e Event,
    outcome: EmulationOutcome,
    /// Keys written by a node that ran.
    available: HashSet<Key>,
}

impl EventState<'_> {
    fn seed(&mut self, menu: &CompiledMenu) {
        for flow in &menu.chains {
            let legs = flow.seeds.len();
            for (leg, key) in flow.seeds.iter().enumerate() {
                let id = leg_id(&flow.name, leg, legs);
                let entry = self.outcome.decisions.entry(key.clone()).or_default();
                for &candidate in self.event.seeds.get(key).into_iter().flatten() {
                    entry.insert(candidate, id.clone());
                }
            }
        }
    }

    fn read(&self, key: &Key) -> Decisions {
        self.outcome.decisions.get(key).cloned().unwrap_or_default()
    }

    fn write(&mut self, key: Key, decisions: Decisions) {
        self.available.insert(key.clone());
        self.outcome.decisions.insert(key, decisions);
    }

    fn mark(&mut self, node: &AlgNode, ran: bool) {
        if ran {
            self.outcome.executed.push(node.name.clone());
        } else {
            debug!(node = %node.name, "Gated off");
            self.outcome.skipped.push(node.name.clone());
        }
    }

    fn filter(&mut self, node: &AlgNode) {
        let chains: BTreeSet<String> = node.chains.iter().cloned().collect();
        let mut any = false;
        for (input, output) in node.routes().into_iter().flatten() {
            let passed = self.read(input).retain_chains(&chains);
            any |= !passed.is_empty();
            self.write(output.clone(), passed);
        }
        self.mark(node, any);
    }

    fn reco(&mut self, node: &AlgNode) {
        match &node.params {
            NodeParams::InputMaker(params) => {
                let mut merged = Decisions::new();
                for input in &node.inputs {
                    merged.merge(&self.read(input));
                }
                let run = !merged.is_empty();
                if run {
                    self.available.insert(params.roi_key.clone());
                }
                for output in &node.outputs {
                    if *output != params.roi_key {
                        self.write(output.clone(), merged.clone());
                    }
                }
                self.mark(node, run);
            }
            _ => {
                let run = node.inputs.iter().any(|k| self.available.contains(k));
                if run {
                    self.available.extend(node.outputs.iter().cloned());
                }
                self.mark(node, run);
            }
        }
    }

    fn hypo(&mut self, node: &AlgNode) -> Result<()> {
        let NodeParams::Hypo(params) = &node.params else {
            return Err(Error::Emulation(format!("'{}' is not a hypo", node.name)));
        };
        let incoming = self.read(&params.decisions);
        let features: &[Candidate] = if self.available.contains(&params.feature_key) {
            self.event
                .features
                .get(&params.feature_key)
                .map_or(&[], |c| c.as_slice())
        } else {
            &[]
        };
        let passed = evaluate_hypo(node.tools(), &incoming, features);
        for output in &node.outputs {
            self.write(output.clone(), passed.clone());
        }
        self.mark(node, !incoming.is_empty());
        Ok(())
    }

    fn combo(&mut self, node: &AlgNode) -> Result<()> {
        let NodeParams::Combo(params) = &node.params else {
            return Err(Error::Emulation(format!("'{}' is not a combo", node.name)));
        };
        let requirements = node
            .requirements()
            .ok_or_else(|| Error::Emulation(format!("combo '{}' has no requirements", node.name)))?;
        let legs: Vec<Decisions> = params.legs.iter().map(|k| self.read(k)).collect();
        let ran = legs.iter().any(|d| !d.is_empty());

        let (outputs, accepted) = evaluate_combo(requirements, &legs, params.matching);
        if outputs.len() != node.outputs.len() {
            return Err(Error::Emulation(format!(
                "combo '{}' has {} legs but {} outputs",
                node.name,
                outputs.len(),
                node.outputs.len()
            )));
        }
        // Output keys sort in leg order (`__leg000`, `__leg001`, ...).
        for (key, decisions) in node.outputs.iter().zip(outputs) {
            self.write(key.clone(), decisions);
        }
        debug!(combo = %node.name, accepted = accepted.len(), "Combo evaluated");
        self.mark(node, ran);
        Ok(())
    }

    fn summary(&mut self, node: &AlgNode) {
        for (chain, last) in node.finals().into_iter().flatten() {
            let only: BTreeSet<String> = [chain.clone()].into_iter().collect();
            let mut passed = Decisions::new();
            for key in &last.decisions {
                passed.merge(&self.read(key).retain_chains(&only));
            }
            if !passed.is_empty() {
                self.outcome.accepted.insert(chain.clone());
            }
            self.write(last.terminal.clone(), passed);
        }
        self.mark(node, true);
    }
}
