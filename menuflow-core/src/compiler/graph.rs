//! The compiled decision-flow graph.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use super::occupancy::OccupancyTable;
use crate::error::Result;
use crate::naming::Key;
use crate::node::{AlgNode, NodeId, RegistryStats};
use crate::params::NodeKind;

/// Position of a node group within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Filter,
    Reco,
    Hypo,
    Combo,
    Summary,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Filter => "filter",
            Self::Reco => "reco",
            Self::Hypo => "hypo",
            Self::Combo => "combo",
            Self::Summary => "summary",
        };
        write!(f, "{}", s)
    }
}

/// One sequence's reconstruction: its input maker followed by its
/// algorithms, in the order they must run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoLane {
    pub sequence: String,
    pub nodes: Vec<NodeId>,
}

/// The nodes of one step index.
///
/// Nodes within `filters`, `hypos` and `combos` are independent of each
/// other. Lanes are independent of each other; nodes within a lane run in
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepGraph {
    pub index: usize,
    pub label: String,
    pub filters: Vec<NodeId>,
    pub reco: Vec<RecoLane>,
    pub hypos: Vec<NodeId>,
    pub combos: Vec<NodeId>,
}

impl StepGraph {
    pub fn reco_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.reco.iter().flat_map(|lane| lane.nodes.iter().copied())
    }

    /// Every node of the step, filters first.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.filters
            .iter()
            .copied()
            .chain(self.reco_nodes())
            .chain(self.hypos.iter().copied())
            .chain(self.combos.iter().copied())
            .collect()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes().contains(&id)
    }
}

/// A chain's decisions at one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDecision {
    pub step: usize,
    pub filter: NodeId,
    /// Keys the chain's filter reads, one per leg.
    pub filter_inputs: Vec<Key>,
    /// Keys the chain's decisions are written to, one per leg.
    pub decisions: Vec<Key>,
}

/// The path one chain takes through the compiled graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainFlow {
    pub name: String,
    pub seeds: Vec<Key>,
    pub steps: Vec<StepDecision>,
    pub terminal: Key,
}

impl ChainFlow {
    /// Decisions the summary reads for this chain.
    pub fn final_decisions(&self) -> &[Key] {
        self.steps
            .last()
            .map_or(self.seeds.as_slice(), |s| s.decisions.as_slice())
    }

    pub fn filters(&self) -> Vec<NodeId> {
        self.steps.iter().map(|s| s.filter).collect()
    }
}

/// One layer of the execution order.
///
/// Lanes are mutually independent; the nodes of one lane run in order.
/// Only reco layers have lanes longer than one node. `nodes` lists every
/// lane back to back, which is a valid sequential order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledLayer {
    /// Step index; `None` for the summary.
    pub step: Option<usize>,
    pub layer: Layer,
    pub nodes: Vec<NodeId>,
    pub lanes: Vec<Vec<NodeId>>,
}

impl ScheduledLayer {
    fn independent(step: Option<usize>, layer: Layer, nodes: Vec<NodeId>) -> Self {
        let lanes = nodes.iter().map(|&id| vec![id]).collect();
        Self {
            step,
            layer,
            nodes,
            lanes,
        }
    }
}

/// A data dependency: `to` reads `key`, which `from` writes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub key: Key,
}

/// Result of compiling a menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMenu {
    pub name: String,
    pub nodes: Vec<AlgNode>,
    pub steps: Vec<StepGraph>,
    pub chains: Vec<ChainFlow>,
    pub summary: NodeId,
    pub occupancy: OccupancyTable,
    pub stats: RegistryStats,
}

impl CompiledMenu {
    pub fn node(&self, id: NodeId) -> Option<&AlgNode> {
        self.nodes.get(id.0)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&AlgNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &AlgNode> {
        self.nodes.iter().filter(move |n| n.kind() == kind)
    }

    pub fn chain(&self, name: &str) -> Option<&ChainFlow> {
        self.chains.iter().find(|c| c.name == name)
    }

    /// Key the summary writes for `chain`.
    pub fn terminal_key(&self, chain: &str) -> Option<&Key> {
        self.chain(chain).map(|c| &c.terminal)
    }

    /// Node writing `key`, if the graph produces it.
    pub fn producer(&self, key: &Key) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.outputs.contains(key))
            .map(|n| n.id)
    }

    /// Execution order: per step, filters, then reconstruction, then hypos,
    /// then combos; the summary last. Empty layers are omitted.
    ///
    /// Reco layers carry one lane per sequence.
    pub fn schedule(&self) -> Vec<ScheduledLayer> {
        let mut layers = Vec::new();
        for step in &self.steps {
            let at = Some(step.index);
            if !step.filters.is_empty() {
                layers.push(ScheduledLayer::independent(at, Layer::Filter, step.filters.clone()));
            }
            if !step.reco.is_empty() {
                layers.push(ScheduledLayer {
                    step: at,
                    layer: Layer::Reco,
                    nodes: step.reco_nodes().collect(),
                    lanes: step.reco.iter().map(|lane| lane.nodes.clone()).collect(),
                });
            }
            if !step.hypos.is_empty() {
                layers.push(ScheduledLayer::independent(at, Layer::Hypo, step.hypos.clone()));
            }
            if !step.combos.is_empty() {
                layers.push(ScheduledLayer::independent(at, Layer::Combo, step.combos.clone()));
            }
        }
        layers.push(ScheduledLayer::independent(
            None,
            Layer::Summary,
            vec![self.summary],
        ));
        layers
    }

    /// Every producer-to-consumer dependency inside the graph, sorted.
    ///
    /// Keys read but produced by no node (seeds, external collections) have
    /// no edge.
    pub fn data_edges(&self) -> Vec<DataEdge> {
        let producers: HashMap<&Key, NodeId> = self
            .nodes
            .iter()
            .flat_map(|n| n.outputs.iter().map(move |k| (k, n.id)))
            .collect();

        let mut edges: Vec<DataEdge> = self
            .nodes
            .iter()
            .flat_map(|consumer| {
                let producers = &producers;
                consumer.inputs.iter().filter_map(move |key| {
                    producers.get(key).map(|&from| DataEdge {
                        from,
                        to: consumer.id,
                        key: key.clone(),
                    })
                })
            })
            .collect();
        edges.sort();
        edges
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}
