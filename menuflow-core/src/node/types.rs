//! Algorithm node types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::hypo::{AttachedTool, ComboRequirement};
use crate::naming::{Key, KeySet};
use crate::params::{NodeKind, NodeParams};

/// Index of a node in a compilation's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A chain's final decisions and the terminal key the summary writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub decisions: Vec<Key>,
    pub terminal: Key,
}

/// Kind-specific state that only ever grows after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bindings {
    #[default]
    Plain,
    /// Filter output key for each input key.
    Filter { routes: BTreeMap<Key, Key> },
    /// Hypo tools, one per attached chain leg.
    Hypo { tools: Vec<AttachedTool> },
    /// Combo requirement per chain.
    Combo {
        requirements: BTreeMap<String, ComboRequirement>,
    },
    /// Final decisions per chain.
    Summary {
        finals: BTreeMap<String, FinalDecision>,
    },
}

/// One node of the compiled graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgNode {
    pub id: NodeId,
    pub name: String,
    /// Step index the node runs in; `None` for the summary node.
    pub step: Option<usize>,
    /// Identity: fixed at creation.
    pub params: NodeParams,
    pub inputs: KeySet,
    pub outputs: KeySet,
    /// Chains that touch this node, in the order they were attached.
    pub chains: Vec<String>,
    pub bindings: Bindings,
}

impl AlgNode {
    pub fn kind(&self) -> NodeKind {
        self.params.kind()
    }

    /// Record that `chain` also uses this node. Idempotent.
    pub fn add_chain(&mut self, chain: &str) {
        if !self.has_chain(chain) {
            self.chains.push(chain.to_string());
        }
    }

    pub fn has_chain(&self, chain: &str) -> bool {
        self.chains.iter().any(|c| c == chain)
    }

    pub fn routes(&self) -> Option<&BTreeMap<Key, Key>> {
        match &self.bindings {
            Bindings::Filter { routes } => Some(routes),
            _ => None,
        }
    }

    pub fn tools(&self) -> &[AttachedTool] {
        match &self.bindings {
            Bindings::Hypo { tools } => tools,
            _ => &[],
        }
    }

    pub fn requirements(&self) -> Option<&BTreeMap<String, ComboRequirement>> {
        match &self.bindings {
            Bindings::Combo { requirements } => Some(requirements),
            _ => None,
        }
    }

    pub fn finals(&self) -> Option<&BTreeMap<String, FinalDecision>> {
        match &self.bindings {
            Bindings::Summary { finals } => Some(finals),
            _ => None,
        }
    }
}

/// A request to create, or reuse, a node by name.
#[derive(Debug, Clone)]
pub struct NodeRequest {
    pub name: String,
    pub step: Option<usize>,
    pub params: NodeParams,
    pub inputs: KeySet,
    pub outputs: KeySet,
    pub bindings: Bindings,
}

impl NodeRequest {
    pub fn new(name: impl Into<String>, step: Option<usize>, params: NodeParams) -> Self {
        Self {
            name: name.into(),
            step,
            params,
            inputs: KeySet::new(),
            outputs: KeySet::new(),
            bindings: Bindings::Plain,
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = Key>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = Key>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    /// Bindings a freshly created node starts with.
    pub fn with_bindings(mut self, bindings: Bindings) -> Self {
        self.bindings = bindings;
        self
    }
}
