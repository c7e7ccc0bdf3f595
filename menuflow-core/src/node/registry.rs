//! Per-compilation node arena with reuse-or-conflict registration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::types::{AlgNode, NodeId, NodeRequest};
use crate::error::{Error, Result};
use crate::naming::{Key, KeySet};

/// Outcome of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new node was created.
    Created(NodeId),
    /// An identical node already existed and is reused.
    Shared(NodeId),
}

impl Registration {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Created(id) | Self::Shared(id) => *id,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

/// Registration counters for one compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub created: usize,
    pub shared: usize,
}

/// Owns every node created during one compilation run.
///
/// Nodes are addressed by name. Registering a name twice either returns the
/// existing node (equal parameters, same step) or fails with a
/// configuration conflict. Every output key has exactly one producer.
#[derive(Debug, Default)]
pub struct CompilationContext {
    nodes: Vec<AlgNode>,
    by_name: HashMap<String, NodeId>,
    producers: HashMap<Key, NodeId>,
    stats: RegistryStats,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the requested node, or reuse an identical one.
    ///
    /// On reuse the request's inputs and outputs are merged into the
    /// existing node, which is how input makers accumulate the filter
    /// outputs of every chain that reaches them.
    pub fn register(&mut self, request: NodeRequest) -> Result<Registration> {
        if let Some(&id) = self.by_name.get(&request.name) {
            let existing = &self.nodes[id.0];
            if existing.params != request.params {
                return Err(Error::conflict(
                    &request.name,
                    format!(
                        "registered twice with different {} parameters [{}]",
                        existing.kind(),
                        existing.params.differing(&request.params).join(", ")
                    ),
                ));
            }
            if existing.step != request.step {
                return Err(Error::conflict(
                    &request.name,
                    format!(
                        "scheduled at step {} and at step {}",
                        display_step(existing.step),
                        display_step(request.step)
                    ),
                ));
            }
            self.extend(id, request.inputs, request.outputs)?;
            self.stats.shared += 1;
            debug!(node = %request.name, "Reusing shared node");
            return Ok(Registration::Shared(id));
        }

        let id = NodeId(self.nodes.len());
        self.check_unowned(&request.name, id, &request.outputs)?;
        for key in &request.outputs {
            self.producers.insert(key.clone(), id);
        }
        self.by_name.insert(request.name.clone(), id);
        debug!(node = %request.name, kind = %request.params.kind(), "Created node");
        self.nodes.push(AlgNode {
            id,
            name: request.name,
            step: request.step,
            params: request.params,
            inputs: request.inputs,
            outputs: request.outputs,
            chains: Vec::new(),
            bindings: request.bindings,
        });
        self.stats.created += 1;
        Ok(Registration::Created(id))
    }

    /// Add input and output keys to an existing node.
    pub fn extend(&mut self, id: NodeId, inputs: KeySet, outputs: KeySet) -> Result<()> {
        let name = self.try_node(id)?.name.clone();
        self.check_unowned(&name, id, &outputs)?;
        for key in &outputs {
            self.producers.insert(key.clone(), id);
        }
        let node = &mut self.nodes[id.0];
        node.inputs.extend(inputs);
        node.outputs.extend(outputs);
        Ok(())
    }

    fn check_unowned(&self, name: &str, id: NodeId, outputs: &KeySet) -> Result<()> {
        for key in outputs {
            if let Some(owner) = self.producers.get(key) {
                if *owner != id {
                    return Err(Error::conflict(
                        key.as_str(),
                        format!(
                            "claimed by '{}' but already produced by '{}'",
                            name, self.nodes[owner.0].name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&AlgNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut AlgNode> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Result<&AlgNode> {
        self.node(id)
            .ok_or_else(|| Error::Internal(format!("unknown node {}", id)))
    }

    pub(crate) fn try_node_mut(&mut self, id: NodeId) -> Result<&mut AlgNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::Internal(format!("unknown node {}", id)))
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Node producing `key`, if any node in this compilation does.
    pub fn producer(&self, key: &Key) -> Option<NodeId> {
        self.producers.get(key).copied()
    }

    pub fn nodes(&self) -> &[AlgNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }

    pub fn into_nodes(self) -> Vec<AlgNode> {
        self.nodes
    }
}

fn display_step(step: Option<usize>) -> String {
    step.map_or_else(|| "summary".to_string(), |s| (s + 1).to_string())
}
