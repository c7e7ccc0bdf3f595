//! Filter nodes: gate a step's reconstruction on candidates still alive.
//!
//! A filter routes every input key to its own output key. Filters are
//! identified by name alone; a second chain reaching the same name merges
//! its inputs into the existing filter.

use std::collections::BTreeMap;
use tracing::debug;

use super::registry::CompilationContext;
use super::types::{Bindings, NodeId, NodeRequest};
use crate::error::{Error, Result};
use crate::naming::{DatasetNamespace, Key, KeySet};
use crate::params::{FilterParams, NodeParams, ParameterSet};

fn routes_for(ns: &DatasetNamespace, name: &str, inputs: &KeySet) -> BTreeMap<Key, Key> {
    inputs
        .iter()
        .map(|input| (input.clone(), ns.filter_output(name, input)))
        .collect()
}

impl CompilationContext {
    /// Create a filter reading `inputs` on behalf of `chain`.
    pub fn create_filter(
        &mut self,
        ns: &DatasetNamespace,
        name: &str,
        params: FilterParams,
        inputs: &KeySet,
        chain: &str,
    ) -> Result<NodeId> {
        if inputs.is_empty() {
            return Err(Error::underspecified_filter(name, chain));
        }
        if self.lookup(name).is_some() {
            return Err(Error::Internal(format!("filter '{}' created twice", name)));
        }
        let step = params.step;
        let routes = routes_for(ns, name, inputs);
        let request = NodeRequest::new(name, Some(step), NodeParams::Filter(params))
            .with_inputs(routes.keys().cloned())
            .with_outputs(routes.values().cloned())
            .with_bindings(Bindings::Filter { routes });
        let id = self.register(request)?.id();
        self.try_node_mut(id)?.add_chain(chain);
        Ok(id)
    }

    /// Merge another chain's inputs into an existing filter.
    ///
    /// Inputs are a set: merging keys the filter already reads, in any
    /// order, changes nothing but the chain list. The compiler names filters
    /// after a digest of their exact input set, so its merges only ever add
    /// a chain; new inputs arrive only from callers that choose filter names
    /// some other way.
    pub fn merge_filter(
        &mut self,
        ns: &DatasetNamespace,
        id: NodeId,
        params: &FilterParams,
        inputs: &KeySet,
        chain: &str,
    ) -> Result<()> {
        let node = self.try_node(id)?;
        let name = node.name.clone();
        let NodeParams::Filter(existing) = &node.params else {
            return Err(Error::conflict(
                &name,
                format!("is a {} node, not a filter", node.kind()),
            ));
        };
        if existing != params {
            return Err(Error::conflict(
                &name,
                format!(
                    "filter shape differs in [{}]",
                    existing.differing(params).join(", ")
                ),
            ));
        }
        if inputs.is_empty() {
            return Err(Error::underspecified_filter(&name, chain));
        }

        let fresh: KeySet = inputs
            .iter()
            .filter(|input| !node.inputs.contains(*input))
            .cloned()
            .collect();
        if fresh.is_empty() {
            debug!(filter = %name, chain, "Filter merge adds no inputs");
        } else {
            let routes = routes_for(ns, &name, &fresh);
            self.extend(id, fresh, routes.values().cloned().collect())?;
            if let Bindings::Filter { routes: existing } = &mut self.try_node_mut(id)?.bindings {
                existing.extend(routes);
            }
        }
        self.try_node_mut(id)?.add_chain(chain);
        Ok(())
    }
}
