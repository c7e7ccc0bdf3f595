//! Read-only traversal and DOT export of compiled menus.
//!
//! Rendering never touches compilation: it walks a finished
//! [`CompiledMenu`] through the [`GraphVisitor`] trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use menuflow_core::visualize::DotConfig;
//!
//! let compiled = menuflow_core::compile(&menu)?;
//!
//! // Whole menu, one cluster per step
//! let dot = compiled.to_dot();
//!
//! // A single step, left to right
//! let step2 = compiled.step_to_dot(1, &DotConfig::left_to_right());
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use crate::compiler::{CompiledMenu, DataEdge, Layer, StepGraph};
use crate::error::Result;
use crate::node::{AlgNode, NodeId};
use crate::params::NodeKind;

/// Visitor over a compiled menu, called in execution order.
///
/// Every method has an empty default so visitors implement only what they
/// need.
pub trait GraphVisitor {
    fn begin_step(&mut self, _step: &StepGraph) {}

    fn visit_node(&mut self, _node: &AlgNode, _layer: Layer) {}

    fn end_step(&mut self, _step: &StepGraph) {}

    fn visit_summary(&mut self, _node: &AlgNode) {}

    fn visit_edge(&mut self, _edge: &DataEdge) {}
}

impl CompiledMenu {
    /// Walk every step, the summary, then every data edge.
    pub fn accept<V: GraphVisitor>(&self, visitor: &mut V) {
        for step in &self.steps {
            self.walk_step(step, visitor);
        }
        if let Some(summary) = self.node(self.summary) {
            visitor.visit_summary(summary);
        }
        for edge in self.data_edges() {
            visitor.visit_edge(&edge);
        }
    }

    /// Walk one step and the data edges internal to it.
    ///
    /// Returns `false` when the step index does not exist.
    pub fn accept_step<V: GraphVisitor>(&self, index: usize, visitor: &mut V) -> bool {
        let Some(step) = self.steps.get(index) else {
            return false;
        };
        self.walk_step(step, visitor);
        let members: HashSet<NodeId> = step.nodes().into_iter().collect();
        for edge in self.data_edges() {
            if members.contains(&edge.from) && members.contains(&edge.to) {
                visitor.visit_edge(&edge);
            }
        }
        true
    }

    fn walk_step<V: GraphVisitor>(&self, step: &StepGraph, visitor: &mut V) {
        visitor.begin_step(step);
        let layers = [
            (Layer::Filter, step.filters.clone()),
            (Layer::Reco, step.reco_nodes().collect::<Vec<_>>()),
            (Layer::Hypo, step.hypos.clone()),
            (Layer::Combo, step.combos.clone()),
        ];
        for (layer, ids) in layers {
            for id in ids {
                if let Some(node) = self.node(id) {
                    visitor.visit_node(node, layer);
                }
            }
        }
        visitor.end_step(step);
    }

    /// Export to Graphviz DOT with the default configuration.
    pub fn to_dot(&self) -> String {
        self.to_dot_with_config(&DotConfig::default())
    }

    pub fn to_dot_with_config(&self, config: &DotConfig) -> String {
        let mut writer = DotWriter::new(config, &self.name);
        self.accept(&mut writer);
        writer.finish()
    }

    /// Export a single step, or `None` for an unknown step index.
    pub fn step_to_dot(&self, index: usize, config: &DotConfig) -> Option<String> {
        let label = self.steps.get(index)?.label.clone();
        let mut writer = DotWriter::new(config, &format!("{}_{}", self.name, label));
        self.accept_step(index, &mut writer).then(|| writer.finish())
    }

    /// Write the whole-menu DOT export to a file.
    pub fn write_dot(&self, path: impl AsRef<Path>, config: &DotConfig) -> Result<()> {
        std::fs::write(path, self.to_dot_with_config(config))?;
        Ok(())
    }
}

/// DOT export configuration.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Graph direction: "TB" (top-bottom), "LR" (left-right), etc.
    pub rankdir: String,
    pub filled_nodes: bool,
    pub font_name: String,
    pub font_size: u32,
    /// Draw each step as a cluster.
    pub cluster_steps: bool,
    /// Label edges with the key they carry.
    pub edge_keys: bool,
    pub node_colors: HashMap<NodeKind, String>,
}

impl Default for DotConfig {
    fn default() -> Self {
        let mut node_colors = HashMap::new();
        node_colors.insert(NodeKind::Filter, "#FFD700".to_string());
        node_colors.insert(NodeKind::InputMaker, "#87CEEB".to_string());
        node_colors.insert(NodeKind::Reco, "#DDA0DD".to_string());
        node_colors.insert(NodeKind::Hypo, "#90EE90".to_string());
        node_colors.insert(NodeKind::Combo, "#98FB98".to_string());
        node_colors.insert(NodeKind::Summary, "#F0E68C".to_string());

        Self {
            rankdir: "TB".to_string(),
            filled_nodes: true,
            font_name: "Helvetica".to_string(),
            font_size: 12,
            cluster_steps: true,
            edge_keys: true,
            node_colors,
        }
    }
}

impl DotConfig {
    /// Create a left-to-right layout.
    pub fn left_to_right() -> Self {
        Self {
            rankdir: "LR".to_string(),
            ..Default::default()
        }
    }

    /// Flat layout without step clusters or edge labels.
    pub fn compact() -> Self {
        Self {
            cluster_steps: false,
            edge_keys: false,
            ..Default::default()
        }
    }
}

/// [`GraphVisitor`] accumulating DOT text.
pub struct DotWriter<'c> {
    config: &'c DotConfig,
    out: String,
    indent: &'static str,
}

impl<'c> DotWriter<'c> {
    pub fn new(config: &'c DotConfig, name: &str) -> Self {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape_dot_string(name));
        let _ = writeln!(out, "    rankdir={};", config.rankdir);
        let _ = write!(
            out,
            "    node [fontname=\"{}\", fontsize={}",
            config.font_name, config.font_size
        );
        if config.filled_nodes {
            out.push_str(", style=filled");
        }
        out.push_str("];\n");
        let _ = writeln!(
            out,
            "    edge [fontname=\"{}\", fontsize={}];",
            config.font_name,
            config.font_size.saturating_sub(2)
        );
        out.push('\n');
        Self {
            config,
            out,
            indent: "    ",
        }
    }

    pub fn finish(mut self) -> String {
        self.out.push_str("}\n");
        self.out
    }

    fn node_line(&mut self, node: &AlgNode, extra: &str) {
        let kind = node.kind();
        let color = self
            .config
            .node_colors
            .get(&kind)
            .map(|s| s.as_str())
            .unwrap_or("#FFFFFF");
        let _ = writeln!(
            self.out,
            "{}{} [label=\"{}\\n({})\", shape={}, fillcolor=\"{}\"{}];",
            self.indent,
            node.id,
            escape_dot_string(&node.name),
            kind,
            kind_to_dot_shape(kind),
            color,
            extra
        );
    }
}

impl GraphVisitor for DotWriter<'_> {
    fn begin_step(&mut self, step: &StepGraph) {
        if self.config.cluster_steps {
            let _ = writeln!(self.out, "    subgraph cluster_step{} {{", step.index);
            let _ = writeln!(self.out, "        label=\"{}\";", escape_dot_string(&step.label));
            self.indent = "        ";
        }
    }

    fn visit_node(&mut self, node: &AlgNode, _layer: Layer) {
        self.node_line(node, "");
    }

    fn end_step(&mut self, _step: &StepGraph) {
        if self.config.cluster_steps {
            self.out.push_str("    }\n");
            self.indent = "    ";
        }
    }

    fn visit_summary(&mut self, node: &AlgNode) {
        self.node_line(node, ", penwidth=3");
    }

    fn visit_edge(&mut self, edge: &DataEdge) {
        if self.config.edge_keys {
            let _ = writeln!(
                self.out,
                "    {} -> {} [label=\"{}\"];",
                edge.from,
                edge.to,
                escape_dot_string(edge.key.as_str())
            );
        } else {
            let _ = writeln!(self.out, "    {} -> {};", edge.from, edge.to);
        }
    }
}

fn escape_dot_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn kind_to_dot_shape(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Filter => "invtrapezium",
        NodeKind::InputMaker => "box",
        NodeKind::Reco => "ellipse",
        NodeKind::Hypo => "diamond",
        NodeKind::Combo => "hexagon",
        NodeKind::Summary => "doubleoctagon",
    }
}
