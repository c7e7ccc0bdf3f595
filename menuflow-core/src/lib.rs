//! # menuflow-core
//!
//! A trigger menu decision-flow compiler: turns a declarative list of chains
//! into one executable graph of filter, reconstruction and hypothesis nodes,
//! sharing every identical piece of work across chains.
//!
//! ## Core Components
//!
//! - **Menu**: chains, their steps and the sequences each step runs
//! - **Compiler**: the phase state machine producing a [`CompiledMenu`]
//! - **Node registry**: reuse-or-conflict registration of named nodes
//! - **Hypo**: per-leg predicates and multi-leg combination logic
//! - **Emulation**: run a compiled menu over one synthetic event
//!
//! ## Example
//!
//! ```rust,ignore
//! use menuflow_core::{compile, Menu};
//!
//! let menu = Menu::from_file("menu.json")?;
//! let compiled = compile(&menu)?;
//!
//! println!("{} nodes, {} shared", compiled.nodes.len(), compiled.stats.shared);
//! for chain in &compiled.chains {
//!     println!("{} -> {}", chain.name, chain.terminal);
//! }
//! ```

// Self-alias for derive macro support within the crate
extern crate self as menuflow_core;

pub mod compiler;
pub mod config;
pub mod emulate;
pub mod error;
pub mod hypo;
pub mod menu;
pub mod naming;
pub mod node;
pub mod params;
pub mod visualize;

// Re-exports for convenience
pub use compiler::{
    compile, ChainFlow, CompiledMenu, DataEdge, Layer, MenuCompiler, OccupancyTable, Phase,
    RecoLane, ScheduledLayer, StepDecision, StepGraph,
};
pub use config::{CompilerConfig, NamingConfig};
pub use emulate::{EmulationOutcome, Event, EventEmulator};
pub use error::{Error, Result};
pub use hypo::{
    evaluate_combo, evaluate_hypo, AttachedTool, Candidate, CandidateId, ComboRequirement, Cut,
    Decisions, HypoTool, LegMatching,
};
pub use menu::{
    AlgorithmSpec, Chain, ChainStep, HypoAlgSpec, Menu, MenuSequence, SequenceRef, StepLeg,
};
pub use naming::{DatasetNamespace, Key, KeySet};
pub use node::{
    AlgNode, Bindings, CompilationContext, FinalDecision, NodeId, NodeRequest, Registration,
    RegistryStats,
};
pub use params::{
    ComboParams, FilterParams, HypoParams, InputMakerParams, NodeKind, NodeParams, ParamEntry,
    ParameterSet, Properties, PropertyValue, RecoParams, SummaryParams,
};
pub use visualize::{DotConfig, DotWriter, GraphVisitor};
