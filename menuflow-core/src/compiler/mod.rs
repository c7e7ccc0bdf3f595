//! Decision-flow compiler.
//!
//! Turns a [`Menu`](crate::menu::Menu) into a [`CompiledMenu`]: per step
//! index, a layer of filters, a layer of reconstruction lanes and a layer of
//! hypo and combo nodes, chained step after step and closed by a summary
//! node writing one terminal key per chain.
//!
//! ## Core Concepts
//!
//! - **Filter sharing**: chains reaching the same step with the same decision
//!   keys share one filter
//! - **Sequence sharing**: identical input makers, reconstruction algorithms
//!   and hypos are instantiated once; every chain using them is attached
//! - **Decision propagation**: a chain's filter at step `i + 1` reads exactly
//!   the decision keys its step `i` wrote
//!
//! ## Example
//!
//! ```rust,ignore
//! use menuflow_core::{CompilerConfig, Menu, MenuCompiler};
//!
//! let menu = Menu::from_file("menu.json")?;
//! let compiled = MenuCompiler::new(CompilerConfig::default()).compile(&menu)?;
//! for layer in compiled.schedule() {
//!     println!("{:?} {} {:?}", layer.step, layer.layer, layer.nodes);
//! }
//! print!("{}", compiled.occupancy.render());
//! ```

mod cf_sequence;
mod graph;
mod occupancy;
mod phases;

#[cfg(test)]
pub(crate) mod fixtures;
mod proptest;

pub use graph::{
    ChainFlow, CompiledMenu, DataEdge, Layer, RecoLane, ScheduledLayer, StepDecision, StepGraph,
};
pub use occupancy::{FilterOccupancy, OccupancyTable, SequenceOccupancy, StepOccupancy};
pub use phases::{MenuCompiler, Phase};

use crate::error::Result;
use crate::menu::Menu;

/// Compile a menu with the default configuration.
pub fn compile(menu: &Menu) -> Result<CompiledMenu> {
    MenuCompiler::default().compile(menu)
}
