//! Algorithm nodes and the per-compilation node registry.
//!
//! ## Core Concepts
//!
//! - **AlgNode**: one node of the compiled graph: filter, input maker,
//!   reconstruction algorithm, hypo, combo or summary
//! - **CompilationContext**: arena plus name lookup; registering a name twice
//!   reuses the node when parameters match and fails when they do not
//! - **Bindings**: the additive, kind-specific state (filter routes, hypo
//!   tools, combo requirements) that grows as chains attach

mod filter;
mod registry;
mod types;

pub use registry::{CompilationContext, Registration, RegistryStats};
pub use types::{AlgNode, Bindings, FinalDecision, NodeId, NodeRequest};
