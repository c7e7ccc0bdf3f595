//! Hypothesis and combo evaluation.
//!
//! Hypo nodes decide, per chain leg, which candidates pass; combo nodes then
//! decide, per chain, whether enough legs passed. Decisions are tagged with
//! decision ids: the chain name for single-leg chains, `legNNN_<chain>` for
//! each leg of a multi-leg chain.

mod combo;
mod tool;

pub use combo::{evaluate_combo, satisfied_legs, ComboRequirement, LegMatching};
pub use tool::{
    chain_of, evaluate_hypo, has_leg_prefix, leg_id, AttachedTool, Candidate, CandidateId, Cut,
    Decisions, HypoTool,
};
