//! Menu builders shared by the compiler, visualizer and emulator tests.

use crate::hypo::{Cut, HypoTool};
use crate::menu::{AlgorithmSpec, Chain, ChainStep, HypoAlgSpec, MenuSequence, StepLeg};
use crate::naming::Key;

pub fn key(name: &str) -> Key {
    Key::new(name).unwrap()
}

/// Reconstruction output key of a fixture sequence.
pub fn feature_key(sequence: &str) -> Key {
    key(&format!("HLT_{}_features", sequence))
}

/// Sequence with one reconstruction algorithm reading its RoIs and a hypo
/// cutting on what that algorithm writes.
pub fn sequence(name: &str) -> MenuSequence {
    let roi = key(&format!("HLT_RoIs_{}", name));
    let reco = AlgorithmSpec::new(format!("{}Reco", name), "RecoAlg")
        .unwrap()
        .with_input(roi.clone())
        .with_output(feature_key(name));
    let hypo = HypoAlgSpec::new(format!("{}Hypo", name), "HypoAlg", feature_key(name)).unwrap();
    MenuSequence::new(name, roi, hypo).unwrap().with_reco(reco)
}

pub fn pt_tool(threshold: f64) -> HypoTool {
    HypoTool::default().with_cut(Cut::min("pt", threshold))
}

/// Single-leg step running a catalogued sequence.
pub fn step(sequence: &str, threshold: f64) -> ChainStep {
    ChainStep::single(StepLeg::named(sequence, pt_tool(threshold)))
}

/// Single-leg chain running `sequences` in order.
pub fn chain(name: &str, seed: &str, sequences: &[&str], threshold: f64) -> Chain {
    Chain::new(
        name,
        vec![key(seed)],
        sequences.iter().map(|s| step(s, threshold)).collect(),
    )
    .unwrap()
}

/// Two-leg chain requiring `multiplicity` legs at every step.
pub fn two_leg_chain(
    name: &str,
    seeds: [&str; 2],
    steps: &[(&str, [&str; 2])],
    multiplicity: usize,
) -> Chain {
    let steps = steps
        .iter()
        .map(|(step_name, seqs)| {
            ChainStep::new(
                *step_name,
                seqs.iter()
                    .map(|s| StepLeg::named(*s, pt_tool(5.0)))
                    .collect(),
                multiplicity,
            )
            .unwrap()
        })
        .collect();
    Chain::new(name, seeds.iter().map(|s| key(s)).collect(), steps).unwrap()
}
