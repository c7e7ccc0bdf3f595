//! Property-based tests for the decision-flow compiler using proptest.
//!
//! Random menus draw every step's sequence from a pool private to that step
//! index, so they always compile. The tests verify that:
//!
//! - Compilation is deterministic down to the serialized form
//! - Each chain's filter reads exactly what its previous step decided
//! - Shared nodes exist once and carry every chain that uses them
//! - A redefined sequence always aborts compilation

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashSet};

    use crate::compiler::fixtures::{key, pt_tool, sequence, step};
    use crate::compiler::{compile, CompiledMenu};
    use crate::error::Error;
    use crate::menu::{Chain, ChainStep, Menu, StepLeg};
    use crate::naming::Key;
    use crate::params::NodeKind;

    const SEEDS: [&str; 3] = ["L1MU6", "L1MU10", "L1EM10"];
    const STEPS: usize = 3;
    const POOL: usize = 3;

    fn pool_sequence(step: usize, k: usize) -> String {
        format!("s{}_{}", step, k)
    }

    // (seed, per-step sequence choice or empty step, threshold)
    fn chain_shape() -> impl Strategy<Value = (usize, Vec<Option<usize>>, f64)> {
        (
            0..SEEDS.len(),
            prop::collection::vec(prop::option::weighted(0.85, 0..POOL), 1..=STEPS),
            1.0f64..20.0,
        )
    }

    fn build_menu(specs: Vec<(usize, Vec<Option<usize>>, f64)>) -> Menu {
        let mut menu = Menu::new("random");
        for i in 0..STEPS {
            for k in 0..POOL {
                menu = menu.with_sequence(sequence(&pool_sequence(i, k)));
            }
        }
        for (c, (seed, choices, threshold)) in specs.into_iter().enumerate() {
            let steps = choices
                .iter()
                .enumerate()
                .map(|(i, choice)| match choice {
                    Some(k) => step(&pool_sequence(i, *k), threshold),
                    None => ChainStep::empty(format!("empty{}", i)).unwrap(),
                })
                .collect();
            let chain = Chain::new(format!("HLT_c{}", c), vec![key(SEEDS[seed])], steps).unwrap();
            menu = menu.with_chain(chain);
        }
        menu
    }

    fn menu_strategy() -> impl Strategy<Value = Menu> {
        prop::collection::vec(chain_shape(), 1..8).prop_map(build_menu)
    }

    fn decisions_at(compiled: &CompiledMenu, step: usize, with_next: bool) -> BTreeSet<Key> {
        compiled
            .chains
            .iter()
            .filter(|c| !with_next || c.steps.len() > step + 1)
            .filter_map(|c| c.steps.get(step))
            .flat_map(|s| s.decisions.iter().cloned())
            .collect()
    }

    proptest! {
        /// Two compilations of one menu are identical, fingerprint included.
        #[test]
        fn compilation_is_deterministic(menu in menu_strategy()) {
            let first = compile(&menu).unwrap();
            let second = compile(&menu).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
        }

        /// A chain's filter input at step i is its decision set at step i - 1,
        /// or its seeds at step 0.
        #[test]
        fn decisions_propagate(menu in menu_strategy()) {
            let compiled = compile(&menu).unwrap();
            for flow in &compiled.chains {
                prop_assert_eq!(&flow.steps[0].filter_inputs, &flow.seeds);
                for pair in flow.steps.windows(2) {
                    prop_assert_eq!(&pair[1].filter_inputs, &pair[0].decisions);
                }
                for decision in &flow.steps {
                    let filter = compiled.node(decision.filter).unwrap();
                    for input in &decision.filter_inputs {
                        prop_assert!(filter.inputs.contains(input));
                    }
                }
            }
        }

        /// Filters at step i + 1 read exactly the union of the step i decisions
        /// of chains that continue.
        #[test]
        fn next_step_reads_union_of_decisions(menu in menu_strategy()) {
            let compiled = compile(&menu).unwrap();
            for step in compiled.steps.iter().skip(1) {
                let read: BTreeSet<Key> = step
                    .filters
                    .iter()
                    .flat_map(|id| compiled.node(*id).unwrap().inputs.iter().cloned())
                    .collect();
                prop_assert_eq!(read, decisions_at(&compiled, step.index - 1, true));
            }
        }

        /// Names and output keys are unique; every sequence used at a step has
        /// one input maker carrying each chain that uses it.
        #[test]
        fn shared_nodes_are_unique(menu in menu_strategy()) {
            let compiled = compile(&menu).unwrap();

            let mut names = HashSet::new();
            let mut outputs = HashSet::new();
            for node in &compiled.nodes {
                prop_assert!(names.insert(node.name.clone()), "duplicate node {}", node.name);
                for key in &node.outputs {
                    prop_assert!(outputs.insert(key.clone()), "key {} written twice", key);
                }
                prop_assert!(!node.chains.is_empty());
            }

            for step in &compiled.occupancy.steps {
                for seq in &step.sequences {
                    let im = compiled.node_by_name(&format!("IM_{}", seq.sequence)).unwrap();
                    prop_assert_eq!(im.kind(), NodeKind::InputMaker);
                    for chain in &seq.chains {
                        prop_assert!(im.has_chain(chain));
                    }
                    let hypo = compiled.node_by_name(&format!("{}Hypo", seq.sequence)).unwrap();
                    let tool_chains: BTreeSet<&str> =
                        hypo.tools().iter().map(|t| t.chain.as_str()).collect();
                    for chain in &seq.chains {
                        prop_assert!(tool_chains.contains(chain.as_str()));
                    }
                }
            }
        }

        /// Redefining a catalogued sequence with another shape never compiles.
        #[test]
        fn redefinition_always_conflicts(menu in menu_strategy(), k in 0..POOL) {
            let name = pool_sequence(0, k);
            let mut clash = sequence(&name);
            clash.reco[0].alg_type = "ShadowRecoAlg".into();
            let clash_chain = Chain::new(
                "HLT_clash",
                vec![key("L1MU6")],
                vec![ChainStep::single(StepLeg::new(clash, pt_tool(1.0)))],
            )
            .unwrap();
            let menu = menu.with_chain(clash_chain);
            let is_conflict = matches!(compile(&menu), Err(Error::ConfigurationConflict { .. }));
            prop_assert!(is_conflict);
        }
    }
}
