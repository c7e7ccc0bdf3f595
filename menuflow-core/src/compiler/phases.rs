//! The compiler's phase state machine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, instrument, warn};

use super::cf_sequence::CFSequence;
use super::graph::{ChainFlow, CompiledMenu, Layer, RecoLane, StepDecision, StepGraph};
use super::occupancy::OccupancyTable;
use crate::config::CompilerConfig;
use crate::error::{Error, Result};
use crate::hypo::{leg_id, AttachedTool, ComboRequirement};
use crate::menu::{Chain, ChainStep, Menu, MenuSequence, SequenceRef, StepLeg};
use crate::naming::{DatasetNamespace, Key, KeySet};
use crate::node::{Bindings, CompilationContext, FinalDecision, NodeId, NodeRequest};
use crate::params::{ComboParams, FilterParams, InputMakerParams, NodeParams, SummaryParams};

const SUMMARY_ALG_TYPE: &str = "DecisionSummaryMakerAlg";

/// Phase of one compilation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Validate chains, index sequences, count steps.
    CollectSteps,
    /// Create or merge the filters of a step index.
    BuildFilters(usize),
    /// Register input makers and reconstruction algorithms.
    BuildReco(usize),
    /// Register hypo and combo nodes and attach chain requirements.
    BuildHypos(usize),
    /// Assemble step graphs and check data-flow order.
    Link,
    /// Create the summary node and the occupancy table.
    Finalize,
    Done,
}

impl Phase {
    /// The phase after this one in a menu with `steps` step indices.
    pub fn next(&self, steps: usize) -> Option<Self> {
        match *self {
            Self::CollectSteps if steps == 0 => Some(Self::Link),
            Self::CollectSteps => Some(Self::BuildFilters(0)),
            Self::BuildFilters(i) => Some(Self::BuildReco(i)),
            Self::BuildReco(i) => Some(Self::BuildHypos(i)),
            Self::BuildHypos(i) if i + 1 < steps => Some(Self::BuildFilters(i + 1)),
            Self::BuildHypos(_) => Some(Self::Link),
            Self::Link => Some(Self::Finalize),
            Self::Finalize => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CollectSteps => write!(f, "CollectSteps"),
            Self::BuildFilters(i) => write!(f, "BuildFilters({})", i),
            Self::BuildReco(i) => write!(f, "BuildReco({})", i),
            Self::BuildHypos(i) => write!(f, "BuildHypos({})", i),
            Self::Link => write!(f, "Link"),
            Self::Finalize => write!(f, "Finalize"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Compiles menus into decision-flow graphs.
///
/// Stateless between runs: every call to [`MenuCompiler::compile`] starts
/// from an empty node registry.
#[derive(Debug, Clone, Default)]
pub struct MenuCompiler {
    config: CompilerConfig,
}

impl MenuCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile a menu. Any error aborts the whole run.
    #[instrument(skip(self, menu), fields(menu = %menu.name, chains = menu.chains.len()))]
    pub fn compile(&self, menu: &Menu) -> Result<CompiledMenu> {
        self.config.validate()?;
        menu.validate()?;
        let compiled = CompilationRun::new(&self.config, menu).run()?;
        info!(
            nodes = compiled.nodes.len(),
            steps = compiled.steps.len(),
            shared = compiled.stats.shared,
            "Compiled menu"
        );
        Ok(compiled)
    }
}

/// Per-chain progress through the step loop.
struct ChainState<'m> {
    chain: &'m Chain,
    /// Keys the next filter reads, one per leg.
    current: Vec<Key>,
    /// Filter outputs at the step being built, one per leg.
    routed: Vec<Key>,
    /// Index of the chain's CFSequence at the step being built.
    cf: usize,
    steps: Vec<StepDecision>,
}

struct CompilationRun<'a, 'm> {
    config: &'a CompilerConfig,
    menu: &'m Menu,
    ns: DatasetNamespace,
    ctx: CompilationContext,
    phase: Phase,
    nsteps: usize,
    sequences: HashMap<&'m str, &'m MenuSequence>,
    chains: Vec<ChainState<'m>>,
    cf_sequences: Vec<Vec<CFSequence>>,
    lanes: Vec<Vec<RecoLane>>,
    steps: Vec<StepGraph>,
}

impl<'a, 'm> CompilationRun<'a, 'm> {
    fn new(config: &'a CompilerConfig, menu: &'m Menu) -> Self {
        Self {
            config,
            menu,
            ns: DatasetNamespace::new(config.naming.clone()),
            ctx: CompilationContext::new(),
            phase: Phase::CollectSteps,
            nsteps: 0,
            sequences: HashMap::new(),
            chains: Vec::new(),
            cf_sequences: Vec::new(),
            lanes: Vec::new(),
            steps: Vec::new(),
        }
    }

    fn run(mut self) -> Result<CompiledMenu> {
        self.collect_steps()?;
        for i in 0..self.nsteps {
            self.advance(Phase::BuildFilters(i))?;
            self.build_filters(i)?;
            self.advance(Phase::BuildReco(i))?;
            self.build_reco(i)?;
            self.advance(Phase::BuildHypos(i))?;
            self.build_hypos(i)?;
        }
        self.advance(Phase::Link)?;
        self.link()?;
        self.advance(Phase::Finalize)?;
        let compiled = self.finalize()?;
        Ok(compiled)
    }

    fn advance(&mut self, to: Phase) -> Result<()> {
        if self.phase.next(self.nsteps) != Some(to) {
            return Err(Error::Internal(format!(
                "illegal phase transition {} -> {}",
                self.phase, to
            )));
        }
        debug!(from = %self.phase, to = %to, "Phase transition");
        self.phase = to;
        Ok(())
    }

    fn collect_steps(&mut self) -> Result<()> {
        let menu = self.menu;
        let mut names = HashSet::new();
        for chain in &menu.chains {
            if !names.insert(chain.name()) {
                return Err(Error::conflict(chain.name(), "chain declared twice"));
            }
        }

        for sequence in &menu.sequences {
            self.index_sequence(sequence)?;
        }
        for chain in &menu.chains {
            for step in chain.steps() {
                for leg in step.legs() {
                    if let SequenceRef::Inline(sequence) = &leg.sequence {
                        self.index_sequence(sequence)?;
                    }
                }
            }
        }

        for chain in &menu.chains {
            for step in chain.steps() {
                for leg in step.legs() {
                    self.resolve(chain, step, leg)?;
                }
            }
            if chain.steps().is_empty() {
                warn!(chain = chain.name(), "Chain has no steps; seeds are its final decisions");
            }
            self.chains.push(ChainState {
                chain,
                current: chain.seeds().to_vec(),
                routed: Vec::new(),
                cf: 0,
                steps: Vec::new(),
            });
        }

        self.nsteps = menu
            .chains
            .iter()
            .map(|c| c.steps().len())
            .max()
            .unwrap_or(0);
        debug!(
            steps = self.nsteps,
            sequences = self.sequences.len(),
            "Collected steps"
        );
        Ok(())
    }

    fn index_sequence(&mut self, sequence: &'m MenuSequence) -> Result<()> {
        match self.sequences.get(sequence.name.as_str()) {
            Some(existing) if *existing != sequence => Err(Error::conflict(
                &sequence.name,
                "sequence defined twice with different content",
            )),
            Some(_) => Ok(()),
            None => {
                self.sequences.insert(&sequence.name, sequence);
                Ok(())
            }
        }
    }

    fn resolve(&self, chain: &Chain, step: &ChainStep, leg: &'m StepLeg) -> Result<&'m MenuSequence> {
        match &leg.sequence {
            SequenceRef::Inline(sequence) => Ok(&**sequence),
            SequenceRef::Named(name) => self
                .sequences
                .get(name.as_str())
                .copied()
                .ok_or_else(|| Error::orphan_chain(chain.name(), step.name(), name)),
        }
    }

    fn build_filters(&mut self, i: usize) -> Result<()> {
        let mut cfs: Vec<CFSequence> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for state in &mut self.chains {
            let chain = state.chain;
            let Some(step) = chain.step(i) else {
                continue;
            };
            let inputs: KeySet = state.current.iter().cloned().collect();
            let name = self.ns.filter_name(i, step.name(), &inputs);
            let params = FilterParams {
                step: i,
                step_name: step.name().to_string(),
                sequences: step.sequence_names(),
            };

            let index = match by_name.get(&name) {
                Some(&index) => {
                    self.ctx
                        .merge_filter(&self.ns, cfs[index].filter, &params, &inputs, chain.name())?;
                    index
                }
                None => {
                    let id = self
                        .ctx
                        .create_filter(&self.ns, &name, params, &inputs, chain.name())?;
                    cfs.push(CFSequence::new(id, &name));
                    by_name.insert(name.clone(), cfs.len() - 1);
                    cfs.len() - 1
                }
            };

            cfs[index].add_chain(chain.name());
            state.routed = state
                .current
                .iter()
                .map(|input| self.ns.filter_output(&name, input))
                .collect();
            state.cf = index;
        }

        debug!(step = i, filters = cfs.len(), "Built filters");
        self.cf_sequences.push(cfs);
        Ok(())
    }

    fn build_reco(&mut self, i: usize) -> Result<()> {
        let mut lanes: Vec<RecoLane> = Vec::new();
        let mut scheduled: HashSet<NodeId> = HashSet::new();

        for c in 0..self.chains.len() {
            let chain = self.chains[c].chain;
            let Some(step) = chain.step(i) else {
                continue;
            };
            let cf = self.chains[c].cf;
            if step.is_empty() {
                self.cf_sequences[i][cf].add_pass_through(chain.name());
                continue;
            }

            for (j, leg) in step.legs().iter().enumerate() {
                let sequence = self.resolve(chain, step, leg)?;
                let routed = leg_key(&self.chains[c].routed, j, chain)?;
                let mut lane = Vec::new();

                let im = NodeRequest::new(
                    self.ns.input_maker_name(&sequence.name),
                    Some(i),
                    NodeParams::InputMaker(InputMakerParams {
                        sequence: sequence.name.clone(),
                        alg_type: sequence.input_maker_type.clone(),
                        roi_key: sequence.roi_key.clone(),
                    }),
                )
                .with_inputs([routed])
                .with_outputs([
                    self.ns.input_maker_output(&sequence.name),
                    sequence.roi_key.clone(),
                ]);
                lane.push(self.register_for(im, chain.name())?);

                for alg in &sequence.reco {
                    let request = NodeRequest::new(&alg.name, Some(i), NodeParams::Reco(alg.params()))
                        .with_inputs(alg.inputs.iter().cloned())
                        .with_outputs(alg.outputs.iter().cloned());
                    lane.push(self.register_for(request, chain.name())?);
                }

                self.cf_sequences[i][cf].add_sequence(&sequence.name, chain.name());
                lane.retain(|id| scheduled.insert(*id));
                if !lane.is_empty() {
                    lanes.push(RecoLane {
                        sequence: sequence.name.clone(),
                        nodes: lane,
                    });
                }
            }
        }

        debug!(step = i, lanes = lanes.len(), "Built reconstruction");
        self.lanes.push(lanes);
        Ok(())
    }

    fn build_hypos(&mut self, i: usize) -> Result<()> {
        for c in 0..self.chains.len() {
            let chain = self.chains[c].chain;
            let Some(step) = chain.step(i) else {
                continue;
            };
            let cf = self.chains[c].cf;

            let decisions = if step.is_empty() {
                self.chains[c].routed.clone()
            } else {
                let legs = step.legs().len();
                let mut leg_decisions = Vec::with_capacity(legs);
                for (j, leg) in step.legs().iter().enumerate() {
                    let sequence = self.resolve(chain, step, leg)?;
                    let hypo = &sequence.hypo;
                    let im_out = self.ns.input_maker_output(&sequence.name);
                    let hypo_out = self.ns.hypo_output(&hypo.name);
                    let request = NodeRequest::new(
                        &hypo.name,
                        Some(i),
                        NodeParams::Hypo(hypo.params(&sequence.name, im_out.clone())),
                    )
                    .with_inputs([im_out, hypo.feature_key.clone()])
                    .with_outputs([hypo_out.clone()])
                    .with_bindings(Bindings::Hypo { tools: Vec::new() });
                    let id = self.register_for(request, chain.name())?;
                    self.attach_tool(
                        id,
                        AttachedTool {
                            id: leg_id(chain.name(), j, legs),
                            chain: chain.name().to_string(),
                            leg: j,
                            tool: leg.hypo_tool.clone(),
                        },
                    )?;
                    leg_decisions.push(hypo_out);
                }

                if step.is_combo() {
                    self.build_combo(i, chain, step, leg_decisions)?
                } else {
                    leg_decisions
                }
            };

            self.cf_sequences[i][cf].add_decisions(&decisions);
            let state = &mut self.chains[c];
            state.steps.push(StepDecision {
                step: i,
                filter: self.cf_sequences[i][cf].filter,
                filter_inputs: std::mem::replace(&mut state.current, decisions.clone()),
                decisions,
            });
        }
        Ok(())
    }

    fn build_combo(
        &mut self,
        i: usize,
        chain: &Chain,
        step: &ChainStep,
        legs: Vec<Key>,
    ) -> Result<Vec<Key>> {
        let name = self.ns.combo_name(i, step.name());
        let outputs: Vec<Key> = (0..legs.len())
            .map(|leg| self.ns.combo_output(&name, leg))
            .collect();
        let request = NodeRequest::new(
            &name,
            Some(i),
            NodeParams::Combo(ComboParams {
                step: i,
                step_name: step.name().to_string(),
                legs: legs.clone(),
                matching: step.matching(),
            }),
        )
        .with_inputs(legs.iter().cloned())
        .with_outputs(outputs.iter().cloned())
        .with_bindings(Bindings::Combo {
            requirements: BTreeMap::new(),
        });
        let id = self.register_for(request, chain.name())?;

        if let Bindings::Combo { requirements } = &mut self.ctx.try_node_mut(id)?.bindings {
            requirements.insert(
                chain.name().to_string(),
                ComboRequirement {
                    required: step.multiplicity(),
                    legs: legs.len(),
                },
            );
        }
        Ok(outputs)
    }

    fn register_for(&mut self, request: NodeRequest, chain: &str) -> Result<NodeId> {
        let id = self.ctx.register(request)?.id();
        self.ctx.try_node_mut(id)?.add_chain(chain);
        Ok(id)
    }

    fn attach_tool(&mut self, id: NodeId, tool: AttachedTool) -> Result<()> {
        let node = self.ctx.try_node_mut(id)?;
        let name = node.name.clone();
        let Bindings::Hypo { tools } = &mut node.bindings else {
            return Err(Error::Internal(format!("'{}' has no hypo tools", name)));
        };
        match tools.iter().find(|t| t.id == tool.id) {
            Some(existing) if existing.tool != tool.tool => Err(Error::conflict(
                name,
                format!("hypo tool '{}' attached twice with different cuts", tool.id),
            )),
            Some(_) => Ok(()),
            None => {
                tools.push(tool);
                Ok(())
            }
        }
    }

    fn link(&mut self) -> Result<()> {
        let cf_sequences = std::mem::take(&mut self.cf_sequences);
        let lanes = std::mem::take(&mut self.lanes);

        for (i, (cfs, reco)) in cf_sequences.iter().zip(lanes).enumerate() {
            let mut hypos = Vec::new();
            let mut combos = Vec::new();
            for node in self.ctx.nodes() {
                if node.step != Some(i) {
                    continue;
                }
                match node.params {
                    NodeParams::Hypo(_) => hypos.push(node.id),
                    NodeParams::Combo(_) => combos.push(node.id),
                    _ => {}
                }
            }
            self.steps.push(StepGraph {
                index: i,
                label: self.ns.step_label(i),
                filters: cfs.iter().map(|cf| cf.filter).collect(),
                reco,
                hypos,
                combos,
            });
        }
        self.cf_sequences = cf_sequences;

        if self.config.validate_data_flow {
            self.check_data_flow()?;
        }
        Ok(())
    }

    /// Every key read inside the graph must be written by an earlier layer,
    /// or by an earlier reconstruction node of the same lane.
    fn check_data_flow(&self) -> Result<()> {
        // (step, layer, lane, position in lane)
        let mut slots: HashMap<NodeId, (usize, Layer, usize, usize)> = HashMap::new();
        for step in &self.steps {
            for &id in &step.filters {
                slots.insert(id, (step.index, Layer::Filter, 0, 0));
            }
            for (lane, reco) in step.reco.iter().enumerate() {
                for (pos, &id) in reco.nodes.iter().enumerate() {
                    slots.insert(id, (step.index, Layer::Reco, lane, pos));
                }
            }
            for &id in &step.hypos {
                slots.insert(id, (step.index, Layer::Hypo, 0, 0));
            }
            for &id in &step.combos {
                slots.insert(id, (step.index, Layer::Combo, 0, 0));
            }
        }

        for node in self.ctx.nodes() {
            let Some(&consumer) = slots.get(&node.id) else {
                continue;
            };
            for key in &node.inputs {
                let Some(producer_id) = self.ctx.producer(key) else {
                    continue;
                };
                let Some(&producer) = slots.get(&producer_id) else {
                    continue;
                };
                let same_reco = producer.0 == consumer.0
                    && producer.1 == Layer::Reco
                    && consumer.1 == Layer::Reco;
                let ordered = (producer.0, producer.1) < (consumer.0, consumer.1)
                    || (same_reco && producer.2 == consumer.2 && producer.3 < consumer.3);
                if !ordered {
                    let writer = self.ctx.try_node(producer_id)?;
                    let place = if same_reco && producer.2 != consumer.2 {
                        "another reco lane".to_string()
                    } else {
                        format!("the {} layer", producer.1)
                    };
                    return Err(Error::conflict(
                        &node.name,
                        format!(
                            "reads '{}' written by '{}' in {} of {}",
                            key,
                            writer.name,
                            place,
                            self.ns.step_label(producer.0)
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn finalize(mut self) -> Result<CompiledMenu> {
        let mut finals = BTreeMap::new();
        let mut inputs = KeySet::new();
        let mut outputs = KeySet::new();
        let mut flows = Vec::with_capacity(self.chains.len());

        for state in self.chains {
            let terminal = self.ns.terminal_key(state.chain.name());
            let flow = ChainFlow {
                name: state.chain.name().to_string(),
                seeds: state.chain.seeds().to_vec(),
                steps: state.steps,
                terminal: terminal.clone(),
            };
            inputs.extend(flow.final_decisions().iter().cloned());
            outputs.insert(terminal.clone());
            finals.insert(
                flow.name.clone(),
                FinalDecision {
                    decisions: flow.final_decisions().to_vec(),
                    terminal,
                },
            );
            flows.push(flow);
        }

        let request = NodeRequest::new(
            self.ns.summary_name(),
            None,
            NodeParams::Summary(SummaryParams {
                alg_type: SUMMARY_ALG_TYPE.to_string(),
            }),
        )
        .with_inputs(inputs)
        .with_outputs(outputs)
        .with_bindings(Bindings::Summary { finals });
        let summary = self.ctx.register(request)?.id();
        let summary_node = self.ctx.try_node_mut(summary)?;
        for flow in &flows {
            summary_node.add_chain(&flow.name);
        }

        let labels: Vec<String> = self.steps.iter().map(|s| s.label.clone()).collect();
        let occupancy = OccupancyTable::from_cf_sequences(&labels, &self.cf_sequences);
        let stats = self.ctx.stats();
        self.phase = self
            .phase
            .next(self.nsteps)
            .ok_or_else(|| Error::Internal("finalize after done".into()))?;
        debug!(phase = %self.phase, "Compilation finished");

        Ok(CompiledMenu {
            name: self.menu.name.clone(),
            nodes: self.ctx.into_nodes(),
            steps: self.steps,
            chains: flows,
            summary,
            occupancy,
            stats,
        })
    }
}

fn leg_key(keys: &[Key], leg: usize, chain: &Chain) -> Result<Key> {
    keys.get(leg).cloned().ok_or_else(|| {
        Error::Internal(format!(
            "chain '{}' has no decision key for leg {}",
            chain.name(),
            leg
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::fixtures::{chain, feature_key, key, pt_tool, sequence, step, two_leg_chain};
    use crate::hypo::LegMatching;
    use crate::params::NodeKind;
    use pretty_assertions::assert_eq;

    fn compile(menu: &Menu) -> Result<CompiledMenu> {
        MenuCompiler::default().compile(menu)
    }

    fn catalog() -> Menu {
        Menu::new("test")
            .with_sequence(sequence("muFast"))
            .with_sequence(sequence("muComb"))
            .with_sequence(sequence("eFast"))
    }

    #[test]
    fn test_phase_order() {
        let mut phase = Phase::CollectSteps;
        let mut seen = vec![phase];
        while let Some(next) = phase.next(2) {
            seen.push(next);
            phase = next;
        }
        assert_eq!(
            seen,
            vec![
                Phase::CollectSteps,
                Phase::BuildFilters(0),
                Phase::BuildReco(0),
                Phase::BuildHypos(0),
                Phase::BuildFilters(1),
                Phase::BuildReco(1),
                Phase::BuildHypos(1),
                Phase::Link,
                Phase::Finalize,
                Phase::Done,
            ]
        );
        assert_eq!(Phase::CollectSteps.next(0), Some(Phase::Link));
    }

    #[test]
    fn test_illegal_transition_is_internal_error() {
        let config = CompilerConfig::default();
        let menu = catalog();
        let mut run = CompilationRun::new(&config, &menu);
        let err = run.advance(Phase::Finalize).unwrap_err();
        assert!(matches!(err, Error::Internal(ref msg) if msg.contains("CollectSteps -> Finalize")));
    }

    #[test]
    fn test_equal_seeds_share_one_filter() {
        let menu = catalog()
            .with_chain(chain("HLT_A", "L1MU6", &["muFast"], 6.0))
            .with_chain(chain("HLT_B", "L1MU6", &["muFast"], 8.0));
        let compiled = compile(&menu).unwrap();

        assert_eq!(compiled.nodes_of_kind(NodeKind::Filter).count(), 1);
        assert_eq!(compiled.nodes_of_kind(NodeKind::InputMaker).count(), 1);
        assert_eq!(compiled.nodes_of_kind(NodeKind::Reco).count(), 1);
        assert_eq!(compiled.nodes_of_kind(NodeKind::Hypo).count(), 1);

        let filter = compiled.nodes_of_kind(NodeKind::Filter).next().unwrap();
        assert_eq!(filter.chains, vec!["HLT_A", "HLT_B"]);
        // sharing a filter never widens its inputs
        assert_eq!(filter.inputs.iter().map(Key::as_str).collect::<Vec<_>>(), vec!["L1MU6"]);

        let hypo = compiled.node_by_name("muFastHypo").unwrap();
        let ids: Vec<&str> = hypo.tools().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["HLT_A", "HLT_B"]);

        let a = compiled.terminal_key("HLT_A").unwrap();
        let b = compiled.terminal_key("HLT_B").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "HLTNav_Summary__HLT_A");
    }

    #[test]
    fn test_different_seeds_get_separate_filters() {
        let menu = catalog()
            .with_chain(chain("HLT_A", "L1MU6", &["muFast"], 6.0))
            .with_chain(chain("HLT_B", "L1MU10", &["muFast"], 8.0));
        let compiled = compile(&menu).unwrap();

        assert_eq!(compiled.nodes_of_kind(NodeKind::Filter).count(), 2);
        assert_eq!(compiled.nodes_of_kind(NodeKind::Reco).count(), 1);

        let im = compiled.node_by_name("IM_muFast").unwrap();
        assert_eq!(im.inputs.len(), 2);
        assert_eq!(im.chains, vec!["HLT_A", "HLT_B"]);
        assert_eq!(compiled.steps[0].filters.len(), 2);
        assert_eq!(compiled.steps[0].reco.len(), 1);
    }

    #[test]
    fn test_sequence_parameter_conflict() {
        let mut clash = sequence("muFast");
        clash.reco[0].alg_type = "OtherRecoAlg".into();
        let menu = Menu::new("test")
            .with_chain(chain("HLT_A", "L1MU6", &["muFast"], 6.0))
            .with_chain(
                Chain::new(
                    "HLT_B",
                    vec![key("L1MU6")],
                    vec![ChainStep::single(StepLeg::new(clash, pt_tool(8.0)))],
                )
                .unwrap(),
            )
            .with_sequence(sequence("muFast"));

        let err = compile(&menu).unwrap_err();
        assert!(matches!(err, Error::ConfigurationConflict { ref name, .. } if name == "muFast"));
    }

    #[test]
    fn test_shared_algorithm_with_different_parameters_conflicts() {
        let mut other = sequence("muComb");
        other.reco[0].name = "muFastReco".into();
        other.reco[0].properties.insert("window".into(), 0.2.into());
        let menu = catalog()
            .with_chain(chain("HLT_A", "L1MU6", &["muFast"], 6.0))
            .with_chain(
                Chain::new(
                    "HLT_B",
                    vec![key("L1MU6")],
                    vec![ChainStep::single(StepLeg::new(
                        MenuSequence { name: "muAlt".into(), ..other },
                        pt_tool(8.0),
                    ))],
                )
                .unwrap(),
            );

        match compile(&menu).unwrap_err() {
            Error::ConfigurationConflict { name, reason } => {
                assert_eq!(name, "muFastReco");
                assert!(reason.contains("properties"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_orphan_chain() {
        let menu = Menu::new("test").with_chain(chain("HLT_A", "L1MU6", &["muMissing"], 6.0));
        let err = compile(&menu).unwrap_err();
        assert!(matches!(
            err,
            Error::OrphanChain { ref chain, ref sequence, .. } if chain == "HLT_A" && sequence == "muMissing"
        ));
    }

    #[test]
    fn test_inline_sequence_resolves_named_reference() {
        let inline = Chain::new(
            "HLT_A",
            vec![key("L1MU6")],
            vec![ChainStep::single(StepLeg::new(sequence("muFast"), pt_tool(6.0)))],
        )
        .unwrap();
        let menu = Menu::new("test")
            .with_chain(inline)
            .with_chain(chain("HLT_B", "L1MU6", &["muFast"], 8.0));
        let compiled = compile(&menu).unwrap();
        assert_eq!(compiled.nodes_of_kind(NodeKind::Hypo).count(), 1);
    }

    #[test]
    fn test_multiplicity_overflow_before_compilation() {
        let err = ChainStep::new("Step1_2mu", vec![StepLeg::named("muFast", pt_tool(6.0))], 2)
            .unwrap_err();
        assert!(matches!(err, Error::MultiplicityOverflow { .. }));

        let json = r#"{
            "chains": [{
                "name": "HLT_C",
                "seeds": ["L1MU6"],
                "steps": [{"name": "2mu", "legs": [{"sequence": "muFast"}], "multiplicity": 2}]
            }]
        }"#;
        assert!(Menu::from_json(json).is_err());
    }

    #[test]
    fn test_duplicate_chain_names() {
        let menu = catalog()
            .with_chain(chain("HLT_A", "L1MU6", &["muFast"], 6.0))
            .with_chain(chain("HLT_A", "L1MU10", &["muFast"], 8.0));
        assert!(matches!(
            compile(&menu).unwrap_err(),
            Error::ConfigurationConflict { ref name, .. } if name == "HLT_A"
        ));
    }

    #[test]
    fn test_missing_seeds_underspecify_the_filter() {
        let seedless = Chain::new("HLT_A", Vec::new(), vec![step("muFast", 6.0)]).unwrap();
        let menu = catalog().with_chain(seedless);
        assert!(matches!(
            compile(&menu).unwrap_err(),
            Error::UnderspecifiedFilter { ref chain, .. } if chain == "HLT_A"
        ));
    }

    #[test]
    fn test_decisions_propagate_between_steps() {
        let menu = catalog()
            .with_chain(chain("HLT_A", "L1MU6", &["muFast", "muComb"], 6.0))
            .with_chain(chain("HLT_B", "L1MU10", &["muFast"], 8.0));
        let compiled = compile(&menu).unwrap();

        let a = compiled.chain("HLT_A").unwrap();
        assert_eq!(a.steps[0].filter_inputs, vec![key("L1MU6")]);
        assert_eq!(a.steps[1].filter_inputs, a.steps[0].decisions);
        assert_eq!(a.steps[0].decisions, vec![key("muFastHypo__out")]);

        let step2_filter = compiled.node(a.steps[1].filter).unwrap();
        let expected: KeySet = a.steps[0].decisions.iter().cloned().collect();
        assert_eq!(step2_filter.inputs, expected);
        assert_eq!(step2_filter.chains, vec!["HLT_A"]);

        let summary = compiled.node(compiled.summary).unwrap();
        assert_eq!(
            summary.finals().unwrap()["HLT_A"].decisions,
            vec![key("muCombHypo__out")]
        );
        assert!(summary.outputs.contains(&key("HLTNav_Summary__HLT_B")));
    }

    #[test]
    fn test_combo_step() {
        let menu = catalog().with_chain(two_leg_chain(
            "HLT_mu6_e10",
            ["L1MU6", "L1EM10"],
            &[("muFast_eFast", ["muFast", "eFast"])],
            2,
        ));
        let compiled = compile(&menu).unwrap();

        let combo = compiled.node_by_name("ComboHypo_Step1_muFast_eFast").unwrap();
        assert_eq!(
            combo.requirements().unwrap()["HLT_mu6_e10"],
            ComboRequirement { required: 2, legs: 2 }
        );
        assert_eq!(
            combo.inputs,
            [key("muFastHypo__out"), key("eFastHypo__out")].into_iter().collect()
        );
        let flow = compiled.chain("HLT_mu6_e10").unwrap();
        assert_eq!(
            flow.steps[0].decisions,
            vec![
                key("ComboHypo_Step1_muFast_eFast__leg000"),
                key("ComboHypo_Step1_muFast_eFast__leg001")
            ]
        );

        let ids: Vec<&str> = compiled
            .node_by_name("muFastHypo")
            .unwrap()
            .tools()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["leg000_HLT_mu6_e10"]);
        assert_eq!(compiled.steps[0].combos, vec![combo.id]);
    }

    #[test]
    fn test_same_sequence_on_both_legs() {
        let menu = catalog().with_chain(two_leg_chain(
            "HLT_2mu6",
            ["L1MU6", "L1MU6"],
            &[("2muFast", ["muFast", "muFast"])],
            2,
        ));
        let compiled = compile(&menu).unwrap();

        assert_eq!(compiled.nodes_of_kind(NodeKind::Hypo).count(), 1);
        let hypo = compiled.node_by_name("muFastHypo").unwrap();
        assert_eq!(hypo.tools().len(), 2);
        let filter = compiled.nodes_of_kind(NodeKind::Filter).next().unwrap();
        assert_eq!(filter.inputs.len(), 1);
    }

    #[test]
    fn test_empty_step_passes_through() {
        let aligned = Chain::new(
            "HLT_e10",
            vec![key("L1EM10")],
            vec![ChainStep::empty("wait").unwrap(), step("eFast", 10.0)],
        )
        .unwrap();
        let menu = catalog()
            .with_chain(chain("HLT_mu6", "L1MU6", &["muFast", "muComb"], 6.0))
            .with_chain(aligned);
        let compiled = compile(&menu).unwrap();

        let flow = compiled.chain("HLT_e10").unwrap();
        let filter = compiled.node(flow.steps[0].filter).unwrap();
        assert_eq!(flow.steps[0].decisions, vec![filter.routes().unwrap()[&key("L1EM10")].clone()]);
        assert_eq!(flow.steps[1].filter_inputs, flow.steps[0].decisions);
        assert_eq!(compiled.node_by_name("IM_eFast").unwrap().step, Some(1));
        assert_eq!(compiled.occupancy.steps[0].pass_through, vec!["HLT_e10"]);
    }

    #[test]
    fn test_data_flow_order_violation() {
        let mut late = sequence("muComb");
        late.reco[0].inputs.insert(key("HLT_muLate_features"));
        let menu = Menu::new("test")
            .with_sequence(late)
            .with_sequence(sequence("muLate"))
            .with_chain(chain("HLT_A", "L1MU6", &["muComb"], 6.0))
            .with_chain(chain("HLT_B", "L1MU10", &["muFast", "muLate"], 6.0))
            .with_sequence(sequence("muFast"));

        let err = compile(&menu).unwrap_err();
        assert!(matches!(err, Error::ConfigurationConflict { ref name, .. } if name == "muCombReco"));

        let relaxed = MenuCompiler::new(CompilerConfig::default().with_data_flow_validation(false));
        assert!(relaxed.compile(&menu).is_ok());
    }

    #[test]
    fn test_reco_lanes_cannot_read_each_other() {
        let mut e_fast = sequence("eFast");
        e_fast.reco[0].inputs.insert(feature_key("muFast"));
        let menu = Menu::new("test")
            .with_sequence(sequence("muFast"))
            .with_sequence(e_fast)
            .with_chain(chain("HLT_mu6", "L1MU6", &["muFast"], 6.0))
            .with_chain(chain("HLT_e10", "L1EM10", &["eFast"], 10.0));

        let err = compile(&menu).unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigurationConflict { ref name, ref reason }
                if name == "eFastReco" && reason.contains("another reco lane")
        ));

        let relaxed = MenuCompiler::new(CompilerConfig::default().with_data_flow_validation(false));
        assert!(relaxed.compile(&menu).is_ok());
    }

    #[test]
    fn test_reco_layer_schedules_lanes() {
        let menu = catalog()
            .with_chain(chain("HLT_mu6", "L1MU6", &["muFast"], 6.0))
            .with_chain(chain("HLT_e10", "L1EM10", &["eFast"], 10.0));
        let compiled = compile(&menu).unwrap();

        let reco = compiled
            .schedule()
            .into_iter()
            .find(|l| l.layer == Layer::Reco)
            .unwrap();
        assert_eq!(reco.lanes.len(), 2);
        for (lane, sequence) in reco.lanes.iter().zip(["muFast", "eFast"]) {
            let names: Vec<&str> = lane
                .iter()
                .map(|id| compiled.node(*id).unwrap().name.as_str())
                .collect();
            assert_eq!(names.len(), 2);
            assert!(names[0].starts_with("IM_"));
            assert_eq!(names[1], format!("{}Reco", sequence));
        }
        assert_eq!(reco.nodes, reco.lanes.concat());

        let hypo = compiled
            .schedule()
            .into_iter()
            .find(|l| l.layer == Layer::Hypo)
            .unwrap();
        assert!(hypo.lanes.iter().all(|lane| lane.len() == 1));
    }

    #[test]
    fn test_schedule_and_edges() {
        let menu = catalog().with_chain(chain("HLT_A", "L1MU6", &["muFast", "muComb"], 6.0));
        let compiled = compile(&menu).unwrap();

        let layers: Vec<(Option<usize>, Layer)> = compiled
            .schedule()
            .iter()
            .map(|l| (l.step, l.layer))
            .collect();
        assert_eq!(
            layers,
            vec![
                (Some(0), Layer::Filter),
                (Some(0), Layer::Reco),
                (Some(0), Layer::Hypo),
                (Some(1), Layer::Filter),
                (Some(1), Layer::Reco),
                (Some(1), Layer::Hypo),
                (None, Layer::Summary),
            ]
        );

        let hypo = compiled.node_by_name("muFastHypo").unwrap().id;
        let next_filter = compiled.chain("HLT_A").unwrap().steps[1].filter;
        assert!(compiled
            .data_edges()
            .iter()
            .any(|e| e.from == hypo && e.to == next_filter && e.key == key("muFastHypo__out")));
    }

    #[test]
    fn test_zero_step_chain_reads_seeds() {
        let menu = catalog().with_chain(Chain::new("HLT_noalg", vec![key("L1RD0")], Vec::new()).unwrap());
        let compiled = compile(&menu).unwrap();
        assert!(compiled.steps.is_empty());
        let summary = compiled.node(compiled.summary).unwrap();
        assert!(summary.inputs.contains(&key("L1RD0")));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let menu = catalog()
            .with_chain(chain("HLT_A", "L1MU6", &["muFast", "muComb"], 6.0))
            .with_chain(chain("HLT_B", "L1MU10", &["muFast"], 8.0))
            .with_chain(two_leg_chain(
                "HLT_mu_e",
                ["L1MU6", "L1EM10"],
                &[("muFast_eFast", ["muFast", "eFast"])],
                1,
            ));
        let first = compile(&menu).unwrap();
        let second = compile(&menu).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }

    #[test]
    fn test_combo_matching_is_part_of_identity() {
        let distinct = Chain::new(
            "HLT_mu_e_distinct",
            vec![key("L1MU6"), key("L1EM10")],
            vec![ChainStep::new(
                "muFast_eFast",
                vec![
                    StepLeg::named("muFast", pt_tool(5.0)),
                    StepLeg::named("eFast", pt_tool(5.0)),
                ],
                2,
            )
            .unwrap()
            .with_matching(LegMatching::Distinct)],
        )
        .unwrap();
        let menu = catalog()
            .with_chain(two_leg_chain(
                "HLT_mu_e",
                ["L1MU6", "L1EM10"],
                &[("muFast_eFast", ["muFast", "eFast"])],
                2,
            ))
            .with_chain(distinct);
        match compile(&menu).unwrap_err() {
            Error::ConfigurationConflict { reason, .. } => assert!(reason.contains("matching")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_menu_json_compiles() {
        let json = r#"{
            "name": "json",
            "sequences": [{
                "name": "muFast",
                "roi_key": "HLT_RoIs_muFast",
                "reco": [{"name": "MuFast", "alg_type": "MuFastSteering",
                          "inputs": ["HLT_RoIs_muFast"], "outputs": ["HLT_MuonsFast"]}],
                "hypo": {"name": "MuFastHypo", "alg_type": "MuFastHypoAlg", "feature_key": "HLT_MuonsFast"}
            }],
            "chains": [
                {"name": "HLT_mu6", "seeds": ["L1MU6"],
                 "steps": [{"name": "muFast", "legs": [{"sequence": "muFast"}]}]},
                {"name": "HLT_2mu6", "seeds": ["L1MU6", "L1MU6"],
                 "steps": [{"name": "2muFast", "legs": [{"sequence": "muFast"}, {"sequence": "muFast"}]}]}
            ]
        }"#;
        let compiled = compile(&Menu::from_json(json).unwrap()).unwrap();
        assert_eq!(compiled.nodes_of_kind(NodeKind::Filter).count(), 2);
        assert_eq!(compiled.node_by_name("MuFastHypo").unwrap().tools().len(), 3);
        assert_eq!(
            compiled.occupancy.chains_using(0, "muFast").unwrap(),
            ["HLT_mu6", "HLT_2mu6"]
        );
    }
}
