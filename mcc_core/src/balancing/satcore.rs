//! Conflict directed balancing through unsat cores
//!
//! All answer literals are assumed at first. While that is unsatisfiable, cores are split off
//! until the rest is satisfiable. The cores are then worked through smallest first, and their
//! literals are added back one at a time, keeping each one that leaves the problem
//! satisfiable and excluding the others. Inside a core, reactions of the caller's fixed set
//! come first, then reactions close to metabolites with fixed assignments, then the reactions
//! with the best quality score.
use indexmap::{IndexMap, IndexSet};
use log::{debug, error};
use z3::ast::Bool;
use z3::{Context, SatResult, Solver};

use crate::balancing::constraints::{relevant_elements, ConstraintAssembler};
use crate::balancing::engine::{check, BalancingStrategy};
use crate::balancing::gather::GatheredAssignments;
use crate::balancing::scoring::score_reactions;
use crate::balancing::solver::{new_solver, ConstraintSolver};
use crate::balancing::{BalancingError, BalancingWarning};
use crate::configuration::Configuration;
use crate::metabolic_model::model::Model;

pub struct SatCore<'ctx, 'a> {
    solver: Solver<'ctx>,
    assembler: ConstraintAssembler<'ctx>,
    gathered: &'a GatheredAssignments,
    fixed_reactions: IndexSet<usize>,
    /// Reactions whose answer literals are currently assumed
    active: IndexSet<usize>,
    excluded: IndexSet<usize>,
    reasons: IndexMap<usize, Vec<usize>>,
    scores: Vec<f64>,
    warnings: Vec<BalancingWarning>,
    config: Configuration,
}

/// What a finished SatCore run found, indices refer to the balanced model
#[derive(Clone, Debug, Default)]
pub struct SatCoreOutcome {
    pub elements: Vec<String>,
    pub excluded: IndexSet<usize>,
    pub reasons: IndexMap<usize, Vec<usize>>,
    pub unknown_metabolites: IndexSet<usize>,
    pub scores: Vec<f64>,
    pub warnings: Vec<BalancingWarning>,
}

impl<'ctx, 'a> SatCore<'ctx, 'a> {
    /// Set up the strategy, scoring every reaction up front
    ///
    /// # Errors
    /// `UnknownReaction` if a fixed reaction is not part of the model
    pub fn new(
        ctx: &'ctx Context,
        model: &Model,
        gathered: &'a GatheredAssignments,
        fixed_reactions: &IndexSet<String>,
        config: Configuration,
    ) -> Result<Self, BalancingError> {
        let fixed_reactions = fixed_reactions
            .iter()
            .map(|id| {
                model
                    .reaction_index(id)
                    .ok_or_else(|| BalancingError::UnknownReaction(id.clone()))
            })
            .collect::<Result<IndexSet<usize>, _>>()?;
        let (scores, warnings) = score_reactions(model, gathered, config.combination_limit);
        Ok(SatCore {
            solver: new_solver(ctx, &config),
            assembler: ConstraintAssembler::new(ctx, model, relevant_elements(model, gathered)),
            gathered,
            fixed_reactions,
            active: IndexSet::new(),
            excluded: IndexSet::new(),
            reasons: IndexMap::new(),
            scores,
            warnings,
            config,
        })
    }

    pub fn excluded(&self) -> &IndexSet<usize> {
        &self.excluded
    }

    pub fn into_outcome(self) -> SatCoreOutcome {
        SatCoreOutcome {
            elements: self.assembler.elements().to_vec(),
            excluded: self.excluded,
            reasons: self.reasons,
            unknown_metabolites: self.assembler.unknown_metabolites().clone(),
            scores: self.scores,
            warnings: self.warnings,
        }
    }

    fn literals_for(&self, reactions: &IndexSet<usize>) -> Vec<Bool<'ctx>> {
        reactions
            .iter()
            .filter_map(|r| self.assembler.literal(*r).cloned())
            .collect()
    }

    fn reactions_of(&self, core: &[Bool<'ctx>]) -> Vec<usize> {
        core.iter()
            .filter_map(|literal| self.assembler.reaction_of(literal))
            .collect()
    }

    /// Split cores off the active set until it is satisfiable
    fn isolate(
        &self,
        first: Vec<usize>,
        satisfiable: &mut IndexSet<usize>,
    ) -> Result<Vec<Vec<usize>>, BalancingError> {
        let mut cores = Vec::new();
        let mut core = first;
        loop {
            if core.is_empty() {
                return Err(BalancingError::InconsistentConstraints);
            }
            for r in &core {
                satisfiable.shift_remove(r);
            }
            cores.push(core);
            if check(&self.solver, &self.literals_for(satisfiable))? == SatResult::Sat {
                break;
            }
            core = self.reactions_of(&self.solver.unsat_core());
        }
        cores.sort_by_key(Vec::len);
        Ok(cores)
    }

    /// Priority of every core member, caller fixed reactions first, then closeness to anchors
    fn priorities(&self, core: &[usize], model: &Model) -> IndexMap<usize, f64> {
        let within: IndexSet<usize> = core.iter().copied().collect();
        let unreachable = core.len() + 1;
        let mut priorities: IndexMap<usize, f64> = core.iter().map(|r| (*r, 0.)).collect();
        for reaction in core {
            if self.fixed_reactions.contains(reaction) {
                continue;
            }
            let anchors = model
                .reaction_at(*reaction)
                .participants()
                .iter()
                .filter(|(m, _)| self.gathered.is_fixed(*m))
                .count();
            if anchors == 0 {
                continue;
            }
            let distances = model.reaction_distances(*reaction, &within);
            for other in core {
                let distance = distances.get(other).copied().unwrap_or(unreachable);
                if let Some(priority) = priorities.get_mut(other) {
                    *priority += anchors as f64 / distance as f64;
                }
            }
        }
        for reaction in core {
            if self.fixed_reactions.contains(reaction) {
                priorities.insert(*reaction, self.config.fixed_reaction_score * core.len() as f64);
            }
        }
        priorities
    }

    fn exclude(
        &mut self,
        reaction: usize,
        core: &[usize],
        model: &Model,
    ) -> Result<(), BalancingError> {
        let id = |r: &usize| model.reaction_at(*r).id.clone();
        if self.fixed_reactions.contains(&reaction) {
            error!("Could not balance fixed reaction {}", id(&reaction));
            return Err(BalancingError::FixedReactionUnbalanceable {
                reaction: id(&reaction),
                core: core.iter().map(id).collect(),
            });
        }
        let reason: Vec<usize> = if core.len() == 1 {
            core.to_vec()
        } else {
            core.iter().copied().filter(|r| *r != reaction).collect()
        };
        debug!(
            "Excluding {} because of {:?}",
            id(&reaction),
            reason.iter().map(id).collect::<Vec<_>>()
        );
        self.excluded.insert(reaction);
        self.reasons.insert(reaction, reason);
        Ok(())
    }
}

impl<'ctx> BalancingStrategy<'ctx> for SatCore<'ctx, '_> {
    type Backend = Solver<'ctx>;

    fn backend(&self) -> &Solver<'ctx> {
        &self.solver
    }

    fn generate_constraints(&mut self, model: &Model) -> Result<(), BalancingError> {
        for metabolite in 0..model.metabolite_count() {
            let constraint = self
                .assembler
                .gathered_constraint(model, self.gathered, metabolite);
            ConstraintSolver::assert(&self.solver, &constraint);
        }
        for (index, reaction) in model.reactions().enumerate() {
            if reaction.is_pseudo {
                continue;
            }
            let literal = self.assembler.answer_literal(model, index);
            let balanced = self.assembler.reaction_constraint(model, index);
            ConstraintSolver::assert(&self.solver, &literal.implies(&balanced));
            self.active.insert(index);
        }
        debug!(
            "{} reactions to balance, {} unknown metabolites",
            self.active.len(),
            self.assembler.unknown_metabolites().len()
        );
        Ok(())
    }

    fn assumptions(&self) -> Vec<Bool<'ctx>> {
        self.literals_for(&self.active)
    }

    fn assign_from_model(
        &mut self,
        solution: &z3::Model<'ctx>,
        model: &mut Model,
    ) -> Result<(), BalancingError> {
        self.assembler.commit(solution, model)
    }

    fn resolve_conflict(
        &mut self,
        core: Vec<Bool<'ctx>>,
        model: &Model,
    ) -> Result<(), BalancingError> {
        let mut satisfiable = self.active.clone();
        let cores = self.isolate(self.reactions_of(&core), &mut satisfiable)?;
        debug!("Unsat cores were {:?}", cores);

        for core in cores {
            if let [reaction] = core[..] {
                self.exclude(reaction, &core, model)?;
                continue;
            }
            let priorities = self.priorities(&core, model);
            let mut order = core.clone();
            order.sort_by(|a, b| {
                let priority = |r: &usize| priorities.get(r).copied().unwrap_or(0.);
                priority(b)
                    .total_cmp(&priority(a))
                    .then_with(|| self.scores[*b].total_cmp(&self.scores[*a]))
            });
            for reaction in order {
                satisfiable.insert(reaction);
                if check(&self.solver, &self.literals_for(&satisfiable))? != SatResult::Sat {
                    satisfiable.shift_remove(&reaction);
                    self.exclude(reaction, &core, model)?;
                }
            }
        }
        self.active = satisfiable;
        Ok(())
    }
}
