//! Weighted re-solving of a balanced model
//!
//! Both optimizers keep the reactions the SatCore run excluded out of the problem, along with
//! any reaction the committed model no longer balances, and assert every other reaction as a
//! hard constraint. Preferences between the remaining valid solutions are soft constraints.
use indexmap::IndexSet;
use log::debug;
use z3::ast::Bool;
use z3::{Context, Optimize};

use crate::balancing::constraints::ConstraintAssembler;
use crate::balancing::engine::BalancingStrategy;
use crate::balancing::gather::GatheredAssignments;
use crate::balancing::satcore::SatCoreOutcome;
use crate::balancing::solver::ConstraintSolver;
use crate::balancing::BalancingError;
use crate::configuration::Configuration;
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;

/// State shared by both optimizers
struct Optimization<'ctx, 'a> {
    optimize: Optimize<'ctx>,
    assembler: ConstraintAssembler<'ctx>,
    gathered: &'a GatheredAssignments,
    reference: &'a Model,
    base_excluded: &'a IndexSet<usize>,
    base_unknown: &'a IndexSet<usize>,
    excluded: IndexSet<usize>,
    config: Configuration,
}

impl<'ctx, 'a> Optimization<'ctx, 'a> {
    fn new(
        ctx: &'ctx Context,
        model: &Model,
        outcome: &'a SatCoreOutcome,
        gathered: &'a GatheredAssignments,
        reference: &'a Model,
        config: Configuration,
    ) -> Self {
        Optimization {
            optimize: Optimize::new(ctx),
            assembler: ConstraintAssembler::new(ctx, model, outcome.elements.clone()),
            gathered,
            reference,
            base_excluded: &outcome.excluded,
            base_unknown: &outcome.unknown_metabolites,
            excluded: IndexSet::new(),
            config,
        }
    }

    /// Excluded reactions of the base run, plus those the committed model doesn't balance
    fn recheck_excluded(&mut self, model: &Model) {
        self.excluded = self.base_excluded.clone();
        for (index, reaction) in model.reactions().enumerate() {
            if !reaction.is_pseudo
                && (!model.is_nonh_balanced(index) || !model.is_ch_balanced(index))
            {
                self.excluded.insert(index);
            }
        }
        debug!("{} reactions left out of optimization", self.excluded.len());
    }

    fn assert_reactions(&self, model: &Model) {
        for (index, reaction) in model.reactions().enumerate() {
            if reaction.is_pseudo || self.excluded.contains(&index) {
                continue;
            }
            let balanced = self.assembler.reaction_constraint(model, index);
            ConstraintSolver::assert(&self.optimize, &balanced);
        }
    }

    fn reference_of(&self, metabolite: &Metabolite) -> Option<&'a Metabolite> {
        self.reference.metabolite(&metabolite.id)
    }

    fn soft(&self, constraint: &Bool<'ctx>, weight: u32) {
        self.optimize.assert_soft(constraint, weight, None);
    }

    fn commit(&self, solution: &z3::Model<'ctx>, model: &mut Model) -> Result<(), BalancingError> {
        self.assembler.commit(solution, model)
    }
}

/// Prefer solutions matching the formulas and charges of a reference model
pub struct AdherenceOptimizer<'ctx, 'a> {
    inner: Optimization<'ctx, 'a>,
}

impl<'ctx, 'a> AdherenceOptimizer<'ctx, 'a> {
    pub fn new(
        ctx: &'ctx Context,
        model: &Model,
        outcome: &'a SatCoreOutcome,
        gathered: &'a GatheredAssignments,
        reference: &'a Model,
        config: Configuration,
    ) -> Self {
        AdherenceOptimizer {
            inner: Optimization::new(ctx, model, outcome, gathered, reference, config),
        }
    }

    pub fn excluded(&self) -> &IndexSet<usize> {
        &self.inner.excluded
    }
}

impl<'ctx> BalancingStrategy<'ctx> for AdherenceOptimizer<'ctx, '_> {
    type Backend = Optimize<'ctx>;

    fn backend(&self) -> &Optimize<'ctx> {
        &self.inner.optimize
    }

    fn generate_constraints(&mut self, model: &Model) -> Result<(), BalancingError> {
        let inner = &mut self.inner;
        inner.recheck_excluded(model);
        for metabolite in 0..model.metabolite_count() {
            let constraint = inner
                .assembler
                .gathered_constraint(model, inner.gathered, metabolite);
            ConstraintSolver::assert(&inner.optimize, &constraint);
        }
        inner.assert_reactions(model);

        for (index, metabolite) in model.metabolites().enumerate() {
            let reference = match inner.reference_of(metabolite) {
                Some(reference) => reference,
                None => continue,
            };
            let elements = inner.assembler.exact(index, &reference.formula, None);
            inner.soft(&elements, inner.config.adherence_element_weight);
            if reference.charge.is_some() {
                let with_charge = inner.assembler.exact(index, &reference.formula, reference.charge);
                inner.soft(&with_charge, inner.config.adherence_charge_weight);
            }
        }
        Ok(())
    }

    fn assumptions(&self) -> Vec<Bool<'ctx>> {
        Vec::new()
    }

    fn assign_from_model(
        &mut self,
        solution: &z3::Model<'ctx>,
        model: &mut Model,
    ) -> Result<(), BalancingError> {
        self.inner.commit(solution, model)
    }

    fn resolve_conflict(
        &mut self,
        _core: Vec<Bool<'ctx>>,
        _model: &Model,
    ) -> Result<(), BalancingError> {
        Err(BalancingError::InconsistentConstraints)
    }
}

/// Prefer larger candidates, and empty formulas for metabolites nothing is known about
///
/// Metabolites whose committed assignment already agrees with the reference are pinned to it.
pub struct FormulaOptimizer<'ctx, 'a> {
    inner: Optimization<'ctx, 'a>,
    unknown: IndexSet<usize>,
}

impl<'ctx, 'a> FormulaOptimizer<'ctx, 'a> {
    pub fn new(
        ctx: &'ctx Context,
        model: &Model,
        outcome: &'a SatCoreOutcome,
        gathered: &'a GatheredAssignments,
        reference: &'a Model,
        config: Configuration,
    ) -> Self {
        FormulaOptimizer {
            inner: Optimization::new(ctx, model, outcome, gathered, reference, config),
            unknown: IndexSet::new(),
        }
    }

    pub fn excluded(&self) -> &IndexSet<usize> {
        &self.inner.excluded
    }

    /// Unknown metabolites of the base run together with those found while optimizing
    pub fn unknown_metabolites(&self) -> &IndexSet<usize> {
        &self.unknown
    }
}

impl<'ctx> BalancingStrategy<'ctx> for FormulaOptimizer<'ctx, '_> {
    type Backend = Optimize<'ctx>;

    fn backend(&self) -> &Optimize<'ctx> {
        &self.inner.optimize
    }

    fn generate_constraints(&mut self, model: &Model) -> Result<(), BalancingError> {
        let inner = &mut self.inner;
        inner.recheck_excluded(model);
        for (index, metabolite) in model.metabolites().enumerate() {
            let pinned = inner.reference_of(metabolite).is_some_and(|reference| {
                metabolite.formula.matches_ignoring_wildcard(&reference.formula)
                    && metabolite.charge == reference.charge
            });
            let constraint = if pinned {
                inner.assembler.exact(index, &metabolite.formula, metabolite.charge)
            } else {
                inner.assembler.gathered_constraint(model, inner.gathered, index)
            };
            ConstraintSolver::assert(&inner.optimize, &constraint);
        }
        inner.assert_reactions(model);

        self.unknown = inner.base_unknown.clone();
        self.unknown.extend(inner.assembler.unknown_metabolites().iter().copied());
        for metabolite in &self.unknown {
            for empty in inner.assembler.empty(*metabolite) {
                inner.soft(&empty, 1);
            }
        }

        for (index, candidates) in inner.gathered.candidates.iter().enumerate() {
            if candidates.len() < 2 {
                continue;
            }
            let mut ranked: Vec<_> = candidates.iter().collect();
            ranked.sort_by_key(|c| c.formula.atom_count());
            for (rank, candidate) in ranked.into_iter().enumerate() {
                let preferred =
                    inner
                        .assembler
                        .listed_elements(index, &candidate.formula, candidate.charge);
                let weight = inner.config.formula_rank_weight * (rank as u32 + 1);
                inner.soft(&preferred, weight);
            }
        }
        Ok(())
    }

    fn assumptions(&self) -> Vec<Bool<'ctx>> {
        Vec::new()
    }

    fn assign_from_model(
        &mut self,
        solution: &z3::Model<'ctx>,
        model: &mut Model,
    ) -> Result<(), BalancingError> {
        self.inner.commit(solution, model)
    }

    fn resolve_conflict(
        &mut self,
        _core: Vec<Bool<'ctx>>,
        _model: &Model,
    ) -> Result<(), BalancingError> {
        Err(BalancingError::InconsistentConstraints)
    }
}
