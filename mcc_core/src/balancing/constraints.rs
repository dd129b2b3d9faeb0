//! Translation of candidate assignments and reaction stoichiometry into SMT constraints
//!
//! Every metabolite gets one integer variable per relevant element plus one for its charge.
//! Reaction constraints require all elements other than hydrogen to cancel, and the charge sum
//! to equal the hydrogen sum, so that protons can later absorb any remaining difference.
use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use z3::ast::{Ast, Bool, Int};
use z3::Context;

use crate::balancing::gather::GatheredAssignments;
use crate::balancing::BalancingError;
use crate::metabolic_model::assignment::{Assignment, Candidate};
use crate::metabolic_model::formula::Formula;
use crate::metabolic_model::model::Model;

/// Elements which need a variable, always including hydrogen and never the wildcard
pub fn relevant_elements(model: &Model, gathered: &GatheredAssignments) -> Vec<String> {
    let mut elements: BTreeSet<String> = model.elements();
    for candidates in &gathered.candidates {
        for candidate in candidates {
            for (element, _) in candidate.formula.elements() {
                if element != Formula::WILDCARD {
                    elements.insert(element.to_string());
                }
            }
        }
    }
    elements.insert(Formula::HYDROGEN.to_string());
    elements.into_iter().collect()
}

pub struct ConstraintAssembler<'ctx> {
    ctx: &'ctx Context,
    elements: Vec<String>,
    /// Per metabolite, one variable per entry of `elements`
    element_vars: Vec<Vec<Int<'ctx>>>,
    charge_vars: Vec<Int<'ctx>>,
    answer_literals: IndexMap<usize, Bool<'ctx>>,
    literal_names: IndexMap<String, usize>,
    unknown_metabolites: IndexSet<usize>,
}

impl<'ctx> ConstraintAssembler<'ctx> {
    pub fn new(ctx: &'ctx Context, model: &Model, elements: Vec<String>) -> Self {
        let mut element_vars = Vec::with_capacity(model.metabolite_count());
        let mut charge_vars = Vec::with_capacity(model.metabolite_count());
        for (index, metabolite) in model.metabolites().enumerate() {
            element_vars.push(
                elements
                    .iter()
                    .map(|e| Int::new_const(ctx, format!("m{}_{}_{}", index, metabolite.id, e)))
                    .collect(),
            );
            charge_vars.push(Int::new_const(
                ctx,
                format!("m{}_{}_charge", index, metabolite.id),
            ));
        }
        ConstraintAssembler {
            ctx,
            elements,
            element_vars,
            charge_vars,
            answer_literals: IndexMap::new(),
            literal_names: IndexMap::new(),
            unknown_metabolites: IndexSet::new(),
        }
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// Metabolites for which no candidate constraint could be built
    pub fn unknown_metabolites(&self) -> &IndexSet<usize> {
        &self.unknown_metabolites
    }

    fn constant(&self, value: i64) -> Int<'ctx> {
        Int::from_i64(self.ctx, value)
    }

    fn charge_constraint(&self, metabolite: usize, charge: Option<i32>) -> Option<Bool<'ctx>> {
        charge.map(|c| self.charge_vars[metabolite]._eq(&self.constant(i64::from(c))))
    }

    fn conjunction(&self, constraints: &[Bool<'ctx>]) -> Bool<'ctx> {
        let refs: Vec<&Bool<'ctx>> = constraints.iter().collect();
        Bool::and(self.ctx, &refs)
    }

    /// Variables equal the formula exactly, and the charge if it is known
    pub fn exact(&self, metabolite: usize, formula: &Formula, charge: Option<i32>) -> Bool<'ctx> {
        let mut constraints: Vec<Bool<'ctx>> = self
            .elements
            .iter()
            .zip(&self.element_vars[metabolite])
            .map(|(element, var)| var._eq(&self.constant(i64::from(formula.get(element)))))
            .collect();
        constraints.extend(self.charge_constraint(metabolite, charge));
        self.conjunction(&constraints)
    }

    /// Variables are at least the formula's counts, and the charge equals it if known
    pub fn at_least(&self, metabolite: usize, formula: &Formula, charge: Option<i32>) -> Bool<'ctx> {
        let mut constraints: Vec<Bool<'ctx>> = self
            .elements
            .iter()
            .zip(&self.element_vars[metabolite])
            .map(|(element, var)| var.ge(&self.constant(i64::from(formula.get(element)))))
            .collect();
        constraints.extend(self.charge_constraint(metabolite, charge));
        self.conjunction(&constraints)
    }

    /// Only the elements listed in the formula (other than the wildcard) equal their counts
    pub fn listed_elements(
        &self,
        metabolite: usize,
        formula: &Formula,
        charge: Option<i32>,
    ) -> Bool<'ctx> {
        let mut constraints: Vec<Bool<'ctx>> = self
            .elements
            .iter()
            .zip(&self.element_vars[metabolite])
            .filter(|(element, _)| formula.get(element) > 0)
            .map(|(element, var)| var._eq(&self.constant(i64::from(formula.get(element)))))
            .collect();
        constraints.extend(self.charge_constraint(metabolite, charge));
        self.conjunction(&constraints)
    }

    /// Every element variable of the metabolite equals zero
    pub fn empty(&self, metabolite: usize) -> Vec<Bool<'ctx>> {
        self.element_vars[metabolite]
            .iter()
            .map(|var| var._eq(&self.constant(0)))
            .collect()
    }

    pub fn non_negative(&self, metabolite: usize) -> Bool<'ctx> {
        let constraints: Vec<Bool<'ctx>> = self.element_vars[metabolite]
            .iter()
            .map(|var| var.ge(&self.constant(0)))
            .collect();
        self.conjunction(&constraints)
    }

    /// Constraint for a single candidate, `None` for a free candidate
    pub fn candidate_constraint(&self, metabolite: usize, candidate: &Candidate) -> Option<Bool<'ctx>> {
        match candidate {
            Candidate::Fixed(formula, charge) => Some(self.exact(metabolite, formula, *charge)),
            Candidate::Wildcard(formula, charge) => {
                Some(self.at_least(metabolite, formula, *charge))
            }
            Candidate::Free => None,
        }
    }

    /// Disjunction over the candidates of a metabolite, conjoined with non-negativity
    ///
    /// A metabolite without any candidate constraint is recorded as unknown and only bounded
    /// by non-negativity.
    pub fn metabolite_constraint<'c>(
        &mut self,
        model: &Model,
        metabolite: usize,
        candidates: impl IntoIterator<Item = &'c Candidate>,
    ) -> Bool<'ctx> {
        let disjuncts: Vec<Bool<'ctx>> = candidates
            .into_iter()
            .filter_map(|c| self.candidate_constraint(metabolite, c))
            .collect();
        let non_negative = self.non_negative(metabolite);
        if disjuncts.is_empty() {
            debug!(
                "No assignments for {} found",
                model.metabolite_at(metabolite).id
            );
            self.unknown_metabolites.insert(metabolite);
            return non_negative;
        }
        let refs: Vec<&Bool<'ctx>> = disjuncts.iter().collect();
        Bool::and(self.ctx, &[&Bool::or(self.ctx, &refs), &non_negative])
    }

    /// Candidate constraints for a metabolite from its gathered assignments
    pub fn gathered_constraint(
        &mut self,
        model: &Model,
        gathered: &GatheredAssignments,
        metabolite: usize,
    ) -> Bool<'ctx> {
        let candidates: Vec<Candidate> = gathered.candidates[metabolite]
            .iter()
            .map(Candidate::from)
            .collect();
        self.metabolite_constraint(model, metabolite, &candidates)
    }

    fn weighted_sum(&self, terms: &[(i64, &Int<'ctx>)]) -> Int<'ctx> {
        if terms.is_empty() {
            return self.constant(0);
        }
        let products: Vec<Int<'ctx>> = terms
            .iter()
            .map(|(coefficient, var)| Int::mul(self.ctx, &[&self.constant(*coefficient), *var]))
            .collect();
        let refs: Vec<&Int<'ctx>> = products.iter().collect();
        Int::add(self.ctx, &refs)
    }

    /// Non-hydrogen elements cancel, and the charge sum equals the hydrogen sum
    pub fn reaction_constraint(&self, model: &Model, reaction: usize) -> Bool<'ctx> {
        let participants = model.reaction_at(reaction).participants();
        let zero = self.constant(0);
        let mut constraints = Vec::with_capacity(self.elements.len() + 1);
        let mut hydrogen_sum = None;
        for (position, element) in self.elements.iter().enumerate() {
            let terms: Vec<(i64, &Int<'ctx>)> = participants
                .iter()
                .map(|(m, c)| (*c, &self.element_vars[*m][position]))
                .collect();
            let sum = self.weighted_sum(&terms);
            if element == Formula::HYDROGEN {
                hydrogen_sum = Some(sum);
            } else {
                constraints.push(sum._eq(&zero));
            }
        }
        let charge_terms: Vec<(i64, &Int<'ctx>)> = participants
            .iter()
            .map(|(m, c)| (*c, &self.charge_vars[*m]))
            .collect();
        let charge_sum = self.weighted_sum(&charge_terms);
        constraints.push(charge_sum._eq(&hydrogen_sum.unwrap_or(zero)));
        self.conjunction(&constraints)
    }

    /// The literal guarding a reaction's balance constraint, created on first use
    pub fn answer_literal(&mut self, model: &Model, reaction: usize) -> Bool<'ctx> {
        if let Some(literal) = self.answer_literals.get(&reaction) {
            return literal.clone();
        }
        let name = format!("answer_{}_{}", reaction, model.reaction_at(reaction).id);
        let literal = Bool::new_const(self.ctx, name.clone());
        self.literal_names.insert(name, reaction);
        self.answer_literals.insert(reaction, literal.clone());
        literal
    }

    pub fn literal(&self, reaction: usize) -> Option<&Bool<'ctx>> {
        self.answer_literals.get(&reaction)
    }

    /// The reaction an answer literal stands for
    pub fn reaction_of(&self, literal: &Bool<'ctx>) -> Option<usize> {
        self.literal_names.get(&literal.decl().name()).copied()
    }

    /// Read every metabolite's assignment from a solver model
    ///
    /// Nothing is written to the metabolic model, so a failure part way leaves it untouched.
    pub fn read_solution(
        &self,
        solution: &z3::Model<'ctx>,
        model: &Model,
    ) -> Result<Vec<Assignment>, BalancingError> {
        let mut assignments = Vec::with_capacity(model.metabolite_count());
        for (index, metabolite) in model.metabolites().enumerate() {
            let non_integral = |symbol: &str| BalancingError::NonIntegralSolution {
                metabolite: metabolite.id.clone(),
                symbol: symbol.to_string(),
            };
            let mut formula = Formula::new();
            for (element, var) in self.elements.iter().zip(&self.element_vars[index]) {
                let count = solution
                    .eval(var, true)
                    .and_then(|value| value.as_i64())
                    .and_then(|value| u32::try_from(value).ok())
                    .ok_or_else(|| non_integral(element.as_str()))?;
                formula.set(element, count);
            }
            let charge = solution
                .eval(&self.charge_vars[index], true)
                .and_then(|value| value.as_i64())
                .and_then(|value| i32::try_from(value).ok())
                .ok_or_else(|| non_integral("charge"))?;
            assignments.push(Assignment::new(formula, Some(charge)));
        }
        Ok(assignments)
    }

    /// Read a solution and write it onto the model, all or nothing
    pub fn commit(&self, solution: &z3::Model<'ctx>, model: &mut Model) -> Result<(), BalancingError> {
        let assignments = self.read_solution(solution, model)?;
        for (index, assignment) in assignments.iter().enumerate() {
            model.metabolite_at_mut(index).set_assignment(assignment);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancing::fixtures::{model_with, source_from};
    use crate::balancing::gather::gather;
    use crate::balancing::solver::{new_context, new_solver, ConstraintSolver};
    use crate::configuration::Configuration;
    use z3::SatResult;

    #[test]
    fn elements_from_candidates() {
        let model = model_with(&[("a", "C2H4O2", Some(0)), ("b", "", None)], &[]);
        let source = source_from(&[("a", &[("C2H4O2", Some(0))]), ("b", &[("FeS2R", None)])]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        assert_eq!(relevant_elements(&model, &gathered), vec!["C", "Fe", "H", "O", "S"]);
    }

    #[test]
    fn reaction_allows_proton_shift() {
        // Acetate to acetic acid is balanced up to a proton
        let model = model_with(
            &[("ac", "C2H3O2", Some(-1)), ("aca", "C2H4O2", Some(0))],
            &[("R", &[("ac", -1), ("aca", 1)])],
        );
        let source = source_from(&[
            ("ac", &[("C2H3O2", Some(-1))]),
            ("aca", &[("C2H4O2", Some(0))]),
        ]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        let config = Configuration::default();
        let ctx = new_context(&config);
        let solver = new_solver(&ctx, &config);
        let mut assembler =
            ConstraintAssembler::new(&ctx, &model, relevant_elements(&model, &gathered));
        for m in 0..model.metabolite_count() {
            let constraint = assembler.gathered_constraint(&model, &gathered, m);
            solver.assert(&constraint);
        }
        let literal = assembler.answer_literal(&model, 0);
        solver.assert(&literal.implies(&assembler.reaction_constraint(&model, 0)));
        assert_eq!(solver.check_assumptions(&[literal.clone()]), SatResult::Sat);
        assert_eq!(assembler.reaction_of(&literal), Some(0));

        let solution = solver.model().unwrap();
        let assignments = assembler.read_solution(&solution, &model).unwrap();
        assert_eq!(assignments[0], Assignment::parse("C2H3O2", Some(-1)).unwrap());
        assert!(assembler.unknown_metabolites().is_empty());
    }

    #[test]
    fn wildcards_bound_from_below() {
        let model = model_with(
            &[("a", "C3H6O3", Some(0)), ("b", "", None)],
            &[("R", &[("a", -1), ("b", 1)])],
        );
        let source = source_from(&[("a", &[("C3H6O3", Some(0))]), ("b", &[("C4R", Some(0))])]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        let config = Configuration::default();
        let ctx = new_context(&config);
        let solver = new_solver(&ctx, &config);
        let mut assembler =
            ConstraintAssembler::new(&ctx, &model, relevant_elements(&model, &gathered));
        for m in 0..model.metabolite_count() {
            let constraint = assembler.gathered_constraint(&model, &gathered, m);
            solver.assert(&constraint);
        }
        let literal = assembler.answer_literal(&model, 0);
        solver.assert(&literal.implies(&assembler.reaction_constraint(&model, 0)));
        // b needs at least four carbons, a only has three
        assert_eq!(solver.check_assumptions(&[literal]), SatResult::Unsat);
        assert_eq!(solver.check_assumptions(&[]), SatResult::Sat);
    }

    #[test]
    fn unknown_metabolites_are_free() {
        let model = model_with(&[("a", "", None)], &[]);
        let source = source_from(&[("a", &[])]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        let ctx = new_context(&Configuration::default());
        let mut assembler =
            ConstraintAssembler::new(&ctx, &model, relevant_elements(&model, &gathered));
        let _ = assembler.gathered_constraint(&model, &gathered, 0);
        assert!(assembler.unknown_metabolites().contains(&0));
        assert_eq!(assembler.elements(), ["H".to_string()]);
    }
}
