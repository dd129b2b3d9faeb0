//! Driver shared by every balancing strategy
//!
//! A strategy generates its constraints once, then the driver checks them under the
//! strategy's assumptions. A satisfying model is handed back to the strategy to commit, and an
//! unsat core is handed back to be resolved, after which the driver checks again.
use log::debug;
use z3::ast::Bool;
use z3::SatResult;

use crate::balancing::solver::ConstraintSolver;
use crate::balancing::BalancingError;
use crate::metabolic_model::model::Model;

/// Where a balancing run currently is
#[derive(Debug)]
pub enum BalancingState<'ctx> {
    Unsolved,
    Sat,
    Unsat(Vec<Bool<'ctx>>),
}

/// Hooks the driver calls while balancing
pub trait BalancingStrategy<'ctx> {
    type Backend: ConstraintSolver<'ctx>;

    fn backend(&self) -> &Self::Backend;

    /// Add every hard and soft constraint to the backend
    fn generate_constraints(&mut self, model: &Model) -> Result<(), BalancingError>;

    /// Literals assumed true on the next check
    fn assumptions(&self) -> Vec<Bool<'ctx>>;

    /// Commit a satisfying solution onto the model
    fn assign_from_model(
        &mut self,
        solution: &z3::Model<'ctx>,
        model: &mut Model,
    ) -> Result<(), BalancingError>;

    /// Drop assumptions so that the next check gets past the given core
    fn resolve_conflict(&mut self, core: Vec<Bool<'ctx>>, model: &Model)
        -> Result<(), BalancingError>;
}

/// Check a backend, mapping an unknown result to an error
pub(crate) fn check<'ctx, B: ConstraintSolver<'ctx>>(
    backend: &B,
    assumptions: &[Bool<'ctx>],
) -> Result<SatResult, BalancingError> {
    match backend.check(assumptions) {
        SatResult::Unknown => Err(BalancingError::SolverUnavailable(
            "solver returned unknown".to_string(),
        )),
        result => Ok(result),
    }
}

/// Run a strategy to completion, leaving the committed solution on the model
///
/// # Errors
/// Any error of the strategy's hooks, `SolverUnavailable` if the solver can't decide, and
/// `InconsistentConstraints` if the constraints are unsatisfiable without any assumption.
pub fn run<'ctx, S: BalancingStrategy<'ctx>>(
    strategy: &mut S,
    model: &mut Model,
) -> Result<(), BalancingError> {
    strategy.generate_constraints(model)?;
    let mut state = BalancingState::Unsolved;
    let mut rounds = 0usize;
    loop {
        state = match state {
            BalancingState::Unsolved => {
                rounds += 1;
                let assumptions = strategy.assumptions();
                match check(strategy.backend(), &assumptions)? {
                    SatResult::Sat => BalancingState::Sat,
                    _ => {
                        let core = strategy.backend().unsat_core();
                        if core.is_empty() {
                            return Err(BalancingError::InconsistentConstraints);
                        }
                        BalancingState::Unsat(core)
                    }
                }
            }
            BalancingState::Sat => {
                let solution = strategy.backend().model().ok_or_else(|| {
                    BalancingError::SolverUnavailable("no model after a sat check".to_string())
                })?;
                strategy.assign_from_model(&solution, model)?;
                debug!("Balanced after {} rounds", rounds);
                return Ok(());
            }
            BalancingState::Unsat(core) => {
                let before = strategy.assumptions().len();
                strategy.resolve_conflict(core, model)?;
                if strategy.assumptions().len() >= before {
                    return Err(BalancingError::SolverUnavailable(
                        "conflict resolution excluded nothing".to_string(),
                    ));
                }
                BalancingState::Unsolved
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancing::solver::{new_context, new_solver};
    use crate::configuration::Configuration;
    use z3::ast::{Ast, Int};
    use z3::{Context, Solver};

    /// Keeps x at one of several values, each assumption pins it to a different one
    struct Pinning<'ctx> {
        ctx: &'ctx Context,
        solver: Solver<'ctx>,
        x: Int<'ctx>,
        active: Vec<(Bool<'ctx>, i64)>,
        dropped: Vec<i64>,
        committed: Option<i64>,
    }

    impl<'ctx> BalancingStrategy<'ctx> for Pinning<'ctx> {
        type Backend = Solver<'ctx>;

        fn backend(&self) -> &Solver<'ctx> {
            &self.solver
        }

        fn generate_constraints(&mut self, _model: &Model) -> Result<(), BalancingError> {
            for (literal, value) in &self.active {
                let pinned = self.x._eq(&Int::from_i64(self.ctx, *value));
                ConstraintSolver::assert(&self.solver, &literal.implies(&pinned));
            }
            Ok(())
        }

        fn assumptions(&self) -> Vec<Bool<'ctx>> {
            self.active.iter().map(|(l, _)| l.clone()).collect()
        }

        fn assign_from_model(
            &mut self,
            solution: &z3::Model<'ctx>,
            _model: &mut Model,
        ) -> Result<(), BalancingError> {
            self.committed = solution.eval(&self.x, true).and_then(|v| v.as_i64());
            Ok(())
        }

        fn resolve_conflict(
            &mut self,
            core: Vec<Bool<'ctx>>,
            _model: &Model,
        ) -> Result<(), BalancingError> {
            // Drop the last member of the core
            if let Some(last) = core.last() {
                if let Some(position) = self.active.iter().position(|(l, _)| l == last) {
                    let (_, value) = self.active.remove(position);
                    self.dropped.push(value);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn resolves_until_sat() {
        let config = Configuration::default();
        let ctx = new_context(&config);
        let active = (1..=3)
            .map(|v| (Bool::new_const(&ctx, format!("pin_{}", v)), v))
            .collect();
        let mut strategy = Pinning {
            ctx: &ctx,
            solver: new_solver(&ctx, &config),
            x: Int::new_const(&ctx, "x"),
            active,
            dropped: Vec::new(),
            committed: None,
        };
        let mut model = Model::new_empty();
        run(&mut strategy, &mut model).unwrap();
        assert_eq!(strategy.active.len(), 1);
        assert_eq!(strategy.dropped.len(), 2);
        assert_eq!(strategy.committed, Some(strategy.active[0].1));
    }

    #[test]
    fn inconsistent_without_assumptions() {
        let config = Configuration::default();
        let ctx = new_context(&config);
        let solver = new_solver(&ctx, &config);
        let x = Int::new_const(&ctx, "x");
        ConstraintSolver::assert(&solver, &x._eq(&Int::from_i64(&ctx, 1)));
        ConstraintSolver::assert(&solver, &x._eq(&Int::from_i64(&ctx, 2)));
        let mut strategy = Pinning {
            ctx: &ctx,
            solver,
            x,
            active: Vec::new(),
            dropped: Vec::new(),
            committed: None,
        };
        assert_eq!(
            run(&mut strategy, &mut Model::new_empty()).unwrap_err(),
            BalancingError::InconsistentConstraints
        );
    }
}
