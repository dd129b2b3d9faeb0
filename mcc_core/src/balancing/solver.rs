//! Thin seam over the SMT backends used by the balancing strategies
use z3::ast::Bool;
use z3::{Config, Context, Model, Optimize, Params, SatResult, Solver};

use crate::configuration::Configuration;

/// Operations the balancing driver needs from a constraint backend
pub trait ConstraintSolver<'ctx> {
    /// Add a hard constraint
    fn assert(&self, constraint: &Bool<'ctx>);
    /// Check satisfiability, assuming every literal in `assumptions` holds
    fn check(&self, assumptions: &[Bool<'ctx>]) -> SatResult;
    /// Satisfying model of the last successful check
    fn model(&self) -> Option<Model<'ctx>>;
    /// Subset of the assumptions that can't hold together, after an unsatisfiable check
    fn unsat_core(&self) -> Vec<Bool<'ctx>>;
}

impl<'ctx> ConstraintSolver<'ctx> for Solver<'ctx> {
    fn assert(&self, constraint: &Bool<'ctx>) {
        Solver::assert(self, constraint)
    }

    fn check(&self, assumptions: &[Bool<'ctx>]) -> SatResult {
        self.check_assumptions(assumptions)
    }

    fn model(&self) -> Option<Model<'ctx>> {
        self.get_model()
    }

    fn unsat_core(&self) -> Vec<Bool<'ctx>> {
        self.get_unsat_core()
    }
}

/// The optimizer only ever runs without assumptions, so it never has a core to offer
impl<'ctx> ConstraintSolver<'ctx> for Optimize<'ctx> {
    fn assert(&self, constraint: &Bool<'ctx>) {
        Optimize::assert(self, constraint)
    }

    fn check(&self, assumptions: &[Bool<'ctx>]) -> SatResult {
        Optimize::check(self, assumptions)
    }

    fn model(&self) -> Option<Model<'ctx>> {
        self.get_model()
    }

    fn unsat_core(&self) -> Vec<Bool<'ctx>> {
        Vec::new()
    }
}

/// Create a solver context following the configuration
pub fn new_context(config: &Configuration) -> Context {
    let mut z3_config = Config::new();
    z3_config.set_model_generation(true);
    if let Some(timeout) = config.solver_timeout_ms {
        z3_config.set_timeout_msec(timeout);
    }
    Context::new(&z3_config)
}

/// Create a solver for assumption based checking, minimizing cores if configured
pub fn new_solver<'ctx>(ctx: &'ctx Context, config: &Configuration) -> Solver<'ctx> {
    let solver = Solver::new(ctx);
    if config.minimize_cores {
        let mut params = Params::new(ctx);
        params.set_bool("core.minimize", true);
        solver.set_params(&params);
    }
    solver
}
