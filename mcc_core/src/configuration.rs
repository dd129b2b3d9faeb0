//! Process wide configuration for curation runs
use std::sync::{LazyLock, PoisonError, RwLock};

pub static CONFIGURATION: LazyLock<RwLock<Configuration>> =
    LazyLock::new(|| RwLock::new(Configuration::default()));

/// Tunable constants used by the balancing engine and the optimizers
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Largest number of candidate combinations enumerated when scoring a single reaction
    pub combination_limit: u64,
    /// Score given to caller fixed reactions inside an unsat core, multiplied by the core size
    pub fixed_reaction_score: f64,
    /// Ask the solver for minimized unsat cores
    pub minimize_cores: bool,
    /// Timeout for every solver call, in milliseconds
    pub solver_timeout_ms: Option<u64>,
    /// Weight of matching a reference formula during adherence optimization
    pub adherence_element_weight: u32,
    /// Weight of matching a reference formula and charge during adherence optimization
    pub adherence_charge_weight: u32,
    /// Per-rank weight of candidate preference during formula optimization
    pub formula_rank_weight: u32,
    /// Proton adjustments larger than this are logged as warnings
    pub large_proton_adjustment: i64,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            combination_limit: 1_000_000,
            fixed_reaction_score: 100.,
            minimize_cores: true,
            solver_timeout_ms: None,
            adherence_element_weight: 1,
            adherence_charge_weight: 10,
            formula_rank_weight: 10,
            large_proton_adjustment: 10,
        }
    }
}

impl Configuration {
    /// Snapshot of the current global configuration
    ///
    /// A poisoned lock still holds a valid configuration, so it is read anyway.
    pub fn current() -> Configuration {
        CONFIGURATION
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.combination_limit, 1_000_000);
        assert!(config.minimize_cores);
        assert!(config.solver_timeout_ms.is_none());
        assert!(config.adherence_charge_weight > config.adherence_element_weight);
    }
}
