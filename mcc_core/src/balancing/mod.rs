//! Mass and charge balancing of a metabolic model
//!
//! [`curate`] runs the whole pipeline: candidates are gathered, the [`satcore::SatCore`]
//! strategy finds a balanced assignment while excluding as few reactions as possible, the
//! optimizers choose between equally valid solutions, and the result is reconciled with the
//! model as it was before.
use std::fmt::{Display, Formatter};
use std::time::Instant;

use derive_builder::Builder;
use indexmap::{IndexMap, IndexSet};
use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::balancing::engine::run;
use crate::balancing::gather::gather;
use crate::balancing::optimizer::{AdherenceOptimizer, FormulaOptimizer};
use crate::balancing::reconcile::{adjust_protons, fit_to_original, reintroduce_wildcards, ChEquivalents};
use crate::balancing::satcore::SatCore;
use crate::balancing::solver::new_context;
use crate::configuration::Configuration;
use crate::io::candidates::CandidateSource;
use crate::metabolic_model::assignment::Assignment;
use crate::metabolic_model::model::{Model, ModelError};

pub mod constraints;
pub mod engine;
pub mod gather;
pub mod optimizer;
pub mod reconcile;
pub mod satcore;
pub mod scoring;
pub mod solver;

/// Caller supplied inputs of a curation run
///
/// Fields left unset on the builder take their value from [`CurationOptions::default`].
#[derive(Builder, Clone, Debug)]
#[builder(default)]
pub struct CurationOptions {
    /// Assignments overriding every candidate of a metabolite
    pub fixed_assignments: IndexMap<String, Assignment>,
    /// Reactions which must end up balanced
    pub fixed_reactions: IndexSet<String>,
    /// Run the adherence and formula optimizers after balancing
    pub run_optimization: bool,
}

impl Default for CurationOptions {
    fn default() -> Self {
        CurationOptions {
            fixed_assignments: IndexMap::new(),
            fixed_reactions: IndexSet::new(),
            run_optimization: true,
        }
    }
}

/// Everything a curation run found out, besides the assignments written to the model
#[derive(Clone, Debug, Default, Serialize)]
pub struct CurationResult {
    /// Reactions which could not be balanced together with the rest
    pub unbalancable_reactions: IndexSet<String>,
    /// Exchange, sink, demand and growth reactions, never balanced
    pub pseudo_reactions: IndexSet<String>,
    /// For each unbalancable reaction, the reactions it conflicted with
    pub reaction_reasons: IndexMap<String, Vec<String>>,
    /// Protons added to every non-pseudo reaction
    pub proton_adjustments: IndexMap<String, i64>,
    /// Metabolites without any candidate constraint
    pub unknown_metabolites: IndexSet<String>,
    /// Metabolites left with an unresolved wildcard
    pub wildcard_metabolites: IndexSet<String>,
    /// Metabolites whose formula was inferred from their reactions
    pub inferred_metabolites: IndexSet<String>,
    /// Wildcard candidate metabolites that no reaction could pin down before solving
    pub unconstrained_metabolites: IndexSet<String>,
    pub reaction_scores: IndexMap<String, f64>,
    pub warnings: Vec<BalancingWarning>,
}

/// Something worth knowing which didn't stop the run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum BalancingWarning {
    /// The reaction had too many candidate combinations to score
    CombinationOverflow { reaction: String, combinations: u64 },
}

impl Display for BalancingWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BalancingWarning::CombinationOverflow {
                reaction,
                combinations,
            } => write!(
                f,
                "Reaction {} has {} candidate combinations, it was not scored",
                reaction, combinations
            ),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum BalancingError {
    #[error("No candidate data for metabolite {0}")]
    MissingCandidateData(String),
    #[error("Fixed reaction {reaction} can't be balanced, it conflicts with {core:?}")]
    FixedReactionUnbalanceable { reaction: String, core: Vec<String> },
    #[error("Constraint solver unavailable: {0}")]
    SolverUnavailable(String),
    #[error("Constraints are unsatisfiable even without any reaction")]
    InconsistentConstraints,
    #[error("Solver value for {symbol} of metabolite {metabolite} is not representable")]
    NonIntegralSolution { metabolite: String, symbol: String },
    #[error("Metabolite {0} is not part of the model")]
    UnknownMetabolite(String),
    #[error("Reaction {0} is not part of the model")]
    UnknownReaction(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Curate the formulas and charges of a model in place
///
/// On error the model is restored to its state before the call.
///
/// # Examples
/// ```rust
/// use mcc_core::balancing::{curate, CurationOptions};
/// use mcc_core::io::candidates::CandidateTable;
/// use mcc_core::metabolic_model::assignment::Assignment;
/// use mcc_core::metabolic_model::metabolite::MetaboliteBuilder;
/// use mcc_core::metabolic_model::model::Model;
/// use mcc_core::metabolic_model::reaction::ReactionBuilder;
///
/// let mut model = Model::new_empty();
/// for id in ["glc_c", "glc_e"] {
///     let metabolite = MetaboliteBuilder::default().id(id.to_string()).build().unwrap();
///     model.add_metabolite(metabolite).unwrap();
/// }
/// let transport = ReactionBuilder::default()
///     .id("GLCt".to_string())
///     .metabolites([("glc_e".to_string(), -1), ("glc_c".to_string(), 1)].into_iter().collect())
///     .build()
///     .unwrap();
/// model.add_reaction(transport).unwrap();
///
/// let mut candidates = CandidateTable::new();
/// for id in ["glc_c", "glc_e"] {
///     candidates.insert(id, Assignment::parse("C6H12O6", Some(0)).unwrap(), None);
/// }
/// let result = curate(&mut model, &candidates, &CurationOptions::default()).unwrap();
/// assert!(result.unbalancable_reactions.is_empty());
/// assert_eq!(model.metabolite("glc_c").unwrap().formula.to_string(), "C6H12O6");
/// ```
pub fn curate(
    model: &mut Model,
    source: &dyn CandidateSource,
    options: &CurationOptions,
) -> Result<CurationResult, BalancingError> {
    let snapshot = model.clone();
    match curate_with_reference(model, source, options, &snapshot) {
        Ok(result) => Ok(result),
        Err(err) => {
            *model = snapshot;
            Err(err)
        }
    }
}

fn curate_with_reference(
    model: &mut Model,
    source: &dyn CandidateSource,
    options: &CurationOptions,
    reference: &Model,
) -> Result<CurationResult, BalancingError> {
    let config = Configuration::current();
    let total = Instant::now();
    let pseudo_reactions = model.pseudo_reactions();

    let gathered = gather(model, source, &options.fixed_assignments)?;
    info!(
        "[{:.3} s] Collected candidates",
        total.elapsed().as_secs_f64()
    );

    let ctx = new_context(&config);
    let start = Instant::now();
    let mut satcore = SatCore::new(
        &ctx,
        model,
        &gathered,
        &options.fixed_reactions,
        config.clone(),
    )?;
    run(&mut satcore, model)?;
    let outcome = satcore.into_outcome();
    info!(
        "[{:.3} s] Finished balancibility check, {} reactions were unbalancable",
        start.elapsed().as_secs_f64(),
        outcome.excluded.len()
    );

    let mut excluded = outcome.excluded.clone();
    let mut unknown = outcome.unknown_metabolites.clone();
    if options.run_optimization {
        let start = Instant::now();
        let mut adherence =
            AdherenceOptimizer::new(&ctx, model, &outcome, &gathered, reference, config.clone());
        run(&mut adherence, model)?;
        excluded.extend(adherence.excluded().iter().copied());
        info!(
            "[{:.3} s] Finished adherence optimization",
            start.elapsed().as_secs_f64()
        );

        let start = Instant::now();
        let mut formula =
            FormulaOptimizer::new(&ctx, model, &outcome, &gathered, reference, config.clone());
        run(&mut formula, model)?;
        excluded.extend(formula.excluded().iter().copied());
        unknown.extend(formula.unknown_metabolites().iter().copied());
        info!(
            "[{:.3} s] Finished formula optimization",
            start.elapsed().as_secs_f64()
        );
    }

    let report = reintroduce_wildcards(model, &gathered, reference);
    fit_to_original(model, &ChEquivalents::new(&gathered), reference);
    let proton_adjustments = adjust_protons(model)?;
    info!(
        "[{:.3} s] Finished curation",
        total.elapsed().as_secs_f64()
    );

    let metabolite_ids = |indices: &IndexSet<usize>| -> IndexSet<String> {
        indices
            .iter()
            .map(|m| model.metabolite_at(*m).id.clone())
            .collect()
    };
    let reaction_id = |r: &usize| model.reaction_at(*r).id.clone();
    Ok(CurationResult {
        unbalancable_reactions: excluded.iter().map(reaction_id).collect(),
        pseudo_reactions,
        reaction_reasons: outcome
            .reasons
            .iter()
            .map(|(r, reason)| (reaction_id(r), reason.iter().map(reaction_id).collect()))
            .collect(),
        proton_adjustments,
        unknown_metabolites: metabolite_ids(&unknown),
        wildcard_metabolites: metabolite_ids(&report.wildcards),
        inferred_metabolites: metabolite_ids(&report.inferred),
        unconstrained_metabolites: metabolite_ids(&gathered.unconstrained),
        reaction_scores: model
            .reactions()
            .zip(&outcome.scores)
            .map(|(r, score)| (r.id.clone(), *score))
            .collect(),
        warnings: outcome.warnings,
    })
}
