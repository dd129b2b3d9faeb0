//! Collect the candidate assignments of every metabolite before constraints are built
use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::balancing::BalancingError;
use crate::io::candidates::CandidateSource;
use crate::metabolic_model::assignment::Assignment;
use crate::metabolic_model::model::Model;

/// Candidate assignments for a model, addressed by metabolite index
#[derive(Clone, Debug, Default)]
pub struct GatheredAssignments {
    /// Candidates of every metabolite, a fixed metabolite has its fixed assignment only
    pub candidates: Vec<IndexSet<Assignment>>,
    /// Caller fixed assignments
    pub fixed: IndexMap<usize, Assignment>,
    /// Metabolites with at least one wildcard candidate
    pub wildcard_flagged: IndexSet<usize>,
    /// Wildcard flagged metabolites which no reaction can pin down
    pub unconstrained: IndexSet<usize>,
}

impl GatheredAssignments {
    pub fn is_fixed(&self, metabolite: usize) -> bool {
        self.fixed.contains_key(&metabolite)
    }
}

/// Merge fixed assignments with candidates from a source
///
/// # Errors
/// `MissingCandidateData` if the source never looked up some non-fixed metabolite, and
/// `UnknownMetabolite` if a fixed assignment names a metabolite missing from the model.
pub fn gather(
    model: &Model,
    source: &dyn CandidateSource,
    fixed_assignments: &IndexMap<String, Assignment>,
) -> Result<GatheredAssignments, BalancingError> {
    let mut fixed = IndexMap::new();
    for (id, assignment) in fixed_assignments {
        let index = model
            .metabolite_index(id)
            .ok_or_else(|| BalancingError::UnknownMetabolite(id.clone()))?;
        fixed.insert(index, assignment.clone());
    }

    let mut candidates = Vec::with_capacity(model.metabolite_count());
    let mut wildcard_flagged = IndexSet::new();
    for (index, metabolite) in model.metabolites().enumerate() {
        if let Some(assignment) = fixed.get(&index) {
            candidates.push(IndexSet::from([assignment.clone()]));
            continue;
        }
        let found = source
            .get_candidates(metabolite)
            .ok_or_else(|| BalancingError::MissingCandidateData(metabolite.id.clone()))?;
        if found.iter().any(Assignment::is_wildcard) {
            wildcard_flagged.insert(index);
        }
        candidates.push(found);
    }

    let (unconstrained, _) = propagate_constrained(model, &wildcard_flagged);
    debug!(
        "{} wildcard metabolites, {} of them unconstrained",
        wildcard_flagged.len(),
        unconstrained.len()
    );
    Ok(GatheredAssignments {
        candidates,
        fixed,
        wildcard_flagged,
        unconstrained,
    })
}

/// Fixed point elimination of unknown metabolites over the reaction graph
///
/// An unknown metabolite becomes known when some non-pseudo reaction it takes part in has no
/// other unknown participant. Resolving one metabolite can free up its neighbours, so they are
/// queued again. Returns the metabolites that stay unknown and those that were resolved.
pub(crate) fn propagate_constrained(
    model: &Model,
    unknown: &IndexSet<usize>,
) -> (IndexSet<usize>, IndexSet<usize>) {
    let mut remaining = unknown.clone();
    let mut resolved = IndexSet::new();
    let mut worklist: VecDeque<usize> = unknown.iter().copied().collect();
    while let Some(metabolite) = worklist.pop_front() {
        if !remaining.contains(&metabolite) {
            continue;
        }
        let reactions: Vec<usize> = model
            .metabolite_at(metabolite)
            .reaction_indices()
            .iter()
            .copied()
            .filter(|r| !model.reaction_at(*r).is_pseudo)
            .collect();
        let sole_unknown = reactions.iter().any(|r| {
            model
                .reaction_at(*r)
                .participants()
                .iter()
                .all(|(m, _)| *m == metabolite || !remaining.contains(m))
        });
        if !sole_unknown {
            continue;
        }
        remaining.shift_remove(&metabolite);
        resolved.insert(metabolite);
        for r in reactions {
            for (m, _) in model.reaction_at(r).participants() {
                if remaining.contains(m) {
                    worklist.push_back(*m);
                }
            }
        }
    }
    (remaining, resolved)
}
