//! Post solve reconciliation of a balanced model with its candidates and its prior state
use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde_json::Value;

use crate::balancing::gather::{propagate_constrained, GatheredAssignments};
use crate::balancing::BalancingError;
use crate::metabolic_model::assignment::Assignment;
use crate::metabolic_model::formula::Formula;
use crate::metabolic_model::model::Model;

pub const INFERRED_ECO: &str = "ECO:0000305";
/// Note key recording how a reconciled formula came about
pub const INFERENCE_NOTE: &str = "inference";

/// Candidates of every metabolite grouped by non-hydrogen formula, then by `H - charge`
///
/// Assignments in the same group only differ by protons.
#[derive(Clone, Debug, Default)]
pub struct ChEquivalents {
    classes: Vec<IndexMap<Formula, IndexMap<Option<i64>, Vec<Assignment>>>>,
}

impl ChEquivalents {
    pub fn new(gathered: &GatheredAssignments) -> Self {
        let classes = gathered
            .candidates
            .iter()
            .map(|candidates| {
                let mut grouped: IndexMap<Formula, IndexMap<Option<i64>, Vec<Assignment>>> =
                    IndexMap::new();
                for candidate in candidates {
                    grouped
                        .entry(candidate.formula.without_hydrogen())
                        .or_default()
                        .entry(candidate.h_charge_difference())
                        .or_default()
                        .push(candidate.clone());
                }
                grouped
            })
            .collect();
        ChEquivalents { classes }
    }

    /// Candidates of a metabolite equivalent to the given assignment up to protons
    pub fn equivalents(&self, metabolite: usize, assignment: &Assignment) -> &[Assignment] {
        self.classes
            .get(metabolite)
            .and_then(|grouped| grouped.get(&assignment.formula.without_hydrogen()))
            .and_then(|by_difference| by_difference.get(&assignment.h_charge_difference()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Metabolites left with a wildcard, and those whose formula could be inferred
#[derive(Clone, Debug, Default)]
pub struct WildcardReport {
    pub wildcards: IndexSet<usize>,
    pub inferred: IndexSet<usize>,
}

/// Mark metabolites with unresolved wildcards, and put the wildcard back into their formula
///
/// A metabolite is a wildcard if it had a wildcard candidate and ended on none of its own
/// candidates, or if it had no candidates and no longer matches the reference. Wildcards
/// that are the only unknown of some reaction are inferred instead, and annotated as such.
pub fn reintroduce_wildcards(
    model: &mut Model,
    gathered: &GatheredAssignments,
    reference: &Model,
) -> WildcardReport {
    let mut wildcards = IndexSet::new();
    for (index, metabolite) in model.metabolites().enumerate() {
        let candidates = &gathered.candidates[index];
        if candidates.iter().any(Assignment::is_wildcard)
            && !candidates.iter().any(|c| c.formula == metabolite.formula)
        {
            wildcards.insert(index);
        }
        if candidates.is_empty() {
            let changed = reference.metabolite(&metabolite.id).is_some_and(|prior| {
                prior.formula != metabolite.formula || prior.charge != metabolite.charge
            });
            if changed {
                wildcards.insert(index);
            }
        }
    }

    let (wildcards, inferred) = propagate_constrained(model, &wildcards);
    for index in &inferred {
        let metabolite = model.metabolite_at_mut(*index);
        metabolite.annotation.insert(
            "eco".to_string(),
            Value::String(INFERRED_ECO.to_string()),
        );
        metabolite.notes.insert(
            INFERENCE_NOTE.to_string(),
            Value::String("Inferred formula".to_string()),
        );
    }
    for index in &wildcards {
        let metabolite = model.metabolite_at_mut(*index);
        let matching = gathered.candidates[*index]
            .iter()
            .find(|c| c.formula.matches_ignoring_wildcard(&metabolite.formula));
        match matching {
            Some(candidate) => metabolite.formula = candidate.formula.clone(),
            None => metabolite.formula.set(Formula::WILDCARD, 1),
        }
        metabolite.notes.insert(
            INFERENCE_NOTE.to_string(),
            Value::String("Unresolved wildcard".to_string()),
        );
        debug!("{} keeps a wildcard: {}", metabolite.id, metabolite.formula);
    }
    WildcardReport {
        wildcards,
        inferred,
    }
}

/// Restore the reference assignment wherever it only differs from the result by protons
pub fn fit_to_original(model: &mut Model, equivalents: &ChEquivalents, reference: &Model) {
    for index in 0..model.metabolite_count() {
        let metabolite = model.metabolite_at(index);
        let prior = match reference.metabolite(&metabolite.id) {
            Some(prior) => prior.assignment(),
            None => continue,
        };
        if metabolite.formula.without_hydrogen() != prior.formula.without_hydrogen() {
            continue;
        }
        if equivalents
            .equivalents(index, &metabolite.assignment())
            .contains(&prior)
        {
            model.metabolite_at_mut(index).set_assignment(&prior);
        }
    }
}

/// Turn the leftover charge of every non-pseudo reaction into protons
///
/// Returns the number of protons added per reaction id, including zeros.
pub fn adjust_protons(model: &mut Model) -> Result<IndexMap<String, i64>, BalancingError> {
    let reaction_ids: Vec<String> = model
        .reactions()
        .filter(|r| !r.is_pseudo)
        .map(|r| r.id.clone())
        .collect();
    let mut adjustments = IndexMap::new();
    for id in reaction_ids {
        let protons = model.adjust_protons(&id)?;
        adjustments.insert(id, protons);
    }
    Ok(adjustments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancing::fixtures::{model_with, source_from};
    use crate::balancing::gather::gather;

    #[test]
    fn equivalence_classes() {
        let model = model_with(&[("ac", "", None)], &[]);
        let source = source_from(&[(
            "ac",
            &[("C2H3O2", Some(-1)), ("C2H4O2", Some(0)), ("C2H2O2", Some(0))],
        )]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        let equivalents = ChEquivalents::new(&gathered);
        let acetate = Assignment::parse("C2H3O2", Some(-1)).unwrap();
        assert_eq!(equivalents.equivalents(0, &acetate).len(), 2);
        let unknown_charge = Assignment::parse("C2H3O2", None).unwrap();
        assert!(equivalents.equivalents(0, &unknown_charge).is_empty());
    }

    #[test]
    fn prior_protonation_restored() {
        let reference = model_with(&[("ac", "C2H4O2", Some(0))], &[]);
        let mut model = reference.clone();
        model
            .set_assignment("ac", &Assignment::parse("C2H3O2", Some(-1)).unwrap())
            .unwrap();
        let source = source_from(&[("ac", &[("C2H3O2", Some(-1)), ("C2H4O2", Some(0))])]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        fit_to_original(&mut model, &ChEquivalents::new(&gathered), &reference);
        assert_eq!(
            model.metabolite("ac").unwrap().assignment(),
            Assignment::parse("C2H4O2", Some(0)).unwrap()
        );
    }

    #[test]
    fn isolated_wildcards_survive() {
        // Two wildcards sharing their only reaction can't be told apart
        let mut model = model_with(
            &[("x", "", None), ("y", "", None)],
            &[("R", &[("x", -1), ("y", 1)])],
        );
        let reference = model.clone();
        let source = source_from(&[("x", &[("C3R", Some(0))]), ("y", &[("C3O2R", Some(0))])]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        model
            .set_assignment("x", &Assignment::parse("C3O2", Some(0)).unwrap())
            .unwrap();
        model
            .set_assignment("y", &Assignment::parse("C3O2", Some(0)).unwrap())
            .unwrap();
        let report = reintroduce_wildcards(&mut model, &gathered, &reference);
        assert_eq!(report.wildcards, IndexSet::from([0, 1]));
        assert!(report.inferred.is_empty());
        assert_eq!(model.metabolite("x").unwrap().formula.to_string(), "C3O2R");
        assert_eq!(model.metabolite("y").unwrap().formula.to_string(), "C3O2R");
        for id in ["x", "y"] {
            let metabolite = model.metabolite(id).unwrap();
            assert_eq!(
                metabolite.notes[INFERENCE_NOTE],
                Value::String("Unresolved wildcard".to_string())
            );
            assert!(!metabolite.annotation.contains_key("eco"));
        }
    }

    #[test]
    fn protons_per_reaction() {
        let mut model = model_with(
            &[("aca", "C2H4O2", Some(0)), ("ac", "C2H3O2", Some(-1)), ("h", "H", Some(1))],
            &[
                ("DEPROT", &[("aca", -1), ("ac", 1)]),
                ("EX_ac", &[("ac", -1)]),
            ],
        );
        let adjustments = adjust_protons(&mut model).unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments["DEPROT"], -1);
        assert!(model.is_balanced(model.reaction_index("DEPROT").unwrap()));
    }
}
