//! Reaction quality scores, used to order reactions when an unsat core is resolved
//!
//! Every reaction's balanced candidate combinations are enumerated. Each concrete candidate
//! appearing in a balanced combination gets a vote, and votes are normalized per metabolite.
//! A reaction scores the best mean of `2^vote` over its balanced combinations.
use indexmap::IndexMap;
use log::debug;

use crate::balancing::gather::GatheredAssignments;
use crate::balancing::BalancingWarning;
use crate::metabolic_model::assignment::{Assignment, Candidate};
use crate::metabolic_model::model::Model;

/// Options for one participant of a reaction
type Options = Vec<Candidate>;

fn participant_options(gathered: &GatheredAssignments, metabolite: usize) -> Options {
    let candidates = &gathered.candidates[metabolite];
    if candidates.is_empty() || candidates.iter().any(Assignment::is_wildcard) {
        vec![Candidate::Free]
    } else {
        candidates.iter().map(Candidate::from).collect()
    }
}

/// Every balanced combination of candidates for a reaction
///
/// Returns `Err(count)` without enumerating anything if the number of combinations is over
/// `limit`. A combination with a free participant always counts as balanced.
fn balanced_combinations(
    model: &Model,
    gathered: &GatheredAssignments,
    reaction: usize,
    limit: u64,
) -> Result<Vec<Vec<Candidate>>, u64> {
    let participants = model.reaction_at(reaction).participants();
    let options: Vec<Options> = participants
        .iter()
        .map(|(m, _)| participant_options(gathered, *m))
        .collect();
    let count = options
        .iter()
        .fold(1u64, |acc, o| acc.saturating_mul(o.len() as u64));
    if count > limit {
        return Err(count);
    }

    let mut balanced = Vec::new();
    let mut odometer = vec![0usize; options.len()];
    loop {
        let combination: Vec<Candidate> = odometer
            .iter()
            .zip(&options)
            .map(|(position, o)| o[*position].clone())
            .collect();
        let is_balanced = combination.iter().any(|c| *c == Candidate::Free) || {
            let chosen: Vec<(usize, Assignment)> = participants
                .iter()
                .zip(&combination)
                .filter_map(|((m, _), candidate)| match candidate {
                    Candidate::Fixed(formula, charge) => {
                        Some((*m, Assignment::new(formula.clone(), *charge)))
                    }
                    _ => None,
                })
                .collect();
            let assignments: IndexMap<usize, &Assignment> =
                chosen.iter().map(|(m, a)| (*m, a)).collect();
            model.is_balanced_with(reaction, &assignments)
        };
        if is_balanced {
            balanced.push(combination);
        }

        // Advance, rightmost wheel first
        let mut wheel = odometer.len();
        loop {
            if wheel == 0 {
                return Ok(balanced);
            }
            wheel -= 1;
            odometer[wheel] += 1;
            if odometer[wheel] < options[wheel].len() {
                break;
            }
            odometer[wheel] = 0;
        }
    }
}

/// Score every reaction, pseudo reactions and reactions with too many combinations score 0
pub fn score_reactions(
    model: &Model,
    gathered: &GatheredAssignments,
    limit: u64,
) -> (Vec<f64>, Vec<BalancingWarning>) {
    let mut warnings = Vec::new();
    let mut per_reaction = Vec::with_capacity(model.reaction_count());
    let mut votes: Vec<IndexMap<Candidate, f64>> = vec![IndexMap::new(); model.metabolite_count()];

    for (index, reaction) in model.reactions().enumerate() {
        if reaction.is_pseudo {
            per_reaction.push(Vec::new());
            continue;
        }
        match balanced_combinations(model, gathered, index, limit) {
            Ok(combinations) => {
                for combination in &combinations {
                    for ((m, _), candidate) in reaction.participants().iter().zip(combination) {
                        if candidate.is_concrete() {
                            *votes[*m].entry(candidate.clone()).or_default() += 1.;
                        }
                    }
                }
                per_reaction.push(combinations);
            }
            Err(combinations) => {
                debug!(
                    "Too many combinations ({}) for {}, not scoring it",
                    combinations, reaction.id
                );
                warnings.push(BalancingWarning::CombinationOverflow {
                    reaction: reaction.id.clone(),
                    combinations,
                });
                per_reaction.push(Vec::new());
            }
        }
    }

    for metabolite_votes in votes.iter_mut() {
        let total: f64 = metabolite_votes.values().sum();
        if total > 0. {
            metabolite_votes.values_mut().for_each(|v| *v /= total);
        }
    }

    let scores = model
        .reactions()
        .zip(&per_reaction)
        .map(|(reaction, combinations)| {
            combinations
                .iter()
                .filter(|combination| !combination.is_empty())
                .map(|combination| {
                    let sum: f64 = reaction
                        .participants()
                        .iter()
                        .zip(combination)
                        .filter_map(|((m, _), candidate)| votes[*m].get(candidate))
                        .map(|vote| 2f64.powf(*vote))
                        .sum();
                    sum / combination.len() as f64
                })
                .fold(0., f64::max)
        })
        .collect();
    (scores, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancing::fixtures::{model_with, source_from};
    use crate::balancing::gather::gather;

    #[test]
    fn popular_candidates_score_higher() {
        // b has two candidates, only one of them balances both reactions
        let model = model_with(
            &[("a", "", None), ("b", "", None), ("c", "", None), ("d", "", None)],
            &[
                ("R1", &[("a", -1), ("b", 1)]),
                ("R2", &[("b", -1), ("c", 1)]),
                ("R3", &[("c", -1), ("d", 1)]),
            ],
        );
        let source = source_from(&[
            ("a", &[("C2H4O2", Some(0))]),
            ("b", &[("C2H4O2", Some(0)), ("C3H6O3", Some(0))]),
            ("c", &[("C2H4O2", Some(0))]),
            ("d", &[("N2", Some(0))]),
        ]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        let (scores, warnings) = score_reactions(&model, &gathered, 1_000_000);
        assert!(warnings.is_empty());
        assert!(scores[0] > 1.);
        assert_eq!(scores[0], scores[1]);
        // d never balances
        assert_eq!(scores[2], 0.);
    }

    #[test]
    fn free_participants_balance() {
        let model = model_with(
            &[("a", "", None), ("b", "", None)],
            &[("R1", &[("a", -1), ("b", 1)])],
        );
        let source = source_from(&[("a", &[("CH4", Some(0))]), ("b", &[("CR", None)])]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        let (scores, _) = score_reactions(&model, &gathered, 1_000_000);
        // (2^1 + nothing for the free one) / 2
        assert_eq!(scores[0], 1.);
    }

    #[test]
    fn wildcard_participants_are_free() {
        let model = model_with(&[("a", "", None), ("b", "", None)], &[]);
        let source = source_from(&[
            ("a", &[("CH4", Some(0)), ("CR", None)]),
            ("b", &[("CH4", Some(0))]),
        ]);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();
        assert_eq!(participant_options(&gathered, 0), vec![Candidate::Free]);
        assert_eq!(
            participant_options(&gathered, 1),
            vec![Candidate::Fixed("CH4".parse().unwrap(), Some(0))]
        );
    }

    #[test]
    fn overflow_is_skipped() {
        let ids: Vec<String> = (0..7).map(|i| format!("m{}", i)).collect();
        let formulas: Vec<String> = (1..=20).map(|k| format!("C{}H{}", k, 2 * k)).collect();
        let metabolites: Vec<(&str, &str, Option<i32>)> =
            ids.iter().map(|id| (id.as_str(), "", None)).collect();
        let stoichiometry: Vec<(&str, i64)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), if i < 3 { -1 } else { 1 }))
            .collect();
        let model = model_with(&metabolites, &[("BIG", stoichiometry.as_slice())]);
        let candidates: Vec<(&str, Option<i32>)> =
            formulas.iter().map(|f| (f.as_str(), Some(0))).collect();
        let table: Vec<(&str, &[(&str, Option<i32>)])> = ids
            .iter()
            .map(|id| (id.as_str(), candidates.as_slice()))
            .collect();
        let source = source_from(&table);
        let gathered = gather(&model, &source, &IndexMap::new()).unwrap();

        let (scores, warnings) = score_reactions(&model, &gathered, 1_000_000);
        assert_eq!(scores, vec![0.]);
        assert_eq!(
            warnings,
            vec![BalancingWarning::CombinationOverflow {
                reaction: "BIG".to_string(),
                combinations: 20u64.pow(7),
            }]
        );
    }
}
