//! This module provides the Model struct for representing an entire metabolic model
//!
//! Metabolites and reactions are stored in insertion ordered maps, and their positions in
//! those maps double as arena indices. Reactions refer to metabolites, and metabolites back to
//! reactions, only through these indices.
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;

use crate::configuration::Configuration;
use crate::metabolic_model::assignment::Assignment;
use crate::metabolic_model::formula::Formula;
use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::Reaction;

/// Represents a Genome Scale Metabolic Model
#[derive(Clone, Debug)]
pub struct Model {
    /// Map of metabolite ids to Metabolite Objects
    metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to Reaction Objects
    reactions: IndexMap<String, Reaction>,
    /// Id associated with the Model
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: Option<IndexMap<String, String>>,
    /// A version identifier for the Model, stored as a string
    pub version: Option<String>,
}

impl Model {
    pub fn new_empty() -> Self {
        Model {
            metabolites: IndexMap::new(),
            reactions: IndexMap::new(),
            id: None,
            compartments: None,
            version: None,
        }
    }

    /// Add a metabolite to the model, returning its index
    ///
    /// # Examples
    /// ```rust
    /// use mcc_core::metabolic_model::model::Model;
    /// use mcc_core::metabolic_model::metabolite::MetaboliteBuilder;
    /// let mut model = Model::new_empty();
    /// let h2o = MetaboliteBuilder::default().id("h2o_c".to_string()).build().unwrap();
    /// assert_eq!(model.add_metabolite(h2o).unwrap(), 0);
    /// ```
    pub fn add_metabolite(&mut self, mut metabolite: Metabolite) -> Result<usize, ModelError> {
        if self.metabolites.contains_key(&metabolite.id) {
            return Err(ModelError::DuplicateMetabolite(metabolite.id));
        }
        metabolite.reactions.clear();
        let (index, _) = self.metabolites.insert_full(metabolite.id.clone(), metabolite);
        Ok(index)
    }

    /// Add a reaction to the model, returning its index
    ///
    /// Every metabolite in the reaction must already be part of the model. Zero coefficients are
    /// dropped, and the reaction is marked pseudo if its shape or tags say so.
    pub fn add_reaction(&mut self, mut reaction: Reaction) -> Result<usize, ModelError> {
        if self.reactions.contains_key(&reaction.id) {
            return Err(ModelError::DuplicateReaction(reaction.id));
        }
        reaction.metabolites.retain(|_, coefficient| *coefficient != 0);
        let mut participants = Vec::with_capacity(reaction.metabolites.len());
        for (metabolite_id, coefficient) in &reaction.metabolites {
            let index = self.metabolites.get_index_of(metabolite_id).ok_or_else(|| {
                ModelError::UnknownMetabolite {
                    reaction: reaction.id.clone(),
                    metabolite: metabolite_id.clone(),
                }
            })?;
            participants.push((index, *coefficient));
        }
        reaction.is_pseudo = reaction.is_pseudo || reaction.classify_pseudo();
        reaction.participants = participants;
        let index = self.reactions.len();
        for (metabolite, _) in &reaction.participants {
            self.metabolites[*metabolite].reactions.push(index);
        }
        self.reactions.insert(reaction.id.clone(), reaction);
        Ok(index)
    }

    // region Access
    pub fn metabolite(&self, id: &str) -> Option<&Metabolite> {
        self.metabolites.get(id)
    }

    pub fn metabolite_index(&self, id: &str) -> Option<usize> {
        self.metabolites.get_index_of(id)
    }

    /// Metabolite at an arena index, indices handed out by the model are always valid
    pub fn metabolite_at(&self, index: usize) -> &Metabolite {
        &self.metabolites[index]
    }

    pub(crate) fn metabolite_at_mut(&mut self, index: usize) -> &mut Metabolite {
        &mut self.metabolites[index]
    }

    pub fn metabolites(&self) -> impl Iterator<Item = &Metabolite> {
        self.metabolites.values()
    }

    pub fn metabolite_count(&self) -> usize {
        self.metabolites.len()
    }

    pub fn reaction(&self, id: &str) -> Option<&Reaction> {
        self.reactions.get(id)
    }

    pub fn reaction_index(&self, id: &str) -> Option<usize> {
        self.reactions.get_index_of(id)
    }

    /// Reaction at an arena index, indices handed out by the model are always valid
    pub fn reaction_at(&self, index: usize) -> &Reaction {
        &self.reactions[index]
    }

    pub fn reactions(&self) -> impl Iterator<Item = &Reaction> {
        self.reactions.values()
    }

    pub fn reaction_count(&self) -> usize {
        self.reactions.len()
    }

    /// Overwrite the formula and charge of a metabolite
    pub fn set_assignment(
        &mut self,
        metabolite_id: &str,
        assignment: &Assignment,
    ) -> Result<(), ModelError> {
        self.metabolites
            .get_mut(metabolite_id)
            .ok_or_else(|| ModelError::MetaboliteNotFound(metabolite_id.to_string()))?
            .set_assignment(assignment);
        Ok(())
    }

    /// Ids of all pseudo reactions
    pub fn pseudo_reactions(&self) -> IndexSet<String> {
        self.reactions
            .values()
            .filter(|r| r.is_pseudo)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Every element symbol (other than the wildcard) in the current metabolite formulae
    pub fn elements(&self) -> BTreeSet<String> {
        self.metabolites
            .values()
            .flat_map(|m| m.formula.elements())
            .filter(|(e, _)| *e != Formula::WILDCARD)
            .map(|(e, _)| e.to_string())
            .collect()
    }
    // endregion Access

    // region Balance
    /// Signed element sums over the reaction, zero entries are left out
    pub fn mass_balance(&self, reaction: usize) -> BTreeMap<String, i64> {
        mass_balance(self.current_terms(reaction))
    }

    /// Signed charge sum over the reaction, `None` if any participant has an unknown charge
    pub fn charge_balance(&self, reaction: usize) -> Option<i64> {
        charge_balance(self.current_terms(reaction))
    }

    /// Whether every element other than hydrogen sums to zero
    pub fn is_nonh_balanced(&self, reaction: usize) -> bool {
        self.mass_balance(reaction)
            .keys()
            .all(|element| element == Formula::HYDROGEN)
    }

    /// Whether the charge sum equals the hydrogen sum, unknown charges are never balanced
    pub fn is_ch_balanced(&self, reaction: usize) -> bool {
        let hydrogen = self
            .mass_balance(reaction)
            .get(Formula::HYDROGEN)
            .copied()
            .unwrap_or(0);
        self.charge_balance(reaction) == Some(hydrogen)
    }

    /// Whether the reaction is fully mass and charge balanced
    pub fn is_balanced(&self, reaction: usize) -> bool {
        self.mass_balance(reaction).is_empty() && self.charge_balance(reaction) == Some(0)
    }

    /// Balance predicate with overriding assignments for some metabolites
    ///
    /// Metabolites missing from `assignments` use their current values. The reaction counts as
    /// balanced when all non-hydrogen elements cancel and, if every charge is known, the charge
    /// sum equals the hydrogen sum.
    pub fn is_balanced_with(&self, reaction: usize, assignments: &IndexMap<usize, &Assignment>) -> bool {
        let terms = self.reactions[reaction]
            .participants
            .iter()
            .map(|(m, coefficient)| match assignments.get(m) {
                Some(a) => (*coefficient, &a.formula, a.charge),
                None => {
                    let met = &self.metabolites[*m];
                    (*coefficient, &met.formula, met.charge)
                }
            });
        ch_balanced(terms)
    }

    fn current_terms(&self, reaction: usize) -> impl Iterator<Item = (i64, &Formula, Option<i32>)> {
        self.reactions[reaction].participants.iter().map(|(m, c)| {
            let met = &self.metabolites[*m];
            (*c, &met.formula, met.charge)
        })
    }
    // endregion Balance

    // region Graph
    /// Breadth first distances from one reaction to others over the shares-a-metabolite graph
    ///
    /// Only reactions in `within` are visited. The origin itself is at distance 1, so the
    /// reciprocal of a distance is always defined.
    pub fn reaction_distances(&self, from: usize, within: &IndexSet<usize>) -> IndexMap<usize, usize> {
        let mut distances = IndexMap::new();
        let mut queue = VecDeque::from([(from, 1usize)]);
        while let Some((reaction, distance)) = queue.pop_front() {
            if distances.contains_key(&reaction) {
                continue;
            }
            distances.insert(reaction, distance);
            for (metabolite, _) in &self.reactions[reaction].participants {
                for neighbour in &self.metabolites[*metabolite].reactions {
                    if within.contains(neighbour) && !distances.contains_key(neighbour) {
                        queue.push_back((*neighbour, distance + 1));
                    }
                }
            }
        }
        distances
    }
    // endregion Graph

    // region Protons
    /// Add or remove protons so that a cH-balanced reaction becomes fully charge balanced
    ///
    /// The proton already taking part in the reaction is used if there is one, otherwise the
    /// proton of the compartment of the first participant that has one. Returns the number of
    /// protons subtracted from the proton's coefficient, 0 if the reaction is not cH-balanced
    /// or no proton species is available.
    pub fn adjust_protons(&mut self, reaction_id: &str) -> Result<i64, ModelError> {
        let reaction = self
            .reaction_index(reaction_id)
            .ok_or_else(|| ModelError::UnknownReaction(reaction_id.to_string()))?;
        let charge = match self.charge_balance(reaction) {
            Some(charge) => charge,
            None => return Ok(0),
        };
        if !self.is_ch_balanced(reaction) || charge == 0 {
            return Ok(0);
        }
        let proton = match self.proton_for(reaction) {
            Some(proton) => proton,
            None => {
                debug!("No proton species available for {}", reaction_id);
                return Ok(0);
            }
        };
        if charge.abs() > Configuration::current().large_proton_adjustment {
            warn!("Adjusting {} protons in reaction {}", charge, reaction_id);
        }
        let current = self.reactions[reaction]
            .participants
            .iter()
            .find(|(m, _)| *m == proton)
            .map(|(_, c)| *c)
            .unwrap_or(0);
        self.set_coefficient(reaction, proton, current - charge);
        self.reactions[reaction].notes.insert(
            "Inferred".to_string(),
            Value::String("Protons added to balance equation".to_string()),
        );
        Ok(charge)
    }

    fn proton_for(&self, reaction: usize) -> Option<usize> {
        let participants = &self.reactions[reaction].participants;
        if let Some((m, _)) = participants
            .iter()
            .find(|(m, _)| self.metabolites[*m].is_proton())
        {
            return Some(*m);
        }
        participants.iter().find_map(|(m, _)| {
            let compartment = self.metabolites[*m].compartment.as_ref()?;
            self.metabolites.values().position(|candidate| {
                candidate.is_proton() && candidate.compartment.as_ref() == Some(compartment)
            })
        })
    }

    /// Set one stoichiometric coefficient, keeping ids, indices and back references in sync
    fn set_coefficient(&mut self, reaction: usize, metabolite: usize, coefficient: i64) {
        let metabolite_id = self.metabolites[metabolite].id.clone();
        let rxn = &mut self.reactions[reaction];
        let existing = rxn.participants.iter().position(|(m, _)| *m == metabolite);
        match (existing, coefficient) {
            (Some(position), 0) => {
                rxn.participants.remove(position);
                rxn.metabolites.shift_remove(&metabolite_id);
                self.metabolites[metabolite]
                    .reactions
                    .retain(|r| *r != reaction);
            }
            (Some(position), _) => {
                rxn.participants[position].1 = coefficient;
                rxn.metabolites.insert(metabolite_id, coefficient);
            }
            (None, 0) => {}
            (None, _) => {
                rxn.participants.push((metabolite, coefficient));
                rxn.metabolites.insert(metabolite_id, coefficient);
                self.metabolites[metabolite].reactions.push(reaction);
            }
        }
    }
    // endregion Protons
}

/// Signed element sums over (coefficient, formula, charge) terms, zero entries are left out
pub fn mass_balance<'a>(
    terms: impl IntoIterator<Item = (i64, &'a Formula, Option<i32>)>,
) -> BTreeMap<String, i64> {
    let mut balance: BTreeMap<String, i64> = BTreeMap::new();
    for (coefficient, formula, _) in terms {
        for (element, count) in formula.elements() {
            *balance.entry(element.to_string()).or_insert(0) += coefficient * i64::from(count);
        }
    }
    balance.retain(|_, v| *v != 0);
    balance
}

/// Signed charge sum over (coefficient, formula, charge) terms, `None` if any charge is unknown
pub fn charge_balance<'a>(
    terms: impl IntoIterator<Item = (i64, &'a Formula, Option<i32>)>,
) -> Option<i64> {
    terms
        .into_iter()
        .map(|(coefficient, _, charge)| charge.map(|c| coefficient * i64::from(c)))
        .sum()
}

/// Whether non-hydrogen mass cancels and, when all charges are known, charge equals hydrogen
pub fn ch_balanced<'a>(terms: impl IntoIterator<Item = (i64, &'a Formula, Option<i32>)>) -> bool {
    let terms: Vec<_> = terms.into_iter().collect();
    let mass = mass_balance(terms.iter().copied());
    if mass.keys().any(|element| element != Formula::HYDROGEN) {
        return false;
    }
    match charge_balance(terms) {
        Some(charge) => charge == mass.get(Formula::HYDROGEN).copied().unwrap_or(0),
        None => true,
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Metabolite {0} is already part of the model")]
    DuplicateMetabolite(String),
    #[error("Reaction {0} is already part of the model")]
    DuplicateReaction(String),
    #[error("Reaction {reaction} references metabolite {metabolite}, which is not in the model")]
    UnknownMetabolite { reaction: String, metabolite: String },
    #[error("Metabolite {0} not found in the model")]
    MetaboliteNotFound(String),
    #[error("Reaction {0} not found in the model")]
    UnknownReaction(String),
}
