//! This module provides the metabolite struct representing a metabolite

use derive_builder::Builder;
use indexmap::IndexMap;
use serde_json::Value;

use crate::metabolic_model::assignment::Assignment;
use crate::metabolic_model::formula::Formula;

/// Represents a metabolite
#[derive(Builder, Debug, Clone)]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique)
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Which compartment the metabolite is in
    #[builder(default = "None")]
    pub compartment: Option<String>,
    /// Electrical charge of the Metabolite, `None` if unknown
    #[builder(default = "None")]
    pub charge: Option<i32>,
    /// Chemical Formula of the metabolite
    #[builder(default = "Formula::new()")]
    pub formula: Formula,
    /// Notes about the metabolite
    #[builder(default = "IndexMap::new()")]
    pub notes: IndexMap<String, Value>,
    /// Metabolite annotations
    #[builder(default = "IndexMap::new()")]
    pub annotation: IndexMap<String, Value>,
    /// Indices of the reactions this metabolite participates in, filled in by the model
    #[builder(setter(skip))]
    pub(crate) reactions: Vec<usize>,
}

impl Metabolite {
    /// Current formula and charge of the metabolite
    pub fn assignment(&self) -> Assignment {
        Assignment::new(self.formula.clone(), self.charge)
    }

    /// Overwrite the formula and charge of the metabolite
    pub fn set_assignment(&mut self, assignment: &Assignment) {
        self.formula = assignment.formula.clone();
        self.charge = assignment.charge;
    }

    /// Indices (into the model) of the reactions this metabolite participates in
    pub fn reaction_indices(&self) -> &[usize] {
        &self.reactions
    }

    /// Whether this metabolite is a free proton (formula `H`, charge +1)
    pub fn is_proton(&self) -> bool {
        self.charge == Some(1) && self.formula == Formula::from_counts(&[(Formula::HYDROGEN, 1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let met = MetaboliteBuilder::default()
            .id("h2o_c".to_string())
            .build()
            .unwrap();
        assert!(met.formula.is_empty());
        assert!(met.charge.is_none());
        assert!(met.reaction_indices().is_empty());
    }

    #[test]
    fn proton() {
        let proton = MetaboliteBuilder::default()
            .id("h_c".to_string())
            .formula("H".parse().unwrap())
            .charge(Some(1))
            .build()
            .unwrap();
        assert!(proton.is_proton());
        let hydride = MetaboliteBuilder::default()
            .id("hydride".to_string())
            .formula("H".parse().unwrap())
            .charge(Some(-1))
            .build()
            .unwrap();
        assert!(!hydride.is_proton());
    }

    #[test]
    fn set_assignment() {
        let mut met = MetaboliteBuilder::default()
            .id("ac_c".to_string())
            .build()
            .unwrap();
        met.set_assignment(&Assignment::parse("C2H3O2", Some(-1)).unwrap());
        assert_eq!(met.formula.to_string(), "C2H3O2");
        assert_eq!(met.assignment().charge, Some(-1));
    }
}
