//! This module provides a struct for representing reactions
use derive_builder::Builder;
use indexmap::IndexMap;
use serde_json::Value;

/// SBO term marking biomass production
pub const BIOMASS_SBO: &str = "SBO:0000629";

/// Represents a reaction in the metabolic model
#[derive(Builder, Debug, Clone)]
pub struct Reaction {
    /// Used to identify the reaction
    pub id: String,
    /// Metabolite stoichiometry of the reaction, negative for consumed metabolites
    #[builder(default = "IndexMap::new()")]
    pub metabolites: IndexMap<String, i64>,
    /// Human-readable reaction name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Notes about the reaction
    #[builder(default = "IndexMap::new()")]
    pub notes: IndexMap<String, Value>,
    /// Reaction Annotations
    #[builder(default = "IndexMap::new()")]
    pub annotation: IndexMap<String, Value>,
    /// Exchange, sink, demand, or growth reaction which is never balanced
    ///
    /// ### Note
    /// Setting this marks the reaction as pseudo regardless of its shape, the model also marks
    /// any reaction matching [`Reaction::classify_pseudo`] when it is added.
    #[builder(default = "false")]
    pub is_pseudo: bool,
    /// (metabolite index, coefficient) pairs, resolved when added to a model
    #[builder(setter(skip))]
    pub(crate) participants: Vec<(usize, i64)>,
}

impl Reaction {
    /// SBO term of the reaction, taken from the annotation
    pub fn sbo(&self) -> Option<&str> {
        self.annotation.get("sbo").and_then(|v| match v {
            Value::String(s) => Some(s.as_str()),
            Value::Array(values) => values.first().and_then(|v| v.as_str()),
            _ => None,
        })
    }

    /// Whether the reaction is a pseudo reaction based on its shape and tags
    ///
    /// Pseudo reactions have only reactants or only products, carry the biomass SBO term,
    /// or mention growth in their id or name.
    pub fn classify_pseudo(&self) -> bool {
        let has_reactants = self.metabolites.values().any(|c| *c < 0);
        let has_products = self.metabolites.values().any(|c| *c > 0);
        let mentions_growth = self.id.to_lowercase().contains("growth")
            || self
                .name
                .as_ref()
                .is_some_and(|name| name.to_lowercase().contains("growth"));
        !has_reactants || !has_products || self.sbo() == Some(BIOMASS_SBO) || mentions_growth
    }

    /// Resolved (metabolite index, coefficient) pairs
    pub fn participants(&self) -> &[(usize, i64)] {
        &self.participants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(id: &str, stoichiometry: &[(&str, i64)]) -> Reaction {
        ReactionBuilder::default()
            .id(id.to_string())
            .metabolites(
                stoichiometry
                    .iter()
                    .map(|(m, c)| (m.to_string(), *c))
                    .collect(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn exchange_is_pseudo() {
        assert!(reaction("EX_glc", &[("glc_e", -1)]).classify_pseudo());
        assert!(reaction("SINK", &[("glc_e", 1)]).classify_pseudo());
        assert!(!reaction("PGI", &[("g6p_c", -1), ("f6p_c", 1)]).classify_pseudo());
    }

    #[test]
    fn growth_is_pseudo() {
        assert!(reaction("Growth_rxn", &[("a", -1), ("b", 1)]).classify_pseudo());
        let mut biomass = reaction("BIOMASS", &[("a", -1), ("b", 1)]);
        assert!(!biomass.classify_pseudo());
        biomass
            .annotation
            .insert("sbo".to_string(), Value::String(BIOMASS_SBO.to_string()));
        assert!(biomass.classify_pseudo());
    }
}
