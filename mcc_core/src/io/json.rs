//! Module providing JSON IO for Models
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::io::formula_parse::FormulaParseError;
use crate::metabolic_model::formula::Formula;
use crate::metabolic_model::metabolite::{Metabolite, MetaboliteBuilder, MetaboliteBuilderError};
use crate::metabolic_model::model::{Model, ModelError};
use crate::metabolic_model::reaction::{ReactionBuilder, ReactionBuilderError};

/// Largest factor tried when turning fractional coefficients into integers
const MAX_STOICHIOMETRY_SCALE: u32 = 1000;
const INTEGRALITY_TOLERANCE: f64 = 1e-9;

// region JSON Model
/// Represents a JSON serialized model, used for reading and writing models in json format
#[derive(Serialize, Deserialize)]
struct JsonModel {
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    compartments: Option<IndexMap<String, String>>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonMetabolite {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    compartment: Option<String>,
    #[serde(default)]
    charge: Option<i32>,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotation: Option<IndexMap<String, Value>>,
}

#[derive(Serialize, Deserialize)]
struct JsonReaction {
    id: String,
    #[serde(default)]
    name: Option<String>,
    metabolites: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<IndexMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotation: Option<IndexMap<String, Value>>,
}
// endregion JSON Model

// region Conversions
impl TryFrom<JsonMetabolite> for Metabolite {
    type Error = JsonError;

    fn try_from(m: JsonMetabolite) -> Result<Self, Self::Error> {
        let formula = match m.formula {
            Some(ref formula) => formula.parse().map_err(|source| JsonError::InvalidFormula {
                metabolite: m.id.clone(),
                source,
            })?,
            None => Formula::new(),
        };
        Ok(MetaboliteBuilder::default()
            .id(m.id)
            .name(m.name)
            .compartment(m.compartment)
            .charge(m.charge)
            .formula(formula)
            .notes(m.notes.unwrap_or_default())
            .annotation(m.annotation.unwrap_or_default())
            .build()?)
    }
}

impl From<&Metabolite> for JsonMetabolite {
    fn from(m: &Metabolite) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            compartment: m.compartment.clone(),
            charge: m.charge,
            formula: if m.formula.is_empty() {
                None
            } else {
                Some(m.formula.to_string())
            },
            notes: (!m.notes.is_empty()).then(|| m.notes.clone()),
            annotation: (!m.annotation.is_empty()).then(|| m.annotation.clone()),
        }
    }
}

/// Scale the coefficients by the smallest factor which makes all of them integral
fn integer_stoichiometry(
    reaction_id: &str,
    metabolites: &IndexMap<String, f64>,
) -> Result<IndexMap<String, i64>, JsonError> {
    let is_integral = |value: f64| (value - value.round()).abs() <= INTEGRALITY_TOLERANCE;
    for factor in 1..=MAX_STOICHIOMETRY_SCALE {
        let factor = f64::from(factor);
        if metabolites.values().all(|c| is_integral(c * factor)) {
            return Ok(metabolites
                .iter()
                .map(|(id, c)| (id.clone(), (c * factor).round() as i64))
                .collect());
        }
    }
    Err(JsonError::NonIntegerStoichiometry(reaction_id.to_string()))
}

impl Model {
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Model, JsonError> {
        let model_str = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => return Err(JsonError::UnableToRead(format!("{:?}", err))),
        };
        Model::read_json_str(&model_str)
    }

    /// Read a model from a JSON string
    pub fn read_json_str(model_str: &str) -> Result<Model, JsonError> {
        let json_model = match serde_json::from_str::<JsonModel>(model_str) {
            Ok(model) => model,
            Err(err) => return Err(JsonError::UnableToParse(format!("{:?}", err))),
        };
        Model::from_json(json_model)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), JsonError> {
        let json_model = self.to_json();
        let model_string = serde_json::to_string(&json_model)?;
        fs::write(path, model_string)?;
        Ok(())
    }

    fn from_json(json_model: JsonModel) -> Result<Self, JsonError> {
        let mut model = Model::new_empty();
        for met in json_model.metabolites {
            model.add_metabolite(Metabolite::try_from(met)?)?;
        }
        for rxn in json_model.reactions {
            let metabolites = integer_stoichiometry(&rxn.id, &rxn.metabolites)?;
            let new_reaction = ReactionBuilder::default()
                .id(rxn.id)
                .metabolites(metabolites)
                .name(rxn.name)
                .notes(rxn.notes.unwrap_or_default())
                .annotation(rxn.annotation.unwrap_or_default())
                .build()?;
            model.add_reaction(new_reaction)?;
        }
        model.id = json_model.id;
        model.compartments = json_model.compartments;
        model.version = json_model.version;
        Ok(model)
    }

    fn to_json(&self) -> JsonModel {
        let metabolites = self.metabolites().map(JsonMetabolite::from).collect();
        let reactions = self
            .reactions()
            .map(|r| JsonReaction {
                id: r.id.clone(),
                name: r.name.clone(),
                metabolites: r
                    .metabolites
                    .iter()
                    .map(|(id, c)| (id.clone(), *c as f64))
                    .collect(),
                notes: (!r.notes.is_empty()).then(|| r.notes.clone()),
                annotation: (!r.annotation.is_empty()).then(|| r.annotation.clone()),
            })
            .collect();
        JsonModel {
            metabolites,
            reactions,
            id: self.id.clone(),
            compartments: self.compartments.clone(),
            version: self.version.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("Unable to parse the formula of metabolite {metabolite}")]
    InvalidFormula {
        metabolite: String,
        source: FormulaParseError,
    },
    #[error("Reaction {0} has no integer scaling of its stoichiometry")]
    NonIntegerStoichiometry(String),
    #[error("Unable to read file due to {0}")]
    UnableToRead(String),
    #[error("Unable to parse json due to {0}")]
    UnableToParse(String),
    #[error("Unable to build metabolite")]
    UnableToBuildMetabolite(#[from] MetaboliteBuilderError),
    #[error("Unable to build reaction")]
    UnableToBuildReaction(#[from] ReactionBuilderError),
    #[error("Invalid model structure")]
    InvalidModel(#[from] ModelError),
    #[error("Serde json parse error")]
    SerdeJsonParseError(#[from] serde_json::Error),
    #[error("Unable to write to file")]
    UnableToWrite(#[from] std::io::Error),
}

// endregion Conversions

#[cfg(test)]
mod json_tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("test_data")
            .join("test_models")
            .join("acetate.json")
    }

    #[test]
    fn json_metabolite() {
        let data = r#"{
"id":"ac_c",
"name":"Acetate",
"compartment":"c",
"charge":-1,
"formula":"C2H3O2",
"notes":{
"original_bigg_ids":[
"ac_c"
]
},
"annotation":{
"bigg.metabolite":[
"ac"
],
"metanetx.chemical":[
"MNXM26"
],
"sbo":"SBO:0000247"
}
}"#;
        let met: JsonMetabolite = serde_json::from_str(data).unwrap();
        let model_met = Metabolite::try_from(met).unwrap();
        assert_eq!(model_met.id, "ac_c");
        assert_eq!(model_met.name.unwrap(), "Acetate");
        assert_eq!(model_met.compartment.unwrap(), "c");
        assert_eq!(model_met.charge, Some(-1));
        assert_eq!(model_met.formula.to_string(), "C2H3O2");
        assert!(model_met.annotation.contains_key("metanetx.chemical"));
    }

    #[test]
    fn json_metabolite_missing_fields() {
        let met: JsonMetabolite = serde_json::from_str(r#"{"id":"x_c"}"#).unwrap();
        let model_met = Metabolite::try_from(met).unwrap();
        assert!(model_met.formula.is_empty());
        assert!(model_met.charge.is_none());

        let met: JsonMetabolite =
            serde_json::from_str(r#"{"id":"bad_c","formula":"C6(H2O)6"}"#).unwrap();
        assert!(matches!(
            Metabolite::try_from(met),
            Err(JsonError::InvalidFormula { .. })
        ));
    }

    #[test]
    fn stoichiometry_scaling() {
        let mut metabolites = IndexMap::new();
        metabolites.insert("a".to_string(), -0.5);
        metabolites.insert("b".to_string(), 1.5);
        let scaled = integer_stoichiometry("R", &metabolites).unwrap();
        assert_eq!(scaled.get("a"), Some(&-1));
        assert_eq!(scaled.get("b"), Some(&3));

        metabolites.insert("c".to_string(), std::f64::consts::PI);
        assert!(matches!(
            integer_stoichiometry("R", &metabolites),
            Err(JsonError::NonIntegerStoichiometry(_))
        ));
    }

    #[test]
    fn read_json() {
        let model = Model::read_json(fixture()).unwrap();
        assert_eq!(model.id.clone().unwrap(), "acetate_transport");
        assert_eq!(model.metabolite_count(), 5);
        assert_eq!(model.reaction_count(), 4);

        let met = model.metabolite("ac_c").unwrap();
        assert_eq!(met.formula.to_string(), "C2H3O2");
        assert_eq!(met.charge, Some(-1));

        let reaction = model.reaction("ACt2r").unwrap();
        assert_eq!(reaction.metabolites.get("h_e"), Some(&-1));
        assert!(!reaction.is_pseudo);
        assert!(model.reaction("EX_ac_e").unwrap().is_pseudo);

        let mut expected_compartments: IndexMap<String, String> = IndexMap::new();
        expected_compartments.insert("c".to_string(), "cytosol".to_string());
        expected_compartments.insert("e".to_string(), "extracellular space".to_string());
        assert_eq!(model.compartments.clone().unwrap(), expected_compartments);
    }

    #[test]
    fn to_json() {
        let model = Model::read_json(fixture()).unwrap();
        let json_model = model.to_json();
        let met = json_model.metabolites.first().unwrap();
        assert_eq!(met.id, "aca_c");
        assert_eq!(met.formula.clone().unwrap(), "C2H4O2");
        let reaction = json_model.reactions.first().unwrap();
        assert_eq!(reaction.id, "ACDISS");
        assert!((reaction.metabolites["aca_c"] + 1.0).abs() < 1e-25);

        // And back again
        let text = serde_json::to_string(&json_model).unwrap();
        let reread = Model::read_json_str(&text).unwrap();
        assert_eq!(reread.reaction_count(), model.reaction_count());
        assert_eq!(reread.id, model.id);
    }

    #[test]
    fn read_errors() {
        assert!(matches!(
            Model::read_json("does/not/exist.json"),
            Err(JsonError::UnableToRead(_))
        ));
        assert!(matches!(
            Model::read_json_str("{\"metabolites\": 3}"),
            Err(JsonError::UnableToParse(_))
        ));
        let dangling = r#"{"metabolites": [], "reactions": [{"id": "R", "metabolites": {"a": -1, "b": 1}}]}"#;
        assert!(matches!(
            Model::read_json_str(dangling),
            Err(JsonError::InvalidModel(ModelError::UnknownMetabolite { .. }))
        ));
    }
}
