//! Candidate (formula, charge) data for metabolites, and a JSON backed table of it
use std::fs;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use log::warn;
use serde::Deserialize;

use crate::io::json::JsonError;
use crate::metabolic_model::assignment::Assignment;
use crate::metabolic_model::metabolite::Metabolite;

/// Anything able to provide candidate assignments for metabolites
pub trait CandidateSource {
    /// Candidate assignments for a metabolite
    ///
    /// # Returns
    /// - `None`: no lookup was ever done for the metabolite
    /// - `Some(empty)`: the metabolite was looked up, and nothing is known about it
    /// - `Some(candidates)`: the candidate assignments
    fn get_candidates(&self, metabolite: &Metabolite) -> Option<IndexSet<Assignment>>;
}

impl<F> CandidateSource for F
where
    F: Fn(&Metabolite) -> Option<IndexSet<Assignment>>,
{
    fn get_candidates(&self, metabolite: &Metabolite) -> Option<IndexSet<Assignment>> {
        self(metabolite)
    }
}

/// In memory table of candidates, keeping the database identifiers each candidate came from
#[derive(Clone, Debug, Default)]
pub struct CandidateTable {
    candidates: IndexMap<String, IndexMap<Assignment, IndexSet<String>>>,
}

#[derive(Deserialize)]
struct JsonCandidate {
    formula: String,
    #[serde(default)]
    charge: Option<i32>,
    #[serde(default)]
    sources: Vec<String>,
}

impl CandidateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate for a metabolite, optionally recording where it came from
    pub fn insert(&mut self, metabolite_id: &str, assignment: Assignment, source: Option<&str>) {
        let sources = self
            .candidates
            .entry(metabolite_id.to_string())
            .or_default()
            .entry(assignment)
            .or_default();
        if let Some(source) = source {
            sources.insert(source.to_string());
        }
    }

    /// Record that a metabolite was looked up, even if nothing was found
    pub fn mark_searched(&mut self, metabolite_id: &str) {
        self.candidates
            .entry(metabolite_id.to_string())
            .or_default();
    }

    /// Database identifiers a candidate was found under
    pub fn provenance(&self, metabolite_id: &str, assignment: &Assignment) -> Option<&IndexSet<String>> {
        self.candidates.get(metabolite_id)?.get(assignment)
    }

    /// Read a candidate file of the form `{id: [{formula, charge, sources}]}`
    ///
    /// Candidates whose formula can't be parsed are skipped with a warning, the metabolite still
    /// counts as looked up.
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self, JsonError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => return Err(JsonError::UnableToRead(format!("{:?}", err))),
        };
        CandidateTable::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self, JsonError> {
        let raw = match serde_json::from_str::<IndexMap<String, Vec<JsonCandidate>>>(data) {
            Ok(raw) => raw,
            Err(err) => return Err(JsonError::UnableToParse(format!("{:?}", err))),
        };
        let mut table = CandidateTable::new();
        for (metabolite_id, candidates) in raw {
            table.mark_searched(&metabolite_id);
            for candidate in candidates {
                let assignment = match Assignment::parse(&candidate.formula, candidate.charge) {
                    Ok(assignment) => assignment,
                    Err(err) => {
                        warn!(
                            "Ignoring candidate {} for {}: {}",
                            candidate.formula, metabolite_id, err
                        );
                        continue;
                    }
                };
                if candidate.sources.is_empty() {
                    table.insert(&metabolite_id, assignment.clone(), None);
                }
                for source in &candidate.sources {
                    table.insert(&metabolite_id, assignment.clone(), Some(source));
                }
            }
        }
        Ok(table)
    }
}

impl CandidateSource for CandidateTable {
    fn get_candidates(&self, metabolite: &Metabolite) -> Option<IndexSet<Assignment>> {
        self.candidates
            .get(&metabolite.id)
            .map(|candidates| candidates.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::metabolite::MetaboliteBuilder;
    use std::path::PathBuf;

    fn metabolite(id: &str) -> Metabolite {
        MetaboliteBuilder::default()
            .id(id.to_string())
            .build()
            .unwrap()
    }

    #[test]
    fn absent_and_empty_differ() {
        let mut table = CandidateTable::new();
        table.mark_searched("unknown_c");
        assert_eq!(table.get_candidates(&metabolite("unknown_c")), Some(IndexSet::new()));
        assert_eq!(table.get_candidates(&metabolite("never_c")), None);
    }

    #[test]
    fn provenance_merges() {
        let mut table = CandidateTable::new();
        let water = Assignment::parse("H2O", Some(0)).unwrap();
        table.insert("h2o_c", water.clone(), Some("bigg.metabolite:h2o"));
        table.insert("h2o_c", Assignment::parse("OH2", Some(0)).unwrap(), Some("chebi:15377"));
        assert_eq!(table.get_candidates(&metabolite("h2o_c")).unwrap().len(), 1);
        assert_eq!(table.provenance("h2o_c", &water).unwrap().len(), 2);
    }

    #[test]
    fn read_json() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("test_data")
            .join("candidates")
            .join("acetate.json");
        let table = CandidateTable::read_json(path).unwrap();
        let acetate = table.get_candidates(&metabolite("ac_c")).unwrap();
        assert_eq!(acetate.len(), 2);
        let base = Assignment::parse("C2H3O2", Some(-1)).unwrap();
        assert!(acetate.contains(&base));
        assert_eq!(table.provenance("ac_c", &base).unwrap().len(), 2);
        // The unparsable candidate is dropped
        assert_eq!(table.get_candidates(&metabolite("h_e")).unwrap().len(), 1);
    }

    #[test]
    fn closures_are_sources() {
        let source = |m: &Metabolite| {
            (m.id == "h2o_c").then(|| {
                [Assignment::parse("H2O", Some(0)).unwrap()]
                    .into_iter()
                    .collect::<IndexSet<_>>()
            })
        };
        assert!(source.get_candidates(&metabolite("h2o_c")).is_some());
        assert!(source.get_candidates(&metabolite("co2_c")).is_none());
    }
}
