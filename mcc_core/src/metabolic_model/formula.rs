//! This module provides the Formula struct representing a (cleaned) chemical formula
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::io::formula_parse::{parse_formula, FormulaParseError};

/// Represents a chemical formula as a map of element symbols to counts
///
/// # Notes:
/// Zero counts are never stored, so two formulae are equal whenever all of their non-zero
/// counts agree. The pseudo-element [`Formula::WILDCARD`] stands for an unspecified residual
/// group, and is present at most once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Formula {
    elements: BTreeMap<String, u32>,
}

impl Formula {
    /// Symbol used for unspecified residual groups
    pub const WILDCARD: &'static str = "R";
    /// Symbol for hydrogen, the one element allowed to absorb charge differences
    pub const HYDROGEN: &'static str = "H";

    /// Create a new empty formula
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a formula from (element, count) pairs
    ///
    /// # Examples
    /// ```rust
    /// use mcc_core::metabolic_model::formula::Formula;
    /// let ethane = Formula::from_counts(&[("C", 2), ("H", 6)]);
    /// assert_eq!(ethane.to_string(), "C2H6");
    /// ```
    pub fn from_counts(counts: &[(&str, u32)]) -> Self {
        let mut formula = Self::new();
        for (element, count) in counts {
            formula.add(element, *count);
        }
        formula
    }

    /// Count of `element` in the formula (0 if absent)
    pub fn get(&self, element: &str) -> u32 {
        self.elements.get(element).copied().unwrap_or(0)
    }

    /// Set the count of `element`, a count of 0 removes the element
    pub fn set(&mut self, element: &str, count: u32) {
        if count == 0 {
            self.elements.remove(element);
        } else if element == Self::WILDCARD {
            // Only ever a single residual group
            self.elements.insert(element.to_string(), 1);
        } else {
            self.elements.insert(element.to_string(), count);
        }
    }

    /// Add `count` atoms of `element` to the formula
    pub fn add(&mut self, element: &str, count: u32) {
        let current = self.get(element);
        self.set(element, current.saturating_add(count));
    }

    /// Iterate over the (element, count) pairs, in alphabetical order
    pub fn elements(&self) -> impl Iterator<Item = (&str, u32)> {
        self.elements.iter().map(|(e, c)| (e.as_str(), *c))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn has_wildcard(&self) -> bool {
        self.elements.contains_key(Self::WILDCARD)
    }

    /// Total number of atoms (a wildcard counts as one)
    pub fn atom_count(&self) -> u32 {
        self.elements.values().sum()
    }

    /// Copy of this formula with the wildcard removed
    pub fn without_wildcard(&self) -> Formula {
        let mut formula = self.clone();
        formula.set(Self::WILDCARD, 0);
        formula
    }

    /// Copy of this formula with hydrogen removed
    pub fn without_hydrogen(&self) -> Formula {
        let mut formula = self.clone();
        formula.set(Self::HYDROGEN, 0);
        formula
    }

    /// Whether the two formulae agree on every element other than the wildcard
    pub fn matches_ignoring_wildcard(&self, other: &Formula) -> bool {
        self.without_wildcard() == other.without_wildcard()
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (element, count) in self.elements() {
            if element == Self::WILDCARD {
                continue;
            }
            write!(f, "{}", element)?;
            if count > 1 {
                write!(f, "{}", count)?;
            }
        }
        if self.has_wildcard() {
            write!(f, "{}", Self::WILDCARD)?;
        }
        Ok(())
    }
}

impl FromStr for Formula {
    type Err = FormulaParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_formula(s)
    }
}

impl TryFrom<String> for Formula {
    type Error = FormulaParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_formula(&value)
    }
}

impl From<Formula> for String {
    fn from(value: Formula) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_order() {
        let formula: Formula = "RO2HC".parse().unwrap();
        // Alphabetical, with the wildcard trailing
        assert_eq!(formula.to_string(), "CHO2R");
        let formula: Formula = "ZnFeCl2".parse().unwrap();
        assert_eq!(formula.to_string(), "Cl2FeZn");
    }

    #[test]
    fn round_trip() {
        for s in ["C6H12O6", "C10H12N5O13P3", "CoH2O", "C3H5O2R", "H"] {
            let formula: Formula = s.parse().unwrap();
            assert_eq!(formula.to_string(), s);
        }
    }

    #[test]
    fn zero_counts_ignored() {
        let mut with_zero = Formula::from_counts(&[("C", 2), ("H", 6)]);
        with_zero.set("N", 0);
        assert_eq!(with_zero, "C2H6".parse().unwrap());
        with_zero.set("H", 0);
        assert_eq!(with_zero.to_string(), "C2");
    }

    #[test]
    fn single_wildcard() {
        let mut formula = Formula::from_counts(&[("C", 2)]);
        formula.add(Formula::WILDCARD, 3);
        assert_eq!(formula.get(Formula::WILDCARD), 1);
        assert!(formula.has_wildcard());
        assert!(!formula.without_wildcard().has_wildcard());
    }

    #[test]
    fn helpers() {
        let formula: Formula = "C2H4O2R".parse().unwrap();
        assert_eq!(formula.atom_count(), 9);
        assert_eq!(formula.without_hydrogen().to_string(), "C2O2R");
        assert!(formula.matches_ignoring_wildcard(&"C2H4O2".parse().unwrap()));
        assert!(!formula.matches_ignoring_wildcard(&"C2H5O2".parse().unwrap()));
    }

    #[test]
    fn serde_as_string() {
        let formula: Formula = serde_json::from_str("\"CH3OH\"").unwrap();
        assert_eq!(formula.to_string(), "CH4O");
        assert_eq!(serde_json::to_string(&formula).unwrap(), "\"CH4O\"");
    }
}
