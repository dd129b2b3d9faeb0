//! This module provides the Assignment struct, a candidate (formula, charge) pair for a metabolite
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::io::formula_parse::FormulaParseError;
use crate::metabolic_model::formula::Formula;

/// A (formula, charge) pair which could be assigned to a metabolite
///
/// A charge of `None` means the charge is unknown, and any charge is accepted for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub formula: Formula,
    pub charge: Option<i32>,
}

impl Assignment {
    pub fn new(formula: Formula, charge: Option<i32>) -> Self {
        Assignment { formula, charge }
    }

    /// Create an assignment from a formula string
    ///
    /// # Examples
    /// ```rust
    /// use mcc_core::metabolic_model::assignment::Assignment;
    /// let acetate = Assignment::parse("C2H3O2", Some(-1)).unwrap();
    /// assert_eq!(acetate.h_charge_difference(), Some(4));
    /// ```
    pub fn parse(formula: &str, charge: Option<i32>) -> Result<Self, FormulaParseError> {
        Ok(Assignment {
            formula: formula.parse()?,
            charge,
        })
    }

    /// Whether the formula contains the wildcard `R`
    pub fn is_wildcard(&self) -> bool {
        self.formula.has_wildcard()
    }

    /// Hydrogen count minus charge, `None` if the charge is unknown
    ///
    /// Assignments sharing a non-hydrogen formula and this difference only differ by protons.
    pub fn h_charge_difference(&self) -> Option<i64> {
        self.charge
            .map(|charge| i64::from(self.formula.get(Formula::HYDROGEN)) - i64::from(charge))
    }

    /// The tagged candidate form of this assignment
    pub fn candidate(&self) -> Candidate {
        if self.is_wildcard() {
            Candidate::Wildcard(self.formula.clone(), self.charge)
        } else {
            Candidate::Fixed(self.formula.clone(), self.charge)
        }
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.charge {
            Some(charge) => write!(f, "{} ({:+})", self.formula, charge),
            None => write!(f, "{} (?)", self.formula),
        }
    }
}

/// Candidate value for a metabolite
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Candidate {
    /// Exactly this formula and charge
    Fixed(Formula, Option<i32>),
    /// At least the listed elements, plus an unspecified residual group
    Wildcard(Formula, Option<i32>),
    /// Anything, nothing is known about the metabolite
    Free,
}

impl Candidate {
    /// Whether the candidate pins the metabolite to a concrete value
    pub fn is_concrete(&self) -> bool {
        matches!(self, Candidate::Fixed(..))
    }
}

impl From<&Assignment> for Candidate {
    fn from(value: &Assignment) -> Self {
        value.candidate()
    }
}
