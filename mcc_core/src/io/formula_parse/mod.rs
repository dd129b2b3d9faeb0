//! Module for parsing chemical formula strings into [`Formula`] values
//!
//! Parsing also cleans the formula: isotope labels are dropped, deuterium and tritium count as
//! hydrogen, and every placeholder glyph collapses into a single wildcard element `R`.

use thiserror::Error;

use crate::io::formula_parse::lexer::LexerError;
use crate::io::formula_parse::token::Token;
use crate::metabolic_model::formula::Formula;

mod lexer;
mod token;

/// Parse a chemical formula string into a [`Formula`]
///
/// # Parameters
/// - `input`: &str representing the formula, e.g. `"C6H12O6"` or `"C5H9NO2R"`
///
/// # Returns
/// Parse result which is
/// - `Ok`: The cleaned formula
/// - `Err`: The FormulaParseError describing the issue with the formula
///
/// # Examples
/// ```rust
/// use mcc_core::io::formula_parse::parse_formula;
/// let formula = parse_formula("C2H5[2H]O").unwrap();
/// assert_eq!(formula.to_string(), "C2H6O");
/// ```
pub fn parse_formula(input: &str) -> Result<Formula, FormulaParseError> {
    let mut lexer = lexer::Lexer::new(input);
    let tokens = lexer.lex()?;

    let mut formula = Formula::new();
    let mut has_wildcard = false;
    let mut tokens = tokens.into_iter().peekable();
    while let Some(token) = tokens.next() {
        match token {
            Token::Element(symbol) => {
                let count = match tokens.peek() {
                    Some(Token::Count(count)) => {
                        let count = *count;
                        tokens.next();
                        count
                    }
                    _ => 1,
                };
                formula.add(&symbol, count);
            }
            Token::Wildcard => has_wildcard = true,
            Token::Count(count) => return Err(FormulaParseError::DanglingCount(count)),
            Token::Eof => break,
        }
    }
    if has_wildcard {
        formula.set(Formula::WILDCARD, 1);
    }
    Ok(formula)
}

/// Enum representing possible lex and parse errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaParseError {
    /// Lexing Error
    #[error("Error occurred during lexing of formula: {0}")]
    LexingError(#[from] LexerError),
    /// A count that does not follow an element symbol
    #[error("Count {0} does not follow an element symbol")]
    DanglingCount(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formula() {
        let formula = parse_formula("C6H12O6").unwrap();
        assert_eq!(formula.get("C"), 6);
        assert_eq!(formula.get("H"), 12);
        assert_eq!(formula.get("O"), 6);
        assert_eq!(formula.get("N"), 0);
    }

    #[test]
    fn test_explicit_ones_and_repeats() {
        let formula = parse_formula("C1H3COOH").unwrap();
        assert_eq!(formula.to_string(), "C2H4O2");
    }

    #[test]
    fn test_cleaning() {
        assert_eq!(parse_formula("CD4").unwrap().to_string(), "CH4");
        assert_eq!(parse_formula("[13C]H4").unwrap().to_string(), "CH4");
        // Every placeholder collapses to a single trailing R
        assert_eq!(parse_formula("C2R1X*").unwrap().to_string(), "C2R");
        assert_eq!(parse_formula("RC3H5O2").unwrap().to_string(), "C3H5O2R");
        // Real elements starting with R or X are kept
        assert_eq!(parse_formula("RbXe").unwrap().to_string(), "RbXe");
    }

    #[test]
    fn test_empty_formula() {
        let formula = parse_formula("").unwrap();
        assert!(formula.is_empty());
        assert_eq!(formula.to_string(), "");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_formula("2H2O"),
            Err(FormulaParseError::DanglingCount(2))
        );
        assert!(matches!(
            parse_formula("C6H12O6)n"),
            Err(FormulaParseError::LexingError(_))
        ));
    }
}
