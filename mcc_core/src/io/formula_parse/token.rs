//! Module providing Token enum for lexing chemical formulae

/// Represents Tokens in a chemical formula
#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub enum Token {
    /// An element symbol, already normalized (isotope labels removed, deuterium and tritium
    /// collapsed onto hydrogen)
    Element(String),
    /// Explicit count following an element
    Count(u32),
    /// Any placeholder glyph (`R`, `X`, `*`, or a `.n` suffix)
    Wildcard,
    Eof,
}
