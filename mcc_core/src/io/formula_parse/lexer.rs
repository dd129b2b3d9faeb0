//! Lex a chemical formula string into a series of tokens for later parsing

use std::borrow::Borrow;
use std::collections::VecDeque;

use thiserror::Error;

use crate::io::formula_parse::token::Token;

pub struct Lexer {
    source: Vec<char>,
    tokens: VecDeque<Token>,
    start: usize,
    current: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            tokens: VecDeque::new(),
            start: 0,
            current: 0,
        }
    }

    pub fn scan_tokens(&mut self) -> Result<&VecDeque<Token>, LexerError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }

        self.tokens.push_back(Token::Eof);
        Ok(&self.tokens)
    }

    /// Scan the source, returning an owned vector of tokens
    pub fn lex(&mut self) -> Result<Vec<Token>, LexerError> {
        Ok(self.scan_tokens()?.iter().cloned().collect())
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let c: char = self.advance();
        match c {
            'A'..='Z' => self.read_symbol(),
            '0'..='9' => self.read_count()?,
            '[' => self.read_isotope()?,
            // Placeholders, any trailing number belongs to the placeholder
            '*' | '.' => {
                self.skip_digits();
                self.add_token(Token::Wildcard);
            }
            ' ' | '\r' | '\n' | '\t' => {}
            _ => return Err(LexerError::InvalidCharacter(c)),
        };
        Ok(())
    }

    fn advance(&mut self) -> char {
        let char_at_current = self.source[self.current];
        self.current += 1;
        char_at_current
    }

    fn read_symbol(&mut self) {
        if Lexer::is_lowercase(self.peek()) {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();

        match text.borrow() {
            "R" | "X" => {
                self.skip_digits();
                self.add_token(Token::Wildcard)
            }
            symbol => self.add_token(Token::Element(Lexer::normalize_symbol(symbol))),
        }
    }

    fn read_count(&mut self) -> Result<(), LexerError> {
        while Lexer::is_digit(self.peek()) {
            self.advance();
        }
        let text: String = self.source[self.start..self.current].iter().collect();
        let count = text
            .parse::<u32>()
            .map_err(|_| LexerError::CountOverflow(text.clone()))?;
        self.add_token(Token::Count(count));
        Ok(())
    }

    /// Read isotope notation such as `[13C]`, keeping only the element
    fn read_isotope(&mut self) -> Result<(), LexerError> {
        if !Lexer::is_digit(self.peek()) {
            return Err(LexerError::MalformedIsotope);
        }
        self.skip_digits();
        let symbol_start = self.current;
        if !self.peek().is_ascii_uppercase() {
            return Err(LexerError::MalformedIsotope);
        }
        self.advance();
        if Lexer::is_lowercase(self.peek()) {
            self.advance();
        }
        let symbol: String = self.source[symbol_start..self.current].iter().collect();
        if self.peek() != ']' {
            return Err(LexerError::MalformedIsotope);
        }
        self.advance();
        self.add_token(Token::Element(Lexer::normalize_symbol(&symbol)));
        Ok(())
    }

    fn normalize_symbol(symbol: &str) -> String {
        match symbol {
            // Deuterium and tritium
            "D" | "T" => "H".to_string(),
            other => other.to_string(),
        }
    }

    fn skip_digits(&mut self) {
        while Lexer::is_digit(self.peek()) {
            self.advance();
        }
    }

    fn is_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

    fn is_lowercase(c: char) -> bool {
        c.is_ascii_lowercase()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            return '\0';
        }
        self.source[self.current]
    }

    fn add_token(&mut self, token: Token) {
        self.tokens.push_back(token);
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

/// Errors that can occur while lexing a formula
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexerError {
    #[error("Invalid character '{0}' in formula")]
    InvalidCharacter(char),
    #[error("Malformed isotope notation")]
    MalformedIsotope,
    #[error("Element count {0} is too large")]
    CountOverflow(String),
}

#[cfg(test)]
mod tests {
    use crate::io::formula_parse::lexer::{Lexer, LexerError};
    use crate::io::formula_parse::token::Token;

    #[test]
    fn test_simple_formula() {
        let mut lexer = Lexer::new("C6H12O6");
        let tokens = lexer.lex().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Element("C".to_string()),
                Token::Count(6),
                Token::Element("H".to_string()),
                Token::Count(12),
                Token::Element("O".to_string()),
                Token::Count(6),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_two_letter_symbols() {
        let mut lexer = Lexer::new("FeCl3Dy");
        let tokens = lexer.lex().unwrap();
        assert_eq!(tokens[0], Token::Element("Fe".to_string()));
        assert_eq!(tokens[1], Token::Element("Cl".to_string()));
        assert_eq!(tokens[2], Token::Count(3));
        // Dysprosium is not deuterium
        assert_eq!(tokens[3], Token::Element("Dy".to_string()));
    }

    #[test]
    fn test_hydrogen_isotopes() {
        let mut lexer = Lexer::new("CD3T");
        let tokens = lexer.lex().unwrap();
        assert_eq!(tokens[1], Token::Element("H".to_string()));
        assert_eq!(tokens[3], Token::Element("H".to_string()));
    }

    #[test]
    fn test_isotope_notation() {
        let mut lexer = Lexer::new("[13C]H4");
        let tokens = lexer.lex().unwrap();
        assert_eq!(tokens[0], Token::Element("C".to_string()));

        let mut lexer = Lexer::new("[C]H4");
        assert_eq!(lexer.lex(), Err(LexerError::MalformedIsotope));
    }

    #[test]
    fn test_wildcards() {
        let mut lexer = Lexer::new("C2R2X*3.2Xe");
        let tokens = lexer.lex().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Element("C".to_string()),
                Token::Count(2),
                Token::Wildcard,
                Token::Wildcard,
                Token::Wildcard,
                Token::Wildcard,
                Token::Element("Xe".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let mut lexer = Lexer::new("C6H12O6)n");
        assert_eq!(lexer.lex(), Err(LexerError::InvalidCharacter(')')));
    }
}
