//! Module for reading and writing Models and candidate tables
pub mod candidates;
pub mod formula_parse;
pub mod json;
