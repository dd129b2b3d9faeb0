//! Core rust implementation of mass and charge curation for metabolic models.
//!
//! Candidate formulas and charges for every metabolite are turned into an SMT problem, which is
//! solved reaction by reaction with conflicting reactions isolated through unsat cores, and then
//! refined by weighted optimization passes. See [`balancing::curate`] for the entry point.

pub mod balancing;
pub mod configuration;
pub mod io;
pub mod metabolic_model;
