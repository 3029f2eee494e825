//! # coldcore-tests
//!
//! Integration tests for the wallet backend.
//!
//! The harness provides in-memory keystores, chain backends and collaborators
//! plus a local HTTP server standing in for AOPP callbacks:
//! - Registry and keystore lifecycle tests
//! - Discovery of hidden accounts
//! - Account operations and insurance
//! - Connect-keystore prompts
//! - AOPP flows end to end
//! - Notes export and import
//! - Balance aggregation
//! - Property-based tests for codes, paths and the catalogue

pub mod generators;
pub mod harness;

#[cfg(test)]
mod registry_tests;



#[cfg(test)]
mod connect_tests;



#[cfg(test)]
mod balance_tests;

#[cfg(test)]
mod property_tests;

pub use generators::*;
pub use harness::*;
