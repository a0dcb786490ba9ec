//! # Core Module
//!
//! Stateless building blocks shared by the engine and the workflows.
//!
//! - **Data model** ([`models`]) - parameter values, parameter and job records, opaque keys
//! - **Sweeps** ([`sweep`]) - declarative sweep specifications and their cartesian expansion
//! - **File I/O** ([`io`]) - the CSV ledger, CIF cell lengths, report parsing, engine
//!   input scripts and result documents
//!
//! Nothing in this module spawns processes or holds state between calls.

pub mod io;
pub mod models;
pub mod sweep;
