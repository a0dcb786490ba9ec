//! File formats read and written by the workflow.
//!
//! This module covers the append-only CSV ledger behind the job and isotherm
//! indices, cell-length extraction from CIF files, the block report parser
//! used for simulation output, rendering of engine input and launcher
//! scripts, and the JSON result document.

pub mod cif;
pub mod document;
pub mod ledger;
pub mod report;
pub mod script;
pub mod traits;
