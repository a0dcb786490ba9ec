//! # Workflows Module
//!
//! End-to-end steps of an adsorption campaign. Each step is a plain function
//! taking a validated [`WorkflowConfig`](crate::engine::config::WorkflowConfig)
//! and a [`ProgressReporter`](crate::engine::progress::ProgressReporter), and
//! each can be re-run: state lives in the files under the output root.
//!
//! - **Preparation** ([`prepare`]) - expand a sweep, retrieve and charge structures,
//!   register and materialize jobs
//! - **Simulation** ([`simulate`]) - run pending jobs and triage their outputs
//! - **Export** ([`export`]) - extract results, write the run's result document and
//!   rebuild isotherms
//! - **Merging** ([`merge`]) - combine result documents from separate runs
//! - **Geometry** ([`geometry`]) - accessible surface area analysis of the structures

pub mod export;
pub mod geometry;
pub mod merge;
pub mod prepare;
pub mod simulate;
