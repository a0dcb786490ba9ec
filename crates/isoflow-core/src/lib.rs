//! # ISOFLOW Core Library
//!
//! Drives large parameter sweeps of adsorption simulations: expands a declarative
//! sweep into concrete jobs, keeps an append-only keyed index of them, dispatches
//! them to an external engine with bounded concurrency, and rebuilds isotherms by
//! grouping completed jobs that agree on everything but the swept variable.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer layout:
//!
//! - **[`core`]: The Foundation.** Typed records and keys, sweep expansion, and the
//!   file formats (CSV ledger, CIF cell lengths, report parsing, result documents).
//!
//! - **[`engine`]: The Logic Core.** Configuration, the error taxonomy, the job
//!   index store, the worker pool and dispatcher, output inspection, result
//!   extraction, isotherm aggregation, document merging, and the adapters around
//!   external collaborators (structure sources, charge tools, geometry analysis).
//!
//! - **[`workflows`]: The Public API.** End-to-end steps (`prepare`, `simulate`,
//!   `export`, `merge`) that tie the engine and core together and report progress.

pub mod core;
pub mod engine;
pub mod workflows;
