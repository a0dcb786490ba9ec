//! # Engine Module
//!
//! Stateful machinery of a sweep campaign: the job index, dispatch of jobs to
//! the external engine, triage and extraction of their outputs, and the
//! reconstruction of isotherms from the completed jobs.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - the validated [`config::WorkflowConfig`] and its builder
//! - **Error Handling** ([`error`]) - the [`error::EngineError`] taxonomy every layer folds into
//! - **Progress Monitoring** ([`progress`]) - callback-based progress events for front ends
//! - **Job Index** ([`index`]) - append-only keyed registry of jobs with resume support
//! - **Dispatch** ([`dispatch`], [`pool`]) - per-job artifacts and bounded-concurrency execution
//! - **Output Triage** ([`inspect`]) - classification of each job directory after a batch
//! - **Extraction** ([`extract`]) - pressure and loading values read from engine reports
//! - **Aggregation** ([`aggregate`]) - grouping of jobs into isotherms and their stores
//! - **Merging** ([`merge`]) - concatenation of result documents from separate runs
//! - **Collaborators** ([`structures`], [`charges`], [`geometry`]) - narrow adapters
//!   around structure sources, charge assignment tools and pore geometry analysis
//!
//! ## Failure Model
//!
//! Job-level problems (no report, several reports, error lines, unparsable values)
//! are collected and summarized instead of aborting a batch. Structural problems
//! (malformed sweeps, corrupt indices, missing structures, malformed documents)
//! are returned as errors before any job is touched.

pub mod aggregate;
pub mod charges;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod index;
pub mod inspect;
pub mod merge;
pub mod pool;
pub mod progress;
pub mod structures;
