pub mod check;
pub mod export;
pub mod geometry;
pub mod isotherms;
pub mod merge;
pub mod prepare;
pub mod run;
pub mod simulate;

use crate::cli::{EngineArgs, StructureArgs};
use crate::config::models::CliOverrides;
use crate::ui::{CliProgressHandler, UiEvent};
use isoflow::engine::inspect::OutputSummary;
use isoflow::engine::progress::ProgressReporter;
use tokio::sync::mpsc;
use tracing::warn;

fn reporter(ui_sender: mpsc::Sender<UiEvent>) -> ProgressReporter<'static> {
    ProgressReporter::with_callback(CliProgressHandler::new(ui_sender).get_callback())
}

fn overrides(structures: Option<&StructureArgs>, engine: Option<&EngineArgs>) -> CliOverrides {
    let mut overrides = CliOverrides::default();
    if let Some(structures) = structures {
        overrides.structure_dir = structures.structure_dir.clone();
        overrides.structure_subset = structures.subset.clone();
    }
    if let Some(engine) = engine {
        overrides.engine = engine.engine.clone();
        overrides.max_workers = engine.workers;
        overrides.backend = engine.backend.clone();
    }
    overrides
}

fn print_summary(summary: &OutputSummary, details: bool) {
    if summary.is_clean() {
        println!(
            "✓ All {} job(s) produced a single clean report.",
            summary.inspected()
        );
        return;
    }
    for anomaly in summary.anomalies() {
        warn!("{}", anomaly);
    }
    println!("{}", summary.render(details));
}
