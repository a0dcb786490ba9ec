use super::{export, overrides, prepare, reporter, simulate};
use crate::cli::{ConfigArgs, RunArgs};
use crate::config::builder::build_config;
use crate::error::Result;
use crate::ui::UiEvent;
use isoflow::engine::error::EngineError;
use isoflow::workflows::{self, simulate::SimulateOptions};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::info;

/// Prepares the sweep, simulates only the jobs it produced, then exports
/// everything in the index.
pub async fn run(
    args: RunArgs,
    config_args: &ConfigArgs,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let app = build_config(
        config_args,
        &overrides(Some(&args.structures), Some(&args.engine)),
    )?;
    app.workflow
        .engine_executable()
        .map_err(EngineError::from)?;
    let spec = prepare::load_spec(&args.input)?;
    let reporter = reporter(ui_sender);

    info!("Invoking the prepare workflow...");
    let prepared =
        tokio::task::block_in_place(|| workflows::prepare::run(&spec, &app.workflow, &reporter))?;
    prepare::print_result(&prepared);

    let options = SimulateOptions {
        only: Some(prepared.job_keys().cloned().collect::<HashSet<_>>()),
        rerun_completed: args.rerun,
    };
    info!("Invoking the simulate workflow...");
    let simulated =
        tokio::task::block_in_place(|| workflows::simulate::run(&app.workflow, &options, &reporter))?;
    simulate::print_result(&simulated);

    info!("Invoking the export workflow...");
    let exported = tokio::task::block_in_place(|| {
        workflows::export::run(&app.workflow, args.format.into(), &reporter)
    })?;
    export::print_result(&exported);
    Ok(())
}
