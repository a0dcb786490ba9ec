use super::{overrides, print_summary, reporter};
use crate::cli::{ConfigArgs, SimulateArgs};
use crate::config::builder::build_config;
use crate::error::Result;
use crate::ui::UiEvent;
use isoflow::workflows::{
    self,
    simulate::{SimulateOptions, SimulateResult},
};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(
    args: SimulateArgs,
    config_args: &ConfigArgs,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let app = build_config(config_args, &overrides(None, Some(&args.engine)))?;
    let options = SimulateOptions {
        only: None,
        rerun_completed: args.rerun,
    };
    let reporter = reporter(ui_sender);

    info!(
        workers = app.workflow.dispatch.max_workers,
        "Invoking the simulate workflow..."
    );
    let result =
        tokio::task::block_in_place(|| workflows::simulate::run(&app.workflow, &options, &reporter))?;
    print_result(&result);
    Ok(())
}

pub(crate) fn print_result(result: &SimulateResult) {
    println!(
        "✓ Launched {} job(s) in {:.1?}; {} already had a report.",
        result.dispatch.launched, result.dispatch.wall_clock, result.skipped
    );
    print_summary(&result.summary, false);
}
