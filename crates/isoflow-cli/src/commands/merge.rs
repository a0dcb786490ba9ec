use super::export::print_isotherms;
use super::reporter;
use crate::cli::{ConfigArgs, MergeArgs};
use crate::config::builder::build_config;
use crate::config::models::CliOverrides;
use crate::error::Result;
use crate::ui::UiEvent;
use isoflow::engine::config::WorkflowConfig;
use isoflow::workflows::{self, export::IsothermFormat};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(
    args: MergeArgs,
    config_args: &ConfigArgs,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    // Only isotherm reconstruction needs the campaign configuration.
    let app = if args.isotherms {
        Some(build_config(config_args, &CliOverrides::default())?)
    } else {
        None
    };
    let reporter = reporter(ui_sender);
    let isotherms: Option<(&WorkflowConfig, IsothermFormat)> = app
        .as_ref()
        .map(|app| (&app.workflow, IsothermFormat::from(args.format)));

    info!(documents = args.inputs.len(), "Invoking the merge workflow...");
    let result = tokio::task::block_in_place(|| {
        workflows::merge::run(args.inputs.as_slice(), &args.output, isotherms, &reporter)
    })?;

    println!(
        "✓ Merged {} document(s) ({} input(s), {} result(s)) into: {}",
        args.inputs.len(),
        result.document.input.len(),
        result.document.results.len(),
        result.output.display()
    );
    if let Some(output) = &result.isotherms {
        print_isotherms(output);
    }
    Ok(())
}
