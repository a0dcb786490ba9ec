use super::{overrides, reporter};
use crate::cli::{ConfigArgs, PrepareArgs};
use crate::config::builder::build_config;
use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use isoflow::core::sweep::SweepSpec;
use isoflow::workflows::{self, prepare::PrepareResult};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(
    args: PrepareArgs,
    config_args: &ConfigArgs,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let app = build_config(config_args, &overrides(Some(&args.structures), None))?;
    let spec = load_spec(&args.input)?;
    let reporter = reporter(ui_sender);

    info!("Invoking the prepare workflow...");
    let result =
        tokio::task::block_in_place(|| workflows::prepare::run(&spec, &app.workflow, &reporter))?;
    print_result(&result);
    Ok(())
}

pub(crate) fn load_spec(path: &Path) -> Result<SweepSpec> {
    info!("Loading sweep specification from {:?}", path);
    SweepSpec::from_path(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

pub(crate) fn print_result(result: &PrepareResult) {
    println!(
        "✓ Registered {} new job(s), {} already indexed.",
        result.registered.len(),
        result.reused.len()
    );
    if result.filtered > 0 {
        println!(
            "  {} record(s) skipped by the structure subset filter.",
            result.filtered
        );
    }
}
