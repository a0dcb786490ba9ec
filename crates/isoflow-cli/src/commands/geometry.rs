use super::reporter;
use crate::cli::{ConfigArgs, GeometryArgs};
use crate::config::builder::build_config;
use crate::config::models::CliOverrides;
use crate::error::Result;
use crate::ui::UiEvent;
use isoflow::engine::geometry::GEOMETRY_RESULTS_NAME;
use isoflow::workflows;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(
    args: GeometryArgs,
    config_args: &ConfigArgs,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let overrides = CliOverrides {
        geometry_executable: args.executable.clone(),
        ..Default::default()
    };
    let app = build_config(config_args, &overrides)?;
    let reporter = reporter(ui_sender);
    let files = (!args.files.is_empty()).then(|| args.files.clone());

    info!("Invoking the geometry workflow...");
    let reports =
        tokio::task::block_in_place(|| workflows::geometry::run(&app.workflow, files, &reporter))?;

    if reports.is_empty() {
        warn!("No structures were analyzed.");
        println!("Warning: no CIF files found to analyze.");
        return Ok(());
    }
    println!(
        "✓ Analyzed {} structure(s). Results written to: {}",
        reports.len(),
        app.workflow
            .geometry_dir()
            .join(GEOMETRY_RESULTS_NAME)
            .display()
    );
    Ok(())
}
