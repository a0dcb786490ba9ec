mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod ui;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::ui::UiManager;
use clap::Parser;
use tokio::task;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_app() -> Result<()> {
    let cli = Cli::parse();

    let (ui_manager, ui_sender, shutdown_sender) = UiManager::new();
    let ui_handle = task::spawn(ui_manager.run());

    logging::setup_logging(
        cli.verbose,
        cli.quiet,
        cli.log_file.clone(),
        Some(ui_sender.clone()),
    )?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    let command_result = async {
        info!("🚀 ISOFLOW CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
        debug!("Full CLI arguments parsed: {:?}", &cli);

        if let Some(num_threads) = cli.threads {
            info!(
                "Setting Rayon global thread pool to {} threads.",
                num_threads
            );
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()
                .map_err(|e| {
                    CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e))
                })?;
        }

        let config_args = &cli.config;
        match cli.command {
            Commands::Prepare(args) => {
                info!("Dispatching to 'prepare' command.");
                commands::prepare::run(args, config_args, ui_sender).await
            }
            Commands::Simulate(args) => {
                info!("Dispatching to 'simulate' command.");
                commands::simulate::run(args, config_args, ui_sender).await
            }
            Commands::Check(args) => {
                info!("Dispatching to 'check' command.");
                commands::check::run(args, config_args).await
            }
            Commands::Export(args) => {
                info!("Dispatching to 'export' command.");
                commands::export::run(args, config_args, ui_sender).await
            }
            Commands::Run(args) => {
                info!("Dispatching to 'run' command.");
                commands::run::run(args, config_args, ui_sender).await
            }
            Commands::Isotherms(args) => {
                info!("Dispatching to 'isotherms' command.");
                commands::isotherms::run(args, config_args, ui_sender).await
            }
            Commands::Merge(args) => {
                info!("Dispatching to 'merge' command.");
                commands::merge::run(args, config_args, ui_sender).await
            }
            Commands::Geometry(args) => {
                info!("Dispatching to 'geometry' command.");
                commands::geometry::run(args, config_args, ui_sender).await
            }
        }
    }
    .await;

    match &command_result {
        Ok(_) => {
            info!("✅ Command completed successfully.");
            println!("✅ Command completed successfully.");
        }
        Err(e) => {
            error!("❌ Command failed: {}", e);
        }
    }

    if shutdown_sender.send(true).is_err() {
        warn!("UI manager may have already exited before shutdown signal.");
    }

    ui_handle
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("UI manager task failed: {}", e)))?;

    command_result
}
