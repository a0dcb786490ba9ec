use super::export::print_isotherms;
use super::reporter;
use crate::cli::{ConfigArgs, IsothermsArgs};
use crate::config::builder::build_config;
use crate::config::models::CliOverrides;
use crate::error::Result;
use crate::ui::UiEvent;
use isoflow::workflows::{self, export::IsothermFormat};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(
    args: IsothermsArgs,
    config_args: &ConfigArgs,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let app = build_config(config_args, &CliOverrides::default())?;
    let reporter = reporter(ui_sender);
    let format = IsothermFormat::from(args.format);

    let output = tokio::task::block_in_place(|| match &args.from {
        Some(document) => {
            info!("Rebuilding isotherms from {:?}", document);
            workflows::export::isotherms_from_document(document, &app.workflow, format, &reporter)
        }
        None => {
            info!("Rebuilding isotherms from the job index...");
            workflows::export::isotherms_from_index(&app.workflow, format, &reporter)
        }
    })?;
    print_isotherms(&output);
    Ok(())
}
