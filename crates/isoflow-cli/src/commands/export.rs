use super::reporter;
use crate::cli::{ConfigArgs, ExportArgs};
use crate::config::builder::build_config;
use crate::config::models::CliOverrides;
use crate::error::Result;
use crate::ui::UiEvent;
use isoflow::workflows::{
    self,
    export::{ExportResult, IsothermOutput},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(
    args: ExportArgs,
    config_args: &ConfigArgs,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let app = build_config(config_args, &CliOverrides::default())?;
    let reporter = reporter(ui_sender);

    info!("Invoking the export workflow...");
    let result = tokio::task::block_in_place(|| {
        workflows::export::run(&app.workflow, args.format.into(), &reporter)
    })?;
    print_result(&result);
    Ok(())
}

pub(crate) fn print_result(result: &ExportResult) {
    for problem in &result.stats.unparsed {
        warn!("{}", problem);
    }
    println!(
        "✓ Extracted results from {} job(s); {} without a usable report, {} unparsable.",
        result.stats.extracted,
        result.stats.skipped,
        result.stats.unparsed.len()
    );
    println!(
        "  Result document {} written to: {}",
        result.run_key,
        result.document_path.display()
    );
    print_isotherms(&result.isotherms);
}

pub(crate) fn print_isotherms(output: &IsothermOutput) {
    let points: usize = output.groups.iter().map(|g| g.curve.len()).sum();
    println!(
        "✓ Built {} isotherm(s) with {} point(s).",
        output.groups.len(),
        points
    );
    for path in &output.written {
        println!("  Written to: {}", path.display());
    }
}
