use super::print_summary;
use crate::cli::{CheckArgs, ConfigArgs};
use crate::config::builder::build_config;
use crate::config::models::CliOverrides;
use crate::error::Result;
use isoflow::workflows;

pub async fn run(args: CheckArgs, config_args: &ConfigArgs) -> Result<()> {
    let app = build_config(config_args, &CliOverrides::default())?;
    let summary = tokio::task::block_in_place(|| workflows::simulate::check_all(&app.workflow))?;
    if summary.inspected() == 0 {
        println!("No jobs are indexed under {:?}.", app.workflow.simulations_dir());
        return Ok(());
    }
    print_summary(&summary, args.details);
    Ok(())
}
