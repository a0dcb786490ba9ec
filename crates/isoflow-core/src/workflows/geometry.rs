use crate::engine::config::{ConfigError, WorkflowConfig};
use crate::engine::error::EngineError;
use crate::engine::geometry::{GeometryAnalyzer, SurfaceAreaReport};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::structures::list_cif_files;
use std::path::PathBuf;
use tracing::instrument;

/// Runs the surface area analysis over `cif_files`, or over every structure in
/// the output root's CIF directory when none are given.
#[instrument(skip_all, name = "geometry_workflow")]
pub fn run(
    config: &WorkflowConfig,
    cif_files: Option<Vec<PathBuf>>,
    reporter: &ProgressReporter,
) -> Result<Vec<SurfaceAreaReport>, EngineError> {
    let executable = config
        .geometry
        .executable
        .as_deref()
        .ok_or(ConfigError::MissingParameter("geometry.executable"))?;
    let files = match cif_files {
        Some(files) => {
            if let Some(missing) = files.iter().find(|f| !f.is_file()) {
                return Err(EngineError::MissingStructure {
                    structure: missing.display().to_string(),
                    location: missing.parent().map(PathBuf::from).unwrap_or_default(),
                });
            }
            files
        }
        None => list_cif_files(&config.cif_dir()),
    };

    reporter.report(Progress::PhaseStart {
        name: "Surface Area Analysis",
    });
    let reports =
        GeometryAnalyzer::new(executable, &config.geometry).run(&files, &config.geometry_dir(), reporter)?;
    reporter.report(Progress::PhaseFinish);
    Ok(reports)
}
