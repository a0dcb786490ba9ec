use super::export::{self, IsothermFormat, IsothermOutput};
use crate::core::io::document::ResultDocument;
use crate::engine::config::WorkflowConfig;
use crate::engine::error::EngineError;
use crate::engine::merge;
use crate::engine::progress::{Progress, ProgressReporter};
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Debug)]
pub struct MergeResult {
    pub output: PathBuf,
    pub document: ResultDocument,
    pub isotherms: Option<IsothermOutput>,
}

/// Merges result documents into `output`. With `isotherms`, the merged results
/// are also grouped into isotherms under the configured output root.
#[instrument(skip_all, name = "merge_workflow")]
pub fn run<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    isotherms: Option<(&WorkflowConfig, IsothermFormat)>,
    reporter: &ProgressReporter,
) -> Result<MergeResult, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Merging Documents",
    });
    let document = merge::merge_files(inputs)?;
    let output = merge::write_document(&document, output)?;
    reporter.report(Progress::PhaseFinish);

    let isotherms = match isotherms {
        Some((config, format)) => Some(export::write_isotherms(
            &document.results,
            config,
            format,
            reporter,
        )?),
        None => None,
    };
    Ok(MergeResult {
        output,
        document,
        isotherms,
    })
}
