use super::prepare::read_inputs;
use crate::core::io::document::{ResultDocument, RunMetadata};
use crate::core::io::traits::JsonDocument;
use crate::core::models::keys::RunKey;
use crate::core::models::record::JobRecord;
use crate::engine::aggregate::{
    self, FieldExtractor, ISOTHERM_DOCUMENT_NAME, IsothermDocument, IsothermGroup, IsothermTable,
};
use crate::engine::config::WorkflowConfig;
use crate::engine::error::EngineError;
use crate::engine::extract::{ExtractionStats, ResultExtractor};
use crate::engine::index::JobIndexStore;
use crate::engine::inspect::{self, OutputSummary};
use crate::engine::merge;
use crate::engine::progress::{Progress, ProgressReporter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, instrument};

/// Which isotherm stores to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsothermFormat {
    Csv,
    Json,
    #[default]
    Both,
}

impl IsothermFormat {
    fn csv(self) -> bool {
        matches!(self, Self::Csv | Self::Both)
    }

    fn json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }
}

impl FromStr for IsothermFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown isotherm format '{}' (expected csv, json or both)",
                other
            )),
        }
    }
}

#[derive(Debug)]
pub struct ExportResult {
    pub run_key: RunKey,
    pub document_path: PathBuf,
    pub document: ResultDocument,
    pub summary: OutputSummary,
    pub stats: ExtractionStats,
    pub isotherms: IsothermOutput,
}

#[derive(Debug, Default)]
pub struct IsothermOutput {
    pub groups: Vec<IsothermGroup>,
    pub written: Vec<PathBuf>,
}

/// Extracts results from every indexed job, writes the result document of
/// this run, and rebuilds the isotherms.
#[instrument(skip_all, name = "export_workflow")]
pub fn run(
    config: &WorkflowConfig,
    format: IsothermFormat,
    reporter: &ProgressReporter,
) -> Result<ExportResult, EngineError> {
    // === Phase 1: Extraction ===
    let Extraction {
        mut jobs,
        summary,
        stats,
    } = extract_jobs(config, reporter)?;
    let root = config.simulations_dir();

    // === Phase 2: Result document ===
    reporter.report(Progress::PhaseStart {
        name: "Writing Result Document",
    });
    let run_key = RunKey::generate();
    for job in &mut jobs {
        job.run_key = Some(run_key.clone());
    }
    let engine = config
        .engine
        .executable
        .as_ref()
        .map(|p| p.display().to_string());
    let document = ResultDocument {
        input: read_inputs(&root)?,
        metadata: vec![RunMetadata::capture(run_key.clone(), engine)],
        results: jobs.iter().filter(|job| !job.results.is_empty()).cloned().collect(),
    };
    let document_path = merge::write_document(&document, &root.join(format!("{}.json", run_key)))?;
    info!(
        results = document.results.len(),
        "Result document written to {:?}",
        document_path
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Isotherms ===
    let isotherms = write_isotherms(&jobs, config, format, reporter)?;

    Ok(ExportResult {
        run_key,
        document_path,
        document,
        summary,
        stats,
        isotherms,
    })
}

struct Extraction {
    jobs: Vec<JobRecord>,
    summary: OutputSummary,
    stats: ExtractionStats,
}

fn extract_jobs(config: &WorkflowConfig, reporter: &ProgressReporter) -> Result<Extraction, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Extracting Results",
    });
    let root = config.simulations_dir();
    let store = JobIndexStore::open(&root)?;
    let mut jobs = store.load(None)?;
    let keys: Vec<_> = jobs.iter().map(|job| job.job_key.clone()).collect();
    let summary = inspect::inspect(&root, &keys, &config.engine);
    let stats = ResultExtractor::new(config.report.clone()).extract_all(&mut jobs, &summary);
    reporter.report(Progress::PhaseFinish);
    Ok(Extraction {
        jobs,
        summary,
        stats,
    })
}

/// Groups `jobs` into isotherms and writes them under the isotherms directory.
pub fn write_isotherms(
    jobs: &[JobRecord],
    config: &WorkflowConfig,
    format: IsothermFormat,
    reporter: &ProgressReporter,
) -> Result<IsothermOutput, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Building Isotherms",
    });
    let x_name = &config.report.pressure_field;
    let y_name = &config.report.uptake_field;
    let groups = aggregate::group_and_extract(
        jobs,
        &config.aggregation.curve_variables,
        &config.aggregation.non_grouping,
        config.aggregation.key_policy,
        &FieldExtractor::new(x_name.as_str(), y_name.as_str()),
    );

    let dir = config.isotherms_dir();
    let table = IsothermTable::new(&dir, x_name.as_str(), y_name.as_str());
    let groups = table.reconcile(groups, config.aggregation.key_policy)?;
    let mut written = Vec::new();
    if format.csv() {
        table.write(&groups)?;
        written.push(table.index_path());
    }
    if format.json() {
        let path = dir.join(ISOTHERM_DOCUMENT_NAME);
        IsothermDocument::from_groups(&groups, x_name, y_name)
            .write_to_path(&path)
            .map_err(|e| EngineError::document(&path, e))?;
        written.push(path);
    }
    info!(groups = groups.len(), "Isotherms written.");
    reporter.report(Progress::PhaseFinish);
    Ok(IsothermOutput { groups, written })
}

/// Rebuilds isotherms from the results section of an existing document.
pub fn isotherms_from_document(
    path: &Path,
    config: &WorkflowConfig,
    format: IsothermFormat,
    reporter: &ProgressReporter,
) -> Result<IsothermOutput, EngineError> {
    let document = ResultDocument::read_from_path(path).map_err(|e| EngineError::document(path, e))?;
    write_isotherms(&document.results, config, format, reporter)
}

/// Rebuilds isotherms straight from the job index, extracting every report
/// again without writing a result document.
pub fn isotherms_from_index(
    config: &WorkflowConfig,
    format: IsothermFormat,
    reporter: &ProgressReporter,
) -> Result<IsothermOutput, EngineError> {
    let extraction = extract_jobs(config, reporter)?;
    write_isotherms(&extraction.jobs, config, format, reporter)
}
