use super::config::{MOLECULE_PLACEHOLDER, ReportSettings};
use super::error::EngineError;
use super::inspect::OutputSummary;
use crate::core::io::report::{BlockReportParser, ReportParser};
use crate::core::models::record::JobRecord;
use crate::core::models::value::ParamValue;
use rayon::prelude::*;
use std::fs;
use tracing::{debug, info, instrument, warn};

/// Field holding the adsorbate name used to resolve the loading key path.
pub const MOLECULE_FIELD: &str = "molecule_name";

#[derive(Debug, Default)]
pub struct ExtractionStats {
    pub extracted: usize,
    /// Jobs without a usable report.
    pub skipped: usize,
    /// Jobs whose report could not be read or lacked a required value.
    pub unparsed: Vec<EngineError>,
}

/// Pulls the pressure and loading out of each job's report and stores them
/// in the job's result map.
pub struct ResultExtractor {
    parser: Box<dyn ReportParser>,
    settings: ReportSettings,
}

impl ResultExtractor {
    pub fn new(settings: ReportSettings) -> Self {
        Self::with_parser(Box::new(BlockReportParser), settings)
    }

    pub fn with_parser(parser: Box<dyn ReportParser>, settings: ReportSettings) -> Self {
        Self { parser, settings }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    pub fn extract(&self, job: &mut JobRecord, report: &str) -> Result<(), EngineError> {
        let anomaly = |reason: String| EngineError::JobOutputAnomaly {
            job_key: job.job_key.clone(),
            reason,
        };
        let molecule = job
            .parameters
            .text(MOLECULE_FIELD)
            .ok_or_else(|| anomaly(format!("record has no text field '{}'", MOLECULE_FIELD)))?;

        let tree = self.parser.parse(report);
        let loading_path: Vec<&str> = self
            .settings
            .loading_path
            .iter()
            .map(|segment| {
                if segment == MOLECULE_PLACEHOLDER {
                    molecule
                } else {
                    segment.as_str()
                }
            })
            .collect();

        let first = |path: &[&str]| -> Result<f64, EngineError> {
            tree.values(path)
                .map_err(|e| anomaly(e.to_string()))?
                .first()
                .copied()
                .ok_or_else(|| anomaly(format!("no value at '{}'", path.join(" / "))))
        };
        let pressure_path: Vec<&str> = self.settings.pressure_path.iter().map(String::as_str).collect();
        let pressure = first(&pressure_path)?;
        let uptake = first(&loading_path)?;

        job.results
            .insert(self.settings.pressure_field.clone(), ParamValue::Float(pressure));
        job.results
            .insert(self.settings.uptake_field.clone(), ParamValue::Float(uptake));
        Ok(())
    }

    /// Extracts every job with a usable report in `summary`. Failures are
    /// per job and never abort the batch.
    #[instrument(skip_all, name = "extract_results")]
    pub fn extract_all(&self, jobs: &mut [JobRecord], summary: &OutputSummary) -> ExtractionStats {
        let outcomes: Vec<Option<Result<(), EngineError>>> = jobs
            .par_iter_mut()
            .map(|job| {
                let path = summary.usable_report(&job.job_key)?;
                let result = fs::read_to_string(path)
                    .map_err(|e| EngineError::io(path, e))
                    .and_then(|text| self.extract(job, &text));
                Some(result)
            })
            .collect();

        let mut stats = ExtractionStats::default();
        for outcome in outcomes {
            match outcome {
                None => stats.skipped += 1,
                Some(Ok(())) => stats.extracted += 1,
                Some(Err(e)) => {
                    warn!("{}", e);
                    stats.unparsed.push(e);
                }
            }
        }
        debug!(skipped = stats.skipped, "Jobs without a usable report were skipped.");
        info!(
            extracted = stats.extracted,
            unparsed = stats.unparsed.len(),
            "Result extraction finished."
        );
        stats
    }
}
