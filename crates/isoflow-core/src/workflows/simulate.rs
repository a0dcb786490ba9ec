use crate::core::models::keys::JobKey;
use crate::engine::config::WorkflowConfig;
use crate::engine::dispatch::Dispatcher;
use crate::engine::error::EngineError;
use crate::engine::index::JobIndexStore;
use crate::engine::inspect::{self, OutputSummary};
use crate::engine::pool::DispatchReport;
use crate::engine::progress::{Progress, ProgressReporter};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default)]
pub struct SimulateOptions {
    /// Restrict the batch to these jobs.
    pub only: Option<HashSet<JobKey>>,
    /// Launch jobs that already produced a report.
    pub rerun_completed: bool,
}

#[derive(Debug, Clone)]
pub struct SimulateResult {
    pub dispatch: DispatchReport,
    /// Jobs left alone because they already had a report.
    pub skipped: usize,
    /// Triage of every job in scope after the batch.
    pub summary: OutputSummary,
}

/// Runs every pending job in the index and inspects the outputs once all of
/// them have exited.
#[instrument(skip_all, name = "simulate_workflow")]
pub fn run(
    config: &WorkflowConfig,
    options: &SimulateOptions,
    reporter: &ProgressReporter,
) -> Result<SimulateResult, EngineError> {
    config.engine_executable()?;
    let root = config.simulations_dir();
    let store = JobIndexStore::open(&root)?;
    let keys: Vec<JobKey> = store
        .load(options.only.as_ref())?
        .into_iter()
        .map(|job| job.job_key)
        .collect();

    let pending: Vec<JobKey> = if options.rerun_completed {
        keys.clone()
    } else {
        let before = inspect::inspect(&root, &keys, &config.engine);
        keys.iter()
            .filter(|key| matches!(before.outcomes.get(*key), Some(inspect::JobOutcome::NoOutput)))
            .cloned()
            .collect()
    };
    let skipped = keys.len() - pending.len();
    info!(
        jobs = keys.len(),
        pending = pending.len(),
        skipped,
        "Selected jobs to simulate."
    );

    reporter.report(Progress::PhaseStart {
        name: "Running Simulations",
    });
    let dispatch = if pending.is_empty() {
        DispatchReport {
            launched: 0,
            wall_clock: Duration::ZERO,
        }
    } else {
        Dispatcher::new(config).run_all(&pending, reporter)?
    };
    reporter.report(Progress::PhaseFinish);

    let summary = check(config, &keys);
    Ok(SimulateResult {
        dispatch,
        skipped,
        summary,
    })
}

/// Classifies the outputs of `keys`.
pub fn check(config: &WorkflowConfig, keys: &[JobKey]) -> OutputSummary {
    let root = config.simulations_dir();
    let summary = inspect::inspect(&root, keys, &config.engine);
    info!(
        inspected = summary.inspected(),
        no_output = summary.no_output().len(),
        multi_output = summary.multi_output().len(),
        warned = summary.warned().len(),
        errored = summary.errored().len(),
        "Output inspection finished."
    );
    summary
}

/// Inspects every job in the index.
pub fn check_all(config: &WorkflowConfig) -> Result<OutputSummary, EngineError> {
    let store = JobIndexStore::open(&config.simulations_dir())?;
    let keys: Vec<JobKey> = store
        .load(None)?
        .into_iter()
        .map(|job| job.job_key)
        .collect();
    Ok(check(config, &keys))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::sweep::SweepSpec;
    use crate::engine::config::WorkflowConfigBuilder;
    use crate::workflows::prepare;
    use serde_json::json;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::tempdir;

    fn setup(engine_body: &str) -> (tempfile::TempDir, WorkflowConfig) {
        let dir = tempdir().unwrap();
        let engine = dir.path().join("engine");
        fs::write(&engine, engine_body).unwrap();
        fs::set_permissions(&engine, fs::Permissions::from_mode(0o755)).unwrap();
        let source = dir.path().join("db");
        fs::create_dir(&source).unwrap();
        fs::write(
            source.join("MIL-47.cif"),
            "_cell_length_a 20\n_cell_length_b 20\n_cell_length_c 20\n",
        )
        .unwrap();
        let config = WorkflowConfigBuilder::new()
            .output_dir(dir.path().join("out"))
            .engine_executable(Some(engine))
            .structure_source_dir(Some(source))
            .max_workers(2)
            .build()
            .unwrap();
        let spec = SweepSpec::from_value(json!({
            "parameters": {
                "structure": "MIL-47",
                "molecule_name": "CO2",
                "temperature": 298,
                "pressure": {"min": 10, "max": 1000, "count": 3}
            },
            "defaults": {}
        }))
        .unwrap();
        prepare::run(&spec, &config, &ProgressReporter::new()).unwrap();
        (dir, config)
    }

    fn report_path(config: &WorkflowConfig, key: &JobKey) -> std::path::PathBuf {
        config
            .simulations_dir()
            .join(key.as_str())
            .join(Path::new("Output/System_0/out.data"))
    }

    #[test]
    fn runs_all_jobs_then_skips_completed_ones() {
        let (_dir, config) = setup("#!/bin/sh\nmkdir -p Output/System_0\necho done > Output/System_0/out.data\n");
        let first = run(&config, &SimulateOptions::default(), &ProgressReporter::new()).unwrap();
        assert_eq!(first.dispatch.launched, 3);
        assert_eq!(first.skipped, 0);
        assert!(first.summary.is_clean());

        let second = run(&config, &SimulateOptions::default(), &ProgressReporter::new()).unwrap();
        assert_eq!(second.dispatch.launched, 0);
        assert_eq!(second.skipped, 3);

        let forced = SimulateOptions {
            rerun_completed: true,
            ..Default::default()
        };
        let third = run(&config, &forced, &ProgressReporter::new()).unwrap();
        assert_eq!(third.dispatch.launched, 3);
    }

    #[test]
    fn failing_jobs_surface_in_the_summary_not_as_errors() {
        let (_dir, config) = setup("#!/bin/sh\nexit 3\n");
        let result = run(&config, &SimulateOptions::default(), &ProgressReporter::new()).unwrap();
        assert_eq!(result.summary.no_output().len(), 3);

        let summary = check_all(&config).unwrap();
        let key = summary.no_output()[0].clone();
        assert!(!report_path(&config, &key).exists());
    }
}
