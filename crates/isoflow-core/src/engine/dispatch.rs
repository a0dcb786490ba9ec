use super::config::WorkflowConfig;
use super::error::EngineError;
use super::pool::{
    DispatchReport, JobLaunch, LauncherScript, PoolBackend, ProcessPool, RUN_SCRIPT_NAME,
    WorkerPool,
};
use super::progress::ProgressReporter;
use crate::core::io::script::{self, SimulationSettings};
use crate::core::models::keys::JobKey;
use crate::core::models::record::JobRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const INPUT_FILE_NAME: &str = "simulation.input";
pub const JOB_SCRIPT_NAME: &str = "job.sh";

/// Builds per-job artifacts under the simulations root and drives their execution.
pub struct Dispatcher<'a> {
    config: &'a WorkflowConfig,
    root: PathBuf,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a WorkflowConfig) -> Self {
        Self {
            config,
            root: config.simulations_dir(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the engine input, a copy of the structure file and an executable
    /// `run` launcher into the job's working directory.
    pub fn materialize(
        &self,
        job: &JobRecord,
        settings: &SimulationSettings,
        structure_file: &Path,
    ) -> Result<(), EngineError> {
        let engine = self.config.engine_executable()?;
        let dir = &job.work_dir;
        fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;

        let file_name = structure_file.file_name().ok_or_else(|| {
            EngineError::Internal(format!("structure path {:?} has no file name", structure_file))
        })?;
        let framework = structure_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let copy = dir.join(file_name);
        fs::copy(structure_file, &copy).map_err(|e| EngineError::io(structure_file, e))?;

        let input = dir.join(INPUT_FILE_NAME);
        fs::write(&input, settings.render_input(&framework))
            .map_err(|e| EngineError::io(&input, e))?;

        let launcher = dir.join(RUN_SCRIPT_NAME);
        write_executable(&launcher, &script::render_run_script(engine))?;
        debug!("Materialized job {} with framework {}", job.job_key, framework);
        Ok(())
    }

    /// Writes `job.sh`, which runs every listed job's launcher with at most
    /// `max_workers` in flight.
    pub fn write_aggregate_launcher(&self, job_keys: &[JobKey]) -> Result<PathBuf, EngineError> {
        let path = self.root.join(JOB_SCRIPT_NAME);
        write_executable(
            &path,
            &script::render_job_script(job_keys, self.config.dispatch.max_workers),
        )?;
        info!(jobs = job_keys.len(), "Wrote aggregate launcher {:?}", path);
        Ok(path)
    }

    pub fn pool(&self) -> Box<dyn WorkerPool> {
        match self.config.dispatch.backend {
            PoolBackend::Process => Box::new(ProcessPool::new(self.config.dispatch.max_workers)),
            PoolBackend::LauncherScript => {
                Box::new(LauncherScript::new(self.root.join(JOB_SCRIPT_NAME)))
            }
        }
    }

    /// Runs the listed jobs and blocks until every one has exited. There is no
    /// timeout: a job that never exits holds the batch.
    #[instrument(skip_all, name = "dispatch")]
    pub fn run_all(
        &self,
        job_keys: &[JobKey],
        reporter: &ProgressReporter,
    ) -> Result<DispatchReport, EngineError> {
        let jobs: Vec<JobLaunch> = job_keys
            .iter()
            .map(|key| JobLaunch {
                job_key: key.clone(),
                work_dir: self.root.join(key.as_str()),
            })
            .collect();
        if let Some(missing) = jobs
            .iter()
            .find(|job| !job.work_dir.join(RUN_SCRIPT_NAME).is_file())
        {
            return Err(EngineError::Internal(format!(
                "job {} has not been materialized",
                missing.job_key
            )));
        }
        if self.config.dispatch.backend == PoolBackend::LauncherScript {
            self.write_aggregate_launcher(job_keys)?;
        }

        let pool = self.pool();
        let report = pool.run(&jobs, reporter)?;
        info!(
            launched = report.launched,
            backend = pool.name(),
            seconds = report.wall_clock.as_secs_f64(),
            "All jobs have exited."
        );
        Ok(report)
    }
}

fn write_executable(path: &Path, content: &str) -> Result<(), EngineError> {
    fs::write(path, content).map_err(|e| EngineError::io(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| EngineError::io(path, e))?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::models::record::ParameterRecord;
    use crate::core::models::value::ParamValue;
    use crate::engine::config::WorkflowConfigBuilder;
    use crate::engine::index::JobIndexStore;
    use tempfile::tempdir;

    fn params() -> ParameterRecord {
        [
            ("structure", ParamValue::from("MIL-47")),
            ("molecule_name", ParamValue::from("CO2")),
            ("temperature", ParamValue::Int(298)),
            ("pressure", ParamValue::Float(1000.0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn setup(backend: PoolBackend) -> (tempfile::TempDir, WorkflowConfig) {
        let dir = tempdir().unwrap();
        let engine = dir.path().join("fake-engine");
        // Writes a report where the engine would, echoing its input file name.
        fs::write(
            &engine,
            "#!/bin/sh\nmkdir -p Output/System_0\necho \"$1\" > Output/System_0/out.data\n",
        )
        .unwrap();
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&engine, fs::Permissions::from_mode(0o755)).unwrap();
        let config = WorkflowConfigBuilder::new()
            .output_dir(dir.path().join("out"))
            .engine_executable(Some(engine))
            .max_workers(2)
            .backend(backend)
            .build()
            .unwrap();
        (dir, config)
    }

    fn prepare_one(config: &WorkflowConfig, cif: &Path) -> JobKey {
        let mut store = JobIndexStore::open(&config.simulations_dir()).unwrap();
        let key = store.register(&params()).unwrap().key().clone();
        let job = store.load(None).unwrap().remove(0);
        let settings = SimulationSettings::from_record(&job.parameters).unwrap();
        Dispatcher::new(config)
            .materialize(&job, &settings, cif)
            .unwrap();
        key
    }

    #[test]
    fn materialize_writes_input_structure_and_launcher() {
        let (dir, config) = setup(PoolBackend::Process);
        let cif = dir.path().join("MIL-47.cif");
        fs::write(&cif, "_cell_length_a 10\n").unwrap();
        let key = prepare_one(&config, &cif);

        let job_dir = config.simulations_dir().join(key.as_str());
        assert!(job_dir.join("MIL-47.cif").is_file());
        let input = fs::read_to_string(job_dir.join(INPUT_FILE_NAME)).unwrap();
        assert!(input.contains("FrameworkName                 MIL-47"));
        assert_eq!(RUN_SCRIPT_NAME, "run");
        let run = fs::read_to_string(job_dir.join("run")).unwrap();
        assert!(run.contains("fake-engine"));
    }

    #[test]
    fn run_all_executes_jobs_through_either_backend() {
        for backend in [PoolBackend::Process, PoolBackend::LauncherScript] {
            let (dir, config) = setup(backend);
            let cif = dir.path().join("MIL-47.cif");
            fs::write(&cif, "_cell_length_a 10\n").unwrap();
            let key = prepare_one(&config, &cif);

            let report = Dispatcher::new(&config)
                .run_all(&[key.clone()], &ProgressReporter::new())
                .unwrap();
            assert_eq!(report.launched, 1);
            let out = config
                .simulations_dir()
                .join(key.as_str())
                .join("Output/System_0/out.data");
            assert_eq!(fs::read_to_string(out).unwrap().trim(), INPUT_FILE_NAME);
        }
    }

    #[test]
    fn unmaterialized_job_is_rejected_before_launch() {
        let (_dir, config) = setup(PoolBackend::Process);
        let key: JobKey = "sim0000dead".parse().unwrap();
        let err = Dispatcher::new(&config)
            .run_all(&[key], &ProgressReporter::new())
            .unwrap_err();
        assert!(err.to_string().contains("sim0000dead"));
    }
}
