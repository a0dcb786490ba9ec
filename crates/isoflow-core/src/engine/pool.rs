use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use crate::core::models::keys::JobKey;
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const RUN_SCRIPT_NAME: &str = "run";
pub const RUN_LOG_NAME: &str = "run.log";

/// Which [`WorkerPool`] implementation drives a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolBackend {
    /// One child process per job, at most `max_workers` at a time.
    #[default]
    Process,
    /// A single `sh job.sh` process that fans out with `xargs -P`.
    LauncherScript,
}

impl FromStr for PoolBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "launcher-script" | "script" => Ok(Self::LauncherScript),
            other => Err(format!(
                "unknown pool backend '{}' (expected 'process' or 'launcher-script')",
                other
            )),
        }
    }
}

/// One job ready to be launched: its key and materialized working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLaunch {
    pub job_key: JobKey,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub launched: usize,
    pub wall_clock: Duration,
}

/// Executes a batch of materialized jobs and blocks until all have exited.
///
/// Exit statuses are logged but never interpreted; the output inspection step
/// decides what succeeded.
pub trait WorkerPool: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, jobs: &[JobLaunch], reporter: &ProgressReporter)
    -> Result<DispatchReport, EngineError>;
}

/// Runs each job's launcher as its own child process on a bounded rayon pool.
#[derive(Debug, Clone)]
pub struct ProcessPool {
    max_workers: usize,
}

impl ProcessPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }
}

impl WorkerPool for ProcessPool {
    fn name(&self) -> &'static str {
        "process"
    }

    fn run(
        &self,
        jobs: &[JobLaunch],
        reporter: &ProgressReporter,
    ) -> Result<DispatchReport, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .thread_name(|i| format!("isoflow-job-{}", i))
            .build()
            .map_err(|e| EngineError::Internal(format!("failed to build worker pool: {}", e)))?;

        info!(
            jobs = jobs.len(),
            workers = self.max_workers,
            "Launching jobs on the process pool."
        );
        reporter.report(Progress::TaskStart {
            total: jobs.len() as u64,
        });
        let start = Instant::now();
        let launched: usize = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let started = launch_job(job);
                    reporter.increment();
                    usize::from(started)
                })
                .sum()
        });
        reporter.report(Progress::TaskFinish);

        Ok(DispatchReport {
            launched,
            wall_clock: start.elapsed(),
        })
    }
}

fn launch_job(job: &JobLaunch) -> bool {
    match run_logged(
        Command::new("sh").arg(RUN_SCRIPT_NAME),
        &job.work_dir,
        &job.work_dir.join(RUN_LOG_NAME),
    ) {
        Ok(status) => {
            debug!("Job {} exited with {}", job.job_key, status);
            true
        }
        Err(e) => {
            warn!("Job {} could not be started: {}", job.job_key, e);
            false
        }
    }
}

/// Runs `command` in `dir` with stdout and stderr captured to `log`.
pub(crate) fn run_logged(
    command: &mut Command,
    dir: &Path,
    log: &Path,
) -> std::io::Result<ExitStatus> {
    let out = File::create(log)?;
    let err = out.try_clone()?;
    command
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err))
        .status()
}

/// Hands the whole batch to the aggregate launcher script in one process.
#[derive(Debug, Clone)]
pub struct LauncherScript {
    script: PathBuf,
}

impl LauncherScript {
    pub fn new(script: PathBuf) -> Self {
        Self { script }
    }
}

impl WorkerPool for LauncherScript {
    fn name(&self) -> &'static str {
        "launcher-script"
    }

    fn run(
        &self,
        jobs: &[JobLaunch],
        reporter: &ProgressReporter,
    ) -> Result<DispatchReport, EngineError> {
        let dir = self
            .script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let log = dir.join("sim.log");
        reporter.report(Progress::StatusUpdate {
            text: format!("Running {} jobs through {:?}", jobs.len(), self.script),
        });
        info!("Running aggregate launcher {:?}", self.script);

        let start = Instant::now();
        let status = run_logged(Command::new("sh").arg(&self.script), &dir, &log)
            .map_err(|e| EngineError::io(&self.script, e))?;
        debug!("Aggregate launcher exited with {}", status);

        Ok(DispatchReport {
            launched: jobs.len(),
            wall_clock: start.elapsed(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn job(root: &Path, key: &str, body: &str) -> JobLaunch {
        let work_dir = root.join(key);
        fs::create_dir_all(&work_dir).unwrap();
        fs::write(work_dir.join(RUN_SCRIPT_NAME), body).unwrap();
        JobLaunch {
            job_key: key.parse().unwrap(),
            work_dir,
        }
    }

    #[test]
    fn process_pool_runs_every_job_and_ignores_exit_codes() {
        let dir = tempdir().unwrap();
        let jobs = vec![
            job(dir.path(), "sim00000001", "echo done > out.txt\n"),
            job(dir.path(), "sim00000002", "echo failing; exit 3\n"),
        ];
        let report = ProcessPool::new(2)
            .run(&jobs, &ProgressReporter::new())
            .unwrap();
        assert_eq!(report.launched, 2);
        assert!(jobs[0].work_dir.join("out.txt").is_file());
        let log = fs::read_to_string(jobs[1].work_dir.join(RUN_LOG_NAME)).unwrap();
        assert_eq!(log.trim(), "failing");
    }

    #[test]
    fn launcher_script_runs_once_for_the_batch() {
        let dir = tempdir().unwrap();
        let jobs = vec![job(dir.path(), "sim00000003", "touch ran\n")];
        let script = dir.path().join("job.sh");
        fs::write(&script, "cd \"$(dirname \"$0\")\"\nsh sim00000003/run\n").unwrap();
        let report = LauncherScript::new(script)
            .run(&jobs, &ProgressReporter::new())
            .unwrap();
        assert_eq!(report.launched, 1);
        assert!(dir.path().join("ran").exists() || jobs[0].work_dir.join("ran").exists());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("process".parse::<PoolBackend>().unwrap(), PoolBackend::Process);
        assert_eq!(
            "launcher-script".parse::<PoolBackend>().unwrap(),
            PoolBackend::LauncherScript
        );
        assert!("slurm".parse::<PoolBackend>().is_err());
    }
}
