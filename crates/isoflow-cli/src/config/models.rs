use isoflow::engine::config::WorkflowConfig;
use std::path::PathBuf;

/// Values given as command-line flags, which take precedence over both
/// `--set` and the configuration file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub engine: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub backend: Option<String>,
    pub structure_dir: Option<PathBuf>,
    pub structure_subset: Option<String>,
    pub geometry_executable: Option<PathBuf>,
}

pub struct AppConfig {
    /// The configuration file that was read, if any.
    pub source: Option<PathBuf>,
    pub workflow: WorkflowConfig,
}
