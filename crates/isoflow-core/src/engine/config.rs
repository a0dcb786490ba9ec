use super::aggregate::GroupKeyPolicy;
use super::pool::PoolBackend;
use crate::core::sweep::SweepOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub const DEFAULT_PRESSURE_FIELD: &str = "Pressure(Pa)";
pub const DEFAULT_UPTAKE_FIELD: &str = "uptake(cm^3 (STP)/cm^3 framework)";
/// Placeholder in a report key path replaced by the job's molecule name.
pub const MOLECULE_PLACEHOLDER: &str = "{molecule}";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub executable: Option<PathBuf>,
    /// Directory, relative to a job directory, where the engine writes its report.
    pub report_dir: PathBuf,
    pub report_extension: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub max_workers: usize,
    pub backend: PoolBackend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationSettings {
    pub curve_variables: Vec<String>,
    pub non_grouping: Vec<String>,
    pub key_policy: GroupKeyPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSettings {
    pub pressure_path: Vec<String>,
    pub loading_path: Vec<String>,
    pub pressure_field: String,
    pub uptake_field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureSettings {
    pub source_dir: Option<PathBuf>,
    pub source_label: String,
    /// Only structures whose file name contains this substring are simulated.
    pub subset: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeSettings {
    pub tool: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySettings {
    pub executable: Option<PathBuf>,
    pub channel_radius: f64,
    pub probe_radius: f64,
    pub samples_per_atom: u32,
}

/// Everything a workflow needs to know about its environment, validated once
/// when built.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub output_dir: PathBuf,
    pub sweep: SweepOptions,
    pub engine: EngineSettings,
    pub dispatch: DispatchSettings,
    pub aggregation: AggregationSettings,
    pub report: ReportSettings,
    pub structures: StructureSettings,
    pub charges: ChargeSettings,
    pub geometry: GeometrySettings,
}

impl WorkflowConfig {
    pub fn cif_dir(&self) -> PathBuf {
        self.output_dir.join("cif")
    }

    pub fn simulations_dir(&self) -> PathBuf {
        self.output_dir.join("simulations")
    }

    pub fn isotherms_dir(&self) -> PathBuf {
        self.output_dir.join("isotherms")
    }

    pub fn geometry_dir(&self) -> PathBuf {
        self.output_dir.join("zeopp_asa")
    }

    pub fn engine_executable(&self) -> Result<&Path, ConfigError> {
        self.engine
            .executable
            .as_deref()
            .ok_or(ConfigError::MissingParameter("engine.executable"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.max_workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.aggregation.curve_variables.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "aggregation.curve_variables",
                reason: "at least one curve variable is required".into(),
            });
        }
        if self.report.pressure_path.is_empty() || self.report.loading_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "report",
                reason: "key paths must not be empty".into(),
            });
        }
        check_file("engine.executable", self.engine.executable.as_deref())?;
        check_file("charges.tool", self.charges.tool.as_deref())?;
        check_file("geometry.executable", self.geometry.executable.as_deref())?;
        if let Some(dir) = &self.structures.source_dir {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidValue {
                    field: "structures.source_dir",
                    reason: format!("{:?} is not a directory", dir),
                });
            }
        }
        Ok(())
    }
}

fn check_file(field: &'static str, path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) if !path.is_file() => Err(ConfigError::InvalidValue {
            field,
            reason: format!("{:?} does not exist or is not a file", path),
        }),
        _ => Ok(()),
    }
}

#[derive(Default)]
pub struct WorkflowConfigBuilder {
    output_dir: Option<PathBuf>,
    range_parameter: Option<String>,
    count_field: Option<String>,
    engine_executable: Option<PathBuf>,
    report_dir: Option<PathBuf>,
    report_extension: Option<String>,
    max_workers: Option<usize>,
    backend: Option<PoolBackend>,
    curve_variables: Option<Vec<String>>,
    non_grouping: Option<Vec<String>>,
    key_policy: Option<GroupKeyPolicy>,
    pressure_path: Option<Vec<String>>,
    loading_path: Option<Vec<String>>,
    pressure_field: Option<String>,
    uptake_field: Option<String>,
    structure_source_dir: Option<PathBuf>,
    structure_source_label: Option<String>,
    structure_subset: Option<String>,
    charge_tool: Option<PathBuf>,
    geometry_executable: Option<PathBuf>,
    channel_radius: Option<f64>,
    probe_radius: Option<f64>,
    samples_per_atom: Option<u32>,
}

impl WorkflowConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_dir(mut self, path: PathBuf) -> Self {
        self.output_dir = Some(path);
        self
    }
    pub fn range_parameter(mut self, name: String) -> Self {
        self.range_parameter = Some(name);
        self
    }
    pub fn count_field(mut self, name: String) -> Self {
        self.count_field = Some(name);
        self
    }
    pub fn engine_executable(mut self, path: Option<PathBuf>) -> Self {
        self.engine_executable = path;
        self
    }
    pub fn report_dir(mut self, path: PathBuf) -> Self {
        self.report_dir = Some(path);
        self
    }
    pub fn report_extension(mut self, ext: String) -> Self {
        self.report_extension = Some(ext);
        self
    }
    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = Some(n);
        self
    }
    pub fn backend(mut self, backend: PoolBackend) -> Self {
        self.backend = Some(backend);
        self
    }
    pub fn curve_variables(mut self, names: Vec<String>) -> Self {
        self.curve_variables = Some(names);
        self
    }
    pub fn non_grouping(mut self, names: Vec<String>) -> Self {
        self.non_grouping = Some(names);
        self
    }
    pub fn key_policy(mut self, policy: GroupKeyPolicy) -> Self {
        self.key_policy = Some(policy);
        self
    }
    pub fn pressure_path(mut self, path: Vec<String>) -> Self {
        self.pressure_path = Some(path);
        self
    }
    pub fn loading_path(mut self, path: Vec<String>) -> Self {
        self.loading_path = Some(path);
        self
    }
    pub fn pressure_field(mut self, name: String) -> Self {
        self.pressure_field = Some(name);
        self
    }
    pub fn uptake_field(mut self, name: String) -> Self {
        self.uptake_field = Some(name);
        self
    }
    pub fn structure_source_dir(mut self, path: Option<PathBuf>) -> Self {
        self.structure_source_dir = path;
        self
    }
    pub fn structure_source_label(mut self, label: String) -> Self {
        self.structure_source_label = Some(label);
        self
    }
    pub fn structure_subset(mut self, subset: Option<String>) -> Self {
        self.structure_subset = subset;
        self
    }
    pub fn charge_tool(mut self, path: Option<PathBuf>) -> Self {
        self.charge_tool = path;
        self
    }
    pub fn geometry_executable(mut self, path: Option<PathBuf>) -> Self {
        self.geometry_executable = path;
        self
    }
    pub fn channel_radius(mut self, r: f64) -> Self {
        self.channel_radius = Some(r);
        self
    }
    pub fn probe_radius(mut self, r: f64) -> Self {
        self.probe_radius = Some(r);
        self
    }
    pub fn samples_per_atom(mut self, n: u32) -> Self {
        self.samples_per_atom = Some(n);
        self
    }

    pub fn build(self) -> Result<WorkflowConfig, ConfigError> {
        let defaults = SweepOptions::default();
        let config = WorkflowConfig {
            output_dir: self
                .output_dir
                .ok_or(ConfigError::MissingParameter("output_dir"))?,
            sweep: SweepOptions {
                range_parameter: self.range_parameter.unwrap_or(defaults.range_parameter),
                count_field: self.count_field.unwrap_or(defaults.count_field),
            },
            engine: EngineSettings {
                executable: self.engine_executable,
                report_dir: self
                    .report_dir
                    .unwrap_or_else(|| PathBuf::from("Output").join("System_0")),
                report_extension: self.report_extension.unwrap_or_else(|| "data".into()),
            },
            dispatch: DispatchSettings {
                max_workers: self.max_workers.unwrap_or_else(available_cores),
                backend: self.backend.unwrap_or_default(),
            },
            aggregation: AggregationSettings {
                curve_variables: self
                    .curve_variables
                    .unwrap_or_else(|| vec!["pressure".into()]),
                non_grouping: self
                    .non_grouping
                    .unwrap_or_else(|| vec!["npoints".into()]),
                key_policy: self.key_policy.unwrap_or_default(),
            },
            report: ReportSettings {
                pressure_path: self.pressure_path.unwrap_or_else(|| {
                    vec!["Simulation conditions".into(), "External Pressure".into()]
                }),
                loading_path: self.loading_path.unwrap_or_else(|| {
                    vec![
                        "Number of molecules".into(),
                        MOLECULE_PLACEHOLDER.into(),
                        "Average loading absolute [cm^3 (STP)/cm^3 framework]".into(),
                    ]
                }),
                pressure_field: self
                    .pressure_field
                    .unwrap_or_else(|| DEFAULT_PRESSURE_FIELD.into()),
                uptake_field: self
                    .uptake_field
                    .unwrap_or_else(|| DEFAULT_UPTAKE_FIELD.into()),
            },
            structures: StructureSettings {
                source_dir: self.structure_source_dir,
                source_label: self
                    .structure_source_label
                    .unwrap_or_else(|| "local".into()),
                subset: self.structure_subset,
            },
            charges: ChargeSettings {
                tool: self.charge_tool,
            },
            geometry: GeometrySettings {
                executable: self.geometry_executable,
                channel_radius: self.channel_radius.unwrap_or(1.2),
                probe_radius: self.probe_radius.unwrap_or(1.2),
                samples_per_atom: self.samples_per_atom.unwrap_or(2000),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn output_dir_is_required() {
        let err = WorkflowConfigBuilder::new().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("output_dir"));
    }

    #[test]
    fn defaults_follow_the_standard_layout() {
        let config = WorkflowConfigBuilder::new()
            .output_dir(PathBuf::from("/data/run"))
            .build()
            .unwrap();
        assert_eq!(config.simulations_dir(), PathBuf::from("/data/run/simulations"));
        assert_eq!(config.aggregation.curve_variables, ["pressure"]);
        assert_eq!(config.aggregation.non_grouping, ["npoints"]);
        assert_eq!(config.report.pressure_field, "Pressure(Pa)");
        assert!(config.dispatch.max_workers >= 1);
        assert_eq!(
            config.engine_executable().unwrap_err(),
            ConfigError::MissingParameter("engine.executable")
        );
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = WorkflowConfigBuilder::new()
            .output_dir(PathBuf::from("out"))
            .max_workers(0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "dispatch.max_workers",
                ..
            }
        ));
    }

    #[test]
    fn empty_curve_variables_are_rejected() {
        let err = WorkflowConfigBuilder::new()
            .output_dir(PathBuf::from("out"))
            .curve_variables(Vec::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn engine_must_exist_when_given() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("simulate");
        let err = WorkflowConfigBuilder::new()
            .output_dir(dir.path().to_path_buf())
            .engine_executable(Some(missing.clone()))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "engine.executable",
                ..
            }
        ));

        fs::write(&missing, "#!/bin/sh\n").unwrap();
        let config = WorkflowConfigBuilder::new()
            .output_dir(dir.path().to_path_buf())
            .engine_executable(Some(missing.clone()))
            .build()
            .unwrap();
        assert_eq!(config.engine_executable().unwrap(), missing.as_path());
    }
}
