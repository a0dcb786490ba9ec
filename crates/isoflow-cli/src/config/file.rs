use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileSweepConfig {
    #[serde(rename = "range-parameter")]
    pub range_parameter: Option<String>,
    #[serde(rename = "count-field")]
    pub count_field: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileEngineConfig {
    pub executable: Option<PathBuf>,
    #[serde(rename = "report-dir")]
    pub report_dir: Option<PathBuf>,
    #[serde(rename = "report-extension")]
    pub report_extension: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileStructuresConfig {
    #[serde(rename = "source-dir")]
    pub source_dir: Option<PathBuf>,
    #[serde(rename = "source-label")]
    pub source_label: Option<String>,
    pub subset: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileChargesConfig {
    pub tool: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileGeometryConfig {
    pub executable: Option<PathBuf>,
    #[serde(rename = "channel-radius")]
    pub channel_radius: Option<f64>,
    #[serde(rename = "probe-radius")]
    pub probe_radius: Option<f64>,
    #[serde(rename = "samples-per-atom")]
    pub samples_per_atom: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileDispatchConfig {
    #[serde(rename = "max-workers")]
    pub max_workers: Option<usize>,
    pub backend: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileAggregationConfig {
    #[serde(rename = "curve-variables")]
    pub curve_variables: Option<Vec<String>>,
    #[serde(rename = "non-grouping")]
    pub non_grouping: Option<Vec<String>>,
    #[serde(rename = "key-policy")]
    pub key_policy: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileReportConfig {
    #[serde(rename = "pressure-path")]
    pub pressure_path: Option<Vec<String>>,
    #[serde(rename = "loading-path")]
    pub loading_path: Option<Vec<String>>,
    #[serde(rename = "pressure-field")]
    pub pressure_field: Option<String>,
    #[serde(rename = "uptake-field")]
    pub uptake_field: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(rename = "output-dir")]
    pub output_dir: Option<PathBuf>,
    pub sweep: Option<FileSweepConfig>,
    pub engine: Option<FileEngineConfig>,
    pub structures: Option<FileStructuresConfig>,
    pub charges: Option<FileChargesConfig>,
    pub geometry: Option<FileGeometryConfig>,
    pub dispatch: Option<FileDispatchConfig>,
    pub aggregation: Option<FileAggregationConfig>,
    pub report: Option<FileReportConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }
}
