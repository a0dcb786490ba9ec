use super::defaults::{CONFIG_FILE_NAME, DefaultsConfig};
use super::file::FileConfig;
use super::models::{AppConfig, CliOverrides};
use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};
use directories::ProjectDirs;
use isoflow::engine::aggregate::GroupKeyPolicy;
use isoflow::engine::config::WorkflowConfigBuilder;
use isoflow::engine::pool::PoolBackend;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

/// `isoflow.toml` in the platform configuration directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "isoflow", "isoflow").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Resolves the workflow configuration with the precedence
/// CLI flags > `--set` > configuration file > defaults.
pub fn build_config(args: &ConfigArgs, overrides: &CliOverrides) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let source = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|path| path.is_file()),
    };
    let file_config = match &source {
        Some(path) => {
            info!("Using configuration file {:?}", path);
            FileConfig::from_file(path)?
        }
        None => {
            debug!("No configuration file found, using defaults.");
            FileConfig::default()
        }
    };
    let file_config = apply_set_values(file_config, &args.set_values)?;

    let sweep = file_config.sweep.unwrap_or_default();
    let engine = file_config.engine.unwrap_or_default();
    let structures = file_config.structures.unwrap_or_default();
    let charges = file_config.charges.unwrap_or_default();
    let geometry = file_config.geometry.unwrap_or_default();
    let dispatch = file_config.dispatch.unwrap_or_default();
    let aggregation = file_config.aggregation.unwrap_or_default();
    let report = file_config.report.unwrap_or_default();

    let backend = PoolBackend::from_str(
        overrides
            .backend
            .as_deref()
            .or(dispatch.backend.as_deref())
            .unwrap_or(&defaults.backend),
    )
    .map_err(CliError::Config)?;
    let key_policy = GroupKeyPolicy::from_str(
        aggregation
            .key_policy
            .as_deref()
            .unwrap_or(&defaults.key_policy),
    )
    .map_err(CliError::Config)?;

    let mut builder = WorkflowConfigBuilder::new()
        .output_dir(
            args.output_dir
                .clone()
                .or(file_config.output_dir)
                .unwrap_or(defaults.output_dir),
        )
        .engine_executable(overrides.engine.clone().or(engine.executable))
        .report_dir(engine.report_dir.unwrap_or(defaults.report_dir))
        .report_extension(engine.report_extension.unwrap_or(defaults.report_extension))
        .backend(backend)
        .key_policy(key_policy)
        .structure_source_dir(overrides.structure_dir.clone().or(structures.source_dir))
        .structure_source_label(
            structures
                .source_label
                .unwrap_or(defaults.structure_source_label),
        )
        .structure_subset(overrides.structure_subset.clone().or(structures.subset))
        .charge_tool(charges.tool)
        .geometry_executable(
            overrides
                .geometry_executable
                .clone()
                .or(geometry.executable),
        )
        .channel_radius(geometry.channel_radius.unwrap_or(defaults.channel_radius))
        .probe_radius(geometry.probe_radius.unwrap_or(defaults.probe_radius))
        .samples_per_atom(
            geometry
                .samples_per_atom
                .unwrap_or(defaults.samples_per_atom),
        );

    if let Some(n) = overrides.max_workers.or(dispatch.max_workers) {
        builder = builder.max_workers(n);
    }
    if let Some(name) = sweep.range_parameter {
        builder = builder.range_parameter(name);
    }
    if let Some(name) = sweep.count_field {
        builder = builder.count_field(name);
    }
    if let Some(names) = aggregation.curve_variables {
        builder = builder.curve_variables(names);
    }
    if let Some(names) = aggregation.non_grouping {
        builder = builder.non_grouping(names);
    }
    if let Some(path) = report.pressure_path {
        builder = builder.pressure_path(path);
    }
    if let Some(path) = report.loading_path {
        builder = builder.loading_path(path);
    }
    if let Some(name) = report.pressure_field {
        builder = builder.pressure_field(name);
    }
    if let Some(name) = report.uptake_field {
        builder = builder.uptake_field(name);
    }

    let workflow = builder
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    debug!("Resolved workflow configuration: {:?}", workflow);

    Ok(AppConfig { source, workflow })
}

fn section<T: Default>(slot: &mut Option<T>) -> &mut T {
    slot.get_or_insert_with(Default::default)
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

/// Comma-separated list; key paths use the same form.
fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
            CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            ))
        })?;
        let (key, value) = (key.trim(), value.trim());

        match key {
            "output-dir" => config.output_dir = Some(value.into()),
            "sweep.range-parameter" => section(&mut config.sweep).range_parameter = Some(value.into()),
            "sweep.count-field" => section(&mut config.sweep).count_field = Some(value.into()),
            "engine.executable" => section(&mut config.engine).executable = Some(value.into()),
            "engine.report-dir" => section(&mut config.engine).report_dir = Some(value.into()),
            "engine.report-extension" => {
                section(&mut config.engine).report_extension = Some(value.into())
            }
            "structures.source-dir" => {
                section(&mut config.structures).source_dir = Some(value.into())
            }
            "structures.source-label" => {
                section(&mut config.structures).source_label = Some(value.into())
            }
            "structures.subset" => section(&mut config.structures).subset = Some(value.into()),
            "charges.tool" => section(&mut config.charges).tool = Some(value.into()),
            "geometry.executable" => section(&mut config.geometry).executable = Some(value.into()),
            "geometry.channel-radius" => {
                section(&mut config.geometry).channel_radius = Some(parse(key, value)?)
            }
            "geometry.probe-radius" => {
                section(&mut config.geometry).probe_radius = Some(parse(key, value)?)
            }
            "geometry.samples-per-atom" => {
                section(&mut config.geometry).samples_per_atom = Some(parse(key, value)?)
            }
            "dispatch.max-workers" => {
                section(&mut config.dispatch).max_workers = Some(parse(key, value)?)
            }
            "dispatch.backend" => section(&mut config.dispatch).backend = Some(value.into()),
            "aggregation.curve-variables" => {
                section(&mut config.aggregation).curve_variables = Some(list(value))
            }
            "aggregation.non-grouping" => {
                section(&mut config.aggregation).non_grouping = Some(list(value))
            }
            "aggregation.key-policy" => {
                section(&mut config.aggregation).key_policy = Some(value.into())
            }
            "report.pressure-path" => section(&mut config.report).pressure_path = Some(list(value)),
            "report.loading-path" => section(&mut config.report).loading_path = Some(list(value)),
            "report.pressure-field" => {
                section(&mut config.report).pressure_field = Some(value.into())
            }
            "report.uptake-field" => section(&mut config.report).uptake_field = Some(value.into()),
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
