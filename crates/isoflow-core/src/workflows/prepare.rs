use crate::core::io::cif;
use crate::core::io::script::SimulationSettings;
use crate::core::models::charge::ChargeMethod;
use crate::core::models::keys::JobKey;
use crate::core::models::record::{JobRecord, ParameterRecord};
use crate::core::models::value::ParamValue;
use crate::core::sweep::{self, SweepSpec};
use crate::engine::charges::{self, ExternalChargeTool};
use crate::engine::config::WorkflowConfig;
use crate::engine::dispatch::Dispatcher;
use crate::engine::error::EngineError;
use crate::engine::index::{JobIndexStore, Registration};
use crate::engine::pool::RUN_SCRIPT_NAME;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::structures::{self, LocalCifDirectory};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Sweep specifications recorded by every `prepare`, in order.
pub const INPUTS_FILE_NAME: &str = "inputs.json";
pub const UNIT_CELLS_FIELD: &str = "unit_cells";
const STRUCTURE_FIELD: &str = "structure";

#[derive(Debug, Clone, Default)]
pub struct PrepareResult {
    /// Jobs registered by this call.
    pub registered: Vec<JobKey>,
    /// Jobs that were already indexed with identical parameters.
    pub reused: Vec<JobKey>,
    /// Records dropped by the structure subset filter.
    pub filtered: usize,
}

impl PrepareResult {
    pub fn job_keys(&self) -> impl Iterator<Item = &JobKey> {
        self.registered.iter().chain(&self.reused)
    }
}

/// Expands `spec`, makes the structures available, and registers and
/// materializes one job per record.
///
/// All records are validated and resolved to a structure file before the
/// index is touched, so a bad sweep leaves no partial registrations.
#[instrument(skip_all, name = "prepare_workflow")]
pub fn run(
    spec: &SweepSpec,
    config: &WorkflowConfig,
    reporter: &ProgressReporter,
) -> Result<PrepareResult, EngineError> {
    // === Phase 1: Expansion ===
    reporter.report(Progress::PhaseStart {
        name: "Expanding Sweep",
    });
    let records = sweep::expand(spec, &config.sweep)?;
    info!(records = records.len(), "Sweep expanded.");
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Structures and charges ===
    reporter.report(Progress::PhaseStart {
        name: "Preparing Structures",
    });
    let cif_dir = config.cif_dir();
    if let Some(source_dir) = &config.structures.source_dir {
        let source = LocalCifDirectory::new(source_dir, &config.structures.source_label);
        structures::collect_structures(&source, &spec.distinct_text(STRUCTURE_FIELD), &cif_dir)?;
    }
    let methods = charge_methods(&records)?;
    if methods.iter().any(|m| m.uses_framework_charges()) {
        match &config.charges.tool {
            Some(tool) => {
                charges::assign_all(&ExternalChargeTool::new(tool), &cif_dir, &methods)?;
            }
            None => warn!("No charge tool configured; charged structures must already exist."),
        }
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Resolution ===
    reporter.report(Progress::PhaseStart {
        name: "Resolving Jobs",
    });
    let mut result = PrepareResult::default();
    let resolved = resolve_records(records, &cif_dir, config.structures.subset.as_deref(), &mut result)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Registration and materialization ===
    reporter.report(Progress::PhaseStart {
        name: "Materializing Jobs",
    });
    let mut store = JobIndexStore::open(&config.simulations_dir())?;
    let dispatcher = Dispatcher::new(config);
    reporter.report(Progress::TaskStart {
        total: resolved.len() as u64,
    });
    for job in resolved {
        let registration = store.register(&job.record)?;
        let key = registration.key().clone();
        let work_dir = store.job_dir(&key);
        if registration.is_new() || !work_dir.join(RUN_SCRIPT_NAME).is_file() {
            let record = JobRecord::new(key.clone(), job.record, work_dir);
            dispatcher.materialize(&record, &job.settings, &job.structure_file)?;
        }
        match registration {
            Registration::New(key) => result.registered.push(key),
            Registration::Existing(key) => result.reused.push(key),
        }
        reporter.increment();
    }
    reporter.report(Progress::TaskFinish);
    save_input(spec, &config.simulations_dir())?;
    reporter.report(Progress::PhaseFinish);

    info!(
        registered = result.registered.len(),
        reused = result.reused.len(),
        filtered = result.filtered,
        "Preparation complete."
    );
    Ok(result)
}

struct ResolvedJob {
    record: ParameterRecord,
    settings: SimulationSettings,
    structure_file: PathBuf,
}

fn resolve_records(
    records: Vec<ParameterRecord>,
    cif_dir: &Path,
    subset: Option<&str>,
    result: &mut PrepareResult,
) -> Result<Vec<ResolvedJob>, EngineError> {
    let mut files: HashMap<(String, ChargeMethod), (PathBuf, [i64; 3])> = HashMap::new();
    let mut resolved = Vec::with_capacity(records.len());

    for (i, mut record) in records.into_iter().enumerate() {
        let settings = SimulationSettings::from_record(&record).map_err(|e| malformed(i, &e))?;
        let slot = (settings.structure.clone(), settings.charge_method);
        if !files.contains_key(&slot) {
            let path = charges::select_structure_file(cif_dir, &slot.0, slot.1)?;
            let text = fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
            let lengths = cif::cell_lengths(&text).map_err(|source| EngineError::Cif {
                path: path.clone(),
                source,
            })?;
            let cells = cif::minimal_unit_cells(&lengths, settings.cutoff);
            debug!("{:?} needs {:?} unit cells", path, cells);
            files.insert(slot.clone(), (path, cells));
        }
        let Some((path, cells)) = files.get(&slot) else {
            continue;
        };

        if let Some(subset) = subset {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if !name.contains(subset) {
                result.filtered += 1;
                continue;
            }
        }

        if !record.contains(UNIT_CELLS_FIELD) {
            record.insert(UNIT_CELLS_FIELD, ParamValue::Triple(*cells));
        }
        let settings = SimulationSettings::from_record(&record).map_err(|e| malformed(i, &e))?;
        resolved.push(ResolvedJob {
            record,
            settings,
            structure_file: path.clone(),
        });
    }
    Ok(resolved)
}

fn malformed(index: usize, err: &impl std::fmt::Display) -> EngineError {
    EngineError::MalformedSpec {
        field: format!("record {}", index + 1),
        reason: err.to_string(),
    }
}

/// Distinct charge methods named by the records, in first-seen order.
fn charge_methods(records: &[ParameterRecord]) -> Result<Vec<ChargeMethod>, EngineError> {
    let mut methods = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let method = match record.get("charge_method") {
            Some(ParamValue::Text(s)) => s.parse().map_err(|e| malformed(i, &e))?,
            _ => ChargeMethod::None,
        };
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    Ok(methods)
}

/// Appends `spec` to the inputs file unless an identical spec is already there.
fn save_input(spec: &SweepSpec, root: &Path) -> Result<(), EngineError> {
    let path = root.join(INPUTS_FILE_NAME);
    let mut inputs = read_inputs(root)?;
    let value = spec.to_value();
    if inputs.contains(&value) {
        return Ok(());
    }
    inputs.push(value);
    let text = serde_json::to_string_pretty(&inputs)
        .map_err(|e| EngineError::Internal(format!("cannot serialize sweep inputs: {}", e)))?;
    fs::write(&path, text + "\n").map_err(|e| EngineError::io(&path, e))
}

/// Every sweep specification prepared under `root`.
pub fn read_inputs(root: &Path) -> Result<Vec<Value>, EngineError> {
    let path = root.join(INPUTS_FILE_NAME);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
    match serde_json::from_str(&text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(EngineError::IndexCorrupt {
            path,
            line: 1,
            reason: "expected a list of sweep specifications".into(),
        }),
        Err(e) => Err(EngineError::IndexCorrupt {
            line: e.line() as u64,
            path,
            reason: e.to_string(),
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::config::WorkflowConfigBuilder;
    use crate::engine::dispatch::INPUT_FILE_NAME;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    const CIF: &str = "data_MIL-47\n_cell_length_a 6.8179\n_cell_length_b 16.1430\n_cell_length_c 13.9390\n";

    fn setup(subset: Option<&str>) -> (tempfile::TempDir, WorkflowConfig) {
        let dir = tempdir().unwrap();
        let engine = dir.path().join("engine");
        fs::write(&engine, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&engine, fs::Permissions::from_mode(0o755)).unwrap();
        let source = dir.path().join("db");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("MIL-47.cif"), CIF).unwrap();
        let config = WorkflowConfigBuilder::new()
            .output_dir(dir.path().join("out"))
            .engine_executable(Some(engine))
            .structure_source_dir(Some(source))
            .structure_subset(subset.map(str::to_string))
            .build()
            .unwrap();
        (dir, config)
    }

    fn spec() -> SweepSpec {
        SweepSpec::from_value(json!({
            "parameters": {
                "structure": "MIL-47",
                "molecule_name": ["CO2", "N2"],
                "temperature": 298,
                "pressure": [1000, 100000],
                "npoints": 3
            },
            "defaults": {"cycles": 100}
        }))
        .unwrap()
    }

    #[test]
    fn registers_and_materializes_every_record() {
        let (_dir, config) = setup(None);
        let result = run(&spec(), &config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.registered.len(), 6);
        assert!(result.reused.is_empty());

        let store = JobIndexStore::open(&config.simulations_dir()).unwrap();
        let jobs = store.load(None).unwrap();
        assert_eq!(jobs.len(), 6);
        assert_eq!(
            jobs[0].parameters.get(UNIT_CELLS_FIELD),
            Some(&ParamValue::Triple([4, 2, 2]))
        );
        for job in &jobs {
            assert!(job.work_dir.join(INPUT_FILE_NAME).is_file());
            assert!(job.work_dir.join("MIL-47_local.cif").is_file());
        }
        assert_eq!(read_inputs(&config.simulations_dir()).unwrap().len(), 1);
    }

    #[test]
    fn preparing_twice_reuses_every_key() {
        let (_dir, config) = setup(None);
        let first = run(&spec(), &config, &ProgressReporter::new()).unwrap();
        let second = run(&spec(), &config, &ProgressReporter::new()).unwrap();
        assert!(second.registered.is_empty());
        assert_eq!(second.reused, first.registered);
        assert_eq!(read_inputs(&config.simulations_dir()).unwrap().len(), 1);
    }

    #[test]
    fn similarly_named_structure_in_the_source_is_not_picked_up() {
        let (dir, config) = setup(None);
        fs::write(dir.path().join("db").join("MIL-47V.cif"), CIF).unwrap();
        let result = run(&spec(), &config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.registered.len(), 6);
        let store = JobIndexStore::open(&config.simulations_dir()).unwrap();
        for job in store.load(None).unwrap() {
            assert!(job.work_dir.join("MIL-47_local.cif").is_file());
        }
    }

    #[test]
    fn subset_filter_drops_non_matching_structures() {
        let (_dir, config) = setup(Some("coremof"));
        let result = run(&spec(), &config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.filtered, 6);
        assert_eq!(result.job_keys().count(), 0);
    }

    #[test]
    fn bad_record_registers_nothing() {
        let (_dir, config) = setup(None);
        let bad = SweepSpec::from_value(json!({
            "parameters": {"structure": "MIL-47", "pressure": [1, 2], "npoints": 2},
            "defaults": {}
        }))
        .unwrap();
        let err = run(&bad, &config, &ProgressReporter::new()).unwrap_err();
        assert!(matches!(err, EngineError::MalformedSpec { .. }));
        assert!(err.to_string().contains("molecule_name"));
        let store = JobIndexStore::open(&config.simulations_dir()).unwrap();
        assert!(store.is_empty());
    }
}
