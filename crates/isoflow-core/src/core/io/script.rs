use crate::core::models::charge::ChargeMethod;
use crate::core::models::keys::JobKey;
use crate::core::models::record::ParameterRecord;
use crate::core::models::value::ParamValue;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ScriptError {
    #[error("required field '{field}' is missing")]
    MissingField { field: &'static str },
    #[error("field '{field}' must be {expected}, found {found}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// Typed view of a parameter record as consumed by the simulation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub structure: String,
    pub molecule_name: String,
    pub temperature: f64,
    pub pressure: f64,
    pub charge_method: ChargeMethod,
    pub forcefield: String,
    pub cycles: u64,
    pub init_cycles: u64,
    pub print_every: u64,
    pub grid_use: bool,
    pub grid_spacing: f64,
    pub cutoff: f64,
    pub unit_cells: [i64; 3],
}

impl SimulationSettings {
    pub const DEFAULT_FORCEFIELD: &'static str = "GenericMOFs";
    pub const DEFAULT_CYCLES: u64 = 10_000;
    pub const DEFAULT_INIT_CYCLES: u64 = 20_000;
    pub const DEFAULT_PRINT_EVERY: u64 = 1_000;
    pub const DEFAULT_GRID_SPACING: f64 = 0.1;
    pub const DEFAULT_CUTOFF: f64 = 12.0;

    pub fn from_record(record: &ParameterRecord) -> Result<Self, ScriptError> {
        Ok(Self {
            structure: required_text(record, "structure")?,
            molecule_name: required_text(record, "molecule_name")?,
            temperature: required_number(record, "temperature")?,
            pressure: required_number(record, "pressure")?,
            charge_method: match record.get("charge_method") {
                None | Some(ParamValue::Null) => ChargeMethod::None,
                Some(ParamValue::Text(s)) => {
                    s.parse().map_err(|_| ScriptError::InvalidField {
                        field: "charge_method",
                        expected: "one of None, EQeq, Qeq, PACMOF",
                        found: s.clone(),
                    })?
                }
                Some(other) => return Err(invalid("charge_method", "a method name", other)),
            },
            forcefield: optional_text(record, "forcefield")?
                .unwrap_or_else(|| Self::DEFAULT_FORCEFIELD.to_string()),
            cycles: optional_count(record, "cycles")?.unwrap_or(Self::DEFAULT_CYCLES),
            init_cycles: optional_count(record, "init_cycles")?
                .unwrap_or(Self::DEFAULT_INIT_CYCLES),
            print_every: optional_count(record, "print_every")?
                .unwrap_or(Self::DEFAULT_PRINT_EVERY),
            grid_use: match record.get("grid_use") {
                None | Some(ParamValue::Null) => false,
                Some(ParamValue::Bool(b)) => *b,
                Some(ParamValue::Text(s)) if s.eq_ignore_ascii_case("yes") => true,
                Some(ParamValue::Text(s)) if s.eq_ignore_ascii_case("no") => false,
                Some(other) => return Err(invalid("grid_use", "yes/no or a boolean", other)),
            },
            grid_spacing: optional_number(record, "grid_spacing")?
                .unwrap_or(Self::DEFAULT_GRID_SPACING),
            cutoff: optional_number(record, "cutoff")?.unwrap_or(Self::DEFAULT_CUTOFF),
            unit_cells: match record.get("unit_cells") {
                None | Some(ParamValue::Null) => [1, 1, 1],
                Some(ParamValue::Triple(t)) if t.iter().all(|&n| n >= 1) => *t,
                Some(other) => {
                    return Err(invalid("unit_cells", "three positive integers", other));
                }
            },
        })
    }

    /// Renders the engine input file for a framework named `framework`.
    pub fn render_input(&self, framework: &str) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let [a, b, c] = self.unit_cells;
        let mut out = String::new();
        let _ = writeln!(out, "SimulationType                MonteCarlo");
        let _ = writeln!(out, "NumberOfCycles                {}", self.cycles);
        let _ = writeln!(out, "NumberOfInitializationCycles  {}", self.init_cycles);
        let _ = writeln!(out, "PrintEvery                    {}", self.print_every);
        let _ = writeln!(out);
        let _ = writeln!(out, "Forcefield                    {}", self.forcefield);
        let _ = writeln!(out, "CutOffVDW                     {}", self.cutoff);
        let _ = writeln!(
            out,
            "ChargeMethod                  {}",
            if self.charge_method.uses_framework_charges() { "Ewald" } else { "None" }
        );
        let _ = writeln!(
            out,
            "UseChargesFromCIFFile         {}",
            yes_no(self.charge_method.uses_framework_charges())
        );
        if self.grid_use {
            let _ = writeln!(out, "UseTabularGrid                yes");
            let _ = writeln!(out, "SpacingVDWGrid                {}", self.grid_spacing);
            let _ = writeln!(out, "NumberOfGrids                 1");
            let _ = writeln!(out, "GridTypes                     {}", self.molecule_name);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Framework 0");
        let _ = writeln!(out, "FrameworkName                 {}", framework);
        let _ = writeln!(out, "UnitCells                     {} {} {}", a, b, c);
        let _ = writeln!(out, "ExternalTemperature           {}", self.temperature);
        let _ = writeln!(out, "ExternalPressure              {}", self.pressure);
        let _ = writeln!(out);
        let _ = writeln!(out, "Component 0 MoleculeName             {}", self.molecule_name);
        let _ = writeln!(out, "            MoleculeDefinition       ExampleDefinitions");
        let _ = writeln!(out, "            TranslationProbability   0.5");
        let _ = writeln!(out, "            ReinsertionProbability   0.5");
        let _ = writeln!(out, "            SwapProbability          1.0");
        let _ = writeln!(out, "            CreateNumberOfMolecules  0");
        out
    }
}

/// Per-job launcher: runs the engine on `simulation.input` from the job directory.
pub fn render_run_script(engine: &Path) -> String {
    format!(
        "#!/bin/sh\ncd \"$(dirname \"$0\")\" || exit 1\nexec \"{}\" simulation.input\n",
        engine.display()
    )
}

/// Aggregate launcher: runs every job launcher with at most `workers` at a time
/// and returns once all of them have exited.
pub fn render_job_script(job_keys: &[JobKey], workers: usize) -> String {
    let mut out = String::from("#!/bin/sh\ncd \"$(dirname \"$0\")\" || exit 1\n");
    let _ = writeln!(
        out,
        "xargs -P {} -I {{}} sh -c 'sh \"$1/run\" > \"$1/run.log\" 2>&1' _ {{}} <<'JOBS'",
        workers.max(1)
    );
    for key in job_keys {
        let _ = writeln!(out, "{}", key);
    }
    out.push_str("JOBS\n");
    out
}

fn invalid(field: &'static str, expected: &'static str, found: &ParamValue) -> ScriptError {
    ScriptError::InvalidField {
        field,
        expected,
        found: format!("{} '{}'", found.type_tag(), found),
    }
}

fn required_text(record: &ParameterRecord, field: &'static str) -> Result<String, ScriptError> {
    optional_text(record, field)?.ok_or(ScriptError::MissingField { field })
}

fn optional_text(record: &ParameterRecord, field: &'static str) -> Result<Option<String>, ScriptError> {
    match record.get(field) {
        None | Some(ParamValue::Null) => Ok(None),
        Some(ParamValue::Text(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(field, "text", other)),
    }
}

fn required_number(record: &ParameterRecord, field: &'static str) -> Result<f64, ScriptError> {
    optional_number(record, field)?.ok_or(ScriptError::MissingField { field })
}

fn optional_number(record: &ParameterRecord, field: &'static str) -> Result<Option<f64>, ScriptError> {
    match record.get(field) {
        None | Some(ParamValue::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(field, "a number", value)),
    }
}

fn optional_count(record: &ParameterRecord, field: &'static str) -> Result<Option<u64>, ScriptError> {
    match record.get(field) {
        None | Some(ParamValue::Null) => Ok(None),
        Some(ParamValue::Int(n)) if *n >= 0 => Ok(Some(*n as u64)),
        Some(other) => Err(invalid(field, "a non-negative integer", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ParameterRecord {
        [
            ("structure", ParamValue::from("MIL-47")),
            ("molecule_name", ParamValue::from("CO2")),
            ("temperature", ParamValue::Int(298)),
            ("pressure", ParamValue::Float(1e5)),
            ("charge_method", ParamValue::from("EQeq")),
            ("grid_use", ParamValue::from("yes")),
            ("cycles", ParamValue::Int(500)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn fills_defaults_for_optional_fields() {
        let settings = SimulationSettings::from_record(&record()).unwrap();
        assert_eq!(settings.charge_method, ChargeMethod::Eqeq);
        assert!(settings.grid_use);
        assert_eq!(settings.cycles, 500);
        assert_eq!(settings.init_cycles, SimulationSettings::DEFAULT_INIT_CYCLES);
        assert_eq!(settings.forcefield, "GenericMOFs");
        assert_eq!(settings.unit_cells, [1, 1, 1]);
    }

    #[test]
    fn missing_required_field_is_named() {
        let mut r = record();
        r.insert("molecule_name", ParamValue::Null);
        assert_eq!(
            SimulationSettings::from_record(&r).unwrap_err(),
            ScriptError::MissingField {
                field: "molecule_name"
            }
        );
    }

    #[test]
    fn wrong_type_is_reported_with_the_value() {
        let mut r = record();
        r.insert("temperature", ParamValue::from("hot"));
        let err = SimulationSettings::from_record(&r).unwrap_err();
        assert!(err.to_string().contains("temperature"));
        assert!(err.to_string().contains("hot"));
    }

    #[test]
    fn input_carries_conditions_and_cells() {
        let mut r = record();
        r.insert("unit_cells", ParamValue::Triple([4, 2, 2]));
        let text = SimulationSettings::from_record(&r)
            .unwrap()
            .render_input("MIL-47_EQeq");
        assert!(text.contains("FrameworkName                 MIL-47_EQeq\n"));
        assert!(text.contains("UnitCells                     4 2 2\n"));
        assert!(text.contains("ExternalPressure              100000\n"));
        assert!(text.contains("UseChargesFromCIFFile         yes\n"));
        assert!(text.contains("GridTypes                     CO2\n"));
    }

    #[test]
    fn job_script_lists_every_job_and_bounds_parallelism() {
        let keys: Vec<JobKey> = ["sim00000001", "sim00000002"]
            .iter()
            .map(|k| k.parse().unwrap())
            .collect();
        let script = render_job_script(&keys, 4);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("xargs -P 4 -I {} sh -c 'sh \"$1/run\" > \"$1/run.log\" 2>&1' _ {}"));
        assert!(script.contains("\nsim00000001\nsim00000002\nJOBS\n"));
    }
}
