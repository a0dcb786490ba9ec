use super::SweepError;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Options controlling how the range parameter is recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    /// Parameter that may be given as bounds instead of an explicit list.
    pub range_parameter: String,
    /// Scalar parameter holding the number of points when the range is given as `[min, max]`.
    pub count_field: String,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            range_parameter: "pressure".to_string(),
            count_field: "npoints".to_string(),
        }
    }
}

/// A declarative sweep: varied `parameters` and fixed `defaults`, both kept in
/// the insertion order of the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    pub parameters: Map<String, Value>,
    pub defaults: Map<String, Value>,
}

impl SweepSpec {
    pub fn from_value(value: Value) -> Result<Self, SweepError> {
        let Value::Object(mut root) = value else {
            return Err(SweepError::malformed("<root>", "expected a JSON object"));
        };
        let parameters = take_section(&mut root, "parameters")?;
        let defaults = take_section(&mut root, "defaults")?;
        Ok(Self {
            parameters,
            defaults,
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self, SweepError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| SweepError::malformed("<root>", e.to_string()))?;
        Self::from_value(value)
    }

    /// Reads a sweep from disk. Files ending in `.toml` are parsed as TOML,
    /// everything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self, SweepError> {
        debug!("Reading sweep specification from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| SweepError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let value: Value = if is_toml {
            toml::from_str(&content).map_err(|e| SweepError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| SweepError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };
        Self::from_value(value)
    }

    /// The spec as it appears in the `input` section of a result document.
    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert("parameters".into(), Value::Object(self.parameters.clone()));
        root.insert("defaults".into(), Value::Object(self.defaults.clone()));
        Value::Object(root)
    }

    /// Distinct string values of a parameter, in first-seen order.
    pub fn distinct_text(&self, name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let values = match self.parameters.get(name).or_else(|| self.defaults.get(name)) {
            Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
            Some(other) => vec![other],
            None => Vec::new(),
        };
        for value in values {
            if let Some(s) = value.as_str() {
                if !seen.iter().any(|v: &String| v == s) {
                    seen.push(s.to_string());
                }
            }
        }
        seen
    }
}

fn take_section(root: &mut Map<String, Value>, name: &str) -> Result<Map<String, Value>, SweepError> {
    match root.remove(name) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(SweepError::malformed(name, "section must be an object")),
        None => Err(SweepError::malformed(name, "required section is missing")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_sections_are_malformed() {
        let err = SweepSpec::from_value(json!({"parameters": {}})).unwrap_err();
        assert!(matches!(err, SweepError::MalformedSpec { ref field, .. } if field == "defaults"));
        let err = SweepSpec::from_value(json!({"defaults": {}})).unwrap_err();
        assert!(matches!(err, SweepError::MalformedSpec { ref field, .. } if field == "parameters"));
    }

    #[test]
    fn json_preserves_insertion_order() {
        let spec = SweepSpec::from_json_str(
            r#"{"parameters": {"zeta": 1, "alpha": 2, "mu": 3}, "defaults": {}}"#,
        )
        .unwrap();
        let names: Vec<_> = spec.parameters.keys().cloned().collect();
        assert_eq!(names, ["zeta", "alpha", "mu"]);
    }

    #[test]
    fn reads_toml_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        fs::write(
            &path,
            r#"
            [parameters]
            structure = ["MIL-47", "IRMOF-1"]
            pressure = [10.0, 1000.0]
            npoints = 3

            [defaults]
            cycles = 100
            "#,
        )
        .unwrap();
        let spec = SweepSpec::from_path(&path).unwrap();
        assert_eq!(spec.parameters.len(), 3);
        assert_eq!(spec.defaults["cycles"], json!(100));
        assert_eq!(spec.distinct_text("structure"), ["MIL-47", "IRMOF-1"]);
    }

    #[test]
    fn to_value_echoes_both_sections() {
        let spec = SweepSpec::from_value(json!({
            "parameters": {"molecule_name": ["CO2"]},
            "defaults": {"cycles": 10}
        }))
        .unwrap();
        assert_eq!(
            spec.to_value(),
            json!({"parameters": {"molecule_name": ["CO2"]}, "defaults": {"cycles": 10}})
        );
    }
}
