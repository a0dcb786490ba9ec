use super::keys::{JobKey, RunKey};
use super::value::ParamValue;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One fully resolved parameter combination, with field names in expansion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParameterRecord {
    fields: Vec<(String, ParamValue)>,
}

impl ParameterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`. An existing field keeps its position and its old
    /// value is returned.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        let name = name.into();
        if let Some((_, slot)) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            return Some(std::mem::replace(slot, value));
        }
        self.fields.push((name, value));
        None
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, ParamValue)> for ParameterRecord {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for ParameterRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = ParameterRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut record = ParameterRecord::new();
                while let Some((name, value)) = access.next_entry::<String, ParamValue>()? {
                    record.insert(name, value);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// A registered job: its parameters, its key, and whatever results have been
/// extracted for it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_key: JobKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_key: Option<RunKey>,
    pub parameters: ParameterRecord,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, ParamValue>,
    #[serde(skip)]
    pub work_dir: PathBuf,
}

impl JobRecord {
    pub fn new(job_key: JobKey, parameters: ParameterRecord, work_dir: PathBuf) -> Self {
        Self {
            job_key,
            run_key: None,
            parameters,
            results: BTreeMap::new(),
            work_dir,
        }
    }

    pub fn result_f64(&self, field: &str) -> Option<f64> {
        self.results.get(field).and_then(ParamValue::as_f64)
    }

    /// Looks a field up in the parameters first, then in the results.
    pub fn field(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name).or_else(|| self.results.get(name))
    }
}
