use super::traits::JsonDocument;
use crate::core::models::keys::RunKey;
use crate::core::models::record::JobRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Document is missing the required '{section}' section")]
    MissingSection { section: &'static str },
    #[error("Section '{section}' is malformed: {reason}")]
    InvalidSection {
        section: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub available_cores: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

/// Provenance of one workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_key: RunKey,
    #[serde(with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub software: SoftwareInfo,
    pub environment: EnvironmentInfo,
}

impl RunMetadata {
    /// Describes the current process and host.
    pub fn capture(run_key: RunKey, engine: Option<String>) -> Self {
        Self {
            run_key,
            timestamp: Utc::now(),
            software: SoftwareInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            environment: EnvironmentInfo {
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                available_cores: std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
                engine,
            },
        }
    }
}

mod rfc3339 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// The full structured output of one or more workflow runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultDocument {
    pub input: Vec<Value>,
    pub metadata: Vec<RunMetadata>,
    pub results: Vec<JobRecord>,
}

impl ResultDocument {
    /// Validates the three top-level sections and converts them to typed form.
    /// An `input` or `metadata` section holding a single object is read as a
    /// one-entry list.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let Value::Object(mut root) = value else {
            return Err(DocumentError::InvalidSection {
                section: "<root>",
                reason: "expected a JSON object".into(),
            });
        };
        let input = as_list(take(&mut root, "input")?);
        let metadata = as_list(take(&mut root, "metadata")?);
        let results = match take(&mut root, "results")? {
            Value::Array(items) => items,
            other => {
                return Err(DocumentError::InvalidSection {
                    section: "results",
                    reason: format!("expected a list, found {}", kind(&other)),
                });
            }
        };

        let metadata = metadata
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<RunMetadata>, _>>()
            .map_err(|e| DocumentError::InvalidSection {
                section: "metadata",
                reason: e.to_string(),
            })?;
        let results = results
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<JobRecord>, _>>()
            .map_err(|e| DocumentError::InvalidSection {
                section: "results",
                reason: e.to_string(),
            })?;
        Ok(Self {
            input,
            metadata,
            results,
        })
    }
}

impl JsonDocument for ResultDocument {
    type Error = DocumentError;

    fn read_from(reader: &mut impl BufRead) -> Result<Self, Self::Error> {
        let value: Value = serde_json::from_reader(reader)?;
        Self::from_value(value)
    }

    fn write_to(&self, writer: &mut impl Write) -> Result<(), Self::Error> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

fn take(root: &mut Map<String, Value>, section: &'static str) -> Result<Value, DocumentError> {
    root.remove(section)
        .ok_or(DocumentError::MissingSection { section })
}

fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
