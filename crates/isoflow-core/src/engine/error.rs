use super::config::ConfigError;
use crate::core::io::cif::CifError;
use crate::core::io::document::DocumentError;
use crate::core::io::ledger::LedgerError;
use crate::core::models::keys::JobKey;
use crate::core::sweep::SweepError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed sweep specification at '{field}': {reason}")]
    MalformedSpec { field: String, reason: String },

    #[error("Default field '{name}' collides with a swept parameter of the same name")]
    KeyCollision { name: String },

    #[error("Index {path:?} is corrupt at line {line}: {reason}")]
    IndexCorrupt {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("Index {path:?} has columns [{}] but the record has fields [{}]", .found.join(", "), .expected.join(", "))]
    IndexHeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("No structure file for '{structure}' in {location:?}")]
    MissingStructure { structure: String, location: PathBuf },

    #[error("Structure '{structure}' matches {} files: {candidates:?}", .candidates.len())]
    AmbiguousStructure {
        structure: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Output anomaly in job {job_key}: {reason}")]
    JobOutputAnomaly { job_key: JobKey, reason: String },

    #[error("Document {document:?} is missing the required '{section}' section")]
    SchemaMismatch {
        document: PathBuf,
        section: &'static str,
    },

    #[error("Invalid structure file {path:?}: {source}")]
    Cif {
        path: PathBuf,
        #[source]
        source: CifError,
    },

    #[error("Invalid result document {path:?}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("External tool '{tool}' failed: {reason}")]
    Collaborator { tool: String, reason: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn document(path: impl Into<PathBuf>, source: DocumentError) -> Self {
        let path = path.into();
        match source {
            DocumentError::MissingSection { section } => Self::SchemaMismatch {
                document: path,
                section,
            },
            DocumentError::Io(source) => Self::Io { path, source },
            other => Self::Document {
                path,
                source: other,
            },
        }
    }
}

impl From<SweepError> for EngineError {
    fn from(err: SweepError) -> Self {
        match err {
            SweepError::MalformedSpec { field, reason } => Self::MalformedSpec { field, reason },
            SweepError::KeyCollision { name } => Self::KeyCollision { name },
            SweepError::Io { path, source } => Self::Io { path, source },
            SweepError::Parse { path, reason } => Self::MalformedSpec {
                field: path.display().to_string(),
                reason,
            },
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Io { path, source } => Self::Io { path, source },
            LedgerError::Csv { path, source } => Self::IndexCorrupt {
                line: source.position().map(|p| p.line()).unwrap_or(0),
                reason: source.to_string(),
                path,
            },
            LedgerError::Corrupt {
                path,
                line,
                expected,
                found,
            } => Self::IndexCorrupt {
                path,
                line,
                reason: format!("expected {} fields, found {}", expected, found),
            },
            LedgerError::HeaderMismatch {
                path,
                expected,
                found,
            } => Self::IndexHeaderMismatch {
                path,
                expected,
                found,
            },
        }
    }
}
