//! Declarative sweep specifications and their expansion into concrete
//! parameter records.

mod expand;
mod spec;

pub use expand::expand;
pub use spec::{SweepOptions, SweepSpec};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Malformed sweep specification at '{field}': {reason}")]
    MalformedSpec { field: String, reason: String },

    #[error("Default field '{name}' collides with a swept parameter of the same name")]
    KeyCollision { name: String },

    #[error("Failed to read sweep specification {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse sweep specification {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl SweepError {
    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSpec {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
