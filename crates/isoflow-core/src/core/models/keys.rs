//! Opaque identifiers for jobs, isotherm groups and workflow runs.
//!
//! Every key is a short literal tag followed by eight lowercase hex digits
//! (`sim1a2b3c4d`, `iso0f00ba44`, `run398c565d`). All key construction goes
//! through this module so the format is enforced in one place.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const TOKEN_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("invalid {kind} key '{value}': expected '{prefix}' followed by 8 lowercase hex digits")]
pub struct KeyParseError {
    pub kind: &'static str,
    pub prefix: &'static str,
    pub value: String,
}

fn is_valid_token(token: &str) -> bool {
    token.len() == TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

macro_rules! opaque_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Mints a new random key.
            pub fn generate() -> Self {
                Self::generate_with(&mut rand::thread_rng())
            }

            pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
                Self(format!("{}{:08x}", $prefix, rng.r#gen::<u32>()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = KeyParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.strip_prefix($prefix) {
                    Some(token) if is_valid_token(token) => Ok(Self(s.to_string())),
                    _ => Err(KeyParseError {
                        kind: $kind,
                        prefix: $prefix,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = KeyParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> String {
                key.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_key!(
    /// Identifies one job; also the name of its working directory.
    JobKey,
    "sim",
    "job"
);
opaque_key!(
    /// Identifies one isotherm group within an aggregation run.
    GroupKey,
    "iso",
    "group"
);
opaque_key!(
    /// Identifies one workflow run inside a result document.
    RunKey,
    "run",
    "run"
);

impl GroupKey {
    /// Builds a reproducible key from a digest of the grouping tuple.
    pub fn from_digest(digest: &[u8]) -> Self {
        let head = &digest[..digest.len().min(TOKEN_LEN / 2)];
        Self(format!("{}{:0<8}", Self::PREFIX, hex::encode(head)))
    }
}
