use phf::{Map, phf_map};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Partial-charge assignment applied to a framework before simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChargeMethod {
    #[default]
    None,
    Eqeq,
    Qeq,
    Pacmof,
}

static METHOD_NAMES: Map<&'static str, ChargeMethod> = phf_map! {
    "none" => ChargeMethod::None,
    "eqeq" => ChargeMethod::Eqeq,
    "qeq" => ChargeMethod::Qeq,
    "pacmof" => ChargeMethod::Pacmof,
};

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("unknown charge method '{0}' (expected one of: None, EQeq, Qeq, PACMOF)")]
pub struct UnknownChargeMethod(pub String);

impl ChargeMethod {
    pub const ASSIGNED: [ChargeMethod; 3] = [Self::Eqeq, Self::Qeq, Self::Pacmof];

    /// Tag appended to the CIF stem of a charged structure (`<stem>_<tag>.cif`).
    /// `None` has no tag because it uses the structure as retrieved.
    pub fn file_tag(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Eqeq => Some("EQeq"),
            Self::Qeq => Some("Qeq"),
            Self::Pacmof => Some("PACMOF"),
        }
    }

    pub fn uses_framework_charges(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for ChargeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_tag().unwrap_or("None"))
    }
}

impl FromStr for ChargeMethod {
    type Err = UnknownChargeMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        METHOD_NAMES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| UnknownChargeMethod(s.to_string()))
    }
}

impl TryFrom<String> for ChargeMethod {
    type Error = UnknownChargeMethod;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChargeMethod> for String {
    fn from(method: ChargeMethod) -> String {
        method.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("EQeq".parse::<ChargeMethod>().unwrap(), ChargeMethod::Eqeq);
        assert_eq!("none".parse::<ChargeMethod>().unwrap(), ChargeMethod::None);
        assert_eq!(" PACMOF ".parse::<ChargeMethod>().unwrap(), ChargeMethod::Pacmof);
        assert!("ddec".parse::<ChargeMethod>().is_err());
    }

    #[test]
    fn display_matches_file_tag() {
        for method in ChargeMethod::ASSIGNED {
            assert_eq!(Some(method.to_string().as_str()), method.file_tag());
        }
        assert_eq!(ChargeMethod::None.to_string(), "None");
    }
}
