use super::error::EngineError;
use super::pool::run_logged;
use super::structures::{is_cif, list_cif_files, stem};
use crate::core::models::charge::ChargeMethod;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, instrument, warn};

/// Produces a charged copy of a framework structure.
pub trait ChargeAssigner: Send + Sync {
    fn name(&self) -> &str;

    /// Writes `<stem>_<tag>.cif` next to `cif` and returns its path.
    fn assign(&self, cif: &Path, method: ChargeMethod) -> Result<PathBuf, EngineError>;
}

/// Runs `<tool> <method> <cif>` in the structure's directory.
#[derive(Debug, Clone)]
pub struct ExternalChargeTool {
    executable: PathBuf,
}

impl ExternalChargeTool {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl ChargeAssigner for ExternalChargeTool {
    fn name(&self) -> &str {
        self.executable
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("charge-tool")
    }

    fn assign(&self, cif: &Path, method: ChargeMethod) -> Result<PathBuf, EngineError> {
        let Some(tag) = method.file_tag() else {
            return Ok(cif.to_path_buf());
        };
        let collaborator = |reason: String| EngineError::Collaborator {
            tool: self.name().to_string(),
            reason,
        };
        let dir = cif.parent().unwrap_or(Path::new("."));
        let base = stem(cif).ok_or_else(|| collaborator(format!("{:?} has no file stem", cif)))?;
        let expected = dir.join(format!("{}_{}.cif", base, tag));
        let log = dir.join(format!("{}_{}.log", base, tag));

        let status = run_logged(
            Command::new(&self.executable).arg(tag).arg(cif),
            dir,
            &log,
        )
        .map_err(|e| collaborator(e.to_string()))?;
        debug!("{} {} {:?} exited with {}", self.name(), tag, cif, status);

        remove_side_artifacts(dir, &format!("{}_{}", base, tag));
        if !expected.is_file() {
            return Err(collaborator(format!(
                "expected {:?} after assigning {} charges ({})",
                expected, tag, status
            )));
        }
        Ok(expected)
    }
}

/// Deletes every non-CIF file whose stem starts with `prefix`.
fn remove_side_artifacts(dir: &Path, prefix: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.filter_map(Result::ok).map(|e| e.path()) {
        if path.is_file()
            && !is_cif(&path)
            && stem(&path).is_some_and(|s| s.starts_with(prefix))
        {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Cannot remove charge artifact {:?}: {}", path, e);
            }
        }
    }
}

/// True for a structure produced by a charge assignment (`*_<tag>.cif`).
fn is_charged(path: &Path) -> bool {
    stem(path).is_some_and(|s| {
        ChargeMethod::ASSIGNED
            .iter()
            .filter_map(|m| m.file_tag())
            .any(|tag| s.ends_with(&format!("_{}", tag)))
    })
}

/// Whether `stem` is `<structure>` or `<structure>_<label>`.
fn names_structure(stem: &str, structure: &str) -> bool {
    match stem.strip_prefix(structure) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('_')
            .is_some_and(|label| !label.is_empty() && !label.contains('_')),
        None => false,
    }
}

/// Applies every charge method in `methods` to every uncharged structure in
/// `dir`. Structures already charged with a method are left alone.
#[instrument(skip_all, name = "assign_charges")]
pub fn assign_all(
    assigner: &dyn ChargeAssigner,
    dir: &Path,
    methods: &[ChargeMethod],
) -> Result<Vec<PathBuf>, EngineError> {
    let bases: Vec<PathBuf> = list_cif_files(dir)
        .into_iter()
        .filter(|p| !is_charged(p))
        .collect();
    let mut produced = Vec::new();
    for method in methods {
        let Some(tag) = method.file_tag() else {
            continue;
        };
        for base in &bases {
            let name = stem(base).unwrap_or_default();
            let target = dir.join(format!("{}_{}.cif", name, tag));
            if target.is_file() {
                debug!("{:?} already carries {} charges", base, tag);
                continue;
            }
            produced.push(assigner.assign(base, *method)?);
        }
    }
    info!(
        structures = bases.len(),
        produced = produced.len(),
        tool = assigner.name(),
        "Charge assignment finished."
    );
    Ok(produced)
}

/// Finds the one structure file in `dir` for `structure` under `method`.
///
/// Candidates are `<structure>.cif` or `<structure>_<label>.cif`, where the
/// label has no underscore. With `ChargeMethod::None` every charged variant is
/// excluded; otherwise only the `_<tag>` variant of that method is kept.
pub fn select_structure_file(
    dir: &Path,
    structure: &str,
    method: ChargeMethod,
) -> Result<PathBuf, EngineError> {
    let mut candidates: Vec<PathBuf> = list_cif_files(dir)
        .into_iter()
        .filter(|path| {
            let Some(name) = stem(path) else {
                return false;
            };
            let base = match method.file_tag() {
                None if is_charged(path) => return false,
                None => name,
                Some(tag) => match name.strip_suffix(&format!("_{}", tag)) {
                    Some(base) => base,
                    None => return false,
                },
            };
            names_structure(base, structure)
        })
        .collect();

    match candidates.len() {
        0 => Err(EngineError::MissingStructure {
            structure: match method.file_tag() {
                Some(tag) => format!("{} ({})", structure, tag),
                None => structure.to_string(),
            },
            location: dir.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => Err(EngineError::AmbiguousStructure {
            structure: structure.to_string(),
            candidates,
        }),
    }
}
