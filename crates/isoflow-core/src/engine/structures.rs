use super::error::EngineError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// One retrieved framework structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureBlob {
    pub name: String,
    pub cif: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(Vec<StructureBlob>),
    NotFound,
}

/// A database or directory that can be searched for framework structures.
pub trait StructureSource: Send + Sync {
    /// Short name appended to every file retrieved from this source.
    fn label(&self) -> &str;

    fn fetch(&self, identifier: &str) -> Result<FetchOutcome, EngineError>;
}

/// Serves structures from a directory of CIF files.
///
/// An identifier resolves to `<identifier>.cif` when that file exists, and to
/// every file whose stem contains it otherwise.
#[derive(Debug, Clone)]
pub struct LocalCifDirectory {
    dir: PathBuf,
    label: String,
}

impl LocalCifDirectory {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
        }
    }
}

impl StructureSource for LocalCifDirectory {
    fn label(&self) -> &str {
        &self.label
    }

    fn fetch(&self, identifier: &str) -> Result<FetchOutcome, EngineError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| EngineError::io(&self.dir, e))?;
        let mut matches: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_cif(path))
            .filter(|path| stem(path).is_some_and(|s| s.contains(identifier)))
            .collect();
        if matches.iter().any(|path| stem(path) == Some(identifier)) {
            matches.retain(|path| stem(path) == Some(identifier));
        }
        matches.sort();
        if matches.is_empty() {
            return Ok(FetchOutcome::NotFound);
        }

        let blobs = matches
            .iter()
            .map(|path| {
                let cif = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
                Ok(StructureBlob {
                    name: stem(path).unwrap_or_default().to_string(),
                    cif,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(FetchOutcome::Found(blobs))
    }
}

/// Retrieves every identifier from `source` into `dest` as
/// `<name>_<label>.cif`. Unknown identifiers are logged and skipped; it is an
/// error only when nothing at all was retrieved.
#[instrument(skip_all, name = "collect_structures")]
pub fn collect_structures<S: AsRef<str>>(
    source: &dyn StructureSource,
    identifiers: &[S],
    dest: &Path,
) -> Result<Vec<PathBuf>, EngineError> {
    fs::create_dir_all(dest).map_err(|e| EngineError::io(dest, e))?;
    let label = file_label(source.label());

    let mut written = Vec::new();
    for identifier in identifiers {
        let identifier = identifier.as_ref();
        match source.fetch(identifier)? {
            FetchOutcome::NotFound => {
                warn!("No structure matching '{}' in source '{}'", identifier, source.label());
            }
            FetchOutcome::Found(blobs) => {
                for blob in blobs {
                    let path = dest.join(format!("{}_{}.cif", blob.name, label));
                    fs::write(&path, &blob.cif).map_err(|e| EngineError::io(&path, e))?;
                    debug!("Retrieved '{}' into {:?}", blob.name, path);
                    written.push(path);
                }
            }
        }
    }

    if written.is_empty() {
        return Err(EngineError::MissingStructure {
            structure: identifiers
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
            location: dest.to_path_buf(),
        });
    }
    info!(structures = written.len(), "Structures retrieved.");
    Ok(written)
}

/// Lowercase, with spaces and underscores turned into dashes, so the label is
/// always the last `_`-separated part of a collected file's stem.
fn file_label(label: &str) -> String {
    label.trim().to_lowercase().replace([' ', '_'], "-")
}

pub(crate) fn is_cif(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("cif"))
}

pub(crate) fn stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Every CIF file directly inside `dir`, sorted by name. A missing directory
/// has no files.
pub fn list_cif_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_cif(path))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn source_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("MIL-47.cif"), "data_MIL-47\n").unwrap();
        fs::write(dir.path().join("MIL-47V.cif"), "data_MIL-47V\n").unwrap();
        fs::write(dir.path().join("UiO-66.cif"), "data_UiO-66\n").unwrap();
        fs::write(dir.path().join("MIL-47.txt"), "not a structure").unwrap();
        dir
    }

    #[test]
    fn exact_name_wins_over_substring_matches() {
        let src = source_dir();
        let source = LocalCifDirectory::new(src.path(), "local");
        match source.fetch("MIL-47").unwrap() {
            FetchOutcome::Found(blobs) => {
                let names: Vec<&str> = blobs.iter().map(|b| b.name.as_str()).collect();
                assert_eq!(names, ["MIL-47"]);
            }
            FetchOutcome::NotFound => panic!("expected a match"),
        }
        match source.fetch("MIL").unwrap() {
            FetchOutcome::Found(blobs) => {
                let names: Vec<&str> = blobs.iter().map(|b| b.name.as_str()).collect();
                assert_eq!(names, ["MIL-47", "MIL-47V"]);
            }
            FetchOutcome::NotFound => panic!("expected substring matches"),
        }
        assert_eq!(source.fetch("ZIF-8").unwrap(), FetchOutcome::NotFound);
    }

    #[test]
    fn labels_never_carry_underscores() {
        assert_eq!(file_label(" CoRE MOF "), "core-mof");
        assert_eq!(file_label("my_db"), "my-db");
    }

    #[test]
    fn collect_writes_labelled_files_and_skips_unknown_identifiers() {
        let src = source_dir();
        let dest = tempdir().unwrap();
        let source = LocalCifDirectory::new(src.path(), "CoRE MOF");
        let written = collect_structures(&source, &["UiO-66", "ZIF-8"], dest.path()).unwrap();
        assert_eq!(written, [dest.path().join("UiO-66_core-mof.cif")]);
        assert_eq!(
            fs::read_to_string(&written[0]).unwrap(),
            "data_UiO-66\n"
        );
    }

    #[test]
    fn nothing_retrieved_is_a_missing_structure() {
        let src = source_dir();
        let dest = tempdir().unwrap();
        let source = LocalCifDirectory::new(src.path(), "local");
        let err = collect_structures(&source, &["ZIF-8"], dest.path()).unwrap_err();
        assert!(matches!(err, EngineError::MissingStructure { ref structure, .. } if structure == "ZIF-8"));
    }

    #[test]
    fn list_ignores_other_extensions() {
        let src = source_dir();
        assert_eq!(list_cif_files(src.path()).len(), 3);
        assert!(list_cif_files(&src.path().join("absent")).is_empty());
    }
}
