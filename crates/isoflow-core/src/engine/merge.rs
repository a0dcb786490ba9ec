use super::error::EngineError;
use crate::core::io::document::ResultDocument;
use crate::core::io::traits::JsonDocument;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Concatenates the `input`, `metadata` and `results` sections of every
/// document, in argument order. Nothing is deduplicated.
pub fn merge(documents: impl IntoIterator<Item = ResultDocument>) -> ResultDocument {
    let mut merged = ResultDocument::default();
    for doc in documents {
        merged.input.extend(doc.input);
        merged.metadata.extend(doc.metadata);
        merged.results.extend(doc.results);
    }
    merged
}

/// Reads and validates every document before merging any of them, so a
/// malformed input leaves nothing half-merged.
#[instrument(skip_all, name = "merge_documents")]
pub fn merge_files<P: AsRef<Path>>(paths: &[P]) -> Result<ResultDocument, EngineError> {
    let documents = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let doc = ResultDocument::read_from_path(path)
                .map_err(|e| EngineError::document(path, e))?;
            debug!(
                results = doc.results.len(),
                "Read result document {:?}",
                path
            );
            Ok(doc)
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let merged = merge(documents);
    info!(
        documents = paths.len(),
        runs = merged.metadata.len(),
        results = merged.results.len(),
        "Merged result documents."
    );
    Ok(merged)
}

/// Writes `document` to `path`, creating parent directories.
pub fn write_document(document: &ResultDocument, path: &Path) -> Result<PathBuf, EngineError> {
    document
        .write_to_path(path)
        .map_err(|e| EngineError::document(path, e))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::fs;
    use tempfile::tempdir;

    fn document(run: &str, jobs: &[&str]) -> Value {
        json!({
            "input": {"parameters": {"molecule_name": "CO2"}, "defaults": {}},
            "metadata": {
                "run_key": run,
                "timestamp": "2024-05-01T12:00:00Z",
                "software": {"name": "isoflow", "version": "0.1.0"},
                "environment": {"os": "linux", "arch": "x86_64", "available_cores": 4}
            },
            "results": jobs.iter().map(|k| json!({
                "job_key": k,
                "run_key": run,
                "parameters": {"molecule_name": "CO2", "pressure": 10.0},
                "results": {"uptake": 1.5}
            })).collect::<Vec<_>>()
        })
    }

    fn write(dir: &Path, name: &str, value: &Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn section_lengths_are_sums_and_order_is_preserved() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.json", &document("run0000000a", &["sim00000001", "sim00000002"]));
        let b = write(dir.path(), "b.json", &document("run0000000b", &["sim00000003"]));

        let merged = merge_files(&[a, b]).unwrap();
        assert_eq!(merged.input.len(), 2);
        assert_eq!(merged.metadata.len(), 2);
        assert_eq!(merged.results.len(), 3);
        assert_eq!(merged.metadata[0].run_key.as_str(), "run0000000a");
        let keys: Vec<&str> = merged.results.iter().map(|r| r.job_key.as_str()).collect();
        assert_eq!(keys, ["sim00000001", "sim00000002", "sim00000003"]);
        assert_eq!(
            merged.results[2].run_key.as_ref().map(|k| k.as_str()),
            Some("run0000000b")
        );
    }

    #[test]
    fn merging_a_document_with_itself_duplicates_rows() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.json", &document("run0000000a", &["sim00000001"]));
        let merged = merge_files(&[&a, &a]).unwrap();
        assert_eq!(merged.results.len(), 2);
        assert_eq!(merged.results[0], merged.results[1]);
    }

    #[test]
    fn missing_section_names_the_document() {
        let dir = tempdir().unwrap();
        let good = write(dir.path(), "good.json", &document("run0000000a", &[]));
        let mut broken = document("run0000000b", &[]);
        broken.as_object_mut().unwrap().remove("metadata");
        let bad = write(dir.path(), "bad.json", &broken);

        match merge_files(&[good, bad.clone()]).unwrap_err() {
            EngineError::SchemaMismatch { document, section } => {
                assert_eq!(document, bad);
                assert_eq!(section, "metadata");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn merged_document_is_written_and_readable() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.json", &document("run0000000a", &["sim00000001"]));
        let merged = merge_files(&[a]).unwrap();
        let out = dir.path().join("nested/merged.json");
        write_document(&merged, &out).unwrap();
        assert_eq!(ResultDocument::read_from_path(&out).unwrap(), merged);
    }
}
