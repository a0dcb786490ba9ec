use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error on ledger {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error in ledger {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Ledger {path:?} is corrupt at line {line}: expected {expected} fields, found {found}")]
    Corrupt {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("Ledger {path:?} has header [{}] but rows with fields [{}] were appended", .found.join(", "), .expected.join(", "))]
    HeaderMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// The complete rows of a ledger file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerContents {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Whether the file ended in a row without a terminating newline.
    pub partial_tail: bool,
}

/// An append-only CSV file with a header row.
///
/// Rows are only ever added at the end, each batch through a single
/// `write_all` on a handle opened in append mode, so an interrupted write
/// leaves at most one trailing row without its newline. Such a row is
/// ignored by [`CsvLedger::read`] and removed by [`CsvLedger::repair_tail`].
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> LedgerError {
        LedgerError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    /// Reads every complete row. A missing file reads as an empty ledger.
    pub fn read(&self) -> Result<LedgerContents, LedgerError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LedgerContents::default()),
            Err(e) => return Err(self.io_err(e)),
        };
        let complete = complete_prefix(&bytes);
        let partial_tail = complete.len() < bytes.len();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(complete);
        let header: Vec<String> = reader
            .headers()
            .map_err(|e| self.csv_err(e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| self.csv_err(e))?;
            if record.len() != header.len() {
                return Err(LedgerError::Corrupt {
                    path: self.path.clone(),
                    line: record.position().map(|p| p.line()).unwrap_or(0),
                    expected: header.len(),
                    found: record.len(),
                });
            }
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(LedgerContents {
            header,
            rows,
            partial_tail,
        })
    }

    /// Truncates a trailing row that lacks its newline. Returns whether the
    /// file was changed.
    pub fn repair_tail(&self) -> Result<bool, LedgerError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.io_err(e)),
        };
        let keep = complete_prefix(&bytes).len();
        if keep == bytes.len() {
            return Ok(false);
        }
        warn!(
            "Ledger {:?} ends with an incomplete row ({} bytes); truncating it",
            self.path,
            bytes.len() - keep
        );
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.set_len(keep as u64).map_err(|e| self.io_err(e))?;
        Ok(true)
    }

    /// Appends `rows` under `header`. The header is written only when the file
    /// is new or empty; otherwise it must match the existing one.
    pub fn append(&self, header: &[String], rows: &[Vec<String>]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let is_empty = file.metadata().map_err(|e| self.io_err(e))?.len() == 0;

        if !is_empty {
            let existing = self.read_header()?;
            if existing != header {
                return Err(LedgerError::HeaderMismatch {
                    path: self.path.clone(),
                    expected: header.to_vec(),
                    found: existing,
                });
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if is_empty {
            writer.write_record(header).map_err(|e| self.csv_err(e))?;
        }
        for row in rows {
            writer.write_record(row).map_err(|e| self.csv_err(e))?;
        }
        let buffer = writer
            .into_inner()
            .map_err(|e| self.io_err(e.into_error()))?;

        file.write_all(&buffer).map_err(|e| self.io_err(e))?;
        file.flush().map_err(|e| self.io_err(e))
    }

    /// Replaces the whole file with `header` and `rows`.
    ///
    /// The new contents go to a sibling temporary file first and are renamed
    /// over the ledger, so readers see either the old or the new table.
    pub fn rewrite(&self, header: &[String], rows: &[Vec<String>]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(header).map_err(|e| self.csv_err(e))?;
        for row in rows {
            writer.write_record(row).map_err(|e| self.csv_err(e))?;
        }
        let buffer = writer
            .into_inner()
            .map_err(|e| self.io_err(e.into_error()))?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, &buffer).map_err(|e| self.io_err(e))?;
        fs::rename(&staging, &self.path).map_err(|e| self.io_err(e))
    }

    fn read_header(&self) -> Result<Vec<String>, LedgerError> {
        let file = File::open(&self.path).map_err(|e| self.io_err(e))?;
        let mut first = String::new();
        BufReader::new(file)
            .read_line(&mut first)
            .map_err(|e| self.io_err(e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(first.as_bytes());
        match reader.records().next() {
            Some(record) => Ok(record
                .map_err(|e| self.csv_err(e))?
                .iter()
                .map(str::to_string)
                .collect()),
            None => Ok(Vec::new()),
        }
    }
}

/// The longest prefix of `bytes` that ends with a newline.
fn complete_prefix(bytes: &[u8]) -> &[u8] {
    match bytes.iter().rposition(|&b| b == b'\n') {
        Some(pos) => &bytes[..=pos],
        None => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn header_is_written_once_and_rows_accumulate() {
        let dir = tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("nested").join("index.csv"));
        let header = strings(&["gas", "job_key"]);
        ledger.append(&header, &[strings(&["CO2", "sim00000001"])]).unwrap();
        ledger.append(&header, &[strings(&["N2", "sim00000002"])]).unwrap();

        let text = fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "gas,job_key\nCO2,sim00000001\nN2,sim00000002\n");

        let contents = ledger.read().unwrap();
        assert_eq!(contents.header, header);
        assert_eq!(contents.rows.len(), 2);
        assert!(!contents.partial_tail);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let contents = CsvLedger::new(dir.path().join("absent.csv")).read().unwrap();
        assert!(contents.header.is_empty());
        assert!(contents.rows.is_empty());
    }

    #[test]
    fn partial_tail_is_ignored_then_repaired() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.csv");
        fs::write(&path, "gas,job_key\nCO2,sim00000001\nN2,sim0000").unwrap();
        let ledger = CsvLedger::new(&path);

        let contents = ledger.read().unwrap();
        assert_eq!(contents.rows.len(), 1);
        assert!(contents.partial_tail);

        assert!(ledger.repair_tail().unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "gas,job_key\nCO2,sim00000001\n"
        );
        assert!(!ledger.repair_tail().unwrap());
    }

    #[test]
    fn short_row_is_reported_with_its_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.csv");
        fs::write(&path, "a,b,job_key\n1,2,sim00000001\n3,sim00000002\n").unwrap();
        let err = CsvLedger::new(&path).read().unwrap_err();
        match err {
            LedgerError::Corrupt {
                line,
                expected,
                found,
                ..
            } => {
                assert_eq!(line, 3);
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn appending_with_a_different_header_is_rejected() {
        let dir = tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("index.csv"));
        ledger
            .append(&strings(&["a", "job_key"]), &[strings(&["1", "sim00000001"])])
            .unwrap();
        let err = ledger
            .append(&strings(&["b", "job_key"]), &[strings(&["2", "sim00000002"])])
            .unwrap_err();
        assert!(matches!(err, LedgerError::HeaderMismatch { .. }));
        assert_eq!(ledger.read().unwrap().rows.len(), 1);
    }

    #[test]
    fn rewrite_replaces_rows_and_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("index.csv"));
        let header = strings(&["gas", "group_key"]);
        ledger
            .append(&header, &[strings(&["CO2", "iso00000001"]), strings(&["N2", "iso00000002"])])
            .unwrap();

        ledger
            .rewrite(&header, &[strings(&["CH4", "iso00000003"])])
            .unwrap();

        assert_eq!(
            fs::read_to_string(ledger.path()).unwrap(),
            "gas,group_key\nCH4,iso00000003\n"
        );
        assert!(!dir.path().join("index.csv.tmp").exists());
    }

    #[test]
    fn cells_with_commas_are_quoted() {
        let dir = tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("index.csv"));
        let header = strings(&["name", "job_key"]);
        ledger
            .append(&header, &[strings(&["a,b", "sim00000001"])])
            .unwrap();
        let contents = ledger.read().unwrap();
        assert_eq!(contents.rows[0][0], "a,b");
    }
}
