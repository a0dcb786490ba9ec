use super::error::EngineError;
use crate::core::io::ledger::CsvLedger;
use crate::core::models::keys::JobKey;
use crate::core::models::record::{JobRecord, ParameterRecord};
use crate::core::models::value::ParamValue;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const INDEX_FILE_NAME: &str = "index.csv";
pub const JOB_KEY_COLUMN: &str = "job_key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    New(JobKey),
    /// The record was already indexed under this key; nothing was written.
    Existing(JobKey),
}

impl Registration {
    pub fn key(&self) -> &JobKey {
        match self {
            Self::New(key) | Self::Existing(key) => key,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New(_))
    }
}

/// Append-only ledger of every job registered under one simulations root.
///
/// The store keeps an in-memory view of the rows on disk so that registering a
/// record that is already indexed returns its existing key instead of minting a
/// new one. Only the coordinating process writes to the index.
#[derive(Debug)]
pub struct JobIndexStore {
    root: PathBuf,
    ledger: CsvLedger,
    header: Option<Vec<String>>,
    known: HashMap<Vec<String>, JobKey>,
    keys: HashSet<JobKey>,
}

impl JobIndexStore {
    /// Opens (or creates) the index under `root`, truncating a trailing partial
    /// row left by an interrupted append.
    pub fn open(root: &Path) -> Result<Self, EngineError> {
        fs::create_dir_all(root).map_err(|e| EngineError::io(root, e))?;
        let ledger = CsvLedger::new(root.join(INDEX_FILE_NAME));
        if ledger.repair_tail()? {
            warn!(
                "Recovered job index {:?} after an interrupted write",
                ledger.path()
            );
        }
        let contents = ledger.read()?;

        let mut store = Self {
            root: root.to_path_buf(),
            ledger,
            header: None,
            known: HashMap::new(),
            keys: HashSet::new(),
        };
        if contents.header.is_empty() {
            return Ok(store);
        }

        let key_col = store.key_column(&contents.header)?;
        for (i, mut row) in contents.rows.into_iter().enumerate() {
            let key = store.parse_key(&row[key_col], i)?;
            row.remove(key_col);
            store.keys.insert(key.clone());
            store.known.insert(row, key);
        }
        store.header = Some(contents.header);
        info!(
            jobs = store.keys.len(),
            "Opened job index {:?}",
            store.ledger.path()
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> &Path {
        self.ledger.path()
    }

    pub fn job_dir(&self, key: &JobKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.keys.contains(key)
    }

    /// Registers one record, creating its working directory and appending one
    /// row to the index. An identical record already in the index keeps its key.
    pub fn register(&mut self, record: &ParameterRecord) -> Result<Registration, EngineError> {
        let mut header: Vec<String> = record.names().map(str::to_string).collect();
        header.push(JOB_KEY_COLUMN.to_string());
        if record.contains(JOB_KEY_COLUMN) {
            return Err(EngineError::KeyCollision {
                name: JOB_KEY_COLUMN.to_string(),
            });
        }
        if let Some(existing) = &self.header {
            if *existing != header {
                return Err(EngineError::IndexHeaderMismatch {
                    path: self.ledger.path().to_path_buf(),
                    expected: header,
                    found: existing.clone(),
                });
            }
        }

        let cells: Vec<String> = record.iter().map(|(_, v)| v.to_cell()).collect();
        if let Some(key) = self.known.get(&cells) {
            fs::create_dir_all(self.job_dir(key)).map_err(|e| EngineError::io(self.job_dir(key), e))?;
            debug!("Record already indexed as {}", key);
            return Ok(Registration::Existing(key.clone()));
        }

        let key = self.fresh_key();
        let dir = self.job_dir(&key);
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(&dir, e))?;

        let mut row = cells.clone();
        row.push(key.to_string());
        self.ledger.append(&header, &[row])?;

        debug!("Registered job {} in {:?}", key, dir);
        self.header.get_or_insert(header);
        self.keys.insert(key.clone());
        self.known.insert(cells, key.clone());
        Ok(Registration::New(key))
    }

    /// Reads the whole index from disk, optionally keeping only `filter`'s keys.
    pub fn load(&self, filter: Option<&HashSet<JobKey>>) -> Result<Vec<JobRecord>, EngineError> {
        let contents = self.ledger.read()?;
        if contents.header.is_empty() {
            return Ok(Vec::new());
        }
        let key_col = self.key_column(&contents.header)?;
        let mut jobs = Vec::with_capacity(contents.rows.len());
        for (i, row) in contents.rows.iter().enumerate() {
            let key = self.parse_key(&row[key_col], i)?;
            if filter.is_some_and(|keys| !keys.contains(&key)) {
                continue;
            }
            let parameters: ParameterRecord = contents
                .header
                .iter()
                .zip(row)
                .enumerate()
                .filter(|(col, _)| *col != key_col)
                .map(|(_, (name, cell))| (name.clone(), ParamValue::from_cell(cell)))
                .collect();
            let work_dir = self.job_dir(&key);
            jobs.push(JobRecord::new(key, parameters, work_dir));
        }
        Ok(jobs)
    }

    fn key_column(&self, header: &[String]) -> Result<usize, EngineError> {
        header
            .iter()
            .position(|h| h == JOB_KEY_COLUMN)
            .ok_or_else(|| EngineError::IndexCorrupt {
                path: self.ledger.path().to_path_buf(),
                line: 1,
                reason: format!("header has no '{}' column", JOB_KEY_COLUMN),
            })
    }

    fn parse_key(&self, cell: &str, row: usize) -> Result<JobKey, EngineError> {
        cell.parse().map_err(|e| EngineError::IndexCorrupt {
            path: self.ledger.path().to_path_buf(),
            line: row as u64 + 2,
            reason: format!("{}", e),
        })
    }

    fn fresh_key(&self) -> JobKey {
        loop {
            let key = JobKey::generate();
            if !self.keys.contains(&key) && !self.job_dir(&key).exists() {
                return key;
            }
            warn!("Job key {} already in use; generating another", key);
        }
    }
}
