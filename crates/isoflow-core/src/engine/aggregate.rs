//! Isotherm reconstruction: partitions job records by every parameter except
//! the swept curve variables, assigns each partition a group key, and writes
//! the groups as a CSV table and as a nested JSON document.

use super::error::EngineError;
use crate::core::io::document::DocumentError;
use crate::core::io::ledger::CsvLedger;
use crate::core::io::traits::JsonDocument;
use crate::core::models::keys::{GroupKey, JobKey};
use crate::core::models::record::{JobRecord, ParameterRecord};
use crate::core::models::value::ParamValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub const GROUP_KEY_COLUMN: &str = "group_key";
pub const MEMBERS_COLUMN: &str = "members";
pub const MEMBER_SEPARATOR: char = ';';
pub const ISOTHERM_INDEX_NAME: &str = "index.csv";
pub const ISOTHERM_DOCUMENT_NAME: &str = "isotherms.json";

/// How group keys are minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupKeyPolicy {
    /// A fresh random key per group on every aggregation run.
    #[default]
    Random,
    /// Derived from a SHA-256 digest of the grouping tuple; stable across runs.
    ContentHash,
}

impl FromStr for GroupKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "content-hash" | "content" => Ok(Self::ContentHash),
            other => Err(format!(
                "unknown group key policy '{}' (expected 'random' or 'content-hash')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsothermGroup {
    pub group_key: GroupKey,
    /// The grouping tuple, as named fields.
    pub metadata: ParameterRecord,
    /// Every job in the partition, in input order.
    pub members: Vec<JobKey>,
    /// Points of the members that produced a value, ascending in `x`.
    pub curve: Vec<CurvePoint>,
}

/// Maps one job to a curve point, or `None` when the job has no value.
pub trait ValueExtractor {
    fn extract(&self, job: &JobRecord) -> Option<(f64, f64)>;
}

impl<F> ValueExtractor for F
where
    F: Fn(&JobRecord) -> Option<(f64, f64)>,
{
    fn extract(&self, job: &JobRecord) -> Option<(f64, f64)> {
        self(job)
    }
}

/// Reads `x` and `y` from named fields, looking in parameters then results.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    pub x_field: String,
    pub y_field: String,
}

impl FieldExtractor {
    pub fn new(x_field: impl Into<String>, y_field: impl Into<String>) -> Self {
        Self {
            x_field: x_field.into(),
            y_field: y_field.into(),
        }
    }
}

impl ValueExtractor for FieldExtractor {
    fn extract(&self, job: &JobRecord) -> Option<(f64, f64)> {
        let x = job.field(&self.x_field)?.as_f64()?;
        let y = job.field(&self.y_field)?.as_f64()?;
        Some((x, y))
    }
}

/// Partitions `records` into isotherm groups.
///
/// The grouping fields are the union of all parameter names (first-seen
/// order) minus `curve_variables` and `non_grouping`; a field missing from a
/// record groups as `Null`. Groups appear in the order their first member
/// appears, members keep input order, and each group gets exactly one key.
pub fn group_and_extract(
    records: &[JobRecord],
    curve_variables: &[String],
    non_grouping: &[String],
    policy: GroupKeyPolicy,
    extractor: &dyn ValueExtractor,
) -> Vec<IsothermGroup> {
    let excluded: HashSet<&str> = curve_variables
        .iter()
        .chain(non_grouping)
        .map(String::as_str)
        .collect();
    let mut fields: Vec<&str> = Vec::new();
    for record in records {
        for name in record.parameters.names() {
            if !excluded.contains(name) && !fields.contains(&name) {
                fields.push(name);
            }
        }
    }

    let mut slots: HashMap<Vec<ParamValue>, usize> = HashMap::new();
    let mut groups: Vec<IsothermGroup> = Vec::new();
    let mut used: HashSet<GroupKey> = HashSet::new();

    for record in records {
        let tuple: Vec<ParamValue> = fields
            .iter()
            .map(|f| record.parameters.get(f).cloned().unwrap_or(ParamValue::Null))
            .collect();
        let slot = match slots.get(&tuple) {
            Some(&slot) => slot,
            None => {
                let metadata: ParameterRecord = fields
                    .iter()
                    .map(|f| f.to_string())
                    .zip(tuple.iter().cloned())
                    .collect();
                let group_key = mint_key(policy, &metadata, &used);
                used.insert(group_key.clone());
                groups.push(IsothermGroup {
                    group_key,
                    metadata,
                    members: Vec::new(),
                    curve: Vec::new(),
                });
                slots.insert(tuple, groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[slot];
        group.members.push(record.job_key.clone());
        if let Some((x, y)) = extractor.extract(record) {
            group.curve.push(CurvePoint { x, y });
        }
    }

    for group in &mut groups {
        group.curve.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    info!(
        records = records.len(),
        groups = groups.len(),
        "Grouped job records into isotherms."
    );
    groups
}

fn mint_key(policy: GroupKeyPolicy, metadata: &ParameterRecord, used: &HashSet<GroupKey>) -> GroupKey {
    match policy {
        GroupKeyPolicy::Random => loop {
            let key = GroupKey::generate();
            if !used.contains(&key) {
                return key;
            }
        },
        GroupKeyPolicy::ContentHash => {
            let canonical = canonical_tuple(metadata);
            let mut salt = 0u32;
            loop {
                let mut hasher = Sha256::new();
                hasher.update(canonical.as_bytes());
                if salt > 0 {
                    hasher.update(salt.to_le_bytes());
                }
                let key = GroupKey::from_digest(&hasher.finalize());
                if !used.contains(&key) {
                    return key;
                }
                salt += 1;
            }
        }
    }
}

/// Unambiguous text form of a grouping tuple: names, type tags and cells
/// separated by ASCII unit and record separators.
fn canonical_tuple(metadata: &ParameterRecord) -> String {
    let mut out = String::new();
    for (name, value) in metadata.iter() {
        out.push_str(name);
        out.push('\u{1f}');
        out.push_str(value.type_tag());
        out.push(':');
        out.push_str(&value.to_cell());
        out.push('\u{1e}');
    }
    out
}

/// Flat representation: an appendable index of groups plus one two-column
/// curve file per group.
#[derive(Debug, Clone)]
pub struct IsothermTable {
    dir: PathBuf,
    x_name: String,
    y_name: String,
}

impl IsothermTable {
    pub fn new(dir: impl Into<PathBuf>, x_name: impl Into<String>, y_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            x_name: x_name.into(),
            y_name: y_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(ISOTHERM_INDEX_NAME)
    }

    pub fn curve_path(&self, key: &GroupKey) -> PathBuf {
        self.dir.join(format!("{}.csv", key))
    }

    /// Aligns freshly built groups with the groups already stored.
    ///
    /// A fresh group whose grouping tuple is already in the index takes the
    /// stored key and keeps the stored members it does not list itself. A
    /// fresh key that names an unrelated stored group is minted again.
    pub fn reconcile(
        &self,
        mut groups: Vec<IsothermGroup>,
        policy: GroupKeyPolicy,
    ) -> Result<Vec<IsothermGroup>, EngineError> {
        let stored = self.load()?;
        if stored.is_empty() {
            return Ok(groups);
        }
        let by_tuple: HashMap<&ParameterRecord, &IsothermGroup> =
            stored.iter().map(|g| (&g.metadata, g)).collect();
        let mut used: HashSet<GroupKey> = stored.iter().map(|g| g.group_key.clone()).collect();

        for group in &mut groups {
            match by_tuple.get(&group.metadata) {
                Some(previous) => {
                    group.group_key = previous.group_key.clone();
                    let mut members = previous.members.clone();
                    for key in group.members.drain(..) {
                        if !members.contains(&key) {
                            members.push(key);
                        }
                    }
                    group.members = members;
                }
                None if used.contains(&group.group_key) => {
                    let key = mint_key(policy, &group.metadata, &used);
                    debug!("Group key {} is taken; using {}", group.group_key, key);
                    group.group_key = key;
                    used.insert(group.group_key.clone());
                }
                None => {
                    used.insert(group.group_key.clone());
                }
            }
        }
        Ok(groups)
    }

    /// Stores `groups` in the index and writes their curve files.
    ///
    /// Stored groups with the same key or grouping tuple are replaced in place,
    /// other stored groups are kept, and new groups go at the end. The index is
    /// rewritten as a whole, so each group is listed exactly once.
    pub fn write(&self, groups: &[IsothermGroup]) -> Result<(), EngineError> {
        let Some(first) = groups.first() else {
            return Ok(());
        };
        fs::create_dir_all(&self.dir).map_err(|e| EngineError::io(&self.dir, e))?;

        let names: Vec<String> = first.metadata.names().map(str::to_string).collect();
        let stored = self.load()?;
        if let Some(previous) = stored.first() {
            let found: Vec<String> = previous.metadata.names().map(str::to_string).collect();
            if found != names {
                return Err(EngineError::IndexHeaderMismatch {
                    path: self.index_path(),
                    expected: names,
                    found,
                });
            }
        }

        let by_key: HashMap<&GroupKey, usize> =
            groups.iter().enumerate().map(|(i, g)| (&g.group_key, i)).collect();
        let by_tuple: HashMap<&ParameterRecord, usize> =
            groups.iter().enumerate().map(|(i, g)| (&g.metadata, i)).collect();
        let mut placed = vec![false; groups.len()];
        let mut table: Vec<&IsothermGroup> = Vec::with_capacity(stored.len() + groups.len());
        for previous in &stored {
            let fresh = by_key
                .get(&previous.group_key)
                .or_else(|| by_tuple.get(&previous.metadata));
            match fresh {
                Some(&i) => {
                    if groups[i].group_key != previous.group_key {
                        self.remove_curve(&previous.group_key);
                    }
                    if !placed[i] {
                        placed[i] = true;
                        table.push(&groups[i]);
                    }
                }
                None => table.push(previous),
            }
        }
        table.extend(
            groups
                .iter()
                .zip(&placed)
                .filter(|(_, done)| !**done)
                .map(|(group, _)| group),
        );

        let mut header = names;
        header.push(GROUP_KEY_COLUMN.to_string());
        header.push(MEMBERS_COLUMN.to_string());
        let rows: Vec<Vec<String>> = table
            .iter()
            .map(|group| {
                let mut row: Vec<String> =
                    group.metadata.iter().map(|(_, v)| v.to_cell()).collect();
                row.push(group.group_key.to_string());
                row.push(
                    group
                        .members
                        .iter()
                        .map(JobKey::as_str)
                        .collect::<Vec<_>>()
                        .join(&MEMBER_SEPARATOR.to_string()),
                );
                row
            })
            .collect();
        CsvLedger::new(self.index_path()).rewrite(&header, &rows)?;

        for group in groups {
            self.write_curve(group)?;
        }
        info!(
            groups = groups.len(),
            stored = rows.len(),
            "Wrote isotherm table to {:?}",
            self.dir
        );
        Ok(())
    }

    fn write_curve(&self, group: &IsothermGroup) -> Result<(), EngineError> {
        let path = self.curve_path(&group.group_key);
        let csv_err = |e: csv::Error| EngineError::io(&path, e.into());
        let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
        writer
            .write_record([&self.x_name, &self.y_name])
            .map_err(csv_err)?;
        for point in &group.curve {
            writer
                .write_record([format!("{:?}", point.x), format!("{:?}", point.y)])
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|e| EngineError::io(&path, e))?;
        debug!("Wrote curve {:?} ({} points)", path, group.curve.len());
        Ok(())
    }

    fn remove_curve(&self, key: &GroupKey) {
        let path = self.curve_path(key);
        if let Err(e) = fs::remove_file(&path) {
            debug!("Could not remove superseded curve {:?}: {}", path, e);
        }
    }

    /// Reads every group recorded in the index. Curves stay in their own
    /// files and are left empty here.
    pub fn load(&self) -> Result<Vec<IsothermGroup>, EngineError> {
        let ledger = CsvLedger::new(self.index_path());
        let contents = ledger.read()?;
        let corrupt = |line: usize, reason: String| EngineError::IndexCorrupt {
            path: ledger.path().to_path_buf(),
            line: line as u64,
            reason,
        };
        let n = contents.header.len();
        if n < 2
            || contents.header[n - 2] != GROUP_KEY_COLUMN
            || contents.header[n - 1] != MEMBERS_COLUMN
        {
            if contents.header.is_empty() {
                return Ok(Vec::new());
            }
            return Err(corrupt(1, "header must end with group_key,members".into()));
        }

        let mut groups = Vec::with_capacity(contents.rows.len());
        for (i, row) in contents.rows.iter().enumerate() {
            let line = i + 2;
            let group_key: GroupKey = row[n - 2]
                .parse()
                .map_err(|e| corrupt(line, format!("{}", e)))?;
            let members = row[n - 1]
                .split(MEMBER_SEPARATOR)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<JobKey>().map_err(|e| corrupt(line, format!("{}", e))))
                .collect::<Result<Vec<_>, _>>()?;
            let metadata: ParameterRecord = contents.header[..n - 2]
                .iter()
                .zip(row)
                .map(|(name, cell)| (name.clone(), ParamValue::from_cell(cell)))
                .collect();
            groups.push(IsothermGroup {
                group_key,
                metadata,
                members,
                curve: Vec::new(),
            });
        }
        Ok(groups)
    }
}

/// Nested representation: `{"isotherms": [...]}` with one object per group
/// holding its metadata, parallel curve arrays, key and members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsothermDocument {
    pub isotherms: Vec<Map<String, Value>>,
}

impl IsothermDocument {
    pub fn from_groups(groups: &[IsothermGroup], x_name: &str, y_name: &str) -> Self {
        let isotherms = groups
            .iter()
            .map(|group| {
                let mut entry = Map::new();
                for (name, value) in group.metadata.iter() {
                    entry.insert(name.to_string(), value.to_json());
                }
                entry.insert(
                    x_name.to_string(),
                    Value::from(group.curve.iter().map(|p| p.x).collect::<Vec<_>>()),
                );
                entry.insert(
                    y_name.to_string(),
                    Value::from(group.curve.iter().map(|p| p.y).collect::<Vec<_>>()),
                );
                entry.insert(GROUP_KEY_COLUMN.into(), Value::from(group.group_key.as_str()));
                entry.insert(
                    MEMBERS_COLUMN.into(),
                    Value::from(
                        group
                            .members
                            .iter()
                            .map(|k| k.as_str())
                            .collect::<Vec<_>>(),
                    ),
                );
                entry
            })
            .collect();
        Self { isotherms }
    }

    pub fn len(&self) -> usize {
        self.isotherms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.isotherms.is_empty()
    }
}

impl JsonDocument for IsothermDocument {
    type Error = DocumentError;

    fn read_from(reader: &mut impl BufRead) -> Result<Self, Self::Error> {
        let mut value: Value = serde_json::from_reader(reader)?;
        match value.get_mut("isotherms").map(Value::take) {
            Some(Value::Array(items)) => Ok(Self {
                isotherms: items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => Ok(map),
                        _ => Err(DocumentError::InvalidSection {
                            section: "isotherms",
                            reason: "every entry must be an object".into(),
                        }),
                    })
                    .collect::<Result<_, _>>()?,
            }),
            Some(_) => Err(DocumentError::InvalidSection {
                section: "isotherms",
                reason: "expected a list".into(),
            }),
            None => Err(DocumentError::MissingSection {
                section: "isotherms",
            }),
        }
    }

    fn write_to(&self, writer: &mut impl Write) -> Result<(), Self::Error> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
