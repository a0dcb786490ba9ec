use super::config::EngineSettings;
use super::error::EngineError;
use crate::core::models::keys::JobKey;
use globset::{Glob, GlobMatcher};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WARNING_MARKER: &str = "WARNING";
const ERROR_MARKER: &str = "ERROR";

/// What a job's working directory contained after the batch finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    NoOutput,
    MultiOutput(Vec<PathBuf>),
    Report {
        path: PathBuf,
        warnings: Vec<String>,
        errors: Vec<String>,
    },
}

/// Per-batch triage of job outputs. Anomalies are collected here instead of
/// failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSummary {
    pub root: PathBuf,
    pub outcomes: BTreeMap<JobKey, JobOutcome>,
}

impl OutputSummary {
    pub fn inspected(&self) -> usize {
        self.outcomes.len()
    }

    pub fn no_output(&self) -> Vec<&JobKey> {
        self.keys_where(|o| matches!(o, JobOutcome::NoOutput))
    }

    pub fn multi_output(&self) -> Vec<&JobKey> {
        self.keys_where(|o| matches!(o, JobOutcome::MultiOutput(_)))
    }

    pub fn warned(&self) -> Vec<&JobKey> {
        self.keys_where(|o| matches!(o, JobOutcome::Report { warnings, .. } if !warnings.is_empty()))
    }

    pub fn errored(&self) -> Vec<&JobKey> {
        self.keys_where(|o| matches!(o, JobOutcome::Report { errors, .. } if !errors.is_empty()))
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.values().all(|o| {
            matches!(o, JobOutcome::Report { warnings, errors, .. } if warnings.is_empty() && errors.is_empty())
        })
    }

    /// The single report of a job, unless the job had no report, several
    /// reports, or a report with error lines.
    pub fn usable_report(&self, key: &JobKey) -> Option<&Path> {
        match self.outcomes.get(key)? {
            JobOutcome::Report { path, errors, .. } if errors.is_empty() => Some(path),
            _ => None,
        }
    }

    /// One [`EngineError::JobOutputAnomaly`] per job that cannot contribute a result.
    pub fn anomalies(&self) -> Vec<EngineError> {
        self.outcomes
            .iter()
            .filter_map(|(key, outcome)| {
                let reason = match outcome {
                    JobOutcome::NoOutput => "no report was produced".to_string(),
                    JobOutcome::MultiOutput(paths) => {
                        format!("{} reports were produced", paths.len())
                    }
                    JobOutcome::Report { errors, .. } if !errors.is_empty() => {
                        format!("report contains {} error line(s)", errors.len())
                    }
                    JobOutcome::Report { .. } => return None,
                };
                Some(EngineError::JobOutputAnomaly {
                    job_key: key.clone(),
                    reason,
                })
            })
            .collect()
    }

    /// Human-readable summary: the four counts, the affected job keys, and with
    /// `verbose` the offending report lines.
    pub fn render(&self, verbose: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} job directories inspected in {}:",
            self.inspected(),
            self.root.display()
        );
        let rows = [
            ("No       outputs", self.no_output()),
            ("Multiple outputs", self.multi_output()),
            ("Warnings        ", self.warned()),
            ("Errors          ", self.errored()),
        ];
        for (label, keys) in &rows {
            let _ = writeln!(out, "{} found in {:5} directories.", label, keys.len());
            if !keys.is_empty() {
                let list: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
                let _ = writeln!(out, "    {}", list.join(" "));
            }
        }
        if verbose {
            for (key, outcome) in &self.outcomes {
                if let JobOutcome::Report {
                    warnings, errors, ..
                } = outcome
                {
                    for line in warnings.iter().chain(errors) {
                        let _ = writeln!(out, "{}: {}", key, line);
                    }
                }
            }
        }
        out
    }

    fn keys_where(&self, pred: impl Fn(&JobOutcome) -> bool) -> Vec<&JobKey> {
        self.outcomes
            .iter()
            .filter(|(_, o)| pred(o))
            .map(|(k, _)| k)
            .collect()
    }
}

/// Classifies the output of every listed job under `root`. Never fails: an
/// unreadable directory or report counts as a missing report.
pub fn inspect(root: &Path, job_keys: &[JobKey], engine: &EngineSettings) -> OutputSummary {
    let matcher = report_matcher(&engine.report_extension);
    let mut summary = OutputSummary {
        root: root.to_path_buf(),
        outcomes: BTreeMap::new(),
    };
    for key in job_keys {
        let dir = root.join(key.as_str()).join(&engine.report_dir);
        let mut reports = find_reports(&dir, matcher.as_ref());
        let outcome = match reports.len() {
            0 => JobOutcome::NoOutput,
            1 => {
                let path = reports.remove(0);
                match fs::read_to_string(&path) {
                    Ok(text) => JobOutcome::Report {
                        warnings: lines_with(&text, WARNING_MARKER),
                        errors: lines_with(&text, ERROR_MARKER),
                        path,
                    },
                    Err(e) => {
                        warn!("Cannot read report {:?} of job {}: {}", path, key, e);
                        JobOutcome::NoOutput
                    }
                }
            }
            _ => JobOutcome::MultiOutput(reports),
        };
        debug!("Job {}: {:?}", key, outcome);
        summary.outcomes.insert(key.clone(), outcome);
    }
    summary
}

fn report_matcher(extension: &str) -> Option<GlobMatcher> {
    match Glob::new(&format!("*.{}", extension)) {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            warn!("Invalid report extension '{}': {}", extension, e);
            None
        }
    }
}

fn find_reports(dir: &Path, matcher: Option<&GlobMatcher>) -> Vec<PathBuf> {
    let Some(matcher) = matcher else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut reports: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.file_name().is_some_and(|name| matcher.is_match(name)))
        .collect();
    reports.sort();
    reports
}

/// Distinct trimmed lines containing `marker`, in first-seen order.
fn lines_with(text: &str, marker: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for line in text.lines().filter(|l| l.contains(marker)) {
        let line = line.trim();
        if !seen.iter().any(|s| s == line) {
            seen.push(line.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::WorkflowConfigBuilder;
    use tempfile::tempdir;

    fn engine() -> EngineSettings {
        WorkflowConfigBuilder::new()
            .output_dir(PathBuf::from("unused"))
            .build()
            .unwrap()
            .engine
    }

    fn write_report(root: &Path, key: &str, name: &str, text: &str) {
        let dir = root.join(key).join("Output/System_0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), text).unwrap();
    }

    fn key(s: &str) -> JobKey {
        s.parse().unwrap()
    }

    #[test]
    fn classifies_all_four_anomaly_kinds() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sim00000001")).unwrap();
        write_report(root, "sim00000002", "a.data", "ok");
        write_report(root, "sim00000002", "b.data", "ok");
        write_report(root, "sim00000003", "out.data", "WARNING: drift\nWARNING: drift\n");
        write_report(root, "sim00000004", "out.data", "ERROR: blew up\n");
        write_report(root, "sim00000005", "out.data", "all good\n");
        write_report(root, "sim00000005", "notes.txt", "ignored");

        let keys: Vec<JobKey> = (1..=5).map(|i| key(&format!("sim0000000{}", i))).collect();
        let summary = inspect(root, &keys, &engine());

        assert_eq!(summary.inspected(), 5);
        assert_eq!(summary.no_output(), [&keys[0]]);
        assert_eq!(summary.multi_output(), [&keys[1]]);
        assert_eq!(summary.warned(), [&keys[2]]);
        assert_eq!(summary.errored(), [&keys[3]]);
        assert!(!summary.is_clean());

        assert!(summary.usable_report(&keys[0]).is_none());
        assert!(summary.usable_report(&keys[2]).is_some());
        assert!(summary.usable_report(&keys[3]).is_none());
        assert!(summary.usable_report(&keys[4]).is_some());
        assert_eq!(summary.anomalies().len(), 3);

        match &summary.outcomes[&keys[2]] {
            JobOutcome::Report { warnings, .. } => assert_eq!(warnings, &["WARNING: drift"]),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn render_lists_counts_and_keys() {
        let dir = tempdir().unwrap();
        let keys = [key("sim0000000a")];
        let summary = inspect(dir.path(), &keys, &engine());
        let text = summary.render(false);
        assert!(text.contains("No       outputs found in     1 directories."));
        assert!(text.contains("sim0000000a"));
        assert!(text.contains("Errors           found in     0 directories."));
    }
}
