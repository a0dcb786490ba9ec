use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ReportError {
    #[error("Report has no entry at '{path}'")]
    MissingKey { path: String },
    #[error("Report entry '{path}' is a section, not a value")]
    NotALeaf { path: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportNode {
    Section(ReportTree),
    Values(Vec<f64>),
}

/// Nested lookup structure built from a simulation report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportTree {
    entries: Vec<(String, ReportNode)>,
}

impl ReportTree {
    pub fn get(&self, key: &str) -> Option<&ReportNode> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&ReportNode> {
        let (first, rest) = path.split_first()?;
        let node = self.get(first.as_ref())?;
        match (node, rest.is_empty()) {
            (_, true) => Some(node),
            (ReportNode::Section(child), false) => child.lookup(rest),
            (ReportNode::Values(_), false) => None,
        }
    }

    /// The numeric values stored at `path`.
    pub fn values<S: AsRef<str>>(&self, path: &[S]) -> Result<&[f64], ReportError> {
        let joined = || {
            path.iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(" / ")
        };
        match self.lookup(path) {
            Some(ReportNode::Values(values)) => Ok(values),
            Some(ReportNode::Section(_)) => Err(ReportError::NotALeaf { path: joined() }),
            None => Err(ReportError::MissingKey { path: joined() }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn section_mut(&mut self, key: &str) -> &mut ReportTree {
        let pos = match self.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.entries
                    .push((key.to_string(), ReportNode::Section(ReportTree::default())));
                self.entries.len() - 1
            }
        };
        if !matches!(self.entries[pos].1, ReportNode::Section(_)) {
            self.entries[pos].1 = ReportNode::Section(ReportTree::default());
        }
        match &mut self.entries[pos].1 {
            ReportNode::Section(tree) => tree,
            ReportNode::Values(_) => unreachable!("entry was just made a section"),
        }
    }

    fn insert_leaf(&mut self, key: String, values: Vec<f64>) {
        if self.get(&key).is_none() {
            self.entries.push((key, ReportNode::Values(values)));
        }
    }
}

/// Turns raw report text into a [`ReportTree`].
pub trait ReportParser: Send + Sync {
    fn parse(&self, text: &str) -> ReportTree;
}

/// Parser for block-structured text reports.
///
/// A line followed by a rule of `=` opens a top-level section. Inside a section,
/// `Component N [NAME]` opens the sub-section `NAME`. Any other line made of a
/// key followed by numeric tokens becomes a leaf; the first occurrence of a key
/// within its section wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockReportParser;

impl ReportParser for BlockReportParser {
    fn parse(&self, text: &str) -> ReportTree {
        let mut root = ReportTree::default();
        let mut section: Option<String> = None;
        let mut component: Option<String> = None;

        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            i += 1;
            if line.is_empty() || is_rule(line, '-') || is_rule(line, '=') {
                continue;
            }
            if lines.get(i).is_some_and(|next| is_rule(next.trim(), '=')) {
                section = Some(line.trim_end_matches(':').trim().to_string());
                component = None;
                i += 1;
                continue;
            }
            if let Some(name) = component_name(line) {
                component = Some(name.to_string());
                continue;
            }
            let Some((key, values)) = split_leaf(line) else {
                continue;
            };
            let mut target = &mut root;
            if let Some(s) = &section {
                target = target.section_mut(s);
            }
            if let Some(c) = &component {
                target = target.section_mut(c);
            }
            target.insert_leaf(key, values);
        }
        root
    }
}

fn is_rule(line: &str, ch: char) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == ch)
}

fn component_name(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("Component")?.trim_start();
    let (index, rest) = rest.split_once(char::is_whitespace)?;
    index.parse::<usize>().ok()?;
    let rest = rest.trim_start().strip_prefix('[')?;
    let (name, _) = rest.split_once(']')?;
    Some(name.trim())
}

fn split_leaf(line: &str) -> Option<(String, Vec<f64>)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let first_number = tokens.iter().position(|t| t.parse::<f64>().is_ok())?;
    if first_number == 0 {
        return None;
    }
    let key = tokens[..first_number]
        .join(" ")
        .trim_end_matches(':')
        .trim()
        .to_string();
    if key.is_empty() {
        return None;
    }
    let values = tokens[first_number..]
        .iter()
        .filter_map(|t| t.parse::<f64>().ok())
        .collect();
    Some((key, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Simulation conditions
=====================
External temperature:   298.0000 [K]
External Pressure:      100000.0000 [Pa]

Number of molecules
===================
Component 0 [CO2]
-------------------------------------------------------------
Average loading absolute [molecules/unit cell]    12.500 +/-   0.250 [-]
Average loading absolute [cm^3 (STP)/cm^3 framework]    42.1000 +/-   1.0500 [-]
Average loading absolute [cm^3 (STP)/cm^3 framework]    99.0 +/-   9.0 [-]

Component 1 [N2]
-------------------------------------------------------------
Average loading absolute [cm^3 (STP)/cm^3 framework]    3.2500 +/-   0.1000 [-]
";

    #[test]
    fn parses_sections_components_and_leaves() {
        let tree = BlockReportParser.parse(REPORT);
        assert_eq!(
            tree.values(&["Simulation conditions", "External Pressure"])
                .unwrap(),
            &[100000.0]
        );
        let loading = tree
            .values(&[
                "Number of molecules",
                "CO2",
                "Average loading absolute [cm^3 (STP)/cm^3 framework]",
            ])
            .unwrap();
        assert_eq!(loading, &[42.1, 1.05]);
        let n2 = tree
            .values(&[
                "Number of molecules",
                "N2",
                "Average loading absolute [cm^3 (STP)/cm^3 framework]",
            ])
            .unwrap();
        assert_eq!(n2[0], 3.25);
    }

    #[test]
    fn missing_paths_are_reported_by_name() {
        let tree = BlockReportParser.parse(REPORT);
        let err = tree
            .values(&["Number of molecules", "CH4", "Average loading absolute"])
            .unwrap_err();
        assert_eq!(
            err,
            ReportError::MissingKey {
                path: "Number of molecules / CH4 / Average loading absolute".into()
            }
        );
        assert!(matches!(
            tree.values(&["Number of molecules"]),
            Err(ReportError::NotALeaf { .. })
        ));
    }

    #[test]
    fn empty_text_gives_empty_tree() {
        assert!(BlockReportParser.parse("").is_empty());
    }

    #[test]
    fn component_header_requires_index_and_brackets() {
        assert_eq!(component_name("Component 0 [methane]"), Some("methane"));
        assert_eq!(component_name("Component [x]"), None);
        assert_eq!(component_name("Components 2"), None);
    }
}
