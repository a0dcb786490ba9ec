use super::config::GeometrySettings;
use super::error::EngineError;
use super::pool::run_logged;
use super::progress::{Progress, ProgressReporter};
use super::structures::stem;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};

pub const GEOMETRY_RESULTS_NAME: &str = "results_zeopp.csv";

static UNITCELL_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Unitcell_volume:\s([\d.]+)").expect("volume pattern is valid"));
static DENSITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Density:\s([\d.]+)").expect("density pattern is valid"));
static ASA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bASA_A\^2:\s([\d.]+)\sASA_m\^2/cm\^3:\s([\d.]+)\sASA_m\^2/g:\s([\d.]+)")
        .expect("surface area pattern is valid")
});
static NASA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"NASA_A\^2:\s([\d.]+)\sNASA_m\^2/cm\^3:\s([\d.]+)\sNASA_m\^2/g:\s([\d.]+)")
        .expect("non-accessible area pattern is valid")
});
static CHANNELS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Number_of_channels:\s(\d+)\sChannel_surface_area_A\^2:([\d\s.]*)")
        .expect("channel pattern is valid")
});
static POCKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Number_of_pockets:\s(\d+)\sPocket_surface_area_A\^2:([\d\s.]*)")
        .expect("pocket pattern is valid")
});

/// Accessible surface area analysis of one structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceAreaReport {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Unitcell_volume")]
    pub unitcell_volume: f64,
    #[serde(rename = "Density")]
    pub density: f64,
    #[serde(rename = "ASA_A^2")]
    pub asa_a2: f64,
    #[serde(rename = "ASA_m^2/cm^3")]
    pub asa_m2_per_cm3: f64,
    #[serde(rename = "ASA_m^2/g")]
    pub asa_m2_per_g: f64,
    #[serde(rename = "NASA_A^2")]
    pub nasa_a2: f64,
    #[serde(rename = "NASA_m^2/cm^3")]
    pub nasa_m2_per_cm3: f64,
    #[serde(rename = "NASA_m^2/g")]
    pub nasa_m2_per_g: f64,
    #[serde(rename = "Number_of_channels")]
    pub channels: u32,
    /// Space-separated areas, one per channel.
    #[serde(rename = "Channel_surface_area_A^2")]
    pub channel_areas: String,
    #[serde(rename = "Number_of_pockets")]
    pub pockets: u32,
    #[serde(rename = "Pocket_surface_area_A^2")]
    pub pocket_areas: String,
}

const RESULT_COLUMNS: [&str; 16] = [
    "Name",
    "Unitcell_volume",
    "Density",
    "ASA_A^2",
    "ASA_m^2/cm^3",
    "ASA_m^2/g",
    "NASA_A^2",
    "NASA_m^2/cm^3",
    "NASA_m^2/g",
    "Number_of_channels",
    "Channel_surface_area_A^2",
    "Number_of_pockets",
    "Pocket_surface_area_A^2",
    "chan_radius",
    "probe_radius",
    "num_samples_per_atom",
];

impl SurfaceAreaReport {
    fn cells(&self, settings: &GeometrySettings) -> [String; 16] {
        [
            self.name.clone(),
            self.unitcell_volume.to_string(),
            self.density.to_string(),
            self.asa_a2.to_string(),
            self.asa_m2_per_cm3.to_string(),
            self.asa_m2_per_g.to_string(),
            self.nasa_a2.to_string(),
            self.nasa_m2_per_cm3.to_string(),
            self.nasa_m2_per_g.to_string(),
            self.channels.to_string(),
            self.channel_areas.clone(),
            self.pockets.to_string(),
            self.pocket_areas.clone(),
            settings.channel_radius.to_string(),
            settings.probe_radius.to_string(),
            settings.samples_per_atom.to_string(),
        ]
    }
}

/// Parses a `.sa` report. A missing channel or pocket line counts as zero.
pub fn parse_surface_area(name: &str, text: &str) -> Result<SurfaceAreaReport, String> {
    let number = |re: &Regex, group: usize, what: &str| -> Result<f64, String> {
        re.captures(text)
            .and_then(|c| c.get(group))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| format!("no {} value", what))
    };
    let counted = |re: &Regex| -> (u32, String) {
        re.captures(text)
            .map(|c| {
                (
                    c[1].parse().unwrap_or(0),
                    c.get(2)
                        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
                        .unwrap_or_default(),
                )
            })
            .unwrap_or((0, String::new()))
    };
    let (channels, channel_areas) = counted(&CHANNELS);
    let (pockets, pocket_areas) = counted(&POCKETS);
    Ok(SurfaceAreaReport {
        name: name.to_string(),
        unitcell_volume: number(&UNITCELL_VOLUME, 1, "Unitcell_volume")?,
        density: number(&DENSITY, 1, "Density")?,
        asa_a2: number(&ASA, 1, "ASA_A^2")?,
        asa_m2_per_cm3: number(&ASA, 2, "ASA_m^2/cm^3")?,
        asa_m2_per_g: number(&ASA, 3, "ASA_m^2/g")?,
        nasa_a2: number(&NASA, 1, "NASA_A^2")?,
        nasa_m2_per_cm3: number(&NASA, 2, "NASA_m^2/cm^3")?,
        nasa_m2_per_g: number(&NASA, 3, "NASA_m^2/g")?,
        channels,
        channel_areas,
        pockets,
        pocket_areas,
    })
}

/// Drives the external pore-geometry tool over a set of structures.
pub struct GeometryAnalyzer<'a> {
    executable: &'a Path,
    settings: &'a GeometrySettings,
}

impl<'a> GeometryAnalyzer<'a> {
    pub fn new(executable: &'a Path, settings: &'a GeometrySettings) -> Self {
        Self {
            executable,
            settings,
        }
    }

    /// Analyzes every structure in parallel, then writes the sorted results
    /// table into `out_dir`. Structures whose report is missing or unreadable
    /// are logged and left out of the table.
    #[instrument(skip_all, name = "geometry")]
    pub fn run(
        &self,
        cif_files: &[PathBuf],
        out_dir: &Path,
        reporter: &ProgressReporter,
    ) -> Result<Vec<SurfaceAreaReport>, EngineError> {
        fs::create_dir_all(out_dir).map_err(|e| EngineError::io(out_dir, e))?;
        info!(structures = cif_files.len(), "Running surface area analysis.");
        reporter.report(Progress::TaskStart {
            total: cif_files.len() as u64,
        });

        let mut reports: Vec<SurfaceAreaReport> = cif_files
            .par_iter()
            .filter_map(|cif| {
                let report = self.analyze(cif, out_dir);
                reporter.increment();
                match report {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                }
            })
            .collect();
        reporter.report(Progress::TaskFinish);

        reports.sort_by(|a, b| a.name.cmp(&b.name));
        self.write_results(&reports, &out_dir.join(GEOMETRY_RESULTS_NAME))?;
        Ok(reports)
    }

    fn analyze(&self, cif: &Path, out_dir: &Path) -> Result<SurfaceAreaReport, EngineError> {
        let name = stem(cif).unwrap_or_default().to_string();
        let sa = out_dir.join(format!("{}.sa", name));
        let log = out_dir.join(format!("{}.log", name));
        let collaborator = |reason: String| EngineError::Collaborator {
            tool: self.executable.display().to_string(),
            reason,
        };

        let status = run_logged(
            Command::new(self.executable)
                .arg("-ha")
                .arg("-sa")
                .arg(self.settings.channel_radius.to_string())
                .arg(self.settings.probe_radius.to_string())
                .arg(self.settings.samples_per_atom.to_string())
                .arg(&sa)
                .arg(cif),
            out_dir,
            &log,
        )
        .map_err(|e| collaborator(e.to_string()))?;
        debug!("Geometry analysis of {} exited with {}", name, status);

        let text = fs::read_to_string(&sa)
            .map_err(|e| collaborator(format!("no report for {}: {}", name, e)))?;
        parse_surface_area(&name, &text)
            .map_err(|reason| collaborator(format!("report {:?}: {}", sa, reason)))
    }

    fn write_results(&self, reports: &[SurfaceAreaReport], path: &Path) -> Result<(), EngineError> {
        let csv_err = |e: csv::Error| EngineError::Collaborator {
            tool: "csv".into(),
            reason: format!("{:?}: {}", path, e),
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        writer.write_record(RESULT_COLUMNS).map_err(csv_err)?;
        for report in reports {
            writer
                .write_record(report.cells(self.settings))
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|e| EngineError::io(path, e))?;
        info!(rows = reports.len(), "Geometry results stored in {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::WorkflowConfigBuilder;
    use tempfile::tempdir;

    const SA: &str = "\
@ MIL-47.sa Unitcell_volume: 1545.36   Density: 1.00009   ASA_A^2: 510.9 ASA_m^2/cm^3: 3306.05 ASA_m^2/g: 3305.75 NASA_A^2: 0 NASA_m^2/cm^3: 0 NASA_m^2/g: 0
Number_of_channels: 1 Channel_surface_area_A^2: 510.9
Number_of_pockets: 0 Pocket_surface_area_A^2:
";

    #[test]
    fn parses_areas_and_counts() {
        let report = parse_surface_area("MIL-47", SA).unwrap();
        assert_eq!(report.unitcell_volume, 1545.36);
        assert_eq!(report.asa_m2_per_g, 3305.75);
        assert_eq!(report.nasa_a2, 0.0);
        assert_eq!(report.channels, 1);
        assert_eq!(report.channel_areas, "510.9");
        assert_eq!(report.pockets, 0);
        assert_eq!(report.pocket_areas, "");
    }

    #[test]
    fn missing_asa_is_an_error() {
        let err = parse_surface_area("x", "Unitcell_volume: 1 Density: 1").unwrap_err();
        assert!(err.contains("ASA_A^2"));
    }

    #[cfg(unix)]
    #[test]
    fn run_writes_sorted_results_table() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let tool = dir.path().join("network");
        // Arguments: -ha -sa chan probe samples out.sa in.cif
        fs::write(
            &tool,
            format!("#!/bin/sh\ncat > \"$6\" <<'EOF'\n{}EOF\n", SA),
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let cifs: Vec<PathBuf> = ["UiO-66.cif", "MIL-47.cif"]
            .iter()
            .map(|n| {
                let p = dir.path().join(n);
                fs::write(&p, "data_x\n").unwrap();
                p
            })
            .collect();
        let config = WorkflowConfigBuilder::new()
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let out = config.geometry_dir();

        let reports = GeometryAnalyzer::new(&tool, &config.geometry)
            .run(&cifs, &out, &ProgressReporter::new())
            .unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["MIL-47", "UiO-66"]);

        let table = fs::read_to_string(out.join(GEOMETRY_RESULTS_NAME)).unwrap();
        let mut lines = table.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Name,Unitcell_volume,Density,ASA_A^2"));
        assert!(header.ends_with("chan_radius,probe_radius,num_samples_per_atom"));
        assert!(lines.next().unwrap().starts_with("MIL-47,1545.36"));
    }
}
