use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "isoflow.toml";

pub struct DefaultsConfig {
    pub output_dir: PathBuf,
    pub report_dir: PathBuf,
    pub report_extension: String,
    pub backend: String,
    pub key_policy: String,
    pub structure_source_label: String,
    pub channel_radius: f64,
    pub probe_radius: f64,
    pub samples_per_atom: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("isoflow-output"),
            report_dir: PathBuf::from("Output").join("System_0"),
            report_extension: "data".to_string(),
            backend: "process".to_string(),
            key_policy: "random".to_string(),
            structure_source_label: "local".to_string(),
            channel_radius: 1.2,
            probe_radius: 1.2,
            samples_per_atom: 2000,
        }
    }
}
