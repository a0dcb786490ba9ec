use clap::{Args, Parser, Subcommand, ValueEnum};
use isoflow::workflows::export::IsothermFormat;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "The ISOFLOW Developers",
    version,
    about = "ISOFLOW CLI - expand adsorption parameter sweeps into simulation jobs, run them with bounded concurrency, and rebuild isotherms from the results.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

/// Where the campaign configuration comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to the configuration file in TOML format.
    /// Defaults to `isoflow.toml` in the platform configuration directory, if present.
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory of the campaign (holds `cif/`, `simulations/`, `isotherms/`).
    #[arg(short = 'd', long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S dispatch.max-workers=8
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", global = true)]
    pub set_values: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expand a sweep specification and register one job per parameter combination.
    Prepare(PrepareArgs),
    /// Run every pending job with the simulation engine.
    Simulate(SimulateArgs),
    /// Inspect the outputs of all indexed jobs and report anomalies.
    Check(CheckArgs),
    /// Extract results, write the run's result document and rebuild the isotherms.
    Export(ExportArgs),
    /// Prepare, simulate and export in a single invocation.
    Run(RunArgs),
    /// Rebuild isotherms from the job index or from an existing result document.
    Isotherms(IsothermsArgs),
    /// Merge result documents from separate runs into one.
    Merge(MergeArgs),
    /// Compute accessible surface areas for the campaign's structures.
    Geometry(GeometryArgs),
}

/// Arguments for the `prepare` subcommand.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Path to the sweep specification (JSON, or TOML by extension).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    #[command(flatten)]
    pub structures: StructureArgs,
}

/// Overrides for where structures come from.
#[derive(Args, Debug, Clone, Default)]
pub struct StructureArgs {
    /// Directory of CIF files to collect structures from.
    #[arg(long = "structures", value_name = "DIR")]
    pub structure_dir: Option<PathBuf>,

    /// Only simulate structures whose file name contains this text.
    #[arg(long, value_name = "TEXT")]
    pub subset: Option<String>,
}

/// Overrides for how jobs are executed.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Path to the simulation engine executable.
    #[arg(short, long, value_name = "PATH")]
    pub engine: Option<PathBuf>,

    /// Maximum number of jobs running at the same time.
    #[arg(short, long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Worker pool implementation ('process' or 'launcher-script').
    #[arg(long, value_name = "NAME")]
    pub backend: Option<String>,
}

/// Arguments for the `simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Launch jobs again even if they already produced a report.
    #[arg(long)]
    pub rerun: bool,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Print the offending report lines for warned and errored jobs.
    #[arg(long)]
    pub details: bool,
}

/// Arguments for the `export` subcommand.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Which isotherm stores to write.
    #[arg(short, long, value_enum, default_value_t = FormatArg::Both)]
    pub format: FormatArg,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the sweep specification (JSON, or TOML by extension).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    #[command(flatten)]
    pub structures: StructureArgs,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Launch jobs again even if they already produced a report.
    #[arg(long)]
    pub rerun: bool,

    /// Which isotherm stores to write.
    #[arg(short, long, value_enum, default_value_t = FormatArg::Both)]
    pub format: FormatArg,
}

/// Arguments for the `isotherms` subcommand.
#[derive(Args, Debug)]
pub struct IsothermsArgs {
    /// Rebuild from the results section of this document instead of the job index.
    #[arg(long, value_name = "PATH")]
    pub from: Option<PathBuf>,

    /// Which isotherm stores to write.
    #[arg(short, long, value_enum, default_value_t = FormatArg::Both)]
    pub format: FormatArg,
}

/// Arguments for the `merge` subcommand.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Result documents to merge, in order.
    #[arg(short, long, required = true, num_args(1..), value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Path of the merged document.
    #[arg(short, long, default_value = "merged.json", value_name = "PATH")]
    pub output: PathBuf,

    /// Also rebuild isotherms from the merged results.
    #[arg(long)]
    pub isotherms: bool,

    /// Which isotherm stores to write when `--isotherms` is given.
    #[arg(short, long, value_enum, default_value_t = FormatArg::Both)]
    pub format: FormatArg,
}

/// Arguments for the `geometry` subcommand.
#[derive(Args, Debug)]
pub struct GeometryArgs {
    /// CIF files to analyze. Defaults to every structure in the campaign's `cif/` directory.
    #[arg(value_name = "CIF")]
    pub files: Vec<PathBuf>,

    /// Path to the pore geometry analysis executable.
    #[arg(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Csv,
    Json,
    Both,
}

impl From<FormatArg> for IsothermFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => IsothermFormat::Csv,
            FormatArg::Json => IsothermFormat::Json,
            FormatArg::Both => IsothermFormat::Both,
        }
    }
}
