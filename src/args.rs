use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT_SECS, DEFAULT_COUNTER_TIMEOUT_SECS, DEFAULT_PAUSE_MS,
    LIVE_FUNCTIONS_BASE_URL, LOCAL_FUNCTIONS_BASE_URL,
};

#[derive(Debug, Parser)]
#[command(name = "clinic_import")]
#[command(about = "Import clinic patients and historical visits from a CSV export into the patient backend")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create patient records (deduplicated by registration id), then advance the remote counter.
    Patients(ImportArgs),
    /// Add historical visits grouped by (registration id, visit date).
    Visits(ImportArgs),
    /// Run the patient import followed by the visit import.
    All(ImportArgs),
    /// Set the remote patient counter without importing anything.
    SetCounter(CounterArgs),
    /// Write unique medication names, instructions and durations to a JSON file.
    MedicationCatalog(CatalogArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetMode {
    /// Deployed cloud functions.
    Live,
    /// Local functions emulator.
    Local,
}

impl TargetMode {
    pub fn base_url(self) -> &'static str {
        match self {
            TargetMode::Live => LIVE_FUNCTIONS_BASE_URL,
            TargetMode::Local => LOCAL_FUNCTIONS_BASE_URL,
        }
    }
}

/// How the visit date column is keyed and sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DateFormat {
    /// Use the recorded token verbatim.
    Raw,
    /// Require DD/MM/YYYY and send it as YYYY-MM-DD.
    Dmy,
}

#[derive(Debug, Clone, clap::Args)]
pub struct TargetArgs {
    /// Which backend deployment to talk to.
    #[arg(long, value_enum, default_value_t = TargetMode::Live)]
    pub target: TargetMode,

    /// Explicit functions base URL. Overrides --target.
    #[arg(long)]
    pub base_url: Option<String>,
}

impl TargetArgs {
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(self.target.base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct ImportArgs {
    /// Clinic CSV export with a header row.
    #[arg(long)]
    pub input_path: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of entities per batch request.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Optional cap on data rows read from the CSV (for test runs).
    #[arg(long)]
    pub row_limit: Option<usize>,

    /// Visit date column format.
    #[arg(long, value_enum, default_value_t = DateFormat::Raw)]
    pub date_format: DateFormat,

    /// Pause after a transport error before the next batch, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_PAUSE_MS)]
    pub pause_ms: u64,

    /// Per-request timeout for batch calls.
    #[arg(long, default_value_t = DEFAULT_BATCH_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Per-request timeout for the counter update.
    #[arg(long, default_value_t = DEFAULT_COUNTER_TIMEOUT_SECS)]
    pub counter_timeout_secs: u64,

    /// Disable the progress bar.
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct CounterArgs {
    /// Explicit counter value. When omitted, the maximum is computed from --input-path.
    #[arg(long)]
    pub value: Option<i64>,

    /// Clinic CSV export used to compute the counter value.
    #[arg(long, required_unless_present = "value")]
    pub input_path: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Per-request timeout for the counter update.
    #[arg(long, default_value_t = DEFAULT_COUNTER_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, clap::Args)]
pub struct CatalogArgs {
    /// Clinic CSV export with a header row.
    #[arg(long)]
    pub input_path: PathBuf,

    /// JSON output path.
    #[arg(long, default_value = "functions/medication_context_data.json")]
    pub output_path: PathBuf,
}
