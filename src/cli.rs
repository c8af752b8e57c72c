use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cadence", about = "Check a recorded rhythm performance against a reference")]
pub struct Cli {
    /// Rhythm pattern (JSON)
    pub pattern: PathBuf,

    /// Reference recording played correctly
    pub solution: PathBuf,

    /// Performer's recording to check
    pub sample: PathBuf,

    /// Config file (defaults to ./cadence.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Envelope frame length in milliseconds
    #[arg(long, default_value_t = 10)]
    pub frame_ms: u32,

    /// Onset threshold as a fraction of the track peak
    #[arg(long, default_value_t = 0.3)]
    pub threshold: f32,

    /// Timing tolerance as a fraction of the gap to the next note
    #[arg(long, default_value_t = 0.1)]
    pub tolerance: f64,

    /// Progress update granularity in percent (0-100, 0 = every frame)
    #[arg(long, default_value_t = 1.0)]
    pub progress_interval: f32,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Cancel level extraction after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the solution's levels, one per line
    #[arg(long)]
    pub export_solution: Option<PathBuf>,

    /// Write the sample's levels, one per line
    #[arg(long)]
    pub export_sample: Option<PathBuf>,
}
