use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Vehicle trajectory playback engine
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Path to the trajectory dataset (JSON)
    #[arg(value_name = "DATASET")]
    pub dataset: PathBuf,

    /// Configuration file (JSON); defaults apply when omitted
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Rolling window size in seconds (overrides config)
    #[arg(short = 'w', long = "window", value_name = "SEC")]
    pub window_size: Option<f64>,

    /// Tick rate in Hz (overrides config)
    #[arg(short = 'r', long = "framerate", value_name = "HZ")]
    pub framerate: Option<f64>,

    /// Playback duration in seconds from the stream start (overrides config)
    #[arg(short = 'd', long = "duration", value_name = "SEC")]
    pub duration: Option<f64>,

    /// Attribute/color cache capacity in entries (overrides config)
    #[arg(long = "cache", value_name = "N")]
    pub cache_capacity: Option<usize>,

    /// Roadway x-range in feet (overrides config)
    #[arg(long = "x-range", value_names = ["MIN", "MAX"], num_args = 2)]
    pub x_range: Option<Vec<f64>>,

    /// Time-space strips only: fixed-increment window, no overhead frames
    #[arg(long = "no-overhead")]
    pub no_overhead: bool,

    /// Run the producer/consumer pipeline instead of the playback loop
    #[arg(short = 'P', long = "pipeline")]
    pub pipeline: bool,

    /// Serve the latest frame and player controls over HTTP
    #[arg(short = 's', long = "serve")]
    pub serve: bool,

    /// HTTP port (with --serve; overrides config)
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Stop after N ticks even if the stream has more
    #[arg(long = "ticks", value_name = "N")]
    pub max_ticks: Option<u64>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Fold CLI overrides into a loaded config.
    pub fn apply_to(&self, config: &mut crate::config::Config) {
        if let Some(w) = self.window_size {
            config.window_size = w;
        }
        if let Some(r) = self.framerate {
            config.framerate = r;
        }
        if let Some(d) = self.duration {
            config.duration = Some(d);
        }
        if let Some(n) = self.cache_capacity {
            config.cache_capacity = n;
        }
        if let Some(range) = &self.x_range {
            if let [min, max] = range[..] {
                config.x_min = min;
                config.x_max = max;
            }
        }
        if self.no_overhead {
            config.overhead_view = false;
        }
        if let Some(p) = self.port {
            config.port = p;
        }
    }
}
