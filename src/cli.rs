//! CLI argument parsing for the offline sonifier tool

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::timeline::DEFAULT_TIME_SCALE;

/// Output format for the -c summary
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "mpisonar")]
#[command(version)]
#[command(about = "Render recorded MPI send/recv timelines as stereo audio", long_about = None)]
pub struct Cli {
    /// Directory containing the rank_<N>_output.t logs
    #[arg(short = 'd', long = "dir", value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Output WAV file
    #[arg(short = 'o', long = "output", value_name = "FILE", default_value = "out.wav")]
    pub output: PathBuf,

    /// Rank rendered on the left channel
    #[arg(long = "left", value_name = "RANK", default_value = "0")]
    pub left: usize,

    /// Rank rendered on the right channel
    #[arg(long = "right", value_name = "RANK", default_value = "1")]
    pub right: usize,

    /// Audio sample rate in Hz
    #[arg(long = "sample-rate", value_name = "HZ", default_value = "44100")]
    pub sample_rate: u32,

    /// Stretch factor from log microseconds to audio seconds
    #[arg(long = "time-scale", value_name = "FACTOR", default_value_t = DEFAULT_TIME_SCALE)]
    pub time_scale: f64,

    /// Print a per-rank summary instead of rendering audio
    #[arg(short = 'c', long = "summary")]
    pub summary: bool,

    /// Output format for the summary
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}
