use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dovimux")]
#[command(author, version, about = "Dolby Vision media library normalizer")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe a media file and display stream and Dolby Vision information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Downmux a Profile 7 MKV into a Profile 8.1 MP4 artifact
    Downmux {
        /// Input MKV file
        #[arg(required = true)]
        input: PathBuf,
    },

    /// Remux a Dolby Vision MKV into an MP4 sibling (downmuxing Profile 7 first)
    Remux {
        /// Input MKV file
        #[arg(required = true)]
        input: PathBuf,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
