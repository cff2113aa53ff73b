//! Command-line interface for Cirrus.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cirrus - edge traffic-shaping and caching pipeline.
#[derive(Parser)]
#[command(name = "cirrus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CIRRUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "CIRRUS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the edge gateway
    Serve {
        /// Bind address for the gateway
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// Base URL of the origin server
        #[arg(long, env = "CIRRUS_ORIGIN")]
        origin: Option<String>,

        /// Directory of prerendered documents
        #[arg(long)]
        prerender_dir: Option<PathBuf>,

        /// Bind address for the metrics server (enables metrics)
        #[arg(long)]
        metrics_addr: Option<String>,
    },

    /// Classify a request from the command line
    Classify {
        /// User-agent string to classify
        user_agent: String,

        /// Remote address of the request
        #[arg(long)]
        remote_addr: Option<String>,

        /// Request path
        #[arg(long, default_value = "/")]
        path: String,
    },

    /// Print version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
