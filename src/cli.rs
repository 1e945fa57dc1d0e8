/// CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::probes::NetKind;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser, Debug)]
#[command(name = "procpulse")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Config file [default: ~/.config/procpulse/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "info,procpulse=trace" (RUST_LOG wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log file [default: ~/.cache/procpulse/procpulse.log]
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Live dashboard for a single process
    Monitor(MonitorArgs),

    /// List processes whose name contains every filter
    Ps {
        /// Name fragments (case-insensitive)
        filters: Vec<String>,
    },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct MonitorArgs {
    /// PID, or a fragment of the process name
    pub target: String,

    /// Additional name fragments; all must match
    pub filters: Vec<String>,

    /// Sampling interval in milliseconds [default: 500]
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Samples kept per metric [default: 512]
    #[arg(short = 'n', long)]
    pub history: Option<usize>,

    /// CPU graph zoom factor [default: 1.0]
    #[arg(long)]
    pub zoom_cpu: Option<f64>,

    /// Memory graph zoom factor [default: 1.0]
    #[arg(long)]
    pub zoom_mem: Option<f64>,

    /// Connections graph zoom factor [default: 1.0]
    #[arg(long)]
    pub zoom_net: Option<f64>,

    /// Open-files graph zoom factor [default: 1.0]
    #[arg(long)]
    pub zoom_files: Option<f64>,

    /// Socket kinds counted as connections [default: all]
    #[arg(short = 'k', long, value_enum)]
    pub net_kind: Option<NetKind>,

    /// Stop sampling after this many ticks without the process, 0 = never [default: 5]
    #[arg(long)]
    pub exit_after: Option<u32>,

    /// Timeout for lsof/netstat probes in milliseconds [default: 1000]
    #[arg(long)]
    pub probe_timeout: Option<u64>,
}
