use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "metasched", version, about = "Adaptive meta-scheduler for Slurm partitions")]
pub struct Cli {
    /// Path to the queue configuration file (TOML).
    pub config: PathBuf,

    /// Interval, in seconds, between supervisor ticks.
    #[arg(long, env = "METASCHED_POLL", default_value_t = 60)]
    pub poll: u64,

    /// Minimum interval, in seconds, between status reports. `-1` disables
    /// reporting; `0` reports every tick.
    #[arg(long, env = "METASCHED_MONITOR", default_value_t = 3600)]
    pub monitor: i64,

    /// Maximum total retries per Command across all queues before the run
    /// is declared fatal.
    #[arg(long, env = "METASCHED_RETRY", default_value_t = 0)]
    pub retry: u32,

    /// Per-Command memory hint, in GB. Submission requests `memory *
    /// pack_size`.
    #[arg(long, env = "METASCHED_MEMORY", default_value_t = 0)]
    pub memory: u32,

    /// Optional per-Job wall-clock limit, in minutes. `0` means unset.
    #[arg(long, env = "METASCHED_TIMEOUT", default_value_t = 0)]
    pub timeout: u32,

    /// Directory where the cluster should place per-Job stdout/stderr.
    #[arg(long, env = "METASCHED_OUT", default_value = ".")]
    pub out: PathBuf,
}
