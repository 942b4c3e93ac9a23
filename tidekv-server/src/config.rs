//! # Server Configuration
//!
//! Purpose: Resolve process startup flags into one immutable
//! [`ServerConfig`], following the Go original's `constants.go` defaults.
//!
//! ## Design Principles
//! 1. **Resolved Once**: flags are parsed a single time at startup; every
//!    later reader gets a plain struct, not a parser.
//! 2. **`clap` Derive**: matches the CLI style already used elsewhere in
//!    the retrieval pack for server-style binaries.

use clap::Parser;

/// Default listen port, matching the Go original's `DefaultPort`.
pub const DEFAULT_PORT: u16 = 6380;
/// Default shard count, matching the Go original's `SHARD_COUNT`.
pub const DEFAULT_SHARD_COUNT: usize = 16;
/// Default per-shard capacity, matching `CAPACITY_PER_SHARD`.
pub const DEFAULT_CAPACITY_PER_SHARD: usize = 100;
/// Default snapshot file stem; `.txt` is appended (see [`ServerConfig::snapshot_path`]).
pub const DEFAULT_SNAPSHOT_FILE: &str = "snapshot";
/// Default snapshot interval in seconds (5 minutes).
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 5 * 60;

/// Command-line configuration for the server process.
#[derive(Debug, Parser)]
#[command(name = "tidekv-server", about = "In-memory key-value store with replication")]
pub struct ServerConfig {
    /// Port this instance listens on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// `host:port` of a master to replicate from. Absent means this
    /// instance runs as master.
    #[arg(long)]
    pub replicaof: Option<String>,

    /// Snapshot file name (without extension); `.txt` is appended.
    #[arg(long, default_value = DEFAULT_SNAPSHOT_FILE)]
    pub snapshot_file: String,

    /// Number of cache shards.
    #[arg(long, default_value_t = DEFAULT_SHARD_COUNT)]
    pub shard_count: usize,

    /// Maximum live entries per shard.
    #[arg(long, default_value_t = DEFAULT_CAPACITY_PER_SHARD)]
    pub capacity_per_shard: usize,

    /// Seconds between periodic snapshots.
    #[arg(long, default_value_t = DEFAULT_SNAPSHOT_INTERVAL_SECS)]
    pub snapshot_interval_secs: u64,
}

impl ServerConfig {
    /// Parses configuration from the process's command-line arguments.
    pub fn parse_args() -> Self {
        ServerConfig::parse()
    }

    /// Whether this instance should start as a replica.
    pub fn is_replica(&self) -> bool {
        self.replicaof.is_some()
    }

    /// The snapshot file path, with the `.txt` suffix spec.md requires.
    pub fn snapshot_path(&self) -> String {
        format!("{}.txt", self.snapshot_file)
    }
}
