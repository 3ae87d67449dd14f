//! Command-line configuration for the replication server

use crate::geometry::MapKind;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Server options, parsed from the command line
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Replication broadcasts per second
    #[arg(short, long, default_value = "30")]
    pub tick_rate: u32,

    /// Maximum concurrent clients
    #[arg(short, long, default_value = "15")]
    pub max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    pub client_timeout_secs: u64,

    /// Active map
    #[arg(long, value_enum, default_value = "skeld")]
    pub map: MapKind,

    /// JSON file with vent and spawn geometry for the active map
    #[arg(long)]
    pub map_data: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Record cheat reports but never disconnect the offender
    #[arg(long)]
    pub no_enforce_cheats: bool,

    /// Violations a client may accumulate before enforcement applies
    #[arg(long, default_value = "1")]
    pub max_violations: u32,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_rate.max(1) as f32)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn anti_cheat(&self) -> AntiCheatConfig {
        AntiCheatConfig {
            enforce: !self.no_enforce_cheats,
            max_violations: self.max_violations.max(1),
        }
    }
}

/// Connection-level policy applied to cheat reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AntiCheatConfig {
    /// Whether reports may disconnect a client at all
    pub enforce: bool,
    /// Violations needed before a report is enforced
    pub max_violations: u32,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            max_violations: 1,
        }
    }
}
