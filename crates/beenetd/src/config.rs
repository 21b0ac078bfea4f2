//! Configuration for beenetd

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// beenetd - Beenet mesh daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "beenetd")]
#[command(about = "Beenet mesh daemon: swarm membership, gossip, and content exchange")]
pub struct Config {
    /// Listen address for peer sessions
    #[arg(short, long, default_value = "0.0.0.0:7331")]
    pub listen: SocketAddr,

    /// Data directory for the chunk store
    #[arg(short, long, default_value = "./data/beenetd")]
    pub data_dir: PathBuf,

    /// Invite URI to join (beenet:swarm/...); a fresh swarm is created
    /// when omitted
    #[arg(long, env = "BEENET_INVITE")]
    pub invite: Option<String>,

    /// Nickname used in our handle and presence records
    #[arg(long, default_value = "bee")]
    pub nickname: String,

    /// Pre-shared key for swarm admission (overrides the invite psk)
    #[arg(long, env = "BEENET_PSK")]
    pub psk: Option<String>,

    /// Bootstrap peers to dial at startup
    #[arg(long, value_delimiter = ',')]
    pub bootstrap: Vec<SocketAddr>,

    /// Topics to subscribe to at startup
    #[arg(long, value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Maximum concurrent chunk fetches
    #[arg(long, default_value = "8")]
    pub concurrent_fetches: usize,

    /// Per-chunk fetch timeout in seconds
    #[arg(long, default_value = "10")]
    pub fetch_timeout_secs: u64,

    /// Gossip heartbeat interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub heartbeat_interval_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.nickname.len() < 3 {
            anyhow::bail!("nickname must be at least 3 characters");
        }
        if self.concurrent_fetches == 0 {
            anyhow::bail!("concurrent fetches must be nonzero");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch timeout must be nonzero");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("log format must be json or pretty");
        }
        Ok(())
    }
}
