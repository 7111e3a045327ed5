use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_more::{Display, From};
use serde_derive::Deserialize;
use tracing::{info, warn};

use crate::dns::hosts::{HostTable, HostsError};
use crate::dns::tracker::ClientTracker;

#[derive(Debug, Display, From)]
pub enum ContextError {
    #[display(fmt = "{}", _0)]
    Io(std::io::Error),
    #[display(fmt = "invalid configuration: {}", _0)]
    Config(serde_json::Error),
    #[display(fmt = "failed to load host table: {}", _0)]
    Hosts(HostsError),
}

impl std::error::Error for ContextError {}

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub hosts_file: PathBuf,
    pub default_ttl: u32,
    pub thread_count: usize,
    pub client_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "0.0.0.0".to_string(),
            port: 53,
            hosts_file: PathBuf::from("hosts"),
            default_ttl: 300,
            thread_count: 4,
            client_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<ServerConfig> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
        let file = File::open(path)?;
        ServerConfig::from_reader(BufReader::new(file))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

/// State shared by every thread of a running server.
pub struct ServerContext {
    pub config: ServerConfig,
    pub hosts: HostTable,
    pub clients: ClientTracker,
}

impl ServerContext {
    pub fn new(config: ServerConfig, hosts: HostTable) -> ServerContext {
        ServerContext {
            config,
            hosts,
            clients: ClientTracker::new(),
        }
    }

    /// Loads the host table named by the config.
    pub fn initialize(config: ServerConfig) -> Result<ServerContext> {
        let hosts = HostTable::load(&config.hosts_file, config.default_ttl)?;

        info!(
            path = %config.hosts_file.display(),
            entries = hosts.len(),
            "loaded host table"
        );
        if hosts.is_empty() {
            warn!("host table is empty, every query will get NXDOMAIN");
        }

        Ok(ServerContext::new(config, hosts))
    }
}
