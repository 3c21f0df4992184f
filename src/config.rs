use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error as ThisError;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_DBFILENAME: &str = "dump.rdb";

/// Server settings. Produced once at startup and only read afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Directory holding the snapshot file.
    pub dir: String,
    pub dbfilename: String,
    /// The primary to replicate from. Present only when running as a replica.
    pub replicaof: Option<Upstream>,
    pub max_frame_size: usize,
    /// Period of the optional background expiry sweep. Expiry is lazy when absent.
    pub expiry_sweep_interval: Option<Duration>,
}

impl Config {
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.dbfilename)
    }

    /// The sweep period, if sweeping is enabled. A zero period disables it.
    pub fn expiry_sweep_period(&self) -> Option<Duration> {
        self.expiry_sweep_interval.filter(|period| !period.is_zero())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dir: ".".to_string(),
            dbfilename: DEFAULT_DBFILENAME.to_string(),
            replicaof: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            expiry_sweep_interval: None,
        }
    }
}

/// Address of a primary, given as `"<host> <port>"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum UpstreamError {
    #[error("expected '<MASTER_HOST> <MASTER_PORT>', got {0:?}")]
    Format(String),
    #[error("invalid primary port {0:?}")]
    Port(String),
}

impl FromStr for Upstream {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let &[host, port] = fields.as_slice() else {
            return Err(UpstreamError::Format(s.to_string()));
        };

        let port = port
            .parse::<u16>()
            .map_err(|_| UpstreamError::Port(port.to_string()))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}
