//! The data store is the local single-writer key-value process this sidecar supervises. The
//! failover engine only ever asks it for status reports and tells it who to replicate from.
mod redis;

use crate::api::LeaderInfo;
use std::fmt;
use std::io;
use tokio::time::Duration;

pub use self::redis::RedisDataStore;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StatusSection {
    Server,
    Replication,
    Persistence,
}

impl StatusSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusSection::Server => "server",
            StatusSection::Replication => "replication",
            StatusSection::Persistence => "persistence",
        }
    }
}

/// Who the data store should replicate from. `NoOne` makes it a writable primary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReplicaTarget {
    NoOne,
    Primary(LeaderInfo),
}

impl fmt::Display for ReplicaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaTarget::NoOne => write!(f, "no one"),
            ReplicaTarget::Primary(leader) => write!(f, "{}", leader),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataStoreError {
    #[error("I/O failure talking to data store: {0}")]
    Io(#[from] io::Error),

    #[error("data store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed data store reply: {0}")]
    Protocol(String),

    #[error("data store rejected command: {0}")]
    Server(String),

    #[error("data store closed the connection")]
    Disconnected,
}

/// DataStore is the seam between the failover engine and the supervised process. Each call is
/// independent, so implementations must tolerate concurrent use from every monitor.
#[async_trait::async_trait]
pub trait DataStore: Send + Sync + 'static {
    /// The address this client talks to. Only used in log and health messages.
    fn address(&self) -> &str;

    /// Fetch one section of the line-oriented `key:value` status report.
    async fn status(&self, section: StatusSection) -> Result<String, DataStoreError>;

    /// Point replication at `target`. Naturally idempotent.
    async fn replicate_from(&self, target: &ReplicaTarget) -> Result<(), DataStoreError>;
}
