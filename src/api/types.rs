use std::fmt;
use std::str::FromStr;

/// LeaderInfo identifies a node by the address its peers use to reach its data store.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LeaderInfo {
    pub address: String,
    pub port: u16,
}

impl LeaderInfo {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        LeaderInfo {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for LeaderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LeaderInfoParseError {
    #[error("expected host:port, got {0:?}")]
    MissingPort(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
}

impl FromStr for LeaderInfo {
    type Err = LeaderInfoParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| LeaderInfoParseError::MissingPort(s.to_string()))?;
        if address.is_empty() {
            return Err(LeaderInfoParseError::MissingPort(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| LeaderInfoParseError::InvalidPort(s.to_string()))?;

        Ok(LeaderInfo::new(address, port))
    }
}

/// NodeRole is the replication role the local data store was last successfully switched into.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeRole {
    Unknown,
    Primary,
    Replica(LeaderInfo),
}

impl NodeRole {
    /// Short tag used when publishing the role to the coordination service.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeRole::Unknown => "unknown",
            NodeRole::Primary => "primary",
            NodeRole::Replica(_) => "replica",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Unknown => write!(f, "Unknown"),
            NodeRole::Primary => write!(f, "Primary"),
            NodeRole::Replica(leader) => write!(f, "Replica(of={})", leader),
        }
    }
}

/// One replication-status poll, as observed by the replication monitor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplicationHealth {
    /// Raw replication report, or a synthesized error message if the poll failed.
    pub output: String,
    pub healthy: bool,
}

/// Who the coordination service currently recognizes as holding the primary role.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LeadershipEvent {
    SelfIsLeader,
    Leader(LeaderInfo),
    NoLeader,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FatalStopReason {
    TooManyConnectionErrors { consecutive: u32 },
    UptimeRegressed { previous: u64, current: u64 },
    EventSourcesClosed,
}

impl fmt::Display for FatalStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalStopReason::TooManyConnectionErrors { consecutive } => {
                write!(f, "{} consecutive data store connection errors", consecutive)
            }
            FatalStopReason::UptimeRegressed { previous, current } => write!(
                f,
                "data store uptime went from {}s to {}s, it restarted",
                previous, current
            ),
            FatalStopReason::EventSourcesClosed => write!(f, "all monitors exited"),
        }
    }
}

/// How the failover engine ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShutdownKind {
    Graceful,
    Fatal(FatalStopReason),
}

impl ShutdownKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownKind::Graceful => 0,
            ShutdownKind::Fatal(_) => 1,
        }
    }
}
