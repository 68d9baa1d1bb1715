//! The coordination service owns leader election and the service catalog. This sidecar only
//! consumes its results: who holds the primary lock, and where this node is registered.
mod consul;

use crate::api::{LeaderInfo, NodeRole, ReplicationHealth};

pub use consul::ConsulConfig;
pub use consul::ConsulCoordinator;

/// The leader as of a given coordination-service index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeaderObservation {
    pub index: u64,
    pub leader: Option<LeaderInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("request to coordination service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("coordination service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed coordination service response: {0}")]
    Decode(String),

    #[error("invalid coordination settings: {0}")]
    InvalidConfig(&'static str),
}

/// Coordinator is the seam between the failover engine and the coordination service.
///
/// Every method is expected to be safe to repeat: registration is an upsert keyed by a stable
/// service ID, and acquiring a lock we already hold just reports success again.
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Upsert this node's service record, tagged with `role`, with its health check set from
    /// `health`.
    async fn register_service(&self, role: &NodeRole, health: &ReplicationHealth) -> Result<(), CoordinatorError>;

    /// Update the health check of this node's service record.
    async fn report_health(&self, health: &ReplicationHealth) -> Result<(), CoordinatorError>;

    async fn deregister_service(&self) -> Result<(), CoordinatorError>;

    /// One attempt at taking the primary lock. Returns whether we hold it afterwards.
    async fn try_acquire_leadership(&self) -> Result<bool, CoordinatorError>;

    /// Give up the primary lock if we hold it. A no-op otherwise.
    async fn release_leadership(&self) -> Result<(), CoordinatorError>;

    /// Blocks until the lock holder may have changed since `after_index` (or an implementation
    /// specific wait elapses) and returns the current holder. Pass 0 to return immediately.
    async fn watch_leader(&self, after_index: u64) -> Result<LeaderObservation, CoordinatorError>;
}
