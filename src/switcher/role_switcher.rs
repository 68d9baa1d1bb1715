use crate::api::{LeaderInfo, NodeRole, ReplicationHealth};
use crate::coordination::{Coordinator, CoordinatorError};
use crate::datastore::{DataStore, DataStoreError, ReplicaTarget};
use crate::switcher::LeadershipAcquisition;
use crate::timers::{Clock, RealClock};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("failed to promote data store to primary: {0}")]
    PromoteFailed(#[source] DataStoreError),

    #[error("failed to start replicating from {target}: {source}")]
    ReplicateFailed {
        target: LeaderInfo,
        #[source]
        source: DataStoreError,
    },

    /// The data store did switch. Only publishing the new role failed.
    #[error("switched to {role} but failed to register it: {source}")]
    RegistrationFailed {
        role: NodeRole,
        #[source]
        source: CoordinatorError,
    },
}

impl SwitchError {
    /// Role the data store ended up in despite the error, if the switch itself went through.
    pub fn applied_role(&self) -> Option<&NodeRole> {
        match self {
            SwitchError::PromoteFailed(_) | SwitchError::ReplicateFailed { .. } => None,
            SwitchError::RegistrationFailed { role, .. } => Some(role),
        }
    }
}

/// RoleSwitcher issues role changes against the local data store. The orchestrator is its only
/// caller, so there is never more than one switch in flight.
pub(crate) struct RoleSwitcher<D, Co, C: Clock = RealClock> {
    logger: slog::Logger,
    data_store: Arc<D>,
    coordinator: Arc<Co>,
    acquisition: LeadershipAcquisition<Co, C>,
}

impl<D: DataStore, Co: Coordinator, C: Clock> RoleSwitcher<D, Co, C> {
    pub(crate) fn new(
        logger: slog::Logger,
        data_store: Arc<D>,
        coordinator: Arc<Co>,
        acquisition: LeadershipAcquisition<Co, C>,
    ) -> Self {
        RoleSwitcher {
            logger: logger.new(slog::o!("Component" => "switcher")),
            data_store,
            coordinator,
            acquisition,
        }
    }

    pub(crate) fn acquisition(&mut self) -> &mut LeadershipAcquisition<Co, C> {
        &mut self.acquisition
    }

    /// Stop replicating from anyone. Registration is left as it was.
    pub(crate) async fn become_primary(&mut self) -> Result<(), SwitchError> {
        self.data_store
            .replicate_from(&ReplicaTarget::NoOne)
            .await
            .map_err(SwitchError::PromoteFailed)?;

        slog::info!(self.logger, "Promoted {} to primary", self.data_store.address());
        Ok(())
    }

    /// Replicate from `target`, publish the replica role, and keep competing for the primary lock.
    /// Safe to repeat with the same target.
    pub(crate) async fn become_replica_of(
        &mut self,
        target: &LeaderInfo,
        health: &ReplicationHealth,
    ) -> Result<(), SwitchError> {
        self.data_store
            .replicate_from(&ReplicaTarget::Primary(target.clone()))
            .await
            .map_err(|source| SwitchError::ReplicateFailed {
                target: target.clone(),
                source,
            })?;
        slog::info!(self.logger, "{} now replicates from {}", self.data_store.address(), target);

        let role = NodeRole::Replica(target.clone());
        let registration = self.coordinator.register_service(&role, health).await;

        // The data store already switched, so keep competing either way.
        self.acquisition.arm();

        registration.map_err(|source| SwitchError::RegistrationFailed { role, source })
    }
}
