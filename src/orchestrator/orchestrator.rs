use crate::api::{FatalStopReason, LeadershipEvent, NodeRole, ReplicationHealth, ShutdownKind};
use crate::coordination::Coordinator;
use crate::datastore::DataStore;
use crate::orchestrator::role_state::{self, RoleChangeNotifier, RoleListener};
use crate::orchestrator::{FatalStopReceiver, ShutdownSignal};
use crate::switcher::RoleSwitcher;
use crate::timers::{Clock, RealClock};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything the orchestrator listens to.
pub(crate) struct OrchestratorInputs {
    pub(crate) fatal_stop: FatalStopReceiver,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) leadership_rx: mpsc::Receiver<LeadershipEvent>,
    pub(crate) health_rx: mpsc::Receiver<ReplicationHealth>,
}

/// Orchestrator is the single owner of the node's role. It handles one event at a time, so role
/// switches never overlap.
pub(crate) struct Orchestrator<D, Co, C: Clock = RealClock> {
    logger: slog::Logger,
    coordinator: Arc<Co>,
    switcher: RoleSwitcher<D, Co, C>,
    role: NodeRole,
    role_notifier: RoleChangeNotifier,
    last_health: ReplicationHealth,
    // Latest word from the leadership watcher. Reconciled again on every healthy poll, which is
    // how a failed switch gets retried.
    desired_leadership: Option<LeadershipEvent>,
}

impl<D: DataStore, Co: Coordinator, C: Clock> Orchestrator<D, Co, C> {
    pub(crate) fn new(
        logger: slog::Logger,
        coordinator: Arc<Co>,
        switcher: RoleSwitcher<D, Co, C>,
    ) -> (Self, RoleListener) {
        let (role_notifier, role_listener) = role_state::new(NodeRole::Unknown);
        let orchestrator = Orchestrator {
            logger: logger.new(slog::o!("Component" => "orchestrator")),
            coordinator,
            switcher,
            role: NodeRole::Unknown,
            role_notifier,
            last_health: ReplicationHealth {
                output: "waiting for first replication check".to_string(),
                healthy: false,
            },
            desired_leadership: None,
        };

        (orchestrator, role_listener)
    }

    pub(crate) async fn run(mut self, inputs: OrchestratorInputs) -> ShutdownKind {
        let OrchestratorInputs {
            mut fatal_stop,
            mut shutdown,
            mut leadership_rx,
            mut health_rx,
        } = inputs;

        if let Err(e) = self.coordinator.register_service(&self.role, &self.last_health).await {
            slog::warn!(self.logger, "Initial registration failed: {}", e);
        }
        self.switcher.acquisition().arm();

        let mut fatal_stop_closed = false;
        let mut leadership_closed = false;
        let mut health_closed = false;

        let kind = loop {
            tokio::select! {
                biased;

                reason = fatal_stop.recv(), if !fatal_stop_closed => match reason {
                    Some(reason) => break ShutdownKind::Fatal(reason),
                    None => fatal_stop_closed = true,
                },
                _ = &mut shutdown => break ShutdownKind::Graceful,
                event = leadership_rx.recv(), if !leadership_closed => match event {
                    Some(event) => self.handle_leadership(event).await,
                    None => leadership_closed = true,
                },
                health = health_rx.recv(), if !health_closed => match health {
                    Some(health) => self.handle_health(health).await,
                    None => health_closed = true,
                },
            }

            if leadership_closed && health_closed {
                break ShutdownKind::Fatal(FatalStopReason::EventSourcesClosed);
            }
        };

        match &kind {
            ShutdownKind::Graceful => slog::info!(self.logger, "Shutting down"),
            ShutdownKind::Fatal(reason) => slog::crit!(self.logger, "Fatal stop: {}", reason),
        }
        self.shutdown().await;

        kind
    }

    async fn handle_leadership(&mut self, event: LeadershipEvent) {
        slog::debug!(self.logger, "Leadership event {:?} while {}", event, self.role);
        self.desired_leadership = Some(event);
        self.reconcile().await;
    }

    async fn handle_health(&mut self, health: ReplicationHealth) {
        let was_healthy = self.last_health.healthy;
        if let Err(e) = self.coordinator.report_health(&health).await {
            slog::warn!(self.logger, "Failed to report health: {}", e);
        }
        self.last_health = health;

        if !self.last_health.healthy {
            if was_healthy {
                slog::warn!(self.logger, "Data store unhealthy, no longer competing for primary");
            }
            self.switcher.acquisition().disarm();
            return;
        }

        if !was_healthy {
            slog::info!(self.logger, "Data store healthy");
            if self.role != NodeRole::Primary {
                self.switcher.acquisition().arm();
            }
        }
        self.reconcile().await;
    }

    /// Bring the role in line with the latest leadership event. A no-op when they already agree.
    async fn reconcile(&mut self) {
        let desired = match &self.desired_leadership {
            Some(desired) => desired.clone(),
            None => return,
        };

        match desired {
            LeadershipEvent::SelfIsLeader => {
                if self.role == NodeRole::Primary {
                    return;
                }
                match self.switcher.become_primary().await {
                    Ok(()) => {
                        self.set_role(NodeRole::Primary);
                        self.switcher.acquisition().disarm();
                        if let Err(e) = self.coordinator.register_service(&self.role, &self.last_health).await {
                            slog::error!(self.logger, "Promoted, but failed to register as primary: {}", e);
                        }
                    }
                    Err(e) => slog::error!(self.logger, "{}", e),
                }
            }
            LeadershipEvent::Leader(leader) => {
                if self.role == NodeRole::Replica(leader.clone()) {
                    return;
                }
                match self.switcher.become_replica_of(&leader, &self.last_health).await {
                    Ok(()) => self.set_role(NodeRole::Replica(leader)),
                    Err(e) => {
                        if let Some(role) = e.applied_role() {
                            self.set_role(role.clone());
                        }
                        slog::error!(self.logger, "{}", e);
                    }
                }
            }
            LeadershipEvent::NoLeader => {
                if self.last_health.healthy {
                    self.switcher.acquisition().arm();
                }
            }
        }
    }

    fn set_role(&mut self, role: NodeRole) {
        if self.role == role {
            return;
        }
        slog::info!(self.logger, "Role {} -> {}", self.role, role);
        self.role = role.clone();
        self.role_notifier.notify_new_role(role);
    }

    async fn shutdown(&mut self) {
        self.switcher.acquisition().disarm();

        // The lock may be held without the role having caught up, e.g. after a failed promotion.
        if let Err(e) = self.coordinator.release_leadership().await {
            slog::error!(self.logger, "Failed to release primary lock: {}", e);
        }
        if let Err(e) = self.coordinator.deregister_service().await {
            slog::error!(self.logger, "Failed to deregister: {}", e);
        }
    }
}
