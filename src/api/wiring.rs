use crate::api::options::SidecarOptionsValidated;
use crate::api::{LeaderInfo, ShutdownKind, SidecarOptions};
use crate::coordination::Coordinator;
use crate::datastore::DataStore;
use crate::monitor::{LeadershipWatcherTask, ReadinessGate, ReplicationMonitorTask, UptimeMonitorTask};
use crate::orchestrator::{self, Orchestrator, OrchestratorInputs, RoleListener, ShutdownSignal};
use crate::switcher::{LeadershipAcquisition, RoleSwitcher};
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::sync::mpsc;

const EVENT_QUEUE_SIZE: usize = 16;

pub struct FailoverEngineConfig<D, Co> {
    pub data_store: Arc<D>,
    pub coordinator: Arc<Co>,
    /// Address other nodes use to replicate from this node's data store. Compared against the
    /// lock holder to tell whether this node is the leader.
    pub announce: LeaderInfo,
    pub logger: slog::Logger,
    pub options: SidecarOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Illegal options for configuring failover engine: {0}")]
    IllegalOptions(String),
}

/// FailoverEngine is the assembled sidecar: readiness gate, monitors and orchestrator. Nothing runs
/// until `run()`.
pub struct FailoverEngine<D: DataStore, Co: Coordinator> {
    logger: slog::Logger,
    data_store: Arc<D>,
    coordinator: Arc<Co>,
    announce: LeaderInfo,
    options: SidecarOptionsValidated,
    orchestrator: Orchestrator<D, Co>,
}

impl<D: DataStore, Co: Coordinator> FailoverEngine<D, Co> {
    pub fn new(config: FailoverEngineConfig<D, Co>) -> Result<(Self, RoleListener), EngineError> {
        let options = SidecarOptionsValidated::try_from(config.options)
            .map_err(|e| EngineError::IllegalOptions(e.to_string()))?;
        let logger = config.logger;

        let acquisition =
            LeadershipAcquisition::new(logger.clone(), config.coordinator.clone(), options.leadership_retry_interval);
        let switcher = RoleSwitcher::new(
            logger.clone(),
            config.data_store.clone(),
            config.coordinator.clone(),
            acquisition,
        );
        let (orchestrator, role_listener) = Orchestrator::new(logger.clone(), config.coordinator.clone(), switcher);

        let engine = FailoverEngine {
            logger,
            data_store: config.data_store,
            coordinator: config.coordinator,
            announce: config.announce,
            options,
            orchestrator,
        };

        Ok((engine, role_listener))
    }

    /// Blocks until the data store is ready, then runs until a fatal stop or until `shutdown`
    /// fires.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> ShutdownKind {
        let gate = ReadinessGate::new(
            self.logger.clone(),
            self.data_store.clone(),
            self.options.readiness_poll_interval,
        );
        tokio::select! {
            _ = gate.wait_until_ready() => {},
            _ = &mut shutdown => {
                slog::info!(self.logger, "Shut down before data store was ready");
                return ShutdownKind::Graceful;
            }
        }

        let (fatal_stop_tx, fatal_stop) = orchestrator::fatal_stop_channel();
        let (leadership_tx, leadership_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (health_tx, health_rx) = mpsc::channel(EVENT_QUEUE_SIZE);

        let monitors = vec![
            UptimeMonitorTask::spawn(
                self.logger.clone(),
                self.data_store.clone(),
                self.options.health_check_interval,
                self.options.allowed_connection_errors,
                fatal_stop_tx,
            ),
            ReplicationMonitorTask::spawn(
                self.logger.clone(),
                self.data_store.clone(),
                self.options.health_check_interval,
                health_tx,
            ),
            LeadershipWatcherTask::spawn(
                self.logger.clone(),
                self.coordinator.clone(),
                self.announce.clone(),
                self.options.leadership_retry_interval,
                leadership_tx,
            ),
        ];

        let inputs = OrchestratorInputs {
            fatal_stop,
            shutdown,
            leadership_rx,
            health_rx,
        };
        let kind = self.orchestrator.run(inputs).await;

        for monitor in monitors {
            monitor.abort();
        }

        kind
    }
}

/// Runs the failover engine until a fatal stop, or until the process is asked to terminate.
pub async fn run_failover_engine<D: DataStore, Co: Coordinator>(
    config: FailoverEngineConfig<D, Co>,
) -> Result<ShutdownKind, EngineError> {
    let (engine, _role_listener) = FailoverEngine::new(config)?;
    let shutdown = orchestrator::os_shutdown_signal(engine.logger.clone());

    Ok(engine.run(shutdown).await)
}
