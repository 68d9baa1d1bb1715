use crate::api::ReplicationHealth;
use crate::datastore::{DataStore, StatusSection};
use crate::timers::{Clock, FixedTicker, RealClock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// ReplicationMonitorTask reports the replication section of the data store once per tick. It
/// makes no decisions: a failed poll is reported as an unhealthy event, never skipped.
pub(crate) struct ReplicationMonitorTask<D, C: Clock = RealClock> {
    logger: slog::Logger,
    data_store: Arc<D>,
    ticker: FixedTicker<C>,
    health_tx: mpsc::Sender<ReplicationHealth>,
}

impl<D: DataStore> ReplicationMonitorTask<D> {
    pub(crate) fn spawn(
        logger: slog::Logger,
        data_store: Arc<D>,
        interval: Duration,
        health_tx: mpsc::Sender<ReplicationHealth>,
    ) -> tokio::task::JoinHandle<()> {
        let task = Self::new(logger, data_store, interval, health_tx, RealClock);
        tokio::task::spawn(task.run())
    }
}

impl<D: DataStore, C: Clock> ReplicationMonitorTask<D, C> {
    fn new(
        logger: slog::Logger,
        data_store: Arc<D>,
        interval: Duration,
        health_tx: mpsc::Sender<ReplicationHealth>,
        clock: C,
    ) -> Self {
        ReplicationMonitorTask {
            logger: logger.new(slog::o!("Monitor" => "replication")),
            data_store,
            ticker: FixedTicker::new(interval, clock),
            health_tx,
        }
    }

    async fn poll(&self) -> ReplicationHealth {
        match self.data_store.status(StatusSection::Replication).await {
            Ok(output) => ReplicationHealth { output, healthy: true },
            Err(e) => {
                slog::warn!(self.logger, "Replication status poll failed: {}", e);
                ReplicationHealth {
                    output: format!("Can't connect to data store running on {}", self.data_store.address()),
                    healthy: false,
                }
            }
        }
    }

    async fn run(mut self) {
        loop {
            self.ticker.tick().await;

            let health = self.poll().await;
            if self.health_tx.send(health).await.is_err() {
                slog::debug!(self.logger, "Health receiver is gone, exiting");
                return;
            }
        }
    }
}
