use crate::datastore::{DataStore, StatusSection};
use crate::monitor::StatusTable;
use crate::timers::{Clock, FixedTicker, RealClock};
use std::sync::Arc;
use tokio::time::Duration;

const LOADING_FIELD: &str = "loading";
const NOT_LOADING: &str = "0";

#[derive(Debug, Eq, PartialEq)]
enum Readiness {
    Ready,
    Loading(String),
    MissingLoadingField,
}

fn readiness(persistence_report: &str) -> Readiness {
    match StatusTable::parse(persistence_report).get(LOADING_FIELD) {
        Some(NOT_LOADING) => Readiness::Ready,
        Some(other) => Readiness::Loading(other.to_string()),
        None => Readiness::MissingLoadingField,
    }
}

/// ReadinessGate blocks startup until the data store has finished loading its persisted data.
/// It never gives up on its own: transport errors and malformed reports are logged and retried.
pub(crate) struct ReadinessGate<D, C: Clock = RealClock> {
    logger: slog::Logger,
    data_store: Arc<D>,
    ticker: FixedTicker<C>,
}

impl<D: DataStore> ReadinessGate<D> {
    pub(crate) fn new(logger: slog::Logger, data_store: Arc<D>, poll_interval: Duration) -> Self {
        Self::with_clock(logger, data_store, poll_interval, RealClock)
    }
}

impl<D: DataStore, C: Clock> ReadinessGate<D, C> {
    fn with_clock(logger: slog::Logger, data_store: Arc<D>, poll_interval: Duration, clock: C) -> Self {
        ReadinessGate {
            logger: logger.new(slog::o!("Monitor" => "readiness")),
            data_store,
            ticker: FixedTicker::new(poll_interval, clock),
        }
    }

    pub(crate) async fn wait_until_ready(mut self) {
        loop {
            self.ticker.tick().await;

            let report = match self.data_store.status(StatusSection::Persistence).await {
                Ok(report) => report,
                Err(e) => {
                    slog::error!(
                        self.logger,
                        "Could not query {} for persistence status: {}",
                        self.data_store.address(),
                        e
                    );
                    continue;
                }
            };

            match readiness(&report) {
                Readiness::Ready => {
                    slog::info!(self.logger, "Data store is ready to serve traffic");
                    return;
                }
                Readiness::Loading(value) => {
                    slog::info!(
                        self.logger,
                        "Data store is not ready yet, still loading data from disk (loading={})",
                        value
                    );
                }
                Readiness::MissingLoadingField => {
                    slog::error!(self.logger, "Persistence status has no '{}' field", LOADING_FIELD);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_logger, ScriptedDataStore};
    use crate::timers;

    #[test]
    fn classify_persistence_report() {
        assert_eq!(readiness("# Persistence\r\nloading:0\r\n"), Readiness::Ready);
        assert_eq!(
            readiness("# Persistence\r\nloading:1\r\n"),
            Readiness::Loading("1".to_string())
        );
        assert_eq!(
            readiness("# Persistence\r\nrdb_changes_since_last_save:0\r\n"),
            Readiness::MissingLoadingField
        );
    }

    #[tokio::test]
    async fn blocks_while_loading_and_returns_once_loaded() {
        // -- setup --
        let interval = Duration::from_secs(1);
        let data_store = Arc::new(ScriptedDataStore::new());
        data_store.push_status(StatusSection::Persistence, Some("loading:1\r\n"));
        data_store.push_status(StatusSection::Persistence, Some("loading:0\r\n"));
        let (mock_clock, mut controller) = timers::mocked_clock();

        // -- execute --
        let gate = ReadinessGate::with_clock(test_logger(), data_store, interval, mock_clock);
        let mut waiter = tokio::spawn(gate.wait_until_ready());

        // -- verify --
        // First poll happens right away and reports loading.
        tokio::time::timeout(Duration::from_millis(20), &mut waiter)
            .await
            .expect_err("Gate should still be blocked");

        // Second poll sees loading:0.
        controller.advance(interval);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("Gate should open")
            .unwrap();
    }

    #[tokio::test]
    async fn keeps_polling_through_errors_and_missing_fields() {
        // -- setup --
        let interval = Duration::from_secs(1);
        let data_store = Arc::new(ScriptedDataStore::new());
        data_store.push_status(StatusSection::Persistence, None);
        data_store.push_status(StatusSection::Persistence, Some("aof_enabled:0\r\n"));
        data_store.push_status(StatusSection::Persistence, Some("loading:0\r\n"));
        let (mock_clock, mut controller) = timers::mocked_clock();

        // -- execute --
        let gate = ReadinessGate::with_clock(test_logger(), data_store, interval, mock_clock);
        let mut waiter = tokio::spawn(gate.wait_until_ready());

        // -- verify --
        for _ in 0..2 {
            tokio::time::timeout(Duration::from_millis(20), &mut waiter)
                .await
                .expect_err("Gate should still be blocked");
            controller.advance(interval);
        }
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("Gate should open")
            .unwrap();
    }
}
