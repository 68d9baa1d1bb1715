use crate::api::{LeaderInfo, LeadershipEvent};
use crate::coordination::{Coordinator, LeaderObservation};
use crate::timers::{Clock, RealClock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// LeadershipWatcherTask follows the primary lock through blocking queries and reports who holds
/// it, relative to this node. Only changes are reported; the first observation always is.
pub(crate) struct LeadershipWatcherTask<Co, C: Clock = RealClock> {
    logger: slog::Logger,
    coordinator: Arc<Co>,
    me: LeaderInfo,
    retry_interval: Duration,
    clock: C,
    leadership_tx: mpsc::Sender<LeadershipEvent>,
}

fn classify(me: &LeaderInfo, leader: Option<LeaderInfo>) -> LeadershipEvent {
    match leader {
        None => LeadershipEvent::NoLeader,
        Some(leader) if &leader == me => LeadershipEvent::SelfIsLeader,
        Some(leader) => LeadershipEvent::Leader(leader),
    }
}

/// Index to pass to the next blocking query. Indexes must only grow; if one goes backwards the
/// coordination service has reset its state and we start over.
fn next_index(previous: u64, observation: &LeaderObservation) -> u64 {
    if observation.index < previous {
        0
    } else {
        observation.index.max(1)
    }
}

impl<Co: Coordinator> LeadershipWatcherTask<Co> {
    pub(crate) fn spawn(
        logger: slog::Logger,
        coordinator: Arc<Co>,
        me: LeaderInfo,
        retry_interval: Duration,
        leadership_tx: mpsc::Sender<LeadershipEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let task = Self::new(logger, coordinator, me, retry_interval, leadership_tx, RealClock);
        tokio::task::spawn(task.run())
    }
}

impl<Co: Coordinator, C: Clock> LeadershipWatcherTask<Co, C> {
    fn new(
        logger: slog::Logger,
        coordinator: Arc<Co>,
        me: LeaderInfo,
        retry_interval: Duration,
        leadership_tx: mpsc::Sender<LeadershipEvent>,
        clock: C,
    ) -> Self {
        LeadershipWatcherTask {
            logger: logger.new(slog::o!("Monitor" => "leadership")),
            coordinator,
            me,
            retry_interval,
            clock,
            leadership_tx,
        }
    }

    async fn run(mut self) {
        let mut index = 0;
        let mut last_event: Option<LeadershipEvent> = None;

        loop {
            let observation = tokio::select! {
                result = self.coordinator.watch_leader(index) => result,
                _ = self.leadership_tx.closed() => return,
            };

            let observation = match observation {
                Ok(observation) => observation,
                Err(e) => {
                    slog::warn!(self.logger, "Leader watch failed, retrying in {:?}: {}", self.retry_interval, e);
                    self.clock.sleep(self.retry_interval).await;
                    index = 0;
                    continue;
                }
            };

            index = next_index(index, &observation);
            let event = classify(&self.me, observation.leader);
            if last_event.as_ref() == Some(&event) {
                continue;
            }

            slog::info!(self.logger, "Leadership changed: {:?}", event);
            last_event = Some(event.clone());
            if self.leadership_tx.send(event).await.is_err() {
                return;
            }
        }
    }
}
