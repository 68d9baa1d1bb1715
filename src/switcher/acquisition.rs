use crate::coordination::Coordinator;
use crate::timers::{self, Clock, RealClock, StopCheck, Stopper};
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::time::Duration;

/// LeadershipAcquisition owns at most one background task competing for the primary lock.
///
/// The task retries until it wins the lock or is stopped. `arm()` while a task is still running is
/// a no-op, and `disarm()` (or dropping this handle) stops the task.
pub(crate) struct LeadershipAcquisition<Co, C: Clock = RealClock> {
    logger: slog::Logger,
    coordinator: Arc<Co>,
    retry_range: RangeInclusive<Duration>,
    clock: C,
    task: Option<Stopper>,
}

struct AcquisitionTask<Co, C: Clock> {
    logger: slog::Logger,
    coordinator: Arc<Co>,
    retry_range: RangeInclusive<Duration>,
    clock: C,
    stop_check: StopCheck,
}

/// Retries are spread over `[interval, interval * 1.1]` so nodes that lost the same primary
/// don't hammer the lock in lockstep.
fn jittered_range(retry_interval: Duration) -> RangeInclusive<Duration> {
    retry_interval..=retry_interval + retry_interval / 10
}

impl<Co: Coordinator> LeadershipAcquisition<Co> {
    pub(crate) fn new(logger: slog::Logger, coordinator: Arc<Co>, retry_interval: Duration) -> Self {
        Self::with_clock(logger, coordinator, jittered_range(retry_interval), RealClock)
    }
}

impl<Co: Coordinator, C: Clock> LeadershipAcquisition<Co, C> {
    pub(crate) fn with_clock(
        logger: slog::Logger,
        coordinator: Arc<Co>,
        retry_range: RangeInclusive<Duration>,
        clock: C,
    ) -> Self {
        LeadershipAcquisition {
            logger: logger.new(slog::o!("Task" => "leadership-acquisition")),
            coordinator,
            retry_range,
            clock,
            task: None,
        }
    }

    pub(crate) fn arm(&mut self) {
        if self.is_armed() {
            return;
        }

        let (stopper, stop_check) = timers::stop_signal();
        let task = AcquisitionTask {
            logger: self.logger.clone(),
            coordinator: self.coordinator.clone(),
            retry_range: self.retry_range.clone(),
            clock: self.clock.clone(),
            stop_check,
        };
        tokio::task::spawn(task.run());
        self.task = Some(stopper);
        slog::debug!(self.logger, "Armed");
    }

    pub(crate) fn disarm(&mut self) {
        if self.task.take().is_some() {
            slog::debug!(self.logger, "Disarmed");
        }
    }

    /// True while a task is still competing for the lock.
    pub(crate) fn is_armed(&self) -> bool {
        match &self.task {
            Some(stopper) => !stopper.is_task_finished(),
            None => false,
        }
    }
}

impl<Co: Coordinator, C: Clock> AcquisitionTask<Co, C> {
    fn retry_delay(&self) -> Duration {
        rand::thread_rng().gen_range(self.retry_range.clone())
    }

    async fn run(mut self) {
        loop {
            let attempt = tokio::select! {
                _ = self.stop_check.stopped() => return,
                attempt = self.coordinator.try_acquire_leadership() => attempt,
            };

            match attempt {
                Ok(true) => {
                    slog::info!(self.logger, "Acquired primary lock");
                    return;
                }
                Ok(false) => {
                    slog::debug!(self.logger, "Primary lock is held elsewhere");
                }
                Err(e) => {
                    slog::warn!(self.logger, "Failed to acquire primary lock: {}", e);
                }
            }

            let delay = self.retry_delay();
            tokio::select! {
                _ = self.stop_check.stopped() => return,
                _ = self.clock.sleep(delay) => {},
            }
        }
    }
}
