use crate::api::FatalStopReason;
use crate::datastore::{DataStore, DataStoreError, StatusSection};
use crate::monitor::StatusTable;
use crate::orchestrator::FatalStopSender;
use crate::timers::{Clock, FixedTicker, RealClock};
use std::sync::Arc;
use tokio::time::Duration;

const UPTIME_FIELD: &str = "uptime_in_seconds";

/// Outcome of one uptime poll.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum UptimeVerdict {
    Up(u64),
    /// Transport failure still within the tolerated number of consecutive errors.
    ConnectionError { consecutive: u32 },
    /// The report had no usable uptime. Nothing was recorded.
    Unreadable,
    Stop(FatalStopReason),
}

/// UptimeTracker holds the state of the uptime monitor. It is owned by the monitor task alone.
#[derive(Debug)]
pub(crate) struct UptimeTracker {
    last_uptime: u64,
    consecutive_errors: u32,
    allowed_errors: u32,
}

impl UptimeTracker {
    pub(crate) fn new(allowed_errors: u32) -> Self {
        UptimeTracker {
            last_uptime: 0,
            consecutive_errors: 0,
            allowed_errors,
        }
    }

    pub(crate) fn observe(&mut self, poll: Result<&str, &DataStoreError>) -> UptimeVerdict {
        let report = match poll {
            Ok(report) => report,
            Err(_) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors > self.allowed_errors {
                    return UptimeVerdict::Stop(FatalStopReason::TooManyConnectionErrors {
                        consecutive: self.consecutive_errors,
                    });
                }
                return UptimeVerdict::ConnectionError {
                    consecutive: self.consecutive_errors,
                };
            }
        };
        self.consecutive_errors = 0;

        let uptime = match StatusTable::parse(report)
            .get(UPTIME_FIELD)
            .and_then(|value| value.trim().parse::<u64>().ok())
        {
            Some(uptime) => uptime,
            None => return UptimeVerdict::Unreadable,
        };

        if uptime < self.last_uptime {
            return UptimeVerdict::Stop(FatalStopReason::UptimeRegressed {
                previous: self.last_uptime,
                current: uptime,
            });
        }

        self.last_uptime = uptime;
        UptimeVerdict::Up(uptime)
    }
}

/// UptimeMonitorTask polls server status forever. It only ever detects: every fatal verdict is
/// handed to the fatal stop channel and the task keeps ticking.
pub(crate) struct UptimeMonitorTask<D, C: Clock = RealClock> {
    logger: slog::Logger,
    data_store: Arc<D>,
    tracker: UptimeTracker,
    ticker: FixedTicker<C>,
    fatal_stop: FatalStopSender,
}

impl<D: DataStore> UptimeMonitorTask<D> {
    pub(crate) fn spawn(
        logger: slog::Logger,
        data_store: Arc<D>,
        interval: Duration,
        allowed_errors: u32,
        fatal_stop: FatalStopSender,
    ) -> tokio::task::JoinHandle<()> {
        let task = Self::new(logger, data_store, interval, allowed_errors, fatal_stop, RealClock);
        tokio::task::spawn(task.run())
    }
}

impl<D: DataStore, C: Clock> UptimeMonitorTask<D, C> {
    fn new(
        logger: slog::Logger,
        data_store: Arc<D>,
        interval: Duration,
        allowed_errors: u32,
        fatal_stop: FatalStopSender,
        clock: C,
    ) -> Self {
        UptimeMonitorTask {
            logger: logger.new(slog::o!("Monitor" => "uptime")),
            data_store,
            tracker: UptimeTracker::new(allowed_errors),
            ticker: FixedTicker::new(interval, clock),
            fatal_stop,
        }
    }

    async fn run(mut self) {
        loop {
            self.ticker.tick().await;
            if self.fatal_stop.is_closed() {
                return;
            }

            let poll = self.data_store.status(StatusSection::Server).await;
            let verdict = self.tracker.observe(poll.as_deref());

            match verdict {
                UptimeVerdict::Up(uptime) => {
                    slog::debug!(self.logger, "Data store up for {}s", uptime);
                }
                UptimeVerdict::ConnectionError { consecutive } => {
                    if let Err(e) = &poll {
                        slog::warn!(
                            self.logger,
                            "Can't reach data store on {} ({} in a row): {}",
                            self.data_store.address(),
                            consecutive,
                            e
                        );
                    }
                }
                UptimeVerdict::Unreadable => {
                    slog::warn!(self.logger, "Server status has no usable '{}', skipping", UPTIME_FIELD);
                }
                UptimeVerdict::Stop(reason) => {
                    slog::crit!(self.logger, "Requesting fatal stop: {}", reason);
                    self.fatal_stop.signal(reason);
                }
            }
        }
    }
}
