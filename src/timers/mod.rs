mod stop_signal;
mod time;

pub(crate) use stop_signal::new as stop_signal;
pub(crate) use stop_signal::StopCheck;
pub(crate) use stop_signal::Stopper;
pub(crate) use time::Clock;
pub(crate) use time::FixedTicker;
pub(crate) use time::RealClock;

#[cfg(test)]
pub(crate) use time::{mocked_clock, MockClock, MockClockController};
