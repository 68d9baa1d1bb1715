use tokio::time::{Duration, Instant};

#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    async fn sleep_until(&mut self, deadline: Instant);

    async fn sleep(&mut self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }
}

#[derive(Copy, Clone)]
pub(crate) struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// FixedTicker drives a monitor loop at a fixed period. The first `tick()` returns immediately so
/// a freshly started monitor reports right away. If the caller falls behind by more than a whole
/// period, the missed ticks are skipped rather than delivered in a burst.
pub(crate) struct FixedTicker<C: Clock = RealClock> {
    clock: C,
    period: Duration,
    next_tick: Option<Instant>,
}

impl<C: Clock> FixedTicker<C> {
    pub(crate) fn new(period: Duration, clock: C) -> Self {
        FixedTicker {
            clock,
            period,
            next_tick: None,
        }
    }

    pub(crate) async fn tick(&mut self) {
        let deadline = match self.next_tick {
            None => {
                self.next_tick = Some(self.clock.now() + self.period);
                return;
            }
            Some(deadline) => deadline,
        };

        self.clock.sleep_until(deadline).await;

        let now = self.clock.now();
        let mut next_tick = deadline + self.period;
        if next_tick <= now {
            next_tick = now + self.period;
        }
        self.next_tick = Some(next_tick);
    }
}

#[cfg(test)]
pub(crate) fn mocked_clock() -> (MockClock, MockClockController) {
    let now = Instant::now();
    let (tx, rx) = tokio::sync::watch::channel(now);
    let clock = MockClock { current_time: rx };
    let controller = MockClockController {
        current_time: tx,
        time_of_instantiation: now,
    };

    (clock, controller)
}

#[cfg(test)]
#[derive(Clone)]
pub(crate) struct MockClock {
    current_time: tokio::sync::watch::Receiver<Instant>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.borrow()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        loop {
            let now = *self.current_time.borrow();
            if now >= deadline {
                return;
            }

            if self.current_time.changed().await.is_err() {
                // Controller is gone, time will never move again.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct MockClockController {
    current_time: tokio::sync::watch::Sender<Instant>,
    time_of_instantiation: Instant,
}

#[cfg(test)]
impl MockClockController {
    pub(crate) fn current_time(&self) -> Instant {
        *self.current_time.borrow()
    }

    pub(crate) fn elapsed_time(&self) -> Duration {
        self.current_time() - self.time_of_instantiation
    }

    /// The only promise of mock `sleep_until` is that it returns once `now` is at or past its
    /// deadline, so advance in steps no larger than the period you want to observe.
    pub(crate) fn advance(&mut self, duration: Duration) {
        let new_now = *self.current_time.borrow() + duration;
        let _ = self.current_time.send(new_now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn mock_clock_sleep_until() {
        let tick_duration = Duration::from_millis(500);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let (mut mock_clock, mut controller) = mocked_clock();
        let test_start_time = controller.current_time();

        tokio::spawn(async move {
            let mut next_wake = test_start_time;
            loop {
                next_wake += tick_duration;
                mock_clock.sleep_until(next_wake).await;
                if tx.send(()).is_err() {
                    return;
                }
            }
        });

        controller.advance(tick_duration / 2);
        tokio::time::timeout(Duration::from_millis(20), rx.recv())
            .await
            .expect_err("Expected timeout");

        controller.advance(tick_duration);
        rx.recv().await.unwrap();
        tokio::time::timeout(Duration::from_millis(20), rx.recv())
            .await
            .expect_err("Expected timeout");

        assert_eq!(controller.elapsed_time(), tick_duration * 3 / 2);
    }

    #[tokio::test]
    async fn fixed_ticker_fires_immediately_then_once_per_period() {
        let period = Duration::from_millis(100);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mock_clock, mut controller) = mocked_clock();

        tokio::spawn(async move {
            let mut ticker = FixedTicker::new(period, mock_clock);
            loop {
                ticker.tick().await;
                if tx.send(()).is_err() {
                    return;
                }
            }
        });

        // 1. First tick needs no time to pass.
        rx.recv().await.unwrap();
        tokio::time::timeout(Duration::from_millis(20), rx.recv())
            .await
            .expect_err("Expected timeout");

        // 2. One tick per period.
        for _ in 0..3 {
            controller.advance(period);
            rx.recv().await.unwrap();
            tokio::time::timeout(Duration::from_millis(20), rx.recv())
                .await
                .expect_err("Expected timeout");
        }

        // 3. A big leap yields a single tick, missed ticks are dropped.
        controller.advance(period * 5);
        rx.recv().await.unwrap();
        tokio::time::timeout(Duration::from_millis(20), rx.recv())
            .await
            .expect_err("Expected timeout");
    }
}
