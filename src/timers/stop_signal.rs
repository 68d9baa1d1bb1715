use tokio::sync::watch;

/// Stopper is held by whoever owns a background task. Dropping it tells the task to exit.
pub(crate) struct Stopper {
    stop_signal: watch::Sender<bool>,
}

/// StopCheck is held by the background task itself.
pub(crate) struct StopCheck {
    stop_signal: watch::Receiver<bool>,
}

impl Stopper {
    /// Returns true once the task holding the paired `StopCheck` has exited on its own.
    pub(crate) fn is_task_finished(&self) -> bool {
        self.stop_signal.is_closed()
    }
}

impl Drop for Stopper {
    fn drop(&mut self) {
        let _ = self.stop_signal.send(true);
    }
}

impl StopCheck {
    /// Resolves once the paired `Stopper` is dropped.
    pub(crate) async fn stopped(&mut self) {
        loop {
            let stop = *self.stop_signal.borrow();
            if stop {
                return;
            }
            if self.stop_signal.changed().await.is_err() {
                return;
            }
        }
    }
}

pub(crate) fn new() -> (Stopper, StopCheck) {
    let (tx, rx) = watch::channel(false);

    (Stopper { stop_signal: tx }, StopCheck { stop_signal: rx })
}
