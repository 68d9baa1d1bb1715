use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub fn shutdown_signal() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Triggering or dropping this asks the failover engine to shut down gracefully.
pub struct ShutdownTrigger {
    tx: oneshot::Sender<()>,
}

impl ShutdownTrigger {
    pub fn trigger(self) {
        let _ = self.tx.send(());
    }
}

pub struct ShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = Pin::new(&mut self.rx);

        match rx.poll(cx) {
            Poll::Pending => Poll::Pending,
            // Sent or dropped, both mean shut down.
            Poll::Ready(_) => Poll::Ready(()),
        }
    }
}

/// Returns a signal that fires on SIGINT, or SIGTERM where the platform has it.
pub fn os_shutdown_signal(logger: slog::Logger) -> ShutdownSignal {
    let (trigger, signal) = shutdown_signal();

    tokio::task::spawn(async move {
        wait_for_os_signal(&logger).await;
        slog::info!(logger, "Received shutdown signal");
        trigger.trigger();
    });

    signal
}

#[cfg(unix)]
async fn wait_for_os_signal(logger: &slog::Logger) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            slog::warn!(logger, "Can't listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal(_logger: &slog::Logger) {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_and_drop_both_fire() {
        let (trigger, signal) = shutdown_signal();
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), signal).await.unwrap();

        let (trigger, mut signal) = shutdown_signal();
        tokio::time::timeout(Duration::from_millis(20), &mut signal)
            .await
            .expect_err("Nothing triggered yet");
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(5), signal).await.unwrap();
    }
}
