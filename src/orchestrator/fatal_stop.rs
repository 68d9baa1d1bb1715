use crate::api::FatalStopReason;
use tokio::sync::mpsc;

/// Any monitor can hold a clone. Only the first reason is guaranteed to be seen; later signals are
/// dropped once the slot is full, so signalling never blocks the monitor.
#[derive(Clone)]
pub(crate) struct FatalStopSender {
    tx: mpsc::Sender<FatalStopReason>,
}

pub(crate) struct FatalStopReceiver {
    rx: mpsc::Receiver<FatalStopReason>,
}

pub(crate) fn fatal_stop_channel() -> (FatalStopSender, FatalStopReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (FatalStopSender { tx }, FatalStopReceiver { rx })
}

impl FatalStopSender {
    pub(crate) fn signal(&self, reason: FatalStopReason) {
        // Full means a stop is already pending, closed means the orchestrator is already gone.
        let _ = self.tx.try_send(reason);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl FatalStopReceiver {
    /// Resolves with the first stop reason. Returns `None` once every sender is gone.
    pub(crate) async fn recv(&mut self) -> Option<FatalStopReason> {
        self.rx.recv().await
    }
}
