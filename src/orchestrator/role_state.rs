use crate::api::NodeRole;
use tokio::sync::watch;

pub(super) fn new(initial_role: NodeRole) -> (RoleChangeNotifier, RoleListener) {
    let (snd, rcv) = watch::channel(initial_role);

    (RoleChangeNotifier { snd }, RoleListener { rcv })
}

pub(super) struct RoleChangeNotifier {
    snd: watch::Sender<NodeRole>,
}

impl RoleChangeNotifier {
    pub(super) fn notify_new_role(&self, new_role: NodeRole) {
        let _ = self.snd.send(new_role);
    }
}

/// RoleListener is a read-only view of the role the orchestrator last switched the node into.
#[derive(Clone)]
pub struct RoleListener {
    rcv: watch::Receiver<NodeRole>,
}

impl RoleListener {
    pub fn current(&self) -> NodeRole {
        self.rcv.borrow().clone()
    }

    /// Waits for the next role change. Returns `None` once the orchestrator has exited.
    pub async fn next(&mut self) -> Option<NodeRole> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }
}
