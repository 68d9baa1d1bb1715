use primary_keeper::{
    Coordinator, CoordinatorError, DataStore, DataStoreError, LeaderInfo, LeaderObservation, NodeRole,
    ReplicaTarget, ReplicationHealth, StatusSection,
};
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::time::Duration;

pub fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

struct DataStoreState {
    loading: bool,
    // `None` means the server section is unreachable.
    uptime: Option<u64>,
    replicating_from: ReplicaTarget,
    replicate_calls: Vec<ReplicaTarget>,
}

/// InMemoryDataStore pretends to be a data store process whose status the test steers.
pub struct InMemoryDataStore {
    state: Mutex<DataStoreState>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        InMemoryDataStore {
            state: Mutex::new(DataStoreState {
                loading: false,
                uptime: Some(1),
                replicating_from: ReplicaTarget::NoOne,
                replicate_calls: Vec::new(),
            }),
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.lock().unwrap().loading = loading;
    }

    pub fn set_uptime(&self, uptime: Option<u64>) {
        self.state.lock().unwrap().uptime = uptime;
    }

    pub fn replicate_calls(&self) -> Vec<ReplicaTarget> {
        self.state.lock().unwrap().replicate_calls.clone()
    }
}

#[async_trait::async_trait]
impl DataStore for InMemoryDataStore {
    fn address(&self) -> &str {
        "in-memory:6379"
    }

    async fn status(&self, section: StatusSection) -> Result<String, DataStoreError> {
        let state = self.state.lock().unwrap();
        match section {
            StatusSection::Persistence => Ok(format!(
                "# Persistence\r\nloading:{}\r\n",
                if state.loading { 1 } else { 0 }
            )),
            StatusSection::Server => match state.uptime {
                Some(uptime) => Ok(format!("# Server\r\nuptime_in_seconds:{}\r\n", uptime)),
                None => Err(DataStoreError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "in-memory data store is down",
                ))),
            },
            StatusSection::Replication => Ok(match &state.replicating_from {
                ReplicaTarget::NoOne => "# Replication\r\nrole:master\r\n".to_string(),
                ReplicaTarget::Primary(primary) => format!(
                    "# Replication\r\nrole:slave\r\nmaster_host:{}\r\nmaster_port:{}\r\n",
                    primary.address, primary.port
                ),
            }),
        }
    }

    async fn replicate_from(&self, target: &ReplicaTarget) -> Result<(), DataStoreError> {
        let mut state = self.state.lock().unwrap();
        state.replicating_from = target.clone();
        state.replicate_calls.push(target.clone());
        Ok(())
    }
}

/// InMemoryCoordinator is a single-node stand-in for the coordination service. The lock can be
/// granted to this node or handed to someone else by the test.
pub struct InMemoryCoordinator {
    me: LeaderInfo,
    catalog: Mutex<HashMap<String, (NodeRole, bool)>>,
    grant_lock: Mutex<bool>,
    leader: watch::Sender<(u64, Option<LeaderInfo>)>,
}

impl InMemoryCoordinator {
    pub fn new(me: LeaderInfo) -> Self {
        let (leader, _) = watch::channel((1, None));
        InMemoryCoordinator {
            me,
            catalog: Mutex::new(HashMap::new()),
            grant_lock: Mutex::new(false),
            leader,
        }
    }

    pub fn set_grant_lock(&self, grant: bool) {
        *self.grant_lock.lock().unwrap() = grant;
    }

    pub fn hand_lock_to(&self, holder: Option<LeaderInfo>) {
        self.leader.send_modify(|(index, leader)| {
            *index += 1;
            *leader = holder;
        });
    }

    pub fn catalog(&self) -> HashMap<String, (NodeRole, bool)> {
        self.catalog.lock().unwrap().clone()
    }

    fn service_id(&self) -> String {
        format!("in-memory@{}", self.me)
    }
}

#[async_trait::async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn register_service(&self, role: &NodeRole, health: &ReplicationHealth) -> Result<(), CoordinatorError> {
        self.catalog
            .lock()
            .unwrap()
            .insert(self.service_id(), (role.clone(), health.healthy));
        Ok(())
    }

    async fn report_health(&self, health: &ReplicationHealth) -> Result<(), CoordinatorError> {
        if let Some((_, healthy)) = self.catalog.lock().unwrap().get_mut(&self.service_id()) {
            *healthy = health.healthy;
        }
        Ok(())
    }

    async fn deregister_service(&self) -> Result<(), CoordinatorError> {
        self.catalog.lock().unwrap().remove(&self.service_id());
        Ok(())
    }

    async fn try_acquire_leadership(&self) -> Result<bool, CoordinatorError> {
        let grant = *self.grant_lock.lock().unwrap();
        let held_by_other = matches!(&self.leader.borrow().1, Some(holder) if holder != &self.me);
        if !grant || held_by_other {
            return Ok(false);
        }

        let held_by_me = self.leader.borrow().1.as_ref() == Some(&self.me);
        if !held_by_me {
            self.hand_lock_to(Some(self.me.clone()));
        }
        Ok(true)
    }

    async fn release_leadership(&self) -> Result<(), CoordinatorError> {
        let held_by_me = self.leader.borrow().1.as_ref() == Some(&self.me);
        if held_by_me {
            self.hand_lock_to(None);
        }
        Ok(())
    }

    async fn watch_leader(&self, after_index: u64) -> Result<LeaderObservation, CoordinatorError> {
        let mut rx = self.leader.subscribe();
        let wait = async {
            loop {
                if rx.borrow_and_update().0 > after_index {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        // Bounded like a blocking query.
        let _ = tokio::time::timeout(Duration::from_millis(200), wait).await;

        let (index, leader) = self.leader.borrow().clone();
        Ok(LeaderObservation { index, leader })
    }
}
