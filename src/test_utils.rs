use crate::api::{LeaderInfo, NodeRole, ReplicationHealth};
use crate::coordination::{Coordinator, CoordinatorError, LeaderObservation};
use crate::datastore::{DataStore, DataStoreError, ReplicaTarget, StatusSection};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub(crate) fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub(crate) struct TestUtilReceiver<T> {
    rx: mpsc::Receiver<T>,
    timeout: Duration,
}

impl<T: Debug> TestUtilReceiver<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        TestUtilReceiver {
            rx,
            timeout: Duration::from_millis(20),
        }
    }

    pub(crate) async fn recv(&mut self) -> T {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("Unexpected timeout")
            .expect("Expected value")
    }

    pub(crate) async fn assert_no_event(&mut self) {
        if let Ok(Some(value)) = tokio::time::timeout(self.timeout, self.rx.recv()).await {
            panic!("Expected no event, got {:?}", value);
        }
    }
}

/// ScriptedDataStore replays queued status replies per section. Once a section's queue is down
/// to its last reply, that reply is repeated forever.
#[derive(Default)]
pub(crate) struct ScriptedDataStore {
    replies: Mutex<HashMap<StatusSection, VecDeque<Option<String>>>>,
    replicate_calls: Mutex<Vec<ReplicaTarget>>,
    fail_replicate: AtomicBool,
}

impl ScriptedDataStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a reply. `None` is replayed as a transport error.
    pub(crate) fn push_status(&self, section: StatusSection, reply: Option<&str>) {
        self.replies
            .lock()
            .unwrap()
            .entry(section)
            .or_default()
            .push_back(reply.map(String::from));
    }

    pub(crate) fn set_fail_replicate(&self, fail: bool) {
        self.fail_replicate.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn replicate_calls(&self) -> Vec<ReplicaTarget> {
        self.replicate_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DataStore for ScriptedDataStore {
    fn address(&self) -> &str {
        "scripted:6379"
    }

    async fn status(&self, section: StatusSection) -> Result<String, DataStoreError> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.entry(section).or_default();
        let reply = if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().cloned().flatten()
        };

        reply.ok_or_else(|| DataStoreError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted")))
    }

    async fn replicate_from(&self, target: &ReplicaTarget) -> Result<(), DataStoreError> {
        if self.fail_replicate.load(Ordering::SeqCst) {
            return Err(DataStoreError::Server("ERR scripted failure".to_string()));
        }
        self.replicate_calls.lock().unwrap().push(target.clone());
        Ok(())
    }
}

/// FakeCoordinator keeps a catalog keyed by service ID, like the real agent, and lets tests pick
/// the lock holder.
pub(crate) struct FakeCoordinator {
    me: LeaderInfo,
    catalog: Mutex<HashMap<String, (NodeRole, bool)>>,
    register_calls: AtomicUsize,
    health_reports: Mutex<Vec<ReplicationHealth>>,
    acquire_attempts: AtomicUsize,
    grant_lock: AtomicBool,
    fail_register: AtomicBool,
    released: AtomicUsize,
    leader: watch::Sender<(u64, Option<LeaderInfo>)>,
}

impl FakeCoordinator {
    pub(crate) fn new(me: LeaderInfo) -> Self {
        let (leader, _) = watch::channel((1, None));
        FakeCoordinator {
            me,
            catalog: Mutex::new(HashMap::new()),
            register_calls: AtomicUsize::new(0),
            health_reports: Mutex::new(Vec::new()),
            acquire_attempts: AtomicUsize::new(0),
            grant_lock: AtomicBool::new(false),
            fail_register: AtomicBool::new(false),
            released: AtomicUsize::new(0),
            leader,
        }
    }

    pub(crate) fn set_leader(&self, leader: Option<LeaderInfo>) {
        self.leader.send_modify(|(index, holder)| {
            *index += 1;
            *holder = leader;
        });
    }

    pub(crate) fn set_grant_lock(&self, grant: bool) {
        self.grant_lock.store(grant, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn catalog(&self) -> HashMap<String, (NodeRole, bool)> {
        self.catalog.lock().unwrap().clone()
    }

    pub(crate) fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn health_reports(&self) -> Vec<ReplicationHealth> {
        self.health_reports.lock().unwrap().clone()
    }

    pub(crate) fn acquire_attempts(&self) -> usize {
        self.acquire_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn service_id(&self) -> String {
        format!("fake@{}", self.me)
    }
}

#[async_trait::async_trait]
impl Coordinator for FakeCoordinator {
    async fn register_service(&self, role: &NodeRole, health: &ReplicationHealth) -> Result<(), CoordinatorError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        self.catalog
            .lock()
            .unwrap()
            .insert(self.service_id(), (role.clone(), health.healthy));
        Ok(())
    }

    async fn report_health(&self, health: &ReplicationHealth) -> Result<(), CoordinatorError> {
        self.health_reports.lock().unwrap().push(health.clone());
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
        self.acquire_attempts.fetch_add(1, Ordering::SeqCst);
        if self.grant_lock.load(Ordering::SeqCst) {
            self.set_leader(Some(self.me.clone()));
            return Ok(true);
        }
        Ok(false)
    }

    async fn release_leadership(&self) -> Result<(), CoordinatorError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        let held_by_me = self.leader.borrow().1.as_ref() == Some(&self.me);
        if held_by_me {
            self.set_leader(None);
        }
        Ok(())
    }

    async fn watch_leader(&self, after_index: u64) -> Result<LeaderObservation, CoordinatorError> {
        let mut rx = self.leader.subscribe();
        loop {
            let (index, leader) = rx.borrow_and_update().clone();
            if index > after_index {
                return Ok(LeaderObservation { index, leader });
            }
            if rx.changed().await.is_err() {
                return Err(CoordinatorError::Decode("fake coordinator dropped".to_string()));
            }
        }
    }
}
