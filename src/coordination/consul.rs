use crate::api::{LeaderInfo, NodeRole, ReplicationHealth};
use crate::coordination::{Coordinator, CoordinatorError, LeaderObservation};
use crate::timers::{self, StopCheck, Stopper};
use base64::Engine;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Duration;

const MIN_CHECK_TTL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct ConsulConfig {
    /// Base URL of the local agent, e.g. `http://127.0.0.1:8500`.
    pub http_addr: String,
    pub token: Option<String>,
    pub service_name: String,
    /// KV key whose lock holder is the primary.
    pub lock_key: String,
    /// Where peers reach this node's data store. Written as the lock value.
    pub announce: LeaderInfo,
    pub check_ttl: Duration,
    pub session_ttl: Duration,
    /// How long a leader watch blocks on the agent before returning unchanged.
    pub watch_wait: Duration,
    pub request_timeout: Duration,
}

impl ConsulConfig {
    pub fn new(http_addr: impl Into<String>, service_name: impl Into<String>, announce: LeaderInfo) -> Self {
        let service_name = service_name.into();
        ConsulConfig {
            http_addr: http_addr.into(),
            token: None,
            lock_key: format!("{}/leader", service_name),
            service_name,
            announce,
            check_ttl: Duration::from_secs(10),
            session_ttl: Duration::from_secs(15),
            watch_wait: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the check TTL so the agent tolerates one missed health poll before the check goes
    /// critical on its own. Never below the 1s minimum the agent accepts.
    pub fn set_check_ttl_for_interval(&mut self, health_check_interval: Duration) {
        self.check_ttl = health_check_interval
            .checked_mul(2)
            .unwrap_or(Duration::MAX)
            .max(MIN_CHECK_TTL);
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.service_name.is_empty() {
            return Err("Service name must not be empty");
        }
        if self.lock_key.is_empty() {
            return Err("Lock key must not be empty");
        }
        // Consul rejects session TTLs below 10s.
        if self.session_ttl < Duration::from_secs(10) {
            return Err("Session TTL must be at least 10s");
        }
        if self.check_ttl < MIN_CHECK_TTL {
            return Err("Health check TTL must be at least 1s");
        }
        if self.watch_wait == Duration::from_secs(0) || self.request_timeout == Duration::from_secs(0) {
            return Err("Watch wait and request timeout must be non-zero");
        }

        Ok(())
    }
}

/// ConsulCoordinator implements leader election with a session-bound KV lock and service
/// discovery with a TTL-checked agent service registration.
pub struct ConsulCoordinator {
    logger: slog::Logger,
    config: ConsulConfig,
    http: reqwest::Client,
    service_id: String,
    check_id: String,
    session: Mutex<Option<Session>>,
}

struct Session {
    id: String,
    // Renews the session until dropped.
    _renewal: Stopper,
}

impl ConsulCoordinator {
    pub fn new(logger: slog::Logger, config: ConsulConfig) -> Result<Self, CoordinatorError> {
        config.validate().map_err(CoordinatorError::InvalidConfig)?;

        let http = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        let service_id = format!("{}@{}", config.service_name, config.announce);
        let check_id = format!("service:{}", service_id);

        Ok(ConsulCoordinator {
            logger: logger.new(slog::o!("Coordinator" => config.http_addr.clone())),
            config,
            http,
            service_id,
            check_id,
            session: Mutex::new(None),
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.http_addr.trim_end_matches('/'), path)
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.with_token(self.http.put(self.url(path)))
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.with_token(self.http.get(self.url(path)))
    }

    fn with_token(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.header("X-Consul-Token", token),
            None => request,
        }
    }

    async fn ensure_session(&self, slot: &mut Option<Session>) -> Result<String, CoordinatorError> {
        if let Some(session) = slot.as_ref() {
            return Ok(session.id.clone());
        }

        let request = SessionRequest {
            name: format!("{} leadership", self.service_id),
            ttl: consul_duration(self.config.session_ttl),
            behavior: "delete",
            lock_delay: "1s",
        };
        let response = ok_or_status(self.put("session/create").json(&request).send().await?).await?;
        let created: SessionCreated = response
            .json()
            .await
            .map_err(|e| CoordinatorError::Decode(e.to_string()))?;

        slog::info!(self.logger, "Created leadership session {}", created.id);
        let renewal = self.spawn_session_renewal(&created.id);
        slot.replace(Session {
            id: created.id.clone(),
            _renewal: renewal,
        });

        Ok(created.id)
    }

    fn spawn_session_renewal(&self, session_id: &str) -> Stopper {
        let (stopper, stop_check) = timers::stop_signal();
        let task = SessionRenewalTask {
            logger: self.logger.new(slog::o!("Session" => session_id.to_string())),
            request: self.put(&format!("session/renew/{}", session_id)),
            interval: self.config.session_ttl / 2,
            stop_check,
        };
        tokio::spawn(task.run());

        stopper
    }
}

#[async_trait::async_trait]
impl Coordinator for ConsulCoordinator {
    async fn register_service(&self, role: &NodeRole, health: &ReplicationHealth) -> Result<(), CoordinatorError> {
        let registration = ServiceRegistration {
            id: &self.service_id,
            name: &self.config.service_name,
            tags: vec![role.tag()],
            address: &self.config.announce.address,
            port: self.config.announce.port,
            check: TtlCheck {
                check_id: &self.check_id,
                name: "replication status",
                ttl: consul_duration(self.config.check_ttl),
                status: check_status(health),
                notes: &health.output,
                deregister_critical_service_after: "1m",
            },
        };

        ok_or_status(self.put("agent/service/register").json(&registration).send().await?).await?;
        slog::info!(self.logger, "Registered service {} as {}", self.service_id, role.tag());
        Ok(())
    }

    async fn report_health(&self, health: &ReplicationHealth) -> Result<(), CoordinatorError> {
        let update = CheckUpdate {
            status: check_status(health),
            output: &health.output,
        };

        ok_or_status(
            self.put(&format!("agent/check/update/{}", self.check_id))
                .json(&update)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn deregister_service(&self) -> Result<(), CoordinatorError> {
        ok_or_status(
            self.put(&format!("agent/service/deregister/{}", self.service_id))
                .send()
                .await?,
        )
        .await?;
        slog::info!(self.logger, "Deregistered service {}", self.service_id);
        Ok(())
    }

    async fn try_acquire_leadership(&self) -> Result<bool, CoordinatorError> {
        let mut slot = self.session.lock().await;
        let session_id = self.ensure_session(&mut slot).await?;

        let response = self
            .put(&format!("kv/{}", self.config.lock_key))
            .query(&[("acquire", session_id.as_str())])
            .body(self.config.announce.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            // Most likely our session expired. Start over with a fresh one next attempt.
            slot.take();
            return Err(status_error(response).await);
        }

        response
            .json::<bool>()
            .await
            .map_err(|e| CoordinatorError::Decode(e.to_string()))
    }

    async fn release_leadership(&self) -> Result<(), CoordinatorError> {
        let session = match self.session.lock().await.take() {
            Some(session) => session,
            None => return Ok(()),
        };

        let released = self
            .put(&format!("kv/{}", self.config.lock_key))
            .query(&[("release", session.id.as_str())])
            .send()
            .await;
        let destroyed = self.put(&format!("session/destroy/{}", session.id)).send().await;

        ok_or_status(released?).await?;
        ok_or_status(destroyed?).await?;
        slog::info!(self.logger, "Released leadership session {}", session.id);
        Ok(())
    }

    async fn watch_leader(&self, after_index: u64) -> Result<LeaderObservation, CoordinatorError> {
        let mut request = self.get(&format!("kv/{}", self.config.lock_key));
        if after_index > 0 {
            request = request
                .query(&[
                    ("index", after_index.to_string()),
                    ("wait", consul_duration(self.config.watch_wait)),
                ])
                .timeout(self.config.watch_wait + self.config.request_timeout);
        }
        let response = request.send().await?;

        let index = response
            .headers()
            .get("X-Consul-Index")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| CoordinatorError::Decode("missing X-Consul-Index header".to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(LeaderObservation { index, leader: None });
        }

        let entries: Vec<KvEntry> = ok_or_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CoordinatorError::Decode(e.to_string()))?;

        Ok(LeaderObservation {
            index,
            leader: leader_from_entries(entries)?,
        })
    }
}

struct SessionRenewalTask {
    logger: slog::Logger,
    request: RequestBuilder,
    interval: Duration,
    stop_check: StopCheck,
}

impl SessionRenewalTask {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.stop_check.stopped() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let request = match self.request.try_clone() {
                Some(request) => request,
                None => return,
            };
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    slog::debug!(self.logger, "Renewed session");
                }
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    slog::warn!(self.logger, "Session is gone, stopping renewal");
                    return;
                }
                Ok(response) => {
                    slog::warn!(self.logger, "Session renewal answered {}", response.status());
                }
                Err(e) => {
                    slog::warn!(self.logger, "Session renewal failed: {}", e);
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Tags")]
    tags: Vec<&'a str>,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Check")]
    check: TtlCheck<'a>,
}

#[derive(Serialize)]
struct TtlCheck<'a> {
    #[serde(rename = "CheckID")]
    check_id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "TTL")]
    ttl: String,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Notes")]
    notes: &'a str,
    #[serde(rename = "DeregisterCriticalServiceAfter")]
    deregister_critical_service_after: &'static str,
}

#[derive(Serialize)]
struct CheckUpdate<'a> {
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Output")]
    output: &'a str,
}

#[derive(Serialize)]
struct SessionRequest {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "TTL")]
    ttl: String,
    #[serde(rename = "Behavior")]
    behavior: &'static str,
    #[serde(rename = "LockDelay")]
    lock_delay: &'static str,
}

#[derive(Deserialize)]
struct SessionCreated {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Deserialize)]
struct KvEntry {
    #[serde(rename = "Session", default)]
    session: Option<String>,
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

fn check_status(health: &ReplicationHealth) -> &'static str {
    if health.healthy {
        "passing"
    } else {
        "critical"
    }
}

fn consul_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// The lock is held only if the key carries a session. Its value is the holder's announce address.
fn leader_from_entries(entries: Vec<KvEntry>) -> Result<Option<LeaderInfo>, CoordinatorError> {
    let value = match entries.into_iter().find(|entry| entry.session.is_some()) {
        Some(KvEntry { value: Some(value), .. }) => value,
        _ => return Ok(None),
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| CoordinatorError::Decode(e.to_string()))?;
    let text = String::from_utf8(decoded).map_err(|e| CoordinatorError::Decode(e.to_string()))?;
    let leader = text
        .parse::<LeaderInfo>()
        .map_err(|e| CoordinatorError::Decode(e.to_string()))?;

    Ok(Some(leader))
}

async fn ok_or_status(response: Response) -> Result<Response, CoordinatorError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(status_error(response).await)
    }
}

async fn status_error(response: Response) -> CoordinatorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CoordinatorError::Status { status, body }
}
