mod api;
mod coordination;
mod datastore;
mod monitor;
mod orchestrator;
mod switcher;
#[cfg(test)]
mod test_utils;
mod timers;

pub use api::run_failover_engine;
pub use api::EngineError;
pub use api::FailoverEngine;
pub use api::FailoverEngineConfig;
pub use api::FatalStopReason;
pub use api::LeaderInfo;
pub use api::LeaderInfoParseError;
pub use api::LeadershipEvent;
pub use api::NodeRole;
pub use api::ReplicationHealth;
pub use api::ShutdownKind;
pub use api::SidecarOptions;
pub use coordination::ConsulConfig;
pub use coordination::ConsulCoordinator;
pub use coordination::Coordinator;
pub use coordination::CoordinatorError;
pub use coordination::LeaderObservation;
pub use datastore::DataStore;
pub use datastore::DataStoreError;
pub use datastore::RedisDataStore;
pub use datastore::ReplicaTarget;
pub use datastore::StatusSection;
pub use monitor::StatusTable;
pub use orchestrator::os_shutdown_signal;
pub use orchestrator::shutdown_signal;
pub use orchestrator::RoleListener;
pub use orchestrator::ShutdownSignal;
pub use orchestrator::ShutdownTrigger;
pub use switcher::SwitchError;

// The crate root only declares modules and re-exports. Modules stay private; anything public is
// exported through an individual `pub use`.
