//! Monitors observe the local data store and the coordination service. None of them decide
//! anything; they only push what they see to the orchestrator.
mod leadership_watcher;
mod readiness;
mod replication;
mod status_table;
mod uptime;

pub(crate) use leadership_watcher::LeadershipWatcherTask;
pub(crate) use readiness::ReadinessGate;
pub(crate) use replication::ReplicationMonitorTask;
pub use status_table::StatusTable;
pub(crate) use uptime::UptimeMonitorTask;
