//! This mod is meant to hold most of the code for the library's client-facing API.
mod options;
mod types;
mod wiring;

pub use options::SidecarOptions;
pub use types::FatalStopReason;
pub use types::LeaderInfo;
pub use types::LeaderInfoParseError;
pub use types::LeadershipEvent;
pub use types::NodeRole;
pub use types::ReplicationHealth;
pub use types::ShutdownKind;
pub use wiring::run_failover_engine;
pub use wiring::EngineError;
pub use wiring::FailoverEngine;
pub use wiring::FailoverEngineConfig;
