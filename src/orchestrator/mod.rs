mod fatal_stop;
#[allow(clippy::module_inception)]
mod orchestrator;
mod role_state;
mod shutdown;

pub(crate) use fatal_stop::fatal_stop_channel;
pub(crate) use fatal_stop::FatalStopReceiver;
pub(crate) use fatal_stop::FatalStopSender;
pub(crate) use orchestrator::Orchestrator;
pub(crate) use orchestrator::OrchestratorInputs;
pub use role_state::RoleListener;
pub use shutdown::os_shutdown_signal;
pub use shutdown::shutdown_signal;
pub use shutdown::ShutdownSignal;
pub use shutdown::ShutdownTrigger;
