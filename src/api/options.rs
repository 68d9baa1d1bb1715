use std::convert::TryFrom;
use tokio::time::Duration;

/// Tunables of the failover engine. Anything left `None` gets a default.
#[derive(Clone, Debug, Default)]
pub struct SidecarOptions {
    /// Period of the uptime and replication monitors.
    pub health_check_interval: Option<Duration>,
    /// Period of the startup readiness poll.
    pub readiness_poll_interval: Option<Duration>,
    /// Consecutive data store connection errors tolerated before a fatal stop.
    pub allowed_connection_errors: Option<u32>,
    /// Delay between attempts at taking the primary lock, and between failed leader watches.
    pub leadership_retry_interval: Option<Duration>,
}

#[derive(Clone, Debug)]
pub(crate) struct SidecarOptionsValidated {
    pub health_check_interval: Duration,
    pub readiness_poll_interval: Duration,
    pub allowed_connection_errors: u32,
    pub leadership_retry_interval: Duration,
}

impl SidecarOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.health_check_interval.is_zero() {
            return Err("Health check interval must be greater than zero");
        }
        if self.readiness_poll_interval.is_zero() {
            return Err("Readiness poll interval must be greater than zero");
        }
        if self.leadership_retry_interval.is_zero() {
            return Err("Leadership retry interval must be greater than zero");
        }

        Ok(())
    }
}

impl TryFrom<SidecarOptions> for SidecarOptionsValidated {
    type Error = &'static str;

    fn try_from(options: SidecarOptions) -> Result<Self, Self::Error> {
        let values = SidecarOptionsValidated {
            health_check_interval: options.health_check_interval.unwrap_or(Duration::from_secs(5)),
            readiness_poll_interval: options.readiness_poll_interval.unwrap_or(Duration::from_secs(1)),
            allowed_connection_errors: options.allowed_connection_errors.unwrap_or(3),
            leadership_retry_interval: options.leadership_retry_interval.unwrap_or(Duration::from_secs(5)),
        };

        values.validate()?;
        Ok(values)
    }
}
