mod acquisition;
mod role_switcher;

pub(crate) use acquisition::LeadershipAcquisition;
pub(crate) use role_switcher::RoleSwitcher;
pub use role_switcher::SwitchError;
