use thiserror::Error;

use crate::platform::Role;

pub type Result<T> = std::result::Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    #[error("profile role {0} is not supported by this adapter")]
    UnsupportedRole(Role),

    #[error("role switch failed: {0}")]
    RoleSwitch(String),

    #[error("speech engine unavailable: {0}")]
    SpeechUnavailable(String),

    #[error("D-Bus error: {0}")]
    DBus(#[from] dbus::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
