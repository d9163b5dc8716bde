//! Crate-wide error type.

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::constants::ConstantsError;
pub use crate::manager::ManagerError;
pub use crate::ports::PortsError;
pub use crate::runner::RunnerError;
pub use crate::transport::TransportError;
pub use crate::value::ValueError;

/// Top-level error of the daemon and the `load-ports` command.
#[derive(Error, Debug)]
pub enum VppcfgdError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Constants error: {0}")]
    Constants(#[from] ConstantsError),

    #[error("Manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("Port load error: {0}")]
    Ports(#[from] PortsError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, VppcfgdError>;
