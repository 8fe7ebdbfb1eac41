//! Error types for nrfquick.

use std::io;
use thiserror::Error;

use crate::program::TaskKind;

/// Result type for nrfquick operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for nrfquick operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The serial port could not be opened or is exclusively held.
    #[error("Failed to open connection on {port}: {reason}")]
    Connection {
        /// Port path that failed to open.
        port: String,
        /// Underlying failure description.
        reason: String,
    },

    /// No AT host responded on the port within the negotiation window.
    #[error("No AT host detected on {0}")]
    AtHostNotDetected(String),

    /// None of the candidate serial ports yielded a working transport.
    #[error("No compatible serial port found")]
    NoCompatiblePort,

    /// The device rejected a command with an explicit ERROR token.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No development kit detected before starting a hardware operation.
    #[error("No development kit detected")]
    DeviceNotConnected,

    /// A pipeline task (erase, program or reset) failed.
    #[error("Failed to {} the {label}", .kind.verb())]
    Task {
        /// Which kind of task failed.
        kind: TaskKind,
        /// Human label for the failed step (core name, "device", ...).
        label: String,
    },

    /// Toolkit-level failure outside a specific task.
    #[error("Device toolkit error: {0}")]
    Toolkit(String),

    /// The embedding application requested interruption between steps.
    #[error("Operation interrupted")]
    Interrupted,

    /// Pipeline compiled from inconsistent input data; not expected to be
    /// reachable via normal user action.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when the error is the distinguished trailing-reset failure,
    /// which has its own recovery path (reset-only retry).
    #[must_use]
    pub fn is_reset_failure(&self) -> bool {
        matches!(
            self,
            Self::Task {
                kind: TaskKind::Reset,
                ..
            }
        )
    }
}
