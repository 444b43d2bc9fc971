use crate::config::ConfigError;
use thiserror::Error;

/// Monitor errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The bounded wait failed for a reason other than signal interruption.
    #[error("wait failed: {0}")]
    Wait(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

/// Convenience type alias for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Process exit status reported by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Stop signal received, final report emitted.
    Success,
    /// Invalid configuration, the loop never started.
    ConfigError,
    /// The bounded wait failed during the loop.
    WaitFailure,
}

impl ExitStatus {
    /// Numeric process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ConfigError => 1,
            Self::WaitFailure => 2,
        }
    }
}

impl From<&MonitorError> for ExitStatus {
    fn from(err: &MonitorError) -> Self {
        match err {
            MonitorError::Wait(_) => Self::WaitFailure,
            _ => Self::ConfigError,
        }
    }
}

impl From<ConfigError> for MonitorError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code())
    }
}
