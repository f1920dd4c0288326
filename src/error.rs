use std::fmt;

/// Errors returned when handing a job to the engine fails *before*
/// dispatch begins.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// Job queue is full.
    /// Caller must retry or apply backoff.
    Backpressure,

    /// Engine has been shut down.
    Shutdown,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Backpressure =>
                write!(f, "dispatch queue at capacity"),
            DispatchError::Shutdown =>
                write!(f, "dispatch engine is shut down"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Classified reason a gateway send attempt failed.
///
/// The engine retries all classes uniformly; the classification exists so
/// the message log records *why* a target ultimately failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The gateway refused the request (bad target or payload).
    ClientRejected,

    /// No response: network failure, timeout, or service down.
    Unreachable,

    /// The gateway responded with a server-side failure.
    RemoteError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ClientRejected =>
                write!(f, "gateway rejected the request"),
            FailureReason::Unreachable =>
                write!(f, "no response from gateway"),
            FailureReason::RemoteError =>
                write!(f, "gateway returned a server error"),
        }
    }
}

impl std::error::Error for FailureReason {}

/// Failures surfaced by campaign / message-log stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with the given id.
    NotFound,

    /// Backend-specific failure, with its own description.
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound =>
                write!(f, "record not found"),
            StoreError::Backend(message) =>
                write!(f, "store backend error: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Environment configuration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar(name) =>
                write!(f, "required environment variable {name} is not set"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failures while parsing raw target input into phone numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// Input contained no usable phone numbers.
    Empty,

    /// A phone number did not normalize to 10-15 digits.
    InvalidNumber(String),
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Empty =>
                write!(f, "no valid phone numbers provided"),
            TargetError::InvalidNumber(raw) =>
                write!(f, "invalid phone number format: {raw} (expected 10-15 digits)"),
        }
    }
}

impl std::error::Error for TargetError {}
