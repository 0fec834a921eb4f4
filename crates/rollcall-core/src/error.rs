//! Error types shared by every rollcall component.
//!
//! `RollcallError` is the single error enum for the capture-buffer-dispatch
//! pipeline. Its variants follow the failure taxonomy of the device:
//!
//! - **Reader**: `ReadTimeout`, `ReadAuthFailure`, `ReadBlockFailure`,
//!   `ReadValidationFailure`
//! - **Buffer**: `BufferFull`, `DrainExceedsOccupancy`
//! - **Dispatch**: `DispatchHttpError`, `DispatchProtocolMismatch`
//! - **Connectivity**: `ProbeFailure`
//! - **Coordination**: `Busy`
//! - **Setup**: `Configuration`, `Serialization`
//!
//! Hardware-facing capability traits report low-level problems through
//! `anyhow::Error`; drivers describe them with [`DriverError`] so that the
//! kind of failure survives the conversion.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Communication,
    Timeout,
    Authentication,
    Hardware,
    InvalidParameter,
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::Authentication => "authentication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Which hop of the dispatch exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchHop {
    /// The initial POST of the command envelope.
    Submit,
    /// The GET against the redirect target.
    Redirect,
}

impl std::fmt::Display for DispatchHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchHop::Submit => write!(f, "submit"),
            DispatchHop::Redirect => write!(f, "redirect"),
        }
    }
}

/// Convenience alias for results using the pipeline error type.
pub type RollcallResult<T> = std::result::Result<T, RollcallError>;

/// Primary error type for the capture-buffer-dispatch pipeline.
///
/// # Error Categories
///
/// 1. **Reader errors** - a single tap failed. Counted toward the reader
///    failure ceiling; the next tap starts clean.
/// 2. **Buffer errors** - `BufferFull` is cleared by a flush.
///    `DrainExceedsOccupancy` is a caller bug and is never retried.
/// 3. **Dispatch errors** - retried inside the dispatch retry policy, then
///    reported; the buffer is left untouched.
/// 4. **Connectivity errors** - `ProbeFailure` counts toward the probe
///    ceiling which latches the reader off.
#[derive(Error, Debug)]
pub enum RollcallError {
    /// A bounded reader wait (presence or serial read) elapsed.
    #[error("Card read timed out during {stage}")]
    ReadTimeout { stage: &'static str },

    /// Authentication against a data block was rejected.
    #[error("Card authentication failed on block {block}: {message}")]
    ReadAuthFailure { block: u8, message: String },

    /// The block was authenticated but reading it failed.
    #[error("Card block {block} could not be read: {message}")]
    ReadBlockFailure { block: u8, message: String },

    /// A data block yielded no printable content.
    #[error("Card block {block} is empty after cleaning")]
    ReadValidationFailure { block: u8 },

    /// The record buffer is at capacity.
    #[error("Record buffer full ({capacity} records)")]
    BufferFull { capacity: usize },

    /// `commit_drain` was asked to remove more records than are buffered.
    #[error("Cannot drain {requested} records, only {occupied} buffered")]
    DrainExceedsOccupancy { requested: usize, occupied: usize },

    /// Transport failure or unexpected HTTP status on one hop.
    #[error("Dispatch {hop} failed (status {status:?}): {message}")]
    DispatchHttpError {
        hop: DispatchHop,
        status: Option<u16>,
        message: String,
    },

    /// The endpoint answered, but not in the shape the exchange expects.
    #[error("Dispatch protocol mismatch: {0}")]
    DispatchProtocolMismatch(String),

    /// Every attempt of a connectivity probe failed.
    #[error("Connectivity probe failed after {attempts} attempts: {last_error}")]
    ProbeFailure { attempts: u32, last_error: String },

    /// An operation was refused because it would overlap another one.
    #[error("Operation refused, {0} in progress")]
    Busy(&'static str),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RollcallError {
    /// Whether retrying the same operation later can succeed without any
    /// code or configuration change.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RollcallError::DrainExceedsOccupancy { .. }
                | RollcallError::Configuration(_)
                | RollcallError::Serialization(_)
        )
    }

    /// Whether this error originated from the card reader.
    pub fn is_read_failure(&self) -> bool {
        matches!(
            self,
            RollcallError::ReadTimeout { .. }
                | RollcallError::ReadAuthFailure { .. }
                | RollcallError::ReadBlockFailure { .. }
                | RollcallError::ReadValidationFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::new("mock_reader", DriverErrorKind::Timeout, "no answer");
        assert_eq!(
            err.to_string(),
            "Driver 'mock_reader' timeout error: no answer"
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(RollcallError::BufferFull { capacity: 10 }.is_recoverable());
        assert!(RollcallError::ReadTimeout { stage: "serial" }.is_recoverable());
        assert!(!RollcallError::DrainExceedsOccupancy {
            requested: 4,
            occupied: 2
        }
        .is_recoverable());
        assert!(!RollcallError::Configuration("bad".into()).is_recoverable());
    }

    #[test]
    fn test_read_failure_classification() {
        assert!(RollcallError::ReadValidationFailure { block: 5 }.is_read_failure());
        let block_fault = RollcallError::ReadBlockFailure {
            block: 4,
            message: "crc error".into(),
        };
        assert!(block_fault.is_read_failure());
        assert!(block_fault.is_recoverable());
        assert_eq!(
            block_fault.to_string(),
            "Card block 4 could not be read: crc error"
        );
        assert!(!RollcallError::Busy("dispatch").is_read_failure());
    }

    #[test]
    fn test_dispatch_error_message() {
        let err = RollcallError::DispatchHttpError {
            hop: DispatchHop::Redirect,
            status: Some(500),
            message: "server error".into(),
        };
        assert_eq!(
            err.to_string(),
            "Dispatch redirect failed (status Some(500)): server error"
        );
    }
}
