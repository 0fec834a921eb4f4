//! Application-level error type.
//!
//! `AppError` sits above the pipeline error [`RollcallError`] and adds the
//! failures only the binary can run into: loading configuration, building the
//! HTTP client and re-executing the process.
//!
//! ## Error Hierarchy
//!
//! - **`Pipeline`**: anything raised by the capture/buffer/dispatch pipeline.
//! - **`Config`**: figment could not read or deserialize a provider.
//! - **`Configuration`**: values parsed fine but are semantically invalid.
//! - **`Http`**: the HTTP client could not be constructed.
//! - **`Io`**: standard I/O failures (re-exec, reading the executable path).

use rollcall_core::RollcallError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] RollcallError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_is_transparent() {
        let err: AppError = RollcallError::BufferFull { capacity: 10 }.into();
        assert_eq!(err.to_string(), "Record buffer full (10 records)");
    }

    #[test]
    fn test_validation_message() {
        let err = AppError::Configuration("capacity must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: capacity must be at least 1"
        );
    }
}
