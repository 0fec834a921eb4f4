//! # rollcall
//!
//! Attendance capture pipeline: RFID cards are read into a small in-memory
//! buffer and delivered in batches to a Google Apps Script web app that
//! appends them to a spreadsheet.
//!
//! ## Crate Structure
//!
//! - **`coordinator`**: the single-owner control loop that gates capture,
//!   flushing, probing and link supervision, returning a [`TickOutcome`]
//!   per tick.
//! - **`reader_session`**: one bounded card read attempt.
//! - **`flush`**: the size/age flush policy.
//! - **`dispatch`**: the POST-then-redirect exchange with the web app, its
//!   retry policy and the `reqwest` transport.
//! - **`config`**: figment-layered configuration.
//! - **`logging`**: tracing subscriber setup.
//! - **`feedback`**: the tracing-backed status sink.
//! - **`link`**: network link for OS-managed hosts.
//! - **`restart`**: process re-exec after a fatal outcome.
//! - **`app`**: wiring of all the above for the binary.
//!
//! Shared types and traits live in `rollcall-core`; simulated collaborators
//! in `rollcall-driver-mock`.
//!
//! [`TickOutcome`]: coordinator::TickOutcome

pub mod app;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod feedback;
pub mod flush;
pub mod link;
pub mod logging;
pub mod reader_session;
pub mod restart;

pub use config::RollcallConfig;
pub use coordinator::{Coordinator, FatalReason, TickOutcome};
pub use error::{AppError, AppResult};
