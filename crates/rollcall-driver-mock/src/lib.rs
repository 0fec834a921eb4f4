//! Simulated collaborators for rollcall.
//!
//! Everything here implements a `rollcall-core` capability trait so the
//! pipeline can run without reader hardware or network access. Mocks use
//! `tokio::time::sleep` for their simulated latency, so tests running on a
//! paused clock stay instant.
//!
//! # Available Mocks
//!
//! - [`MockCardReader`] - scripted or roster-driven card taps
//! - [`MockLink`] - Wi-Fi station with controllable reconnection
//! - [`MockAppsScript`] - spreadsheet web app with the 302 redirect dance
//! - [`RecordingSink`] - status sink that remembers every report

pub mod common;
mod mock_endpoint;
mod mock_link;
mod mock_reader;
mod recording_sink;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};

pub use mock_endpoint::{EndpointBehaviour, MockAppsScript, DEFAULT_EXEC_URL};
pub use mock_link::MockLink;
pub use mock_reader::{
    demo_roster, CardImage, MockCardReader, ReaderCounters, Tap, ATTENDEE_BLOCKS,
};
pub use recording_sink::RecordingSink;
