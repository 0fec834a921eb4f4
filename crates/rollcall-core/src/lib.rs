//! # rollcall-core
//!
//! Types and traits shared by every part of the attendance pipeline.
//!
//! - **`record`**: the immutable [`IdentityRecord`] and the field cleaning routine
//! - **`buffer`**: the fixed-capacity [`RecordBuffer`]
//! - **`batch`**: the [`Batch`] formatter and the endpoint command envelope
//! - **`session`**: [`SessionState`], the coordinator-owned flags and counters
//! - **`capabilities`**: traits for the card reader, network link and HTTP transport
//! - **`feedback`**: [`StatusReport`] and the [`StatusSink`] trait
//! - **`gate`**: the [`UpdateGate`] raised during firmware updates
//! - **`error`**: [`RollcallError`], the pipeline error taxonomy

pub mod batch;
pub mod buffer;
pub mod capabilities;
pub mod error;
pub mod feedback;
pub mod gate;
pub mod record;
pub mod session;

pub use batch::{parse_rows, Batch, EndpointCommand, Row};
pub use buffer::{RecordBuffer, DEFAULT_CAPACITY};
pub use capabilities::{
    CardReader, HttpMethod, HttpReply, HttpRequest, HttpTransport, LinkMode, NetworkLink,
    SectorKey, BLOCK_SIZE,
};
pub use error::{DispatchHop, DriverError, DriverErrorKind, RollcallError, RollcallResult};
pub use feedback::{StatusReport, StatusSink, Tone};
pub use gate::UpdateGate;
pub use record::{clean_block, clean_field, format_tag_id, IdentityRecord, FIELD_COUNT};
pub use session::{Connectivity, SessionState};
