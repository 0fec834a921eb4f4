//! Dispatch of batches to the spreadsheet endpoint.
//!
//! [`Dispatcher`] is the seam between flush logic and the remote platform.
//! The production implementation, [`AppsScriptDispatcher`], speaks the Google
//! Apps Script POST-then-redirect exchange over any [`HttpTransport`];
//! [`ReqwestTransport`] is the real network client.
//!
//! [`HttpTransport`]: rollcall_core::HttpTransport

pub mod http;
pub mod protocol;
pub mod retry;

pub use http::ReqwestTransport;
pub use protocol::{extract_redirect, AppsScriptDispatcher, SUCCESS_MARKER};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use rollcall_core::{Batch, RollcallResult};

/// Outcome of a confirmed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Records carried by the batch; exactly this many are drained.
    pub records: usize,
    /// Row count echoed by the endpoint after the success marker, if any.
    pub rows_reported: Option<u32>,
}

/// Delivers batches and checks reachability of the remote endpoint.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver `batch`, retrying the whole exchange under the configured
    /// policy. Never touches the record buffer.
    async fn submit(&self, batch: &Batch) -> RollcallResult<DispatchReceipt>;

    /// Run the reachability check with the same exchange and retry policy.
    async fn probe(&self) -> RollcallResult<()>;
}
