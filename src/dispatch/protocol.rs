//! Google Apps Script exchange.
//!
//! A web app deployment cannot answer a POST directly. The platform runs the
//! script, stores its output and answers `302` with an HTML page linking to
//! the stored result. The dispatcher therefore:
//!
//! 1. POSTs the JSON command and requires `302`,
//! 2. takes the target of `HREF="..."` from the body, decoding `&amp;`,
//! 3. GETs that URL with a browser user agent and the XHR marker so the
//!    platform returns the raw script output, and requires `200`,
//! 4. checks the output against the success marker.
//!
//! A batch succeeds on any output starting with `Success`; the probe demands
//! exactly `Success`.

use async_trait::async_trait;
use rollcall_core::{
    Batch, DispatchHop, EndpointCommand, HttpReply, HttpRequest, HttpTransport, RollcallError,
    RollcallResult, StatusReport, StatusSink, Tone,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{DispatchReceipt, Dispatcher, RetryPolicy};

/// Prefix of every successful script output.
pub const SUCCESS_MARKER: &str = "Success";

const REDIRECT_ATTRIBUTE: &str = "HREF=\"";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0";
const BODY_PREVIEW_CHARS: usize = 120;

/// Pull the redirect target out of a `302` body.
///
/// Returns `None` when the attribute is missing or empty.
pub fn extract_redirect(body: &str) -> Option<String> {
    let start = body.find(REDIRECT_ATTRIBUTE)? + REDIRECT_ATTRIBUTE.len();
    let length = body[start..].find('"')?;
    let url = &body[start..start + length];
    if url.is_empty() {
        return None;
    }
    Some(url.replace("&amp;", "&"))
}

fn preview(body: &str) -> String {
    let mut text: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    if body.chars().count() > BODY_PREVIEW_CHARS {
        text.push_str("...");
    }
    text
}

/// Trailing row count of `Success <n>`.
fn rows_reported(output: &str) -> Option<u32> {
    output
        .strip_prefix(SUCCESS_MARKER)?
        .split_whitespace()
        .last()?
        .parse()
        .ok()
}

/// Dispatcher for an Apps Script web app deployment.
pub struct AppsScriptDispatcher {
    transport: Arc<dyn HttpTransport>,
    exec_url: String,
    sheet_name: String,
    policy: RetryPolicy,
    sink: Arc<dyn StatusSink>,
}

impl AppsScriptDispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        exec_url: impl Into<String>,
        sheet_name: impl Into<String>,
        policy: RetryPolicy,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            transport,
            exec_url: exec_url.into(),
            sheet_name: sheet_name.into(),
            policy,
            sink,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One POST/GET exchange. Returns the raw script output.
    async fn exchange(&self, command: &str) -> RollcallResult<String> {
        let submit = HttpRequest::post(&self.exec_url, command)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        let reply = self
            .transport
            .execute(submit)
            .await
            .map_err(|e| RollcallError::DispatchHttpError {
                hop: DispatchHop::Submit,
                status: None,
                message: format!("{:#}", e),
            })?;
        debug!(status = reply.status, "submit hop answered");

        if reply.status != 302 {
            return Err(unexpected_status(DispatchHop::Submit, 302, &reply));
        }
        let target = extract_redirect(&reply.body).ok_or_else(|| {
            RollcallError::DispatchProtocolMismatch(format!(
                "no redirect target in 302 body: {}",
                preview(&reply.body)
            ))
        })?;

        let fetch = HttpRequest::get(target)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("X-Requested-With", "XMLHttpRequest");
        let reply = self
            .transport
            .execute(fetch)
            .await
            .map_err(|e| RollcallError::DispatchHttpError {
                hop: DispatchHop::Redirect,
                status: None,
                message: format!("{:#}", e),
            })?;
        debug!(status = reply.status, "redirect hop answered");

        if reply.status != 200 {
            return Err(unexpected_status(DispatchHop::Redirect, 200, &reply));
        }
        Ok(reply.body)
    }

    async fn submit_once(&self, command: &str, records: usize) -> RollcallResult<DispatchReceipt> {
        let output = self.exchange(command).await?;
        let output = output.trim();
        if !output.starts_with(SUCCESS_MARKER) {
            return Err(RollcallError::DispatchProtocolMismatch(format!(
                "unexpected script output: {}",
                preview(output)
            )));
        }
        Ok(DispatchReceipt {
            records,
            rows_reported: rows_reported(output),
        })
    }

    async fn probe_once(&self, command: &str) -> RollcallResult<()> {
        let output = self.exchange(command).await?;
        if output != SUCCESS_MARKER {
            return Err(RollcallError::DispatchProtocolMismatch(format!(
                "unexpected probe output: {}",
                preview(&output)
            )));
        }
        Ok(())
    }
}

fn unexpected_status(hop: DispatchHop, expected: u16, reply: &HttpReply) -> RollcallError {
    RollcallError::DispatchHttpError {
        hop,
        status: Some(reply.status),
        message: format!("expected {}, body: {}", expected, preview(&reply.body)),
    }
}

#[async_trait]
impl Dispatcher for AppsScriptDispatcher {
    async fn submit(&self, batch: &Batch) -> RollcallResult<DispatchReceipt> {
        let command = EndpointCommand::insert_rows(&self.sheet_name, batch).to_json()?;
        let records = batch.record_count();
        let attempts = self.policy.max_attempts;
        info!(records, sheet = %self.sheet_name, "dispatching batch");

        let receipt = self
            .policy
            .run(
                |_| self.submit_once(&command, records),
                |attempt, err| {
                    warn!(attempt, error = %err, "batch dispatch attempt failed");
                    self.sink.report(
                        StatusReport::new("Send Failed")
                            .detail(format!("Retry {}/{}", attempt, attempts))
                            .tone(Tone::Error),
                    );
                },
            )
            .await?;

        info!(
            records = receipt.records,
            rows_reported = ?receipt.rows_reported,
            "batch delivered"
        );
        Ok(receipt)
    }

    async fn probe(&self) -> RollcallResult<()> {
        let command = EndpointCommand::TestConnection.to_json()?;
        let attempts = self.policy.max_attempts.max(1);

        self.policy
            .run(
                |_| self.probe_once(&command),
                |attempt, err| {
                    warn!(attempt, error = %err, "probe attempt failed");
                    self.sink.report(
                        StatusReport::new("Connection Failed")
                            .detail(format!("Retry {}/{}", attempt, attempts))
                            .tone(Tone::Error),
                    );
                },
            )
            .await
            .map_err(|err| RollcallError::ProbeFailure {
                attempts,
                last_error: err.to_string(),
            })
    }
}
