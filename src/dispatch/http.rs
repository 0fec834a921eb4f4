//! `reqwest`-backed HTTP transport.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use rollcall_core::{HttpMethod, HttpReply, HttpRequest, HttpTransport};
use std::time::Duration;

/// HTTPS client with redirects disabled; the dispatcher follows the
/// Apps Script redirect itself.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with a hard per-request `timeout`.
    ///
    /// `insecure_tls` disables certificate verification.
    pub fn new(timeout: Duration, insecure_tls: bool) -> Result<Self, reqwest::Error> {
        if insecure_tls {
            tracing::warn!("TLS certificate verification disabled for the endpoint");
        }
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpReply> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_client() {
        assert!(ReqwestTransport::new(Duration::from_secs(10), false).is_ok());
        assert!(ReqwestTransport::new(Duration::from_secs(10), true).is_ok());
    }
}
