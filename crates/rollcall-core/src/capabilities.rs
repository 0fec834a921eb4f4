//! Capability traits for the device's external collaborators.
//!
//! The pipeline never talks to hardware or sockets directly. Each collaborator
//! is reached through one small trait:
//!
//! - [`CardReader`]: a contactless reader with MIFARE-style block access
//! - [`NetworkLink`]: the Wi-Fi station, consumed as a connectivity oracle
//! - [`HttpTransport`]: a single HTTP round trip with redirects left to the caller
//!
//! Each trait is async (`#[async_trait]`), `Send + Sync`, and returns
//! `anyhow::Result` for driver-level failures. Implementations keep their own
//! interior mutability so the coordinator can hold them behind `Arc`.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn uid_of_next_card(reader: &dyn CardReader) -> Result<Option<Vec<u8>>> {
//!     if !reader.is_new_card_present().await? {
//!         return Ok(None);
//!     }
//!     let uid = reader.read_card_serial().await?;
//!     reader.halt().await?;
//!     reader.stop_crypto().await?;
//!     Ok(uid)
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Bytes per MIFARE Classic data block.
pub const BLOCK_SIZE: usize = 16;

// =============================================================================
// Card Reader
// =============================================================================

/// Six-byte sector key used for block authentication (key A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorKey(pub [u8; 6]);

impl Default for SectorKey {
    /// Factory transport key `FF FF FF FF FF FF`.
    fn default() -> Self {
        SectorKey([0xFF; 6])
    }
}

/// Contactless card reader with authenticated block reads.
#[async_trait]
pub trait CardReader: Send + Sync {
    /// Short identifier used in logs and driver errors.
    fn driver_type(&self) -> &'static str;

    /// Poll once for a card that has not been selected yet.
    async fn is_new_card_present(&self) -> Result<bool>;

    /// Select the present card and return its UID, or `None` if the
    /// anticollision step did not complete on this poll.
    async fn read_card_serial(&self) -> Result<Option<Vec<u8>>>;

    /// Authenticate the selected card for `block`.
    async fn authenticate(&self, block: u8, key: &SectorKey) -> Result<()>;

    /// Read one authenticated block.
    async fn read_block(&self, block: u8) -> Result<[u8; BLOCK_SIZE]>;

    /// Put the selected card to sleep.
    async fn halt(&self) -> Result<()>;

    /// Drop the authenticated crypto session.
    async fn stop_crypto(&self) -> Result<()>;

    /// Turn the RF field on or off. With the field off no card is detected.
    async fn set_antenna(&self, enabled: bool) -> Result<()>;
}

// =============================================================================
// Network Link
// =============================================================================

/// Radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Joined to an access point as a client.
    Station,
    /// Serving the provisioning access point.
    AccessPoint,
}

/// Connectivity oracle plus the few actions the coordinator may request.
#[async_trait]
pub trait NetworkLink: Send + Sync {
    fn is_connected(&self) -> bool;

    fn mode(&self) -> LinkMode;

    /// Start (re)joining the configured network. Returns once the attempt
    /// was issued, not once it completed.
    async fn begin_connection(&self) -> Result<()>;

    /// Erase stored credentials so the next boot comes up in
    /// provisioning mode.
    async fn forget_credentials(&self) -> Result<()>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a response. Redirects are returned, never followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One HTTP round trip with a bounded timeout.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_key_is_transport_key() {
        assert_eq!(SectorKey::default().0, [0xFF; 6]);
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::post("https://example.test/exec", "{}")
            .header("Content-Type", "application/json")
            .header("X-Requested-With", "XMLHttpRequest");
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body.as_deref(), Some("{}"));
        assert_eq!(
            request.header_value("x-requested-with"),
            Some("XMLHttpRequest")
        );
        assert_eq!(request.header_value("user-agent"), None);
    }

    #[test]
    fn test_link_mode_serde() {
        let mode: LinkMode = serde_json::from_str("\"access_point\"").unwrap();
        assert_eq!(mode, LinkMode::AccessPoint);
    }
}
