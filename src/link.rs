//! Network link for hosts whose connectivity is managed by the OS.

use anyhow::Result;
use async_trait::async_trait;
use rollcall_core::{LinkMode, NetworkLink};
use tracing::{debug, info};

/// Always-on station link.
///
/// A host running the pipeline relies on the operating system to keep its
/// network up, so there is nothing to (re)join and no credentials to forget.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostLink;

#[async_trait]
impl NetworkLink for HostLink {
    fn is_connected(&self) -> bool {
        true
    }

    fn mode(&self) -> LinkMode {
        LinkMode::Station
    }

    async fn begin_connection(&self) -> Result<()> {
        debug!("host link needs no connection step");
        Ok(())
    }

    async fn forget_credentials(&self) -> Result<()> {
        info!("host link has no stored credentials");
        Ok(())
    }
}
