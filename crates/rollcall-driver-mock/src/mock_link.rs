//! Simulated Wi-Fi station.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rollcall_core::capabilities::{LinkMode, NetworkLink};

#[derive(Debug)]
struct LinkState {
    connected: bool,
    mode: LinkMode,
    /// `begin_connection` call that brings the link back; `None` never does.
    reconnect_on_attempt: Option<u32>,
    connection_attempts: u32,
    credentials_forgotten: bool,
}

/// Network link whose state is driven by the test.
#[derive(Debug)]
pub struct MockLink {
    state: Mutex<LinkState>,
}

impl MockLink {
    fn with_state(connected: bool, mode: LinkMode) -> Self {
        Self {
            state: Mutex::new(LinkState {
                connected,
                mode,
                reconnect_on_attempt: Some(1),
                connection_attempts: 0,
                credentials_forgotten: false,
            }),
        }
    }

    /// Station joined to its network.
    pub fn connected() -> Self {
        Self::with_state(true, LinkMode::Station)
    }

    /// Station that lost its network; the first reconnect attempt succeeds.
    pub fn disconnected() -> Self {
        Self::with_state(false, LinkMode::Station)
    }

    /// Provisioning access point.
    pub fn access_point() -> Self {
        Self::with_state(false, LinkMode::AccessPoint)
    }

    /// Choose which `begin_connection` call (1-based) restores the link,
    /// counted from now. `None` keeps it down forever.
    pub fn reconnect_on_attempt(self, attempt: Option<u32>) -> Self {
        {
            let mut state = self.state.lock();
            state.reconnect_on_attempt = attempt.map(|n| n + state.connection_attempts);
        }
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn set_mode(&self, mode: LinkMode) {
        self.state.lock().mode = mode;
    }

    pub fn connection_attempts(&self) -> u32 {
        self.state.lock().connection_attempts
    }

    pub fn credentials_forgotten(&self) -> bool {
        self.state.lock().credentials_forgotten
    }
}

#[async_trait]
impl NetworkLink for MockLink {
    fn is_connected(&self) -> bool {
        let state = self.state.lock();
        state.connected && state.mode == LinkMode::Station
    }

    fn mode(&self) -> LinkMode {
        self.state.lock().mode
    }

    async fn begin_connection(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.connection_attempts += 1;
        if state
            .reconnect_on_attempt
            .is_some_and(|n| state.connection_attempts >= n)
        {
            state.connected = true;
        }
        tracing::debug!(
            attempt = state.connection_attempts,
            connected = state.connected,
            "mock link connection attempt"
        );
        Ok(())
    }

    async fn forget_credentials(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.credentials_forgotten = true;
        state.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reconnects_on_chosen_attempt() {
        let link = MockLink::disconnected().reconnect_on_attempt(Some(2));
        link.begin_connection().await.unwrap();
        assert!(!link.is_connected());
        link.begin_connection().await.unwrap();
        assert!(link.is_connected());
        assert_eq!(link.connection_attempts(), 2);
    }

    #[tokio::test]
    async fn test_never_reconnects() {
        let link = MockLink::disconnected().reconnect_on_attempt(None);
        for _ in 0..5 {
            link.begin_connection().await.unwrap();
        }
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_forget_credentials() {
        let link = MockLink::connected();
        link.forget_credentials().await.unwrap();
        assert!(link.credentials_forgotten());
        assert!(!link.is_connected());
    }

    #[test]
    fn test_access_point_is_never_connected() {
        let link = MockLink::access_point();
        link.set_connected(true);
        assert!(!link.is_connected());
        assert_eq!(link.mode(), LinkMode::AccessPoint);
    }
}
