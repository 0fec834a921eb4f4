//! Process-wide coordination state.
//!
//! One `SessionState` exists per running device. The coordinator owns it and
//! lends it by `&mut` to the reader session and to the flush path; nothing
//! else mutates it. The flags here are what keeps card reads and network
//! operations from interleaving:
//!
//! - `reader_locked`: the reader antenna is off and no tap may be processed.
//! - `network_busy`: a dispatch or probe is in flight.
//!
//! `enter_network` / `leave_network` bracket every remote operation and refuse
//! to nest, so at most one network operation is ever in flight.

use tokio::time::Instant;

use crate::error::{RollcallError, RollcallResult};

/// Link state as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    Disconnected,
    /// Provisioning access point is up; capture and dispatch never run.
    AccessPointMode,
}

impl Connectivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Connectivity::Connected => "connected",
            Connectivity::Disconnected => "disconnected",
            Connectivity::AccessPointMode => "access_point",
        }
    }
}

/// Mutable coordination state shared by the pipeline stages.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub reader_locked: bool,
    pub network_busy: bool,
    pub connectivity: Connectivity,
    pub consecutive_dispatch_failures: u32,
    pub consecutive_read_failures: u32,
    pub consecutive_probe_failures: u32,
    /// Last probe succeeded; dispatch and capture require it.
    pub remote_ready: bool,
    /// Probe ceiling was reached. Only a restart clears it.
    pub latched: bool,
    /// Reference for the flush age threshold.
    pub last_capture_at: Instant,
    pub last_successful_read: Option<Instant>,
    pub last_probe_at: Instant,
    pub last_link_check_at: Option<Instant>,
}

impl SessionState {
    /// Fresh state at boot: reader locked until the first successful probe.
    pub fn new(now: Instant) -> Self {
        Self {
            reader_locked: true,
            network_busy: false,
            connectivity: Connectivity::Disconnected,
            consecutive_dispatch_failures: 0,
            consecutive_read_failures: 0,
            consecutive_probe_failures: 0,
            remote_ready: false,
            latched: false,
            last_capture_at: now,
            last_successful_read: None,
            last_probe_at: now,
            last_link_check_at: None,
        }
    }

    /// Whether a card read attempt may start right now.
    pub fn reader_permitted(&self) -> bool {
        self.connectivity == Connectivity::Connected
            && self.remote_ready
            && !self.latched
            && !self.reader_locked
            && !self.network_busy
    }

    /// Whether a dispatch may start right now.
    pub fn dispatch_permitted(&self) -> bool {
        self.connectivity == Connectivity::Connected && self.remote_ready && !self.network_busy
    }

    /// Mark a network operation as started.
    pub fn enter_network(&mut self) -> RollcallResult<()> {
        if self.network_busy {
            return Err(RollcallError::Busy("network operation"));
        }
        self.network_busy = true;
        Ok(())
    }

    /// Mark the running network operation as finished.
    pub fn leave_network(&mut self) {
        self.network_busy = false;
    }

    /// Clear every rolling failure counter after a success that proves the
    /// device is healthy again.
    pub fn clear_failures(&mut self) {
        self.consecutive_dispatch_failures = 0;
        self.consecutive_read_failures = 0;
        self.consecutive_probe_failures = 0;
    }

    /// Reset the read streak and restart the send timer at `now`.
    pub fn record_read_success(&mut self, now: Instant) {
        self.consecutive_read_failures = 0;
        self.last_successful_read = Some(now);
        self.last_capture_at = now;
    }

    /// Count one failed read and return the new streak length.
    pub fn record_read_failure(&mut self) -> u32 {
        self.consecutive_read_failures = self.consecutive_read_failures.saturating_add(1);
        self.consecutive_read_failures
    }

    /// Reset the dispatch streak. The send timer restarts at `now`.
    pub fn record_dispatch_success(&mut self, now: Instant) {
        self.consecutive_dispatch_failures = 0;
        self.last_capture_at = now;
    }

    /// Count one failed batch delivery and return the new streak length.
    pub fn record_dispatch_failure(&mut self) -> u32 {
        self.consecutive_dispatch_failures = self.consecutive_dispatch_failures.saturating_add(1);
        self.consecutive_dispatch_failures
    }

    /// Mark the endpoint ready and clear every failure streak.
    pub fn record_probe_success(&mut self) {
        self.remote_ready = true;
        self.clear_failures();
    }

    /// Count one failed probe, latching once `ceiling` is reached.
    ///
    /// Returns `true` when this failure latched the session.
    pub fn record_probe_failure(&mut self, ceiling: u32) -> bool {
        self.remote_ready = false;
        self.consecutive_probe_failures = self.consecutive_probe_failures.saturating_add(1);
        if !self.latched && self.consecutive_probe_failures >= ceiling {
            self.latched = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_boot_state_locks_reader() {
        let state = SessionState::new(Instant::now());
        assert!(state.reader_locked);
        assert!(!state.reader_permitted());
        assert!(!state.dispatch_permitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_bracket_refuses_nesting() {
        let mut state = SessionState::new(Instant::now());
        state.enter_network().unwrap();
        assert!(matches!(
            state.enter_network(),
            Err(RollcallError::Busy(_))
        ));
        state.leave_network();
        assert!(state.enter_network().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_blocked_while_network_busy() {
        let mut state = SessionState::new(Instant::now());
        state.connectivity = Connectivity::Connected;
        state.remote_ready = true;
        state.reader_locked = false;
        assert!(state.reader_permitted());

        state.enter_network().unwrap();
        assert!(!state.reader_permitted());
        assert!(!state.dispatch_permitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failures_latch_at_ceiling() {
        let mut state = SessionState::new(Instant::now());
        for _ in 0..4 {
            assert!(!state.record_probe_failure(5));
        }
        assert!(state.record_probe_failure(5));
        assert!(state.latched);

        state.record_probe_success();
        assert!(state.latched, "success must not clear the latch");
        assert_eq!(state.consecutive_probe_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_success_resets_streak() {
        let mut state = SessionState::new(Instant::now());
        assert_eq!(state.record_read_failure(), 1);
        assert_eq!(state.record_read_failure(), 2);
        state.record_read_success(Instant::now());
        assert_eq!(state.consecutive_read_failures, 0);
        assert!(state.last_successful_read.is_some());
    }
}
