//! The control loop that owns the buffer and the session state.
//!
//! Every [`Coordinator::tick`] walks the same gates in order:
//!
//! 1. update gate raised: skip the tick entirely
//! 2. link supervision: access-point mode idles, a lost station link
//!    disables the reader and is reconnected every `wifi_check_interval`
//! 3. latched after too many failed probes: nothing runs until restart
//! 4. periodic probe, preceded by an opportunistic flush
//! 5. flush policy
//! 6. one card read attempt, unless back-pressure applies
//!
//! Capture and dispatch never overlap: the reader is locked and its antenna
//! switched off for the duration of every network operation.

use rollcall_core::{
    Batch, CardReader, Connectivity, IdentityRecord, LinkMode, NetworkLink, RecordBuffer,
    RollcallResult, SessionState, StatusReport, StatusSink, Tone, UpdateGate,
};
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{CoordinatorConfig, RollcallConfig};
use crate::dispatch::{DispatchReceipt, Dispatcher};
use crate::flush::FlushPolicy;
use crate::reader_session::{ReadOutcome, ReaderSession};

/// Why the coordinator gave up and wants the process restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// Too many consecutive failed card reads.
    ReadFailureCeiling,
    /// The station link could not be re-established.
    ConnectivityLost,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::ReadFailureCeiling => f.write_str("read failure ceiling reached"),
            FatalReason::ConnectivityLost => f.write_str("network connectivity lost"),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Captured,
    Flushed,
    Probed,
    /// An update is in progress; nothing was touched.
    Paused,
    /// Operator attention needed; capture stays off until restart.
    Latched,
    /// Terminal. Stop ticking and restart the process.
    Fatal(FatalReason),
}

impl TickOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TickOutcome::Fatal(_))
    }
}

/// Single owner of the record buffer and session state.
pub struct Coordinator {
    buffer: RecordBuffer,
    state: SessionState,
    reader: ReaderSession,
    dispatcher: Arc<dyn Dispatcher>,
    link: Arc<dyn NetworkLink>,
    sink: Arc<dyn StatusSink>,
    gate: UpdateGate,
    policy: FlushPolicy,
    timing: CoordinatorConfig,
    read_failure_ceiling: u32,
    /// Probe as soon as possible instead of waiting for the interval.
    probe_pending: bool,
    /// Last gating notice shown, so idle ticks don't repeat it.
    notice: Option<&'static str>,
}

impl Coordinator {
    pub fn new(
        config: &RollcallConfig,
        reader: Arc<dyn CardReader>,
        dispatcher: Arc<dyn Dispatcher>,
        link: Arc<dyn NetworkLink>,
        sink: Arc<dyn StatusSink>,
        gate: UpdateGate,
    ) -> RollcallResult<Self> {
        let reader = ReaderSession::new(reader, &config.reader)?;
        Ok(Self {
            buffer: RecordBuffer::new(config.buffer.capacity),
            state: SessionState::new(Instant::now()),
            reader,
            dispatcher,
            link,
            sink,
            gate,
            policy: FlushPolicy::from_config(&config.flush),
            timing: config.coordinator.clone(),
            read_failure_ceiling: config.reader.failure_ceiling,
            probe_pending: false,
            notice: None,
        })
    }

    pub fn buffer(&self) -> &RecordBuffer {
        &self.buffer
    }

    /// Direct buffer access, for seeding records outside the capture path.
    pub fn buffer_mut(&mut self) -> &mut RecordBuffer {
        &mut self.buffer
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    /// Boot sequence: pick up the link state and run one probe.
    ///
    /// A failed startup probe leaves the endpoint marked not ready but does
    /// not count towards the probe failure ceiling.
    #[instrument(skip(self))]
    pub async fn start(&mut self) {
        self.disable_reader().await;
        self.report(StatusReport::new("Starting").detail("Please wait...").tone(Tone::Busy));

        self.state.connectivity = self.observed_connectivity();
        self.state.last_probe_at = Instant::now();
        if self.state.connectivity != Connectivity::Connected {
            info!(connectivity = self.state.connectivity.as_str(), "skipping startup probe");
            self.probe_pending = true;
            return;
        }

        self.report(StatusReport::new("Checking GScript").tone(Tone::Busy));
        match self.guarded_probe().await {
            Ok(()) => {
                self.state.record_probe_success();
                self.restore_reader().await;
                info!("endpoint reachable, reader enabled");
                self.report(
                    StatusReport::new("GScript OK")
                        .detail("RFID Enabled")
                        .tone(Tone::Success),
                );
            }
            Err(err) => {
                self.state.remote_ready = false;
                warn!(error = %err, "startup probe failed");
                self.report(
                    StatusReport::new("GScript Error")
                        .detail("RFID Disabled")
                        .tone(Tone::Error),
                );
            }
        }
    }

    /// Run one pass through the gates.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.gate.in_progress() {
            return TickOutcome::Paused;
        }

        if let Some(outcome) = self.supervise_link().await {
            return outcome;
        }

        if self.state.latched {
            return TickOutcome::Latched;
        }

        if self.probe_due() {
            return self.periodic_probe().await;
        }

        let now = Instant::now();
        if self.state.dispatch_permitted() {
            if let Some(trigger) =
                self.policy
                    .should_flush(self.buffer.occupied(), self.state.last_capture_at, now)
            {
                debug!(%trigger, occupied = self.buffer.occupied(), "flush due");
                // A failed flush leaves the records queued; capture still runs
                // and back-pressure decides whether the reader is polled.
                if let Ok(Some(_)) = self.flush(trigger.headline()).await {
                    return TickOutcome::Flushed;
                }
            }
        }

        self.capture().await
    }

    /// Tick every `tick_interval` until a fatal outcome.
    pub async fn run(&mut self) -> FatalReason {
        let interval = self.timing.tick_interval();
        loop {
            match self.tick().await {
                TickOutcome::Fatal(reason) => return reason,
                outcome => debug!(?outcome, occupied = self.buffer.occupied(), "tick"),
            }
            sleep(interval).await;
        }
    }

    // =========================================================================
    // Capture
    // =========================================================================

    async fn capture(&mut self) -> TickOutcome {
        if self.policy.applies_back_pressure(self.buffer.occupied()) {
            self.notify_once(
                "back_pressure",
                StatusReport::new("Buffer Full")
                    .detail("Please wait...")
                    .with_buffer(self.buffer.occupied())
                    .tone(Tone::Warning),
            );
            return TickOutcome::Idle;
        }
        if !self.state.remote_ready {
            self.notify_once(
                "remote_not_ready",
                StatusReport::new("GScript Error")
                    .detail("RFID Disabled")
                    .tone(Tone::Error),
            );
            return TickOutcome::Idle;
        }

        match self.reader.attempt(&mut self.state).await {
            ReadOutcome::Captured(record) => {
                self.notice = None;
                self.store(record).await;
                TickOutcome::Captured
            }
            ReadOutcome::NoCard | ReadOutcome::CoolingDown => TickOutcome::Idle,
            ReadOutcome::Failed(err) => {
                let streak = self.state.consecutive_read_failures;
                self.report(
                    StatusReport::new("Read Failed")
                        .detail(format!("Attempt {}/{}", streak, self.read_failure_ceiling))
                        .tone(Tone::Warning),
                );
                if streak >= self.read_failure_ceiling {
                    error!(error = %err, streak, "read failure ceiling reached");
                    self.emergency_flush().await;
                    return TickOutcome::Fatal(FatalReason::ReadFailureCeiling);
                }
                TickOutcome::Idle
            }
        }
    }

    async fn store(&mut self, record: IdentityRecord) {
        self.report(
            StatusReport::new("Scan Success")
                .detail(record.display_name())
                .tone(Tone::Success),
        );

        let record = match self.buffer.enqueue(record.clone()) {
            Ok(occupied) => {
                info!(tag_id = record.tag_id(), occupied, "record buffered");
                self.report_ready();
                return;
            }
            Err(err) => {
                warn!(error = %err, "buffer full at capture");
                self.report(StatusReport::new("Buffer Full!").tone(Tone::Warning));
                record
            }
        };

        if self.state.dispatch_permitted() {
            if let Err(err) = self.flush("Buffer Full").await {
                warn!(error = %err, "flush after full buffer failed");
            }
        }
        match self.buffer.enqueue(record) {
            Ok(_) => self.report_ready(),
            Err(err) => error!(error = %err, "record dropped"),
        }
    }

    fn report_ready(&self) {
        let occupied = self.buffer.occupied();
        self.report(
            StatusReport::new("Ready")
                .detail(format!("Buffer: {}", occupied))
                .with_buffer(occupied)
                .tone(Tone::Info),
        );
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Deliver the oldest batch and drain exactly what was delivered.
    ///
    /// `Ok(None)` means the buffer was empty.
    #[instrument(skip(self), fields(occupied = self.buffer.occupied()))]
    async fn flush(&mut self, headline: &str) -> RollcallResult<Option<DispatchReceipt>> {
        let batch = Batch::format(&self.buffer.peek_batch(self.policy.min_batch_size()))?;
        let Some(batch) = batch else {
            return Ok(None);
        };

        self.disable_reader().await;
        self.report(
            StatusReport::new(headline)
                .detail("Sending data...")
                .with_buffer(self.buffer.occupied())
                .tone(Tone::Busy),
        );

        let result = self.guarded_submit(&batch).await;
        let outcome = match result {
            Ok(receipt) => {
                if let Err(err) = self.buffer.commit_drain(receipt.records) {
                    error!(error = %err, "delivered batch larger than buffer");
                    self.restore_reader().await;
                    return Err(err);
                }
                self.state.record_dispatch_success(Instant::now());
                info!(
                    records = receipt.records,
                    rows_reported = ?receipt.rows_reported,
                    remaining = self.buffer.occupied(),
                    "batch delivered"
                );
                self.report(
                    StatusReport::new("Data Sent")
                        .detail(format!("{} records", receipt.records))
                        .with_buffer(self.buffer.occupied())
                        .tone(Tone::Success),
                );
                Ok(Some(receipt))
            }
            Err(err) => {
                let failures = self.state.record_dispatch_failure();
                warn!(error = %err, failures, "batch delivery failed");
                self.report(
                    StatusReport::new("Send Failed")
                        .detail("Data kept")
                        .with_buffer(self.buffer.occupied())
                        .tone(Tone::Error),
                );
                Err(err)
            }
        };

        self.restore_reader().await;
        outcome
    }

    /// Best-effort flush before a restart. The result never changes the
    /// restart decision; undelivered records are lost with the process.
    async fn emergency_flush(&mut self) {
        self.disable_reader().await;
        self.report(
            StatusReport::new("Critical Error")
                .detail("Sending buffer...")
                .with_buffer(self.buffer.occupied())
                .tone(Tone::Critical),
        );

        if self.buffer.is_empty() {
            self.report(
                StatusReport::new("No Data")
                    .detail("Restarting...")
                    .tone(Tone::Critical),
            );
            return;
        }
        if !self.state.dispatch_permitted() {
            warn!(lost = self.buffer.occupied(), "endpoint not ready, records discarded");
            self.report(
                StatusReport::new("Send Skipped")
                    .detail("Restarting...")
                    .tone(Tone::Critical),
            );
            return;
        }

        match self.flush("Critical Error").await {
            Ok(_) => self.report(
                StatusReport::new("Data Sent")
                    .detail("Restarting...")
                    .tone(Tone::Critical),
            ),
            Err(err) => {
                warn!(error = %err, lost = self.buffer.occupied(), "emergency flush failed");
                self.report(
                    StatusReport::new("Send Failed")
                        .detail("Restarting...")
                        .tone(Tone::Critical),
                );
            }
        }
    }

    async fn guarded_submit(&mut self, batch: &Batch) -> RollcallResult<DispatchReceipt> {
        self.state.enter_network()?;
        let result = self.dispatcher.submit(batch).await;
        self.state.leave_network();
        result
    }

    // =========================================================================
    // Probe
    // =========================================================================

    fn probe_due(&self) -> bool {
        self.probe_pending || self.state.last_probe_at.elapsed() >= self.timing.probe_interval()
    }

    #[instrument(skip(self))]
    async fn periodic_probe(&mut self) -> TickOutcome {
        self.probe_pending = false;
        self.disable_reader().await;
        self.report(
            StatusReport::new("Checking GScript")
                .with_buffer(self.buffer.occupied())
                .tone(Tone::Busy),
        );

        if !self.buffer.is_empty() && self.state.dispatch_permitted() {
            match self.flush("Checking GScript").await {
                Ok(_) => self.report(StatusReport::new("Buffer Sent").tone(Tone::Success)),
                Err(_) => self.report(StatusReport::new("Send Failed").tone(Tone::Error)),
            }
            self.disable_reader().await;
        }

        let result = self.guarded_probe().await;
        self.state.last_probe_at = Instant::now();
        self.notice = None;

        match result {
            Ok(()) => {
                self.state.record_probe_success();
                self.restore_reader().await;
                info!("probe succeeded");
                self.report(
                    StatusReport::new("GScript OK")
                        .detail("RFID Enabled")
                        .tone(Tone::Success),
                );
                TickOutcome::Probed
            }
            Err(err) => {
                let ceiling = self.timing.probe_failure_ceiling;
                let latched = self.state.record_probe_failure(ceiling);
                let failures = self.state.consecutive_probe_failures;
                warn!(error = %err, failures, ceiling, "probe failed");
                self.report(
                    StatusReport::new("GScript Lost")
                        .detail(format!("Failures {}/{}", failures, ceiling))
                        .tone(Tone::Error),
                );
                if latched {
                    error!(failures, "probe failure ceiling reached, reader latched off");
                    self.report(
                        StatusReport::new("Contact IT")
                            .detail("RFID Disabled")
                            .tone(Tone::Critical),
                    );
                    return TickOutcome::Latched;
                }
                TickOutcome::Probed
            }
        }
    }

    async fn guarded_probe(&mut self) -> RollcallResult<()> {
        self.state.enter_network()?;
        let result = self.dispatcher.probe().await;
        self.state.leave_network();
        result
    }

    // =========================================================================
    // Link supervision
    // =========================================================================

    fn observed_connectivity(&self) -> Connectivity {
        match self.link.mode() {
            LinkMode::AccessPoint => Connectivity::AccessPointMode,
            LinkMode::Station if self.link.is_connected() => Connectivity::Connected,
            LinkMode::Station => Connectivity::Disconnected,
        }
    }

    /// Returns an outcome when the link state ends the tick.
    async fn supervise_link(&mut self) -> Option<TickOutcome> {
        let observed = self.observed_connectivity();
        let previous = self.state.connectivity;

        match observed {
            Connectivity::Connected => {
                if previous != Connectivity::Connected {
                    info!(previous = previous.as_str(), "link up");
                    self.state.connectivity = Connectivity::Connected;
                    self.restore_reader().await;
                }
                None
            }
            Connectivity::AccessPointMode => {
                if previous != Connectivity::AccessPointMode {
                    self.state.connectivity = Connectivity::AccessPointMode;
                    self.disable_reader().await;
                    warn!("link in provisioning mode, capture and dispatch off");
                    self.report(
                        StatusReport::new("Setup Mode")
                            .detail("Connect to AP")
                            .tone(Tone::Warning),
                    );
                }
                Some(TickOutcome::Idle)
            }
            Connectivity::Disconnected => {
                if previous != Connectivity::Disconnected {
                    self.state.connectivity = Connectivity::Disconnected;
                    self.state.last_link_check_at = None;
                    self.disable_reader().await;
                    warn!("link lost");
                    self.report(
                        StatusReport::new("WiFi Lost")
                            .with_buffer(self.buffer.occupied())
                            .tone(Tone::Warning),
                    );
                }
                let due = self
                    .state
                    .last_link_check_at
                    .map_or(true, |at| at.elapsed() >= self.timing.wifi_check_interval());
                if !due {
                    return Some(TickOutcome::Idle);
                }
                self.state.last_link_check_at = Some(Instant::now());
                Some(self.reconnect().await)
            }
        }
    }

    async fn reconnect(&mut self) -> TickOutcome {
        let max_attempts = self.timing.wifi_max_attempts;
        for attempt in 1..=max_attempts {
            self.report(
                StatusReport::new("Connecting WiFi")
                    .detail(format!("Attempt {}/{}", attempt, max_attempts))
                    .tone(Tone::Busy),
            );
            if self.wait_for_link().await {
                info!(attempt, "link re-established");
                self.state.connectivity = Connectivity::Connected;
                self.state.clear_failures();
                if !self.state.remote_ready {
                    self.probe_pending = true;
                }
                self.restore_reader().await;
                self.report(
                    StatusReport::new("WiFi Connected")
                        .detail("RFID Enabled")
                        .tone(Tone::Success),
                );
                return TickOutcome::Idle;
            }
            warn!(attempt, max_attempts, "reconnect attempt failed");
            if attempt < max_attempts {
                sleep(self.timing.wifi_retry_delay()).await;
            }
        }

        error!(max_attempts, "could not rejoin network, forgetting credentials");
        if let Err(e) = self.link.forget_credentials().await {
            warn!(error = %format!("{:#}", e), "failed to forget credentials");
        }
        self.report(
            StatusReport::new("WiFi Failed")
                .detail("Restarting...")
                .tone(Tone::Critical),
        );
        TickOutcome::Fatal(FatalReason::ConnectivityLost)
    }

    async fn wait_for_link(&self) -> bool {
        if let Err(e) = self.link.begin_connection().await {
            warn!(error = %format!("{:#}", e), "begin connection failed");
            return false;
        }
        let deadline = Instant::now() + self.timing.wifi_connect_timeout();
        loop {
            if self.link.is_connected() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.timing.wifi_poll_interval()).await;
        }
    }

    // =========================================================================
    // Reader and feedback helpers
    // =========================================================================

    async fn disable_reader(&mut self) {
        self.state.reader_locked = true;
        if let Err(e) = self.reader.reader().set_antenna(false).await {
            warn!(error = %format!("{:#}", e), "failed to switch antenna off");
        }
    }

    /// Unlock the reader if nothing forbids capture.
    async fn restore_reader(&mut self) {
        if self.state.connectivity != Connectivity::Connected
            || !self.state.remote_ready
            || self.state.latched
        {
            return;
        }
        self.notice = None;
        self.state.reader_locked = false;
        if let Err(e) = self.reader.reader().set_antenna(true).await {
            warn!(error = %format!("{:#}", e), "failed to switch antenna on");
        }
    }

    fn report(&self, report: StatusReport) {
        self.sink.report(report);
    }

    /// Report a gating notice unless it is already showing.
    fn notify_once(&mut self, key: &'static str, report: StatusReport) {
        if self.notice == Some(key) {
            return;
        }
        self.notice = Some(key);
        self.report(report);
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("occupied", &self.buffer.occupied())
            .field("state", &self.state)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
