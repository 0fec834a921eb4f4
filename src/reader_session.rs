//! One card read attempt.
//!
//! ```text
//! Idle -> PresenceWait -> SerialRead -> (Authenticate -> ReadBlock) x3 -> Validate
//! ```
//!
//! Both waits poll the reader every `poll_interval` and give up after their
//! timeout. Whatever happens, the attempt ends by halting the card and
//! dropping the crypto session so the next attempt starts clean.

use chrono::Utc;
use rollcall_core::{
    clean_block, format_tag_id, CardReader, IdentityRecord, RollcallError, RollcallResult,
    SectorKey, SessionState, FIELD_COUNT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::ReaderConfig;

/// Result of [`ReaderSession::attempt`].
#[derive(Debug)]
pub enum ReadOutcome {
    /// Nothing entered the field within the presence window.
    NoCard,
    /// A card was read too soon after the previous success and ignored.
    CoolingDown,
    Captured(IdentityRecord),
    /// The attempt failed; the failure streak was already incremented.
    Failed(RollcallError),
}

pub struct ReaderSession {
    reader: Arc<dyn CardReader>,
    blocks: [u8; FIELD_COUNT],
    key: SectorKey,
    presence_timeout: Duration,
    serial_timeout: Duration,
    poll_interval: Duration,
    cooldown: Duration,
}

impl ReaderSession {
    pub fn new(reader: Arc<dyn CardReader>, config: &ReaderConfig) -> RollcallResult<Self> {
        let blocks: [u8; FIELD_COUNT] = config.blocks.as_slice().try_into().map_err(|_| {
            RollcallError::Configuration(format!(
                "reader needs exactly {} data blocks, got {}",
                FIELD_COUNT,
                config.blocks.len()
            ))
        })?;
        Ok(Self {
            reader,
            blocks,
            key: config.sector_key(),
            presence_timeout: config.presence_timeout(),
            serial_timeout: config.serial_timeout(),
            poll_interval: config.poll_interval(),
            cooldown: config.cooldown(),
        })
    }

    pub fn reader(&self) -> &Arc<dyn CardReader> {
        &self.reader
    }

    /// Run one attempt and fold its result into `state`.
    ///
    /// Returns `NoCard` without touching the reader unless
    /// `state.reader_permitted()`.
    pub async fn attempt(&self, state: &mut SessionState) -> ReadOutcome {
        if !state.reader_permitted() {
            return ReadOutcome::NoCard;
        }

        let outcome = match self.wait_for_presence().await {
            Ok(true) => self.capture(state).await,
            Ok(false) => Ok(ReadOutcome::NoCard),
            Err(e) => {
                warn!(driver = self.reader.driver_type(), error = %format!("{:#}", e), "presence poll failed");
                Ok(ReadOutcome::NoCard)
            }
        };
        self.teardown().await;

        match outcome {
            Ok(ReadOutcome::Captured(record)) => {
                state.record_read_success(Instant::now());
                debug!(tag_id = record.tag_id(), "card captured");
                ReadOutcome::Captured(record)
            }
            Ok(other) => other,
            Err(err) => {
                let streak = state.record_read_failure();
                warn!(error = %err, streak, "card read failed");
                ReadOutcome::Failed(err)
            }
        }
    }

    async fn capture(&self, state: &SessionState) -> RollcallResult<ReadOutcome> {
        let uid = self.wait_for_serial().await?;

        if state
            .last_successful_read
            .is_some_and(|last| last.elapsed() < self.cooldown)
        {
            debug!("tap ignored during cooldown");
            return Ok(ReadOutcome::CoolingDown);
        }

        let mut fields: [String; FIELD_COUNT] = Default::default();
        for (field, &block) in fields.iter_mut().zip(self.blocks.iter()) {
            *field = self.read_field(block).await?;
        }

        let record = IdentityRecord::new(format_tag_id(&uid), fields, Utc::now())?;
        Ok(ReadOutcome::Captured(record))
    }

    async fn read_field(&self, block: u8) -> RollcallResult<String> {
        self.reader
            .authenticate(block, &self.key)
            .await
            .map_err(|e| RollcallError::ReadAuthFailure {
                block,
                message: format!("{:#}", e),
            })?;
        let raw = self
            .reader
            .read_block(block)
            .await
            .map_err(|e| RollcallError::ReadBlockFailure {
                block,
                message: format!("{:#}", e),
            })?;

        let text = clean_block(&raw);
        if text.is_empty() {
            return Err(RollcallError::ReadValidationFailure { block });
        }
        Ok(text)
    }

    async fn wait_for_presence(&self) -> anyhow::Result<bool> {
        let deadline = Instant::now() + self.presence_timeout;
        loop {
            if self.reader.is_new_card_present().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn wait_for_serial(&self) -> RollcallResult<Vec<u8>> {
        let deadline = Instant::now() + self.serial_timeout;
        loop {
            match self.reader.read_card_serial().await {
                Ok(Some(uid)) => return Ok(uid),
                Ok(None) => {}
                Err(e) => debug!(error = %format!("{:#}", e), "serial read poll failed"),
            }
            if Instant::now() >= deadline {
                return Err(RollcallError::ReadTimeout { stage: "serial" });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn teardown(&self) {
        if let Err(e) = self.reader.halt().await {
            warn!(error = %format!("{:#}", e), "halt failed");
        }
        if let Err(e) = self.reader.stop_crypto().await {
            warn!(error = %format!("{:#}", e), "stop crypto failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::Connectivity;
    use rollcall_driver_mock::{CardImage, MockCardReader, Tap};

    fn ready_state() -> SessionState {
        let mut state = SessionState::new(Instant::now());
        state.connectivity = Connectivity::Connected;
        state.remote_ready = true;
        state.reader_locked = false;
        state
    }

    fn session(reader: &Arc<MockCardReader>) -> ReaderSession {
        ReaderSession::new(reader.clone(), &ReaderConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_captures_enrolled_card() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_card(CardImage::attendee(
            [0x04, 0xA2, 0x19, 0x7B],
            " 2201001 ",
            "T-014",
            "Ani Rahmawati",
        ));
        let mut state = ready_state();

        let ReadOutcome::Captured(record) = session(&reader).attempt(&mut state).await else {
            panic!("expected a capture");
        };
        assert_eq!(record.tag_id(), "04a2197b");
        assert_eq!(record.student_id(), "2201001");
        assert_eq!(record.name(), "Ani Rahmawati");
        assert!(state.last_successful_read.is_some());
        assert_eq!(state.consecutive_read_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_card_times_out_quietly() {
        let reader = Arc::new(MockCardReader::new());
        let mut state = ready_state();
        let start = Instant::now();

        let outcome = session(&reader).attempt(&mut state).await;
        assert!(matches!(outcome, ReadOutcome::NoCard));
        assert_eq!(state.consecutive_read_failures, 0);
        assert!(start.elapsed() <= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_serial_timeout_counts_failure() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_tap(Tap::Unselectable);
        let mut state = ready_state();

        let outcome = session(&reader).attempt(&mut state).await;
        assert!(matches!(
            outcome,
            ReadOutcome::Failed(RollcallError::ReadTimeout { stage: "serial" })
        ));
        assert_eq!(state.consecutive_read_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_block_fails_validation() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_card(CardImage::attendee([1, 2], "2201001", "T-014", "Ani").with_text(5, "   "));
        let mut state = ready_state();

        let outcome = session(&reader).attempt(&mut state).await;
        assert!(matches!(
            outcome,
            ReadOutcome::Failed(RollcallError::ReadValidationFailure { block: 5 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_reports_block() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_card(CardImage::attendee([1, 2], "1", "2", "3").rejecting_auth(6));
        let mut state = ready_state();

        let outcome = session(&reader).attempt(&mut state).await;
        assert!(matches!(
            outcome,
            ReadOutcome::Failed(RollcallError::ReadAuthFailure { block: 6, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_fault_is_not_reported_as_auth() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_card(CardImage::attendee([1, 2], "1", "2", "3").failing_read(4));
        let mut state = ready_state();

        let outcome = session(&reader).attempt(&mut state).await;
        assert!(matches!(
            outcome,
            ReadOutcome::Failed(RollcallError::ReadBlockFailure { block: 4, .. })
        ));
        assert_eq!(state.consecutive_read_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_releases_crypto() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_card(CardImage::attendee([1], "1", "2", "3").failing_read(4));
        reader.push_card(CardImage::attendee([2], "1", "2", "3"));
        let session = session(&reader);
        let mut state = ready_state();

        session.attempt(&mut state).await;
        session.attempt(&mut state).await;
        session.attempt(&mut state).await;

        let counters = reader.counters();
        assert_eq!(counters.halts, 3);
        assert_eq!(counters.crypto_stops, 3);
        assert!(!reader.card_in_field());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_ignores_quick_second_tap() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_card(CardImage::attendee([1], "1", "2", "3"));
        reader.push_card(CardImage::attendee([2], "4", "5", "6"));
        let session = session(&reader);
        let mut state = ready_state();

        assert!(matches!(session.attempt(&mut state).await, ReadOutcome::Captured(_)));
        assert!(matches!(session.attempt(&mut state).await, ReadOutcome::CoolingDown));
        assert_eq!(state.consecutive_read_failures, 0);

        reader.push_card(CardImage::attendee([3], "7", "8", "9"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(matches!(session.attempt(&mut state).await, ReadOutcome::Captured(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refuses_when_not_permitted() {
        let reader = Arc::new(MockCardReader::new());
        reader.push_card(CardImage::attendee([1], "1", "2", "3"));
        let mut state = ready_state();
        state.network_busy = true;

        assert!(matches!(session(&reader).attempt(&mut state).await, ReadOutcome::NoCard));
        assert_eq!(reader.counters().presence_polls, 0);
        assert_eq!(reader.pending_taps(), 1);
    }

    #[test]
    fn test_rejects_wrong_block_count() {
        let reader: Arc<dyn CardReader> = Arc::new(MockCardReader::new());
        let config = ReaderConfig {
            blocks: vec![4, 5],
            ..ReaderConfig::default()
        };
        assert!(matches!(
            ReaderSession::new(reader, &config),
            Err(RollcallError::Configuration(_))
        ));
    }
}
