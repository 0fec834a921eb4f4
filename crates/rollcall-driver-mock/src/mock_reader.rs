//! Simulated MFRC522-style card reader.
//!
//! Cards are presented to the reader as a queue of [`Tap`]s. A tap stays in
//! the RF field until the session halts it, which models the holder pulling
//! the card away after the beep. With an optional roster the reader also
//! produces random taps on its own, which is what `--simulate` runs use.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall_driver_mock::{CardImage, MockCardReader};
//!
//! let reader = MockCardReader::new();
//! reader.push_card(CardImage::attendee([0xDE, 0xAD, 0xBE, 0xEF], "2201", "77", "Ani"));
//! assert!(reader.is_new_card_present().await?);
//! ```

use crate::common::{ErrorConfig, MockMode, MockRng, TimingConfig};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rollcall_core::capabilities::{CardReader, SectorKey, BLOCK_SIZE};
use rollcall_core::error::{DriverError, DriverErrorKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

const DRIVER_TYPE: &str = "mock_card_reader";

/// Blocks holding student id, staff id and name on an enrolled card.
pub const ATTENDEE_BLOCKS: [u8; 3] = [4, 5, 6];

// =============================================================================
// Card images
// =============================================================================

/// Contents and quirks of one simulated card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardImage {
    uid: Vec<u8>,
    key: SectorKey,
    blocks: HashMap<u8, [u8; BLOCK_SIZE]>,
    reject_auth_on: Option<u8>,
    fault_on: Option<u8>,
}

impl CardImage {
    /// Blank card with the factory key.
    pub fn new(uid: impl Into<Vec<u8>>) -> Self {
        Self {
            uid: uid.into(),
            key: SectorKey::default(),
            blocks: HashMap::new(),
            reject_auth_on: None,
            fault_on: None,
        }
    }

    /// Card enrolled with the three attendee fields.
    pub fn attendee(uid: impl Into<Vec<u8>>, student_id: &str, staff_id: &str, name: &str) -> Self {
        let [student_block, staff_block, name_block] = ATTENDEE_BLOCKS;
        Self::new(uid)
            .with_text(student_block, student_id)
            .with_text(staff_block, staff_id)
            .with_text(name_block, name)
    }

    pub fn with_key(mut self, key: SectorKey) -> Self {
        self.key = key;
        self
    }

    pub fn with_block(mut self, block: u8, data: [u8; BLOCK_SIZE]) -> Self {
        self.blocks.insert(block, data);
        self
    }

    /// Store `text` in `block`, zero padded and cut at 16 bytes.
    pub fn with_text(self, block: u8, text: &str) -> Self {
        let mut data = [0u8; BLOCK_SIZE];
        for (slot, byte) in data.iter_mut().zip(text.bytes()) {
            *slot = byte;
        }
        self.with_block(block, data)
    }

    /// Authentication for `block` is refused.
    pub fn rejecting_auth(mut self, block: u8) -> Self {
        self.reject_auth_on = Some(block);
        self
    }

    /// Reading `block` fails after a successful authentication.
    pub fn failing_read(mut self, block: u8) -> Self {
        self.fault_on = Some(block);
        self
    }

    pub fn uid(&self) -> &[u8] {
        &self.uid
    }
}

/// Something entering the RF field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tap {
    Card(CardImage),
    /// Detected but never completes anticollision.
    Unselectable,
}

/// A small fixed roster for simulated runs.
pub fn demo_roster() -> Vec<CardImage> {
    vec![
        CardImage::attendee([0x04, 0xA2, 0x19, 0x7B], "2201001", "T-014", "Ani Rahmawati"),
        CardImage::attendee([0x04, 0x5C, 0xE0, 0x31], "2201002", "T-014", "Budi Santoso"),
        CardImage::attendee(
            [0x04, 0x91, 0x0D, 0xC4],
            "2201003",
            "T-022",
            "Citra Kusumawardhani",
        ),
        CardImage::attendee([0x04, 0x77, 0x3A, 0x52], "2201004", "T-022", "Dewi Lestari"),
    ]
}

// =============================================================================
// MockCardReader
// =============================================================================

/// Call counters, for asserting on reader usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderCounters {
    pub presence_polls: u32,
    pub selects: u32,
    pub authentications: u32,
    pub block_reads: u32,
    pub halts: u32,
    pub crypto_stops: u32,
    pub antenna_toggles: u32,
}

#[derive(Debug)]
struct ReaderState {
    antenna: bool,
    queue: VecDeque<Tap>,
    in_field: Option<Tap>,
    selected: bool,
    authenticated: Option<u8>,
    counters: ReaderCounters,
}

/// Scripted card reader.
pub struct MockCardReader {
    state: Mutex<ReaderState>,
    roster: Vec<CardImage>,
    tap_rate: f64,
    rng: Arc<MockRng>,
    mode: MockMode,
    timing: TimingConfig,
    error_config: ErrorConfig,
}

impl MockCardReader {
    /// Reader with an empty tap queue and the antenna on.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReaderState {
                antenna: true,
                queue: VecDeque::new(),
                in_field: None,
                selected: false,
                authenticated: None,
                counters: ReaderCounters::default(),
            }),
            roster: Vec::new(),
            tap_rate: 0.0,
            rng: Arc::new(MockRng::new(None)),
            mode: MockMode::Instant,
            timing: TimingConfig::reader(),
            error_config: ErrorConfig::none(),
        }
    }

    /// Reader that presents a random roster card on roughly `tap_rate` of
    /// presence polls once its scripted queue is empty.
    pub fn simulated(roster: Vec<CardImage>, tap_rate: f64, seed: Option<u64>) -> Self {
        Self {
            roster,
            tap_rate,
            rng: Arc::new(MockRng::new(seed)),
            mode: MockMode::Realistic,
            ..Self::new()
        }
    }

    pub fn with_mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_error_config(mut self, error_config: ErrorConfig) -> Self {
        self.error_config = error_config;
        self
    }

    pub fn push_tap(&self, tap: Tap) {
        self.state.lock().queue.push_back(tap);
    }

    pub fn push_card(&self, card: CardImage) {
        self.push_tap(Tap::Card(card));
    }

    /// Taps queued but not yet presented.
    pub fn pending_taps(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether a card is still in the field (not yet halted).
    pub fn card_in_field(&self) -> bool {
        self.state.lock().in_field.is_some()
    }

    pub fn antenna_enabled(&self) -> bool {
        self.state.lock().antenna
    }

    pub fn counters(&self) -> ReaderCounters {
        self.state.lock().counters
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        self.error_config
            .check_operation(DRIVER_TYPE, operation)
            .map_err(anyhow::Error::from)
    }

    async fn settle(&self, delay: std::time::Duration) {
        if self.mode.simulates_latency() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn selected_card(state: &ReaderState) -> Result<&CardImage> {
        match (&state.in_field, state.selected) {
            (Some(Tap::Card(card)), true) => Ok(card),
            _ => Err(anyhow!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::InvalidParameter,
                "no card selected",
            ))),
        }
    }
}

impl Default for MockCardReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CardReader for MockCardReader {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    async fn is_new_card_present(&self) -> Result<bool> {
        self.check("presence")?;
        self.settle(self.timing.rf_poll()).await;

        let mut state = self.state.lock();
        state.counters.presence_polls += 1;
        if !state.antenna {
            return Ok(false);
        }
        if state.in_field.is_none() {
            state.in_field = state.queue.pop_front();
        }
        if state.in_field.is_none() && self.rng.should_fail(self.tap_rate) {
            state.in_field = self.rng.pick(&self.roster).cloned().map(Tap::Card);
        }
        Ok(state.in_field.is_some() && !state.selected)
    }

    async fn read_card_serial(&self) -> Result<Option<Vec<u8>>> {
        self.check("select")?;
        self.settle(self.timing.rf_poll()).await;

        let mut state = self.state.lock();
        state.counters.selects += 1;
        let uid = match &state.in_field {
            Some(Tap::Card(card)) => Some(card.uid.clone()),
            Some(Tap::Unselectable) | None => None,
        };
        if uid.is_some() {
            state.selected = true;
        }
        Ok(uid)
    }

    async fn authenticate(&self, block: u8, key: &SectorKey) -> Result<()> {
        self.check("authenticate")?;

        let mut state = self.state.lock();
        state.counters.authentications += 1;
        let card = Self::selected_card(&state)?;
        if card.key != *key || card.reject_auth_on == Some(block) {
            return Err(anyhow!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Authentication,
                format!("key A rejected for block {}", block),
            )));
        }
        state.authenticated = Some(block);
        Ok(())
    }

    async fn read_block(&self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        self.check("read_block")?;
        self.settle(self.timing.block_read()).await;

        let mut state = self.state.lock();
        state.counters.block_reads += 1;
        if state.authenticated != Some(block) {
            return Err(anyhow!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::InvalidParameter,
                format!("block {} not authenticated", block),
            )));
        }
        let card = Self::selected_card(&state)?;
        if card.fault_on == Some(block) {
            return Err(anyhow!(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Communication,
                format!("CRC error reading block {}", block),
            )));
        }
        Ok(card.blocks.get(&block).copied().unwrap_or([0u8; BLOCK_SIZE]))
    }

    async fn halt(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.counters.halts += 1;
        state.in_field = None;
        state.selected = false;
        Ok(())
    }

    async fn stop_crypto(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.counters.crypto_stops += 1;
        state.authenticated = None;
        Ok(())
    }

    async fn set_antenna(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.antenna != enabled {
            state.counters.antenna_toggles += 1;
            state.antenna = enabled;
        }
        Ok(())
    }
}
