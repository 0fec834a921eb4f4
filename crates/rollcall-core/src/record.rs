//! Identity records captured from contactless cards.
//!
//! A record is built once from a successful card read and never mutated
//! afterwards. All text that reaches a record goes through [`clean_field`],
//! which keeps printable ASCII only and trims surrounding whitespace. The same
//! routine runs again when records are formatted for dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RollcallError, RollcallResult};

/// Number of data fields stored on a card (student id, staff id, name).
pub const FIELD_COUNT: usize = 3;

/// Longest name rendered on the status display before truncation.
const DISPLAY_NAME_MAX: usize = 16;

/// Strip everything except printable ASCII (0x20..=0x7E), then trim
/// leading and trailing whitespace.
///
/// Cleaning is idempotent: `clean_field(&clean_field(s)) == clean_field(s)`.
pub fn clean_field(raw: &str) -> String {
    let printable: String = raw.chars().filter(|c| matches!(c, ' '..='~')).collect();
    printable.trim().to_string()
}

/// Decode a raw card block into text, dropping padding and control bytes.
pub fn clean_block(raw: &[u8]) -> String {
    let printable: String = raw
        .iter()
        .filter(|b| (0x20..=0x7E).contains(*b))
        .map(|b| char::from(*b))
        .collect();
    printable.trim().to_string()
}

/// Render a card UID as lowercase, zero-padded hex ("04a1ff").
pub fn format_tag_id(uid: &[u8]) -> String {
    uid.iter().map(|b| format!("{:02x}", b)).collect()
}

/// One attendance entry read from a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    tag_id: String,
    fields: [String; FIELD_COUNT],
    captured_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Build a record, cleaning every field.
    ///
    /// Fails with `ReadValidationFailure` when a field is empty after
    /// cleaning; `block` of the error is the field index in that case.
    pub fn new(
        tag_id: impl Into<String>,
        fields: [String; FIELD_COUNT],
        captured_at: DateTime<Utc>,
    ) -> RollcallResult<Self> {
        let mut cleaned: [String; FIELD_COUNT] = Default::default();
        for (index, (slot, raw)) in cleaned.iter_mut().zip(fields.iter()).enumerate() {
            let value = clean_field(raw);
            if value.is_empty() {
                return Err(RollcallError::ReadValidationFailure { block: index as u8 });
            }
            *slot = value;
        }

        Ok(Self {
            tag_id: tag_id.into(),
            fields: cleaned,
            captured_at,
        })
    }

    pub fn tag_id(&self) -> &str {
        &self.tag_id
    }

    pub fn fields(&self) -> &[String; FIELD_COUNT] {
        &self.fields
    }

    pub fn student_id(&self) -> &str {
        &self.fields[0]
    }

    pub fn staff_id(&self) -> &str {
        &self.fields[1]
    }

    pub fn name(&self) -> &str {
        &self.fields[2]
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Name shortened for the 16-column status line.
    pub fn display_name(&self) -> String {
        let name = self.name();
        if name.chars().count() > DISPLAY_NAME_MAX {
            let head: String = name.chars().take(DISPLAY_NAME_MAX - 3).collect();
            format!("{}...", head)
        } else {
            name.to_string()
        }
    }
}
