//! Batch formatting and the endpoint command envelope.
//!
//! A batch is the wire form of a run of buffered records: an array of
//! three-string arrays `[student_id, staff_id, name]`, oldest record first.
//! Every field is cleaned again while formatting, so the payload never
//! contains control characters even if a record was built elsewhere.

use serde::{Deserialize, Serialize};

use crate::error::RollcallResult;
use crate::record::{clean_field, IdentityRecord, FIELD_COUNT};

/// One spreadsheet row.
pub type Row = [String; FIELD_COUNT];

/// Formatted records ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    rows: Vec<Row>,
    payload: String,
}

impl Batch {
    /// Format `records` in order.
    ///
    /// Returns `Ok(None)` for an empty slice: there is nothing to send.
    pub fn format(records: &[&IdentityRecord]) -> RollcallResult<Option<Self>> {
        if records.is_empty() {
            return Ok(None);
        }

        let rows: Vec<Row> = records
            .iter()
            .map(|record| {
                let [a, b, c] = record.fields();
                [clean_field(a), clean_field(b), clean_field(c)]
            })
            .collect();
        let payload = serde_json::to_string(&rows)?;

        Ok(Some(Self { rows, payload }))
    }

    /// Number of records carried; this is what a confirmed delivery drains.
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The `values` array as JSON text.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Parse a batch payload back into rows.
pub fn parse_rows(payload: &str) -> RollcallResult<Vec<Row>> {
    Ok(serde_json::from_str(payload)?)
}

/// JSON body posted to the spreadsheet endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EndpointCommand {
    /// Append rows to a sheet.
    InsertRows {
        sheet_name: String,
        values: Vec<Row>,
    },
    /// Reachability check; carries no data.
    TestConnection,
}

impl EndpointCommand {
    pub fn insert_rows(sheet_name: impl Into<String>, batch: &Batch) -> Self {
        EndpointCommand::InsertRows {
            sheet_name: sheet_name.into(),
            values: batch.rows.clone(),
        }
    }

    pub fn to_json(&self) -> RollcallResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(student: &str, staff: &str, name: &str) -> IdentityRecord {
        IdentityRecord::new(
            "0a0b",
            [student.to_string(), staff.to_string(), name.to_string()],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_input_is_nothing_to_send() {
        assert!(Batch::format(&[]).unwrap().is_none());
    }

    #[test]
    fn test_format_layout() {
        let a = record("0012", "1987", "Rina");
        let b = record("0013", "-", "Agus \"A\"");
        let batch = Batch::format(&[&a, &b]).unwrap().unwrap();

        assert_eq!(batch.record_count(), 2);
        assert_eq!(
            batch.payload(),
            r#"[["0012","1987","Rina"],["0013","-","Agus \"A\""]]"#
        );
    }

    #[test]
    fn test_format_is_deterministic() {
        let a = record("1", "2", "Ani");
        let b = record("3", "4", "Budi");
        let first = Batch::format(&[&a, &b]).unwrap().unwrap();
        let second = Batch::format(&[&a, &b]).unwrap().unwrap();
        assert_eq!(first.payload(), second.payload());
    }

    #[test]
    fn test_payload_round_trip() {
        let records = [
            record("0001", "9001", "Siti Aminah"),
            record("0002", "9002", "O'Neil \\ Slash"),
            record("0003", "9003", "Wayan"),
        ];
        let refs: Vec<&IdentityRecord> = records.iter().collect();
        let batch = Batch::format(&refs).unwrap().unwrap();

        let rows = parse_rows(batch.payload()).unwrap();
        assert_eq!(rows.len(), 3);
        for (row, record) in rows.iter().zip(records.iter()) {
            assert_eq!(row, record.fields());
        }
    }

    #[test]
    fn test_insert_rows_envelope() {
        let a = record("1", "2", "Ani");
        let batch = Batch::format(&[&a]).unwrap().unwrap();
        let json = EndpointCommand::insert_rows("LOG_Attendance", &batch)
            .to_json()
            .unwrap();
        assert_eq!(
            json,
            r#"{"command":"insert_rows","sheet_name":"LOG_Attendance","values":[["1","2","Ani"]]}"#
        );
    }

    #[test]
    fn test_test_connection_envelope() {
        let json = EndpointCommand::TestConnection.to_json().unwrap();
        assert_eq!(json, r#"{"command":"test_connection"}"#);

        let parsed: EndpointCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EndpointCommand::TestConnection);
    }
}
