//! Buffer ordering and batch formatting working together.

use chrono::Utc;
use rollcall_core::{parse_rows, Batch, IdentityRecord, RecordBuffer, RollcallError};

fn record(n: usize) -> IdentityRecord {
    IdentityRecord::new(
        format!("{:08x}", n),
        [
            format!("{}", 2201000 + n),
            format!("T-{:03}", n % 3),
            format!("Attendee {}", n),
        ],
        Utc::now(),
    )
    .unwrap()
}

fn names(buffer: &RecordBuffer) -> Vec<String> {
    buffer.iter().map(|r| r.name().to_string()).collect()
}

#[test]
fn eleventh_enqueue_is_rejected_without_change() {
    let mut buffer = RecordBuffer::new(10);
    for n in 0..10 {
        assert_eq!(buffer.enqueue(record(n)).unwrap(), n + 1);
    }
    let before = names(&buffer);

    let err = buffer.enqueue(record(10)).unwrap_err();
    assert!(matches!(err, RollcallError::BufferFull { capacity: 10 }));
    assert!(err.is_recoverable());
    assert_eq!(buffer.occupied(), 10);
    assert_eq!(names(&buffer), before);
}

#[test]
fn drain_keeps_remainder_in_order_across_wraparound() {
    let mut buffer = RecordBuffer::new(10);
    for n in 0..8 {
        buffer.enqueue(record(n)).unwrap();
    }
    buffer.commit_drain(6).unwrap();
    for n in 8..16 {
        buffer.enqueue(record(n)).unwrap();
    }
    assert!(buffer.is_full());

    let batch = Batch::format(&buffer.peek_batch(4)).unwrap().unwrap();
    buffer.commit_drain(batch.record_count()).unwrap();

    assert_eq!(
        names(&buffer),
        (10..16).map(|n| format!("Attendee {}", n)).collect::<Vec<_>>()
    );
}

#[test]
fn drain_after_late_enqueues_removes_only_the_sent_records() {
    let mut buffer = RecordBuffer::new(10);
    for n in 0..6 {
        buffer.enqueue(record(n)).unwrap();
    }
    let batch = Batch::format(&buffer.peek_batch(4)).unwrap().unwrap();

    // cards captured while the batch is in flight
    buffer.enqueue(record(6)).unwrap();
    buffer.enqueue(record(7)).unwrap();

    buffer.commit_drain(batch.record_count()).unwrap();
    assert_eq!(
        names(&buffer),
        (4..8).map(|n| format!("Attendee {}", n)).collect::<Vec<_>>()
    );
    let sent = parse_rows(batch.payload()).unwrap();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[3][2], "Attendee 3");
}

#[test]
fn draining_more_than_occupied_is_an_error() {
    let mut buffer = RecordBuffer::new(10);
    buffer.enqueue(record(0)).unwrap();

    let err = buffer.commit_drain(2).unwrap_err();
    assert!(matches!(
        err,
        RollcallError::DrainExceedsOccupancy {
            requested: 2,
            occupied: 1
        }
    ));
    assert_eq!(buffer.occupied(), 1);
}

#[test]
fn formatted_payload_parses_back_to_the_same_rows() {
    let mut buffer = RecordBuffer::new(10);
    for n in 0..7 {
        buffer.enqueue(record(n)).unwrap();
    }
    let peeked = buffer.peek_batch(10);
    let batch = Batch::format(&peeked).unwrap().unwrap();

    let rows = parse_rows(batch.payload()).unwrap();
    assert_eq!(rows.len(), 7);
    for (row, record) in rows.iter().zip(peeked) {
        assert_eq!(row, record.fields());
    }

    let again = Batch::format(&buffer.peek_batch(10)).unwrap().unwrap();
    assert_eq!(again.payload(), batch.payload());
}

#[test]
fn empty_buffer_formats_to_nothing() {
    let buffer = RecordBuffer::new(10);
    assert!(Batch::format(&buffer.peek_batch(10)).unwrap().is_none());
}
