//! The once-per-person-per-day recording rule.

use crate::ledger::{AttendanceRecord, Ledger, LedgerError};
use chrono::{NaiveDateTime, Timelike};

/// Outcome of one recording attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    /// A new row was written.
    Recorded(AttendanceRecord),
    /// The person already has a row for this calendar date; nothing was
    /// written.
    AlreadyMarked,
}

/// Applies the attendance policy: at most one row per person per calendar
/// date.
///
/// The recorder owns the ledger exclusively, so the check-then-append
/// sequence cannot interleave within one process. Sharing the ledger file
/// across processes or threads would need an insert-if-absent primitive
/// in the store itself.
pub struct Recorder {
    ledger: Ledger,
}

impl Recorder {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Record attendance for the calendar date of `now`.
    ///
    /// Re-marking the same person on the same date is an idempotent no-op
    /// returning [`MarkOutcome::AlreadyMarked`].
    pub fn mark(
        &mut self,
        name: &str,
        roll_no: &str,
        now: NaiveDateTime,
    ) -> Result<MarkOutcome, LedgerError> {
        let date = now.date();
        if self.ledger.has_record(roll_no, date) {
            tracing::info!(name, roll_no, %date, "already marked today");
            return Ok(MarkOutcome::AlreadyMarked);
        }

        // Timestamps are stored at whole-second granularity.
        let time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());
        let record = AttendanceRecord {
            roll_no: roll_no.to_string(),
            name: name.to_string(),
            date,
            time,
        };
        self.ledger.append(&record)?;

        tracing::info!(name, roll_no, %date, %time, "attendance recorded");
        Ok(MarkOutcome::Recorded(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn recorder(dir: &tempfile::TempDir) -> (Recorder, PathBuf) {
        let path = dir.path().join("attendance.csv");
        (Recorder::new(Ledger::open(&path).unwrap()), path)
    }

    fn at(date: (i32, u32, u32), time: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, time.2)
            .unwrap()
    }

    #[test]
    fn test_first_mark_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, _) = recorder(&dir);

        let outcome = recorder.mark("Amit", "105", at((2024, 1, 1), (9, 0, 0))).unwrap();
        match outcome {
            MarkOutcome::Recorded(record) => {
                assert_eq!(record.roll_no, "105");
                assert_eq!(record.name, "Amit");
                assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
                assert_eq!(record.time.to_string(), "09:00:00");
            }
            other => panic!("expected recorded, got {other:?}"),
        }
    }

    #[test]
    fn test_same_day_re_mark_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, path) = recorder(&dir);

        recorder.mark("Amit", "105", at((2024, 1, 1), (9, 0, 0))).unwrap();
        let second = recorder.mark("Amit", "105", at((2024, 1, 1), (9, 5, 0))).unwrap();

        assert_eq!(second, MarkOutcome::AlreadyMarked);
        // Still exactly one row on disk.
        assert_eq!(Ledger::read_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_next_day_mark_appends_new_row() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, path) = recorder(&dir);

        recorder.mark("Amit", "105", at((2024, 1, 1), (9, 0, 0))).unwrap();
        let next_day = recorder.mark("Amit", "105", at((2024, 1, 2), (9, 0, 0))).unwrap();

        assert!(matches!(next_day, MarkOutcome::Recorded(_)));
        let rows = Ledger::read_records(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_distinct_people_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, path) = recorder(&dir);

        let first = recorder.mark("Amit", "105", at((2024, 1, 1), (9, 0, 0))).unwrap();
        let second = recorder.mark("Asha", "106", at((2024, 1, 1), (9, 1, 0))).unwrap();

        assert!(matches!(first, MarkOutcome::Recorded(_)));
        assert!(matches!(second, MarkOutcome::Recorded(_)));
        assert_eq!(Ledger::read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_dedup_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");

        {
            let mut recorder = Recorder::new(Ledger::open(&path).unwrap());
            recorder.mark("Amit", "105", at((2024, 1, 1), (9, 0, 0))).unwrap();
        }

        // A fresh process on the same day must still refuse to double-mark.
        let mut recorder = Recorder::new(Ledger::open(&path).unwrap());
        let outcome = recorder.mark("Amit", "105", at((2024, 1, 1), (11, 30, 0))).unwrap();
        assert_eq!(outcome, MarkOutcome::AlreadyMarked);
        assert_eq!(Ledger::read_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_subsecond_timestamps_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, path) = recorder(&dir);

        let now = at((2024, 1, 1), (9, 0, 0)) + chrono::Duration::nanoseconds(123_456_789);
        recorder.mark("Amit", "105", now).unwrap();

        let rows = Ledger::read_records(&path).unwrap();
        assert_eq!(rows[0].time.to_string(), "09:00:00");
    }
}
