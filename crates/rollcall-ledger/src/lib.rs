//! rollcall-ledger — the attendance ledger and recording rule.
//!
//! A CSV-backed, append-only record store plus the policy that at most
//! one attendance row per person per calendar date may exist.

pub mod ledger;
pub mod recorder;

pub use ledger::{AttendanceRecord, Ledger, LedgerError};
pub use recorder::{MarkOutcome, Recorder};
