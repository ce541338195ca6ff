//! ViolationLedger: violation tally, threshold policy and the exactly-once submit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{HostError, LockdownError, LockdownResult};
use crate::host::{Notifier, Severity, SubmissionTarget};
use crate::input_guard::ViolationReason;
use crate::session::SessionGate;

pub const TRIP_NOTICE: &str = "Maximum warnings reached. Exam will be submitted.";
pub const TIME_UP_NOTICE: &str = "Time is up. Exam will be submitted.";

/// One appended violation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub reason: ViolationReason,
    /// 1-based position within the session; a total order over arrivals.
    pub sequence: u32,
    pub timestamp: DateTime<Utc>,
}

/// What ended the session's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripCause {
    WarningsExhausted,
    TimeLimit,
}

/// Outcome of a single `report` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Session inactive or already tripped; nothing changed.
    Ignored,
    Warned(ViolationRecord),
    /// This record reached the budget and the submission trigger ran.
    Tripped {
        record: ViolationRecord,
        submitted: bool,
    },
}

pub struct ViolationLedger {
    gate: SessionGate,
    max: u32,
    records: Vec<ViolationRecord>,
    tripped: Option<TripCause>,
    notifier: Arc<dyn Notifier>,
    submission: Arc<dyn SubmissionTarget>,
}

impl ViolationLedger {
    pub fn new(
        gate: SessionGate,
        max: u32,
        notifier: Arc<dyn Notifier>,
        submission: Arc<dyn SubmissionTarget>,
    ) -> Self {
        Self {
            gate,
            max: max.max(1),
            records: Vec::new(),
            tripped: None,
            notifier,
            submission,
        }
    }

    pub fn count(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn records(&self) -> &[ViolationRecord] {
        &self.records
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.is_some()
    }

    pub fn trip_cause(&self) -> Option<TripCause> {
        self.tripped
    }

    /// Start-of-session reset: zero count, no records, untripped.
    pub fn reset(&mut self) {
        self.records.clear();
        self.tripped = None;
    }

    /// Record a violation. On the transition to `max`, submits exactly once.
    ///
    /// A missing submission target still leaves the ledger tripped; the error
    /// is returned alongside so the caller can surface it to the host.
    pub fn report(&mut self, reason: ViolationReason) -> (ReportOutcome, Option<LockdownError>) {
        if !self.gate.is_active() || self.is_tripped() {
            return (ReportOutcome::Ignored, None);
        }

        let record = ViolationRecord {
            reason,
            sequence: self.count() + 1,
            timestamp: Utc::now(),
        };
        self.records.push(record.clone());

        let message = format!("Warning {}/{}: {}", record.sequence, self.max, reason);
        warn!(
            target: "proctor::ledger",
            sequence = record.sequence,
            max = self.max,
            %reason,
            "violation recorded"
        );
        self.notifier.notify(&message, Severity::Warning);

        if self.count() < self.max {
            return (ReportOutcome::Warned(record), None);
        }

        match self.trip(TripCause::WarningsExhausted) {
            Ok(submitted) => (ReportOutcome::Tripped { record, submitted }, None),
            Err(e) => (
                ReportOutcome::Tripped {
                    record,
                    submitted: false,
                },
                Some(e),
            ),
        }
    }

    /// Trip because the exam clock ran out. No-op when inactive or already tripped.
    pub fn expire(&mut self) -> LockdownResult<bool> {
        if !self.gate.is_active() || self.is_tripped() {
            return Ok(false);
        }
        self.trip(TripCause::TimeLimit)
    }

    /// The single place submission happens. Latches before activating so a
    /// re-entrant or repeated trip can never submit twice.
    fn trip(&mut self, cause: TripCause) -> LockdownResult<bool> {
        if self.tripped.is_some() {
            return Ok(false);
        }
        self.tripped = Some(cause);

        let notice = match cause {
            TripCause::WarningsExhausted => TRIP_NOTICE,
            TripCause::TimeLimit => TIME_UP_NOTICE,
        };
        info!(target: "proctor::ledger", ?cause, count = self.count(), "ledger tripped");
        self.notifier.notify(notice, Severity::Warning);

        match self.submission.activate() {
            Ok(()) => {
                info!(
                    target: "proctor::ledger",
                    selector = self.submission.selector(),
                    "submission triggered"
                );
                Ok(true)
            }
            Err(HostError::TargetMissing(selector)) => {
                error!(
                    target: "proctor::ledger",
                    %selector,
                    "submission target missing; tripped exam was not submitted"
                );
                Err(LockdownError::SubmissionTargetMissing { selector })
            }
            Err(e) => {
                error!(target: "proctor::ledger", error = %e, "submission trigger failed");
                Err(LockdownError::Host(e))
            }
        }
    }
}

impl std::fmt::Debug for ViolationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViolationLedger")
            .field("count", &self.count())
            .field("max", &self.max)
            .field("tripped", &self.tripped)
            .finish()
    }
}
