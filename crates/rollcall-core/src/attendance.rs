//! Attendance state machine: recognition followed by the cooldown check.
//!
//! Per identity: `Unknown -> recognized -> (CooldownActive | CheckedIn)`.
//! The recognized step lasts only until the ledger answers, so it is never
//! reported as an outcome. Nothing is persisted about the state itself; it
//! is recomputed from the check-in history on every recognition event, so a
//! just-written check-in puts the identity straight back into
//! `CooldownActive` for later events.

use crate::checkin::CheckInPolicy;
use crate::matcher::MatchError;
use crate::policy::MatchPolicy;
use crate::recognition::RecognitionUseCase;
use crate::types::{Attendee, CheckInRecord, Embedding, Gallery};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckInError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("attendance ledger: {0}")]
    Ledger(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CheckInError {
    pub fn ledger<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        CheckInError::Ledger(Box::new(err))
    }
}

/// What the ledger did with one check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInAttempt {
    /// Persisted under this record id.
    Recorded { id: i64 },
    CoolingDown { remaining_seconds: u64 },
}

impl CheckInAttempt {
    pub fn is_recorded(&self) -> bool {
        matches!(self, CheckInAttempt::Recorded { .. })
    }
}

/// Attendance history the cooldown is evaluated against.
///
/// The ledger is the source of truth for the last check-in time; no
/// in-memory copy is consulted.
pub trait AttendanceLedger {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Display attributes of an enrolled identity.
    fn attendee(&mut self, student_id: &str) -> Result<Option<Attendee>, Self::Error>;

    /// Timestamp of the most recent accepted check-in.
    fn last_check_in(&mut self, student_id: &str) -> Result<Option<DateTime<Utc>>, Self::Error>;

    /// Read the last check-in for `record.student_id`, evaluate `policy` at
    /// `record.timestamp`, and persist `record` only when allowed, as one
    /// atomic operation per identity.
    fn try_check_in(
        &mut self,
        record: &CheckInRecord,
        policy: &CheckInPolicy,
    ) -> Result<CheckInAttempt, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttendanceState {
    Unknown,
    CooldownActive,
    CheckedIn,
}

/// What happened to one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttendanceOutcome {
    NotRecognized,
    CheckedIn(CheckInRecord),
    CooldownActive {
        student_id: String,
        name: String,
        remaining_seconds: u64,
    },
}

impl AttendanceOutcome {
    pub fn state(&self) -> AttendanceState {
        match self {
            AttendanceOutcome::NotRecognized => AttendanceState::Unknown,
            AttendanceOutcome::CheckedIn(_) => AttendanceState::CheckedIn,
            AttendanceOutcome::CooldownActive { .. } => AttendanceState::CooldownActive,
        }
    }

    pub fn student_id(&self) -> Option<&str> {
        match self {
            AttendanceOutcome::NotRecognized => None,
            AttendanceOutcome::CheckedIn(record) => Some(&record.student_id),
            AttendanceOutcome::CooldownActive { student_id, .. } => Some(student_id),
        }
    }
}

/// Runs the check-in flow: recognize, then consult the ledger's cooldown.
#[derive(Debug, Clone)]
pub struct AttendanceDesk<P> {
    recognition: RecognitionUseCase<P>,
    policy: CheckInPolicy,
}

impl<P: MatchPolicy> AttendanceDesk<P> {
    pub fn new(recognition: RecognitionUseCase<P>, policy: CheckInPolicy) -> Self {
        Self {
            recognition,
            policy,
        }
    }

    pub fn check_in_policy(&self) -> &CheckInPolicy {
        &self.policy
    }

    pub fn process<L: AttendanceLedger>(
        &self,
        ledger: &mut L,
        gallery: &Gallery,
        probe: &Embedding,
        now: DateTime<Utc>,
    ) -> Result<AttendanceOutcome, CheckInError> {
        let Some(student_id) = self.recognition.find_best_match(gallery, probe)? else {
            return Ok(AttendanceOutcome::NotRecognized);
        };

        // Gallery snapshots may lag a deletion; fall back to the id as name.
        let attendee = ledger
            .attendee(&student_id)
            .map_err(CheckInError::ledger)?
            .unwrap_or_else(|| Attendee {
                name: student_id.clone(),
                class_name: None,
                grade_name: None,
            });

        let mut record = CheckInRecord::new(student_id, attendee, now);
        let attempt = ledger
            .try_check_in(&record, &self.policy)
            .map_err(CheckInError::ledger)?;

        Ok(match attempt {
            CheckInAttempt::Recorded { id } => {
                tracing::info!(student_id = %record.student_id, id, "check-in recorded");
                record.id = Some(id);
                AttendanceOutcome::CheckedIn(record)
            }
            CheckInAttempt::CoolingDown { remaining_seconds } => {
                tracing::debug!(student_id = %record.student_id, remaining_seconds, "check-in cooling down");
                AttendanceOutcome::CooldownActive {
                    student_id: record.student_id,
                    name: record.name,
                    remaining_seconds,
                }
            }
        })
    }
}
