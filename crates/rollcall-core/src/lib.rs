//! rollcall-core — Biometric matching and attendance decisions.
//!
//! Nearest-neighbour cosine matching with margin-based ambiguity rejection,
//! the registration/recognition adapters built on it, and the check-in
//! cooldown policy. No I/O: galleries, probes and attendance history are
//! supplied by the caller.

pub mod attendance;
pub mod checkin;
pub mod distance;
pub mod duplicate;
pub mod matcher;
pub mod policy;
pub mod recognition;
pub mod types;

pub use attendance::{
    AttendanceDesk, AttendanceLedger, AttendanceOutcome, AttendanceState, CheckInAttempt,
    CheckInError,
};
pub use checkin::{CheckInDecision, CheckInPolicy};
pub use distance::cosine_distance;
pub use duplicate::DuplicateDetector;
pub use matcher::{
    AmbiguousMatch, DecisionLogger, FaceMatcher, MatchError, MatchResult, Matcher, NoMatchReason,
    TracingDecisionLogger, DEFAULT_EMBEDDING_SIZE,
};
pub use policy::{MatchConfig, MatchPolicy, PolicyError};
pub use recognition::RecognitionUseCase;
pub use types::{Attendee, CheckInRecord, Classification, Embedding, FaceRecord, Gallery};
