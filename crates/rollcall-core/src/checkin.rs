//! Check-in cooldown policy.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Default minimum time between two accepted check-ins for one identity.
pub const DEFAULT_COOLDOWN_SECS: i64 = 120;

/// Result of evaluating the cooldown for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckInDecision {
    Allowed,
    CoolingDown { remaining_seconds: u64 },
}

impl CheckInDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CheckInDecision::Allowed)
    }

    pub fn remaining_seconds(&self) -> u64 {
        match self {
            CheckInDecision::Allowed => 0,
            CheckInDecision::CoolingDown { remaining_seconds } => *remaining_seconds,
        }
    }
}

/// Decides whether an identity may record a new attendance event, given
/// the timestamp of its last accepted check-in.
///
/// Pure function of its inputs. A last check-in in the future (clock
/// skew) counts as zero elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInPolicy {
    cooldown: TimeDelta,
}

impl CheckInPolicy {
    pub fn new(cooldown: TimeDelta) -> Self {
        Self {
            cooldown: cooldown.max(TimeDelta::zero()),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX);
        Self::new(TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX))
    }

    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    fn elapsed(last: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
        (now - last).max(TimeDelta::zero())
    }

    /// Boundary inclusive: exactly `cooldown` elapsed is allowed.
    pub fn can_check_in(&self, last_check_in: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_check_in {
            None => true,
            Some(last) => Self::elapsed(last, now) >= self.cooldown,
        }
    }

    /// Whole seconds left in the cooldown window, never negative.
    pub fn remaining_seconds(&self, last_check_in: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
        let Some(last) = last_check_in else {
            return 0;
        };
        let remaining = self.cooldown.num_seconds() - Self::elapsed(last, now).num_seconds();
        u64::try_from(remaining).unwrap_or(0)
    }

    pub fn evaluate(&self, last_check_in: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CheckInDecision {
        if self.can_check_in(last_check_in, now) {
            CheckInDecision::Allowed
        } else {
            CheckInDecision::CoolingDown {
                remaining_seconds: self.remaining_seconds(last_check_in, now),
            }
        }
    }
}

impl Default for CheckInPolicy {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(DEFAULT_COOLDOWN_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-10T08:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_first_check_in() {
        let policy = CheckInPolicy::default();
        assert!(policy.can_check_in(None, now()));
        assert_eq!(policy.remaining_seconds(None, now()), 0);
        assert_eq!(policy.evaluate(None, now()), CheckInDecision::Allowed);
    }

    #[test]
    fn test_within_window() {
        let policy = CheckInPolicy::from_secs(120);
        let last = Some(now() - TimeDelta::seconds(60));
        assert!(!policy.can_check_in(last, now()));
        assert_eq!(policy.remaining_seconds(last, now()), 60);
        assert_eq!(
            policy.evaluate(last, now()),
            CheckInDecision::CoolingDown { remaining_seconds: 60 }
        );
    }

    #[test]
    fn test_exactly_at_boundary() {
        let policy = CheckInPolicy::from_secs(120);
        let last = Some(now() - TimeDelta::seconds(120));
        assert!(policy.can_check_in(last, now()));
        assert_eq!(policy.remaining_seconds(last, now()), 0);
    }

    #[test]
    fn test_just_before_boundary() {
        let policy = CheckInPolicy::from_secs(120);
        let last = Some(now() - TimeDelta::milliseconds(119_500));
        assert!(!policy.can_check_in(last, now()));
        assert_eq!(policy.remaining_seconds(last, now()), 1);
    }

    #[test]
    fn test_after_window() {
        let policy = CheckInPolicy::from_secs(120);
        let last = Some(now() - TimeDelta::minutes(30));
        assert!(policy.can_check_in(last, now()));
        assert_eq!(policy.remaining_seconds(last, now()), 0);
    }

    #[test]
    fn test_future_last_check_in_is_full_cooldown() {
        let policy = CheckInPolicy::from_secs(120);
        let last = Some(now() + TimeDelta::seconds(30));
        assert!(!policy.can_check_in(last, now()));
        assert_eq!(policy.remaining_seconds(last, now()), 120);
    }

    #[test]
    fn test_zero_cooldown_always_allows() {
        let policy = CheckInPolicy::from_secs(0);
        assert!(policy.can_check_in(Some(now()), now()));
    }
}
