use rollcall_core::AttendanceOutcome;
use serde::Serialize;

/// What the check-in screen shows for the most recent recognition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckInState {
    /// The gallery is still being loaded.
    pub loading: bool,
    pub student_id: Option<String>,
    pub name: Option<String>,
    pub already_checked_in: bool,
    pub not_registered: bool,
    pub remaining_cooldown_seconds: u64,
}

impl CheckInState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn from_outcome(outcome: &AttendanceOutcome) -> Self {
        match outcome {
            AttendanceOutcome::NotRecognized => Self {
                not_registered: true,
                ..Self::default()
            },
            AttendanceOutcome::CheckedIn(record) => Self {
                student_id: Some(record.student_id.clone()),
                name: Some(record.name.clone()),
                ..Self::default()
            },
            AttendanceOutcome::CooldownActive {
                student_id,
                name,
                remaining_seconds,
            } => Self {
                student_id: Some(student_id.clone()),
                name: Some(name.clone()),
                already_checked_in: true,
                remaining_cooldown_seconds: *remaining_seconds,
                ..Self::default()
            },
        }
    }

    /// One second of countdown. Returns true if anything changed.
    pub fn tick(&mut self) -> bool {
        if self.already_checked_in && self.remaining_cooldown_seconds > 0 {
            self.remaining_cooldown_seconds -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_down_to_zero() {
        let mut state = CheckInState::from_outcome(&AttendanceOutcome::CooldownActive {
            student_id: "S1".into(),
            name: "Ana".into(),
            remaining_seconds: 2,
        });
        assert!(state.tick());
        assert!(state.tick());
        assert_eq!(state.remaining_cooldown_seconds, 0);
        assert!(!state.tick());
        assert!(state.already_checked_in);
    }

    #[test]
    fn test_outcomes_clear_loading() {
        assert!(CheckInState::loading().loading);
        let state = CheckInState::from_outcome(&AttendanceOutcome::NotRecognized);
        assert!(!state.loading);
    }

    #[test]
    fn test_tick_ignores_other_states() {
        let mut state = CheckInState::from_outcome(&AttendanceOutcome::NotRecognized);
        assert!(state.not_registered);
        assert!(!state.tick());
    }
}
