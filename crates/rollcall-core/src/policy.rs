//! Threshold policy for the two matching use cases.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cosine-distance threshold at enrollment (duplicate guard).
pub const DEFAULT_REGISTRATION_THRESHOLD: f32 = 0.25;
/// Default cosine-distance threshold at check-in.
pub const DEFAULT_RECOGNITION_THRESHOLD: f32 = 0.40;
/// Default minimum gap between best and second-best distances.
pub const DEFAULT_MIN_MARGIN: f32 = 0.05;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("{name} must be a finite non-negative number, got {value}")]
    InvalidValue { name: &'static str, value: f32 },
    #[error(
        "registration threshold ({registration}) must not be looser than recognition threshold ({recognition})"
    )]
    RegistrationLooserThanRecognition { registration: f32, recognition: f32 },
}

/// How strict biometric decisions are. Thresholds are maximum accepted
/// cosine distances (lower = stricter).
pub trait MatchPolicy {
    /// Threshold when enrolling a new face. Strict, to keep identities unique.
    fn registration_threshold(&self) -> f32;

    /// Threshold during recognition; tolerates pose and lighting variance.
    fn recognition_threshold(&self) -> f32;

    /// Minimum distance gap between best and second-best candidates.
    fn min_margin(&self) -> f32;
}

/// Tunable thresholds, loaded from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub registration_threshold: f32,
    pub recognition_threshold: f32,
    pub min_margin: f32,
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (name, value) in [
            ("registration_threshold", self.registration_threshold),
            ("recognition_threshold", self.recognition_threshold),
            ("min_margin", self.min_margin),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::InvalidValue { name, value });
            }
        }
        if self.registration_threshold > self.recognition_threshold {
            return Err(PolicyError::RegistrationLooserThanRecognition {
                registration: self.registration_threshold,
                recognition: self.recognition_threshold,
            });
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            registration_threshold: DEFAULT_REGISTRATION_THRESHOLD,
            recognition_threshold: DEFAULT_RECOGNITION_THRESHOLD,
            min_margin: DEFAULT_MIN_MARGIN,
        }
    }
}

impl MatchPolicy for MatchConfig {
    fn registration_threshold(&self) -> f32 {
        self.registration_threshold
    }

    fn recognition_threshold(&self) -> f32 {
        self.recognition_threshold
    }

    fn min_margin(&self) -> f32 {
        self.min_margin
    }
}
