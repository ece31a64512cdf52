//! Check-in path recognition: who is in front of the camera.

use crate::matcher::{FaceMatcher, MatchError, MatchResult, Matcher};
use crate::policy::MatchPolicy;
use crate::types::{Embedding, Gallery};

/// Thin adapter over [`FaceMatcher`] using the recognition threshold.
#[derive(Debug, Clone)]
pub struct RecognitionUseCase<P> {
    matcher: FaceMatcher,
    policy: P,
}

impl<P: MatchPolicy> RecognitionUseCase<P> {
    pub fn new(matcher: FaceMatcher, policy: P) -> Self {
        Self { matcher, policy }
    }

    /// Identity best matching `embedding`, or `None` when nobody is determined.
    pub fn find_best_match(
        &self,
        gallery: &Gallery,
        embedding: &Embedding,
    ) -> Result<Option<String>, MatchError> {
        let result = self.matcher.match_best(
            gallery,
            embedding,
            self.policy.recognition_threshold(),
            self.policy.min_margin(),
        )?;

        match result {
            MatchResult::Match { identity, distance } => {
                tracing::debug!(identity = %identity, distance, "face recognized");
                Ok(Some(identity))
            }
            MatchResult::NoMatch(reason) => {
                tracing::debug!(%reason, "face not recognized");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MatchConfig;

    fn use_case() -> RecognitionUseCase<MatchConfig> {
        RecognitionUseCase::new(FaceMatcher::new(2), MatchConfig::default())
    }

    #[test]
    fn test_recognizes_within_recognition_threshold() {
        let gallery: Gallery = vec![("S1", Embedding::new(vec![1.0, 0.0]))].into_iter().collect();
        // ~0.29 away: too far for registration, close enough for recognition.
        let probe = Embedding::new(vec![1.0, 1.0]);
        assert_eq!(use_case().find_best_match(&gallery, &probe).unwrap().as_deref(), Some("S1"));
    }

    #[test]
    fn test_unknown_face() {
        let gallery: Gallery = vec![("S1", Embedding::new(vec![1.0, 0.0]))].into_iter().collect();
        let probe = Embedding::new(vec![0.0, 1.0]);
        assert_eq!(use_case().find_best_match(&gallery, &probe).unwrap(), None);
    }

    #[test]
    fn test_ambiguous_is_not_recognized() {
        let gallery: Gallery = vec![
            ("S1", Embedding::new(vec![1.0, 0.1])),
            ("S2", Embedding::new(vec![1.0, -0.1])),
        ]
        .into_iter()
        .collect();
        let probe = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(use_case().find_best_match(&gallery, &probe).unwrap(), None);
    }
}
