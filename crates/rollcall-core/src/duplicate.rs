//! Registration-time duplicate guard.

use crate::matcher::{FaceMatcher, MatchError, MatchResult, Matcher};
use crate::policy::MatchPolicy;
use crate::types::{Embedding, Gallery};

/// Blocks enrolling a face that already exists in the gallery.
///
/// Delegates the decision to [`FaceMatcher`] with the registration threshold.
#[derive(Debug, Clone)]
pub struct DuplicateDetector<P> {
    matcher: FaceMatcher,
    policy: P,
}

impl<P: MatchPolicy> DuplicateDetector<P> {
    pub fn new(matcher: FaceMatcher, policy: P) -> Self {
        Self { matcher, policy }
    }

    /// Identity of an enrolled face matching `embedding`, if any.
    pub fn find_duplicate(
        &self,
        gallery: &Gallery,
        embedding: &Embedding,
    ) -> Result<Option<String>, MatchError> {
        let result = self.matcher.match_best(
            gallery,
            embedding,
            self.policy.registration_threshold(),
            self.policy.min_margin(),
        )?;

        match result {
            MatchResult::Match { identity, distance } => {
                tracing::debug!(identity = %identity, distance, "duplicate face found");
                Ok(Some(identity))
            }
            MatchResult::NoMatch(reason) => {
                tracing::debug!(%reason, "no duplicate face");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MatchConfig;

    fn detector() -> DuplicateDetector<MatchConfig> {
        DuplicateDetector::new(FaceMatcher::new(2), MatchConfig::default())
    }

    #[test]
    fn test_duplicate_found() {
        let gallery: Gallery = vec![("S1", Embedding::new(vec![1.0, 0.0]))].into_iter().collect();
        let dup = detector().find_duplicate(&gallery, &Embedding::new(vec![1.0, 0.05])).unwrap();
        assert_eq!(dup.as_deref(), Some("S1"));
    }

    #[test]
    fn test_uses_registration_threshold() {
        // Distance ~0.29: inside the recognition threshold, outside registration.
        let gallery: Gallery = vec![("S1", Embedding::new(vec![1.0, 0.0]))].into_iter().collect();
        let probe = Embedding::new(vec![1.0, 1.0]);
        let d = probe.distance(gallery.get("S1").unwrap());
        assert!(d > 0.25 && d < 0.40, "d = {d}");
        assert_eq!(detector().find_duplicate(&gallery, &probe).unwrap(), None);
    }

    #[test]
    fn test_empty_gallery_has_no_duplicate() {
        let dup = detector().find_duplicate(&Gallery::new(), &Embedding::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(dup, None);
    }

    #[test]
    fn test_size_mismatch_propagates() {
        let err = detector().find_duplicate(&Gallery::new(), &Embedding::new(vec![1.0])).unwrap_err();
        assert!(matches!(err, MatchError::ProbeDimension { .. }));
    }
}
