//! Nearest-neighbour face matcher with margin-based ambiguity rejection.
//!
//! This is the single place biometric decisions are made: the duplicate
//! detector and the recognition use case only choose the threshold.

use crate::distance::cosine_distance;
use crate::types::{Embedding, Gallery};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Embedding length produced by the bundled recognition model.
pub const DEFAULT_EMBEDDING_SIZE: usize = 512;

/// Contract violations: the probe or a gallery entry has the wrong length.
///
/// These indicate an upstream model/data mismatch and are never folded into
/// a [`MatchResult::NoMatch`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("probe embedding size mismatch: expected {expected}, got {actual}")]
    ProbeDimension { expected: usize, actual: usize },
    #[error("gallery embedding size mismatch for id={identity}: expected {expected}, got {actual}")]
    GalleryDimension {
        identity: String,
        expected: usize,
        actual: usize,
    },
}

/// Why no identity was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoMatchReason {
    EmptyGallery,
    NoCandidateUnderThreshold,
    AmbiguousMargin,
}

impl NoMatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoMatchReason::EmptyGallery => "Gallery is empty",
            NoMatchReason::NoCandidateUnderThreshold => "No candidate under threshold",
            NoMatchReason::AmbiguousMargin => "Ambiguous match (margin too small)",
        }
    }
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of matching a probe against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MatchResult {
    Match { identity: String, distance: f32 },
    NoMatch(NoMatchReason),
}

impl MatchResult {
    pub fn identity(&self) -> Option<&str> {
        match self {
            MatchResult::Match { identity, .. } => Some(identity),
            MatchResult::NoMatch(_) => None,
        }
    }
}

/// Diagnostics for a match rejected because the runner-up was too close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousMatch {
    pub best_id: String,
    pub best_distance: f32,
    pub second_best_distance: f32,
    pub threshold: f32,
    pub min_margin: f32,
}

/// Observability hook for threshold tuning. Never influences the decision.
pub trait DecisionLogger: Send + Sync {
    fn on_ambiguous_match(&self, event: &AmbiguousMatch);
}

/// Emits ambiguous-match diagnostics as structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDecisionLogger;

impl DecisionLogger for TracingDecisionLogger {
    fn on_ambiguous_match(&self, event: &AmbiguousMatch) {
        tracing::info!(
            best_id = %event.best_id,
            best_distance = event.best_distance,
            second_best_distance = event.second_best_distance,
            threshold = event.threshold,
            min_margin = event.min_margin,
            "ambiguous match rejected"
        );
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    /// Find the closest identity within `threshold`, rejecting it when the
    /// runner-up is less than `min_margin` further away. A `min_margin` of
    /// zero disables the ambiguity check.
    fn match_best(
        &self,
        gallery: &Gallery,
        probe: &Embedding,
        threshold: f32,
        min_margin: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Cosine-distance matcher over L2-normalised embeddings.
///
/// Single O(n) pass tracking best and second-best distances; the gallery is
/// never sorted. On exactly equal distances the first identity in gallery
/// order wins.
#[derive(Clone)]
pub struct FaceMatcher {
    embedding_size: usize,
    logger: Option<Arc<dyn DecisionLogger>>,
}

impl FaceMatcher {
    pub fn new(embedding_size: usize) -> Self {
        Self {
            embedding_size,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn DecisionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn embedding_size(&self) -> usize {
        self.embedding_size
    }
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_SIZE)
    }
}

impl fmt::Debug for FaceMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaceMatcher")
            .field("embedding_size", &self.embedding_size)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Matcher for FaceMatcher {
    fn match_best(
        &self,
        gallery: &Gallery,
        probe: &Embedding,
        threshold: f32,
        min_margin: f32,
    ) -> Result<MatchResult, MatchError> {
        if probe.len() != self.embedding_size {
            return Err(MatchError::ProbeDimension {
                expected: self.embedding_size,
                actual: probe.len(),
            });
        }

        if gallery.is_empty() {
            return Ok(MatchResult::NoMatch(NoMatchReason::EmptyGallery));
        }

        let norm_probe = probe.l2_normalized();

        let mut best: Option<(&str, f32)> = None;
        let mut second_best: Option<f32> = None;

        for (id, emb) in gallery.iter() {
            if emb.len() != self.embedding_size {
                return Err(MatchError::GalleryDimension {
                    identity: id.to_string(),
                    expected: self.embedding_size,
                    actual: emb.len(),
                });
            }

            let distance = cosine_distance(&emb.l2_normalized().values, &norm_probe.values);

            match best {
                Some((_, best_distance)) if distance >= best_distance => {
                    if second_best.map_or(true, |s| distance < s) {
                        second_best = Some(distance);
                    }
                }
                // A NaN distance never displaces a real candidate.
                Some(_) if distance.is_nan() => {}
                Some((_, best_distance)) => {
                    second_best = Some(best_distance);
                    best = Some((id, distance));
                }
                None if distance.is_nan() => {}
                None => best = Some((id, distance)),
            }
        }

        let (best_id, best_distance) = match best {
            Some((id, d)) if d <= threshold => (id, d),
            _ => return Ok(MatchResult::NoMatch(NoMatchReason::NoCandidateUnderThreshold)),
        };

        if min_margin > 0.0 {
            if let Some(second_best_distance) = second_best {
                if second_best_distance - best_distance < min_margin {
                    if let Some(logger) = &self.logger {
                        logger.on_ambiguous_match(&AmbiguousMatch {
                            best_id: best_id.to_string(),
                            best_distance,
                            second_best_distance,
                            threshold,
                            min_margin,
                        });
                    }
                    return Ok(MatchResult::NoMatch(NoMatchReason::AmbiguousMargin));
                }
            }
        }

        Ok(MatchResult::Match {
            identity: best_id.to_string(),
            distance: best_distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn matcher() -> FaceMatcher {
        FaceMatcher::new(3)
    }

    #[derive(Default)]
    struct RecordingLogger {
        events: Mutex<Vec<AmbiguousMatch>>,
    }

    impl DecisionLogger for RecordingLogger {
        fn on_ambiguous_match(&self, event: &AmbiguousMatch) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_empty_gallery() {
        let result = matcher().match_best(&Gallery::new(), &emb(&[1.0, 0.0, 0.0]), 0.4, 0.05).unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::EmptyGallery));
        assert_eq!(NoMatchReason::EmptyGallery.to_string(), "Gallery is empty");
    }

    #[test]
    fn test_probe_size_mismatch_is_error() {
        let gallery: Gallery = vec![("S1", emb(&[1.0, 0.0, 0.0]))].into_iter().collect();
        let err = matcher().match_best(&gallery, &emb(&[1.0, 0.0]), 0.4, 0.0).unwrap_err();
        assert_eq!(err, MatchError::ProbeDimension { expected: 3, actual: 2 });
    }

    #[test]
    fn test_probe_size_checked_before_empty_gallery() {
        let err = matcher().match_best(&Gallery::new(), &emb(&[1.0]), 0.4, 0.0).unwrap_err();
        assert!(matches!(err, MatchError::ProbeDimension { .. }));
    }

    #[test]
    fn test_gallery_size_mismatch_names_identity() {
        let gallery: Gallery = vec![
            ("S1", emb(&[1.0, 0.0, 0.0])),
            ("S2", emb(&[1.0, 0.0])),
        ]
        .into_iter()
        .collect();
        let err = matcher().match_best(&gallery, &emb(&[1.0, 0.0, 0.0]), 0.4, 0.0).unwrap_err();
        assert_eq!(
            err,
            MatchError::GalleryDimension { identity: "S2".into(), expected: 3, actual: 2 }
        );
        assert!(err.to_string().contains("id=S2"));
    }

    #[test]
    fn test_best_candidate_wins() {
        // Best match is last in gallery order.
        let gallery: Gallery = vec![
            ("a", emb(&[0.0, 1.0, 0.0])),
            ("b", emb(&[0.0, 0.0, 1.0])),
            ("c", emb(&[1.0, 0.05, 0.0])),
        ]
        .into_iter()
        .collect();
        let result = matcher().match_best(&gallery, &emb(&[1.0, 0.0, 0.0]), 0.4, 0.05).unwrap();
        assert_eq!(result.identity(), Some("c"));
    }

    #[test]
    fn test_no_candidate_under_threshold() {
        let gallery: Gallery = vec![("S1", emb(&[0.0, 1.0, 0.0]))].into_iter().collect();
        let result = matcher().match_best(&gallery, &emb(&[1.0, 0.0, 0.0]), 0.4, 0.0).unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::NoCandidateUnderThreshold));
    }

    #[test]
    fn test_distance_equal_to_threshold_matches() {
        let gallery: Gallery = vec![("S1", emb(&[0.0, 1.0, 0.0]))].into_iter().collect();
        // Orthogonal vectors are exactly distance 1.0.
        let result = matcher().match_best(&gallery, &emb(&[1.0, 0.0, 0.0]), 1.0, 0.0).unwrap();
        assert_eq!(result.identity(), Some("S1"));
    }

    #[test]
    fn test_ambiguous_margin_rejected_and_logged() {
        let logger = Arc::new(RecordingLogger::default());
        let m = matcher().with_logger(logger.clone());
        // Both entries sit at the same small angle from the probe.
        let gallery: Gallery = vec![
            ("S1", emb(&[1.0, 0.1, 0.0])),
            ("S2", emb(&[1.0, 0.0, 0.1])),
        ]
        .into_iter()
        .collect();
        let result = m.match_best(&gallery, &emb(&[1.0, 0.0, 0.0]), 0.4, 0.05).unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::AmbiguousMargin));

        let events = logger.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].best_id, "S1");
        assert_eq!(events[0].threshold, 0.4);
        assert_eq!(events[0].min_margin, 0.05);
        assert!(events[0].second_best_distance >= events[0].best_distance);
    }

    #[test]
    fn test_zero_margin_disables_ambiguity_check() {
        let gallery: Gallery = vec![
            ("S1", emb(&[1.0, 0.1, 0.0])),
            ("S2", emb(&[1.0, 0.0, 0.1])),
        ]
        .into_iter()
        .collect();
        let result = matcher().match_best(&gallery, &emb(&[1.0, 0.0, 0.0]), 0.4, 0.0).unwrap();
        assert_eq!(result.identity(), Some("S1"));
    }

    #[test]
    fn test_sufficient_margin_matches() {
        let gallery: Gallery = vec![
            ("S1", emb(&[1.0, 0.0, 0.0])),
            ("S2", emb(&[0.0, 1.0, 0.0])),
        ]
        .into_iter()
        .collect();
        let result = matcher().match_best(&gallery, &emb(&[1.0, 0.02, 0.0]), 0.25, 0.05).unwrap();
        match result {
            MatchResult::Match { identity, distance } => {
                assert_eq!(identity, "S1");
                assert!(distance < 0.01, "distance = {distance}");
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_runner_up_outside_threshold_still_counts_for_margin() {
        // Runner-up is above threshold but within the margin of the best.
        let gallery: Gallery = vec![
            ("S1", emb(&[1.0, 0.0, 0.0])),
            ("S2", emb(&[1.0, 1.0, 0.0])),
        ]
        .into_iter()
        .collect();
        let probe = emb(&[1.0, 0.85, 0.0]);
        let d1 = probe.distance(gallery.get("S1").unwrap());
        let d2 = probe.distance(gallery.get("S2").unwrap());
        let threshold = d2 + 0.01;
        assert!(d2 < d1 && d1 > threshold);
        let result = matcher().match_best(&gallery, &probe, threshold, 0.5).unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::AmbiguousMargin));
    }

    #[test]
    fn test_exact_tie_resolves_to_first_identity() {
        let gallery: Gallery = vec![
            ("b", emb(&[1.0, 0.0, 0.0])),
            ("a", emb(&[1.0, 0.0, 0.0])),
        ]
        .into_iter()
        .collect();
        let result = matcher().match_best(&gallery, &emb(&[1.0, 0.0, 0.0]), 0.4, 0.0).unwrap();
        assert_eq!(result.identity(), Some("a"));
    }

    #[test]
    fn test_zero_probe_never_matches_tight_threshold() {
        let gallery: Gallery = vec![("S1", emb(&[1.0, 0.0, 0.0]))].into_iter().collect();
        let result = matcher().match_best(&gallery, &emb(&[0.0, 0.0, 0.0]), 0.4, 0.0).unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::NoCandidateUnderThreshold));
    }
}
