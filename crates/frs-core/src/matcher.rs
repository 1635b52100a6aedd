//! Fixed-threshold nearest-label matching over the registered set.

use crate::types::{Embedding, MatchLabel, MatchResult, RegisteredFace};

/// Maximum descriptor distance for a query to count as a registered identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Label reported for a query that matches nobody.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Distance function between two descriptors, fixed by the vision engine.
pub type DistanceFn = fn(&Embedding, &Embedding) -> f32;

/// Nearest-label classifier built from a snapshot of the registered set.
///
/// The matcher copies the labels and descriptors it needs, so later changes
/// to the registered set never affect a matcher that is already built.
pub struct FaceMatcher {
    entries: Vec<(String, Embedding)>,
    threshold: f32,
    distance: DistanceFn,
}

impl FaceMatcher {
    /// Build a matcher using Euclidean distance.
    pub fn build(faces: &[RegisteredFace], threshold: f32) -> Self {
        Self::with_distance(faces, threshold, Embedding::euclidean_distance)
    }

    /// Build a matcher using the given distance function.
    pub fn with_distance(faces: &[RegisteredFace], threshold: f32, distance: DistanceFn) -> Self {
        let entries = faces
            .iter()
            .map(|f| (f.name.clone(), f.descriptor.clone()))
            .collect();
        Self {
            entries,
            threshold,
            distance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classify a query embedding.
    ///
    /// Scans every entry and keeps the first strictly smaller distance, so
    /// equal distances resolve to the entry that appears first in the
    /// registered list.
    pub fn find_best_match(&self, query: &Embedding) -> MatchResult {
        if self.entries.is_empty() {
            return MatchResult {
                label: MatchLabel::Unknown,
                distance: f32::INFINITY,
            };
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, (_, descriptor)) in self.entries.iter().enumerate() {
            let dist = (self.distance)(query, descriptor);
            if best_idx.is_none() || dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= self.threshold => MatchResult {
                label: MatchLabel::Known(self.entries[idx].0.clone()),
                distance: best_dist,
            },
            _ => MatchResult {
                label: MatchLabel::Unknown,
                distance: best_dist,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn face(id: &str, name: &str, values: Vec<f32>) -> RegisteredFace {
        RegisteredFace {
            id: id.into(),
            name: name.into(),
            descriptor: Embedding::new(values),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_alice_within_threshold() {
        let gallery = vec![face("1", "Alice", vec![0.0, 0.0])];
        let matcher = FaceMatcher::build(&gallery, DEFAULT_MATCH_THRESHOLD);

        let result = matcher.find_best_match(&Embedding::new(vec![0.3, 0.0]));
        assert_eq!(result.label, MatchLabel::Known("Alice".into()));
        assert!((result.distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_alice_beyond_threshold() {
        let gallery = vec![face("1", "Alice", vec![0.0, 0.0])];
        let matcher = FaceMatcher::build(&gallery, DEFAULT_MATCH_THRESHOLD);

        let result = matcher.find_best_match(&Embedding::new(vec![0.0, 0.9]));
        assert_eq!(result.label, MatchLabel::Unknown);
        assert!((result.distance - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_distance_equal_to_threshold_matches() {
        let gallery = vec![face("1", "Alice", vec![0.0])];
        let matcher = FaceMatcher::build(&gallery, 0.5);
        let result = matcher.find_best_match(&Embedding::new(vec![0.5]));
        assert_eq!(result.label, MatchLabel::Known("Alice".into()));
    }

    #[test]
    fn test_exact_descriptor_matches_for_any_threshold() {
        let gallery = vec![
            face("1", "Bob", vec![1.0, 1.0, 1.0]),
            face("2", "Alice", vec![0.2, 0.4, 0.6]),
        ];
        for threshold in [0.0, 0.1, DEFAULT_MATCH_THRESHOLD, 10.0] {
            let matcher = FaceMatcher::build(&gallery, threshold);
            let result = matcher.find_best_match(&Embedding::new(vec![0.2, 0.4, 0.6]));
            assert_eq!(result.label, MatchLabel::Known("Alice".into()), "threshold {threshold}");
            assert_eq!(result.distance, 0.0);
        }
    }

    #[test]
    fn test_picks_closest_not_first() {
        let gallery = vec![
            face("1", "far", vec![0.5, 0.0]),
            face("2", "near", vec![0.1, 0.0]),
        ];
        let matcher = FaceMatcher::build(&gallery, DEFAULT_MATCH_THRESHOLD);
        let result = matcher.find_best_match(&Embedding::new(vec![0.0, 0.0]));
        assert_eq!(result.label, MatchLabel::Known("near".into()));
    }

    #[test]
    fn test_tie_resolves_to_first_in_list() {
        let gallery = vec![
            face("1", "first", vec![0.2, 0.0]),
            face("2", "second", vec![-0.2, 0.0]),
        ];
        let matcher = FaceMatcher::build(&gallery, DEFAULT_MATCH_THRESHOLD);
        let query = Embedding::new(vec![0.0, 0.0]);
        for _ in 0..10 {
            let result = matcher.find_best_match(&query);
            assert_eq!(result.label, MatchLabel::Known("first".into()));
        }

        let reversed: Vec<_> = gallery.into_iter().rev().collect();
        let matcher = FaceMatcher::build(&reversed, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(
            matcher.find_best_match(&query).label,
            MatchLabel::Known("second".into())
        );
    }

    #[test]
    fn test_label_is_registered_name_or_unknown() {
        let gallery = vec![
            face("1", "a", vec![0.0, 0.0]),
            face("2", "b", vec![1.0, 0.0]),
            face("3", "c", vec![0.0, 1.0]),
        ];
        let names: Vec<&str> = gallery.iter().map(|f| f.name.as_str()).collect();
        let matcher = FaceMatcher::build(&gallery, 0.4);

        for step in 0..20 {
            let x = step as f32 * 0.07;
            let query = Embedding::new(vec![x, 1.0 - x]);
            let min_dist = gallery
                .iter()
                .map(|f| query.euclidean_distance(&f.descriptor))
                .fold(f32::INFINITY, f32::min);
            let result = matcher.find_best_match(&query);
            match &result.label {
                MatchLabel::Known(name) => {
                    assert!(names.contains(&name.as_str()));
                    assert!(min_dist <= 0.4);
                }
                MatchLabel::Unknown => assert!(min_dist > 0.4),
            }
            assert_eq!(result.distance, min_dist);
        }
    }

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_distance(a: &Embedding, b: &Embedding) -> f32 {
        CALLS.fetch_add(1, Ordering::SeqCst);
        a.euclidean_distance(b)
    }

    #[test]
    fn test_empty_gallery_short_circuits() {
        let matcher = FaceMatcher::with_distance(&[], DEFAULT_MATCH_THRESHOLD, counting_distance);
        let result = matcher.find_best_match(&Embedding::new(vec![0.0; 128]));
        assert_eq!(result.label, MatchLabel::Unknown);
        assert_eq!(result.distance, f32::INFINITY);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mismatched_dimensions_never_match() {
        let gallery = vec![face("1", "Alice", vec![0.0, 0.0, 0.0])];
        let matcher = FaceMatcher::build(&gallery, 100.0);
        let result = matcher.find_best_match(&Embedding::new(vec![0.0, 0.0]));
        assert_eq!(result.label, MatchLabel::Unknown);
    }
}
