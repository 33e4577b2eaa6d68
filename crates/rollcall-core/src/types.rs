use crate::gallery::Gallery;
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with the five landmarks used for
/// alignment: [left_eye, right_eye, nose, left_mouth, right_mouth].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub landmarks: [(f32, f32); 5],
}

/// Face embedding vector (512-dimensional for the default ArcFace export).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings are L2-normalized at extraction, so the distance lies in
    /// [0, 2]: 0 for identical vectors, 2 for opposite ones.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A person enrolled in the gallery, keyed by roll number.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub roll_no: String,
    pub embedding: Embedding,
}

/// Result of matching one probe embedding against the gallery.
#[derive(Debug, Clone)]
pub enum MatchOutcome<'g> {
    /// The closest gallery entry was nearer than the threshold.
    Match { identity: &'g Identity, distance: f32 },
    /// No gallery entry was close enough. `best_distance` is `None` only
    /// when the gallery is empty.
    NoMatch { best_distance: Option<f32> },
}

impl MatchOutcome<'_> {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Match { .. })
    }
}

/// Strategy for resolving a probe embedding to an enrolled identity.
pub trait Matcher {
    fn best_match<'g>(
        &self,
        probe: &Embedding,
        gallery: &'g Gallery,
        threshold: f32,
    ) -> MatchOutcome<'g>;
}

/// Minimum-Euclidean-distance matcher.
///
/// Traverses the entire gallery and keeps the strict minimum, so an exact
/// distance tie resolves to the first entry in iteration order (sorted by
/// roll number).
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn best_match<'g>(
        &self,
        probe: &Embedding,
        gallery: &'g Gallery,
        threshold: f32,
    ) -> MatchOutcome<'g> {
        let mut best: Option<(&'g Identity, f32)> = None;

        for identity in gallery.identities() {
            let distance = probe.euclidean_distance(&identity.embedding);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((identity, distance)),
            }
        }

        match best {
            Some((identity, distance)) if distance < threshold => {
                MatchOutcome::Match { identity, distance }
            }
            Some((_, distance)) => MatchOutcome::NoMatch {
                best_distance: Some(distance),
            },
            None => MatchOutcome::NoMatch {
                best_distance: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(values: &[f32]) -> Embedding {
        Embedding {
            values: values.to_vec(),
            model_version: None,
        }
    }

    fn identity(name: &str, roll: &str, values: &[f32]) -> Identity {
        Identity {
            name: name.into(),
            roll_no: roll.into(),
            embedding: embedding(values),
        }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = embedding(&[0.6, 0.8, 0.0]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_unit_vectors() {
        let a = embedding(&[1.0, 0.0]);
        let b = embedding(&[0.0, 1.0]);
        assert!((a.euclidean_distance(&b) - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_identical_probe_matches_any_positive_threshold() {
        let mut gallery = Gallery::new();
        gallery.insert(identity("Amit", "105", &[1.0, 0.0, 0.0]));

        let probe = embedding(&[1.0, 0.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &gallery, 1e-6);
        match result {
            MatchOutcome::Match { identity, distance } => {
                assert_eq!(identity.roll_no, "105");
                assert_eq!(distance, 0.0);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_all_entries_beyond_threshold_is_no_match() {
        let mut gallery = Gallery::new();
        gallery.insert(identity("Amit", "105", &[1.0, 0.0]));
        gallery.insert(identity("Asha", "106", &[0.0, 1.0]));

        let probe = embedding(&[-1.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.5);
        match result {
            MatchOutcome::NoMatch { best_distance } => {
                // Closest is Asha at sqrt(2).
                assert!((best_distance.unwrap() - 2f32.sqrt()).abs() < 1e-6);
            }
            other => panic!("expected no match, got {other:?}"),
        }
    }

    #[test]
    fn test_minimum_wins_over_whole_gallery() {
        let mut gallery = Gallery::new();
        gallery.insert(identity("Far", "101", &[0.0, 1.0, 0.0]));
        gallery.insert(identity("Farther", "102", &[0.0, 0.0, 1.0]));
        gallery.insert(identity("Near", "103", &[1.0, 0.0, 0.0]));

        let probe = embedding(&[1.0, 0.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.5);
        match result {
            MatchOutcome::Match { identity, .. } => assert_eq!(identity.roll_no, "103"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_tie_keeps_first_in_roll_order() {
        let mut gallery = Gallery::new();
        gallery.insert(identity("Second", "202", &[1.0, 0.0]));
        gallery.insert(identity("First", "201", &[1.0, 0.0]));

        let probe = embedding(&[1.0, 0.0]);
        let result = EuclideanMatcher.best_match(&probe, &gallery, 0.5);
        match result {
            MatchOutcome::Match { identity, .. } => assert_eq!(identity.roll_no, "201"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let gallery = Gallery::new();
        let probe = embedding(&[1.0, 0.0]);
        match EuclideanMatcher.best_match(&probe, &gallery, 0.5) {
            MatchOutcome::NoMatch { best_distance } => assert!(best_distance.is_none()),
            other => panic!("expected no match, got {other:?}"),
        }
    }
}
