//! Identity and duplicate decisions over the memory book.
//!
//! Identification is a nearest-neighbour lookup under [`MATCH_THRESHOLD`].
//! The duplicate check is existential: any record within
//! [`DUPLICATE_TOLERANCE`] counts, nearest or not.

use crate::types::{Encoding, FaceRecord};

/// Maximum distance (exclusive) for a face to take a known name.
pub const MATCH_THRESHOLD: f32 = 0.5;
/// Maximum distance (inclusive) for a new face to count as already stored.
pub const DUPLICATE_TOLERANCE: f32 = 0.4;
/// Label given to faces that match nobody.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Euclidean distance between two encodings.
pub fn face_distance(a: &Encoding, b: &Encoding) -> f32 {
    a.distance(b)
}

/// Outcome of identifying one face against the book.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub name: String,
    /// Index of the matched record, if the face was recognised.
    pub index: Option<usize>,
    /// Distance to the nearest record, if the book was non-empty.
    pub distance: Option<f32>,
}

impl Identification {
    pub fn unknown(distance: Option<f32>) -> Self {
        Self {
            name: UNKNOWN_NAME.to_string(),
            index: None,
            distance,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.index.is_none()
    }
}

/// Nearest record to `encoding`, name returned only if strictly below `threshold`.
///
/// Equal distances resolve to the lowest index.
pub fn identify(encoding: &Encoding, records: &[FaceRecord], threshold: f32) -> Identification {
    let mut best: Option<(usize, f32)> = None;

    for (i, record) in records.iter().enumerate() {
        let dist = face_distance(encoding, &record.encoding);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((i, dist)),
        }
    }

    match best {
        Some((idx, dist)) if dist < threshold => Identification {
            name: records[idx].name.clone(),
            index: Some(idx),
            distance: Some(dist),
        },
        Some((_, dist)) => Identification::unknown(Some(dist)),
        None => Identification::unknown(None),
    }
}

/// True if any record lies within `tolerance` of `candidate`.
pub fn is_duplicate(candidate: &Encoding, records: &[FaceRecord], tolerance: f32) -> bool {
    records
        .iter()
        .any(|record| face_distance(candidate, &record.encoding) <= tolerance)
}

/// The two thresholds applied during ingestion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub match_threshold: f32,
    pub duplicate_tolerance: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            match_threshold: MATCH_THRESHOLD,
            duplicate_tolerance: DUPLICATE_TOLERANCE,
        }
    }
}

impl MatchPolicy {
    pub fn identify(&self, encoding: &Encoding, records: &[FaceRecord]) -> Identification {
        identify(encoding, records, self.match_threshold)
    }

    pub fn is_duplicate(&self, candidate: &Encoding, records: &[FaceRecord]) -> bool {
        is_duplicate(candidate, records, self.duplicate_tolerance)
    }
}
