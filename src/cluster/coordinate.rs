//! Vivaldi network coordinates.
//!
//! Each member of a gossip pool maintains a coordinate in a low-dimensional
//! Euclidean space plus a height term. The estimated round-trip time between
//! two members is the distance between their coordinates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of Euclidean dimensions.
pub const DEFAULT_DIMENSIONALITY: usize = 8;

const DEFAULT_VIVALDI_ERROR: f64 = 1.5;
const DEFAULT_HEIGHT_MIN: f64 = 10.0e-6;

/// A network coordinate, with all terms expressed in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Euclidean portion of the coordinate.
    pub vec: Vec<f64>,
    /// Confidence in the coordinate.
    pub error: f64,
    /// Distance offset computed from the last observed RTTs.
    pub adjustment: f64,
    /// Distance offset modeling the access link of the node.
    pub height: f64,
}

impl Default for Coordinate {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONALITY)
    }
}

impl Coordinate {
    /// A coordinate at the origin.
    pub fn new(dimensionality: usize) -> Self {
        Self {
            vec: vec![0.0; dimensionality],
            error: DEFAULT_VIVALDI_ERROR,
            adjustment: 0.0,
            height: DEFAULT_HEIGHT_MIN,
        }
    }

    /// A coordinate at the given position with default error and height.
    pub fn at(vec: Vec<f64>) -> Self {
        Self {
            vec,
            ..Self::new(0)
        }
    }

    /// Whether both coordinates live in the same space.
    pub fn is_compatible_with(&self, other: &Coordinate) -> bool {
        self.vec.len() == other.vec.len()
    }

    /// Estimated RTT to `other`, or `None` if the dimensions differ.
    pub fn distance_to(&self, other: &Coordinate) -> Option<Duration> {
        if !self.is_compatible_with(other) {
            return None;
        }

        let magnitude = self
            .vec
            .iter()
            .zip(&other.vec)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        let mut dist = magnitude + self.height + other.height;

        let adjusted = dist + self.adjustment + other.adjustment;
        if adjusted > 0.0 {
            dist = adjusted;
        }

        Some(Duration::try_from_secs_f64(dist).unwrap_or(Duration::ZERO))
    }
}

/// Estimated RTT in seconds between two coordinates.
///
/// Missing or incompatible coordinates are infinitely far away, which sorts
/// them after every reachable datacenter.
pub fn compute_distance(a: Option<&Coordinate>, b: Option<&Coordinate>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => a
            .distance_to(b)
            .map(|d| d.as_secs_f64())
            .unwrap_or(f64::INFINITY),
        _ => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(vec: Vec<f64>) -> Coordinate {
        Coordinate {
            vec,
            error: 0.0,
            adjustment: 0.0,
            height: 0.0,
        }
    }

    #[test]
    fn test_distance_euclidean() {
        let a = flat(vec![0.0, 0.0]);
        let b = flat(vec![0.3, 0.4]);
        let d = compute_distance(Some(&a), Some(&b));
        assert!((d - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_distance_includes_height_and_adjustment() {
        let mut a = flat(vec![0.0]);
        let mut b = flat(vec![1.0]);
        a.height = 0.25;
        b.height = 0.25;
        a.adjustment = 0.1;
        let d = compute_distance(Some(&a), Some(&b));
        assert!((d - 1.6).abs() < 1e-9);

        // A negative total adjustment that would go below zero is ignored.
        b.adjustment = -10.0;
        let d = compute_distance(Some(&a), Some(&b));
        assert!((d - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_distance_missing_is_infinite() {
        let a = Coordinate::default();
        assert!(compute_distance(Some(&a), None).is_infinite());
        assert!(compute_distance(None, Some(&a)).is_infinite());
        assert!(compute_distance(None, None).is_infinite());
    }

    #[test]
    fn test_distance_incompatible_is_infinite() {
        let a = Coordinate::new(2);
        let b = Coordinate::new(3);
        assert!(a.distance_to(&b).is_none());
        assert!(compute_distance(Some(&a), Some(&b)).is_infinite());
    }

    #[test]
    fn test_at_uses_default_error_and_height() {
        let a = Coordinate::at(vec![0.0, 0.0]);
        let b = Coordinate::at(vec![0.0, 0.1]);
        assert_eq!(a.error, Coordinate::default().error);
        assert!(a.is_compatible_with(&b));

        // Both heights add to the straight-line distance.
        let d = compute_distance(Some(&a), Some(&b));
        assert!((d - (0.1 + 2.0 * a.height)).abs() < 1e-6);
    }
}
