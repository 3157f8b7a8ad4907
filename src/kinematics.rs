//! Weighted four-momentum aggregation over tracks.
//!
//! The same accumulator serves two call sites with different inclusion rules:
//!
//! | Call site | Threshold | Used for |
//! |-----------|-----------|----------|
//! | tracks associated to a primary vertex | weight > 0 | energy-ratio denominator |
//! | constituents of one secondary vertex | weight ≥ 0.5 | vertex sum and charge |
//!
//! The aggregator only sums. Derived quantities such as vertex mass or energy
//! ratio are computed by the caller from [`KinematicAggregator::weighted_sum`].

use serde::{Deserialize, Serialize};

use crate::association::VertexView;
use crate::types::{FourMomentum, Track, Vector3};

/// Rule deciding which (track, weight) pairs contribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InclusionThreshold {
    /// Any strictly positive weight
    Positive,
    /// Weights at or above the given value
    AtLeast(f32),
}

impl InclusionThreshold {
    /// Threshold for a secondary vertex's own constituents.
    pub const VERTEX_CONSTITUENT: InclusionThreshold = InclusionThreshold::AtLeast(0.5);

    #[inline]
    pub fn admits(&self, weight: f32) -> bool {
        match *self {
            InclusionThreshold::Positive => weight > 0.0,
            InclusionThreshold::AtLeast(min) => weight >= min,
        }
    }
}

/// Running weighted four-momentum sum and net charge.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicAggregator {
    threshold: InclusionThreshold,
    n_tracks: usize,
    vector_sum: FourMomentum,
    weighted_sum: FourMomentum,
    charge: i32,
}

impl KinematicAggregator {
    pub fn new(threshold: InclusionThreshold) -> Self {
        Self {
            threshold,
            n_tracks: 0,
            vector_sum: FourMomentum::default(),
            weighted_sum: FourMomentum::default(),
            charge: 0,
        }
    }

    /// Accumulator for tracks associated to a primary vertex.
    pub fn for_primary_vertex_tracks() -> Self {
        Self::new(InclusionThreshold::Positive)
    }

    /// Accumulator for the constituents of one secondary vertex.
    pub fn for_vertex_constituents() -> Self {
        Self::new(InclusionThreshold::VERTEX_CONSTITUENT)
    }

    /// Sum the admitted constituents of `vertex`, resolving ids in `tracks`.
    ///
    /// Constituents missing from the arena are skipped.
    pub fn aggregate_vertex<V: VertexView + ?Sized>(vertex: &V, tracks: &[Track]) -> Self {
        let mut aggregator = Self::for_vertex_constituents();
        vertex.visit_constituents(&mut |constituent| {
            if let Some(track) = tracks.get(constituent.track.0) {
                aggregator.add_track(track, constituent.weight);
            }
        });
        aggregator
    }

    /// Add a track under the pion mass hypothesis. Returns whether it counted.
    pub fn add_track(&mut self, track: &Track, weight: f32) -> bool {
        self.add(track.p4(), track.charge, weight)
    }

    /// Add a four-momentum with its charge. Returns whether it counted.
    pub fn add(&mut self, p4: FourMomentum, charge: i32, weight: f32) -> bool {
        if !self.threshold.admits(weight) {
            return false;
        }
        self.n_tracks += 1;
        self.vector_sum += p4;
        self.weighted_sum += p4.scaled(f64::from(weight));
        self.charge += charge;
        true
    }

    /// Fold another aggregator's contributions into this one.
    pub fn merge(&mut self, other: &KinematicAggregator) {
        self.n_tracks += other.n_tracks;
        self.vector_sum += other.vector_sum;
        self.weighted_sum += other.weighted_sum;
        self.charge += other.charge;
    }

    pub fn threshold(&self) -> InclusionThreshold {
        self.threshold
    }

    /// Number of admitted tracks.
    pub fn n_tracks(&self) -> usize {
        self.n_tracks
    }

    /// Unweighted sum of admitted four-momenta.
    pub fn vector_sum(&self) -> FourMomentum {
        self.vector_sum
    }

    /// Weight-scaled sum of admitted four-momenta.
    pub fn weighted_sum(&self) -> FourMomentum {
        self.weighted_sum
    }

    /// Net charge of admitted tracks.
    pub fn charge(&self) -> i32 {
        self.charge
    }

    pub fn is_empty(&self) -> bool {
        self.n_tracks == 0
    }
}

/// Energy of `numerator` over energy of `denominator`, `None` for a zero denominator.
pub fn energy_ratio(numerator: &FourMomentum, denominator: &FourMomentum) -> Option<f64> {
    if denominator.e == 0.0 {
        None
    } else {
        Some(numerator.e / denominator.e)
    }
}

/// An infinite straight line through `point` along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub point: Vector3,
    pub direction: Vector3,
}

impl Line {
    pub fn new(point: Vector3, direction: Vector3) -> Self {
        Self { point, direction }
    }

    /// Shortest distance between two lines.
    pub fn distance(&self, other: &Line) -> f64 {
        let offset = other.point - self.point;
        let normal = self.direction.cross(&other.direction);
        let normal_mag = normal.mag();

        if normal_mag > f64::EPSILON * self.direction.mag() * other.direction.mag() {
            return offset.dot(&normal).abs() / normal_mag;
        }

        // parallel (or degenerate) lines
        let dir_mag = self.direction.mag();
        if dir_mag == 0.0 {
            let other_mag = other.direction.mag();
            if other_mag == 0.0 {
                return offset.mag();
            }
            return offset.cross(&other.direction).mag() / other_mag;
        }
        offset.cross(&self.direction).mag() / dir_mag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FittedVertex, TrackId, WeightedTrack, CHARGED_PION_MASS};
    use approx::assert_relative_eq;

    fn track(px: f64, charge: i32) -> Track {
        Track {
            momentum: Vector3::new(px, 0.0, 0.0),
            charge,
            ..Default::default()
        }
    }

    #[test]
    fn test_vertex_threshold_excludes_below_half() {
        let mut agg = KinematicAggregator::for_vertex_constituents();
        assert!(agg.add_track(&track(5.0, 1), 0.6));
        assert!(!agg.add_track(&track(3.0, -1), 0.4));

        assert_eq!(agg.n_tracks(), 1);
        assert_eq!(agg.charge(), 1);
        assert_relative_eq!(agg.vector_sum().px, 5.0);
        assert_relative_eq!(agg.weighted_sum().px, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_threshold_boundaries() {
        assert!(InclusionThreshold::VERTEX_CONSTITUENT.admits(0.5));
        assert!(!InclusionThreshold::VERTEX_CONSTITUENT.admits(0.499));
        assert!(InclusionThreshold::Positive.admits(1e-6));
        assert!(!InclusionThreshold::Positive.admits(0.0));
    }

    #[test]
    fn test_additivity_over_partitions() {
        let tracks: Vec<(Track, f32)> = (0..7)
            .map(|i| (track(1.0 + i as f64, if i % 2 == 0 { 1 } else { -1 }), 0.1 * (i + 1) as f32))
            .collect();

        let mut whole = KinematicAggregator::for_primary_vertex_tracks();
        for (t, w) in &tracks {
            whole.add_track(t, *w);
        }

        let mut left = KinematicAggregator::for_primary_vertex_tracks();
        let mut right = KinematicAggregator::for_primary_vertex_tracks();
        for (i, (t, w)) in tracks.iter().enumerate() {
            if i < 3 {
                left.add_track(t, *w);
            } else {
                right.add_track(t, *w);
            }
        }
        left.merge(&right);

        assert_eq!(left.n_tracks(), whole.n_tracks());
        assert_eq!(left.charge(), whole.charge());
        assert_relative_eq!(left.weighted_sum().e, whole.weighted_sum().e, epsilon = 1e-9);
        assert_relative_eq!(left.weighted_sum().px, whole.weighted_sum().px, epsilon = 1e-9);
        assert_relative_eq!(left.vector_sum().e, whole.vector_sum().e, epsilon = 1e-9);
    }

    #[test]
    fn test_aggregate_vertex_uses_constituent_weights() {
        let arena = vec![track(4.0, 1), track(2.0, 1), track(1.0, -1)];
        let vertex = FittedVertex {
            position: Vector3::zero(),
            error: Vector3::zero(),
            chi2: 0.0,
            ndof: 0.0,
            p4: FourMomentum::default(),
            tracks: vec![
                WeightedTrack::new(TrackId(0), 1.0),
                WeightedTrack::new(TrackId(1), 0.2),
                WeightedTrack::new(TrackId(2), 0.5),
                WeightedTrack::new(TrackId(9), 1.0),
            ],
        };
        let agg = KinematicAggregator::aggregate_vertex(&vertex, &arena);
        assert_eq!(agg.n_tracks(), 2);
        assert_eq!(agg.charge(), 0);
        assert_relative_eq!(agg.weighted_sum().px, 4.5, epsilon = 1e-9);
    }

    #[test]
    fn test_single_track_mass_is_pion() {
        let mut agg = KinematicAggregator::for_vertex_constituents();
        agg.add_track(&track(10.0, 1), 1.0);
        assert_relative_eq!(agg.weighted_sum().mass(), CHARGED_PION_MASS, epsilon = 1e-6);
    }

    #[test]
    fn test_energy_ratio() {
        let num = FourMomentum::new(0.0, 0.0, 0.0, 2.0);
        let den = FourMomentum::new(0.0, 0.0, 0.0, 8.0);
        assert_eq!(energy_ratio(&num, &den), Some(0.25));
        assert_eq!(energy_ratio(&num, &FourMomentum::default()), None);
    }

    #[test]
    fn test_line_distance_skew_and_parallel() {
        // x-axis vs a line parallel to y through (0, 0, 2)
        let a = Line::new(Vector3::zero(), Vector3::new(1.0, 0.0, 0.0));
        let b = Line::new(Vector3::new(0.0, 0.0, 2.0), Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(a.distance(&b), 2.0, epsilon = 1e-12);

        let c = Line::new(Vector3::new(0.0, 3.0, 4.0), Vector3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(a.distance(&c), 5.0, epsilon = 1e-12);

        // intersecting lines
        let d = Line::new(Vector3::new(1.0, 1.0, 0.0), Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(a.distance(&d), 0.0, epsilon = 1e-12);
    }
}
