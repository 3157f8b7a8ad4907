//! Track-to-vertex association.
//!
//! Every selected track is resolved twice, independently: once against the
//! event's primary vertices and once against its jet's own secondary
//! vertices. Each pass yields at most one owner.
//!
//! Vertices come in two shapes (a weighted fit, or a bare list of constituent
//! references) that expose the same capability set through [`VertexView`].
//! [`AssociationStrategy`] picks how an owner is chosen among them.

use serde::{Deserialize, Serialize};

use crate::types::{
    CompositeVertex, FittedVertex, PrimaryVertex, SecondaryVertex, TrackId, Vector3,
    WeightedTrack,
};

/// Uniform read access to a vertex, whatever its representation.
pub trait VertexView {
    fn position(&self) -> Vector3;

    /// Per-axis position uncertainty.
    fn position_error(&self) -> Vector3;

    fn chi2(&self) -> f64;

    fn ndof(&self) -> f64;

    /// Number of constituent tracks.
    fn n_tracks(&self) -> usize;

    /// Weight given to `track`, 0 when it is not a constituent.
    fn track_weight(&self, track: TrackId) -> f32;

    fn contains(&self, track: TrackId) -> bool {
        self.track_weight(track) > 0.0
    }

    /// Call `visit` for each constituent with its weight.
    fn visit_constituents(&self, visit: &mut dyn FnMut(WeightedTrack));
}

fn weight_in(tracks: &[WeightedTrack], track: TrackId) -> f32 {
    tracks
        .iter()
        .find(|wt| wt.track == track)
        .map_or(0.0, |wt| wt.weight)
}

impl VertexView for PrimaryVertex {
    fn position(&self) -> Vector3 {
        self.position
    }

    fn position_error(&self) -> Vector3 {
        self.error
    }

    fn chi2(&self) -> f64 {
        self.chi2
    }

    fn ndof(&self) -> f64 {
        self.ndof
    }

    fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn track_weight(&self, track: TrackId) -> f32 {
        weight_in(&self.tracks, track)
    }

    fn visit_constituents(&self, visit: &mut dyn FnMut(WeightedTrack)) {
        self.tracks.iter().copied().for_each(visit);
    }
}

impl VertexView for FittedVertex {
    fn position(&self) -> Vector3 {
        self.position
    }

    fn position_error(&self) -> Vector3 {
        self.error
    }

    fn chi2(&self) -> f64 {
        self.chi2
    }

    fn ndof(&self) -> f64 {
        self.ndof
    }

    fn n_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn track_weight(&self, track: TrackId) -> f32 {
        weight_in(&self.tracks, track)
    }

    fn contains(&self, track: TrackId) -> bool {
        self.tracks.iter().any(|wt| wt.track == track)
    }

    fn visit_constituents(&self, visit: &mut dyn FnMut(WeightedTrack)) {
        self.tracks.iter().copied().for_each(visit);
    }
}

impl VertexView for CompositeVertex {
    fn position(&self) -> Vector3 {
        self.position
    }

    fn position_error(&self) -> Vector3 {
        self.error
    }

    fn chi2(&self) -> f64 {
        self.chi2
    }

    fn ndof(&self) -> f64 {
        self.ndof
    }

    fn n_tracks(&self) -> usize {
        self.daughters.len()
    }

    /// Composite vertices carry no fit weights: membership counts as 1.
    fn track_weight(&self, track: TrackId) -> f32 {
        if self.contains(track) {
            1.0
        } else {
            0.0
        }
    }

    fn contains(&self, track: TrackId) -> bool {
        self.daughters.contains(&track)
    }

    fn visit_constituents(&self, visit: &mut dyn FnMut(WeightedTrack)) {
        for &track in &self.daughters {
            visit(WeightedTrack::new(track, 1.0));
        }
    }
}

impl VertexView for SecondaryVertex {
    fn position(&self) -> Vector3 {
        match self {
            SecondaryVertex::Fitted(v) => v.position(),
            SecondaryVertex::Composite(v) => v.position(),
        }
    }

    fn position_error(&self) -> Vector3 {
        match self {
            SecondaryVertex::Fitted(v) => v.position_error(),
            SecondaryVertex::Composite(v) => v.position_error(),
        }
    }

    fn chi2(&self) -> f64 {
        match self {
            SecondaryVertex::Fitted(v) => v.chi2(),
            SecondaryVertex::Composite(v) => v.chi2(),
        }
    }

    fn ndof(&self) -> f64 {
        match self {
            SecondaryVertex::Fitted(v) => v.ndof(),
            SecondaryVertex::Composite(v) => v.ndof(),
        }
    }

    fn n_tracks(&self) -> usize {
        match self {
            SecondaryVertex::Fitted(v) => v.n_tracks(),
            SecondaryVertex::Composite(v) => v.n_tracks(),
        }
    }

    fn track_weight(&self, track: TrackId) -> f32 {
        match self {
            SecondaryVertex::Fitted(v) => v.track_weight(track),
            SecondaryVertex::Composite(v) => v.track_weight(track),
        }
    }

    fn contains(&self, track: TrackId) -> bool {
        match self {
            SecondaryVertex::Fitted(v) => v.contains(track),
            SecondaryVertex::Composite(v) => v.contains(track),
        }
    }

    fn visit_constituents(&self, visit: &mut dyn FnMut(WeightedTrack)) {
        match self {
            SecondaryVertex::Fitted(v) => v.visit_constituents(visit),
            SecondaryVertex::Composite(v) => v.visit_constituents(visit),
        }
    }
}

/// The resolved owner of a track. Index `-1` with weight 0 means unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub index: i32,
    pub weight: f32,
}

impl Association {
    pub const UNASSIGNED: Association = Association {
        index: -1,
        weight: 0.0,
    };

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.index >= 0
    }
}

impl Default for Association {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

/// How a track's owning vertex is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationStrategy {
    /// Highest fit weight wins; a later equal weight never displaces an
    /// earlier choice.
    #[default]
    MaxWeight,
    /// First vertex listing the track wins, with weight 1.
    FirstContaining,
}

impl AssociationStrategy {
    /// Resolve the owner of `track` among `parents`, in parent order.
    pub fn resolve<V: VertexView>(&self, parents: &[V], track: TrackId) -> Association {
        match self {
            AssociationStrategy::MaxWeight => {
                let mut best = Association::UNASSIGNED;
                for (i, parent) in parents.iter().enumerate() {
                    let weight = parent.track_weight(track);
                    if weight > best.weight {
                        best = Association {
                            index: i as i32,
                            weight,
                        };
                    }
                }
                best
            }
            AssociationStrategy::FirstContaining => parents
                .iter()
                .position(|parent| parent.contains(track))
                .map_or(Association::UNASSIGNED, |i| Association {
                    index: i as i32,
                    weight: 1.0,
                }),
        }
    }
}
