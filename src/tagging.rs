//! Tagging variables: the closed set of named b-tagging inputs and the
//! per-jet lists that carry their values.
//!
//! A [`TaggingVariableList`] maps each variable to zero or more values. Jet
//! scalars hold a single value; per-track and per-vertex variables hold one
//! value per track or vertex, in the producer's order. The projector never
//! derives these values, it only copies them into flat slots.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Named tagging variables understood by the projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaggingVariable {
    // Jet scalars
    TrackJetPt,
    VertexCategory,
    JetNSecondaryVertices,
    TrackSumJetEtRatio,
    TrackSumJetDeltaR,
    TrackSip2dValAboveCharm,
    TrackSip2dSigAboveCharm,
    TrackSip3dValAboveCharm,
    TrackSip3dSigAboveCharm,
    VertexMass,
    VertexNTracks,
    VertexEnergyRatio,

    // Per-vertex lists
    VertexJetDeltaR,
    FlightDistance2dVal,
    FlightDistance2dSig,
    FlightDistance3dVal,
    FlightDistance3dSig,

    // Per-track lists
    TrackMomentum,
    TrackEta,
    TrackPhi,
    TrackPtRel,
    TrackPPar,
    TrackEtaRel,
    TrackDeltaR,
    TrackPtRatio,
    TrackPParRatio,
    TrackSip2dVal,
    TrackSip2dSig,
    TrackSip3dVal,
    TrackSip3dSig,
    TrackDecayLenVal,
    TrackDecayLenSig,
    TrackJetDistVal,
    TrackJetDistSig,
    TrackChi2,
    TrackNTotalHits,
    TrackNPixelHits,
}

/// Which tag info a variable list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagVariableSource {
    /// Impact-parameter tag info
    TrackIp,
    /// Secondary-vertex tag info
    SecondaryVertex,
    /// Combined secondary-vertex computer output
    Combined,
}

/// Values per tagging variable, in insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaggingVariableList {
    values: IndexMap<TaggingVariable, Vec<f32>>,
}

impl TaggingVariableList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value for `tag`.
    pub fn insert(&mut self, tag: TaggingVariable, value: f32) {
        self.values.entry(tag).or_default().push(value);
    }

    /// Append several values for `tag`.
    pub fn extend(&mut self, tag: TaggingVariable, values: impl IntoIterator<Item = f32>) {
        self.values.entry(tag).or_default().extend(values);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, tag: TaggingVariable, value: f32) -> Self {
        self.insert(tag, value);
        self
    }

    /// Builder-style [`extend`](Self::extend).
    pub fn with_list(mut self, tag: TaggingVariable, values: impl IntoIterator<Item = f32>) -> Self {
        self.extend(tag, values);
        self
    }

    /// Whether at least one value is present for `tag`.
    pub fn check(&self, tag: TaggingVariable) -> bool {
        self.values.get(&tag).is_some_and(|v| !v.is_empty())
    }

    /// First value of `tag`.
    pub fn get(&self, tag: TaggingVariable) -> Option<f32> {
        self.values.get(&tag).and_then(|v| v.first().copied())
    }

    /// First value of `tag`, or `default` when absent.
    pub fn get_or(&self, tag: TaggingVariable, default: f32) -> f32 {
        self.get(tag).unwrap_or(default)
    }

    /// All values of `tag` (empty when absent).
    pub fn list(&self, tag: TaggingVariable) -> &[f32] {
        self.values.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
