//! The flat output record.
//!
//! One [`FlatRecord`] is emitted per accepted event. It holds the event-level
//! block and one [`JetCollectionRecord`] per jet collection. A collection
//! record stores a row per accepted jet plus, for every repeated child kind,
//! one column shared by all jets of the collection. Each [`JetRow`] carries
//! a `(first, last)` range per kind into those columns.
//!
//! For every kind, jet `i`'s range ends where jet `i + 1`'s begins and the
//! first jet starts at 0. Kinds that were not produced get empty ranges.
//!
//! Scalars that could not be computed are `-9999`; missing indices are `-1`.

use serde::{Deserialize, Serialize};

use crate::layout::{ChildKind, IndexRange};
use crate::tagging::{TaggingVariable, TaggingVariableList};
use crate::types::{JetComposition, MISSING_VALUE};

// ============================================================================
// Event-level block
// ============================================================================

/// One primary vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PrimaryVertexRow {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub ex: f32,
    pub ey: f32,
    pub ez: f32,
    /// χ²/ndof
    pub chi2: f32,
    pub ndf: f32,
    pub is_good: bool,
    pub is_fake: bool,
}

/// In-time pileup interaction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PileupRow {
    pub z: f32,
    pub sum_pt_low: f32,
    pub sum_pt_high: f32,
    pub ntrks_low: i32,
    pub ntrks_high: i32,
}

/// Pruned generator particle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GenParticleRow {
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
    pub mass: f32,
    pub status: i32,
    pub pdg_id: i32,
    /// -1 without mother, -100 when the mother is outside the collection
    pub mother_index: i32,
}

/// Simulation-only event content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McInfo {
    pub pthat: f32,
    pub mc_weight: f32,
    pub n_pu_true: f32,
    pub n_pu: i32,
    pub pileup: Vec<PileupRow>,
    pub gen_pv_z: f32,
    pub gen_particles: Vec<GenParticleRow>,
}

impl Default for McInfo {
    fn default() -> Self {
        Self {
            pthat: -1.0,
            mc_weight: 1.0,
            n_pu_true: -1.0,
            n_pu: 0,
            pileup: Vec::new(),
            gen_pv_z: -1000.0,
            gen_particles: Vec::new(),
        }
    }
}

/// A global muon.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MuonRow {
    pub n_mu_hit: i32,
    pub n_tk_hit: i32,
    pub n_pix_hit: i32,
    pub n_outer_hit: i32,
    pub n_matched_stations: i32,
    pub chi2: f32,
    pub chi2_tk: f32,
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
    pub vz: f32,
    pub ip: f32,
    pub ip_sig: f32,
    pub ip2d: f32,
    pub ip2d_sig: f32,
    pub is_pf: bool,
}

/// Per-event header, trigger bits and event-wide collections.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventInfo {
    /// Negated for simulated events
    pub run: i64,
    pub event: u64,
    pub lumi_block: u32,
    pub is_data: bool,
    pub trigger_bits: Vec<u32>,
    pub pv_z: f32,
    pub pv_ez: f32,
    pub primary_vertices: Vec<PrimaryVertexRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mc: Option<McInfo>,
    #[serde(default)]
    pub muons: Vec<MuonRow>,
}

// ============================================================================
// Per-jet children
// ============================================================================

/// One selected track of a jet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackRow {
    /// Signed distance to the jet axis
    pub dist: f32,
    /// Distance from the PV to the point closest to the jet axis
    pub length: f32,
    pub dxy: f32,
    pub dz: f32,
    pub z_ip: f32,
    pub ip2d: f32,
    pub ip2d_sig: f32,
    pub ip2d_err: f32,
    pub ip: f32,
    pub ip_sig: f32,
    pub ip_err: f32,
    pub proba: f32,
    pub p: f32,
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
    pub chi2: f32,
    pub charge: i32,
    pub n_hit_all: u32,
    pub n_hit_pixel: u32,
    pub n_hit_strip: u32,
    pub n_hit_tib: u32,
    pub n_hit_tid: u32,
    pub n_hit_tob: u32,
    pub n_hit_tec: u32,
    pub n_hit_pxb: u32,
    pub n_hit_pxf: u32,
    pub is_hit_l1: bool,
    /// Owning primary vertex, -1 when unassigned
    pub pv: i32,
    pub pv_weight: f32,
    /// Owning secondary vertex of the same jet, -1 when unassigned
    pub sv: i32,
    pub sv_weight: f32,
    pub is_from_sv: bool,
}

/// One secondary vertex of a jet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SvRow {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub ex: f32,
    pub ey: f32,
    pub ez: f32,
    pub chi2: f32,
    pub ndf: f32,
    pub flight: f32,
    pub flight_err: f32,
    pub flight_2d: f32,
    pub flight_2d_err: f32,
    pub n_trk: i32,
    pub vtx_pt: f32,
    pub vtx_eta: f32,
    pub vtx_phi: f32,
    pub mass: f32,
    pub tot_charge: i32,
    pub delta_r_jet: f32,
    pub delta_r_sum_jet: f32,
    pub delta_r_sum_dir: f32,
    pub vtx_dist_jet_axis: f32,
    pub energy_ratio: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub dir_z: f32,
}

/// A soft PF lepton inside a jet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LeptonRow {
    /// Row of the owning jet within its collection
    pub jet_index: i32,
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
    pub ptrel: f32,
    pub ratio: f32,
    pub ratio_rel: f32,
    pub delta_r: f32,
    /// 3D IP significance
    pub ip: f32,
    /// 2D IP significance
    pub ip2d: f32,
}

fn list_value(vars: &TaggingVariableList, tag: TaggingVariable, i: usize) -> f32 {
    vars.list(tag).get(i).copied().unwrap_or(MISSING_VALUE)
}

/// Per-track tagging variables, one row per selected track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackTagVarRow {
    pub momentum: f32,
    pub eta: f32,
    pub phi: f32,
    pub pt_rel: f32,
    pub p_par: f32,
    pub eta_rel: f32,
    pub delta_r: f32,
    pub pt_ratio: f32,
    pub p_par_ratio: f32,
    pub sip2d_val: f32,
    pub sip2d_sig: f32,
    pub sip3d_val: f32,
    pub sip3d_sig: f32,
    pub decay_len_val: f32,
    pub decay_len_sig: f32,
    pub jet_dist_val: f32,
    pub jet_dist_sig: f32,
    pub chi2: f32,
    pub n_total_hits: f32,
    pub n_pixel_hits: f32,
}

impl TrackTagVarRow {
    /// Row `i` of the per-track lists, `-9999` where a list is short.
    pub fn from_lists(vars: &TaggingVariableList, i: usize) -> Self {
        use TaggingVariable::*;
        let v = |tag| list_value(vars, tag, i);
        Self {
            momentum: v(TrackMomentum),
            eta: v(TrackEta),
            phi: v(TrackPhi),
            pt_rel: v(TrackPtRel),
            p_par: v(TrackPPar),
            eta_rel: v(TrackEtaRel),
            delta_r: v(TrackDeltaR),
            pt_ratio: v(TrackPtRatio),
            p_par_ratio: v(TrackPParRatio),
            sip2d_val: v(TrackSip2dVal),
            sip2d_sig: v(TrackSip2dSig),
            sip3d_val: v(TrackSip3dVal),
            sip3d_sig: v(TrackSip3dSig),
            decay_len_val: v(TrackDecayLenVal),
            decay_len_sig: v(TrackDecayLenSig),
            jet_dist_val: v(TrackJetDistVal),
            jet_dist_sig: v(TrackJetDistSig),
            chi2: v(TrackChi2),
            n_total_hits: v(TrackNTotalHits),
            n_pixel_hits: v(TrackNPixelHits),
        }
    }
}

/// Per-vertex tagging variables, one row per secondary vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SvTagVarRow {
    pub vertex_mass: f32,
    pub vertex_jet_delta_r: f32,
    pub flight_distance_2d_val: f32,
    pub flight_distance_2d_sig: f32,
    pub flight_distance_3d_val: f32,
    pub flight_distance_3d_sig: f32,
}

impl SvTagVarRow {
    /// Row `i` of the per-vertex lists with the mass supplied by the caller.
    pub fn from_lists(vars: &TaggingVariableList, i: usize, vertex_mass: f32) -> Self {
        use TaggingVariable::*;
        let v = |tag| list_value(vars, tag, i);
        Self {
            vertex_mass,
            vertex_jet_delta_r: v(VertexJetDeltaR),
            flight_distance_2d_val: v(FlightDistance2dVal),
            flight_distance_2d_sig: v(FlightDistance2dSig),
            flight_distance_3d_val: v(FlightDistance3dVal),
            flight_distance_3d_sig: v(FlightDistance3dSig),
        }
    }
}

/// Per-track variables of the combined computer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CsvTrackTagVarRow {
    pub momentum: f32,
    pub eta: f32,
    pub phi: f32,
    pub pt_rel: f32,
    pub p_par: f32,
    pub delta_r: f32,
    pub pt_ratio: f32,
    pub p_par_ratio: f32,
    pub sip2d_val: f32,
    pub sip2d_sig: f32,
    pub sip3d_val: f32,
    pub sip3d_sig: f32,
    pub decay_len_val: f32,
    pub decay_len_sig: f32,
    pub jet_dist_val: f32,
    pub jet_dist_sig: f32,
}

impl CsvTrackTagVarRow {
    pub fn from_lists(vars: &TaggingVariableList, i: usize) -> Self {
        use TaggingVariable::*;
        let v = |tag| list_value(vars, tag, i);
        Self {
            momentum: v(TrackMomentum),
            eta: v(TrackEta),
            phi: v(TrackPhi),
            pt_rel: v(TrackPtRel),
            p_par: v(TrackPPar),
            delta_r: v(TrackDeltaR),
            pt_ratio: v(TrackPtRatio),
            p_par_ratio: v(TrackPParRatio),
            sip2d_val: v(TrackSip2dVal),
            sip2d_sig: v(TrackSip2dSig),
            sip3d_val: v(TrackSip3dVal),
            sip3d_sig: v(TrackSip3dSig),
            decay_len_val: v(TrackDecayLenVal),
            decay_len_sig: v(TrackDecayLenSig),
            jet_dist_val: v(TrackJetDistVal),
            jet_dist_sig: v(TrackJetDistSig),
        }
    }
}

// ============================================================================
// Per-jet scalars
// ============================================================================

/// Substructure scalars of a fat jet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubstructureRow {
    pub tau1: f32,
    pub tau2: f32,
    pub tau1_ivf: f32,
    pub tau2_ivf: f32,
    pub pt_groomed: f32,
    pub jes_groomed: f32,
    pub eta_groomed: f32,
    pub phi_groomed: f32,
    pub mass_groomed: f32,
    pub n_subjets: i32,
    /// Tracks of the two leading subjets near their own axis, shared ones excluded
    pub n_subjet_tracks: i32,
    /// Tracks of the leading subjet also near the second subjet
    pub n_shared_subjet_tracks: i32,
    /// Fat-jet tracks near both leading subjets
    pub n_shared_tracks: i32,
}

impl Default for SubstructureRow {
    fn default() -> Self {
        Self {
            tau1: MISSING_VALUE,
            tau2: MISSING_VALUE,
            tau1_ivf: MISSING_VALUE,
            tau2_ivf: MISSING_VALUE,
            pt_groomed: MISSING_VALUE,
            jes_groomed: MISSING_VALUE,
            eta_groomed: MISSING_VALUE,
            phi_groomed: MISSING_VALUE,
            mass_groomed: MISSING_VALUE,
            n_subjets: 0,
            n_subjet_tracks: 0,
            n_shared_subjet_tracks: 0,
            n_shared_tracks: 0,
        }
    }
}

/// Jet-level tag-info summary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JetTagVarRow {
    pub n_tracks: i32,
    pub n_secondary_vertices: i32,
    pub composition: JetComposition,
}

/// Jet-level variables of the combined computer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JetCsvVarRow {
    pub track_jet_pt: f32,
    pub vertex_category: f32,
    pub jet_n_secondary_vertices: f32,
    pub track_sum_jet_et_ratio: f32,
    pub track_sum_jet_delta_r: f32,
    pub track_sip2d_val_above_charm: f32,
    pub track_sip2d_sig_above_charm: f32,
    pub track_sip3d_val_above_charm: f32,
    pub track_sip3d_sig_above_charm: f32,
    pub vertex_mass: f32,
    pub vertex_n_tracks: f32,
    pub vertex_energy_ratio: f32,
    pub vertex_jet_delta_r: f32,
    pub flight_distance_2d_val: f32,
    pub flight_distance_2d_sig: f32,
    pub flight_distance_3d_val: f32,
    pub flight_distance_3d_sig: f32,
    /// Length of the `trackSip2dSig` list
    pub jet_n_tracks: i32,
    /// Length of the `trackEtaRel` list
    pub jet_n_tracks_eta_rel: i32,
}

impl JetCsvVarRow {
    /// Scalars from `vars`: counts default to 0, everything else to `-9999`.
    pub fn from_variables(vars: &TaggingVariableList) -> Self {
        use TaggingVariable::*;
        let v = |tag| vars.get_or(tag, MISSING_VALUE);
        Self {
            track_jet_pt: v(TrackJetPt),
            vertex_category: v(VertexCategory),
            jet_n_secondary_vertices: vars.get_or(JetNSecondaryVertices, 0.0),
            track_sum_jet_et_ratio: v(TrackSumJetEtRatio),
            track_sum_jet_delta_r: v(TrackSumJetDeltaR),
            track_sip2d_val_above_charm: v(TrackSip2dValAboveCharm),
            track_sip2d_sig_above_charm: v(TrackSip2dSigAboveCharm),
            track_sip3d_val_above_charm: v(TrackSip3dValAboveCharm),
            track_sip3d_sig_above_charm: v(TrackSip3dSigAboveCharm),
            vertex_mass: v(VertexMass),
            vertex_n_tracks: vars.get_or(VertexNTracks, 0.0),
            vertex_energy_ratio: v(VertexEnergyRatio),
            vertex_jet_delta_r: v(VertexJetDeltaR),
            flight_distance_2d_val: v(FlightDistance2dVal),
            flight_distance_2d_sig: v(FlightDistance2dSig),
            flight_distance_3d_val: v(FlightDistance3dVal),
            flight_distance_3d_sig: v(FlightDistance3dSig),
            jet_n_tracks: vars.list(TrackSip2dSig).len() as i32,
            jet_n_tracks_eta_rel: vars.list(TrackEtaRel).len() as i32,
        }
    }
}

/// `(first, last)` range per child kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildRanges([IndexRange; ChildKind::COUNT]);

impl ChildRanges {
    #[inline]
    pub fn get(&self, kind: ChildKind) -> IndexRange {
        self.0[kind as usize]
    }

    #[inline]
    pub fn set(&mut self, kind: ChildKind, range: IndexRange) {
        self.0[kind as usize] = range;
    }
}

/// One accepted jet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JetRow {
    pub pt: f32,
    pub eta: f32,
    pub phi: f32,
    pub mass: f32,
    /// -1 without a generator-level jet
    pub genpt: f32,
    pub flavour: i32,
    pub n_b_hadrons: i32,
    pub n_c_hadrons: i32,
    pub loose_id: i32,
    pub tight_id: i32,
    pub jes: f32,
    pub residual: f32,
    pub n_tracks: i32,
    /// Selected tracks within ΔR < 0.3 of the jet axis
    pub n_sel_tracks: i32,
    pub n_secondary_vertices: i32,
    /// For subjets: position of the owning fat jet, -1 when none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_jet_index: Option<i32>,
    /// Configured discriminators, in label order
    pub discriminants: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substructure: Option<SubstructureRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_vars: Option<JetTagVarRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_vars: Option<JetCsvVarRow>,
    pub ranges: ChildRanges,
}

impl JetRow {
    #[inline]
    pub fn range(&self, kind: ChildKind) -> IndexRange {
        self.ranges.get(kind)
    }
}

// ============================================================================
// Collections
// ============================================================================

/// All rows and child columns of one jet collection in one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JetCollectionRecord {
    pub name: String,
    pub discriminant_labels: Vec<String>,
    pub jets: Vec<JetRow>,
    pub tracks: Vec<TrackRow>,
    pub secondary_vertices: Vec<SvRow>,
    /// Position of each subjet in the primary jet collection, -1 when not found
    pub subjet_indices: Vec<i32>,
    pub pf_muons: Vec<LeptonRow>,
    pub pf_electrons: Vec<LeptonRow>,
    pub track_tag_vars: Vec<TrackTagVarRow>,
    pub sv_tag_vars: Vec<SvTagVarRow>,
    pub csv_track_tag_vars: Vec<CsvTrackTagVarRow>,
    pub csv_track_eta_rel: Vec<f32>,
}

impl JetCollectionRecord {
    pub fn new(name: impl Into<String>, discriminant_labels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            discriminant_labels,
            ..Default::default()
        }
    }

    /// Length of the column holding `kind`.
    pub fn column_len(&self, kind: ChildKind) -> usize {
        match kind {
            ChildKind::Track => self.tracks.len(),
            ChildKind::SecondaryVertex => self.secondary_vertices.len(),
            ChildKind::SubJet => self.subjet_indices.len(),
            ChildKind::PfMuon => self.pf_muons.len(),
            ChildKind::PfElectron => self.pf_electrons.len(),
            ChildKind::TrackTagVar => self.track_tag_vars.len(),
            ChildKind::SvTagVar => self.sv_tag_vars.len(),
            ChildKind::CsvTrackTagVar => self.csv_track_tag_vars.len(),
            ChildKind::CsvTrackEtaRelTagVar => self.csv_track_eta_rel.len(),
        }
    }

    /// Tracks belonging to jet `jet`.
    pub fn tracks_of(&self, jet: usize) -> &[TrackRow] {
        match self.jets.get(jet) {
            Some(row) => &self.tracks[row.range(ChildKind::Track).as_range()],
            None => &[],
        }
    }

    /// Secondary vertices belonging to jet `jet`.
    pub fn secondary_vertices_of(&self, jet: usize) -> &[SvRow] {
        match self.jets.get(jet) {
            Some(row) => &self.secondary_vertices[row.range(ChildKind::SecondaryVertex).as_range()],
            None => &[],
        }
    }

    /// First `(kind, jet)` whose range breaks contiguity, if any.
    ///
    /// Checks that ranges start at 0, chain end-to-start, and that the last
    /// range ends at the column length.
    pub fn first_gap(&self) -> Option<(ChildKind, usize)> {
        for kind in ChildKind::ALL {
            let mut expected = 0u32;
            for (i, jet) in self.jets.iter().enumerate() {
                let range = jet.range(kind);
                if range.first != expected || range.last < range.first {
                    return Some((kind, i));
                }
                expected = range.last;
            }
            if expected as usize != self.column_len(kind) {
                return Some((kind, self.jets.len()));
            }
        }
        None
    }

    pub fn is_contiguous(&self) -> bool {
        self.first_gap().is_none()
    }
}

/// Everything emitted for one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlatRecord {
    pub event: EventInfo,
    pub jets: JetCollectionRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_jets: Option<JetCollectionRecord>,
}

impl FlatRecord {
    /// Collections in output order.
    pub fn collections(&self) -> impl Iterator<Item = &JetCollectionRecord> {
        std::iter::once(&self.jets).chain(self.fat_jets.as_ref())
    }

    /// Jets across all collections.
    pub fn n_jets(&self) -> usize {
        self.collections().map(|c| c.jets.len()).sum()
    }
}
