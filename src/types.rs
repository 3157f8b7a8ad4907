//! Core input data model: kinematics, tracks, vertices, jets and events.
//!
//! Everything here is read-only input for one projection call. Objects
//! reference each other by index into per-event arenas:
//! - jets list their selected tracks as [`TrackId`]s into [`EventInput::tracks`]
//! - vertices list their constituents the same way
//! - groomed jets name their subjets by [`ObjectKey`], the identity of the
//!   un-groomed object each subjet was built from
//!
//! None of these types hold references to one another, so a whole event can be
//! deserialized from a single JSON document.

use std::f64::consts::PI;
use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::tagging::TaggingVariableList;

/// Sentinel written for scalars that could not be computed or looked up.
pub const MISSING_VALUE: f32 = -9999.0;

/// Charged pion mass in GeV, assigned to tracks when building four-momenta.
pub const CHARGED_PION_MASS: f64 = 0.139_570_18;

// ============================================================================
// Geometry
// ============================================================================

/// Cartesian three-vector used for positions, errors and directions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    /// Create a new vector.
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The null vector.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub fn mag2(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline]
    pub fn mag(&self) -> f64 {
        self.mag2().sqrt()
    }

    /// Transverse component.
    #[inline]
    pub fn perp(&self) -> f64 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Unit vector in the same direction (the null vector stays null).
    pub fn unit(&self) -> Vector3 {
        let mag = self.mag();
        if mag > 0.0 {
            *self * (1.0 / mag)
        } else {
            *self
        }
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Lorentz four-momentum in (px, py, pz, E) components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourMomentum {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl FourMomentum {
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Build from collider coordinates.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        Self::new(px, py, pz, (p2 + mass * mass).sqrt())
    }

    /// Build from a momentum vector and a mass hypothesis.
    pub fn from_momentum(momentum: Vector3, mass: f64) -> Self {
        let e = (momentum.mag2() + mass * mass).sqrt();
        Self::new(momentum.x, momentum.y, momentum.z, e)
    }

    #[inline]
    pub fn momentum(&self) -> Vector3 {
        Vector3::new(self.px, self.py, self.pz)
    }

    #[inline]
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    #[inline]
    pub fn p(&self) -> f64 {
        self.momentum().mag()
    }

    /// Invariant mass squared.
    #[inline]
    pub fn mass2(&self) -> f64 {
        self.e * self.e - self.momentum().mag2()
    }

    /// Invariant mass; space-like vectors return `-sqrt(-m²)`.
    pub fn mass(&self) -> f64 {
        let m2 = self.mass2();
        if m2 >= 0.0 {
            m2.sqrt()
        } else {
            -(-m2).sqrt()
        }
    }

    /// Rapidity along the beam axis.
    pub fn rapidity(&self) -> f64 {
        let num = self.e + self.pz;
        let den = self.e - self.pz;
        if num <= 0.0 || den <= 0.0 {
            return if self.pz >= 0.0 { f64::MAX } else { f64::MIN };
        }
        0.5 * (num / den).ln()
    }

    /// The four-vector scaled component-wise by `factor`.
    #[inline]
    pub fn scaled(&self, factor: f64) -> FourMomentum {
        FourMomentum::new(
            self.px * factor,
            self.py * factor,
            self.pz * factor,
            self.e * factor,
        )
    }
}

impl Add for FourMomentum {
    type Output = FourMomentum;

    fn add(self, rhs: FourMomentum) -> FourMomentum {
        FourMomentum::new(
            self.px + rhs.px,
            self.py + rhs.py,
            self.pz + rhs.pz,
            self.e + rhs.e,
        )
    }
}

impl AddAssign for FourMomentum {
    fn add_assign(&mut self, rhs: FourMomentum) {
        *self = *self + rhs;
    }
}

/// Anything with a direction in (η, φ) space.
pub trait Direction {
    /// Pseudorapidity.
    fn eta(&self) -> f64;
    /// Azimuth in (-π, π].
    fn phi(&self) -> f64;
}

fn pseudorapidity(perp: f64, z: f64) -> f64 {
    if perp == 0.0 {
        return if z > 0.0 {
            f64::MAX
        } else if z < 0.0 {
            f64::MIN
        } else {
            0.0
        };
    }
    (z / perp).asinh()
}

impl Direction for Vector3 {
    fn eta(&self) -> f64 {
        pseudorapidity(self.perp(), self.z)
    }

    fn phi(&self) -> f64 {
        if self.x == 0.0 && self.y == 0.0 {
            0.0
        } else {
            self.y.atan2(self.x)
        }
    }
}

impl Direction for FourMomentum {
    fn eta(&self) -> f64 {
        self.momentum().eta()
    }

    fn phi(&self) -> f64 {
        self.momentum().phi()
    }
}

/// Azimuthal difference folded into [-π, π].
#[inline]
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    let mut d = phi1 - phi2;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d <= -PI {
        d += 2.0 * PI;
    }
    d
}

/// Squared angular distance ΔR² = Δη² + Δφ².
#[inline]
pub fn delta_r2(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    let deta = eta1 - eta2;
    let dphi = delta_phi(phi1, phi2);
    deta * deta + dphi * dphi
}

#[inline]
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    delta_r2(eta1, phi1, eta2, phi2).sqrt()
}

/// ΔR between any two directed objects.
#[inline]
pub fn delta_r_between<A: Direction + ?Sized, B: Direction + ?Sized>(a: &A, b: &B) -> f64 {
    delta_r(a.eta(), a.phi(), b.eta(), b.phi())
}

/// A value with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub error: f64,
}

impl Measurement {
    pub const fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }

    /// value / error, or 0 for a vanishing error.
    pub fn significance(&self) -> f64 {
        if self.error != 0.0 {
            self.value / self.error
        } else {
            0.0
        }
    }
}

// ============================================================================
// Tracks
// ============================================================================

/// Index of a track in the event-wide track arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub usize);

/// Valid-hit counts by sub-detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HitPattern {
    pub valid_hits: u32,
    pub pixel_hits: u32,
    pub strip_hits: u32,
    pub tib_hits: u32,
    pub tid_hits: u32,
    pub tob_hits: u32,
    pub tec_hits: u32,
    pub pixel_barrel_hits: u32,
    pub pixel_endcap_hits: u32,
    pub has_first_pixel_barrel_hit: bool,
}

/// A reconstructed charged-particle trajectory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Track {
    /// Point of closest approach to the beam line
    pub reference_point: Vector3,
    /// Momentum at the reference point
    pub momentum: Vector3,
    pub charge: i32,
    pub normalized_chi2: f64,
    #[serde(default)]
    pub hits: HitPattern,
    /// Whether the track entered the leading vertex fit, for tracks built
    /// from packed candidates. `None` when only vertex fit weights exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_in_pv_fit: Option<bool>,
}

impl Track {
    #[inline]
    pub fn pt(&self) -> f64 {
        self.momentum.perp()
    }

    #[inline]
    pub fn p(&self) -> f64 {
        self.momentum.mag()
    }

    /// Four-momentum under the charged pion mass hypothesis.
    pub fn p4(&self) -> FourMomentum {
        FourMomentum::from_momentum(self.momentum, CHARGED_PION_MASS)
    }

    /// Transverse impact parameter with respect to `point`.
    pub fn dxy(&self, point: &Vector3) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return 0.0;
        }
        let r = self.reference_point;
        (-(r.x - point.x) * self.momentum.y + (r.y - point.y) * self.momentum.x) / pt
    }

    /// Longitudinal impact parameter with respect to `point`.
    pub fn dz(&self, point: &Vector3) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return self.reference_point.z - point.z;
        }
        let r = self.reference_point;
        let transverse =
            (r.x - point.x) * self.momentum.x + (r.y - point.y) * self.momentum.y;
        (r.z - point.z) - transverse / pt * (self.momentum.z / pt)
    }
}

impl Direction for Track {
    fn eta(&self) -> f64 {
        self.momentum.eta()
    }

    fn phi(&self) -> f64 {
        self.momentum.phi()
    }
}

/// A track reference with the weight a vertex fit assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedTrack {
    pub track: TrackId,
    pub weight: f32,
}

impl WeightedTrack {
    pub const fn new(track: TrackId, weight: f32) -> Self {
        Self { track, weight }
    }
}

// ============================================================================
// Vertices
// ============================================================================

/// Errors assigned to the fallback vertex used when an event has none.
pub const FALLBACK_VERTEX_ERROR: Vector3 = Vector3::new(0.0015, 0.0015, 15.0);

/// A reconstructed primary interaction vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryVertex {
    pub position: Vector3,
    /// Per-axis position uncertainty
    pub error: Vector3,
    pub chi2: f64,
    pub ndof: f64,
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default)]
    pub is_fake: bool,
    /// Tracks used in the fit, with their adaptive-fit weights
    #[serde(default)]
    pub tracks: Vec<WeightedTrack>,
}

fn default_true() -> bool {
    true
}

impl PrimaryVertex {
    /// Beam-spot-like stand-in at the origin, used only as a reference point.
    pub fn fallback() -> Self {
        Self {
            position: Vector3::zero(),
            error: FALLBACK_VERTEX_ERROR,
            chi2: 0.0,
            ndof: 0.0,
            is_valid: true,
            is_fake: true,
            tracks: Vec::new(),
        }
    }

    /// χ²/ndof, 0 when ndof vanishes.
    pub fn normalized_chi2(&self) -> f64 {
        if self.ndof != 0.0 {
            self.chi2 / self.ndof
        } else {
            0.0
        }
    }
}

/// A secondary vertex produced by a weighted (adaptive) fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedVertex {
    pub position: Vector3,
    pub error: Vector3,
    pub chi2: f64,
    pub ndof: f64,
    /// Four-momentum of the vertex as reported by the fit
    pub p4: FourMomentum,
    pub tracks: Vec<WeightedTrack>,
}

/// A secondary vertex assembled from constituent references, without fit weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeVertex {
    pub position: Vector3,
    pub error: Vector3,
    pub chi2: f64,
    pub ndof: f64,
    pub p4: FourMomentum,
    pub daughters: Vec<TrackId>,
}

/// The two secondary-vertex representations.
///
/// Both expose the same field set through [`crate::association::VertexView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecondaryVertex {
    Fitted(FittedVertex),
    Composite(CompositeVertex),
}

impl SecondaryVertex {
    pub fn p4(&self) -> FourMomentum {
        match self {
            SecondaryVertex::Fitted(v) => v.p4,
            SecondaryVertex::Composite(v) => v.p4,
        }
    }
}

// ============================================================================
// Tag infos
// ============================================================================

/// Impact-parameter quantities computed upstream for one selected track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactParameterData {
    pub ip2d: Measurement,
    pub ip3d: Measurement,
    pub distance_to_jet_axis: Measurement,
    /// Point on the track closest to the jet axis
    pub closest_to_jet_axis: Vector3,
}

/// Track-counting tag info: the jet's selected tracks with their IP data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpTagInfo {
    pub selected_tracks: Vec<TrackId>,
    /// Parallel to `selected_tracks`
    pub impact_parameters: Vec<ImpactParameterData>,
    /// Jet-probability track probabilities, parallel to `selected_tracks`
    pub probabilities: Vec<f32>,
    pub variables: TaggingVariableList,
}

/// Flight information of a secondary vertex relative to the primary vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightInfo {
    pub distance_3d: Measurement,
    pub distance_2d: Measurement,
    pub direction: Vector3,
}

/// Secondary-vertex tag info: the jet's own vertices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SvTagInfo {
    pub vertices: Vec<SecondaryVertex>,
    /// Parallel to `vertices`
    pub flights: Vec<FlightInfo>,
    pub variables: TaggingVariableList,
}

impl SvTagInfo {
    /// Flight info for vertex `index`, zeroed when absent.
    pub fn flight(&self, index: usize) -> FlightInfo {
        self.flights.get(index).copied().unwrap_or_default()
    }
}

/// Properties of a soft lepton relative to its jet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeptonProperties {
    pub pt_rel: f32,
    pub ratio: f32,
    pub ratio_rel: f32,
    pub delta_r: f32,
    pub sip3d: f32,
    pub sip2d: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SoftLepton {
    pub p4: FourMomentum,
    #[serde(default)]
    pub properties: LeptonProperties,
}

// ============================================================================
// Jets
// ============================================================================

/// Identity of the un-groomed object a jet was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(pub u64);

/// Particle-flow energy fractions and multiplicities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JetComposition {
    pub charged_hadron_energy_fraction: f32,
    pub neutral_hadron_energy_fraction: f32,
    pub photon_energy_fraction: f32,
    pub electron_energy_fraction: f32,
    pub muon_energy_fraction: f32,
    pub charged_hadron_multiplicity: i32,
    pub neutral_hadron_multiplicity: i32,
    pub photon_multiplicity: i32,
    pub electron_multiplicity: i32,
    pub muon_multiplicity: i32,
}

/// N-subjettiness values for a fat jet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Nsubjettiness {
    pub tau1: f32,
    pub tau2: f32,
}

/// A reconstructed jet with everything attached to it upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jet {
    /// Fully corrected four-momentum
    pub p4: FourMomentum,
    pub original_key: ObjectKey,
    /// Keys of the subjets' original objects (groomed jets only)
    #[serde(default)]
    pub daughter_keys: Vec<ObjectKey>,
    /// pt before any energy correction, when corrections were applied
    #[serde(default)]
    pub uncorrected_pt: Option<f64>,
    /// pt at the L3-absolute correction level, when corrections were applied
    #[serde(default)]
    pub l3_absolute_pt: Option<f64>,
    #[serde(default)]
    pub parton_flavour: i32,
    #[serde(default)]
    pub n_b_hadrons: i32,
    #[serde(default)]
    pub n_c_hadrons: i32,
    #[serde(default)]
    pub gen_pt: Option<f64>,
    #[serde(default)]
    pub loose_id: Option<bool>,
    #[serde(default)]
    pub tight_id: Option<bool>,
    #[serde(default)]
    pub composition: JetComposition,
    #[serde(default)]
    pub nsubjettiness: Option<Nsubjettiness>,
    /// N-subjettiness recomputed with secondary vertices as axis seeds
    #[serde(default)]
    pub nsubjettiness_ivf: Option<Nsubjettiness>,
    /// Discriminator values, positional per the source's catalog
    #[serde(default)]
    pub discriminants: Vec<f32>,
    #[serde(default)]
    pub ip_info: Option<IpTagInfo>,
    #[serde(default)]
    pub sv_info: Option<SvTagInfo>,
    #[serde(default)]
    pub soft_muon_info: Option<Vec<SoftLepton>>,
    #[serde(default)]
    pub soft_electron_info: Option<Vec<SoftLepton>>,
    /// Variables of the combined secondary-vertex computer
    #[serde(default)]
    pub csv_variables: Option<TaggingVariableList>,
}

impl Jet {
    /// A bare jet with the given kinematics and key.
    pub fn new(p4: FourMomentum, original_key: ObjectKey) -> Self {
        Self {
            p4,
            original_key,
            daughter_keys: Vec::new(),
            uncorrected_pt: None,
            l3_absolute_pt: None,
            parton_flavour: 0,
            n_b_hadrons: 0,
            n_c_hadrons: 0,
            gen_pt: None,
            loose_id: None,
            tight_id: None,
            composition: JetComposition::default(),
            nsubjettiness: None,
            nsubjettiness_ivf: None,
            discriminants: Vec::new(),
            ip_info: None,
            sv_info: None,
            soft_muon_info: None,
            soft_electron_info: None,
            csv_variables: None,
        }
    }

    #[inline]
    pub fn pt(&self) -> f64 {
        self.p4.pt()
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.p4.mass()
    }

    /// pt before corrections, falling back to the corrected pt.
    pub fn raw_pt(&self) -> f64 {
        self.uncorrected_pt.unwrap_or_else(|| self.pt())
    }

    /// Jet energy scale factor, 1 without corrections.
    pub fn jes(&self) -> f64 {
        match self.uncorrected_pt {
            Some(raw) if raw != 0.0 => self.pt() / raw,
            _ => 1.0,
        }
    }

    /// Residual correction factor, 1 without corrections.
    pub fn residual(&self) -> f64 {
        match self.l3_absolute_pt {
            Some(l3) if l3 != 0.0 => self.pt() / l3,
            _ => 1.0,
        }
    }

    /// Number of selected tracks in the IP tag info.
    pub fn n_selected_tracks(&self) -> usize {
        self.ip_info.as_ref().map_or(0, |ip| ip.selected_tracks.len())
    }

    /// Number of secondary vertices in the SV tag info.
    pub fn n_secondary_vertices(&self) -> usize {
        self.sv_info.as_ref().map_or(0, |sv| sv.vertices.len())
    }
}

impl Direction for Jet {
    fn eta(&self) -> f64 {
        self.p4.eta()
    }

    fn phi(&self) -> f64 {
        self.p4.phi()
    }
}

// ============================================================================
// Event-level inputs
// ============================================================================

/// Raw trigger decisions with their (optionally retrievable) path names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerResults {
    pub accept: Vec<bool>,
    /// Parallel to `accept`; `None` when the names could not be retrieved
    pub names: Option<Vec<String>>,
}

impl TriggerResults {
    /// Results where every listed path fired.
    pub fn all_accepted<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self {
            accept: vec![true; names.len()],
            names: Some(names),
        }
    }
}

/// Generator-level event summary (simulation only).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSummary {
    pub weight: f64,
    pub binning_values: Vec<f64>,
    /// Hadronizer module that produced the sample
    pub hadronizer: Hadronizer,
}

/// Parton-shower generator flavour, which fixes hard-process status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Hadronizer {
    #[default]
    Pythia6,
    Pythia8,
}

impl Hadronizer {
    /// Whether a generator status code marks a hard-process particle.
    pub fn is_hard_process(self, status: i32) -> bool {
        match self {
            Hadronizer::Pythia8 => (21..=29).contains(&status),
            Hadronizer::Pythia6 => status == 3,
        }
    }
}

/// Pileup summary for one bunch crossing (simulation only).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PileupSummary {
    pub bunch_crossing: i32,
    pub true_interactions: f32,
    pub interactions: i32,
    pub z_positions: Vec<f32>,
    pub sum_pt_low: Vec<f32>,
    pub sum_pt_high: Vec<f32>,
    pub ntrks_low: Vec<i32>,
    pub ntrks_high: Vec<i32>,
}

/// A pruned generator particle (simulation only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenParticle {
    pub p4: FourMomentum,
    pub status: i32,
    pub pdg_id: i32,
    #[serde(default)]
    pub vz: f64,
    /// Index of the first mother within the same collection
    #[serde(default)]
    pub mother: Option<usize>,
    #[serde(default)]
    pub has_mother: bool,
}

/// A reconstructed muon with its track summaries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Muon {
    pub p4: FourMomentum,
    pub is_global: bool,
    pub is_pf: bool,
    pub inner_valid_hits: u32,
    pub inner_pixel_hits: u32,
    pub inner_missing_outer_hits: u32,
    pub outer_valid_muon_hits: u32,
    pub matched_stations: u32,
    pub global_normalized_chi2: f64,
    pub inner_normalized_chi2: f64,
    pub vz: f64,
    pub ip3d: Measurement,
    pub ip2d: Measurement,
}

/// Everything the projector reads for one event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventInput {
    pub run: u32,
    pub event: u64,
    pub lumi_block: u32,
    pub is_data: bool,
    /// Track arena referenced by [`TrackId`]
    pub tracks: Vec<Track>,
    pub primary_vertices: Vec<PrimaryVertex>,
    /// Primary jet collection (the subjets when substructure is enabled)
    pub jets: Vec<Jet>,
    pub fat_jets: Vec<Jet>,
    pub groomed_fat_jets: Vec<Jet>,
    pub trigger: TriggerResults,
    pub generator: Option<GeneratorSummary>,
    pub pileup: Vec<PileupSummary>,
    pub gen_particles: Vec<GenParticle>,
    pub muons: Vec<Muon>,
}

impl EventInput {
    /// Create an empty event with the given identifiers.
    pub fn new(run: u32, event: u64, lumi_block: u32) -> Self {
        Self {
            run,
            event,
            lumi_block,
            is_data: true,
            ..Default::default()
        }
    }

    /// Look up a track in the arena.
    #[inline]
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_delta_phi_wraps() {
        assert_relative_eq!(delta_phi(3.0, -3.0), 6.0 - 2.0 * PI, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(-3.0, 3.0), 2.0 * PI - 6.0, epsilon = 1e-12);
        assert_relative_eq!(delta_phi(0.5, 0.2), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_delta_r() {
        assert_relative_eq!(delta_r(0.0, 0.0, 3.0, 4.0), 5.0, epsilon = 1e-12);
        assert_relative_eq!(delta_r2(1.0, 0.0, 1.1, 0.0), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_four_momentum_round_trip_kinematics() {
        let p = FourMomentum::from_pt_eta_phi_m(50.0, 1.2, -0.7, 10.0);
        assert_relative_eq!(p.pt(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(p.eta(), 1.2, epsilon = 1e-9);
        assert_relative_eq!(p.phi(), -0.7, epsilon = 1e-9);
        assert_relative_eq!(p.mass(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rapidity_equals_eta_for_massless() {
        let p = FourMomentum::from_pt_eta_phi_m(20.0, 0.8, 0.0, 0.0);
        assert_relative_eq!(p.rapidity(), 0.8, epsilon = 1e-9);
        let heavy = FourMomentum::from_pt_eta_phi_m(20.0, 0.8, 0.0, 30.0);
        assert!(heavy.rapidity() < 0.8);
    }

    #[test]
    fn test_four_momentum_add() {
        let a = FourMomentum::new(1.0, 0.0, 0.0, 2.0);
        let b = FourMomentum::new(-1.0, 0.0, 0.0, 2.0);
        let sum = a + b;
        assert_relative_eq!(sum.mass(), 4.0);
        assert_relative_eq!(sum.pt(), 0.0);
    }

    #[test]
    fn test_track_impact_parameters() {
        // Track along +x displaced by 0.1 in y: dxy w.r.t. origin is +0.1
        let track = Track {
            reference_point: Vector3::new(0.0, 0.1, 2.0),
            momentum: Vector3::new(10.0, 0.0, 0.0),
            charge: 1,
            normalized_chi2: 1.0,
            hits: HitPattern::default(),
            used_in_pv_fit: None,
        };
        assert_relative_eq!(track.dxy(&Vector3::zero()), 0.1, epsilon = 1e-12);
        assert_relative_eq!(track.dz(&Vector3::new(0.0, 0.0, 0.5)), 1.5, epsilon = 1e-12);
        assert_relative_eq!(track.p4().mass(), CHARGED_PION_MASS, epsilon = 1e-9);
    }

    #[test]
    fn test_measurement_significance() {
        assert_relative_eq!(Measurement::new(0.3, 0.1).significance(), 3.0, epsilon = 1e-12);
        assert_eq!(Measurement::new(0.3, 0.0).significance(), 0.0);
    }

    #[test]
    fn test_jet_correction_factors() {
        let mut jet = Jet::new(FourMomentum::from_pt_eta_phi_m(60.0, 0.0, 0.0, 5.0), ObjectKey(1));
        assert_eq!(jet.jes(), 1.0);
        assert_eq!(jet.residual(), 1.0);

        jet.uncorrected_pt = Some(50.0);
        jet.l3_absolute_pt = Some(40.0);
        assert_relative_eq!(jet.jes(), 1.2, epsilon = 1e-9);
        assert_relative_eq!(jet.residual(), 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_hard_process_status() {
        assert!(Hadronizer::Pythia8.is_hard_process(22));
        assert!(!Hadronizer::Pythia8.is_hard_process(3));
        assert!(Hadronizer::Pythia6.is_hard_process(3));
    }

    #[test]
    fn test_fallback_vertex() {
        let pv = PrimaryVertex::fallback();
        assert_eq!(pv.position, Vector3::zero());
        assert_eq!(pv.error.z, 15.0);
        assert!(pv.is_fake);
    }

    #[test]
    fn test_secondary_vertex_json_tagging() {
        let json = r#"{"kind":"composite","position":{"x":0.1,"y":0.0,"z":0.0},
            "error":{"x":0.01,"y":0.01,"z":0.01},"chi2":1.0,"ndof":2.0,
            "p4":{"px":1.0,"py":0.0,"pz":0.0,"e":2.0},"daughters":[0,3]}"#;
        let sv: SecondaryVertex = serde_json::from_str(json).unwrap();
        match sv {
            SecondaryVertex::Composite(v) => assert_eq!(v.daughters, vec![TrackId(0), TrackId(3)]),
            SecondaryVertex::Fitted(_) => panic!("expected composite vertex"),
        }
    }
}
