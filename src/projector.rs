//! Event projection: nested jets, tracks and vertices into one flat record.
//!
//! Each event moves through a fixed sequence of stages:
//!
//! ```text
//! Init ─► MatchGroomed ─► ProjectPrimaryJets ─► ProjectGroomedJets ─► Finalize
//!  │      (substructure)                         (substructure)
//!  └─► Rejected (real data with no trigger bit set)
//! ```
//!
//! `Init` packs the trigger bits and builds the event block. Simulated events
//! are always emitted. `MatchGroomed` pairs groomed jets with fat jets by
//! greedy nearest-neighbour matching. Each projection pass walks one jet
//! collection in input order, drops jets failing the acceptance cuts, and
//! appends every variable-length child through a [`FlatLayout`], closing all
//! of the jet's ranges before moving on.
//!
//! Everything except exhausting a fixed-capacity layout is recoverable:
//! sentinel values are written and a warning is recorded.
//!
//! # Example
//!
//! ```
//! use jet_ntuplizer::config::NtuplizerConfig;
//! use jet_ntuplizer::projector::EventProjector;
//! use jet_ntuplizer::providers::DiscriminantCatalog;
//! use jet_ntuplizer::types::{EventInput, TriggerResults};
//! use jet_ntuplizer::warnings::WarningTracker;
//!
//! let mut warnings = WarningTracker::silent();
//! let config = NtuplizerConfig::default().with_trigger_paths(["HLT_PFJet*"]);
//! let projector =
//!     EventProjector::new(config, &DiscriminantCatalog::default(), &mut warnings).unwrap();
//!
//! let mut event = EventInput::new(1, 7, 3);
//! event.trigger = TriggerResults::all_accepted(["HLT_PFJet80_v2"]);
//!
//! let mut layout = projector.new_layout();
//! let outcome = projector.project(&event, &mut layout, &mut warnings).unwrap();
//! assert_eq!(outcome.record().unwrap().event.trigger_bits, vec![1]);
//! ```

use std::fmt;

use indexmap::IndexSet;

use crate::association::{Association, AssociationStrategy, VertexView};
use crate::config::{EnergyRatioScope, NtuplizerConfig, VertexRepresentation};
use crate::error::Result;
use crate::kinematics::{energy_ratio, KinematicAggregator, Line};
use crate::layout::{ChildKind, FlatLayout};
use crate::matching::{GreedyNearestMatcher, KeyIndex, MatchResult, SubjetMembership};
use crate::providers::{
    DiscriminantProvider, EmbeddedTagVariables, ResolvedDiscriminants, TagVariableProvider,
};
use crate::record::{
    ChildRanges, CsvTrackTagVarRow, EventInfo, FlatRecord, GenParticleRow, JetCollectionRecord,
    JetCsvVarRow, JetRow, JetTagVarRow, LeptonRow, McInfo, MuonRow, PileupRow, PrimaryVertexRow,
    SubstructureRow, SvRow, SvTagVarRow, TrackRow, TrackTagVarRow,
};
use crate::tagging::{TagVariableSource, TaggingVariable, TaggingVariableList};
use crate::trigger::{TriggerBitPacker, TriggerIssue};
use crate::types::{
    delta_r_between, Direction, EventInput, Jet, Muon, PrimaryVertex, SoftLepton, Track, TrackId,
    Vector3, MISSING_VALUE,
};
use crate::warnings::{WarningCategory, WarningTracker};

/// Collection name of the primary jets (the subjets when substructure is on).
pub const PRIMARY_COLLECTION: &str = "JetInfo";

/// Collection name of the fat jets.
pub const FAT_JET_COLLECTION: &str = "FatJetInfo";

/// ΔR cone for selected-track and subjet-track counting.
pub const TRACK_CONE: f64 = 0.3;

// ============================================================================
// Stages and outcome
// ============================================================================

/// Stage of one event's projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStage {
    Init,
    MatchGroomed,
    ProjectPrimaryJets,
    ProjectGroomedJets,
    Finalize,
}

impl ProjectionStage {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectionStage::Init => "init",
            ProjectionStage::MatchGroomed => "match-groomed",
            ProjectionStage::ProjectPrimaryJets => "project-primary-jets",
            ProjectionStage::ProjectGroomedJets => "project-groomed-jets",
            ProjectionStage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for ProjectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal state of one event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionOutcome {
    /// The record to hand to the sink
    Emitted(Box<FlatRecord>),
    /// Real-data event with no configured trigger fired
    Rejected,
}

impl ProjectionOutcome {
    pub fn is_emitted(&self) -> bool {
        matches!(self, ProjectionOutcome::Emitted(_))
    }

    pub fn record(&self) -> Option<&FlatRecord> {
        match self {
            ProjectionOutcome::Emitted(record) => Some(record),
            ProjectionOutcome::Rejected => None,
        }
    }

    pub fn into_record(self) -> Option<FlatRecord> {
        match self {
            ProjectionOutcome::Emitted(record) => Some(*record),
            ProjectionOutcome::Rejected => None,
        }
    }
}

// ============================================================================
// Per-pass context
// ============================================================================

/// Groomed-to-fat matching for one event.
struct Grooming<'a> {
    groomed: &'a [Jet],
    matched: MatchResult,
    membership: SubjetMembership,
    subjet_positions: KeyIndex,
}

enum Pass<'a> {
    /// Primary jets; `membership` is set when they are subjets of fat jets
    Primary {
        membership: Option<&'a SubjetMembership>,
    },
    Fat(&'a Grooming<'a>),
}

struct CollectionContext<'a> {
    name: &'static str,
    input: &'a EventInput,
    jets: &'a [Jet],
    pv: &'a PrimaryVertex,
    pass: Pass<'a>,
}

impl CollectionContext<'_> {
    /// Zero-pt subjet: recorded with its fat-jet link only.
    fn is_degenerate_subjet(&self, jet: &Jet) -> bool {
        matches!(
            self.pass,
            Pass::Primary {
                membership: Some(_)
            }
        ) && jet.pt() == 0.0
    }
}

#[derive(Debug, Default)]
struct TrackCounts {
    n_tracks: i32,
    n_sel_tracks: i32,
    n_shared_tracks: i32,
}

// ============================================================================
// Projector
// ============================================================================

/// Projects [`EventInput`]s into [`FlatRecord`]s.
///
/// Holds only read-only state built from the configuration, so one projector
/// can serve any number of events. Per-event state lives in the
/// [`FlatLayout`] and [`WarningTracker`] passed to [`project`](Self::project).
pub struct EventProjector {
    config: NtuplizerConfig,
    trigger: TriggerBitPacker,
    discriminants: ResolvedDiscriminants,
    matcher: GreedyNearestMatcher,
    sv_association: AssociationStrategy,
    tag_variables: Box<dyn TagVariableProvider>,
}

impl EventProjector {
    /// Build a projector, compiling trigger patterns and resolving discriminators.
    ///
    /// Unknown discriminators are recorded once in `warnings` and filled with
    /// the sentinel for every jet.
    pub fn new(
        config: NtuplizerConfig,
        discriminants: &dyn DiscriminantProvider,
        warnings: &mut WarningTracker,
    ) -> Result<Self> {
        config.validate()?;

        let trigger = TriggerBitPacker::new(&config.trigger_path_names)?;
        let discriminants =
            ResolvedDiscriminants::resolve(&config.discriminants, discriminants, warnings);

        log::info!(
            "Projector ready: {} trigger patterns, {}/{} discriminators, subjets={}, sv={:?}",
            trigger.len(),
            discriminants.n_resolved(),
            discriminants.len(),
            config.run_subjets,
            config.vertex_representation
        );

        Ok(Self {
            matcher: GreedyNearestMatcher::new(config.groomed_match_coordinate),
            sv_association: config.sv_association(),
            tag_variables: Box::new(EmbeddedTagVariables),
            config,
            trigger,
            discriminants,
        })
    }

    /// Replace the tag-variable provider.
    pub fn with_tag_variables(mut self, provider: impl TagVariableProvider + 'static) -> Self {
        self.tag_variables = Box::new(provider);
        self
    }

    pub fn config(&self) -> &NtuplizerConfig {
        &self.config
    }

    pub fn discriminant_labels(&self) -> &[String] {
        self.discriminants.labels()
    }

    /// A layout honouring the configured capacity.
    pub fn new_layout(&self) -> FlatLayout {
        match self.config.layout_capacity {
            Some(capacity) => FlatLayout::with_capacity(capacity),
            None => FlatLayout::new(),
        }
    }

    /// Project one event.
    ///
    /// # Errors
    ///
    /// Only [`crate::error::NtupleError::CapacityExceeded`], which is fatal for
    /// the run. No partial record is returned.
    pub fn project(
        &self,
        input: &EventInput,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<ProjectionOutcome> {
        self.enter(ProjectionStage::Init, input);

        let packed = self.trigger.pack(&input.trigger);
        match packed.issue {
            Some(TriggerIssue::NamesNotFound) => {
                warnings.record_simple(
                    WarningCategory::TriggerNamesNotFound,
                    "Could not get trigger names",
                );
            }
            Some(TriggerIssue::LengthMismatch { names, decisions }) => {
                warnings.record_simple(
                    WarningCategory::TriggerPathLengthMismatch,
                    format!("Length of names and paths not the same: {names},{decisions}"),
                );
            }
            None => {}
        }

        if input.is_data && !packed.bits.any() {
            log::trace!(
                "run {} event {}: no trigger bit set, rejected",
                input.run,
                input.event
            );
            return Ok(ProjectionOutcome::Rejected);
        }

        let fallback;
        let pv = match input.primary_vertices.first() {
            Some(pv) => pv,
            None => {
                warnings.record_simple(
                    WarningCategory::MissingPrimaryVertex,
                    "no primary vertex, using the fallback vertex at the origin",
                );
                fallback = PrimaryVertex::fallback();
                &fallback
            }
        };

        let event = self.event_info(input, pv, packed.bits.into_words());

        let grooming = if self.config.run_subjets {
            self.enter(ProjectionStage::MatchGroomed, input);
            Some(self.match_groomed(input, warnings))
        } else {
            None
        };

        self.enter(ProjectionStage::ProjectPrimaryJets, input);
        let primary = CollectionContext {
            name: PRIMARY_COLLECTION,
            input,
            jets: &input.jets,
            pv,
            pass: Pass::Primary {
                membership: grooming.as_ref().map(|g| &g.membership),
            },
        };
        let jets = self.project_collection(&primary, layout, warnings)?;

        let fat_jets = match &grooming {
            Some(grooming) => {
                self.enter(ProjectionStage::ProjectGroomedJets, input);
                let fat = CollectionContext {
                    name: FAT_JET_COLLECTION,
                    input,
                    jets: &input.fat_jets,
                    pv,
                    pass: Pass::Fat(grooming),
                };
                Some(self.project_collection(&fat, layout, warnings)?)
            }
            None => None,
        };

        self.enter(ProjectionStage::Finalize, input);
        Ok(ProjectionOutcome::Emitted(Box::new(FlatRecord {
            event,
            jets,
            fat_jets,
        })))
    }

    #[inline]
    fn enter(&self, stage: ProjectionStage, input: &EventInput) {
        log::trace!("run {} event {}: {}", input.run, input.event, stage);
    }

    // ------------------------------------------------------------------------
    // Event block
    // ------------------------------------------------------------------------

    fn event_info(&self, input: &EventInput, pv: &PrimaryVertex, trigger_bits: Vec<u32>) -> EventInfo {
        // simulated events carry a negated run number
        let run = if input.is_data {
            i64::from(input.run)
        } else {
            -i64::from(input.run)
        };

        let mc = (!input.is_data && self.config.store_event_info).then(|| mc_info(input));

        let muons = if self.config.store_muon_info {
            input
                .muons
                .iter()
                .filter(|m| m.is_global)
                .map(muon_row)
                .collect()
        } else {
            Vec::new()
        };

        EventInfo {
            run,
            event: input.event,
            lumi_block: input.lumi_block,
            is_data: input.is_data,
            trigger_bits,
            pv_z: pv.position.z as f32,
            pv_ez: pv.error.z as f32,
            primary_vertices: input.primary_vertices.iter().map(primary_vertex_row).collect(),
            mc,
            muons,
        }
    }

    // ------------------------------------------------------------------------
    // Grooming
    // ------------------------------------------------------------------------

    fn match_groomed<'a>(&self, input: &'a EventInput, warnings: &mut WarningTracker) -> Grooming<'a> {
        let fat = &input.fat_jets;
        let groomed = &input.groomed_fat_jets;

        if groomed.len() > fat.len() {
            warnings.record_simple(
                WarningCategory::TooManyGroomedJets,
                format!(
                    "{} groomed jets for {} fat jets; some groomed jets cannot be matched",
                    groomed.len(),
                    fat.len()
                ),
            );
        }

        let matched = self.matcher.match_jets(fat, groomed);
        let unmatched = matched.unmatched_candidates();
        if unmatched > 0 {
            warnings.record_simple(
                WarningCategory::JetMatchingFailed,
                format!(
                    "{unmatched} of {} groomed jets found no fat jet; check that the collections belong together",
                    groomed.len()
                ),
            );
        }

        let membership = SubjetMembership::build(&matched.reference_to_candidate, groomed);
        log::trace!(
            "Matched {} groomed jets, {} subjet keys owned",
            groomed.len() - unmatched,
            membership.len()
        );

        Grooming {
            groomed,
            matched,
            membership,
            subjet_positions: KeyIndex::build(&input.jets),
        }
    }

    // ------------------------------------------------------------------------
    // Collection pass
    // ------------------------------------------------------------------------

    fn accepts(&self, jet: &Jet) -> bool {
        !self.config.allow_jet_skipping
            || (jet.pt() >= self.config.min_jet_pt && jet.eta().abs() <= self.config.max_jet_eta)
    }

    fn project_collection(
        &self,
        ctx: &CollectionContext<'_>,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<JetCollectionRecord> {
        layout.reset();
        let mut record = JetCollectionRecord::new(ctx.name, self.discriminants.labels().to_vec());

        let accepted: Vec<usize> = ctx
            .jets
            .iter()
            .enumerate()
            .filter(|(_, jet)| self.accepts(jet))
            .map(|(i, _)| i)
            .collect();

        let collection_kinematics = match self.config.energy_ratio_scope {
            EnergyRatioScope::Event => Some(
                self.pv_track_kinematics(
                    ctx.input,
                    accepted
                        .iter()
                        .map(|&i| &ctx.jets[i])
                        .filter(|jet| !ctx.is_degenerate_subjet(jet)),
                ),
            ),
            EnergyRatioScope::Jet => None,
        };

        for &i in &accepted {
            self.project_jet(ctx, i, collection_kinematics.as_ref(), &mut record, layout, warnings)?;
        }

        debug_assert!(record.is_contiguous(), "{} ranges not contiguous", ctx.name);
        log::trace!(
            "{}: {} of {} jets, {} tracks, {} secondary vertices",
            ctx.name,
            record.jets.len(),
            ctx.jets.len(),
            record.tracks.len(),
            record.secondary_vertices.len()
        );
        Ok(record)
    }

    fn project_jet(
        &self,
        ctx: &CollectionContext<'_>,
        index: usize,
        collection_kinematics: Option<&KinematicAggregator>,
        record: &mut JetCollectionRecord,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<()> {
        let jet = &ctx.jets[index];
        let row_index = record.jets.len();

        for kind in ChildKind::ALL {
            layout.begin_range(kind);
        }

        let mut row = jet_scalars(jet);

        if let Pass::Primary {
            membership: Some(membership),
        } = &ctx.pass
        {
            row.fat_jet_index = Some(membership.fat_jet_of(jet.original_key));
            if jet.pt() == 0.0 {
                row.discriminants = vec![MISSING_VALUE; self.discriminants.len()];
                row.ranges = close_ranges(layout);
                record.jets.push(row);
                return Ok(());
            }
        }

        row.discriminants = self.discriminants.evaluate(jet);

        let mut leading_subjets = None;
        if let Pass::Fat(grooming) = &ctx.pass {
            let (substructure, leading) =
                self.substructure(ctx, grooming, index, row_index, record, layout, warnings)?;
            row.substructure = Some(substructure);
            leading_subjets = leading;
        }

        if self.config.produce_jet_track_tree {
            let counts =
                self.project_tracks(ctx, jet, row_index, leading_subjets, record, layout, warnings)?;
            row.n_tracks = counts.n_tracks;
            row.n_sel_tracks = counts.n_sel_tracks;
            if let Some(substructure) = row.substructure.as_mut() {
                substructure.n_shared_tracks = counts.n_shared_tracks;
            }
        }

        if self.config.produce_jet_pf_lepton_tree {
            for lepton in jet.soft_muon_info.iter().flatten() {
                layout.append(ChildKind::PfMuon, &mut record.pf_muons, lepton_row(lepton, row_index))?;
            }
            for lepton in jet.soft_electron_info.iter().flatten() {
                layout.append(
                    ChildKind::PfElectron,
                    &mut record.pf_electrons,
                    lepton_row(lepton, row_index),
                )?;
            }
        }

        if self.config.store_tag_variables {
            row.tag_vars =
                Some(self.project_tag_variables(ctx, jet, row_index, record, layout, warnings)?);
        }

        if self.config.store_csv_tag_variables {
            row.csv_vars =
                Some(self.project_csv_variables(ctx, jet, row_index, record, layout, warnings)?);
        }

        let jet_kinematics;
        let denominator = match collection_kinematics {
            Some(total) => total,
            None => {
                jet_kinematics = self.pv_track_kinematics(ctx.input, std::iter::once(jet));
                &jet_kinematics
            }
        };
        self.project_secondary_vertices(ctx, jet, row_index, denominator, record, layout, warnings)?;

        row.ranges = close_ranges(layout);
        record.jets.push(row);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Substructure
    // ------------------------------------------------------------------------

    /// Fat-jet scalars and subjet links. Also returns the two leading subjets
    /// by uncorrected pt, as positions in the primary collection.
    #[allow(clippy::too_many_arguments)]
    fn substructure(
        &self,
        ctx: &CollectionContext<'_>,
        grooming: &Grooming<'_>,
        fat_index: usize,
        row_index: usize,
        record: &mut JetCollectionRecord,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<(SubstructureRow, Option<(usize, usize)>)> {
        let fat_jet = &ctx.jets[fat_index];
        let subjets = &ctx.input.jets;
        let mut row = SubstructureRow::default();

        if let Some(tau) = fat_jet.nsubjettiness {
            row.tau1 = tau.tau1;
            row.tau2 = tau.tau2;
        }
        if let Some(tau) = fat_jet.nsubjettiness_ivf.or(fat_jet.nsubjettiness) {
            row.tau1_ivf = tau.tau1;
            row.tau2_ivf = tau.tau2;
        }

        let mut found = Vec::new();
        let partner = grooming
            .matched
            .candidate_for(fat_index)
            .and_then(|g| grooming.groomed.get(g));

        if let Some(partner) = partner {
            row.pt_groomed = partner.pt() as f32;
            row.jes_groomed = partner.jes() as f32;
            row.eta_groomed = partner.eta() as f32;
            row.phi_groomed = partner.phi() as f32;
            row.mass_groomed = partner.mass() as f32;
            row.n_subjets = partner.daughter_keys.len() as i32;

            for key in &partner.daughter_keys {
                let position = grooming.subjet_positions.position(*key);
                match position {
                    Some(p) => found.push(p),
                    None => {
                        warnings.record_jet_warning(
                            WarningCategory::SubjetNotFound,
                            format!("subjet key {} of fat jet {fat_index} not in the jet collection", key.0),
                            ctx.name,
                            row_index,
                        );
                    }
                }
                layout.append(
                    ChildKind::SubJet,
                    &mut record.subjet_indices,
                    position.map_or(-1, |p| p as i32),
                )?;
            }
        }

        found.sort_by(|&a, &b| subjets[b].raw_pt().total_cmp(&subjets[a].raw_pt()));
        let leading = match found.as_slice() {
            [first, second, ..] => Some((*first, *second)),
            _ => None,
        };

        if let Some((first, second)) = leading {
            let mut n_subjet_tracks = 0;
            let mut n_shared = 0;
            for (sj, (own, companion)) in [(first, second), (second, first)].into_iter().enumerate() {
                let own = &subjets[own];
                let companion = &subjets[companion];
                let Some(ip) = &own.ip_info else {
                    continue;
                };
                for track in ip.selected_tracks.iter().filter_map(|&id| ctx.input.track(id)) {
                    if delta_r_between(track, own) < TRACK_CONE {
                        n_subjet_tracks += 1;
                        if sj == 0 && delta_r_between(track, companion) < TRACK_CONE {
                            n_shared += 1;
                        }
                    }
                }
            }
            row.n_subjet_tracks = n_subjet_tracks - n_shared;
            row.n_shared_subjet_tracks = n_shared;
        }

        Ok((row, leading))
    }

    // ------------------------------------------------------------------------
    // Tracks
    // ------------------------------------------------------------------------

    /// Owning primary vertex of a track.
    ///
    /// Composite inputs that carry the fit-usage flag give the leading vertex
    /// with weight 1 when it is set and no vertex otherwise.
    fn primary_vertex_of(&self, input: &EventInput, id: TrackId, track: &Track) -> Association {
        match (self.config.vertex_representation, track.used_in_pv_fit) {
            (VertexRepresentation::Composite, Some(true)) => Association {
                index: 0,
                weight: 1.0,
            },
            (VertexRepresentation::Composite, Some(false)) => Association::UNASSIGNED,
            _ => AssociationStrategy::MaxWeight.resolve(&input.primary_vertices, id),
        }
    }

    /// Positive-PV-weight selected tracks of `jets`, each track counted once.
    fn pv_track_kinematics<'a>(
        &self,
        input: &EventInput,
        jets: impl IntoIterator<Item = &'a Jet>,
    ) -> KinematicAggregator {
        let mut selected = IndexSet::new();
        for jet in jets {
            if let Some(ip) = &jet.ip_info {
                selected.extend(ip.selected_tracks.iter().copied());
            }
        }

        let mut kinematics = KinematicAggregator::for_primary_vertex_tracks();
        for id in selected {
            if let Some(track) = input.track(id) {
                kinematics.add_track(track, self.primary_vertex_of(input, id, track).weight);
            }
        }
        kinematics
    }

    #[allow(clippy::too_many_arguments)]
    fn project_tracks(
        &self,
        ctx: &CollectionContext<'_>,
        jet: &Jet,
        row_index: usize,
        leading_subjets: Option<(usize, usize)>,
        record: &mut JetCollectionRecord,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<TrackCounts> {
        let mut counts = TrackCounts::default();
        let Some(ip) = &jet.ip_info else {
            warnings.record_jet_warning(
                WarningCategory::MissingTagInfo,
                "jet has no impact-parameter tag info; no tracks stored",
                ctx.name,
                row_index,
            );
            return Ok(counts);
        };

        let pv_position = ctx.pv.position;
        let leading = leading_subjets.map(|(a, b)| (&ctx.input.jets[a], &ctx.input.jets[b]));

        for (i, &id) in ip.selected_tracks.iter().enumerate() {
            let Some(track) = ctx.input.track(id) else {
                warnings.record_jet_warning(
                    WarningCategory::Other,
                    format!("selected track {} is outside the track arena", id.0),
                    ctx.name,
                    row_index,
                );
                continue;
            };
            counts.n_tracks += 1;

            if delta_r_between(track, jet) < TRACK_CONE {
                counts.n_sel_tracks += 1;
            }
            if let Some((first, second)) = leading {
                if delta_r_between(track, first) < TRACK_CONE
                    && delta_r_between(track, second) < TRACK_CONE
                {
                    counts.n_shared_tracks += 1;
                }
            }

            let data = ip.impact_parameters.get(i).copied().unwrap_or_default();
            let pv = self.primary_vertex_of(ctx.input, id, track);
            let sv = jet
                .sv_info
                .as_ref()
                .map_or(Association::UNASSIGNED, |sv| {
                    self.sv_association.resolve(&sv.vertices, id)
                });

            let row = TrackRow {
                dist: data.distance_to_jet_axis.value as f32,
                length: (data.closest_to_jet_axis - pv_position).mag() as f32,
                dxy: track.dxy(&pv_position) as f32,
                dz: track.dz(&pv_position) as f32,
                z_ip: (track.dz(&Vector3::zero()) - pv_position.z) as f32,
                ip2d: data.ip2d.value as f32,
                ip2d_sig: data.ip2d.significance() as f32,
                ip2d_err: data.ip2d.error as f32,
                ip: data.ip3d.value as f32,
                ip_sig: data.ip3d.significance() as f32,
                ip_err: data.ip3d.error as f32,
                proba: ip.probabilities.get(i).copied().unwrap_or(MISSING_VALUE),
                p: track.p() as f32,
                pt: track.pt() as f32,
                eta: track.eta() as f32,
                phi: track.phi() as f32,
                chi2: track.normalized_chi2 as f32,
                charge: track.charge,
                n_hit_all: track.hits.valid_hits,
                n_hit_pixel: track.hits.pixel_hits,
                n_hit_strip: track.hits.strip_hits,
                n_hit_tib: track.hits.tib_hits,
                n_hit_tid: track.hits.tid_hits,
                n_hit_tob: track.hits.tob_hits,
                n_hit_tec: track.hits.tec_hits,
                n_hit_pxb: track.hits.pixel_barrel_hits,
                n_hit_pxf: track.hits.pixel_endcap_hits,
                is_hit_l1: track.hits.has_first_pixel_barrel_hit,
                pv: pv.index,
                pv_weight: pv.weight,
                sv: sv.index,
                sv_weight: sv.weight,
                is_from_sv: sv.is_assigned(),
            };
            layout.append(ChildKind::Track, &mut record.tracks, row)?;
        }

        Ok(counts)
    }

    // ------------------------------------------------------------------------
    // Tag variables
    // ------------------------------------------------------------------------

    fn project_tag_variables(
        &self,
        ctx: &CollectionContext<'_>,
        jet: &Jet,
        row_index: usize,
        record: &mut JetCollectionRecord,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<JetTagVarRow> {
        if jet.ip_info.is_none() || jet.sv_info.is_none() {
            warnings.record_jet_warning(
                WarningCategory::MissingTagInfo,
                "jet lacks a tag info needed for tagging variables",
                ctx.name,
                row_index,
            );
        }

        let empty = TaggingVariableList::new();
        let ip_vars = self
            .tag_variables
            .variables(jet, TagVariableSource::TrackIp)
            .unwrap_or(&empty);
        let sv_vars = self
            .tag_variables
            .variables(jet, TagVariableSource::SecondaryVertex)
            .unwrap_or(&empty);

        let n_tracks = jet.n_selected_tracks();
        for i in 0..n_tracks {
            layout.append(
                ChildKind::TrackTagVar,
                &mut record.track_tag_vars,
                TrackTagVarRow::from_lists(ip_vars, i),
            )?;
        }

        if let Some(sv_info) = &jet.sv_info {
            for (i, vertex) in sv_info.vertices.iter().enumerate() {
                layout.append(
                    ChildKind::SvTagVar,
                    &mut record.sv_tag_vars,
                    SvTagVarRow::from_lists(sv_vars, i, vertex.p4().mass() as f32),
                )?;
            }
        }

        Ok(JetTagVarRow {
            n_tracks: n_tracks as i32,
            n_secondary_vertices: jet.n_secondary_vertices() as i32,
            composition: jet.composition,
        })
    }

    fn project_csv_variables(
        &self,
        ctx: &CollectionContext<'_>,
        jet: &Jet,
        row_index: usize,
        record: &mut JetCollectionRecord,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<JetCsvVarRow> {
        let empty = TaggingVariableList::new();
        let vars = match self.tag_variables.variables(jet, TagVariableSource::Combined) {
            Some(vars) => vars,
            None => {
                warnings.record_jet_warning(
                    WarningCategory::MissingTagInfo,
                    "jet has no combined tagging variables",
                    ctx.name,
                    row_index,
                );
                &empty
            }
        };

        let scalars = JetCsvVarRow::from_variables(vars);

        // rows follow the trackSip2dSig list; trackEtaRel is counted on its own
        for i in 0..vars.list(TaggingVariable::TrackSip2dSig).len() {
            layout.append(
                ChildKind::CsvTrackTagVar,
                &mut record.csv_track_tag_vars,
                CsvTrackTagVarRow::from_lists(vars, i),
            )?;
        }
        for &eta_rel in vars.list(TaggingVariable::TrackEtaRel) {
            layout.append(
                ChildKind::CsvTrackEtaRelTagVar,
                &mut record.csv_track_eta_rel,
                eta_rel,
            )?;
        }

        Ok(scalars)
    }

    // ------------------------------------------------------------------------
    // Secondary vertices
    // ------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn project_secondary_vertices(
        &self,
        ctx: &CollectionContext<'_>,
        jet: &Jet,
        row_index: usize,
        denominator: &KinematicAggregator,
        record: &mut JetCollectionRecord,
        layout: &mut FlatLayout,
        warnings: &mut WarningTracker,
    ) -> Result<()> {
        let Some(sv_info) = &jet.sv_info else {
            return Ok(());
        };

        let jet_direction = jet.p4.momentum().unit();
        let jet_axis = Line::new(ctx.pv.position, jet_direction);
        let all_sum = denominator.weighted_sum();

        for (i, vertex) in sv_info.vertices.iter().enumerate() {
            let flight = sv_info.flight(i);
            let constituents = KinematicAggregator::aggregate_vertex(vertex, &ctx.input.tracks);
            let vertex_sum = constituents.weighted_sum();
            let p4 = vertex.p4();
            let position = vertex.position();
            let error = vertex.position_error();

            let ratio = match energy_ratio(&vertex_sum, &all_sum) {
                Some(ratio) => ratio as f32,
                None => {
                    warnings.record_jet_warning(
                        WarningCategory::DegenerateEnergySum,
                        format!("secondary vertex {i}: energy-ratio denominator is zero"),
                        ctx.name,
                        row_index,
                    );
                    MISSING_VALUE
                }
            };

            let row = SvRow {
                x: position.x as f32,
                y: position.y as f32,
                z: position.z as f32,
                ex: error.x as f32,
                ey: error.y as f32,
                ez: error.z as f32,
                chi2: vertex.chi2() as f32,
                ndf: vertex.ndof() as f32,
                flight: flight.distance_3d.value as f32,
                flight_err: flight.distance_3d.error as f32,
                flight_2d: flight.distance_2d.value as f32,
                flight_2d_err: flight.distance_2d.error as f32,
                n_trk: vertex.n_tracks() as i32,
                vtx_pt: p4.pt() as f32,
                vtx_eta: p4.eta() as f32,
                vtx_phi: p4.phi() as f32,
                mass: p4.mass() as f32,
                tot_charge: constituents.charge(),
                delta_r_jet: delta_r_between(&flight.direction, &jet_direction) as f32,
                delta_r_sum_jet: delta_r_between(&vertex_sum, &jet_direction) as f32,
                delta_r_sum_dir: delta_r_between(&vertex_sum, &flight.direction) as f32,
                vtx_dist_jet_axis: jet_axis.distance(&Line::new(position, flight.direction)) as f32,
                energy_ratio: ratio,
                dir_x: flight.direction.x as f32,
                dir_y: flight.direction.y as f32,
                dir_z: flight.direction.z as f32,
            };
            layout.append(ChildKind::SecondaryVertex, &mut record.secondary_vertices, row)?;
        }

        Ok(())
    }
}

impl fmt::Debug for EventProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProjector")
            .field("config", &self.config)
            .field("trigger", &self.trigger)
            .field("discriminants", &self.discriminants)
            .field("matcher", &self.matcher)
            .field("sv_association", &self.sv_association)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Row builders
// ============================================================================

fn close_ranges(layout: &mut FlatLayout) -> ChildRanges {
    let mut ranges = ChildRanges::default();
    for kind in ChildKind::ALL {
        ranges.set(kind, layout.close_range(kind));
    }
    ranges
}

fn jet_scalars(jet: &Jet) -> JetRow {
    JetRow {
        pt: jet.pt() as f32,
        eta: jet.eta() as f32,
        phi: jet.phi() as f32,
        mass: jet.mass() as f32,
        genpt: jet.gen_pt.map_or(-1.0, |pt| pt as f32),
        flavour: jet.parton_flavour,
        n_b_hadrons: jet.n_b_hadrons,
        n_c_hadrons: jet.n_c_hadrons,
        loose_id: jet.loose_id.map_or(0, i32::from),
        tight_id: jet.tight_id.map_or(0, i32::from),
        jes: jet.jes() as f32,
        residual: jet.residual() as f32,
        n_secondary_vertices: jet.n_secondary_vertices() as i32,
        ..Default::default()
    }
}

fn lepton_row(lepton: &SoftLepton, jet_index: usize) -> LeptonRow {
    let props = &lepton.properties;
    LeptonRow {
        jet_index: jet_index as i32,
        pt: lepton.p4.pt() as f32,
        eta: lepton.p4.eta() as f32,
        phi: lepton.p4.phi() as f32,
        ptrel: props.pt_rel,
        ratio: props.ratio,
        ratio_rel: props.ratio_rel,
        delta_r: props.delta_r,
        ip: props.sip3d,
        ip2d: props.sip2d,
    }
}

fn primary_vertex_row(pv: &PrimaryVertex) -> PrimaryVertexRow {
    PrimaryVertexRow {
        x: pv.position.x as f32,
        y: pv.position.y as f32,
        z: pv.position.z as f32,
        ex: pv.error.x as f32,
        ey: pv.error.y as f32,
        ez: pv.error.z as f32,
        chi2: pv.normalized_chi2() as f32,
        ndf: pv.ndof as f32,
        is_good: pv.is_valid,
        is_fake: pv.is_fake,
    }
}

fn muon_row(muon: &Muon) -> MuonRow {
    MuonRow {
        n_mu_hit: muon.outer_valid_muon_hits as i32,
        n_tk_hit: muon.inner_valid_hits as i32,
        n_pix_hit: muon.inner_pixel_hits as i32,
        n_outer_hit: muon.inner_missing_outer_hits as i32,
        n_matched_stations: muon.matched_stations as i32,
        chi2: muon.global_normalized_chi2 as f32,
        chi2_tk: muon.inner_normalized_chi2 as f32,
        pt: muon.p4.pt() as f32,
        eta: muon.p4.eta() as f32,
        phi: muon.p4.phi() as f32,
        vz: muon.vz as f32,
        ip: muon.ip3d.value as f32,
        ip_sig: muon.ip3d.significance() as f32,
        ip2d: muon.ip2d.value as f32,
        ip2d_sig: muon.ip2d.significance() as f32,
        is_pf: muon.is_pf,
    }
}

/// Generator, pileup and pruned-particle summaries of a simulated event.
fn mc_info(input: &EventInput) -> McInfo {
    let mut mc = McInfo::default();

    if let Some(generator) = &input.generator {
        mc.mc_weight = generator.weight as f32;
        if let Some(&pthat) = generator.binning_values.first() {
            mc.pthat = pthat as f32;
        }
    }

    for summary in input.pileup.iter().filter(|s| s.bunch_crossing == 0) {
        for (i, &z) in summary.z_positions.iter().enumerate() {
            mc.pileup.push(PileupRow {
                z,
                sum_pt_low: summary.sum_pt_low.get(i).copied().unwrap_or_default(),
                sum_pt_high: summary.sum_pt_high.get(i).copied().unwrap_or_default(),
                ntrks_low: summary.ntrks_low.get(i).copied().unwrap_or_default(),
                ntrks_high: summary.ntrks_high.get(i).copied().unwrap_or_default(),
            });
        }
        mc.n_pu_true = summary.true_interactions;
        mc.n_pu = if mc.pileup.is_empty() {
            summary.interactions
        } else {
            mc.pileup.len() as i32
        };
    }

    let hadronizer = input
        .generator
        .as_ref()
        .map(|g| g.hadronizer)
        .unwrap_or_default();
    let n_particles = input.gen_particles.len();

    for particle in &input.gen_particles {
        if hadronizer.is_hard_process(particle.status) {
            mc.gen_pv_z = particle.vz as f32;
        }
        let mother_index = match particle.mother {
            Some(m) if m < n_particles => m as i32,
            Some(_) => -100,
            None if particle.has_mother => -100,
            None => -1,
        };
        mc.gen_particles.push(GenParticleRow {
            pt: particle.p4.pt() as f32,
            eta: particle.p4.eta() as f32,
            phi: particle.p4.phi() as f32,
            mass: particle.p4.mass() as f32,
            status: particle.status,
            pdg_id: particle.pdg_id,
            mother_index,
        });
    }

    mc
}
