//! Integration tests for the jet ntuplizer.
//!
//! These tests drive the public API end to end:
//! - Greedy matching, vertex association and trigger packing scenarios
//! - Index-range contiguity across every child kind
//! - Determinism of repeated and parallel projection
//! - Full runs through in-memory and JSON-lines sources and sinks
//!
//! Run with:
//! ```bash
//! cargo test --test integration_test
//! ```

use std::io::Cursor;

use approx::assert_relative_eq;
use jet_ntuplizer::association::AssociationStrategy;
use jet_ntuplizer::kinematics::KinematicAggregator;
use jet_ntuplizer::matching::{GreedyNearestMatcher, MatchCoordinate, MatchPoint};
use jet_ntuplizer::trigger::TriggerBitPacker;
use jet_ntuplizer::types::{
    FittedVertex, ImpactParameterData, IpTagInfo, Measurement, SoftLepton, SvTagInfo,
    TriggerResults, WeightedTrack,
};
use jet_ntuplizer::{
    ChildKind, DiscriminantCatalog, EventInput, EventProjector, EventSource, FlatRecord,
    FourMomentum, Jet, JetCollectionRecord, JsonLinesSink, JsonLinesSource, Ntuplizer,
    NtuplizerConfig, ObjectKey, PrimaryVertex, RunStats, SecondaryVertex, SourceMetadata, Track,
    TrackId, VecSink, VecSource, Vector3, WarningCategory, WarningTracker, MISSING_VALUE,
};

// ============================================================================
// Fixtures
// ============================================================================

fn track(eta: f64, phi: f64, pt: f64, charge: i32) -> Track {
    Track {
        reference_point: Vector3::new(0.001, -0.002, 0.3),
        momentum: FourMomentum::from_pt_eta_phi_m(pt, eta, phi, 0.0).momentum(),
        charge,
        normalized_chi2: 1.1,
        ..Default::default()
    }
}

fn jet(key: u64, pt: f64, eta: f64, phi: f64, tracks: &[usize]) -> Jet {
    let mut jet = Jet::new(FourMomentum::from_pt_eta_phi_m(pt, eta, phi, 7.0), ObjectKey(key));
    jet.discriminants = vec![0.9, 0.2];
    if !tracks.is_empty() {
        jet.ip_info = Some(IpTagInfo {
            selected_tracks: tracks.iter().map(|&t| TrackId(t)).collect(),
            impact_parameters: vec![
                ImpactParameterData {
                    ip3d: Measurement::new(0.015, 0.005),
                    ..Default::default()
                };
                tracks.len()
            ],
            probabilities: vec![0.4; tracks.len()],
            ..Default::default()
        });
    }
    jet
}

fn primary_vertex(z: f64, tracks: &[(usize, f32)]) -> PrimaryVertex {
    PrimaryVertex {
        position: Vector3::new(0.0, 0.0, z),
        error: Vector3::new(0.001, 0.001, 0.004),
        chi2: 12.0,
        ndof: 6.0,
        is_valid: true,
        is_fake: false,
        tracks: tracks
            .iter()
            .map(|&(t, w)| WeightedTrack::new(TrackId(t), w))
            .collect(),
    }
}

/// Four jets, one below the default pt threshold, sharing two primary vertices.
fn rich_event(event: u64) -> EventInput {
    let mut input = EventInput::new(7, event, 3);
    input.is_data = false;

    input.tracks = vec![
        track(0.50, 0.50, 12.0, 1),
        track(0.55, 0.45, 8.0, -1),
        track(0.45, 0.52, 5.0, 1),
        track(0.60, 0.40, 3.0, 1),
        track(-1.00, 2.00, 9.0, -1),
        track(-1.05, 2.05, 4.0, 1),
        track(-0.95, 1.95, 2.0, -1),
        track(2.00, -1.00, 1.5, 1),
        track(1.50, -2.00, 6.0, 1),
        track(1.55, -2.05, 3.0, -1),
    ];

    // track 0 ties at 0.9 between both vertices
    input.primary_vertices = vec![
        primary_vertex(0.30, &[(0, 0.9), (1, 0.9), (2, 0.9), (3, 0.7), (4, 0.9), (5, 0.6)]),
        primary_vertex(-2.10, &[(0, 0.9), (6, 0.8), (7, 0.8), (8, 0.95), (9, 0.95)]),
    ];

    let mut leading = jet(1, 60.0, 0.5, 0.5, &[0, 1, 2, 3]);
    leading.sv_info = Some(SvTagInfo {
        vertices: vec![SecondaryVertex::Fitted(FittedVertex {
            position: Vector3::new(0.15, 0.15, 0.45),
            error: Vector3::new(0.01, 0.01, 0.02),
            chi2: 2.0,
            ndof: 3.0,
            p4: FourMomentum::from_pt_eta_phi_m(20.0, 0.52, 0.47, 1.9),
            tracks: vec![
                WeightedTrack::new(TrackId(0), 0.9),
                WeightedTrack::new(TrackId(1), 0.8),
                WeightedTrack::new(TrackId(2), 0.3),
            ],
        })],
        ..Default::default()
    });

    let second = jet(2, 45.0, -1.0, 2.0, &[4, 5, 6]);
    let soft = jet(3, 10.0, 2.0, -1.0, &[7]);
    let mut third = jet(4, 35.0, 1.5, -2.0, &[8, 9]);
    third.soft_muon_info = Some(vec![SoftLepton {
        p4: FourMomentum::from_pt_eta_phi_m(6.0, 1.5, -2.0, 0.105),
        ..Default::default()
    }]);

    input.jets = vec![leading, second, soft, third];
    input
}

fn config() -> NtuplizerConfig {
    NtuplizerConfig::default()
        .with_discriminant("Jet_CombSvx", "csv")
        .with_discriminant("Jet_Proba", "jp")
        .with_logging(false)
}

fn catalog() -> DiscriminantCatalog {
    DiscriminantCatalog::new(["csv", "jp"])
}

fn project(projector: &EventProjector, input: &EventInput) -> FlatRecord {
    let mut layout = projector.new_layout();
    let mut warnings = WarningTracker::silent();
    projector
        .project(input, &mut layout, &mut warnings)
        .unwrap()
        .into_record()
        .expect("simulated events are always emitted")
}

fn assert_ranges_chain(collection: &JetCollectionRecord) {
    for kind in ChildKind::ALL {
        let Some(first) = collection.jets.first() else {
            continue;
        };
        assert_eq!(first.range(kind).first, 0, "{kind} does not start at 0");
        for pair in collection.jets.windows(2) {
            assert_eq!(pair[0].range(kind).last, pair[1].range(kind).first, "{kind} has a gap");
        }
        let last = collection.jets.last().map_or(0, |j| j.range(kind).last);
        assert_eq!(last as usize, collection.column_len(kind), "{kind} column length");
    }
}

// ============================================================================
// Matching, association and trigger scenarios
// ============================================================================

#[test]
fn test_greedy_matching_scenario() {
    let references = [
        MatchPoint::new(0.0, 0.0),
        MatchPoint::new(1.0, 0.0),
        MatchPoint::new(2.0, 0.0),
    ];
    let candidates = [MatchPoint::new(0.1, 0.0), MatchPoint::new(1.9, 0.0)];

    let result = GreedyNearestMatcher::new(MatchCoordinate::Pseudorapidity)
        .match_points(&references, &candidates);

    assert_eq!(result.candidate_to_reference, vec![0, 2]);
    assert_eq!(result.reference_to_candidate, vec![0, -1, 1]);
    assert_eq!(result.unmatched_candidates(), 0);
}

#[test]
fn test_matching_is_injective_and_deterministic() {
    let references: Vec<MatchPoint> = (0..8)
        .map(|i| MatchPoint::new(-2.0 + 0.5 * i as f64, 0.3 * i as f64))
        .collect();
    let candidates: Vec<MatchPoint> = (0..11)
        .map(|i| MatchPoint::new(-2.1 + 0.4 * i as f64, 0.25 * i as f64))
        .collect();
    let matcher = GreedyNearestMatcher::new(MatchCoordinate::Pseudorapidity);

    let first = matcher.match_points(&references, &candidates);
    let second = matcher.match_points(&references, &candidates);
    assert_eq!(first, second);

    let mut claimed: Vec<i32> = first
        .candidate_to_reference
        .iter()
        .copied()
        .filter(|&r| r >= 0)
        .collect();
    let matched = claimed.len();
    claimed.sort_unstable();
    claimed.dedup();
    assert_eq!(claimed.len(), matched);

    // more candidates than references leaves exactly the surplus unmatched
    assert_eq!(first.unmatched_candidates(), candidates.len() - references.len());
    for (c, &r) in first.candidate_to_reference.iter().enumerate() {
        if r >= 0 {
            assert_eq!(first.reference_to_candidate[r as usize], c as i32);
        }
    }
}

#[test]
fn test_max_weight_association_scenario() {
    let vertices = [
        primary_vertex(0.1, &[(0, 0.7)]),
        primary_vertex(1.2, &[(0, 0.3)]),
    ];
    let association = AssociationStrategy::MaxWeight.resolve(&vertices, TrackId(0));
    assert_eq!(association.index, 0);
    assert_relative_eq!(association.weight, 0.7);

    let unlisted = AssociationStrategy::MaxWeight.resolve(&vertices, TrackId(5));
    assert!(!unlisted.is_assigned());
    assert_eq!(unlisted.weight, 0.0);
}

#[test]
fn test_association_tie_keeps_earlier_vertex() {
    let vertices = [
        primary_vertex(0.1, &[(3, 0.5)]),
        primary_vertex(0.4, &[(3, 0.5)]),
        primary_vertex(0.9, &[(3, 0.5)]),
    ];
    for _ in 0..3 {
        assert_eq!(AssociationStrategy::MaxWeight.resolve(&vertices, TrackId(3)).index, 0);
    }
}

#[test]
fn test_vertex_constituent_threshold_scenario() {
    let tracks = [track(0.1, 0.1, 4.0, 1), track(0.2, 0.1, 3.0, -1)];
    let mut aggregator = KinematicAggregator::for_vertex_constituents();

    assert!(aggregator.add_track(&tracks[0], 0.6));
    assert!(!aggregator.add_track(&tracks[1], 0.4));

    assert_eq!(aggregator.n_tracks(), 1);
    assert_eq!(aggregator.charge(), 1);
    assert_relative_eq!(aggregator.vector_sum().pt(), 4.0, epsilon = 1e-9);
}

#[test]
fn test_aggregation_is_additive() {
    let tracks: Vec<Track> = (0..6)
        .map(|i| track(0.1 * i as f64, -0.2 * i as f64, 1.0 + i as f64, if i % 3 == 0 { -1 } else { 1 }))
        .collect();
    let weights = [0.9f32, 0.2, 0.75, 0.5, 0.61, 0.3];

    let mut whole = KinematicAggregator::for_vertex_constituents();
    let mut left = KinematicAggregator::for_vertex_constituents();
    let mut right = KinematicAggregator::for_vertex_constituents();
    for (i, (t, &w)) in tracks.iter().zip(&weights).enumerate() {
        whole.add_track(t, w);
        if i < 3 {
            left.add_track(t, w);
        } else {
            right.add_track(t, w);
        }
    }
    left.merge(&right);

    assert_eq!(left.n_tracks(), whole.n_tracks());
    assert_eq!(left.charge(), whole.charge());
    let (a, b) = (left.weighted_sum(), whole.weighted_sum());
    assert_relative_eq!(a.px, b.px, epsilon = 1e-9);
    assert_relative_eq!(a.py, b.py, epsilon = 1e-9);
    assert_relative_eq!(a.pz, b.pz, epsilon = 1e-9);
    assert_relative_eq!(a.e, b.e, epsilon = 1e-9);
}

#[test]
fn test_trigger_packing_scenario() {
    let packer = TriggerBitPacker::new(["HLT_Mu*", "HLT_El*"]).unwrap();
    let packed = packer.pack(&TriggerResults::all_accepted(["HLT_Mu20_v1"]));
    assert_eq!(packed.bits.words(), &[1]);
    assert!(packed.issue.is_none());

    let both = packer.pack(&TriggerResults::all_accepted(["HLT_Ele27_v2", "HLT_Mu8_v1"]));
    assert_eq!(both.bits.words(), &[0b11]);
}

#[test]
fn test_trigger_words_grow_past_32_patterns() {
    let patterns: Vec<String> = (0..40).map(|i| format!("HLT_Path{i}_v*")).collect();
    let packer = TriggerBitPacker::new(&patterns).unwrap();
    let packed = packer.pack(&TriggerResults::all_accepted(["HLT_Path35_v3"]));
    assert_eq!(packed.bits.words(), &[0, 1 << 3]);
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn test_projection_end_to_end() {
    let projector = EventProjector::new(config(), &catalog(), &mut WarningTracker::silent()).unwrap();
    let record = project(&projector, &rich_event(1));

    assert_eq!(record.event.run, -7);
    assert_eq!(record.event.primary_vertices.len(), 2);
    assert_relative_eq!(record.event.pv_z, 0.30, epsilon = 1e-6);

    let jets = &record.jets;
    assert_eq!(jets.discriminant_labels, vec!["Jet_CombSvx", "Jet_Proba"]);
    assert_eq!(jets.jets.len(), 3, "the 10 GeV jet is skipped");
    assert_eq!(jets.jets[0].discriminants, vec![0.9, 0.2]);
    assert_eq!(jets.tracks.len(), 9);
    assert_eq!(jets.secondary_vertices.len(), 1);
    assert_eq!(jets.pf_muons.len(), 1);
    assert_eq!(jets.pf_muons[0].jet_index, 2);

    assert_eq!(jets.jets[2].range(ChildKind::PfMuon).first, 0);
    assert_eq!(jets.jets[2].range(ChildKind::PfMuon).len(), 1);
    assert_eq!(jets.jets[1].range(ChildKind::Track).as_range(), 4..7);

    // tied weights resolve to the first vertex
    assert_eq!(jets.tracks[0].pv, 0);
    assert_eq!(jets.tracks[7].pv, 1);
    assert!(jets.tracks[0].is_from_sv);

    // the 0.3-weight constituent is counted but not summed
    assert_eq!(jets.secondary_vertices[0].n_trk, 3);
    assert_eq!(jets.secondary_vertices[0].tot_charge, 0);

    assert_ranges_chain(jets);
    assert!(jets.is_contiguous());
}

#[test]
fn test_contiguity_with_substructure_and_tag_variables() {
    let config = config()
        .with_subjets(true)
        .without_jet_skipping()
        .with_tag_variables(true)
        .with_csv_tag_variables(true);
    let projector = EventProjector::new(config, &catalog(), &mut WarningTracker::silent()).unwrap();

    let mut input = rich_event(2);
    let mut fat = jet(50, 140.0, 0.0, 1.2, &[0, 1, 4, 5]);
    fat.soft_electron_info = Some(vec![SoftLepton::default(); 2]);
    let mut groomed = jet(60, 130.0, 0.02, 1.21, &[]);
    groomed.daughter_keys = vec![ObjectKey(1), ObjectKey(2)];
    input.fat_jets = vec![fat, jet(51, 90.0, -2.0, -2.5, &[8])];
    input.groomed_fat_jets = vec![groomed];

    let record = project(&projector, &input);
    for collection in record.collections() {
        assert_ranges_chain(collection);
    }

    let fat = record.fat_jets.as_ref().unwrap();
    assert_eq!(fat.subjet_indices, vec![0, 1]);
    assert_eq!(fat.jets[0].range(ChildKind::SubJet).as_range(), 0..2);
    assert!(fat.jets[1].range(ChildKind::SubJet).is_empty());
    assert_eq!(fat.jets[1].substructure.unwrap().pt_groomed, MISSING_VALUE);
    assert_eq!(fat.pf_electrons.len(), 2);

    assert_eq!(record.jets.jets[0].fat_jet_index, Some(0));
    assert_eq!(record.jets.jets[2].fat_jet_index, Some(-1));
}

#[test]
fn test_repeated_projection_is_identical() {
    let projector = EventProjector::new(config(), &catalog(), &mut WarningTracker::silent()).unwrap();
    let mut layout = projector.new_layout();
    let mut warnings = WarningTracker::silent();
    let input = rich_event(3);

    let first = projector.project(&input, &mut layout, &mut warnings).unwrap();
    let second = projector.project(&input, &mut layout, &mut warnings).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_parallel_workers_match_sequential() {
    let projector = EventProjector::new(config(), &catalog(), &mut WarningTracker::silent()).unwrap();
    let events: Vec<EventInput> = (0..16).map(rich_event).collect();

    let sequential: Vec<FlatRecord> = events.iter().map(|e| project(&projector, e)).collect();

    let parallel: Vec<FlatRecord> = std::thread::scope(|scope| {
        let handles: Vec<_> = events
            .chunks(4)
            .map(|chunk| {
                let projector = &projector;
                scope.spawn(move || chunk.iter().map(|e| project(projector, e)).collect::<Vec<_>>())
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert_eq!(sequential, parallel);
}

#[test]
fn test_missing_discriminator_is_sentinel() {
    let config = config().with_discriminant("Jet_Unknown", "does_not_exist");
    let mut warnings = WarningTracker::silent();
    let projector = EventProjector::new(config, &catalog(), &mut warnings).unwrap();
    assert!(warnings.count_by_category(WarningCategory::MissingDiscriminant) >= 1);

    let record = project(&projector, &rich_event(4));
    assert_eq!(record.jets.jets[0].discriminants, vec![0.9, 0.2, MISSING_VALUE]);
}

// ============================================================================
// Full runs
// ============================================================================

#[test]
fn test_run_preserves_order_and_counts() {
    let mut rejected = EventInput::new(9, 2, 1);
    rejected.trigger = TriggerResults::all_accepted(["HLT_Other_v1"]);
    let mut accepted = rich_event(3);
    accepted.is_data = true;
    accepted.run = 9;
    accepted.trigger = TriggerResults::all_accepted(["HLT_PFJet80_v4"]);

    let source = VecSource::new(vec![rich_event(1), rejected, accepted])
        .with_metadata(SourceMetadata::new().with_dataset("mixed").with_discriminants(["csv", "jp"]));
    let config = config().with_trigger_paths(["HLT_PFJet*"]);
    let mut ntuplizer = Ntuplizer::for_source(config, source.metadata()).unwrap();

    let mut sink = VecSink::new();
    ntuplizer.run(source, &mut sink).unwrap();

    let ids: Vec<(i64, u64)> = sink.records().iter().map(|r| (r.event.run, r.event.event)).collect();
    assert_eq!(ids, vec![(-7, 1), (9, 3)]);
    assert_eq!(sink.records()[1].event.trigger_bits, vec![1]);

    let stats = ntuplizer.stats();
    assert_eq!(stats.events_seen, 3);
    assert_eq!(stats.events_emitted, 2);
    assert_eq!(stats.events_rejected, 1);
    let jets = &stats.collection("JetInfo").unwrap().jets;
    assert_eq!(jets.count, 2);
    assert_relative_eq!(jets.mean, 3.0);
}

#[test]
fn test_capacity_overflow_is_fatal() {
    let config = config().with_layout_capacity(5);
    let source = VecSource::new(vec![rich_event(1)]);
    let mut ntuplizer = Ntuplizer::for_source(config, source.metadata()).unwrap();

    let mut sink = VecSink::new();
    let err = ntuplizer.run(source, &mut sink).unwrap_err();
    assert!(err.is_fatal());
    assert!(sink.is_empty());
}

#[test]
fn test_json_lines_run() {
    let mut text = String::from(
        "{\"header\": {\"dataset\": \"ttbar\", \"discriminants\": [\"csv\", \"jp\"]}}\n",
    );
    for event in 1..=3 {
        text.push_str(&serde_json::to_string(&rich_event(event)).unwrap());
        text.push('\n');
    }

    let source = JsonLinesSource::from_reader(Cursor::new(text.into_bytes())).unwrap();
    assert_eq!(source.metadata().dataset.as_deref(), Some("ttbar"));
    let mut ntuplizer = Ntuplizer::for_source(config(), source.metadata()).unwrap();

    let mut sink = JsonLinesSink::new(Vec::new());
    ntuplizer.run(source, &mut sink).unwrap();
    assert_eq!(sink.written(), 3);

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let records: Vec<FlatRecord> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let projector = EventProjector::new(config(), &catalog(), &mut WarningTracker::silent()).unwrap();
    assert_eq!(records[1], project(&projector, &rich_event(2)));
}

#[test]
fn test_stats_file_round_trip() {
    let source = VecSource::new((1..=4).map(rich_event).collect());
    let mut ntuplizer = Ntuplizer::for_source(config(), &catalog_metadata()).unwrap();
    ntuplizer.run(source, VecSink::new()).unwrap();

    let path = std::env::temp_dir().join(format!("jet_ntuplizer_stats_{}.json", std::process::id()));
    ntuplizer.stats().save_json(&path).unwrap();
    let loaded = RunStats::load_json(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(&loaded, ntuplizer.stats());
    assert_eq!(loaded.events_emitted, 4);
}

fn catalog_metadata() -> SourceMetadata {
    SourceMetadata::new().with_discriminants(["csv", "jp"])
}
