//! # jet-ntuplizer
//!
//! Flattening and association engine for collider-physics jet analyses.
//!
//! Each event carries nested collections: jets own tracks and secondary
//! vertices, fat jets own groomed partners whose subjets live in another
//! jet collection, and tracks are shared among primary and secondary
//! vertices. This crate projects such an event into one flat, columnar
//! record: one contiguous array per child kind plus a `[first, last)` index
//! range per jet and kind.
//!
//! ## Features
//!
//! - **Index-range flattening**: ranges stay contiguous across all jets of a
//!   collection ([`layout`])
//! - **Greedy ΔR matching** of groomed jets to fat jets and subjet ownership
//!   ([`matching`])
//! - **Track-to-vertex association** over fitted or composite vertices
//!   ([`association`])
//! - **Weighted kinematic sums**, energy ratios and line distances
//!   ([`kinematics`])
//! - **Trigger bit packing** against glob patterns ([`trigger`])
//! - **Warnings, not failures**: missing inputs become sentinels (`-9999`)
//!   plus a categorized warning; only overflowing a fixed-capacity layout is
//!   fatal
//!
//! ## Quick Start
//!
//! ```rust
//! use jet_ntuplizer::{EventInput, FourMomentum, Jet, NtuplizerConfig, ObjectKey};
//! use jet_ntuplizer::{DiscriminantCatalog, EventProjector, WarningTracker};
//!
//! let config = NtuplizerConfig::default().with_discriminant("Jet_CombSvx", "csv");
//! let catalog = DiscriminantCatalog::new(["csv"]);
//! let mut warnings = WarningTracker::silent();
//! let projector = EventProjector::new(config, &catalog, &mut warnings).unwrap();
//!
//! let mut event = EventInput::new(1, 42, 7);
//! event.is_data = false;
//! let mut jet = Jet::new(FourMomentum::from_pt_eta_phi_m(45.0, 0.3, 1.2, 6.0), ObjectKey(1));
//! jet.discriminants = vec![0.87];
//! event.jets.push(jet);
//!
//! let mut layout = projector.new_layout();
//! let record = projector
//!     .project(&event, &mut layout, &mut warnings)
//!     .unwrap()
//!     .into_record()
//!     .unwrap();
//!
//! assert_eq!(record.event.run, -1);
//! assert_eq!(record.jets.jets[0].discriminants, vec![0.87]);
//! ```
//!
//! ## Running over a file
//!
//! ```ignore
//! use jet_ntuplizer::{EventSource, JsonLinesSink, JsonLinesSource, Ntuplizer, NtuplizerConfig};
//!
//! let source = JsonLinesSource::open("events.jsonl")?;
//! let config = NtuplizerConfig::load_json("ntuplizer.json")?;
//! let mut ntuplizer = Ntuplizer::for_source(config, source.metadata())?;
//! ntuplizer.run(source, JsonLinesSink::create("records.jsonl")?)?;
//! ntuplizer.stats().save_json("run_stats.json")?;
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Input collections: `EventInput`, `Jet`, `Track`, vertices, tag infos |
//! | [`record`] | Output: `FlatRecord`, `EventInfo`, `JetCollectionRecord`, row types |
//! | [`layout`] | `FlatLayout`, `ChildKind`, `IndexRange` |
//! | [`projector`] | `EventProjector`: one event in, one record (or rejection) out |
//! | [`matching`] | `GreedyNearestMatcher`, `SubjetMembership` |
//! | [`association`] | `VertexView`, `AssociationStrategy` |
//! | [`kinematics`] | `KinematicAggregator`, `Line` |
//! | [`trigger`] | `TriggerBitPacker` |
//! | [`tagging`] | `TaggingVariable`, `TaggingVariableList` |
//! | [`providers`] | Discriminator and tag-variable lookups |
//! | [`config`] | `NtuplizerConfig` |
//! | [`warnings`] | `WarningTracker`, `WarningCategory` |
//! | [`statistics`] | `RunningStats`, `RunStats` |
//! | [`source`] / [`sink`] | Event input and record output |
//! | [`pipeline`] | `Ntuplizer` run driver |

pub mod association;
pub mod config;
pub mod error;
pub mod kinematics;
pub mod layout;
pub mod matching;
pub mod pipeline;
pub mod projector;
pub mod providers;
pub mod record;
pub mod sink;
pub mod source;
pub mod statistics;
pub mod tagging;
pub mod trigger;
pub mod types;
pub mod warnings;

// Re-exports - Core types
pub use error::{NtupleError, Result};
pub use types::{
    EventInput, FourMomentum, Jet, ObjectKey, PrimaryVertex, SecondaryVertex, Track, TrackId,
    Vector3, MISSING_VALUE,
};

// Re-exports - Projection
pub use config::{EnergyRatioScope, NtuplizerConfig, VertexRepresentation};
pub use layout::{ChildKind, FlatLayout, IndexRange};
pub use projector::{EventProjector, ProjectionOutcome, ProjectionStage};
pub use record::{FlatRecord, JetCollectionRecord};

// Re-exports - Providers
pub use providers::{DiscriminantCatalog, DiscriminantProvider, TagVariableProvider};

// Re-exports - Statistics and warnings
pub use statistics::{RunStats, RunningStats};
pub use warnings::{
    Warning, WarningCategory, WarningSummary, WarningTracker, WarningTrackerConfig,
};

// Re-exports - I/O
pub use pipeline::Ntuplizer;
pub use sink::{JsonLinesSink, RecordSink, VecSink};
pub use source::{EventSource, JsonLinesSource, SourceMetadata, VecSource};
