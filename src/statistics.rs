//! Run-level statistics for ntuple production.
//!
//! [`RunStats`] counts what happened to every event (emitted or rejected by
//! the trigger) and keeps per-collection multiplicity distributions of the
//! emitted records: jets, tracks and secondary vertices per event. Instances
//! built by independent workers can be merged.
//!
//! # Usage
//!
//! ```
//! use jet_ntuplizer::record::{FlatRecord, JetCollectionRecord};
//! use jet_ntuplizer::statistics::RunStats;
//!
//! let mut stats = RunStats::new();
//! stats.record_rejected();
//! stats.record_emitted(&FlatRecord {
//!     jets: JetCollectionRecord::new("JetInfo", Vec::new()),
//!     ..Default::default()
//! });
//!
//! assert_eq!(stats.events_seen, 2);
//! assert_eq!(stats.emission_ratio(), 0.5);
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::{FlatRecord, JetCollectionRecord};
use crate::types::MISSING_VALUE;

// ============================================================================
// Running Statistics (Welford's Algorithm)
// ============================================================================

/// Online mean and standard deviation.
///
/// Welford's update keeps the computation stable without storing values.
/// `min` and `max` are meaningful only once `count > 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: u64,
    pub mean: f64,
    /// Sum of squared differences from the mean
    m2: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation. Non-finite values are ignored.
    #[inline]
    pub fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Population variance.
    #[inline]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    #[inline]
    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Combine with statistics gathered elsewhere (Chan's parallel update).
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;

        self.mean += delta * (other.count as f64 / count as f64);
        self.m2 += other.m2 + delta * delta * (self.count as f64 * other.count as f64 / count as f64);
        self.count = count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

// ============================================================================
// Per-collection multiplicities
// ============================================================================

/// Multiplicity distributions of one jet collection over emitted events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub jets: RunningStats,
    pub tracks: RunningStats,
    pub secondary_vertices: RunningStats,
    /// Fat jets that found no groomed partner
    pub unmatched_fat_jets: u64,
}

impl CollectionStats {
    pub fn update(&mut self, collection: &JetCollectionRecord) {
        self.jets.update(collection.jets.len() as f64);
        self.tracks.update(collection.tracks.len() as f64);
        self.secondary_vertices
            .update(collection.secondary_vertices.len() as f64);
        self.unmatched_fat_jets += collection
            .jets
            .iter()
            .filter_map(|jet| jet.substructure)
            .filter(|sub| sub.pt_groomed == MISSING_VALUE)
            .count() as u64;
    }

    pub fn merge(&mut self, other: &CollectionStats) {
        self.jets.merge(&other.jets);
        self.tracks.merge(&other.tracks);
        self.secondary_vertices.merge(&other.secondary_vertices);
        self.unmatched_fat_jets += other.unmatched_fat_jets;
    }
}

// ============================================================================
// Run statistics
// ============================================================================

/// Event counts and multiplicities for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub events_seen: u64,
    pub events_emitted: u64,
    /// Real-data events with no configured trigger fired
    pub events_rejected: u64,
    pub data_events: u64,
    pub simulated_events: u64,
    /// Keyed by collection name, in first-seen order
    pub collections: IndexMap<String, CollectionStats>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rejected(&mut self) {
        self.events_seen += 1;
        self.events_rejected += 1;
        self.data_events += 1;
    }

    pub fn record_emitted(&mut self, record: &FlatRecord) {
        self.events_seen += 1;
        self.events_emitted += 1;
        if record.event.is_data {
            self.data_events += 1;
        } else {
            self.simulated_events += 1;
        }

        for collection in record.collections() {
            self.collections
                .entry(collection.name.clone())
                .or_default()
                .update(collection);
        }
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionStats> {
        self.collections.get(name)
    }

    /// Fraction of seen events that were emitted.
    pub fn emission_ratio(&self) -> f64 {
        if self.events_seen == 0 {
            0.0
        } else {
            self.events_emitted as f64 / self.events_seen as f64
        }
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.events_seen += other.events_seen;
        self.events_emitted += other.events_emitted;
        self.events_rejected += other.events_rejected;
        self.data_events += other.data_events;
        self.simulated_events += other.simulated_events;
        for (name, stats) in &other.collections {
            self.collections.entry(name.clone()).or_default().merge(stats);
        }
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "RunStats:\n  \
            Events: {} seen, {} emitted ({:.2}%), {} rejected\n  \
            Data: {}, Simulation: {}",
            self.events_seen,
            self.events_emitted,
            self.emission_ratio() * 100.0,
            self.events_rejected,
            self.data_events,
            self.simulated_events,
        );
        for (name, stats) in &self.collections {
            text.push_str(&format!(
                "\n  {name}: jets/event mean={:.2} max={}, tracks/event mean={:.2}, SVs/event mean={:.2}",
                stats.jets.mean, stats.jets.max, stats.tracks.mean, stats.secondary_vertices.mean,
            ));
            if stats.unmatched_fat_jets > 0 {
                text.push_str(&format!(", {} without groomed partner", stats.unmatched_fat_jets));
            }
        }
        text
    }

    pub fn log_summary(&self) {
        for line in self.summary().lines() {
            log::info!("{}", line.trim_start());
        }
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventInfo, JetRow, SubstructureRow, TrackRow};
    use approx::assert_relative_eq;

    fn record(n_jets: usize, n_tracks: usize, is_data: bool) -> FlatRecord {
        let mut jets = JetCollectionRecord::new("JetInfo", Vec::new());
        jets.jets = vec![JetRow::default(); n_jets];
        jets.tracks = vec![TrackRow::default(); n_tracks];
        FlatRecord {
            event: EventInfo {
                is_data,
                ..Default::default()
            },
            jets,
            fat_jets: None,
        }
    }

    #[test]
    fn test_running_stats_basic() {
        let mut stats = RunningStats::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.update(v);
        }
        assert_eq!(stats.count, 8);
        assert_relative_eq!(stats.mean, 5.0);
        assert_relative_eq!(stats.std(), 2.0);
        assert_eq!((stats.min, stats.max), (2.0, 9.0));
    }

    #[test]
    fn test_running_stats_skips_non_finite() {
        let mut stats = RunningStats::new();
        stats.update(f64::NAN);
        stats.update(-3.0);
        stats.update(f64::INFINITY);
        assert_eq!(stats.count, 1);
        assert_eq!((stats.min, stats.max), (-3.0, -3.0));
    }

    #[test]
    fn test_running_stats_merge_matches_single_pass() {
        let values = [1.0, 3.0, 8.0, 2.0, 6.0, 4.0];
        let mut all = RunningStats::new();
        let mut left = RunningStats::new();
        let mut right = RunningStats::new();
        for (i, &v) in values.iter().enumerate() {
            all.update(v);
            if i < 2 {
                left.update(v);
            } else {
                right.update(v);
            }
        }
        left.merge(&right);
        assert_eq!(left.count, all.count);
        assert_relative_eq!(left.mean, all.mean, epsilon = 1e-12);
        assert_relative_eq!(left.variance(), all.variance(), epsilon = 1e-12);
        assert_eq!((left.min, left.max), (1.0, 8.0));

        let mut empty = RunningStats::new();
        empty.merge(&all);
        assert_eq!(empty, all);
    }

    #[test]
    fn test_run_stats_counts_events() {
        let mut stats = RunStats::new();
        stats.record_emitted(&record(2, 5, true));
        stats.record_emitted(&record(4, 1, false));
        stats.record_rejected();

        assert_eq!(stats.events_seen, 3);
        assert_eq!(stats.events_emitted, 2);
        assert_eq!(stats.events_rejected, 1);
        assert_eq!((stats.data_events, stats.simulated_events), (2, 1));

        let jets = stats.collection("JetInfo").unwrap();
        assert_relative_eq!(jets.jets.mean, 3.0);
        assert_relative_eq!(jets.tracks.mean, 3.0);
        assert!(stats.summary().contains("JetInfo"));
    }

    #[test]
    fn test_unmatched_fat_jets_counted() {
        let mut rec = record(0, 0, false);
        let mut fat = JetCollectionRecord::new("FatJetInfo", Vec::new());
        let matched = SubstructureRow {
            pt_groomed: 150.0,
            ..Default::default()
        };
        fat.jets = vec![
            JetRow {
                substructure: Some(matched),
                ..Default::default()
            },
            JetRow {
                substructure: Some(SubstructureRow::default()),
                ..Default::default()
            },
        ];
        rec.fat_jets = Some(fat);

        let mut stats = RunStats::new();
        stats.record_emitted(&rec);
        assert_eq!(stats.collection("FatJetInfo").unwrap().unmatched_fat_jets, 1);
    }

    #[test]
    fn test_run_stats_merge_and_json() {
        let mut a = RunStats::new();
        a.record_emitted(&record(1, 2, false));
        let mut b = RunStats::new();
        b.record_emitted(&record(3, 0, false));
        b.record_rejected();

        a.merge(&b);
        assert_eq!(a.events_seen, 3);
        assert_eq!(a.collection("JetInfo").unwrap().jets.count, 2);

        let path = std::env::temp_dir().join(format!("ntuplizer_stats_{}.json", std::process::id()));
        a.save_json(&path).unwrap();
        let loaded = RunStats::load_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, a);
    }
}
