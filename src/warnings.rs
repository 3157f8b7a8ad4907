//! Warning and issue tracking for ntuple production.
//!
//! Most input problems are recoverable: an unmatched groomed jet, a missing
//! discriminator, trigger names that could not be retrieved. The projection
//! keeps going with sentinel values, and the problem is recorded here so it
//! can be counted, summarized and exported after the run.
//!
//! Warnings carry the run/event they occurred in. The tracker keeps the
//! current event as context, set by [`WarningTracker::begin_event`], so call
//! sites deep inside the projector only need a category and a message.
//!
//! # Example
//!
//! ```
//! use jet_ntuplizer::warnings::{WarningCategory, WarningTracker, WarningTrackerConfig};
//!
//! let mut tracker = WarningTracker::with_config(WarningTrackerConfig {
//!     log_warnings: false,
//!     ..Default::default()
//! });
//!
//! tracker.begin_event(1, 42);
//! tracker.record_simple(WarningCategory::JetMatchingFailed, "fat jet 0 unmatched");
//!
//! let summary = tracker.summary();
//! assert_eq!(summary.total, 1);
//! assert_eq!(summary.by_category.get("JET_MATCHING_FAILED"), Some(&1));
//! ```

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Category of warning for classification and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningCategory {
    /// More groomed jets than fat jets in one event
    TooManyGroomedJets,

    /// A fat jet found no groomed partner
    JetMatchingFailed,

    /// Trigger path names could not be retrieved
    TriggerNamesNotFound,

    /// Trigger names and decisions differ in length
    TriggerPathLengthMismatch,

    /// A configured discriminator is not provided by the source
    MissingDiscriminant,

    /// A jet lacks a tag info the configuration asks for
    MissingTagInfo,

    /// The event has no primary vertex; the fallback vertex was used
    MissingPrimaryVertex,

    /// A groomed jet names a subjet absent from the jet collection
    SubjetNotFound,

    /// Energy-ratio denominator was zero
    DegenerateEnergySum,

    /// Other/uncategorized warning
    Other,
}

impl WarningCategory {
    /// Get a human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            WarningCategory::TooManyGroomedJets => "TOO_MANY_GROOMED_JETS",
            WarningCategory::JetMatchingFailed => "JET_MATCHING_FAILED",
            WarningCategory::TriggerNamesNotFound => "TRIGGER_NAMES_NOT_FOUND",
            WarningCategory::TriggerPathLengthMismatch => "TRIGGER_PATH_LENGTH_MISMATCH",
            WarningCategory::MissingDiscriminant => "MISSING_DISCRIMINANT",
            WarningCategory::MissingTagInfo => "MISSING_TAG_INFO",
            WarningCategory::MissingPrimaryVertex => "MISSING_PRIMARY_VERTEX",
            WarningCategory::SubjetNotFound => "SUBJET_NOT_FOUND",
            WarningCategory::DegenerateEnergySum => "DEGENERATE_ENERGY_SUM",
            WarningCategory::Other => "OTHER",
        }
    }

    /// Get severity level (1=low, 2=medium, 3=high).
    pub fn severity(&self) -> u8 {
        match self {
            WarningCategory::TooManyGroomedJets => 2,
            WarningCategory::JetMatchingFailed => 2,
            WarningCategory::TriggerNamesNotFound => 3,
            WarningCategory::TriggerPathLengthMismatch => 3,
            WarningCategory::MissingDiscriminant => 2,
            WarningCategory::MissingTagInfo => 1,
            WarningCategory::MissingPrimaryVertex => 1,
            WarningCategory::SubjetNotFound => 2,
            WarningCategory::DegenerateEnergySum => 1,
            WarningCategory::Other => 1,
        }
    }
}

/// A single warning record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    /// Unique warning ID (auto-incremented)
    pub id: u64,

    pub category: WarningCategory,

    pub message: String,

    /// Run number of the event being processed, if any
    pub run: Option<u32>,

    /// Event number of the event being processed, if any
    pub event: Option<u64>,

    /// Jet collection the warning refers to
    pub collection: Option<String>,

    /// Position of the jet within its collection
    pub jet_index: Option<usize>,

    /// Wall clock time when warning was recorded (nanoseconds since epoch)
    pub recorded_at: u64,

    /// Additional context as key-value pairs
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub context: HashMap<String, String>,
}

impl Warning {
    /// Create a new warning with minimal information.
    pub fn new(id: u64, category: WarningCategory, message: impl Into<String>) -> Self {
        Self {
            id,
            category,
            message: message.into(),
            run: None,
            event: None,
            collection: None,
            jet_index: None,
            recorded_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0),
            context: HashMap::new(),
        }
    }

    pub fn with_event(mut self, run: u32, event: u64) -> Self {
        self.run = Some(run);
        self.event = Some(event);
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_jet_index(mut self, index: usize) -> Self {
        self.jet_index = Some(index);
        self
    }

    /// Add context key-value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Summary statistics for warnings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarningSummary {
    /// Total number of warnings (deduplicated ones excluded)
    pub total: u64,

    /// Warnings suppressed by deduplication
    pub suppressed: u64,

    pub by_category: HashMap<String, u64>,

    pub by_severity: HashMap<u8, u64>,

    /// Number of distinct (run, event) pairs with at least one warning
    pub affected_events: u64,
}

/// Configuration for warning tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningTrackerConfig {
    /// Maximum number of warnings to keep in memory
    pub max_warnings: usize,

    /// Whether to forward warnings to the `log` facade
    pub log_warnings: bool,

    /// Minimum severity to log (1=all, 2=medium+, 3=high only)
    pub min_log_severity: u8,

    /// Whether to deduplicate identical warnings
    pub deduplicate: bool,

    /// Number of events within which an identical warning is suppressed
    pub dedupe_window_events: u64,
}

impl Default for WarningTrackerConfig {
    fn default() -> Self {
        Self {
            max_warnings: 100_000,
            log_warnings: true,
            min_log_severity: 1,
            deduplicate: true,
            dedupe_window_events: 1,
        }
    }
}

/// Collects warnings across a run.
#[derive(Debug)]
pub struct WarningTracker {
    config: WarningTrackerConfig,

    warnings: Vec<Warning>,

    next_id: u64,

    /// Ordinal of the current event, advanced by `begin_event`
    event_ordinal: u64,

    current_event: Option<(u32, u64)>,

    category_counts: AHashMap<WarningCategory, u64>,

    suppressed: u64,

    /// Recent warnings for deduplication (category -> (key hash, event ordinal))
    recent: AHashMap<WarningCategory, Vec<(u64, u64)>>,

    affected_events: HashSet<(u32, u64)>,
}

impl WarningTracker {
    /// Create a new warning tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(WarningTrackerConfig::default())
    }

    /// Create a new warning tracker with custom configuration.
    pub fn with_config(config: WarningTrackerConfig) -> Self {
        Self {
            config,
            warnings: Vec::new(),
            next_id: 1,
            event_ordinal: 0,
            current_event: None,
            category_counts: AHashMap::new(),
            suppressed: 0,
            recent: AHashMap::new(),
            affected_events: HashSet::new(),
        }
    }

    /// A tracker that never logs, for tests and benchmarks.
    pub fn silent() -> Self {
        Self::with_config(WarningTrackerConfig {
            log_warnings: false,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &WarningTrackerConfig {
        &self.config
    }

    /// Set the event context attached to subsequent warnings.
    pub fn begin_event(&mut self, run: u32, event: u64) {
        self.event_ordinal += 1;
        self.current_event = Some((run, event));
    }

    /// Drop the event context.
    pub fn end_event(&mut self) {
        self.current_event = None;
    }

    /// Record a warning.
    ///
    /// Returns the warning ID if recorded, or None if deduplicated.
    pub fn record(&mut self, mut warning: Warning) -> Option<u64> {
        if warning.run.is_none() {
            if let Some((run, event)) = self.current_event {
                warning.run = Some(run);
                warning.event = Some(event);
            }
        }

        if self.config.deduplicate {
            let msg_hash = dedup_key(&warning);
            let now = self.event_ordinal;
            let window = self.config.dedupe_window_events;

            let recent_list = self.recent.entry(warning.category).or_default();
            recent_list.retain(|(_, seen)| now - *seen < window);

            if recent_list.iter().any(|(h, _)| *h == msg_hash) {
                self.suppressed += 1;
                return None;
            }
            recent_list.push((msg_hash, now));
        }

        if self.config.log_warnings && warning.category.severity() >= self.config.min_log_severity {
            let location = match (warning.run, warning.event) {
                (Some(run), Some(event)) => format!(" run {run} event {event}"),
                _ => String::new(),
            };
            if warning.category.severity() >= 3 {
                log::error!(
                    "[{}]{}: {}",
                    warning.category.name(),
                    location,
                    warning.message
                );
            } else {
                log::warn!(
                    "[{}]{}: {}",
                    warning.category.name(),
                    location,
                    warning.message
                );
            }
        }

        if let (Some(run), Some(event)) = (warning.run, warning.event) {
            self.affected_events.insert((run, event));
        }

        *self.category_counts.entry(warning.category).or_insert(0) += 1;

        let id = warning.id;

        if self.warnings.len() < self.config.max_warnings {
            self.warnings.push(warning);
        }

        Some(id)
    }

    /// Allocate the next warning ID.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Record a simple warning with just category and message.
    pub fn record_simple(
        &mut self,
        category: WarningCategory,
        message: impl Into<String>,
    ) -> Option<u64> {
        let id = self.next_id();
        self.record(Warning::new(id, category, message))
    }

    /// Record a warning about one jet of a collection.
    pub fn record_jet_warning(
        &mut self,
        category: WarningCategory,
        message: impl Into<String>,
        collection: &str,
        jet_index: usize,
    ) -> Option<u64> {
        let id = self.next_id();
        let warning = Warning::new(id, category, message)
            .with_collection(collection)
            .with_jet_index(jet_index);
        self.record(warning)
    }

    /// Get the number of warnings stored.
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Get total count of recorded (not suppressed) warnings.
    pub fn total_count(&self) -> u64 {
        self.category_counts.values().sum()
    }

    pub fn count_by_category(&self, category: WarningCategory) -> u64 {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn warnings_by_category(&self, category: WarningCategory) -> Vec<&Warning> {
        self.warnings
            .iter()
            .filter(|w| w.category == category)
            .collect()
    }

    /// Get summary statistics.
    pub fn summary(&self) -> WarningSummary {
        let mut by_category = HashMap::new();
        let mut by_severity = HashMap::new();

        for (cat, count) in &self.category_counts {
            by_category.insert(cat.name().to_string(), *count);
            *by_severity.entry(cat.severity()).or_insert(0) += *count;
        }

        WarningSummary {
            total: self.total_count(),
            suppressed: self.suppressed,
            by_category,
            by_severity,
            affected_events: self.affected_events.len() as u64,
        }
    }

    /// Log the summary at info level.
    pub fn log_summary(&self) {
        let summary = self.summary();
        if summary.total == 0 {
            log::info!("No warnings recorded");
            return;
        }
        log::info!(
            "{} warnings in {} events ({} suppressed)",
            summary.total,
            summary.affected_events,
            summary.suppressed
        );
        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort();
        for (name, count) in categories {
            log::info!("  {name}: {count}");
        }
    }

    /// Export summary and warnings to a JSON file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        #[derive(Serialize)]
        struct Export<'a> {
            summary: WarningSummary,
            warnings: &'a [Warning],
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(
            &mut writer,
            &Export {
                summary: self.summary(),
                warnings: &self.warnings,
            },
        )?;
        writer.flush()?;
        Ok(())
    }

    /// Export warnings to a CSV file (for spreadsheet analysis).
    pub fn export_to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "id,category,severity,message,run,event,collection,jet_index,recorded_at"
        )?;

        for warning in &self.warnings {
            writeln!(
                writer,
                "{},{},{},{:?},{},{},{},{},{}",
                warning.id,
                warning.category.name(),
                warning.category.severity(),
                warning.message,
                warning.run.map(|r| r.to_string()).unwrap_or_default(),
                warning.event.map(|e| e.to_string()).unwrap_or_default(),
                warning.collection.as_deref().unwrap_or_default(),
                warning.jet_index.map(|i| i.to_string()).unwrap_or_default(),
                warning.recorded_at,
            )?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Clear all warnings.
    pub fn clear(&mut self) {
        self.warnings.clear();
        self.category_counts.clear();
        self.recent.clear();
        self.affected_events.clear();
        self.suppressed = 0;
    }
}

impl Default for WarningTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Same message about a different jet is a different warning.
fn dedup_key(warning: &Warning) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    warning.message.hash(&mut hasher);
    warning.collection.hash(&mut hasher);
    warning.jet_index.hash(&mut hasher);
    hasher.finish()
}
