//! Run driver: source → projector → sink.
//!
//! [`Ntuplizer`] owns the per-run state around an [`EventProjector`]: the
//! reusable [`FlatLayout`], the [`WarningTracker`] and the [`RunStats`].
//! Events are processed strictly in source order and each emitted record is
//! handed to the sink before the next event starts.
//!
//! Overflowing a fixed-capacity layout aborts the run. A malformed input
//! line aborts it too unless [`Ntuplizer::skip_malformed`] is set.

use std::time::Instant;

use crate::config::NtuplizerConfig;
use crate::error::{NtupleError, Result};
use crate::layout::FlatLayout;
use crate::projector::{EventProjector, ProjectionOutcome};
use crate::providers::{DiscriminantProvider, TagVariableProvider};
use crate::sink::RecordSink;
use crate::source::{EventSource, SourceMetadata};
use crate::statistics::RunStats;
use crate::types::EventInput;
use crate::warnings::{WarningCategory, WarningTracker, WarningTrackerConfig};

/// Events between progress log lines.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Drives a full ntuple-production run.
///
/// ```
/// use jet_ntuplizer::config::NtuplizerConfig;
/// use jet_ntuplizer::pipeline::Ntuplizer;
/// use jet_ntuplizer::sink::VecSink;
/// use jet_ntuplizer::source::{EventSource, VecSource};
/// use jet_ntuplizer::types::EventInput;
///
/// let source = VecSource::new(vec![EventInput::new(1, 1, 1)]);
/// let mut ntuplizer = Ntuplizer::for_source(NtuplizerConfig::default(), source.metadata()).unwrap();
///
/// let mut sink = VecSink::new();
/// ntuplizer.run(source, &mut sink).unwrap();
/// assert_eq!(ntuplizer.stats().events_seen, 1);
/// ```
#[derive(Debug)]
pub struct Ntuplizer {
    projector: EventProjector,
    layout: FlatLayout,
    warnings: WarningTracker,
    stats: RunStats,
    skip_malformed: bool,
}

impl Ntuplizer {
    /// Build a driver resolving discriminators through `discriminants`.
    pub fn new(config: NtuplizerConfig, discriminants: &dyn DiscriminantProvider) -> Result<Self> {
        let mut warnings = WarningTracker::with_config(WarningTrackerConfig {
            log_warnings: config.log_warnings,
            ..Default::default()
        });
        let projector = EventProjector::new(config, discriminants, &mut warnings)?;

        Ok(Self {
            layout: projector.new_layout(),
            projector,
            warnings,
            stats: RunStats::new(),
            skip_malformed: false,
        })
    }

    /// Build a driver for the discriminators a source declares.
    pub fn for_source(config: NtuplizerConfig, metadata: &SourceMetadata) -> Result<Self> {
        Self::new(config, &metadata.discriminant_catalog())
    }

    pub fn with_tag_variables(mut self, provider: impl TagVariableProvider + 'static) -> Self {
        self.projector = self.projector.with_tag_variables(provider);
        self
    }

    /// Skip undecodable input events instead of aborting.
    pub fn skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    pub fn projector(&self) -> &EventProjector {
        &self.projector
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn warnings(&self) -> &WarningTracker {
        &self.warnings
    }

    pub fn into_parts(self) -> (RunStats, WarningTracker) {
        (self.stats, self.warnings)
    }

    /// Project one event and update the run statistics.
    pub fn process_event(&mut self, input: &EventInput) -> Result<ProjectionOutcome> {
        self.warnings.begin_event(input.run, input.event);
        let outcome = self
            .projector
            .project(input, &mut self.layout, &mut self.warnings);
        self.warnings.end_event();

        let outcome = outcome.map_err(|e| {
            log::error!("run {} event {}: {e}", input.run, input.event);
            e
        })?;

        match outcome.record() {
            Some(record) => self.stats.record_emitted(record),
            None => self.stats.record_rejected(),
        }
        Ok(outcome)
    }

    /// Process every event of `source`, writing emitted records to `sink`.
    pub fn run<S: EventSource, K: RecordSink>(&mut self, source: S, mut sink: K) -> Result<()> {
        let metadata = source.metadata().clone();
        log::info!(
            "Processing {} ({} events expected)",
            metadata
                .dataset
                .as_deref()
                .or(metadata.provider.as_deref())
                .unwrap_or("source"),
            metadata
                .estimated_events
                .map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        let start = Instant::now();
        let mut skipped = 0u64;

        for item in source.events()? {
            let input = match item {
                Ok(input) => input,
                Err(e @ NtupleError::MalformedInput { .. }) if self.skip_malformed => {
                    self.warnings
                        .record_simple(WarningCategory::Other, format!("skipped input: {e}"));
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let ProjectionOutcome::Emitted(record) = self.process_event(&input)? {
                sink.write(&record)?;
            }

            if self.stats.events_seen % PROGRESS_INTERVAL == 0 {
                log::info!(
                    "{} events, {} emitted, {:.0} events/s",
                    self.stats.events_seen,
                    self.stats.events_emitted,
                    self.stats.events_seen as f64 / start.elapsed().as_secs_f64().max(1e-9)
                );
            }
        }

        sink.finish()?;

        log::info!(
            "Done in {:.2}s ({} malformed inputs skipped)",
            start.elapsed().as_secs_f64(),
            skipped
        );
        self.stats.log_summary();
        self.warnings.log_summary();
        Ok(())
    }
}
