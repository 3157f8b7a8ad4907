//! Event source abstraction.
//!
//! The projector consumes [`EventInput`]s; where they come from is behind the
//! [`EventSource`] trait. Two sources ship with the crate:
//!
//! - [`VecSource`]: events already in memory (tests, benches, embedding)
//! - [`JsonLinesSource`]: one JSON-encoded event per line
//!
//! # JSON-lines format
//!
//! Each non-blank line is one event. The first line may instead be a header
//! naming the discriminators carried positionally in every jet's
//! `discriminants` vector:
//!
//! ```text
//! {"header": {"dataset": "ttbar", "discriminants": ["csv", "jetProbability"]}}
//! {"run": 1, "event": 10, "lumi_block": 3, "is_data": true, "jets": [...]}
//! ```
//!
//! # Implementing Custom Sources
//!
//! ```
//! use jet_ntuplizer::error::Result;
//! use jet_ntuplizer::source::{EventSource, SourceMetadata};
//! use jet_ntuplizer::types::EventInput;
//!
//! struct Generated {
//!     count: u64,
//!     metadata: SourceMetadata,
//! }
//!
//! impl EventSource for Generated {
//!     type EventIter = Box<dyn Iterator<Item = Result<EventInput>>>;
//!
//!     fn events(self) -> Result<Self::EventIter> {
//!         Ok(Box::new((0..self.count).map(|i| Ok(EventInput::new(1, i, 1)))))
//!     }
//!
//!     fn metadata(&self) -> &SourceMetadata {
//!         &self.metadata
//!     }
//! }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NtupleError, Result};
use crate::providers::DiscriminantCatalog;
use crate::types::EventInput;

// ============================================================================
// Source Metadata
// ============================================================================

/// What is known about a source before it is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceMetadata {
    /// Dataset name (e.g. "ttbar_2016")
    pub dataset: Option<String>,

    pub file_path: Option<PathBuf>,

    /// Provider name (e.g. "memory", "jsonl")
    pub provider: Option<String>,

    /// For progress reporting
    pub estimated_events: Option<u64>,

    pub file_size: Option<u64>,

    /// Discriminator names, by position in `Jet::discriminants`
    pub discriminants: Vec<String>,
}

impl SourceMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_estimated_events(mut self, count: u64) -> Self {
        self.estimated_events = Some(count);
        self
    }

    pub fn with_discriminants<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.discriminants = names.into_iter().map(Into::into).collect();
        self
    }

    /// Catalog resolving the discriminators this source carries.
    pub fn discriminant_catalog(&self) -> DiscriminantCatalog {
        DiscriminantCatalog::new(self.discriminants.iter().cloned())
    }

    /// Metadata from a file path: size on disk and the dataset name taken
    /// from the file name without its extensions.
    ///
    /// `/data/ttbar_2016.jsonl` gives dataset `ttbar_2016`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut metadata = Self::new().with_file_path(path);

        if let Ok(meta) = std::fs::metadata(path) {
            metadata.file_size = Some(meta.len());
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            let base = name.split('.').next().unwrap_or(name);
            if !base.is_empty() {
                metadata.dataset = Some(base.to_string());
            }
        }

        metadata
    }
}

// ============================================================================
// Event Source Trait
// ============================================================================

/// A single-pass supplier of events.
///
/// `events()` consumes the source. Per-event decoding failures are yielded as
/// `Err` items so the caller can decide whether to skip or stop.
pub trait EventSource {
    type EventIter: Iterator<Item = Result<EventInput>>;

    /// Consume the source and iterate over its events.
    fn events(self) -> Result<Self::EventIter>;

    fn metadata(&self) -> &SourceMetadata;
}

// ============================================================================
// Vector Source
// ============================================================================

/// Events held in memory.
///
/// ```
/// use jet_ntuplizer::source::{EventSource, VecSource};
/// use jet_ntuplizer::types::EventInput;
///
/// let source = VecSource::new(vec![EventInput::new(1, 1, 1), EventInput::new(1, 2, 1)]);
/// assert_eq!(source.metadata().estimated_events, Some(2));
/// assert_eq!(source.events().unwrap().count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct VecSource {
    events: Vec<EventInput>,
    metadata: SourceMetadata,
}

impl VecSource {
    pub fn new(events: Vec<EventInput>) -> Self {
        Self {
            metadata: SourceMetadata::new()
                .with_provider("memory")
                .with_estimated_events(events.len() as u64),
            events,
        }
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl EventSource for VecSource {
    type EventIter = std::iter::Map<std::vec::IntoIter<EventInput>, fn(EventInput) -> Result<EventInput>>;

    fn events(self) -> Result<Self::EventIter> {
        Ok(self.events.into_iter().map(Ok as fn(EventInput) -> Result<EventInput>))
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

// ============================================================================
// JSON-lines Source
// ============================================================================

/// Optional first line of a JSON-lines file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceHeader {
    pub dataset: Option<String>,
    pub discriminants: Vec<String>,
}

#[derive(Deserialize)]
struct HeaderLine {
    header: SourceHeader,
}

/// One JSON-encoded [`EventInput`] per line.
pub struct JsonLinesSource<R: BufRead = BufReader<File>> {
    lines: Lines<R>,
    /// First event line, read while looking for a header
    pending: Option<(u64, String)>,
    line_no: u64,
    metadata: SourceMetadata,
}

impl JsonLinesSource<BufReader<File>> {
    /// Open `path`, reading the header line if present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            NtupleError::Io(format!("cannot open {}: {e}", path.display()))
        })?;

        let mut metadata = SourceMetadata::from_path(path);
        metadata.provider = Some("jsonl".to_string());

        let source = Self::from_reader(BufReader::new(file))?;
        let header_dataset = source.metadata.dataset.clone();
        metadata.discriminants = source.metadata.discriminants.clone();
        if header_dataset.is_some() {
            metadata.dataset = header_dataset;
        }

        log::info!(
            "Opened {} ({} bytes, {} discriminators)",
            path.display(),
            metadata.file_size.unwrap_or(0),
            metadata.discriminants.len()
        );

        Ok(Self { metadata, ..source })
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Wrap a reader, reading the header line if present.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut source = Self {
            lines: reader.lines(),
            pending: None,
            line_no: 0,
            metadata: SourceMetadata::new().with_provider("jsonl"),
        };

        if let Some((line_no, line)) = source.next_non_blank()? {
            match serde_json::from_str::<HeaderLine>(&line) {
                Ok(HeaderLine { header }) => {
                    log::debug!("Header: {} discriminators", header.discriminants.len());
                    source.metadata.dataset = header.dataset;
                    source.metadata.discriminants = header.discriminants;
                }
                Err(_) => source.pending = Some((line_no, line)),
            }
        }

        Ok(source)
    }

    fn next_non_blank(&mut self) -> Result<Option<(u64, String)>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line?;
            if !line.trim().is_empty() {
                return Ok(Some((self.line_no, line)));
            }
        }
        Ok(None)
    }
}

impl<R: BufRead> EventSource for JsonLinesSource<R> {
    type EventIter = JsonLinesEvents<R>;

    fn events(self) -> Result<Self::EventIter> {
        Ok(JsonLinesEvents { source: self })
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

/// Iterator over the events of a [`JsonLinesSource`].
pub struct JsonLinesEvents<R: BufRead> {
    source: JsonLinesSource<R>,
}

impl<R: BufRead> Iterator for JsonLinesEvents<R> {
    type Item = Result<EventInput>;

    fn next(&mut self) -> Option<Self::Item> {
        let (line_no, line) = match self.source.pending.take() {
            Some(pending) => pending,
            None => match self.source.next_non_blank() {
                Ok(Some(next)) => next,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            },
        };

        Some(
            serde_json::from_str(&line).map_err(|e| NtupleError::MalformedInput {
                record: line_no,
                reason: e.to_string(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn jsonl(text: &str) -> JsonLinesSource<Cursor<Vec<u8>>> {
        JsonLinesSource::from_reader(Cursor::new(text.as_bytes().to_vec())).unwrap()
    }

    #[test]
    fn test_metadata_builder() {
        let meta = SourceMetadata::new()
            .with_dataset("qcd")
            .with_provider("memory")
            .with_estimated_events(10)
            .with_discriminants(["csv", "jp"]);

        assert_eq!(meta.dataset.as_deref(), Some("qcd"));
        assert_eq!(meta.estimated_events, Some(10));
        assert_eq!(meta.discriminant_catalog().position("jp"), Some(1));
    }

    #[test]
    fn test_metadata_from_path() {
        let meta = SourceMetadata::from_path("/data/ttbar_2016.events.jsonl");
        assert_eq!(meta.dataset.as_deref(), Some("ttbar_2016"));
        assert!(meta.file_size.is_none());
    }

    #[test]
    fn test_vec_source() {
        let source = VecSource::new(vec![EventInput::new(1, 5, 2)])
            .with_metadata(SourceMetadata::new().with_dataset("unit"));
        assert_eq!(source.metadata().dataset.as_deref(), Some("unit"));

        let events: Vec<_> = source.events().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, 5);
    }

    #[test]
    fn test_jsonl_with_header() {
        let source = jsonl(concat!(
            "{\"header\": {\"dataset\": \"ttbar\", \"discriminants\": [\"csv\"]}}\n",
            "{\"run\": 1, \"event\": 10, \"is_data\": true}\n",
            "\n",
            "{\"run\": 1, \"event\": 11}\n",
        ));
        assert_eq!(source.metadata().dataset.as_deref(), Some("ttbar"));
        assert_eq!(source.metadata().discriminants, vec!["csv"]);

        let events: Vec<_> = source.events().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_data);
        assert_eq!(events[1].event, 11);
        assert!(!events[1].is_data);
    }

    #[test]
    fn test_jsonl_without_header_keeps_first_event() {
        let source = jsonl("{\"run\": 2, \"event\": 1}\n{\"run\": 2, \"event\": 2}\n");
        assert!(source.metadata().discriminants.is_empty());
        let events: Vec<_> = source.events().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(events.iter().map(|e| e.event).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_jsonl_malformed_line_reports_position() {
        let source = jsonl("{\"run\": 2, \"event\": 1}\n\nnot json\n{\"run\": 2, \"event\": 3}\n");
        let results: Vec<_> = source.events().unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(NtupleError::MalformedInput { record: 3, .. })
        ));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_jsonl_open_missing_file() {
        assert!(matches!(
            JsonLinesSource::open("/nonexistent/events.jsonl"),
            Err(NtupleError::Io(_))
        ));
    }
}
