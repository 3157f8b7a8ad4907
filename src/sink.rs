//! Destinations for emitted records.
//!
//! A [`RecordSink`] receives one [`FlatRecord`] per emitted event, in event
//! order. [`JsonLinesSink`] writes one JSON object per line; [`VecSink`]
//! keeps records in memory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{NtupleError, Result};
use crate::record::FlatRecord;

/// Accepts completed records.
pub trait RecordSink {
    fn write(&mut self, record: &FlatRecord) -> Result<()>;

    /// Flush buffered output. Called once after the last record.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write(&mut self, record: &FlatRecord) -> Result<()> {
        (**self).write(record)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Records kept in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    records: Vec<FlatRecord>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[FlatRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FlatRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSink for VecSink {
    fn write(&mut self, record: &FlatRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// One JSON-encoded record per line.
pub struct JsonLinesSink<W: Write = BufWriter<File>> {
    writer: W,
    written: u64,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| NtupleError::Io(format!("cannot create {}: {e}", path.display())))?;
        log::info!("Writing records to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write(&mut self, record: &FlatRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        log::debug!("Flushed {} records", self.written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventInfo, JetCollectionRecord};

    fn record(event: u64) -> FlatRecord {
        FlatRecord {
            event: EventInfo {
                event,
                ..Default::default()
            },
            jets: JetCollectionRecord::new("JetInfo", vec!["Jet_Proba".to_string()]),
            fat_jets: None,
        }
    }

    #[test]
    fn test_vec_sink() {
        let mut sink = VecSink::new();
        sink.write(&record(1)).unwrap();
        sink.write(&record(2)).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1].event.event, 2);
    }

    #[test]
    fn test_json_lines_sink_one_record_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write(&record(7)).unwrap();
        sink.write(&record(8)).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.written(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let back: FlatRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(back.event.event, 8);
        assert_eq!(back.jets.discriminant_labels, vec!["Jet_Proba"]);
    }

    #[test]
    fn test_sink_through_mutable_reference() {
        fn drain(mut sink: impl RecordSink) {
            sink.write(&record(1)).unwrap();
        }
        let mut sink = VecSink::new();
        drain(&mut sink);
        assert_eq!(sink.len(), 1);
    }
}
