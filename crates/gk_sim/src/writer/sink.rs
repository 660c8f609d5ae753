//! Output boundary: where flushed batches go.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One flushed batch, serialized as NDJSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub location: String,
    /// Zero-based flush counter of the location.
    pub sequence: u64,
    pub flushed_at: DateTime<Utc>,
    pub records: usize,
    pub payload: Vec<u8>,
}

impl EncodedBatch {
    /// `<UTC yyyymmddTHHMMSS.ffffffZ>_<location>_<batch#06>_<uuid>.json`
    pub fn file_name(&self, unique: Uuid) -> String {
        format!(
            "{}_{}_{:06}_{}.json",
            self.flushed_at.format("%Y%m%dT%H%M%S%.6fZ"),
            self.location,
            self.sequence,
            unique.simple()
        )
    }
}

/// Receives flushed batches. Errors are retried by the writer.
pub trait EventSink: Send {
    fn write_batch(&mut self, batch: &EncodedBatch) -> io::Result<()>;
}

/// Writes each batch as its own file in a directory. Files are written
/// under a hidden temporary name and renamed into place.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl EventSink for DirectorySink {
    fn write_batch(&mut self, batch: &EncodedBatch) -> io::Result<()> {
        let name = batch.file_name(Uuid::new_v4());
        let tmp = self.dir.join(format!(".{name}.tmp"));
        fs::write(&tmp, &batch.payload)?;
        fs::rename(&tmp, self.dir.join(&name))
    }
}

/// Keeps batches in memory; clone the handle before boxing the sink.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Arc<Mutex<Vec<EncodedBatch>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<EncodedBatch> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Every payload concatenated in flush order.
    pub fn concatenated(&self) -> Vec<u8> {
        self.batches()
            .into_iter()
            .flat_map(|b| b.payload)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn write_batch(&mut self, batch: &EncodedBatch) -> io::Result<()> {
        self.batches
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?
            .push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn batch() -> EncodedBatch {
        EncodedBatch {
            location: "chicago".to_string(),
            sequence: 7,
            flushed_at: Utc
                .with_ymd_and_hms(2024, 5, 1, 12, 30, 5)
                .single()
                .expect("ts"),
            records: 1,
            payload: b"{\"a\":1}\n".to_vec(),
        }
    }

    #[test]
    fn file_name_follows_convention() {
        let name = batch().file_name(Uuid::nil());
        assert_eq!(
            name,
            "20240501T123005.000000Z_chicago_000007_00000000000000000000000000000000.json"
        );
    }

    #[test]
    fn directory_sink_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = DirectorySink::new(dir.path().join("out")).expect("sink");
        sink.write_batch(&batch()).expect("write");
        let names: Vec<String> = fs::read_dir(sink.dir())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json") && !names[0].starts_with('.'));
        let content = fs::read(sink.dir().join(&names[0])).expect("read");
        assert_eq!(content, batch().payload);
    }
}
