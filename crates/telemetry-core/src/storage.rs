//! Storage and serialization collaborators.
//!
//! A [`StorageSlot`] is one named durable value that is read and written as a
//! whole. The engine never interprets the bytes itself; a [`Codec`] turns
//! values into bytes and back.

use crate::error::{Result, TelemetryError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A single named durable slot.
pub trait StorageSlot: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Read the whole value, or `None` if nothing has been written yet.
    fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the whole value. Readers see either the old or the new bytes.
    fn write(&self, bytes: &[u8]) -> Result<()>;
}

/// Value <-> bytes conversion.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A slot backed by one file on disk.
///
/// Writes go to a hidden sibling temp file which is synced and then renamed
/// over the target.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
    name: String,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "slot".into());
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }

    fn io_err(&self, e: std::io::Error) -> TelemetryError {
        TelemetryError::storage(self.name.clone(), e)
    }
}

impl StorageSlot for FileSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let tmp = self.temp_path();
        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_err(e));
        }
        tracing::debug!(slot = %self.name, bytes = bytes.len(), "slot written");
        Ok(())
    }
}

/// An in-memory slot. Clones share contents.
///
/// Can be told to fail (simulating unavailable storage) or to sleep on each
/// access (simulating slow storage).
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    inner: Arc<Mutex<Option<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TelemetryError::storage(
                "memory",
                std::io::Error::other("memory slot marked unavailable"),
            ));
        }
        Ok(())
    }
}

impl StorageSlot for MemorySlot {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self) -> Result<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.contents())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        self.check()?;
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServerAggregateHistory, SessionSummary};

    #[test]
    fn test_file_slot_missing_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("server_data.json"));
        assert!(slot.read().unwrap().is_none());
    }

    #[test]
    fn test_file_slot_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path().join("nested").join("server_data.json"));

        slot.write(b"first").unwrap();
        slot.write(b"second").unwrap();
        assert_eq!(slot.read().unwrap().unwrap(), b"second");

        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_file_slot_unreadable_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where a file is expected.
        let slot = FileSlot::new(dir.path());
        let err = slot.read().unwrap_err();
        assert!(err.is_storage());
    }

    #[test]
    fn test_memory_slot_failure_mode() {
        let slot = MemorySlot::new();
        slot.write(b"ok").unwrap();
        slot.set_failing(true);
        assert!(slot.read().unwrap_err().is_storage());
        assert!(slot.write(b"lost").unwrap_err().is_storage());
        slot.set_failing(false);
        assert_eq!(slot.read().unwrap().unwrap(), b"ok");
        assert_eq!(slot.writes(), 1);
    }

    #[test]
    fn test_json_codec_history() {
        let mut history = ServerAggregateHistory::default();
        history.push_summary(SessionSummary::new(3, 4));

        let bytes = JsonCodec.encode(&history).unwrap();
        let decoded: ServerAggregateHistory = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, history);

        let err = JsonCodec
            .decode::<ServerAggregateHistory>(b"not json")
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Codec(_)));
    }
}
