//! Durable record of the refresh cadence, so a restarted process re-arms on
//! the same phase instead of starting a fresh interval.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleStoreError {
    #[error("Schedule file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schedule file is corrupted: {0}")]
    Corrupted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub interval_secs: u64,
    pub next_fire_at: DateTime<Utc>,
}

impl ScheduleRecord {
    pub fn new(interval: Duration, next_fire_at: DateTime<Utc>) -> Self {
        Self {
            interval_secs: interval.as_secs(),
            next_fire_at,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Time left until the next fire, zero if it is already due.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        (self.next_fire_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

pub trait ScheduleStore: Send + Sync {
    fn load(&self) -> Result<Option<ScheduleRecord>, ScheduleStoreError>;

    fn save(&self, record: &ScheduleRecord) -> Result<(), ScheduleStoreError>;
}

/// JSON file store, e.g. `~/.config/stratus/schedule.json`.
#[derive(Debug)]
pub struct FileScheduleStore {
    path: PathBuf,
}

impl FileScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScheduleStore for FileScheduleStore {
    fn load(&self) -> Result<Option<ScheduleRecord>, ScheduleStoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| ScheduleStoreError::Corrupted(e.to_string()))
    }

    fn save(&self, record: &ScheduleRecord) -> Result<(), ScheduleStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| ScheduleStoreError::Corrupted(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    record: Mutex<Option<ScheduleRecord>>,
}

impl MemoryScheduleStore {
    pub fn with_record(record: ScheduleRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn load(&self) -> Result<Option<ScheduleRecord>, ScheduleStoreError> {
        Ok(self.record.lock().clone())
    }

    fn save(&self, record: &ScheduleRecord) -> Result<(), ScheduleStoreError> {
        *self.record.lock() = Some(record.clone());
        Ok(())
    }
}
