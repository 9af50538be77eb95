//! Schedule persistence port and its adapters

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::Schedule;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Last saved schedule, or `None` when nothing was saved yet
    async fn load(&self) -> AppResult<Option<Schedule>>;

    async fn save(&self, schedule: &Schedule) -> AppResult<()>;
}

/// Canonical JSON file, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "schedule.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ScheduleStore for JsonFileStore {
    async fn load(&self) -> AppResult<Option<Schedule>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::Persistence(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AppError::Persistence(format!("{}: {}", self.path.display(), e)))
    }

    async fn save(&self, schedule: &Schedule) -> AppResult<()> {
        let body = serde_json::to_vec_pretty(schedule)
            .map_err(|e| AppError::Persistence(format!("encode schedule: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Persistence(format!("{}: {}", parent.display(), e)))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &body)
            .await
            .map_err(|e| AppError::Persistence(format!("{}: {}", temp.display(), e)))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| AppError::Persistence(format!("{}: {}", self.path.display(), e)))?;

        tracing::debug!(path = %self.path.display(), slots = schedule.slots.len(), "schedule saved");
        Ok(())
    }
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Schedule>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule(schedule: Schedule) -> Self {
        Self {
            saved: Mutex::new(Some(schedule)),
            saves: Mutex::new(0),
        }
    }

    pub fn saved(&self) -> Option<Schedule> {
        self.saved.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn load(&self) -> AppResult<Option<Schedule>> {
        Ok(self.saved.lock().clone())
    }

    async fn save(&self, schedule: &Schedule) -> AppResult<()> {
        *self.saved.lock() = Some(schedule.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("schedule.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonFileStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[test]
    fn test_temp_path_sits_next_to_target() {
        let store = JsonFileStore::new("data/irrigation_schedule.json");
        assert_eq!(store.temp_path(), PathBuf::from("data/irrigation_schedule.json.tmp"));
    }
}
