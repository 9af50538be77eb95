//! Inbound sensor events: validate, buffer, archive, nowcast

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use shared::{ForecastResult, SensorEvent, SensorReading};
use tracing::{debug, warn};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::clock::Clock;
use crate::services::data_source::append_csv;
use crate::services::nowcast::NowcastService;
use crate::services::sensor_window::{PushOutcome, SharedWindow};

/// Result of accepting one reading
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub reading: SensorReading,
    pub replaced: bool,
    pub evicted: bool,
    pub window_len: usize,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nowcast: Option<ForecastResult>,
}

pub struct IngestService {
    window: SharedWindow,
    nowcast: Arc<NowcastService>,
    clock: Arc<dyn Clock>,
    archive: Option<PathBuf>,
}

impl IngestService {
    pub fn new(window: SharedWindow, nowcast: Arc<NowcastService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            nowcast,
            clock,
            archive: None,
        }
    }

    /// Also append every accepted reading to this CSV file
    pub fn with_archive(mut self, path: PathBuf) -> Self {
        self.archive = Some(path);
        self
    }

    /// Parse a raw JSON payload from the broker
    pub async fn ingest_bytes(&self, payload: &[u8]) -> AppResult<IngestOutcome> {
        let event: SensorEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::ValidationError(format!("malformed sensor event: {}", e)))?;
        self.ingest(event).await
    }

    pub async fn ingest(&self, event: SensorEvent) -> AppResult<IngestOutcome> {
        if event.is_dropout() {
            warn!(device_id = ?event.device_id, "sensor dropout, reading discarded");
            return Err(AppError::SensorDropout);
        }
        event.validate()?;

        let reading = event.into_reading(self.clock.now());
        let (push, window_len, ready) = {
            let mut window = self.window.write();
            let push = window.push(reading.clone())?;
            (push, window.len(), window.is_ready())
        };
        debug!(
            ts = %reading.timestamp,
            device_id = %reading.device_id,
            window_len,
            "reading buffered"
        );

        if let Some(path) = &self.archive {
            let path = path.clone();
            let record = reading.clone();
            let archived =
                tokio::task::spawn_blocking(move || append_csv(&path, std::slice::from_ref(&record)))
                    .await;
            match archived {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(code = e.code(), "reading not archived: {e}"),
                Err(e) => warn!("archive task failed: {e}"),
            }
        }

        let nowcast = if ready {
            match self.nowcast.run_latest().await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(code = e.code(), "nowcast skipped: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(IngestOutcome {
            reading,
            replaced: push == PushOutcome::Replaced,
            evicted: matches!(push, PushOutcome::Evicted(_)),
            window_len,
            ready,
            nowcast,
        })
    }
}
