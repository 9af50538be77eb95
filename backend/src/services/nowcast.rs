//! Live nowcast on every accepted reading once the window is ready

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use shared::{DecisionEvent, ForecastResult};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::external::Publisher;
use crate::services::decision_engine::{DecisionEngine, Inference};

/// Probability assumed when the model has never answered
pub const FALLBACK_PROBABILITY: f64 = 0.5;

pub struct NowcastService {
    engine: Arc<DecisionEngine>,
    publisher: Arc<dyn Publisher>,
    publish_timeout: Duration,
    last_probability: RwLock<Option<f64>>,
    latest: RwLock<Option<ForecastResult>>,
}

impl NowcastService {
    pub fn new(
        engine: Arc<DecisionEngine>,
        publisher: Arc<dyn Publisher>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            publisher,
            publish_timeout,
            last_probability: RwLock::new(None),
            latest: RwLock::new(None),
        }
    }

    /// Most recent live result
    pub fn latest(&self) -> Option<ForecastResult> {
        self.latest.read().clone()
    }

    /// Nowcast for the newest reading, published with no slot id.
    ///
    /// A model failure does not fail the call: the last known probability,
    /// or 0.5 if there is none, stands in with amount 0.
    pub async fn run_latest(&self) -> AppResult<ForecastResult> {
        let at = self
            .engine
            .window()
            .read()
            .latest()
            .map(|r| r.timestamp)
            .ok_or_else(|| AppError::InsufficientData("no sensor readings yet".to_string()))?;
        let input = self.engine.prepare(at)?;

        let inference = match self.engine.infer(&input.features).await {
            Ok(inference) => {
                *self.last_probability.write() = Some(inference.probability);
                inference
            }
            Err(e) => {
                let probability = self.last_probability.read().unwrap_or(FALLBACK_PROBABILITY);
                warn!(
                    code = e.code(),
                    fallback_probability = probability,
                    "nowcast model failed, using fallback: {e}"
                );
                Inference {
                    probability,
                    amount_mm: 0.0,
                }
            }
        };

        let result = self.engine.conclude(&input, inference);
        *self.latest.write() = Some(result.clone());

        let event = DecisionEvent {
            slot_id: None,
            result: result.clone(),
        };
        match tokio::time::timeout(self.publish_timeout, self.publisher.publish_decision(&event)).await
        {
            Ok(Ok(())) => debug!(as_of = %at, "nowcast published"),
            Ok(Err(e)) => warn!(code = e.code(), "nowcast not published: {e}"),
            Err(_) => warn!("nowcast publish timed out"),
        }

        Ok(result)
    }
}
