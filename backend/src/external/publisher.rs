//! Outbound event port

use async_trait::async_trait;
use shared::{DecisionEvent, Schedule};

use crate::error::{AppError, AppResult};

/// Sink for decision and schedule events
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_decision(&self, event: &DecisionEvent) -> AppResult<()>;

    async fn publish_schedule(&self, schedule: &Schedule) -> AppResult<()>;
}

/// Publisher used when no broker is configured: events go to the log
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish_decision(&self, event: &DecisionEvent) -> AppResult<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::Publish(format!("encode decision: {}", e)))?;
        tracing::info!(
            slot_id = event.slot_id.as_ref().map(|s| s.as_str()).unwrap_or("live"),
            should_irrigate = event.result.recommendation.should_irrigate,
            %payload,
            "decision event"
        );
        Ok(())
    }

    async fn publish_schedule(&self, schedule: &Schedule) -> AppResult<()> {
        tracing::info!(
            slots = schedule.slots.len(),
            days = schedule.days_detail.len(),
            status = ?schedule.water_balance.status,
            "schedule event"
        );
        Ok(())
    }
}
