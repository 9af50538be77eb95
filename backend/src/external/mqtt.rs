//! MQTT broker adapter
//!
//! Publishes decision and schedule events as JSON and feeds sensor events
//! arriving on the sensor topic into the ingest service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use shared::{DecisionEvent, Schedule};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::error::{AppError, AppResult};
use crate::services::IngestService;

/// Pause before polling again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Sensor payloads buffered between the event loop and the ingest worker
const PAYLOAD_QUEUE: usize = 256;

/// Open a client; nothing is sent until the event loop is polled
pub fn connect(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    AsyncClient::new(options, 64)
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    forecast_topic: String,
    schedule_topic: String,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, config: &MqttConfig) -> Self {
        Self {
            client,
            forecast_topic: config.forecast_topic.clone(),
            schedule_topic: config.schedule_topic.clone(),
        }
    }

    async fn send(&self, topic: &str, payload: Vec<u8>) -> AppResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| AppError::Publish(format!("{}: {}", topic, e)))
    }
}

#[async_trait]
impl crate::external::Publisher for MqttPublisher {
    async fn publish_decision(&self, event: &DecisionEvent) -> AppResult<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| AppError::Publish(format!("encode decision: {}", e)))?;
        self.send(&self.forecast_topic, payload).await
    }

    async fn publish_schedule(&self, schedule: &Schedule) -> AppResult<()> {
        let payload = serde_json::to_vec(schedule)
            .map_err(|e| AppError::Publish(format!("encode schedule: {}", e)))?;
        self.send(&self.schedule_topic, payload).await
    }
}

/// Drive the connection until `shutdown` flips to true.
///
/// Subscribes to the sensor topic on every (re)connect and queues each
/// payload for [`forward_sensor_payloads`], so a slow nowcast never holds up
/// polling. Payloads arriving while the queue is full are dropped.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    sensor_topic: String,
    ingest: Arc<IngestService>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(topic = %sensor_topic, "mqtt event loop started");
    let (payloads, queue) = mpsc::channel(PAYLOAD_QUEUE);
    let worker = tokio::spawn(forward_sensor_payloads(queue, ingest));

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(e) = client.subscribe(&sensor_topic, QoS::AtLeastOnce).await {
                        error!(topic = %sensor_topic, "mqtt subscribe failed: {e}");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != sensor_topic {
                        debug!(topic = %publish.topic, "ignoring message");
                        continue;
                    }
                    if let Err(e) = payloads.try_send(publish.payload.to_vec()) {
                        warn!(topic = %publish.topic, "sensor event dropped: {e}");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(delay_secs = RECONNECT_DELAY.as_secs(), "mqtt connection error: {e}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            },
        }
    }

    if let Err(e) = client.disconnect().await {
        debug!("mqtt disconnect: {e}");
    }
    drop(payloads);
    if let Err(e) = worker.await {
        error!("sensor ingest worker failed: {e}");
    }
    info!("mqtt event loop stopped");
}

/// Ingest queued payloads one at a time, in arrival order, until every
/// sender is gone. Rejected events are logged and dropped.
pub async fn forward_sensor_payloads(
    mut queue: mpsc::Receiver<Vec<u8>>,
    ingest: Arc<IngestService>,
) -> usize {
    let mut accepted = 0;
    while let Some(payload) = queue.recv().await {
        match ingest.ingest_bytes(&payload).await {
            Ok(_) => accepted += 1,
            Err(e) => warn!(code = e.code(), "sensor event rejected: {e}"),
        }
    }
    accepted
}
