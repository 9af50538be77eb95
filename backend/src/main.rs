//! Irrigation agent - server binary
//!
//! Wires the ports to their adapters, restores or generates the schedule,
//! starts the periodic tasks and serves the operations API until Ctrl-C.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use irrigation_backend::{
    config::{Config, ModelConfig, ModelKind},
    create_app,
    external::{
        mqtt, ForecastModel, HttpForecastModel, LinearForecastModel, LogPublisher, MqttPublisher,
        Publisher, UnavailableModel, WeatherClient,
    },
    services::{
        Clock, DataSource, DecisionEngine, FeatureExtractor, IngestService, JsonFileStore,
        NowcastService, PeriodicTask, PlanBuilder, ScheduleService, ScheduleState, ScheduleStore,
        SensorWindow, SystemClock, TriggerScheduler, WeatherSource,
    },
    AppResult, AppState,
};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Load configuration
    let config = Config::load()?;

    tracing::info!("Starting irrigation agent");
    tracing::info!("Environment: {}", config.environment);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let port_timeout = Duration::from_secs(config.scheduler.port_timeout_secs.max(1));

    // Historical data, resolved once
    let data = DataSource::resolve(&config.data);
    let mut weather_rows = data.load_weather_history().unwrap_or_else(|e| {
        tracing::warn!(code = e.code(), "weather history not loaded: {e}");
        Vec::new()
    });
    weather_rows.extend(data.load_forecast().unwrap_or_else(|e| {
        tracing::warn!(code = e.code(), "forecast not loaded: {e}");
        Vec::new()
    }));
    let weather = Arc::new(WeatherSource::new(
        weather_rows,
        chrono::Duration::minutes(config.weather.reference_tolerance_minutes),
    ));

    // Sensor window seeded with the tail of the history
    let window = SensorWindow::from_config(&config.window).shared();
    match data.load_sensor_history() {
        Ok(history) => {
            let mut w = window.write();
            let tail = history.len().saturating_sub(w.capacity());
            for reading in &history[tail..] {
                if let Err(e) = w.push(reading.clone()) {
                    tracing::debug!("seed reading skipped: {e}");
                }
            }
            tracing::info!(readings = w.len(), ready = w.is_ready(), "sensor window seeded");
        }
        Err(e) => tracing::warn!(code = e.code(), "sensor history not loaded: {e}"),
    }

    let model = build_model(&config.model).await;

    // Broker or log-only publisher
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (publisher, mqtt_connection): (Arc<dyn Publisher>, _) = if config.mqtt.enabled {
        let (client, eventloop) = mqtt::connect(&config.mqtt);
        tracing::info!(host = %config.mqtt.host, port = config.mqtt.port, "using MQTT broker");
        (
            Arc::new(MqttPublisher::new(client.clone(), &config.mqtt)) as Arc<dyn Publisher>,
            Some((client, eventloop)),
        )
    } else {
        tracing::info!("MQTT disabled, events are logged only");
        (Arc::new(LogPublisher) as Arc<dyn Publisher>, None)
    };

    let engine = Arc::new(DecisionEngine::new(
        window.clone(),
        weather.clone(),
        FeatureExtractor::from_config(&config.window),
        model,
        config.decision,
        port_timeout,
    ));
    let nowcast = Arc::new(NowcastService::new(
        engine.clone(),
        publisher.clone(),
        port_timeout,
    ));
    let mut ingest = IngestService::new(window.clone(), nowcast.clone(), clock.clone());
    if let Some(path) = &config.data.sensor_archive_csv {
        ingest = ingest.with_archive(path.clone());
    }
    let ingest = Arc::new(ingest);

    // Schedule
    let store: Arc<dyn ScheduleStore> = Arc::new(JsonFileStore::new(config.data.schedule_path.clone()));
    let schedule_state = Arc::new(ScheduleState::new(store, port_timeout));
    let schedules = Arc::new(ScheduleService::new(
        schedule_state.clone(),
        PlanBuilder::new(config.planner.clone())?,
        data,
        weather.clone(),
        window.clone(),
        publisher.clone(),
        clock.clone(),
        port_timeout,
        chrono::Duration::minutes(config.scheduler.demo_lead_minutes),
    ));
    if let Err(e) = schedules.load_or_regenerate().await {
        tracing::error!(code = e.code(), "no schedule available at startup: {e}");
    }
    if config.is_demo() {
        if let Err(e) = schedules.rebase_for_demo(None).await {
            tracing::error!(code = e.code(), "demo rebase failed: {e}");
        }
    }

    let trigger = Arc::new(TriggerScheduler::new(
        schedule_state.clone(),
        engine.clone(),
        publisher.clone(),
        clock.clone(),
        config.scheduler.clone(),
    ));

    // Periodic tasks
    let mut tasks = Vec::new();
    tasks.push({
        let trigger = trigger.clone();
        PeriodicTask::start(
            "trigger_scan",
            Duration::from_secs(config.scheduler.scan_interval_secs.max(1)),
            move || {
                let trigger = trigger.clone();
                async move {
                    trigger.scan().await;
                }
            },
        )
    });
    tasks.push({
        let schedules = schedules.clone();
        PeriodicTask::start_delayed(
            "plan_regeneration",
            Duration::from_secs(config.planner.regenerate_hours.max(1) * 3600),
            move || {
                let schedules = schedules.clone();
                async move {
                    if let Err(e) = schedules.regenerate().await {
                        tracing::error!(code = e.code(), "plan regeneration failed: {e}");
                    }
                }
            },
        )
    });
    if !config.weather.api_key.is_empty() {
        let client = Arc::new(WeatherClient::with_base_url(
            config.weather.api_key.clone(),
            config.weather.api_endpoint.clone(),
        ));
        let location = config.planner.location;
        let weather = weather.clone();
        tasks.push(PeriodicTask::start(
            "weather_refresh",
            Duration::from_secs(config.weather.refresh_minutes.max(1) * 60),
            move || {
                let client = client.clone();
                let weather = weather.clone();
                async move {
                    match client.get_rows(location).await {
                        Ok(rows) => {
                            let merged = weather.merge(rows);
                            tracing::info!(rows = merged, "weather refreshed");
                        }
                        Err(e) => tracing::warn!(code = e.code(), "weather refresh failed: {e}"),
                    }
                }
            },
        ));
    }

    let mqtt_task = mqtt_connection.map(|(client, eventloop)| {
        tokio::spawn(mqtt::run_event_loop(
            eventloop,
            client,
            config.mqtt.sensor_topic.clone(),
            ingest.clone(),
            shutdown_rx.clone(),
        ))
    });

    // Create application state
    let state = AppState {
        config: Arc::new(config.clone()),
        window,
        engine,
        nowcast,
        ingest,
        schedules,
        trigger,
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    for task in tasks {
        task.stop().await;
    }
    let _ = shutdown_tx.send(true);
    if let Some(handle) = mqtt_task {
        let _ = handle.await;
    }
    if let Err(e) = schedule_state.persist_if_dirty().await {
        tracing::error!(code = e.code(), "final schedule save failed: {e}");
    }

    Ok(())
}

fn init_tracing() {
    let json = std::env::var("IRG_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "irrigation_agent=debug,irrigation_backend=debug,tower_http=debug,rumqttc=warn".into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Load the configured model; a model that cannot be loaded is replaced by
/// one that always fails so slot checks irrigate as planned.
async fn build_model(config: &ModelConfig) -> Arc<dyn ForecastModel> {
    let built: AppResult<Arc<dyn ForecastModel>> = match config.kind {
        ModelKind::Linear => LinearForecastModel::from_file(&config.coefficients_path)
            .await
            .map(|m| Arc::new(m) as Arc<dyn ForecastModel>),
        ModelKind::Http => HttpForecastModel::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(|m| Arc::new(m.with_threshold(config.threshold)) as Arc<dyn ForecastModel>),
    };

    match built {
        Ok(model) => {
            tracing::info!(model = model.name(), "forecast model ready");
            model
        }
        Err(e) => {
            tracing::warn!(code = e.code(), "forecast model unavailable, checks will fail open: {e}");
            Arc::new(UnavailableModel::new(e.to_string()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {e}");
    }
}
