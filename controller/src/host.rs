use std::{future::IntoFuture, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::{
    net::TcpListener,
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use nerdostat_common::{
    dispatch, method_from_topic, CommandResponse, method_response_topic, ConfigStore, JsonFileStore, Reading,
    RefreshError, RuntimeConfig, Thermostat, ThermostatConfig, TOPIC_METHOD_FILTER,
    TOPIC_SENSOR_HUMIDITY, TOPIC_SENSOR_TEMP, TOPIC_TELEMETRY,
};

use crate::{
    devices::{LoggingActuator, MqttSensor},
    web::{self, WebState},
};

pub type SharedThermostat = Arc<Mutex<Thermostat<MqttSensor, LoggingActuator, JsonFileStore>>>;

const MAX_MQTT_PAYLOAD_BYTES: usize = 10 * 1024;
const STARTUP_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct ControllerState {
    thermostat: SharedThermostat,
    sensor: MqttSensor,
    mqtt: AsyncClient,
    timezone: Tz,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = runtime_from_lookup(|name| std::env::var(name).ok());
    let timezone: Tz = runtime
        .timezone
        .parse()
        .map_err(|err| anyhow!("invalid timezone {:?}: {err}", runtime.timezone))?;

    let store = JsonFileStore::in_dir(&runtime.data_dir);
    if runtime.regen_config {
        store
            .save(&ThermostatConfig::default())
            .context("failed to regenerate config")?;
        info!("config regenerated at {}", store.path().display());
    }

    let sensor = MqttSensor::new(Duration::from_millis(runtime.sensor_stale_timeout_ms));
    let thermostat = Thermostat::open(
        sensor.clone(),
        LoggingActuator::default(),
        store,
        runtime.history_capacity,
    )
    .context("failed to load persisted config")?;
    let thermostat: SharedThermostat = Arc::new(Mutex::new(thermostat));

    let network = &runtime.network;
    let mut mqtt_options =
        MqttOptions::new("nerdostat-controller", network.mqtt_host.clone(), network.mqtt_port);
    if !network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let state = ControllerState {
        thermostat: thermostat.clone(),
        sensor,
        mqtt,
        timezone,
    };

    subscribe_topics(&state.mqtt).await?;
    spawn_mqtt_loop(state.clone(), eventloop);
    let control = spawn_control_loop(
        state,
        Duration::from_millis(runtime.refresh_interval_ms),
    );

    let app = web::router(WebState {
        thermostat,
        timezone,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], network.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!(
        "controller listening on http://{addr}, refreshing every {} s in {timezone}",
        runtime.refresh_interval_ms / 1000
    );
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served.context("http server stopped")?,
        stopped = control => match stopped {
            Ok(()) => return Err(anyhow!("control loop exited")),
            Err(err) => return Err(anyhow!("control loop aborted: {err}")),
        },
    }
    Ok(())
}

/// Wall clock in `timezone`, pinned to the offset in force right now.
pub fn now_in_timezone(timezone: Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(&timezone);
    local.with_timezone(&local.offset().fix())
}

fn runtime_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RuntimeConfig {
    fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
        lookup(name).and_then(|value| value.trim().parse().ok())
    }

    let mut runtime = RuntimeConfig::default();
    if let Some(dir) = lookup("NERDOSTAT_DATA_DIR") {
        runtime.data_dir = dir.into();
    }
    runtime.regen_config = lookup("NERDOSTAT_REGEN_CONFIG").is_some_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    });
    if let Some(timezone) = lookup("NERDOSTAT_TIMEZONE") {
        runtime.timezone = timezone;
    }
    if let Some(secs) = parsed::<u64>(&lookup, "NERDOSTAT_REFRESH_INTERVAL_SECS") {
        runtime.refresh_interval_ms = secs.saturating_mul(1000);
    }
    if let Some(secs) = parsed::<u64>(&lookup, "NERDOSTAT_SENSOR_STALE_SECS") {
        runtime.sensor_stale_timeout_ms = secs.saturating_mul(1000);
    }
    if let Some(capacity) = parsed(&lookup, "NERDOSTAT_HISTORY_CAPACITY") {
        runtime.history_capacity = capacity;
    }

    if let Some(host) = lookup("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = parsed(&lookup, "MQTT_PORT") {
        runtime.network.mqtt_port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Some(port) = parsed(&lookup, "CONTROLLER_HTTP_PORT") {
        runtime.network.http_port = port;
    }

    runtime.sanitize();
    runtime
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [TOPIC_SENSOR_TEMP, TOPIC_SENSOR_HUMIDITY, TOPIC_METHOD_FILTER];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(state: ControllerState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&state, &message.topic, &message.payload).await
                    {
                        warn!("mqtt message handling error on {}: {err:#}", message.topic);
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Timer-driven refresh. Sensor and storage failures are logged and the loop
/// carries on; a broken config invariant ends the task and the process.
fn spawn_control_loop(state: ControllerState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + STARTUP_GRACE, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let now = now_in_timezone(state.timezone);

            let result = {
                let mut thermostat = state.thermostat.lock().await;
                thermostat.refresh(now)
            };
            let reading = match result {
                Ok(reading) => reading,
                Err(RefreshError::Persist { reading, .. }) => *reading,
                Err(RefreshError::Sensor(err)) => {
                    warn!("refresh skipped: {err}");
                    continue;
                }
                Err(RefreshError::Config(err)) => {
                    panic!("thermostat config invariant violated: {err}")
                }
            };

            publish_telemetry(&state.mqtt, &reading);
        }
    })
}

/// Queues the reading without waiting. A full request queue (broker down,
/// event loop busy) drops the message so the control loop keeps its cadence.
fn publish_telemetry(mqtt: &AsyncClient, reading: &Reading) -> bool {
    let body = match serde_json::to_vec(reading) {
        Ok(body) => body,
        Err(err) => {
            warn!("telemetry serialization failed: {err}");
            return false;
        }
    };

    match mqtt.try_publish(TOPIC_TELEMETRY, QoS::AtLeastOnce, true, body) {
        Ok(()) => true,
        Err(err) => {
            warn!("telemetry publish dropped: {err}");
            false
        }
    }
}

/// Runs on the event loop task, so it must never wait for queue space.
fn publish_method_response(mqtt: &AsyncClient, method: &str, response: &CommandResponse) -> bool {
    let body = match serde_json::to_vec(&response.body) {
        Ok(body) => body,
        Err(err) => {
            warn!("method response serialization failed: {err}");
            return false;
        }
    };

    let topic = method_response_topic(response.status, method);
    match mqtt.try_publish(topic, QoS::AtLeastOnce, false, body) {
        Ok(()) => true,
        Err(err) => {
            warn!(method, "method response dropped: {err}");
            false
        }
    }
}

async fn handle_mqtt_message(
    state: &ControllerState,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    match topic {
        TOPIC_SENSOR_TEMP => state.sensor.update_temperature(parse_number(payload)?)?,
        TOPIC_SENSOR_HUMIDITY => state.sensor.update_humidity(parse_number(payload)?)?,
        _ => {
            let Some(method) = method_from_topic(topic) else {
                debug!("ignoring message on {topic}");
                return Ok(());
            };

            let now = now_in_timezone(state.timezone);
            let response = {
                let mut thermostat = state.thermostat.lock().await;
                dispatch(&mut *thermostat, method, payload, now)
            };
            publish_method_response(&state.mqtt, method, &response);
        }
    }

    Ok(())
}

fn parse_number(payload: &[u8]) -> anyhow::Result<f64> {
    let text = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;
    text.trim()
        .parse()
        .with_context(|| format!("not a number: {text:?}"))
}
