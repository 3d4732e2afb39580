use std::time::Duration;

use anyhow::Context;
use chrono::{Local, Timelike};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, info, warn};

use nerdostat_common::{TOPIC_SENSOR_HUMIDITY, TOPIC_SENSOR_STATUS, TOPIC_SENSOR_TEMP};

const PUBLISH_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("nerdostat-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_last_will(rumqttc::LastWill::new(
        TOPIC_SENSOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("sensor publisher started");

    let mut interval = tokio::time::interval(PUBLISH_INTERVAL);
    loop {
        interval.tick().await;

        // Simulated reading until a real driver is wired in.
        let (temperature, humidity) = simulated_sample(Local::now().minute());
        debug!(temperature, humidity, "publishing sample");

        mqtt.publish(
            TOPIC_SENSOR_TEMP,
            QoS::AtLeastOnce,
            true,
            format!("{temperature:.1}"),
        )
        .await
        .context("failed to publish sensor temperature")?;
        mqtt.publish(
            TOPIC_SENSOR_HUMIDITY,
            QoS::AtLeastOnce,
            true,
            format!("{humidity:.1}"),
        )
        .await
        .context("failed to publish sensor humidity")?;
    }
}

/// Sawtooth in 0.2 °C steps every ten minutes, constant humidity.
fn simulated_sample(minute: u32) -> (f64, f64) {
    (19.5 + 0.2 * f64::from(minute / 10), 60.0)
}
