pub const TOPIC_SENSOR_TEMP: &str = "nerdostat/sensor/temperature";
pub const TOPIC_SENSOR_HUMIDITY: &str = "nerdostat/sensor/humidity";
pub const TOPIC_SENSOR_STATUS: &str = "nerdostat/sensor/status";

pub const TOPIC_TELEMETRY: &str = "nerdostat/telemetry";

pub const TOPIC_METHOD_PREFIX: &str = "nerdostat/methods/POST/";
pub const TOPIC_METHOD_FILTER: &str = "nerdostat/methods/POST/+";
pub const TOPIC_METHOD_RESPONSE_PREFIX: &str = "nerdostat/methods/res/";

pub fn method_response_topic(status: u16, method: &str) -> String {
    format!("{TOPIC_METHOD_RESPONSE_PREFIX}{status}/{method}")
}

/// Method name of a request topic, `None` for any other topic.
pub fn method_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_METHOD_PREFIX)
        .filter(|method| !method.is_empty() && !method.contains('/'))
}
