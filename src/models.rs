use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Sentinel used by the selector for "every sensor"
pub const ALL_SENSORS: &str = "all";

/// A reading exactly as it arrives on the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReading {
    pub sensor_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub visibility: f64,
    pub aqi: f64,
    pub occupancy: f64,
    pub reliability_score: f64,
    pub created_at: String,
}

/// Reliability of a sample. Scores outside [0, 1] mean the sensor
/// has not finished calibrating yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reliability {
    Score(f64),
    Calibrating,
}

impl Reliability {
    pub fn from_score(score: f64) -> Self {
        if (0.0..=1.0).contains(&score) {
            Reliability::Score(score)
        } else {
            Reliability::Calibrating
        }
    }
}

/// One normalized telemetry reading
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub sensor_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub visibility: f64,
    pub aqi: f64,
    pub occupancy: f64,
    pub reliability_score: f64,
    pub reliability: Reliability,
    pub created_at: OffsetDateTime,
    /// Clock string, e.g. "10:05:00 AM"
    pub time: String,
    /// Chart axis label, e.g. "10:05"
    pub formatted_time: String,
}

/// The active sensor scope
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Sensor(String),
}

impl Selection {
    pub fn from_id(id: &str) -> Self {
        let id = id.trim();
        if id == ALL_SENSORS || id.is_empty() {
            Selection::All
        } else {
            Selection::Sensor(id.to_string())
        }
    }

    /// Topic sent upstream; the feed uses an empty id for "all"
    pub fn topic(&self) -> &str {
        match self {
            Selection::All => "",
            Selection::Sensor(id) => id,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str(ALL_SENSORS),
            Selection::Sensor(id) => f.write_str(id),
        }
    }
}

/// Outbound control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Intent {
    Subscribe { sensor_id: String },
    Unsubscribe { sensor_id: String },
}

impl Intent {
    pub fn subscribe(selection: &Selection) -> Self {
        Intent::Subscribe {
            sensor_id: selection.topic().to_string(),
        }
    }

    pub fn unsubscribe(selection: &Selection) -> Self {
        Intent::Unsubscribe {
            sensor_id: selection.topic().to_string(),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Subscribe { sensor_id } => write!(f, "subscribe '{}'", sensor_id),
            Intent::Unsubscribe { sensor_id } => write!(f, "unsubscribe '{}'", sensor_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_maps_to_empty_topic() {
        assert_eq!(Selection::from_id("all").topic(), "");
        assert_eq!(Selection::from_id("sensor-2").topic(), "sensor-2");
    }

    #[test]
    fn intents_use_feed_wire_format() {
        let json = serde_json::to_string(&Intent::subscribe(&Selection::All)).unwrap();
        assert_eq!(json, r#"{"type":"subscribe","sensor_id":""}"#);

        let json =
            serde_json::to_string(&Intent::unsubscribe(&Selection::from_id("sensor-1"))).unwrap();
        assert_eq!(json, r#"{"type":"unsubscribe","sensor_id":"sensor-1"}"#);
    }

    #[test]
    fn reliability_outside_unit_range_is_calibrating() {
        assert_eq!(Reliability::from_score(0.82), Reliability::Score(0.82));
        assert_eq!(Reliability::from_score(1.0), Reliability::Score(1.0));
        assert_eq!(Reliability::from_score(1.5), Reliability::Calibrating);
        assert_eq!(Reliability::from_score(-0.1), Reliability::Calibrating);
    }
}
