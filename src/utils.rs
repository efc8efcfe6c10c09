/// Formatting and classification helpers for presenting samples
use crate::models::{Reliability, Sample};

pub const CALIBRATING_MESSAGE: &str = "Initial data, it may take a few minutes to calibrate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    Visibility,
    Aqi,
    Occupancy,
    ReliabilityScore,
}

/// Format a reading value with the unit of its metric
///
/// Reliability scores are shown as a percentage of 1.0.
pub fn format_value(value: f64, metric: Metric) -> String {
    match metric {
        Metric::Temperature => format!("{:.1}°C", value),
        Metric::Humidity => format!("{:.1}%", value),
        Metric::Pressure => format!("{:.1} hPa", value),
        Metric::Visibility => format!("{:.1} km", value),
        Metric::Aqi | Metric::Occupancy => format!("{}", value),
        Metric::ReliabilityScore => format!("{:.1}%", value * 100.0),
    }
}

/// US EPA air quality band for an AQI value
pub fn aqi_status(aqi: f64) -> &'static str {
    match aqi {
        a if a <= 50.0 => "Good",
        a if a <= 100.0 => "Moderate",
        a if a <= 150.0 => "Unhealthy for Sensitive Groups",
        a if a <= 200.0 => "Unhealthy",
        a if a <= 300.0 => "Very Unhealthy",
        _ => "Hazardous",
    }
}

/// Qualitative band for a reliability score
pub fn reliability_status(reliability: Reliability) -> &'static str {
    let percent = match reliability {
        Reliability::Score(score) => score * 100.0,
        Reliability::Calibrating => return "Cannot Be Determined",
    };

    if percent <= 39.0 {
        "Inconsistent"
    } else if percent <= 79.0 {
        "Moderate"
    } else {
        "Good"
    }
}

/// Reliability as shown on the dashboard: a percentage, or the
/// calibration notice while the sensor is still settling
pub fn reliability_text(sample: &Sample) -> String {
    match sample.reliability {
        Reliability::Score(score) => format_value(score, Metric::ReliabilityScore),
        Reliability::Calibrating => CALIBRATING_MESSAGE.to_string(),
    }
}
