/// Operator console: command parsing and text rendering of the dashboard
use log::info;

use crate::models::{ConnectionState, ALL_SENSORS};
use crate::stream::DashboardView;
use crate::utils::{aqi_status, format_value, reliability_status, reliability_text, Metric};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(String),
    Reconnect,
    Sensors,
    Quit,
}

/// Parse one line of operator input. `sensors` are the selectable ids.
pub fn parse_command(line: &str, sensors: &[String]) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();

    match verb.as_str() {
        "select" => {
            let id = words
                .next()
                .ok_or_else(|| format!("usage: select <{}|sensor id>", ALL_SENSORS))?;
            if id == ALL_SENSORS || sensors.iter().any(|s| s == id) {
                Ok(Command::Select(id.to_string()))
            } else {
                Err(format!(
                    "unknown sensor '{}', choose one of: {}, {}",
                    id,
                    ALL_SENSORS,
                    sensors.join(", ")
                ))
            }
        }
        "reconnect" => Ok(Command::Reconnect),
        "sensors" => Ok(Command::Sensors),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err("empty command".to_string()),
        other => Err(format!(
            "unknown command '{}' (try select, reconnect, sensors, quit)",
            other
        )),
    }
}

/// Render the dashboard as log lines
pub fn render(view: &DashboardView<'_>) {
    for line in render_lines(view) {
        info!("{}", line);
    }
}

pub fn render_lines(view: &DashboardView<'_>) -> Vec<String> {
    let status = match view.state {
        ConnectionState::Connected => "Connected",
        ConnectionState::Connecting => "Connecting...",
        ConnectionState::Disconnected => "Disconnected",
    };
    let mut lines = vec![format!("[{}] sensor: {}", status, view.selection)];

    let Some(current) = view.current else {
        lines.push("Waiting for data...".to_string());
        if view.state == ConnectionState::Disconnected {
            lines.push("Please ensure the sensor is connected and transmitting data. Type 'reconnect' to retry.".to_string());
        }
        return lines;
    };

    lines.push(format!("Latest from {} at {}:", current.sensor_id, current.time));
    lines.push(format!(
        "  Temperature: {}",
        format_value(current.temperature, Metric::Temperature)
    ));
    lines.push(format!(
        "  Humidity: {}",
        format_value(current.humidity, Metric::Humidity)
    ));
    lines.push(format!(
        "  Pressure: {}",
        format_value(current.pressure, Metric::Pressure)
    ));
    lines.push(format!(
        "  Visibility: {}",
        format_value(current.visibility, Metric::Visibility)
    ));
    lines.push(format!(
        "  Air quality: {} ({})",
        format_value(current.aqi, Metric::Aqi),
        aqi_status(current.aqi)
    ));
    lines.push(format!(
        "  Occupancy: {} people",
        format_value(current.occupancy, Metric::Occupancy)
    ));
    lines.push(format!(
        "  Reliability: {} ({})",
        reliability_text(current),
        reliability_status(current.reliability)
    ));

    if view.history.len() <= 1 {
        lines.push("Loading historical data...".to_string());
    } else {
        let axis: Vec<String> = view
            .history
            .iter()
            .map(|s| format!("{}={:.1}", s.formatted_time, s.temperature))
            .collect();
        lines.push(format!(
            "  History ({} samples): {}",
            view.history.len(),
            axis.join(" ")
        ));
    }

    lines
}
