use log::{info, warn};
use std::env;
use std::time::Duration;
use time::macros::format_description;
use time::UtcOffset;
use url::Url;

use crate::stream::HistoryPolicy;

const DEFAULT_SENSORS: &str = "sensor-1,sensor-2,sensor-3";
const DEFAULT_SYNTHETIC_INTERVAL_SECS: u64 = 3;

/// Where readings come from
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSource {
    Live(Url),
    Synthetic { interval: Duration },
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub source: FeedSource,
    pub sensors: Vec<String>,
    pub history_policy: HistoryPolicy,
    /// Explicit display offset; `None` means use the local offset
    pub display_offset: Option<UtcOffset>,
}

impl DashboardConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = match lookup("FEED_SOURCE")
            .unwrap_or_else(|| "live".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "live" => {
                let raw = lookup("WEBSOCKET_URL")
                    .ok_or("WEBSOCKET_URL environment variable not set")?;
                FeedSource::Live(parse_feed_url(&raw)?)
            }
            "synthetic" => {
                let secs = match lookup("SYNTHETIC_INTERVAL_SECS") {
                    Some(value) => value.trim().parse::<u64>().map_err(|e| {
                        format!("SYNTHETIC_INTERVAL_SECS '{}' is not a number: {}", value, e)
                    })?,
                    None => DEFAULT_SYNTHETIC_INTERVAL_SECS,
                };
                if secs == 0 {
                    return Err("SYNTHETIC_INTERVAL_SECS must be at least 1".into());
                }
                FeedSource::Synthetic {
                    interval: Duration::from_secs(secs),
                }
            }
            other => {
                return Err(format!(
                    "FEED_SOURCE '{}' not recognised, expected 'live' or 'synthetic'",
                    other
                )
                .into())
            }
        };

        let sensors = parse_sensor_list(
            &lookup("SENSOR_IDS").unwrap_or_else(|| DEFAULT_SENSORS.to_string()),
        );
        if sensors.is_empty() {
            return Err("SENSOR_IDS must name at least one sensor".into());
        }

        let history_policy = match lookup("HISTORY_ON_SELECT") {
            Some(value) => value.parse::<HistoryPolicy>()?,
            None => HistoryPolicy::default(),
        };

        let display_offset = match lookup("DISPLAY_UTC_OFFSET") {
            Some(value) => Some(parse_offset(&value)?),
            None => None,
        };

        info!("Sensors configured: {}", sensors.join(", "));

        Ok(DashboardConfig {
            source,
            sensors,
            history_policy,
            display_offset,
        })
    }

    /// Offset used for display timestamps. The local offset can only be
    /// determined reliably while the process is single-threaded.
    pub fn resolve_offset(&self) -> UtcOffset {
        if let Some(offset) = self.display_offset {
            return offset;
        }
        UtcOffset::current_local_offset().unwrap_or_else(|e| {
            warn!("Local UTC offset unavailable ({}), showing times in UTC", e);
            UtcOffset::UTC
        })
    }
}

fn parse_feed_url(raw: &str) -> Result<Url, Box<dyn std::error::Error>> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("WEBSOCKET_URL '{}': {}", raw, e))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(format!(
            "WEBSOCKET_URL must use ws:// or wss://, got '{}://'",
            scheme
        )
        .into()),
    }
}

fn parse_sensor_list(raw: &str) -> Vec<String> {
    let mut sensors: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim) {
        if !id.is_empty() && !sensors.iter().any(|s| s == id) {
            sensors.push(id.to_string());
        }
    }
    sensors
}

fn parse_offset(raw: &str) -> Result<UtcOffset, Box<dyn std::error::Error>> {
    let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
    UtcOffset::parse(raw.trim(), &format)
        .map_err(|e| format!("DISPLAY_UTC_OFFSET '{}' should look like +02:00: {}", raw, e).into())
}
