/// Turns raw feed readings into display-ready samples
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::feed::FeedError;
use crate::models::{RawReading, Reliability, Sample};

/// Parse one inbound payload into a raw reading
pub fn parse_reading(payload: &str) -> Result<RawReading, FeedError> {
    serde_json::from_str(payload).map_err(|e| FeedError::Parse(e.to_string()))
}

/// Parse an RFC 3339 timestamp, falling back to the wider ISO 8601 grammar.
/// A timestamp without an offset is taken to be at `local`.
pub fn parse_timestamp(value: &str, local: UtcOffset) -> Result<OffsetDateTime, FeedError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(value, &Iso8601::DEFAULT))
        .or_else(|_| {
            PrimitiveDateTime::parse(value, &Iso8601::DEFAULT).map(|at| at.assume_offset(local))
        })
        .map_err(|e| FeedError::Timestamp(format!("'{}': {}", value, e)))
}

/// Clock string in the 12-hour "h:mm:ss AM" style
pub fn clock_time(local: &OffsetDateTime) -> String {
    let format = format_description!(
        "[hour repr:12 padding:none]:[minute]:[second] [period case:upper]"
    );
    local
        .format(&format)
        .unwrap_or_else(|_| local.time().to_string())
}

/// Chart label: hour unpadded, minutes zero-padded ("9:05")
pub fn axis_time(local: &OffsetDateTime) -> String {
    format!("{}:{:02}", local.hour(), local.minute())
}

/// Build a `Sample` from a raw reading. Display fields are derived from
/// `created_at` as seen at `offset`; raw values pass through untouched.
pub fn normalize(raw: RawReading, offset: UtcOffset) -> Result<Sample, FeedError> {
    let created_at = parse_timestamp(&raw.created_at, offset)?;
    let local = created_at.to_offset(offset);

    Ok(Sample {
        time: clock_time(&local),
        formatted_time: axis_time(&local),
        reliability: Reliability::from_score(raw.reliability_score),
        sensor_id: raw.sensor_id,
        temperature: raw.temperature,
        humidity: raw.humidity,
        pressure: raw.pressure,
        visibility: raw.visibility,
        aqi: raw.aqi,
        occupancy: raw.occupancy,
        reliability_score: raw.reliability_score,
        created_at,
    })
}
