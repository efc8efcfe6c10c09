/// Synthetic telemetry generator for running the dashboard without a live feed
use log::{debug, error, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Duration};

use crate::feed::{Connector, EventSink, FeedError, FeedEvent, Transport, TransportEvent};
use crate::models::{Intent, RawReading};

// Readings a sensor emits before its reliability score settles into [0, 1]
const CALIBRATION_READINGS: u32 = 2;
const UNCALIBRATED_SCORE: f64 = 1.5;

pub struct SyntheticConnector {
    sensors: Vec<String>,
    period: Duration,
    events: UnboundedSender<FeedEvent>,
}

impl SyntheticConnector {
    pub fn new(sensors: Vec<String>, period: Duration, events: UnboundedSender<FeedEvent>) -> Self {
        Self {
            sensors,
            period,
            events,
        }
    }
}

impl Connector for SyntheticConnector {
    type Transport = SyntheticTransport;

    fn open(&mut self, epoch: u64) -> SyntheticTransport {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(epoch, self.events.clone());

        debug!(
            "Starting synthetic feed #{} for {} sensors",
            epoch,
            self.sensors.len()
        );
        tokio::spawn(run_generator(
            self.sensors.clone(),
            self.period,
            control_rx,
            sink,
        ));

        SyntheticTransport {
            control: Some(control_tx),
        }
    }
}

pub struct SyntheticTransport {
    control: Option<UnboundedSender<String>>,
}

impl Transport for SyntheticTransport {
    fn send(&mut self, text: String) -> Result<(), FeedError> {
        let control = self.control.as_ref().ok_or(FeedError::NotConnected)?;
        control
            .send(text)
            .map_err(|e| FeedError::Send(format!("generator stopped ({})", e)))
    }

    fn close(&mut self) {
        self.control.take();
    }
}

impl Drop for SyntheticTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Per-connection subscription set, with the feed's convention that an
/// empty sensor id addresses every sensor.
#[derive(Debug, Default)]
struct Subscriptions {
    all: bool,
    sensors: HashSet<String>,
}

impl Subscriptions {
    fn apply(&mut self, intent: &Intent) {
        match intent {
            Intent::Subscribe { sensor_id } if sensor_id.is_empty() => self.all = true,
            Intent::Subscribe { sensor_id } => {
                self.sensors.insert(sensor_id.clone());
            }
            Intent::Unsubscribe { sensor_id } if sensor_id.is_empty() => {
                self.all = false;
                self.sensors.clear();
            }
            Intent::Unsubscribe { sensor_id } => {
                self.sensors.remove(sensor_id);
            }
        }
    }

    /// Choose which sensor reports next, if anything is subscribed
    fn pick<'a, R: Rng>(&self, known: &'a [String], rng: &mut R) -> Option<&'a String> {
        let candidates: Vec<&String> = known
            .iter()
            .filter(|id| self.all || self.sensors.contains(*id))
            .collect();

        if candidates.is_empty() {
            None
        } else {
            Some(candidates[rng.random_range(0..candidates.len())])
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Produce one plausible reading. `seq` is how many readings this sensor
/// has already produced; the first few report an uncalibrated score.
fn generate_reading<R: Rng>(
    sensor_id: &str,
    seq: u32,
    created_at: OffsetDateTime,
    rng: &mut R,
) -> Result<RawReading, time::error::Format> {
    let reliability_score = if seq < CALIBRATION_READINGS {
        UNCALIBRATED_SCORE
    } else {
        round_to(rng.random_range(0.3..1.0), 2)
    };

    Ok(RawReading {
        sensor_id: sensor_id.to_string(),
        temperature: round_to(rng.random_range(18.0..30.0), 1),
        humidity: round_to(rng.random_range(30.0..70.0), 1),
        pressure: round_to(rng.random_range(990.0..1030.0), 1),
        visibility: round_to(rng.random_range(5.0..20.0), 1),
        aqi: rng.random_range(0..150) as f64,
        occupancy: rng.random_range(0..50) as f64,
        reliability_score,
        created_at: created_at.format(&Rfc3339)?,
    })
}

async fn run_generator(
    sensors: Vec<String>,
    period: Duration,
    mut control: UnboundedReceiver<String>,
    sink: EventSink,
) {
    let mut rng = StdRng::from_os_rng();
    let mut subscriptions = Subscriptions::default();
    let mut produced: HashMap<String, u32> = HashMap::new();
    let mut ticker = interval(period);

    if !sink.emit(TransportEvent::Opened) {
        return;
    }

    loop {
        tokio::select! {
            message = control.recv() => match message {
                Some(text) => match serde_json::from_str::<Intent>(&text) {
                    Ok(intent) => {
                        debug!("Synthetic feed received {}", intent);
                        subscriptions.apply(&intent);
                    }
                    Err(e) => warn!("Synthetic feed ignoring control message '{}': {}", text, e),
                },
                None => {
                    sink.emit(TransportEvent::Closed);
                    return;
                }
            },
            _ = ticker.tick() => {
                let Some(sensor_id) = subscriptions.pick(&sensors, &mut rng) else {
                    continue;
                };
                let seq = produced.entry(sensor_id.clone()).or_insert(0);

                let payload = generate_reading(sensor_id, *seq, OffsetDateTime::now_utc(), &mut rng)
                    .map_err(|e| e.to_string())
                    .and_then(|reading| serde_json::to_string(&reading).map_err(|e| e.to_string()));
                *seq += 1;

                match payload {
                    Ok(json) => {
                        if !sink.emit(TransportEvent::Message(json)) {
                            return;
                        }
                    }
                    Err(e) => error!("Failed to generate reading for {}: {}", sensor_id, e),
                }
            }
        }
    }
}
