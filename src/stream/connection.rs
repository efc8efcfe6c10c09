/// Connection lifecycle for the telemetry feed
use log::{debug, error, info};
use time::UtcOffset;

use crate::feed::{Connector, FeedError, FeedEvent, Transport, TransportEvent};
use crate::models::{ConnectionState, Intent, Sample, Selection};
use crate::stream::history::HistoryWindow;
use crate::stream::normalizer::{normalize, parse_reading};
use crate::stream::subscription::{HistoryPolicy, SubscriptionController};
use crate::stream::DashboardView;

/// The transport currently owned by the feed and the epoch it was opened under
struct Link<T> {
    epoch: u64,
    transport: T,
}

/// Owns the single feed connection and everything derived from it.
///
/// All state changes go through `connect`, `disconnect`, `reconnect`,
/// `select` and `handle`; each runs to completion and never blocks.
/// Transport I/O happens elsewhere and comes back as `FeedEvent`s.
///
/// Connection state transitions:
///
/// | from         | trigger            | to           |
/// |--------------|--------------------|--------------|
/// | disconnected | `connect`          | connecting   |
/// | connecting   | `connect`          | connecting (pending attempt replaced) |
/// | connecting   | `Opened`           | connected (active selection resubscribed) |
/// | connecting   | `Closed`/`Error`   | disconnected |
/// | connected    | `Closed`/`Error`   | disconnected |
/// | connected    | `disconnect`       | disconnected (selection unsubscribed) |
/// | connecting   | `disconnect`       | disconnected (pending attempt dropped) |
///
/// Dropping the feed disconnects it.
pub struct LiveFeed<C: Connector> {
    connector: C,
    link: Option<Link<C::Transport>>,
    last_epoch: u64,
    state: ConnectionState,
    subscriptions: SubscriptionController,
    history: HistoryWindow,
    current: Option<Sample>,
    offset: UtcOffset,
}

impl<C: Connector> LiveFeed<C> {
    /// `offset` is the wall-clock offset used for the samples' display fields
    pub fn new(connector: C, policy: HistoryPolicy, offset: UtcOffset) -> Self {
        Self {
            connector,
            link: None,
            last_epoch: 0,
            state: ConnectionState::Disconnected,
            subscriptions: SubscriptionController::new(policy),
            history: HistoryWindow::default(),
            current: None,
            offset,
        }
    }

    pub fn view(&self) -> DashboardView<'_> {
        DashboardView {
            state: self.state,
            selection: self.subscriptions.selection(),
            current: self.current.as_ref(),
            history: &self.history,
        }
    }

    pub fn connect(&mut self) {
        if self.state == ConnectionState::Connected {
            debug!("Feed already connected");
            return;
        }

        if let Some(pending) = self.link.take() {
            debug!("Abandoning pending feed connection #{}", pending.epoch);
        }

        self.last_epoch += 1;
        let transport = self.connector.open(self.last_epoch);
        self.link = Some(Link {
            epoch: self.last_epoch,
            transport,
        });
        self.set_state(ConnectionState::Connecting);
    }

    /// Unsubscribe and close. Returns the epoch of the connection that was
    /// closed, whose final `Closed` event is still to come.
    pub fn disconnect(&mut self) -> Option<u64> {
        if self.link.is_none() {
            debug!("Feed already disconnected");
            return None;
        }

        if self.state == ConnectionState::Connected {
            let intent = self.subscriptions.withdraw();
            self.send_intent(&intent);
        }

        let mut link = self.link.take()?;
        link.transport.close();
        self.set_state(ConnectionState::Disconnected);
        Some(link.epoch)
    }

    /// Full teardown and rebuild; the new connection resubscribes on open
    pub fn reconnect(&mut self) {
        info!("Reconnecting feed");
        self.disconnect();
        self.connect();
    }

    /// Change the active sensor scope. Returns false if it was already active.
    pub fn select(&mut self, sensor_id: &str) -> bool {
        let connected = self.is_open();
        let Some(intents) = self.subscriptions.select(
            Selection::from_id(sensor_id),
            connected,
            &mut self.history,
        ) else {
            debug!("Sensor '{}' already selected", sensor_id);
            return false;
        };

        for intent in &intents {
            self.send_intent(intent);
        }
        true
    }

    /// Apply one transport event. Returns true if the view changed.
    pub fn handle(&mut self, event: FeedEvent) -> bool {
        let current_epoch = self.link.as_ref().map(|link| link.epoch);
        if current_epoch != Some(event.epoch) {
            debug!(
                "Ignoring {:?} from retired feed connection #{}",
                event.kind, event.epoch
            );
            return false;
        }

        match event.kind {
            TransportEvent::Opened => {
                self.set_state(ConnectionState::Connected);
                let intent = self.subscriptions.resubscribe();
                self.send_intent(&intent);
                true
            }
            TransportEvent::Closed => {
                self.link = None;
                self.set_state(ConnectionState::Disconnected);
                true
            }
            TransportEvent::Error(e) => {
                error!("{}", FeedError::Transport(e));
                self.link = None;
                self.set_state(ConnectionState::Disconnected);
                true
            }
            TransportEvent::Message(payload) => self.receive(&payload),
        }
    }

    fn receive(&mut self, payload: &str) -> bool {
        let sample = match parse_reading(payload).and_then(|raw| normalize(raw, self.offset)) {
            Ok(sample) => sample,
            Err(e) => {
                error!("Dropping feed message: {}", e);
                return false;
            }
        };

        debug!(
            "Reading from {} at {}: temp={:.2}°C, humidity={:.2}%, pressure={:.2} hPa, reliability={:.2}",
            sample.sensor_id,
            sample.created_at,
            sample.temperature,
            sample.humidity,
            sample.pressure,
            sample.reliability_score
        );
        self.history.append(sample.clone());
        self.current = Some(sample);
        true
    }

    fn is_open(&self) -> bool {
        self.state == ConnectionState::Connected && self.link.is_some()
    }

    fn send_intent(&mut self, intent: &Intent) {
        if !self.is_open() {
            error!("{}, can't {}", FeedError::NotConnected, intent);
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let text = match serde_json::to_string(intent) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {}: {}", intent, e);
                return;
            }
        };

        match link.transport.send(text) {
            Ok(()) => debug!("Sent {} on feed connection #{}", intent, link.epoch),
            Err(e) => error!("Failed to {}: {}", intent, e),
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("Feed {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

impl<C: Connector> Drop for LiveFeed<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Wire {
        opened: Vec<u64>,
        sent: Vec<(u64, String)>,
        closed: Vec<u64>,
    }

    impl Wire {
        fn intents(&self) -> Vec<Intent> {
            self.sent
                .iter()
                .map(|(_, text)| serde_json::from_str(text).unwrap())
                .collect()
        }
    }

    struct RecordingTransport {
        epoch: u64,
        wire: Rc<RefCell<Wire>>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, text: String) -> Result<(), FeedError> {
            self.wire.borrow_mut().sent.push((self.epoch, text));
            Ok(())
        }

        fn close(&mut self) {
            self.wire.borrow_mut().closed.push(self.epoch);
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        wire: Rc<RefCell<Wire>>,
    }

    impl Connector for RecordingConnector {
        type Transport = RecordingTransport;

        fn open(&mut self, epoch: u64) -> RecordingTransport {
            self.wire.borrow_mut().opened.push(epoch);
            RecordingTransport {
                epoch,
                wire: self.wire.clone(),
            }
        }
    }

    fn feed() -> (LiveFeed<RecordingConnector>, Rc<RefCell<Wire>>) {
        let connector = RecordingConnector::default();
        let wire = connector.wire.clone();
        (
            LiveFeed::new(connector, HistoryPolicy::Reset, UtcOffset::UTC),
            wire,
        )
    }

    fn event(epoch: u64, kind: TransportEvent) -> FeedEvent {
        FeedEvent { epoch, kind }
    }

    fn reading(sensor_id: &str, temperature: f64, created_at: &str) -> TransportEvent {
        TransportEvent::Message(format!(
            r#"{{"sensor_id":"{}","temperature":{},"humidity":45.0,"pressure":1012.5,
                "visibility":10.0,"aqi":35,"occupancy":4,"reliability_score":0.87,
                "created_at":"{}"}}"#,
            sensor_id, temperature, created_at
        ))
    }

    fn subscribe(id: &str) -> Intent {
        Intent::Subscribe {
            sensor_id: id.to_string(),
        }
    }

    fn unsubscribe(id: &str) -> Intent {
        Intent::Unsubscribe {
            sensor_id: id.to_string(),
        }
    }

    fn connected() -> (LiveFeed<RecordingConnector>, Rc<RefCell<Wire>>) {
        let (mut feed, wire) = feed();
        feed.connect();
        feed.handle(event(1, TransportEvent::Opened));
        (feed, wire)
    }

    #[test]
    fn end_to_end_connect_read_and_switch() {
        let (mut feed, wire) = feed();
        assert_eq!(feed.view().state, ConnectionState::Disconnected);

        feed.connect();
        assert_eq!(feed.view().state, ConnectionState::Connecting);

        assert!(feed.handle(event(1, TransportEvent::Opened)));
        assert_eq!(feed.view().state, ConnectionState::Connected);
        assert_eq!(wire.borrow().intents(), vec![subscribe("")]);

        feed.handle(event(1, reading("sensor-1", 21.5, "2024-01-01T10:05:00Z")));
        assert_eq!(feed.view().current.unwrap().temperature, 21.5);
        assert_eq!(feed.view().current.unwrap().formatted_time, "10:05");
        assert_eq!(feed.view().history.len(), 1);

        assert!(feed.select("sensor-2"));
        assert_eq!(
            wire.borrow().intents(),
            vec![subscribe(""), unsubscribe(""), subscribe("sensor-2")]
        );
        assert_eq!(feed.view().history.len(), 0);
        assert_eq!(feed.view().selection, &Selection::from_id("sensor-2"));
    }

    #[test]
    fn connect_is_idempotent_while_connected() {
        let (mut feed, wire) = connected();
        feed.connect();
        feed.connect();

        assert_eq!(wire.borrow().opened, vec![1]);
        assert_eq!(feed.view().state, ConnectionState::Connected);
    }

    #[test]
    fn connect_while_connecting_replaces_pending_attempt() {
        let (mut feed, wire) = feed();
        feed.connect();
        feed.connect();

        assert_eq!(wire.borrow().opened, vec![1, 2]);

        // the abandoned attempt finishing late changes nothing
        assert!(!feed.handle(event(1, TransportEvent::Opened)));
        assert_eq!(feed.view().state, ConnectionState::Connecting);
        assert!(wire.borrow().sent.is_empty());

        feed.handle(event(2, TransportEvent::Opened));
        assert_eq!(wire.borrow().sent, vec![(2, subscribe_json(""))]);
    }

    fn subscribe_json(id: &str) -> String {
        serde_json::to_string(&subscribe(id)).unwrap()
    }

    #[test]
    fn reselecting_sends_nothing_and_keeps_history() {
        let (mut feed, wire) = connected();
        feed.handle(event(1, reading("sensor-1", 20.0, "2024-01-01T10:05:00Z")));

        assert!(!feed.select("all"));
        assert_eq!(wire.borrow().sent.len(), 1);
        assert_eq!(feed.view().history.len(), 1);
    }

    #[test]
    fn reconnect_resubscribes_active_selection() {
        let (mut feed, wire) = connected();
        feed.select("sensor-3");

        feed.reconnect();
        assert_eq!(feed.view().state, ConnectionState::Connecting);
        assert_eq!(wire.borrow().closed, vec![1]);

        // the old socket's close notification is stale by now
        assert!(!feed.handle(event(1, TransportEvent::Closed)));
        assert_eq!(feed.view().state, ConnectionState::Connecting);

        feed.handle(event(2, TransportEvent::Opened));
        assert_eq!(feed.view().state, ConnectionState::Connected);

        let wire = wire.borrow();
        assert_eq!(wire.opened, vec![1, 2]);
        assert_eq!(
            wire.intents(),
            vec![
                subscribe(""),
                unsubscribe(""),
                subscribe("sensor-3"),
                unsubscribe("sensor-3"),
                subscribe("sensor-3"),
            ]
        );
        assert_eq!(wire.sent.last().unwrap().0, 2);
    }

    #[test]
    fn malformed_messages_leave_state_untouched() {
        let (mut feed, _wire) = connected();
        feed.handle(event(1, reading("sensor-1", 19.0, "2024-01-01T10:05:00Z")));
        let before_current = feed.view().current.cloned();
        let before_history = feed.view().history.clone();

        let bad = [
            TransportEvent::Message("not json".to_string()),
            TransportEvent::Message(r#"{"sensor_id":"sensor-1","temperature":30}"#.to_string()),
            reading("sensor-1", 30.0, "half past ten"),
        ];
        for kind in bad {
            assert!(!feed.handle(event(1, kind)));
        }

        assert_eq!(feed.view().current.cloned(), before_current);
        assert_eq!(feed.view().history, &before_history);
        assert_eq!(feed.view().state, ConnectionState::Connected);
    }

    #[test]
    fn transport_error_disconnects_without_retry() {
        let (mut feed, wire) = connected();

        assert!(feed.handle(event(1, TransportEvent::Error("reset by peer".into()))));
        assert_eq!(feed.view().state, ConnectionState::Disconnected);
        assert_eq!(wire.borrow().opened, vec![1]);

        // a later close from the same socket is ignored
        assert!(!feed.handle(event(1, TransportEvent::Closed)));
    }

    #[test]
    fn refused_connection_goes_back_to_disconnected() {
        let (mut feed, wire) = feed();
        feed.connect();
        feed.handle(event(1, TransportEvent::Error("connection refused".into())));

        assert_eq!(feed.view().state, ConnectionState::Disconnected);
        assert!(wire.borrow().sent.is_empty());
    }

    #[test]
    fn select_while_disconnected_is_deferred_until_open() {
        let (mut feed, wire) = feed();
        assert!(feed.select("sensor-2"));
        assert!(wire.borrow().sent.is_empty());

        feed.connect();
        feed.handle(event(1, TransportEvent::Opened));
        assert_eq!(wire.borrow().intents(), vec![subscribe("sensor-2")]);
    }

    #[test]
    fn select_while_connecting_subscribes_on_open() {
        let (mut feed, wire) = feed();
        feed.connect();
        assert!(feed.select("sensor-2"));
        assert!(wire.borrow().sent.is_empty());
        assert_eq!(feed.view().state, ConnectionState::Connecting);

        assert!(feed.handle(event(1, TransportEvent::Opened)));
        assert_eq!(feed.view().state, ConnectionState::Connected);
        assert_eq!(feed.view().selection, &Selection::from_id("sensor-2"));
        assert_eq!(wire.borrow().intents(), vec![subscribe("sensor-2")]);
    }

    #[test]
    fn close_from_live_connection_disconnects() {
        let (mut feed, wire) = connected();
        feed.select("sensor-1");

        assert!(feed.handle(event(1, TransportEvent::Closed)));
        assert_eq!(feed.view().state, ConnectionState::Disconnected);
        assert_eq!(feed.disconnect(), None);
        assert_eq!(wire.borrow().opened, vec![1]);

        // sending with nothing open is logged and dropped
        assert!(feed.select("sensor-2"));
        assert_eq!(wire.borrow().sent.len(), 3);

        feed.reconnect();
        assert_eq!(feed.view().state, ConnectionState::Connecting);
        feed.handle(event(2, TransportEvent::Opened));
        assert_eq!(wire.borrow().opened, vec![1, 2]);
        assert_eq!(
            wire.borrow().sent.last(),
            Some(&(2, subscribe_json("sensor-2")))
        );
    }

    #[test]
    fn disconnect_unsubscribes_then_closes() {
        let (mut feed, wire) = connected();
        assert_eq!(feed.disconnect(), Some(1));

        assert_eq!(feed.view().state, ConnectionState::Disconnected);
        assert_eq!(wire.borrow().intents(), vec![subscribe(""), unsubscribe("")]);
        assert_eq!(wire.borrow().closed, vec![1]);

        assert_eq!(feed.disconnect(), None);
        assert_eq!(wire.borrow().closed, vec![1]);
        assert_eq!(wire.borrow().sent.len(), 2);
    }

    #[test]
    fn stragglers_from_the_old_topic_are_kept() {
        let (mut feed, _wire) = connected();
        feed.select("sensor-2");
        feed.handle(event(1, reading("sensor-1", 18.0, "2024-01-01T10:06:00Z")));

        assert_eq!(feed.view().history.len(), 1);
        assert_eq!(feed.view().current.unwrap().sensor_id, "sensor-1");
    }

    #[test]
    fn history_holds_the_ten_newest_readings() {
        let (mut feed, _wire) = connected();
        for minute in 0..12 {
            let at = format!("2024-01-01T10:{:02}:00Z", minute);
            feed.handle(event(1, reading("sensor-1", minute as f64, &at)));
        }

        let view = feed.view();
        assert_eq!(view.history.len(), 10);
        assert_eq!(view.history.iter().next().unwrap().formatted_time, "10:02");
        assert_eq!(view.current.unwrap().formatted_time, "10:11");
    }

    #[test]
    fn dropping_the_feed_tears_down_the_connection() {
        let (feed, wire) = connected();
        drop(feed);

        assert_eq!(wire.borrow().intents(), vec![subscribe(""), unsubscribe("")]);
        assert_eq!(wire.borrow().closed, vec![1]);
    }
}
