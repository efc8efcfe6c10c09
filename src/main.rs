mod config;
mod console;
mod feed;
mod models;
mod stream;
mod utils;

use log::{error, info, warn};
use std::time::Duration;
use time::UtcOffset;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;

use config::{DashboardConfig, FeedSource};
use console::{parse_command, render, Command};
use feed::{wait_closed, Connector, FeedEvent, SyntheticConnector, WsConnector};
use stream::LiveFeed;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

async fn main_loop<C: Connector>(
    connector: C,
    config: &DashboardConfig,
    offset: UtcOffset,
    mut events: UnboundedReceiver<FeedEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting sensor dashboard");
    info!("Commands: select <all|sensor id>, reconnect, sensors, quit");

    let mut feed = LiveFeed::new(connector, config.history_policy, offset);
    feed.connect();
    render(&feed.view());

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if feed.handle(event) {
                    render(&feed.view());
                }
            }
            line = commands.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_command(&line, &config.sensors) {
                    Ok(Command::Select(sensor_id)) => {
                        if feed.select(&sensor_id) {
                            render(&feed.view());
                        }
                    }
                    Ok(Command::Reconnect) => {
                        feed.reconnect();
                        render(&feed.view());
                    }
                    Ok(Command::Sensors) => {
                        info!("Available sensors: all, {}", config.sensors.join(", "));
                    }
                    Ok(Command::Quit) => {
                        info!("Quit requested");
                        break;
                    }
                    Err(e) => warn!("{}", e),
                },
                Ok(None) => {
                    info!("Console input closed, still streaming (Ctrl+C to stop)");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    stdin_open = false;
                }
            },
            _ = &mut shutdown => {
                info!("Program terminated by user. Exiting gracefully.");
                break;
            }
        }
    }

    if let Some(epoch) = feed.disconnect() {
        // let the connection task deliver the unsubscribe and close frame
        if !wait_closed(&mut events, epoch, CLOSE_GRACE).await {
            warn!("Feed connection #{} did not close cleanly", epoch);
        }
    }
    Ok(())
}

// Single-threaded: the feed state machine handles one event at a time
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match DashboardConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    let offset = config.resolve_offset();

    // Handle Ctrl+C gracefully
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                // keep the sender alive so shutdown only comes from 'quit'
                let _tx = tx;
                std::future::pending::<()>().await;
            }
        }
    });

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let result = match config.source.clone() {
        FeedSource::Live(url) => {
            let connector = WsConnector::new(url, events_tx);
            main_loop(connector, &config, offset, events_rx, rx).await
        }
        FeedSource::Synthetic { interval } => {
            warn!("Using synthetic readings, no live feed is contacted");
            let connector = SyntheticConnector::new(config.sensors.clone(), interval, events_tx);
            main_loop(connector, &config, offset, events_rx, rx).await
        }
    };

    match result {
        Ok(_) => info!("Program completed successfully"),
        Err(e) => error!("Fatal error: {}", e),
    }

    Ok(())
}
