//! Live stream state: subscription, normalization and bounded history

pub mod connection;
pub mod history;
pub mod normalizer;
pub mod subscription;

pub use connection::LiveFeed;
pub use history::HistoryWindow;
pub use subscription::HistoryPolicy;

use crate::models::{ConnectionState, Sample, Selection};

/// Everything the presentation layer needs for one render
#[derive(Debug, Clone, Copy)]
pub struct DashboardView<'a> {
    pub state: ConnectionState,
    pub selection: &'a Selection,
    pub current: Option<&'a Sample>,
    pub history: &'a HistoryWindow,
}
