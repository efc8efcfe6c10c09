use log::info;
use std::str::FromStr;

use crate::models::{Intent, Selection};
use crate::stream::history::HistoryWindow;

/// What happens to already-charted samples when the selection changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPolicy {
    /// Start the window over for the new scope
    #[default]
    Reset,
    /// Keep the samples that belong to the new scope
    Retain,
}

impl FromStr for HistoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(HistoryPolicy::Reset),
            "retain" => Ok(HistoryPolicy::Retain),
            other => Err(format!(
                "unknown history policy '{}', expected 'reset' or 'retain'",
                other
            )),
        }
    }
}

/// Tracks the active selection and decides which intents a change needs
#[derive(Debug, Default)]
pub struct SubscriptionController {
    selection: Selection,
    policy: HistoryPolicy,
}

impl SubscriptionController {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            selection: Selection::All,
            policy,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Intent that restores the active selection on a fresh connection
    pub fn resubscribe(&self) -> Intent {
        Intent::subscribe(&self.selection)
    }

    /// Intent that withdraws the active selection before teardown
    pub fn withdraw(&self) -> Intent {
        Intent::unsubscribe(&self.selection)
    }

    /// Switch to `selection`. Returns `None` when it is already active.
    /// Otherwise returns the intents to send, in order, which are empty
    /// when there is no live connection to send them on.
    pub fn select(
        &mut self,
        selection: Selection,
        connected: bool,
        history: &mut HistoryWindow,
    ) -> Option<Vec<Intent>> {
        if selection == self.selection {
            return None;
        }

        let intents = if connected {
            vec![
                Intent::unsubscribe(&self.selection),
                Intent::subscribe(&selection),
            ]
        } else {
            Vec::new()
        };

        info!("Selection changed: {} -> {}", self.selection, selection);
        self.selection = selection;

        match (self.policy, &self.selection) {
            (HistoryPolicy::Retain, Selection::Sensor(id)) => {
                *history = history.filter_by_sensor(id);
            }
            (HistoryPolicy::Retain, Selection::All) => {}
            (HistoryPolicy::Reset, _) => history.reset(),
        }

        Some(intents)
    }
}
