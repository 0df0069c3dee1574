//! Status reporting.
//!
//! The status widget is a dumb sink: it receives a label and a presentation
//! hint and keeps nothing else. The scanner owns every decision about what to
//! show and when.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Paused,
    Idle,
    Sending,
    Synced,
    ErrBackend,
    ErrConnect,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Paused => "Paused",
            Status::Idle => "Idle",
            Status::Sending => "Sending...",
            Status::Synced => "Synced",
            Status::ErrBackend => "Err: Backend",
            Status::ErrConnect => "Err: Connect",
        }
    }

    /// The hint a widget would normally pair with this status
    pub fn default_hint(&self) -> StatusHint {
        match self {
            Status::Paused => StatusHint::Muted,
            Status::Idle => StatusHint::Neutral,
            Status::Sending => StatusHint::Busy,
            Status::Synced => StatusHint::Ok,
            Status::ErrBackend | Status::ErrConnect => StatusHint::Error,
        }
    }
}

/// Presentation hint for a status (a colour in a graphical widget)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusHint {
    Muted,
    Neutral,
    Busy,
    Ok,
    Error,
}

/// Receiver of status updates
pub trait StatusSink: Send {
    fn report(&mut self, status: Status, hint: StatusHint);
}

/// Sink that writes status changes to the log
#[derive(Debug, Default)]
pub struct LogStatusSink {
    last: Option<Status>,
}

impl LogStatusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusSink for LogStatusSink {
    fn report(&mut self, status: Status, hint: StatusHint) {
        if self.last == Some(status) {
            return;
        }
        self.last = Some(status);
        info!(status = status.label(), hint = ?hint, "Status");
    }
}

/// Sink that keeps every update it receives, shareable across owners
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    updates: Arc<Mutex<Vec<(Status, StatusHint)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.updates
            .lock()
            .map(|updates| updates.iter().map(|(status, _)| *status).collect())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Status> {
        self.statuses().last().copied()
    }
}

impl StatusSink for RecordingSink {
    fn report(&mut self, status: Status, hint: StatusHint) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((status, hint));
        }
    }
}

/// Screen corner the status widget is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    #[default]
    BottomRight,
    BottomLeft,
    TopLeft,
    TopRight,
}

impl Corner {
    /// Corner index, 0..=3
    pub fn index(&self) -> u8 {
        match self {
            Corner::BottomRight => 0,
            Corner::BottomLeft => 1,
            Corner::TopLeft => 2,
            Corner::TopRight => 3,
        }
    }

    pub fn from_index(index: u8) -> Self {
        match index % 4 {
            0 => Corner::BottomRight,
            1 => Corner::BottomLeft,
            2 => Corner::TopLeft,
            _ => Corner::TopRight,
        }
    }

    /// The next corner in the reposition cycle
    pub fn next(&self) -> Self {
        Self::from_index(self.index() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        let labels: Vec<_> = [
            Status::Paused,
            Status::Idle,
            Status::Sending,
            Status::Synced,
            Status::ErrBackend,
            Status::ErrConnect,
        ]
        .iter()
        .map(|s| s.label())
        .collect();

        assert_eq!(
            labels,
            vec!["Paused", "Idle", "Sending...", "Synced", "Err: Backend", "Err: Connect"]
        );
    }

    #[test]
    fn test_corner_cycle() {
        let mut corner = Corner::default();
        let mut seen = vec![corner];
        for _ in 0..4 {
            corner = corner.next();
            seen.push(corner);
        }

        assert_eq!(
            seen,
            vec![
                Corner::BottomRight,
                Corner::BottomLeft,
                Corner::TopLeft,
                Corner::TopRight,
                Corner::BottomRight,
            ]
        );
    }

    #[test]
    fn test_corner_parses_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            corner: Corner,
        }
        let parsed: Wrapper = toml::from_str(r#"corner = "top-left""#).unwrap();
        assert_eq!(parsed.corner, Corner::TopLeft);
    }

    #[test]
    fn test_recording_sink_shares_updates() {
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        writer.report(Status::Idle, StatusHint::Neutral);
        writer.report(Status::Sending, StatusHint::Busy);

        assert_eq!(sink.statuses(), vec![Status::Idle, Status::Sending]);
        assert_eq!(sink.last(), Some(Status::Sending));
    }
}
