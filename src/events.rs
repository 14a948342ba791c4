//! Callback surface between the link core and whatever presents it.
//!
//! The core never talks to a UI toolkit. Everything it wants to show goes
//! through an [`EventSink`]: tagged log lines, status field updates and the
//! outcome of each trial write.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Tag attached to every passthrough log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    /// Plain device chatter and link notices
    Info,
    /// Device lines mentioning a warning
    Warning,
    /// Device errors and link failures
    Error,
    /// Raw trial lines
    Data,
    /// Status updates and write confirmations
    Status,
    /// Commands sent to the device
    Command,
}

impl LogTag {
    /// Upper-case name used by the display layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Info => "INFO",
            LogTag::Warning => "WARNING",
            LogTag::Error => "ERROR",
            LogTag::Data => "DATA",
            LogTag::Status => "STATUS",
            LogTag::Command => "COMMAND",
        }
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of everything the link reports.
///
/// Called from both the foreground caller (commands, connect errors) and the
/// reader thread (routed lines), hence `Send + Sync`.
pub trait EventSink: Send + Sync {
    /// A line for the activity log.
    fn on_log_line(&self, text: &str, tag: LogTag);

    /// A parsed `STATUS:FIELD:VALUE` line.
    fn on_status_update(&self, field: &str, value: &str);

    /// Outcome of persisting one trial.
    fn on_data_logged(&self, success: bool);
}

/// Sink that forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_log_line(&self, text: &str, tag: LogTag) {
        match tag {
            LogTag::Error => error!(target: "carousel::device", tag = %tag, "{}", text),
            LogTag::Warning => warn!(target: "carousel::device", tag = %tag, "{}", text),
            _ => info!(target: "carousel::device", tag = %tag, "{}", text),
        }
    }

    fn on_status_update(&self, field: &str, value: &str) {
        debug!(target: "carousel::device", field, value, "status update");
    }

    fn on_data_logged(&self, success: bool) {
        debug!(target: "carousel::device", success, "trial write finished");
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// [`EventSink::on_log_line`]
    Log {
        /// Line text
        text: String,
        /// Tag it was reported with
        tag: LogTag,
    },
    /// [`EventSink::on_status_update`]
    Status {
        /// Status field name
        field: String,
        /// Reported value
        value: String,
    },
    /// [`EventSink::on_data_logged`]
    DataLogged(bool),
}

/// Thread-safe in-memory recorder of events.
///
/// Cloning shares the same history, so one clone can be handed to the link
/// while another is polled.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<LinkEvent>>>);

impl EventLog {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LinkEvent>> {
        // A panicking sink caller cannot leave the Vec half-updated
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: LinkEvent) {
        self.lock().push(event);
    }

    /// Snapshot of every event so far, oldest first.
    pub fn events(&self) -> Vec<LinkEvent> {
        self.lock().clone()
    }

    /// Removes and returns every event so far.
    pub fn drain(&self) -> Vec<LinkEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Log lines carrying `tag`, oldest first.
    pub fn lines_tagged(&self, tag: LogTag) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                LinkEvent::Log { text, tag: t } if *t == tag => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every `(field, value)` status update, oldest first.
    pub fn status_updates(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                LinkEvent::Status { field, value } => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Every trial write outcome, oldest first.
    pub fn data_results(&self) -> Vec<bool> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                LinkEvent::DataLogged(ok) => Some(*ok),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn on_log_line(&self, text: &str, tag: LogTag) {
        self.push(LinkEvent::Log {
            text: text.to_string(),
            tag,
        });
    }

    fn on_status_update(&self, field: &str, value: &str) {
        self.push(LinkEvent::Status {
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    fn on_data_logged(&self, success: bool) {
        self.push(LinkEvent::DataLogged(success));
    }
}
