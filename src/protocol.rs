//! Line classification and routing for the device protocol.
//!
//! Every framed line is classified by prefix, first match wins:
//!
//! | Line | Kind | Handling |
//! |---|---|---|
//! | starts with `DATA,` | [`LineKind::Data`] | parsed and appended to the trial store |
//! | starts with `STATUS:` | [`LineKind::Status`] | parsed into a [`StatusUpdate`] |
//! | starts with `ERROR:` | [`LineKind::Error`] | passed through |
//! | contains `WARNING` or U+26A0 | [`LineKind::Warning`] | passed through |
//! | anything else | [`LineKind::Info`] | passed through |
//!
//! Routing never fails. A DATA or STATUS line that does not parse is
//! reported as an ERROR line and the next line is handled normally.

use crate::data::TrialLog;
use crate::error::StatusParseError;
use crate::events::{EventSink, LogTag};
use std::sync::Arc;
use tracing::{debug, warn};

/// Start of a trial line.
pub const DATA_PREFIX: &str = "DATA,";
/// Start of a status update.
pub const STATUS_PREFIX: &str = "STATUS:";
/// Start of a device error.
pub const ERROR_PREFIX: &str = "ERROR:";
/// Anywhere in a line, marks it as a warning.
pub const WARNING_MARKER: &str = "WARNING";
/// The warning sign, also marks a warning.
pub const WARNING_GLYPH: char = '\u{26A0}';

/// Classification of one line from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// `DATA,...`
    Data,
    /// `STATUS:...`
    Status,
    /// `ERROR:...`
    Error,
    /// Contains `WARNING` or the warning sign
    Warning,
    /// Anything else
    Info,
}

impl LineKind {
    /// Tag used when the raw line is passed through.
    pub fn tag(self) -> LogTag {
        match self {
            LineKind::Data => LogTag::Data,
            LineKind::Status => LogTag::Status,
            LineKind::Error => LogTag::Error,
            LineKind::Warning => LogTag::Warning,
            LineKind::Info => LogTag::Info,
        }
    }
}

/// Kind of `line`, by the precedence in the module docs.
pub fn classify(line: &str) -> LineKind {
    if line.starts_with(DATA_PREFIX) {
        LineKind::Data
    } else if line.starts_with(STATUS_PREFIX) {
        LineKind::Status
    } else if line.starts_with(ERROR_PREFIX) {
        LineKind::Error
    } else if line.contains(WARNING_MARKER) || line.contains(WARNING_GLYPH) {
        LineKind::Warning
    } else {
        LineKind::Info
    }
}

/// `STATUS:FIELD:VALUE`, e.g. `STATUS:MAGNET:ON_MAGNET`.
///
/// Field names are not interpreted; MAGNET, MOUSE and POSITION are what the
/// current firmware sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Field name, e.g. `MAGNET`
    pub field: String,
    /// Reported value, e.g. `ON_MAGNET`
    pub value: String,
}

impl StatusUpdate {
    /// Split a full `STATUS:FIELD:VALUE` line.
    pub fn parse(line: &str) -> Result<Self, StatusParseError> {
        let parts: Vec<&str> = line.split(':').collect();
        match parts.as_slice() {
            [_, field, value] => Ok(Self {
                field: (*field).to_string(),
                value: (*value).to_string(),
            }),
            _ => Err(StatusParseError::PartCount { found: parts.len() }),
        }
    }
}

/// Dispatches framed lines to the trial store and the event sink.
pub struct Router {
    store: Arc<TrialLog>,
    sink: Arc<dyn EventSink>,
}

impl Router {
    /// Router writing trials to `store` and reporting to `sink`.
    pub fn new(store: Arc<TrialLog>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// Handle one framed line, then mirror it to the sink with its tag.
    pub fn route(&self, line: &str) {
        let kind = classify(line);
        debug!(kind = ?kind, "{}", line);

        match kind {
            LineKind::Data => self.handle_data(line),
            LineKind::Status => self.handle_status(line),
            LineKind::Error | LineKind::Warning | LineKind::Info => {}
        }
        self.sink.on_log_line(line, kind.tag());
    }

    fn handle_data(&self, line: &str) {
        let record = match self.store.parse_line(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Rejected data packet '{}': {}", line, e);
                self.sink
                    .on_log_line(&format!("Invalid DATA packet ({}): {}", e, line), LogTag::Error);
                self.sink.on_data_logged(false);
                return;
            }
        };

        match self.store.append(&record) {
            Ok(()) => {
                self.sink.on_data_logged(true);
                self.sink
                    .on_log_line("Data logged successfully", LogTag::Status);
            }
            Err(e) => {
                // Not retried: the trial is only in the passthrough log from here on
                warn!(trial = record.trial, "Failed to log trial: {}", e);
                self.sink.on_log_line(
                    &format!("Failed to log trial {}: {}", record.trial, e),
                    LogTag::Error,
                );
                self.sink.on_data_logged(false);
            }
        }
    }

    fn handle_status(&self, line: &str) {
        match StatusUpdate::parse(line) {
            Ok(update) => self.sink.on_status_update(&update.field, &update.value),
            Err(e) => {
                warn!("Malformed status update '{}': {}", line, e);
                self.sink.on_log_line(
                    &format!("Malformed status update ({}): {}", e, line),
                    LogTag::Error,
                );
            }
        }
    }
}
