//! Custom error types for the carousel link.
//!
//! Every failure in the core degrades to a reported event; nothing here is
//! meant to take the process down. Using `thiserror`, each concern gets its
//! own enum so callers can match on what actually went wrong:
//!
//! - **`CarouselError`**: connection, command and configuration failures seen by
//!   the foreground caller (connect, disconnect, send, config loading).
//! - **`ParseError`**: a `DATA,...` line that does not describe a trial.
//! - **`StatusParseError`**: a `STATUS:...` line without exactly three parts.
//! - **`LogError`**: the daily trial store could not be read or written.
//!
//! By using `#[from]`, lower-level errors convert with the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CarouselError>;

/// Failures seen by the foreground caller of the link.
#[derive(Error, Debug)]
pub enum CarouselError {
    /// The port could not be opened
    #[error("Failed to open serial port '{port}': {reason}")]
    Connect {
        /// Port name as given to connect
        port: String,
        /// Message from the serial layer
        reason: String,
    },

    /// A command was sent without an open connection
    #[error("Not connected to device")]
    NotConnected,

    /// Writing a command failed
    #[error("Serial write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Reading from the port failed; the reader reports it and keeps going
    #[error("Serial read failed: {0}")]
    Read(#[source] std::io::Error),

    /// The transport was used after close
    #[error("Serial port is closed")]
    TransportClosed,

    /// Built without the `instrument_serial` feature
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// Configuration could not be extracted
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Any other I/O failure, e.g. spawning the reader thread
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The trial store failed
    #[error("Trial log error: {0}")]
    Log(#[from] LogError),
}

/// Rejection of a `DATA,Trial,Position,EntryTime,ExitTime,DwellTime,Event` line.
///
/// No partial record is ever produced; the whole line is dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Wrong number of comma-separated fields
    #[error("expected {expected} comma-separated fields, found {found}")]
    FieldCount {
        /// Fields a DATA line must have
        expected: usize,
        /// Fields actually present
        found: usize,
    },

    /// The line does not start with `DATA`
    #[error("first field must be DATA, found '{0}'")]
    NotData(String),

    /// A numeric field did not parse
    #[error("invalid {field} value '{value}'")]
    InvalidField {
        /// Column name of the field
        field: &'static str,
        /// Raw text of the field
        value: String,
    },
}

/// Rejection of a `STATUS:FIELD:VALUE` line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusParseError {
    /// Not exactly three colon-separated parts
    #[error("expected STATUS:FIELD:VALUE, found {found} colon-separated parts")]
    PartCount {
        /// Parts actually present
        found: usize,
    },
}

/// Failures of the daily trial store.
#[derive(Error, Debug)]
pub enum LogError {
    /// The data folder could not be created or resolved
    #[error("Failed to create data folder '{}': {source}", path.display())]
    CreateFolder {
        /// Folder that was requested
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The day's file exists but is not a trial store
    #[error("Trial store '{}' is unreadable: {reason}", path.display())]
    CorruptStore {
        /// The offending file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Writing CSV failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File system failure while rewriting the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
