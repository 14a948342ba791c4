//! Byte-stream transports to the carousel controller.
//!
//! A [`Transport`] is one open connection: independent read and write sides,
//! a bounded blocking read, and an idempotent close. A [`Connector`] opens
//! transports by port name so the link can be driven by real hardware
//! ([`SerialConnector`]) or by the scripted [`MockTransport`].

use crate::error::AppResult;
use std::sync::Arc;
use std::time::Duration;

pub mod discovery;
pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial;

pub use discovery::{available_ports, detect_device, PortDescriptor};
pub use mock::{MockConnector, MockTransport};
#[cfg(feature = "instrument_serial")]
pub use serial::{SerialConnector, SerialTransport};

/// An open byte-stream connection.
///
/// Reads and writes may happen concurrently from different threads; the two
/// directions must not block each other.
pub trait Transport: Send + Sync {
    /// Write all of `bytes`.
    fn write(&self, bytes: &[u8]) -> AppResult<()>;

    /// Return whatever arrived within `max_wait`; empty on timeout.
    fn read_available(&self, max_wait: Duration) -> AppResult<Vec<u8>>;

    /// Whether the connection is still usable.
    fn is_open(&self) -> bool;

    /// Close the connection. Safe to call more than once.
    fn close(&self);

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

/// Opens transports by port name.
pub trait Connector: Send + Sync {
    /// Open `port` at `baud_rate`.
    fn open(&self, port: &str, baud_rate: u32) -> AppResult<Arc<dyn Transport>>;
}
