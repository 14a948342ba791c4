//! # Carousel DAQ Core Library
//!
//! Host-side link to the rotating-carousel behavioural rig. The board speaks
//! a line-oriented text protocol over a serial port; this crate owns that
//! link, routes what the board says and records completed trials into a
//! per-day CSV file.
//!
//! ## Crate Structure
//!
//! - **`link`**: `CarouselLink`, the connection lifecycle and command sending.
//! - **`reader`**: The background thread that reads, frames and routes lines.
//! - **`framing`**: Byte stream to newline-delimited lines.
//! - **`protocol`**: Line classification (DATA / STATUS / ERROR / WARNING / INFO)
//!   and routing into the store and the event sink.
//! - **`command`**: The firmware's command vocabulary and wire encoding.
//! - **`transport`**: The `Transport` and `Connector` seams, the serial
//!   implementation, a scripted mock and port discovery.
//! - **`data`**: Trial records and the daily `TrialLog` store.
//! - **`events`**: The `EventSink` callback surface and in-memory recorder.
//! - **`config`**: Layered configuration via figment.
//! - **`logging`**: tracing-subscriber initialization.
//! - **`error`**: Error types shared across the crate.
//!
//! ## Example
//!
//! ```no_run
//! use carousel_daq::{CarouselConfig, CarouselLink, TracingSink, TrialLog};
//! use carousel_daq::transport::SerialConnector;
//! use std::sync::Arc;
//!
//! let config = CarouselConfig::load()?;
//! let store = Arc::new(TrialLog::from_config(&config.storage)?);
//! let mut link = CarouselLink::new(Arc::new(SerialConnector), store, Arc::new(TracingSink))
//!     .with_timings(config.serial.timings());
//!
//! link.connect("/dev/ttyACM0", config.serial.baud_rate)?;
//! link.send("home")?;
//! link.disconnect();
//! # Ok::<(), carousel_daq::error::CarouselError>(())
//! ```

pub mod command;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod framing;
pub mod link;
pub mod logging;
pub mod protocol;
pub mod reader;
pub mod transport;

pub use command::Command;
pub use config::{CarouselConfig, LinkTimings};
pub use data::{LogIdentity, TrialLog, TrialRecord};
pub use error::{AppResult, CarouselError};
pub use events::{EventLog, EventSink, LogTag, TracingSink};
pub use link::{CarouselLink, ConnectionState};
pub use reader::ReaderState;
