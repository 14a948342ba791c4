//! Connection lifecycle and command sending.
//!
//! [`CarouselLink`] is the foreground face of the core. It owns the
//! connection state, the open transport and the reader thread, and exposes
//! the queries a front-end needs about the trial store.
//!
//! `connect` and `disconnect` take `&mut self`, so they cannot race each
//! other; `send` takes `&self` and may run while the reader is active.
//! Disconnect always stops the reader before closing the transport.

use crate::command::{encode, Command};
use crate::config::LinkTimings;
use crate::data::{LogIdentity, TrialLog};
use crate::error::{AppResult, CarouselError};
use crate::events::{EventSink, LogTag};
use crate::protocol::Router;
use crate::reader::{ReaderState, ReaderTask};
use crate::transport::{Connector, Transport};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Where the link is in its connect/disconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No open port
    Disconnected,
    /// Opening the port and waiting for the board
    Connecting,
    /// Port open and reader started
    Connected,
}

struct Session {
    port: String,
    transport: Arc<dyn Transport>,
    reader: ReaderTask,
}

/// Owns one connection to the carousel and everything attached to it.
pub struct CarouselLink {
    connector: Arc<dyn Connector>,
    store: Arc<TrialLog>,
    sink: Arc<dyn EventSink>,
    timings: LinkTimings,
    state: ConnectionState,
    session: Option<Session>,
}

impl std::fmt::Debug for CarouselLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarouselLink")
            .field("state", &self.state)
            .field("port", &self.port())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CarouselLink {
    /// Disconnected link using the default timings.
    pub fn new(
        connector: Arc<dyn Connector>,
        store: Arc<TrialLog>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            connector,
            store,
            sink,
            timings: LinkTimings::default(),
            state: ConnectionState::Disconnected,
            session: None,
        }
    }

    /// Replace the connect, read and stop timings.
    pub fn with_timings(mut self, timings: LinkTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Open `port`, wait for the board to come out of reset, start reading.
    ///
    /// Blocks for the settle delay. On failure the state stays
    /// `Disconnected` and the error is also reported to the sink. Connecting
    /// while connected closes the current session first.
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> AppResult<()> {
        if self.session.is_some() {
            self.disconnect();
        }

        self.state = ConnectionState::Connecting;
        info!("Connecting to {} at {} baud", port, baud_rate);

        let transport = match self.connector.open(port, baud_rate) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                warn!("Connection to {} failed: {}", port, e);
                self.sink
                    .on_log_line(&format!("Connection error: {}", e), LogTag::Error);
                return Err(e);
            }
        };

        if !self.timings.settle.is_zero() {
            debug!("Waiting {:?} for board reset", self.timings.settle);
            thread::sleep(self.timings.settle);
        }

        let router = Router::new(self.store.clone(), self.sink.clone());
        let reader = match ReaderTask::start(
            transport.clone(),
            router,
            self.sink.clone(),
            self.timings,
        ) {
            Ok(reader) => reader,
            Err(e) => {
                transport.close();
                self.state = ConnectionState::Disconnected;
                self.sink
                    .on_log_line(&format!("Connection error: {}", e), LogTag::Error);
                return Err(e);
            }
        };

        info!("Connected via {}", transport.describe());
        self.session = Some(Session {
            port: port.to_string(),
            transport,
            reader,
        });
        self.state = ConnectionState::Connected;
        self.sink
            .on_log_line(&format!("Connected to {}", port), LogTag::Info);
        Ok(())
    }

    /// Stop the reader, then close the transport. Safe when not connected.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if !session.reader.stop(self.timings.stop_timeout) {
                warn!("Closing {} with the reader still running", session.port);
            }
            session.transport.close();
            info!("Disconnected from {}", session.port);
            self.sink.on_log_line(
                &format!("Disconnected from {}", session.port),
                LogTag::Info,
            );
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Send `command` followed by a newline.
    ///
    /// Any text is accepted; see [`Command`] for what the firmware knows.
    pub fn send(&self, command: &str) -> AppResult<()> {
        let session = match (&self.session, self.state) {
            (Some(session), ConnectionState::Connected) => session,
            _ => {
                self.sink
                    .on_log_line("Not connected to device", LogTag::Error);
                return Err(CarouselError::NotConnected);
            }
        };

        if let Err(e) = session.transport.write(&encode(command)) {
            warn!("Send of '{}' failed: {}", command, e);
            self.sink
                .on_log_line(&format!("Send error: {}", e), LogTag::Error);
            return Err(e);
        }

        debug!("Sent command '{}'", command);
        self.sink.on_log_line(command, LogTag::Command);
        Ok(())
    }

    /// Send a known [`Command`].
    pub fn send_command(&self, command: Command) -> AppResult<()> {
        self.send(&command.to_string())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the state is [`ConnectionState::Connected`].
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// State of the current session's reader; `Stopped` when there is none.
    pub fn reader_state(&self) -> ReaderState {
        self.session
            .as_ref()
            .map_or(ReaderState::Stopped, |s| s.reader.state())
    }

    /// Port of the current session.
    pub fn port(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.port.as_str())
    }

    /// Whether the transport of the current session is still open.
    pub fn is_open(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.transport.is_open())
    }

    /// The trial store fed by the reader.
    pub fn store(&self) -> &Arc<TrialLog> {
        &self.store
    }

    /// Today's store file.
    pub fn current_identity(&self) -> LogIdentity {
        self.store.current_identity()
    }

    /// Trials in today's store.
    pub fn trial_count(&self) -> usize {
        self.store.trial_count()
    }

    /// Folder holding the daily stores.
    pub fn data_folder(&self) -> &Path {
        self.store.data_folder()
    }
}

impl Drop for CarouselLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::transport::{MockConnector, MockTransport};
    use tempfile::TempDir;

    fn link() -> (CarouselLink, Arc<MockTransport>, EventLog, TempDir) {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::new().strict());
        let events = EventLog::new();
        let store = Arc::new(TrialLog::open(dir.path()).unwrap());
        let link = CarouselLink::new(
            Arc::new(MockConnector::new(mock.clone())),
            store,
            Arc::new(events.clone()),
        )
        .with_timings(LinkTimings::immediate());
        (link, mock, events, dir)
    }

    #[test]
    fn test_send_while_disconnected_never_touches_transport() {
        let (link, mock, events, _dir) = link();
        assert!(matches!(link.send("home"), Err(CarouselError::NotConnected)));
        assert_eq!(mock.write_calls(), 0);
        assert_eq!(
            events.lines_tagged(LogTag::Error),
            vec!["Not connected to device"]
        );
    }

    #[test]
    fn test_send_writes_terminated_command_and_echoes_it() {
        let (mut link, mock, events, _dir) = link();
        link.connect("/dev/ttyACM0", 115_200).unwrap();

        link.send("home").unwrap();
        link.send_command(Command::Position(7)).unwrap();

        assert_eq!(mock.written_text(), vec!["home\n", "p7\n"]);
        assert_eq!(events.lines_tagged(LogTag::Command), vec!["home", "p7"]);
        link.disconnect();
    }

    #[test]
    fn test_write_failure_is_reported() {
        let (mut link, mock, events, _dir) = link();
        link.connect("/dev/ttyACM0", 115_200).unwrap();
        mock.fail_next_write();

        assert!(matches!(link.send("stop"), Err(CarouselError::Write(_))));
        assert!(events
            .lines_tagged(LogTag::Error)
            .iter()
            .any(|line| line.starts_with("Send error")));
        assert!(events.lines_tagged(LogTag::Command).is_empty());
    }

    #[test]
    fn test_connect_disconnect_cycle() {
        let (mut link, mock, _events, _dir) = link();
        assert_eq!(link.state(), ConnectionState::Disconnected);

        link.connect("/dev/ttyACM0", 115_200).unwrap();
        assert_eq!(link.state(), ConnectionState::Connected);
        assert_eq!(link.reader_state(), ReaderState::Running);
        assert_eq!(link.port(), Some("/dev/ttyACM0"));

        link.disconnect();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.reader_state(), ReaderState::Stopped);
        assert!(!mock.is_open());
        assert_eq!(mock.reads_after_close(), 0);

        // Disconnect twice is harmless
        link.disconnect();
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_failed_connect_stays_disconnected() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockTransport::new());
        let connector = Arc::new(MockConnector::new(mock.clone()));
        connector.fail_next_open("Device or resource busy");
        let events = EventLog::new();
        let mut link = CarouselLink::new(
            connector,
            Arc::new(TrialLog::open(dir.path()).unwrap()),
            Arc::new(events.clone()),
        )
        .with_timings(LinkTimings::immediate());

        let result = link.connect("/dev/ttyACM0", 115_200);
        assert!(matches!(result, Err(CarouselError::Connect { .. })));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.reader_state(), ReaderState::Stopped);
        assert!(events.lines_tagged(LogTag::Error)[0].contains("busy"));
        assert!(link.send("home").is_err());
        assert_eq!(mock.write_calls(), 0);
    }
}
