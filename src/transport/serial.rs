//! Serial transport for RS-232/USB-serial boards
//!
//! Wraps the `serialport` crate. The port is cloned once at open so the read
//! loop and command sends each own a handle and never wait on each other.

use super::{Connector, Transport};
use crate::error::{AppResult, CarouselError};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

const READ_CHUNK: usize = 1024;

/// Initial port timeout; replaced by each read's `max_wait`.
const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

struct ReadSide {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

/// An open serial port.
pub struct SerialTransport {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    port_name: String,
    baud_rate: u32,
    reader: Mutex<Option<ReadSide>>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    open: AtomicBool,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate`, 8N1.
    pub fn open(port_name: &str, baud_rate: u32) -> AppResult<Self> {
        let connect_err = |e: serialport::Error| CarouselError::Connect {
            port: port_name.to_string(),
            reason: e.to_string(),
        };

        let port = serialport::new(port_name, baud_rate)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(connect_err)?;
        let writer = port.try_clone().map_err(connect_err)?;

        debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);

        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            reader: Mutex::new(Some(ReadSide {
                port,
                timeout: OPEN_TIMEOUT,
            })),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        })
    }

    /// Name the port was opened with.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn reader(&self) -> MutexGuard<'_, Option<ReadSide>> {
        self.reader.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, Option<Box<dyn SerialPort>>> {
        self.writer.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Transport for SerialTransport {
    fn write(&self, bytes: &[u8]) -> AppResult<()> {
        let mut guard = self.writer();
        let port = guard.as_mut().ok_or(CarouselError::TransportClosed)?;
        port.write_all(bytes).map_err(CarouselError::Write)?;
        port.flush().map_err(CarouselError::Write)?;
        trace!("Wrote {} bytes to {}", bytes.len(), self.port_name);
        Ok(())
    }

    fn read_available(&self, max_wait: Duration) -> AppResult<Vec<u8>> {
        let mut guard = self.reader();
        let side = guard.as_mut().ok_or(CarouselError::TransportClosed)?;

        if side.timeout != max_wait {
            side.port
                .set_timeout(max_wait)
                .map_err(|e| CarouselError::Read(e.into()))?;
            side.timeout = max_wait;
        }

        let mut buffer = [0u8; READ_CHUNK];
        match side.port.read(&mut buffer) {
            Ok(n) => Ok(buffer[..n].to_vec()),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(CarouselError::Read(e)),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.writer().take();
            self.reader().take();
            debug!("Serial port '{}' closed", self.port_name);
        }
    }

    fn describe(&self) -> String {
        format!("SerialTransport({} @ {} baud)", self.port_name, self.baud_rate)
    }
}

/// Opens [`SerialTransport`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, port: &str, baud_rate: u32) -> AppResult<Arc<dyn Transport>> {
        Ok(Arc::new(SerialTransport::open(port, baud_rate)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_is_connect_error() {
        let result = SerialTransport::open("/dev/this-port-does-not-exist", 115_200);
        match result {
            Err(CarouselError::Connect { port, .. }) => {
                assert_eq!(port, "/dev/this-port-does-not-exist")
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opened a port that does not exist"),
        }
    }

    #[test]
    fn test_connector_reports_connect_error() {
        let result = SerialConnector.open("/dev/this-port-does-not-exist", 9600);
        assert!(matches!(result, Err(CarouselError::Connect { .. })));
    }
}
