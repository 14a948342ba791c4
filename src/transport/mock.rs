//! Mock transport for testing
//!
//! Lets the link run without a board attached. It provides:
//! - Scripted inbound chunks, delivered one per read
//! - Injectable read and write failures
//! - A write log and call counters for test verification
//! - A strict mode that panics on any read after close

use super::{Connector, Transport};
use crate::error::{AppResult, CarouselError};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
enum Inbound {
    Bytes(Vec<u8>),
    Failure(String),
}

/// Scripted in-memory transport.
///
/// # Example
///
/// ```
/// use carousel_daq::transport::{MockTransport, Transport};
/// use std::time::Duration;
///
/// let mock = MockTransport::new();
/// mock.push_line("STATUS:MOUSE:IDLE");
/// let bytes = mock.read_available(Duration::from_millis(1)).unwrap();
/// assert_eq!(bytes, b"STATUS:MOUSE:IDLE\n");
/// ```
#[derive(Debug)]
pub struct MockTransport {
    inbound: Mutex<VecDeque<Inbound>>,
    writes: Mutex<Vec<Vec<u8>>>,
    open: AtomicBool,
    strict: bool,
    close_when_drained: AtomicBool,
    fail_next_write: AtomicBool,
    read_calls: AtomicUsize,
    write_calls: AtomicUsize,
    reads_after_close: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create an open mock with nothing queued
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
            strict: false,
            close_when_drained: AtomicBool::new(false),
            fail_next_write: AtomicBool::new(false),
            read_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            reads_after_close: AtomicUsize::new(0),
        }
    }

    /// Panic on any read attempted after [`Transport::close`].
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Queue raw bytes; one queued chunk is returned per read.
    pub fn push_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.queue().push_back(Inbound::Bytes(bytes.into()));
    }

    /// Queue `line` followed by `\n`.
    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{}\n", line));
    }

    /// Make one future read fail with `message`.
    pub fn push_read_failure(&self, message: &str) {
        self.queue()
            .push_back(Inbound::Failure(message.to_string()));
    }

    /// Close by itself once every queued chunk has been read, like an unplugged board.
    pub fn close_when_drained(&self) {
        self.close_when_drained.store(true, Ordering::SeqCst);
    }

    /// Fail the next write.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Re-open after a close, keeping counters and the write log.
    pub fn reopen(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Every successful write, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Successful writes decoded as text.
    pub fn written_text(&self) -> Vec<String> {
        self.written()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Reads attempted so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Attempted writes, including failed ones.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Reads attempted after close; non-zero means the caller ignored close.
    pub fn reads_after_close(&self) -> usize {
        self.reads_after_close.load(Ordering::SeqCst)
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Inbound>> {
        self.inbound.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Transport for MockTransport {
    fn write(&self, bytes: &[u8]) -> AppResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_open() {
            return Err(CarouselError::TransportClosed);
        }
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(CarouselError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        self.writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(bytes.to_vec());
        Ok(())
    }

    #[allow(clippy::panic)]
    fn read_available(&self, max_wait: Duration) -> AppResult<Vec<u8>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_open() {
            self.reads_after_close.fetch_add(1, Ordering::SeqCst);
            if self.strict {
                panic!("MockTransport read after close");
            }
            return Err(CarouselError::TransportClosed);
        }

        let next = self.queue().pop_front();
        match next {
            Some(Inbound::Bytes(bytes)) => Ok(bytes),
            Some(Inbound::Failure(message)) => Err(CarouselError::Read(io::Error::new(
                io::ErrorKind::Other,
                message,
            ))),
            None => {
                if self.close_when_drained.load(Ordering::SeqCst) {
                    self.close();
                } else {
                    // Behave like a port timeout
                    std::thread::sleep(max_wait);
                }
                Ok(Vec::new())
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "MockTransport".to_string()
    }
}

/// Connector that hands out one shared [`MockTransport`].
#[derive(Debug)]
pub struct MockConnector {
    transport: Arc<MockTransport>,
    fail_with: Mutex<Option<String>>,
    opened: Mutex<Vec<(String, u32)>>,
}

impl MockConnector {
    /// Connector whose every open returns `transport`.
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport,
            fail_with: Mutex::new(None),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Make the next open fail with `reason`, as if the port were busy.
    pub fn fail_next_open(&self, reason: &str) {
        *self.fail_with.lock().unwrap_or_else(|p| p.into_inner()) = Some(reason.to_string());
    }

    /// Every successful `(port, baud_rate)` open, in order.
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// The transport handed out by open.
    pub fn transport(&self) -> &Arc<MockTransport> {
        &self.transport
    }
}

impl Connector for MockConnector {
    fn open(&self, port: &str, baud_rate: u32) -> AppResult<Arc<dyn Transport>> {
        if let Some(reason) = self
            .fail_with
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            return Err(CarouselError::Connect {
                port: port.to_string(),
                reason,
            });
        }
        self.transport.reopen();
        self.opened
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((port.to_string(), baud_rate));
        Ok(self.transport.clone())
    }
}
