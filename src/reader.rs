//! Background read loop.
//!
//! One dedicated thread per connection reads from the transport, frames the
//! bytes into lines and routes each line. It never touches the write side,
//! so command sends are never blocked by it.
//!
//! The loop ends when [`ReaderTask::stop`] is requested or the transport
//! reports closed. Read errors are reported and the loop keeps going.

use crate::config::LinkTimings;
use crate::error::{AppResult, CarouselError};
use crate::events::{EventSink, LogTag};
use crate::framing::LineFramer;
use crate::protocol::Router;
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

const THREAD_NAME: &str = "carousel-reader";

/// Whether the read loop is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// The loop has exited, or was never started
    Stopped,
    /// The loop is reading from the transport
    Running,
}

/// Handle to the running read loop.
#[derive(Debug)]
pub struct ReaderTask {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    exited: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

/// Marks the loop as finished even if routing panics.
struct ExitSignal {
    running: Arc<AtomicBool>,
    exited: mpsc::Sender<()>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.exited.send(());
    }
}

impl ReaderTask {
    /// Spawn the read loop over `transport`.
    pub fn start(
        transport: Arc<dyn Transport>,
        router: Router,
        sink: Arc<dyn EventSink>,
        timings: LinkTimings,
    ) -> AppResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let (exit_tx, exit_rx) = mpsc::channel();

        let signal = ExitSignal {
            running: running.clone(),
            exited: exit_tx,
        };
        let loop_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let _signal = signal;
                read_loop(transport.as_ref(), &router, sink.as_ref(), &loop_stop, timings);
            })
            .map_err(CarouselError::Io)?;

        debug!("Reader thread started");
        Ok(Self {
            stop,
            running,
            exited: exit_rx,
            handle: Some(handle),
            stop_timeout: timings.stop_timeout,
        })
    }

    /// Current state of the loop.
    pub fn state(&self) -> ReaderState {
        if self.running.load(Ordering::SeqCst) {
            ReaderState::Running
        } else {
            ReaderState::Stopped
        }
    }

    /// Ask the loop to exit and wait up to `timeout` for it.
    ///
    /// Returns `false` if the loop was still running when the wait ran out.
    /// The thread is joined only once its exit is confirmed, so a later call
    /// waits again instead of assuming it is gone.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.is_none() {
            return true;
        }

        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!("Reader thread panicked");
                    }
                }
                debug!("Reader thread stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Reader thread did not stop within {:?}", timeout);
                false
            }
        }
    }
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.stop(self.stop_timeout);
    }
}

fn read_loop(
    transport: &dyn Transport,
    router: &Router,
    sink: &dyn EventSink,
    stop: &AtomicBool,
    timings: LinkTimings,
) {
    let mut framer = LineFramer::new();

    while !stop.load(Ordering::SeqCst) && transport.is_open() {
        match transport.read_available(timings.read_wait) {
            Ok(bytes) if bytes.is_empty() => thread::sleep(timings.idle_delay),
            Ok(bytes) => {
                for line in framer.feed(&bytes) {
                    router.route(&line);
                }
            }
            Err(CarouselError::TransportClosed) => break,
            Err(e) => {
                warn!("Read error: {}", e);
                sink.on_log_line(&format!("Read error: {}", e), LogTag::Error);
                thread::sleep(timings.error_backoff);
            }
        }
    }

    if framer.pending() > 0 {
        debug!("Discarding {} unterminated bytes", framer.pending());
    }
    info!("Reader loop exited");
}
