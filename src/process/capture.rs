//! Concurrent draining of child output pipes

use std::io::{self, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{trace, warn};

const CHUNK_SIZE: usize = 8192;

/// A reader thread copying one stream into a shared buffer.
///
/// The buffer is shared rather than returned from the thread so that whatever
/// was read so far can still be collected if the thread never reaches EOF.
pub(crate) struct StreamCapture {
    name: &'static str,
    buffer: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
    eof: bool,
}

impl StreamCapture {
    /// Start copying `stream`, keeping at most `limit` bytes.
    ///
    /// Past the limit the rest of the stream is still read and discarded so
    /// the writer never blocks, and a truncation marker is appended.
    pub(crate) fn spawn<R>(name: &'static str, stream: Option<R>, limit: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = mpsc::channel();

        match stream {
            Some(stream) => {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    drain(name, stream, &buffer, limit);
                    let _ = done_tx.send(());
                });
            }
            None => {
                let _ = done_tx.send(());
            }
        }

        Self {
            name,
            buffer,
            done,
            eof: false,
        }
    }

    /// Block until the stream reaches EOF, or `limit` passes.
    ///
    /// Returns whether EOF was reached. `None` waits without bound.
    pub(crate) fn wait(&mut self, limit: Option<Duration>) -> bool {
        if !self.eof {
            // A disconnected channel means the reader thread is gone too
            self.eof = match limit {
                Some(limit) => !matches!(
                    self.done.recv_timeout(limit),
                    Err(RecvTimeoutError::Timeout)
                ),
                None => {
                    let _ = self.done.recv();
                    true
                }
            };
        }
        self.eof
    }

    /// Wait up to `timeout` for EOF, then take everything captured so far.
    pub(crate) fn finish(mut self, timeout: Duration) -> Vec<u8> {
        if !self.wait(Some(timeout)) {
            warn!(
                stream = self.name,
                "output pipe still open after {}ms; returning partial capture",
                timeout.as_millis()
            );
        }
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buffer)
    }
}

fn drain<R: Read>(name: &'static str, mut stream: R, buffer: &Mutex<Vec<u8>>, limit: usize) {
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut kept = 0usize;
    let mut discarded = 0usize;
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let to_copy = n.min(limit - kept);
                if to_copy > 0 {
                    buffer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..to_copy]);
                    kept += to_copy;
                }
                discarded = discarded.saturating_add(n - to_copy);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(stream = name, error = %e, "error reading child output");
                break;
            }
        }
    }

    if discarded > 0 {
        warn!(stream = name, limit, discarded, "child output truncated");
        buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(truncation_marker(limit).as_bytes());
    }
    trace!(stream = name, "reached end of stream");
}

/// Appended to a capture that hit its size limit
pub(crate) fn truncation_marker(limit: usize) -> String {
    format!("\n[output truncated at {limit} bytes]")
}
