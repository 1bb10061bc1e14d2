//! Output interception
//!
//! The engine's output streams are written through an [`OutputSink`]. While
//! a [`CaptureGuard`] is alive the sink appends to the shared
//! [`OutputBuffer`]; otherwise it writes to the original destination.
//! Dropping the guard restores the original destination, on every exit
//! path.

mod buffer;

pub use buffer::OutputBuffer;

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, Result};

struct Destination {
    capturing: bool,
    original: Box<dyn Write + Send>,
}

/// Redirects engine output into a buffer for the duration of a session
#[derive(Clone)]
pub struct OutputInterceptor {
    buffer: Arc<OutputBuffer>,
    destination: Arc<Mutex<Destination>>,
}

impl std::fmt::Debug for OutputInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputInterceptor")
            .field("capturing", &self.is_capturing())
            .field("pending", &self.buffer.pending_len())
            .finish()
    }
}

impl Default for OutputInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputInterceptor {
    /// Interceptor whose original destination is this process's stderr
    ///
    /// Stdout is reserved for the host channel.
    pub fn new() -> Self {
        Self::with_original(Box::new(io::stderr()))
    }

    /// Interceptor with an explicit original destination
    pub fn with_original(original: Box<dyn Write + Send>) -> Self {
        Self {
            buffer: Arc::new(OutputBuffer::new()),
            destination: Arc::new(Mutex::new(Destination {
                capturing: false,
                original,
            })),
        }
    }

    /// Start redirecting output into the buffer
    ///
    /// The buffer is reset first. Fails if a capture is already active.
    pub fn begin_capture(&self) -> Result<CaptureGuard> {
        let mut dest = self.destination.lock();
        if dest.capturing {
            return Err(Error::CaptureAlreadyActive);
        }
        self.buffer.reset();
        dest.capturing = true;
        tracing::debug!("Output capture started");
        Ok(CaptureGuard {
            interceptor: self.clone(),
        })
    }

    /// Writer the engine's streams are connected to
    pub fn sink(&self) -> OutputSink {
        OutputSink {
            interceptor: self.clone(),
        }
    }

    /// Take the output captured since the last drain
    pub fn drain(&self) -> String {
        self.buffer.drain()
    }

    /// Whether output is currently redirected
    pub fn is_capturing(&self) -> bool {
        self.destination.lock().capturing
    }

    fn write_through(&self, bytes: &[u8]) -> io::Result<()> {
        // Holding the destination lock orders this write against end_capture
        let mut dest = self.destination.lock();
        if dest.capturing {
            self.buffer.append(bytes);
            Ok(())
        } else {
            dest.original.write_all(bytes)?;
            dest.original.flush()
        }
    }

    fn end_capture(&self) {
        self.destination.lock().capturing = false;
        tracing::debug!(
            undrained = self.buffer.pending_len(),
            "Output capture ended"
        );
    }
}

/// Scope of an active capture; dropping it ends the capture
#[must_use = "output is only captured while the guard is alive"]
pub struct CaptureGuard {
    interceptor: OutputInterceptor,
}

impl CaptureGuard {
    /// Take the output captured since the last drain
    pub fn drain(&self) -> String {
        self.interceptor.drain()
    }

    /// Full text captured in this scope, including already drained output
    pub fn transcript(&self) -> String {
        self.interceptor.buffer.transcript()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.interceptor.end_capture();
    }
}

/// Cloneable writer for engine output
#[derive(Clone, Debug)]
pub struct OutputSink {
    interceptor: OutputInterceptor,
}

impl OutputSink {
    /// Write a chunk of engine output
    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        self.interceptor.write_through(bytes)
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
