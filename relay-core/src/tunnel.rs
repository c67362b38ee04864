//! Bidirectional byte splice between two streams with idle deadlines and
//! one-shot close.
//!
//! Termination is wired through a `tokio_util::sync::CancellationToken`
//! in addition to the shared `closed` flag checked at the top of each
//! loop iteration, so a stalled direction wakes immediately when its
//! sibling closes, rather than waiting out its own idle timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Per-direction copy buffer size, bytes. Must be >= 1 — enforced by
/// [`Tunnel::new`].
pub type BufferSize = usize;

#[derive(Debug, thiserror::Error)]
#[error("tunnel buffer_size must be >= 1, got {0}")]
pub struct InvalidBufferSize(pub usize);

/// Splices two accepted connections into a full-duplex pipe with bounded
/// idleness and deterministic teardown. Takes exclusive ownership of both
/// connections at construction; no other component may touch them after.
pub struct Tunnel {
    a: Mutex<Option<TcpStream>>,
    b: Mutex<Option<TcpStream>>,
    idle_timeout: Option<Duration>,
    buffer_size: BufferSize,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    close_gate: Mutex<bool>,
}

impl Tunnel {
    pub fn new(
        a: TcpStream,
        b: TcpStream,
        idle_timeout: Option<Duration>,
        buffer_size: BufferSize,
    ) -> Result<Self, InvalidBufferSize> {
        if buffer_size < 1 {
            return Err(InvalidBufferSize(buffer_size));
        }
        Ok(Self {
            a: Mutex::new(Some(a)),
            b: Mutex::new(Some(b)),
            idle_timeout,
            buffer_size,
            closed: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            close_gate: Mutex::new(false),
        })
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run the splice and return when both directions have terminated.
    /// Returns true iff the tunnel is observably closed at return.
    pub async fn copy(&self) -> bool {
        if self.closed() {
            return true;
        }

        let mut a = self
            .a
            .lock()
            .await
            .take()
            .expect("Tunnel::copy called more than once");
        let mut b = self
            .b
            .lock()
            .await
            .take()
            .expect("Tunnel::copy called more than once");

        let (mut a_read, mut a_write) = a.split();
        let (mut b_read, mut b_write) = b.split();

        let dir_a_to_b = copy_direction(
            &mut a_read,
            &mut b_write,
            self.idle_timeout,
            self.buffer_size,
            &self.closed,
            &self.cancel,
        );
        let dir_b_to_a = copy_direction(
            &mut b_read,
            &mut a_write,
            self.idle_timeout,
            self.buffer_size,
            &self.closed,
            &self.cancel,
        );

        tokio::pin!(dir_a_to_b);
        tokio::pin!(dir_b_to_a);

        // Whichever direction terminates first triggers close(); the
        // still-running direction then wakes on cancellation (or its own
        // next closed-flag check / I/O error) and is awaited to
        // completion so `copy()` only returns once both have exited.
        tokio::select! {
            _ = &mut dir_a_to_b => {
                self.close().await;
                dir_b_to_a.await;
            }
            _ = &mut dir_b_to_a => {
                self.close().await;
                dir_a_to_b.await;
            }
        }

        drop(a);
        drop(b);
        self.closed()
    }

    /// Exactly-once close: sets `closed`, cancels the shared token so any
    /// still-running direction wakes immediately, then takes and shuts
    /// down both endpoints itself — not just whichever ones `copy()` has
    /// already taken. Idempotent and safe to call concurrently, including
    /// before `copy()` has ever run.
    pub async fn close(&self) {
        let mut gate = self.close_gate.lock().await;
        if *gate {
            return;
        }
        *gate = true;
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();

        if let Some(stream) = self.a.lock().await.take() {
            shutdown_endpoint(stream).await;
        }
        if let Some(stream) = self.b.lock().await.take() {
            shutdown_endpoint(stream).await;
        }
    }
}

async fn shutdown_endpoint(mut stream: TcpStream) {
    let _ = stream.shutdown().await;
}

/// One direction's copy loop. Terminates on read/write error, cancellation,
/// or a short write (count strictly less than requested, with no error) —
/// treated as end-of-stream. Zero-length reads with no error are NOT
/// end-of-stream; the loop continues.
async fn copy_direction(
    input: &mut (impl tokio::io::AsyncRead + Unpin),
    output: &mut (impl tokio::io::AsyncWrite + Unpin),
    idle_timeout: Option<Duration>,
    buffer_size: usize,
    closed: &AtomicBool,
    cancel: &CancellationToken,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        if closed.load(Ordering::SeqCst) {
            return;
        }

        let read_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            r = read_with_deadline(input, &mut buf, idle_timeout) => r,
        };

        let count = match read_result {
            Some(Ok(n)) => n,
            Some(Err(_)) | None => return,
        };

        if count == 0 {
            // Zero-length read with no error: not EOF, keep looping.
            continue;
        }

        if closed.load(Ordering::SeqCst) {
            return;
        }

        let write_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            r = write_with_deadline(output, &buf[..count], idle_timeout) => r,
        };

        match write_result {
            Some(Ok(written)) if written < count => return, // short write: EOF
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return,
        }
    }
}

async fn read_with_deadline(
    input: &mut (impl tokio::io::AsyncRead + Unpin),
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> Option<std::io::Result<usize>> {
    match idle_timeout {
        Some(d) => tokio::time::timeout(d, input.read(buf)).await.ok(),
        None => Some(input.read(buf).await),
    }
}

async fn write_with_deadline(
    output: &mut (impl tokio::io::AsyncWrite + Unpin),
    buf: &[u8],
    idle_timeout: Option<Duration>,
) -> Option<std::io::Result<usize>> {
    match idle_timeout {
        Some(d) => tokio::time::timeout(d, output.write(buf)).await.ok(),
        None => Some(output.write(buf).await),
    }
}
