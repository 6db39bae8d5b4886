// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use crate::io::Datagrams;
use crate::sync::lock;

/// I/O telemetry for a single connection.
///
/// Packets are datagrams handed to the transport. When lines are buffered
/// several of them share one packet, so `packets_sent` may be lower than
/// the number of lines sent. A line refused because the connection was
/// disposed counts as one dropped packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub bytes_dropped: u64,
    pub packets_dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SocketStats {
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
    bytes_dropped: AtomicU64,
    packets_dropped: AtomicU64,
}

impl SocketStats {
    pub(crate) fn update(&self, res: io::Result<usize>, len: usize) -> io::Result<usize> {
        match res {
            Ok(written) => {
                self.bytes_sent.fetch_add(written as u64, Ordering::Relaxed);
                self.packets_sent.fetch_add(1, Ordering::Relaxed);
                Ok(written)
            }
            Err(e) => {
                self.bytes_dropped.fetch_add(len as u64, Ordering::Relaxed);
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

/// Records every write on the transport as one packet.
#[derive(Debug)]
struct CountingWriter<T> {
    inner: T,
    stats: Arc<SocketStats>,
}

impl<T> Write for CountingWriter<T>
where
    T: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res = self.inner.write(buf);
        self.stats.update(res, buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl From<&SocketStats> for SinkStats {
    fn from(stats: &SocketStats) -> Self {
        SinkStats {
            bytes_sent: stats.bytes_sent.load(Ordering::Relaxed),
            packets_sent: stats.packets_sent.load(Ordering::Relaxed),
            bytes_dropped: stats.bytes_dropped.load(Ordering::Relaxed),
            packets_dropped: stats.packets_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Monotonic "disposed" marker shared by connection implementations.
///
/// Flipping the flag is a single atomic operation so callers never observe
/// a disposal that is only partially done.
#[derive(Debug, Default)]
pub struct DisposeFlag {
    disposed: AtomicBool,
}

impl DisposeFlag {
    pub fn new() -> Self {
        DisposeFlag::default()
    }

    /// Mark as disposed, returning `true` only for the call that actually
    /// performed the transition.
    pub fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Error returned by connections when a send is attempted after disposal.
pub fn disposed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is disposed")
}

/// One live transport session created by a [`Sink`].
///
/// Implementations must be safe to share between the thread delivering
/// lines and the thread tearing the connection down. After `.dispose()` has
/// been called, `.is_disposed()` must return `true` forever and every call to
/// `.send()` must fail rather than silently succeed.
pub trait Connection: Send + Sync {
    /// Attempt one best-effort transmission of a line, returning the number
    /// of bytes accepted or an I/O error.
    ///
    /// Implementations must not block indefinitely; a bounded write timeout
    /// or a non-blocking socket is expected.
    ///
    /// Note that implementations may return `0` bytes if the line is not
    /// immediately written (such as when it is buffered). Callers should *NOT*
    /// interpret this as an error.
    fn send(&self, line: &[u8]) -> io::Result<usize>;

    /// Flush any lines buffered by this connection.
    ///
    /// Not all connections buffer lines and so the default implementation
    /// does nothing.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Release transport resources. Idempotent.
    fn dispose(&self);

    /// Non-blocking snapshot of the disposal status.
    fn is_disposed(&self) -> bool;

    /// Return I/O telemetry like bytes / packets sent or dropped.
    ///
    /// The default implementation returns zeros.
    fn stats(&self) -> SinkStats {
        SinkStats::default()
    }
}

/// Capability for opening connections to a remote collector.
///
/// A `Sink` is owned by a [`Publisher`](crate::Publisher), which opens a
/// new connection every time it is started and disposes it when stopped.
/// Sinks decide nothing about retrying: a failed `.open()` is reported to
/// whoever called `start()`.
pub trait Sink: Send + Sync {
    /// Open a new connection to the given address.
    fn open(&self, addr: &str) -> io::Result<Arc<dyn Connection>>;
}

impl<T> Sink for Arc<T>
where
    T: Sink + ?Sized,
{
    fn open(&self, addr: &str) -> io::Result<Arc<dyn Connection>> {
        (**self).open(addr)
    }
}

impl<T> Sink for Box<T>
where
    T: Sink + ?Sized,
{
    fn open(&self, addr: &str) -> io::Result<Arc<dyn Connection>> {
        (**self).open(addr)
    }
}

/// Implementation of a `Sink` whose connections discard every line.
///
/// Useful for disabling metric publishing or unit tests.
#[derive(Debug, Clone, Default)]
pub struct NopSink;

impl Sink for NopSink {
    fn open(&self, _addr: &str) -> io::Result<Arc<dyn Connection>> {
        Ok(Arc::new(NopConnection::default()))
    }
}

#[derive(Debug, Default)]
struct NopConnection {
    disposed: DisposeFlag,
}

impl Connection for NopConnection {
    fn send(&self, _line: &[u8]) -> io::Result<usize> {
        if self.disposed.is_disposed() {
            Err(disposed_error())
        } else {
            Ok(0)
        }
    }

    fn dispose(&self) {
        self.disposed.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.is_disposed()
    }
}

/// Connection over a datagram socket wrapped in a `Write` adapter.
///
/// The writer lives in a mutex so that the delivery worker and the
/// controller never use it at the same time. Disposal only takes the
/// writer if it is free; if a send or flush is in progress, the next user
/// of the writer drops it once it sees the disposed flag. Dropping the
/// writer discards anything still buffered.
pub(crate) struct SocketConnection<T>
where
    T: Write + Send,
{
    writer: Mutex<Option<Datagrams<CountingWriter<T>>>>,
    disposed: DisposeFlag,
    stats: Arc<SocketStats>,
    transport: &'static str,
}

impl<T> SocketConnection<T>
where
    T: Write + Send,
{
    pub(crate) fn new(inner: T, buffer_size: Option<usize>, transport: &'static str) -> Self {
        let stats = Arc::new(SocketStats::default());
        let counted = CountingWriter {
            inner,
            stats: Arc::clone(&stats),
        };

        SocketConnection {
            writer: Mutex::new(Some(Datagrams::new(counted, buffer_size))),
            disposed: DisposeFlag::new(),
            stats,
            transport,
        }
    }

    fn refuse(&self, len: usize) -> io::Error {
        // Never reaches the transport, so the writer does not count it.
        let _ = self.stats.update(Err(disposed_error()), len);
        disposed_error()
    }

    /// Run `op` against the writer unless the connection is disposed, in
    /// which case the writer is dropped without writing anything.
    fn with_writer<R, F>(&self, op: F) -> Option<io::Result<R>>
    where
        F: FnOnce(&mut Datagrams<CountingWriter<T>>) -> io::Result<R>,
    {
        let mut writer = lock(&self.writer);
        if self.disposed.is_disposed() {
            writer.take();
            return None;
        }

        let res = writer.as_mut().map(op);

        if self.disposed.is_disposed() {
            writer.take();
        }

        res
    }
}

impl<T> Connection for SocketConnection<T>
where
    T: Write + Send,
{
    fn send(&self, line: &[u8]) -> io::Result<usize> {
        if self.disposed.is_disposed() {
            return Err(self.refuse(line.len()));
        }

        match self.with_writer(|w| w.write(line)) {
            Some(res) => res,
            None => Err(self.refuse(line.len())),
        }
    }

    fn flush(&self) -> io::Result<()> {
        self.with_writer(|w| w.flush()).unwrap_or_else(|| Err(disposed_error()))
    }

    fn dispose(&self) {
        if !self.disposed.dispose() {
            return;
        }

        let taken = match self.writer.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(TryLockError::Poisoned(e)) => e.into_inner().take(),
            Err(TryLockError::WouldBlock) => None,
        };

        // Buffered lines go out with the last packet when the writer was
        // free. Dropping it closes the socket.
        if let Some(mut w) = taken {
            let _ = w.flush();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.is_disposed()
    }

    fn stats(&self) -> SinkStats {
        SinkStats::from(&*self.stats)
    }
}

impl<T> fmt::Debug for SocketConnection<T>
where
    T: Write + Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConnection")
            .field("transport", &self.transport)
            .field("disposed", &self.disposed.is_disposed())
            .finish()
    }
}
