// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt::{self, Debug, Formatter};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::sinks::core::{disposed_error, Connection, DisposeFlag, Sink, SinkStats};
use crate::sync::lock;

/// `Sink` implementation that records every connection it opens and every
/// line sent on each of them.
///
/// This is not a general purpose sink, rather it's a sink meant for verifying
/// the behavior of a publisher during the course of tests: how many
/// connections were opened, which lines went to which connection, and
/// whether anything was attempted on a connection after it was disposed.
/// Callers keep a reference to it by wrapping it in an `Arc` before handing
/// a clone to the publisher.
#[derive(Default)]
pub struct SpySink {
    connections: Mutex<Vec<Arc<SpyConnection>>>,
    fail_open: AtomicBool,
    send_delay: Option<Duration>,
}

impl SpySink {
    pub fn new() -> Self {
        SpySink::default()
    }

    /// Sleep for the given duration inside every send, to simulate a slow
    /// transport.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    /// Make subsequent calls to `.open()` fail (or succeed again).
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::Release);
    }

    /// All connections opened so far, oldest first.
    pub fn connections(&self) -> Vec<Arc<SpyConnection>> {
        lock(&self.connections).clone()
    }

    /// Number of connections opened so far.
    pub fn opened(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Number of opened connections that have not been disposed.
    pub fn live(&self) -> usize {
        lock(&self.connections).iter().filter(|c| !c.is_disposed()).count()
    }

    /// Successful sends across every connection.
    pub fn total_sends(&self) -> usize {
        lock(&self.connections).iter().map(|c| c.sends()).sum()
    }

    /// Sends attempted on any connection after it was disposed.
    pub fn sends_after_dispose(&self) -> u64 {
        lock(&self.connections).iter().map(|c| c.sends_after_dispose()).sum()
    }

    /// Every line delivered, in connection order.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.connections).iter().flat_map(|c| c.lines()).collect()
    }
}

impl Sink for SpySink {
    fn open(&self, addr: &str) -> io::Result<Arc<dyn Connection>> {
        if self.fail_open.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("spy sink refused to open {}", addr),
            ));
        }

        let mut connections = lock(&self.connections);
        let conn = Arc::new(SpyConnection::new(connections.len(), self.send_delay));
        connections.push(Arc::clone(&conn));
        Ok(conn)
    }
}

impl Debug for SpySink {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SpySink {{ opened: {} }}", self.opened())
    }
}

/// Connection opened by a [`SpySink`].
#[derive(Debug)]
pub struct SpyConnection {
    id: usize,
    lines: Mutex<Vec<Vec<u8>>>,
    disposed: DisposeFlag,
    failing: AtomicBool,
    panic_next: AtomicBool,
    sends_after_dispose: AtomicU64,
    bytes_sent: AtomicU64,
    send_delay: Option<Duration>,
}

impl SpyConnection {
    fn new(id: usize, send_delay: Option<Duration>) -> Self {
        SpyConnection {
            id,
            lines: Mutex::new(Vec::new()),
            disposed: DisposeFlag::new(),
            failing: AtomicBool::new(false),
            panic_next: AtomicBool::new(false),
            sends_after_dispose: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            send_delay,
        }
    }

    /// Position of this connection in the order they were opened.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Make sends on this connection fail, simulating a transport that
    /// rejects writes.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Make the next send on this connection panic instead of returning.
    pub fn panic_next_send(&self) {
        self.panic_next.store(true, Ordering::Release);
    }

    pub fn sends(&self) -> usize {
        lock(&self.lines).len()
    }

    pub fn sends_after_dispose(&self) -> u64 {
        self.sends_after_dispose.load(Ordering::Acquire)
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines)
            .iter()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .collect()
    }
}

impl Connection for SpyConnection {
    fn send(&self, line: &[u8]) -> io::Result<usize> {
        if self.disposed.is_disposed() {
            self.sends_after_dispose.fetch_add(1, Ordering::AcqRel);
            return Err(disposed_error());
        }

        if let Some(delay) = self.send_delay {
            thread::sleep(delay);
        }

        if self.panic_next.swap(false, Ordering::AcqRel) {
            panic!("spy connection {} panicked while sending", self.id);
        }

        if self.failing.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "spy connection is failing"));
        }

        // Checked again after the delay so that a disposal that raced with
        // this send is still never recorded as a delivery.
        let mut lines = lock(&self.lines);
        if self.disposed.is_disposed() {
            self.sends_after_dispose.fetch_add(1, Ordering::AcqRel);
            return Err(disposed_error());
        }

        lines.push(line.to_vec());
        self.bytes_sent.fetch_add(line.len() as u64, Ordering::Relaxed);
        Ok(line.len())
    }

    fn dispose(&self) {
        // Take the lines lock so a send that is about to record a line
        // either finishes first or sees the flag.
        let _lines = lock(&self.lines);
        self.disposed.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.is_disposed()
    }

    fn stats(&self) -> SinkStats {
        SinkStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_sent: self.sends() as u64,
            ..SinkStats::default()
        }
    }
}

/// `Sink` implementation that passes each line to a callback instead of a
/// socket.
///
/// Useful for handing lines to some other transport or logging facility.
/// Every connection opened by this sink shares the same callback, but a
/// disposed connection never invokes it again, so lines submitted while a
/// publisher is stopped are never seen by the callback.
pub struct FnSink {
    consumer: Arc<dyn Fn(&[u8]) + Send + Sync + 'static>,
}

impl FnSink {
    pub fn new<F>(consumer: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        FnSink {
            consumer: Arc::new(consumer),
        }
    }
}

impl Sink for FnSink {
    fn open(&self, _addr: &str) -> io::Result<Arc<dyn Connection>> {
        Ok(Arc::new(FnConnection {
            consumer: Arc::clone(&self.consumer),
            disposed: DisposeFlag::new(),
        }))
    }
}

impl Debug for FnSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "FnSink {{ ... }}")
    }
}

struct FnConnection {
    consumer: Arc<dyn Fn(&[u8]) + Send + Sync + 'static>,
    disposed: DisposeFlag,
}

impl Connection for FnConnection {
    fn send(&self, line: &[u8]) -> io::Result<usize> {
        if self.disposed.is_disposed() {
            return Err(disposed_error());
        }

        (self.consumer)(line);
        Ok(line.len())
    }

    fn dispose(&self) {
        self.disposed.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.is_disposed()
    }
}
