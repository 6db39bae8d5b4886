// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::sinks::core::{Connection, Sink, SocketConnection};

// Default size of the buffer for buffered sinks. This is a rather
// conservative value, picked to make sure the entire buffer fits in a
// small UDP packet. Users may want to use a different value based on the
// configuration of the network their application runs in.
pub(crate) const DEFAULT_BUFFER_SIZE: usize = 512;

pub(crate) const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolve anything implementing `ToSocketAddrs` into a concrete
/// `SocketAddr`, returning an `InvalidInput` error if nothing was yielded.
pub(crate) fn get_addr<A: ToSocketAddrs>(addr: A) -> io::Result<SocketAddr> {
    match addr.to_socket_addrs()?.next() {
        Some(addr) => Ok(addr),
        None => Err(io::Error::new(io::ErrorKind::InvalidInput, "No socket addresses yielded")),
    }
}

/// Adapter for writing to a connected `UdpSocket` via the `Write` trait.
#[derive(Debug)]
pub(crate) struct UdpWriteAdapter {
    socket: UdpSocket,
}

impl Write for UdpWriteAdapter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Implementation of a `Sink` that opens connected UDP sockets.
///
/// Every call to `.open()` binds a fresh socket on an ephemeral local port
/// and connects it to the remote address, so each connection is independent
/// of the ones before it. Connecting the socket means that ICMP "port
/// unreachable" responses surface as send errors while the collector is
/// down; once it comes back on the same address sends simply succeed again.
///
/// By default each line is sent as its own datagram. When buffered, lines
/// are joined with a trailing "\n" into packets of at most the buffer size,
/// which are sent when the next line would not fit, when the publisher
/// flushes an idle connection, or when the connection is disposed.
///
/// # Example
///
/// ```no_run
/// use statsd_publisher::{Publisher, UdpSink};
///
/// let sink = UdpSink::new().buffered();
/// let publisher = Publisher::builder("metrics.example.com:8125", sink).build().unwrap();
/// publisher.start().unwrap();
/// publisher.submit("some.counter:1|c");
/// ```
#[derive(Debug, Clone)]
pub struct UdpSink {
    buffer_size: Option<usize>,
    write_timeout: Option<Duration>,
    nonblocking: bool,
}

impl UdpSink {
    /// Construct a new unbuffered `UdpSink` with a one second write timeout.
    pub fn new() -> Self {
        UdpSink {
            buffer_size: None,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            nonblocking: false,
        }
    }

    /// Buffer lines into packets of up to 512 bytes.
    pub fn buffered(self) -> Self {
        self.with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Buffer lines into packets of up to `size` bytes.
    ///
    /// For guidance on sizing your buffer see the
    /// [Statsd docs](https://github.com/etsy/statsd/blob/master/docs/metric_types.md#multi-metric-packets).
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Set the write timeout of each socket. A zero duration is treated as
    /// "no timeout", which should only be used with a non-blocking socket.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    /// Put each socket in non-blocking mode. Sends that would block fail
    /// with `WouldBlock` and the line is dropped.
    pub fn with_nonblocking(mut self, nonblocking: bool) -> Self {
        self.nonblocking = nonblocking;
        self
    }

    fn connect(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        let socket = if addr.is_ipv4() {
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
        } else {
            UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?
        };

        socket.connect(addr)?;
        socket.set_write_timeout(self.write_timeout)?;
        socket.set_nonblocking(self.nonblocking)?;
        Ok(socket)
    }
}

impl Default for UdpSink {
    fn default() -> Self {
        UdpSink::new()
    }
}

impl Sink for UdpSink {
    fn open(&self, addr: &str) -> io::Result<Arc<dyn Connection>> {
        let remote = get_addr(addr)?;
        let socket = self.connect(remote)?;

        debug!(%remote, local = ?socket.local_addr().ok(), buffer_size = ?self.buffer_size, "Opened UDP connection.");
        Ok(Arc::new(SocketConnection::new(
            UdpWriteAdapter { socket },
            self.buffer_size,
            "udp",
        )))
    }
}
