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
use std::os::unix::net::UnixDatagram;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::sinks::core::{Connection, Sink, SocketConnection};
use crate::sinks::udp::{DEFAULT_BUFFER_SIZE, DEFAULT_WRITE_TIMEOUT};

/// Adapter for writing to a connected `UnixDatagram` via the `Write` trait.
#[derive(Debug)]
pub(crate) struct UnixWriteAdapter {
    socket: UnixDatagram,
}

impl Write for UnixWriteAdapter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Implementation of a `Sink` that opens Unix datagram sockets.
///
/// The address passed to `.open()` is the filesystem path of the socket the
/// Statsd server is listening on. Unlike UDP, opening a connection fails if
/// nothing is listening at that path, which makes `start()` report the
/// problem immediately.
///
/// Buffering works the same way as for [`UdpSink`](crate::UdpSink).
///
/// NOTE: This sink is only available on Unix platforms (Linux, BSD, MacOS).
#[derive(Debug, Clone)]
pub struct UnixSink {
    buffer_size: Option<usize>,
    write_timeout: Option<Duration>,
}

impl UnixSink {
    pub fn new() -> Self {
        UnixSink {
            buffer_size: None,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
        }
    }

    /// Buffer lines into packets of up to 512 bytes.
    pub fn buffered(self) -> Self {
        self.with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }
}

impl Default for UnixSink {
    fn default() -> Self {
        UnixSink::new()
    }
}

impl Sink for UnixSink {
    fn open(&self, addr: &str) -> io::Result<Arc<dyn Connection>> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(addr)?;
        socket.set_write_timeout(self.write_timeout)?;

        debug!(path = addr, buffer_size = ?self.buffer_size, "Opened Unix datagram connection.");
        Ok(Arc::new(SocketConnection::new(
            UnixWriteAdapter { socket },
            self.buffer_size,
            "unixgram",
        )))
    }
}
