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

/// Buffered implementation of the `Write` trait that appends a trailing
/// line ending to every input written and only hands complete packets to
/// the underlying writer.
///
/// Each call to `.write()` on the inner writer is expected to produce one
/// datagram, so lines are never split across two packets. A packet is
/// discarded once it has been handed to the inner writer, whether or not
/// that succeeded: lines that failed to send are never sent again.
#[derive(Debug)]
pub(crate) struct MultiLineWriter<T>
where
    T: Write,
{
    capacity: usize,
    packet: Vec<u8>,
    inner: T,
    line_ending: Vec<u8>,
}

impl<T> MultiLineWriter<T>
where
    T: Write,
{
    /// Create a new `MultiLineWriter` that suffixes each write with '\n'.
    pub(crate) fn new(inner: T, cap: usize) -> MultiLineWriter<T> {
        Self::with_ending(inner, cap, "\n")
    }

    pub(crate) fn with_ending(inner: T, cap: usize, end: &str) -> MultiLineWriter<T> {
        MultiLineWriter {
            capacity: cap,
            packet: Vec::with_capacity(cap),
            inner,
            line_ending: Vec::from(end.as_bytes()),
        }
    }

    /// Number of bytes currently sitting in the buffer.
    pub(crate) fn buffered(&self) -> usize {
        self.packet.len()
    }

    #[cfg(test)]
    pub(crate) fn get_ref(&self) -> &T {
        &self.inner
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    fn send_packet(&mut self) -> io::Result<()> {
        let res = self.inner.write(&self.packet);
        self.packet.clear();
        res.map(|_| ())
    }
}

impl<T> Write for MultiLineWriter<T>
where
    T: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let required = buf.len() + self.line_ending.len();

        if required > self.capacity {
            // Anything bigger than a whole packet bypasses the buffer. Flush
            // first so that lines already buffered go out before it.
            if !self.packet.is_empty() {
                self.send_packet()?;
            }
            return self.inner.write(buf);
        }

        if self.packet.len() + required > self.capacity {
            self.send_packet()?;
        }

        self.packet.extend_from_slice(buf);
        self.packet.extend_from_slice(&self.line_ending);

        // Only report bytes of the caller's buffer, not the separator.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.packet.is_empty() {
            self.send_packet()?;
        }
        self.inner.flush()
    }
}

/// Writer for a datagram transport that either sends each line as its own
/// packet or packs several newline separated lines into one.
#[derive(Debug)]
pub(crate) enum Datagrams<T>
where
    T: Write,
{
    Unbuffered(T),
    Buffered(MultiLineWriter<T>),
}

impl<T> Datagrams<T>
where
    T: Write,
{
    pub(crate) fn new(inner: T, buffer_size: Option<usize>) -> Self {
        match buffer_size {
            Some(cap) => Datagrams::Buffered(MultiLineWriter::new(inner, cap)),
            None => Datagrams::Unbuffered(inner),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_buffered(&self) -> bool {
        matches!(self, Datagrams::Buffered(_))
    }
}

impl<T> Write for Datagrams<T>
where
    T: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Datagrams::Unbuffered(w) => w.write(buf),
            Datagrams::Buffered(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Datagrams::Unbuffered(w) => w.flush(),
            Datagrams::Buffered(w) => w.flush(),
        }
    }
}
