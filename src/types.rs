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
use std::io;

use thiserror::Error;

/// One encoded, ready to transmit protocol message.
///
/// The contents are opaque to the publishing pipeline: it never parses or
/// rewrites a line, it only hands the bytes to the current connection. Lines
/// are typically produced by an [`Encoder`](crate::Encoder) and contain a
/// single Statsd metric without a trailing newline.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Line {
    bytes: Vec<u8>,
}

impl Line {
    /// Create a new line from anything that can be turned into bytes.
    pub fn new<B>(bytes: B) -> Self
    where
        B: Into<Vec<u8>>,
    {
        Line { bytes: bytes.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<String> for Line {
    fn from(s: String) -> Self {
        Line::new(s)
    }
}

impl From<&str> for Line {
    fn from(s: &str) -> Self {
        Line::new(s)
    }
}

impl From<Vec<u8>> for Line {
    fn from(bytes: Vec<u8>) -> Self {
        Line::new(bytes)
    }
}

impl From<&[u8]> for Line {
    fn from(bytes: &[u8]) -> Self {
        Line::new(bytes)
    }
}

impl AsRef<[u8]> for Line {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        String::from_utf8_lossy(&self.bytes).fmt(f)
    }
}

/// State of a [`Publisher`](crate::Publisher).
///
/// Publishers start out `Stopped`, move to `Running` when a connection has
/// been opened, and back to `Stopped` when that connection is torn down.
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Stopped,
    Running,
    Closed,
}

impl LifecycleState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            LifecycleState::Stopped => 0,
            LifecycleState::Running => 1,
            LifecycleState::Closed => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => LifecycleState::Running,
            2 => LifecycleState::Closed,
            _ => LifecycleState::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LifecycleState::Stopped => "stopped".fmt(f),
            LifecycleState::Running => "running".fmt(f),
            LifecycleState::Closed => "closed".fmt(f),
        }
    }
}

/// Coarse category of a [`PublishError`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ErrorKind {
    InvalidInput,
    IoError,
    InvalidState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorKind::InvalidInput => "invalid input".fmt(f),
            ErrorKind::IoError => "i/o error".fmt(f),
            ErrorKind::InvalidState => "invalid state".fmt(f),
        }
    }
}

/// Errors reported by the publishing pipeline to its controlling layer.
///
/// None of these are ever returned from [`Publisher::submit`](crate::Publisher::submit):
/// submitting a line is fire-and-forget. They are returned from lifecycle
/// methods or passed to the error handler configured on the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The sink could not open a connection to the remote address.
    #[error("unable to open connection to {addr}: {source}")]
    Open {
        /// Address the connection was opened against.
        addr: String,
        source: io::Error,
    },

    /// A single line could not be sent on the current connection.
    #[error("unable to send line: {source}")]
    Send { source: io::Error },

    /// The publisher has been closed and cannot be started again.
    #[error("publisher is closed")]
    Closed,

    /// Some input (an address or a line) was not usable.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// The background delivery worker could not be spawned.
    #[error("unable to spawn delivery worker: {source}")]
    Backend { source: io::Error },
}

impl PublishError {
    /// Return the general category of this error.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            PublishError::Open { .. } | PublishError::Send { .. } | PublishError::Backend { .. } => {
                ErrorKind::IoError
            }
            PublishError::Closed => ErrorKind::InvalidState,
            PublishError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

pub type PublishResult<T> = Result<T, PublishError>;
