// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A restartable pipeline for publishing Statsd metrics.
//!
//! Metric events are encoded into lines on the thread that records them,
//! queued without blocking, and sent to a Statsd server by a single
//! background thread. The pipeline can be stopped and started again at any
//! time without rebuilding it, and keeps working when the server goes away
//! and comes back.
//!
//! ## Features
//!
//! * Producers never block on the network and never see transport errors.
//! * Lines submitted while stopped are dropped rather than queued.
//! * Every `start()` opens a new connection; lines accepted before a
//!   `stop()` are never sent on a connection opened after it.
//! * `stop()` returns only once the connection has been disposed.
//! * Support for the Datadog, Etsy, Telegraf and Sysdig tag dialects.
//! * Buffered sinks that pack several lines into one datagram.
//! * UDP and Unix datagram transports, plus a callback sink for anything else.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use statsd_publisher::prelude::*;
//! use statsd_publisher::{Publisher, StatsdClient, UdpSink, DEFAULT_PORT};
//!
//! let addr = format!("metrics.example.com:{}", DEFAULT_PORT);
//! let publisher = Publisher::builder(&addr, UdpSink::new().buffered())
//!     .with_error_handler(|e| eprintln!("Error sending metric: {}", e))
//!     .build_started()
//!     .unwrap();
//!
//! let client = StatsdClient::from_publisher("my.prefix", Arc::new(publisher));
//! client.count("my.counter.thing", 29);
//! client.time("my.service.call", 214);
//!
//! // Metrics recorded while stopped are dropped.
//! client.publisher().stop();
//! client.incr("not.sent");
//!
//! client.publisher().start().unwrap();
//! client.incr("sent.again");
//! ```
//!
//! ## Custom Sinks
//!
//! Transports are pluggable through the `Sink` and `Connection` traits. A
//! sink opens a new connection every time the publisher starts; the
//! connection sends lines until the publisher disposes it.
//!
//! ```
//! use std::io;
//! use std::sync::Arc;
//! use statsd_publisher::{Connection, DisposeFlag, Publisher, Sink};
//!
//! struct StderrSink;
//!
//! struct StderrConnection {
//!     disposed: DisposeFlag,
//! }
//!
//! impl Sink for StderrSink {
//!     fn open(&self, _addr: &str) -> io::Result<Arc<dyn Connection>> {
//!         Ok(Arc::new(StderrConnection { disposed: DisposeFlag::new() }))
//!     }
//! }
//!
//! impl Connection for StderrConnection {
//!     fn send(&self, line: &[u8]) -> io::Result<usize> {
//!         if self.disposed.is_disposed() {
//!             return Err(statsd_publisher::disposed_error());
//!         }
//!         eprintln!("{}", String::from_utf8_lossy(line));
//!         Ok(line.len())
//!     }
//!
//!     fn dispose(&self) {
//!         self.disposed.dispose();
//!     }
//!
//!     fn is_disposed(&self) -> bool {
//!         self.disposed.is_disposed()
//!     }
//! }
//!
//! let publisher = Publisher::builder("stderr", StderrSink).build_started().unwrap();
//! publisher.submit("some.counter:1|c");
//! ```

pub const DEFAULT_PORT: u16 = 8125;

pub use self::client::{
    Counted, Distributed, Gauged, Histogrammed, MetricClient, Setted, StatsdClient, StatsdClientBuilder, Timed,
};
pub use self::encoder::{Encoder, Flavor, LineEncoder, MetricEvent, MetricKind, MetricValue};
pub use self::pipeline::PublisherStats;
pub use self::publisher::{Publisher, PublisherBuilder};
pub use self::sinks::{
    disposed_error, Connection, DisposeFlag, FnSink, NopSink, Sink, SinkStats, SpyConnection, SpySink, UdpSink,
};
pub use self::types::{ErrorKind, LifecycleState, Line, PublishError, PublishResult};

#[cfg(unix)]
pub use self::sinks::UnixSink;

mod client;
mod encoder;
mod io;
mod pipeline;
pub mod prelude;
mod publisher;
mod sinks;
mod sync;
mod types;

// Utilities for running integration tests. Not part of the public API.
#[doc(hidden)]
pub mod test;
