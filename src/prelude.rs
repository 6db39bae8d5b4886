// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Export commonly used parts of statsd-publisher for easy glob imports
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use statsd_publisher::prelude::*;
//! use statsd_publisher::{NopSink, Publisher, StatsdClient};
//!
//! let publisher = Arc::new(Publisher::builder("127.0.0.1:8125", NopSink).build_started().unwrap());
//! let client = StatsdClient::from_publisher("some.prefix", publisher);
//!
//! client.count("some.counter", 1);
//! client.time("some.timer", 23);
//! client.gauge("some.gauge", 45);
//! client.histogram("some.histogram", 89);
//! client.set("some.set", 4);
//! ```

pub use crate::client::{Counted, Distributed, Gauged, Histogrammed, MetricClient, Setted, Timed};
pub use crate::encoder::Encoder;
pub use crate::sinks::{Connection, Sink};
