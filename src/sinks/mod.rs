// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

mod core;
mod spy;
mod udp;

pub use crate::sinks::core::{disposed_error, Connection, DisposeFlag, NopSink, Sink, SinkStats};
pub use crate::sinks::spy::{FnSink, SpyConnection, SpySink};
pub use crate::sinks::udp::UdpSink;

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use crate::sinks::unix::UnixSink;
