// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Publishes a few metrics to a local Statsd server, stopping and starting
// the publisher along the way. Run with something like `nc -ul 8125` in
// another terminal to watch the lines arrive.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use statsd_publisher::prelude::*;
use statsd_publisher::{Publisher, StatsdClient, UdpSink, DEFAULT_PORT};
use tracing::info;

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let addr = format!("127.0.0.1:{}", DEFAULT_PORT);
    let publisher = Publisher::builder(&addr, UdpSink::new().buffered())
        .with_flush_interval(Duration::from_millis(250))
        .with_error_handler(|e| eprintln!("Error sending metric: {}", e))
        .build_started()
        .unwrap();

    let client = StatsdClient::builder("example", Arc::new(publisher))
        .with_tag("demo", "udp")
        .build();

    for i in 0..10 {
        client.incr("loop.iterations");
        client.gauge("loop.index", i);
        client.time_duration("loop.sleep", Duration::from_millis(100));
        thread::sleep(Duration::from_millis(100));
    }

    client.publisher().stop();
    info!(stats = ?client.publisher().stats(), "Stopped, the next metric is dropped.");
    client.incr("never.sent");

    client.publisher().start().unwrap();
    client.incr("sent.after.restart");
    thread::sleep(Duration::from_millis(500));

    client.publisher().close();
    info!(stats = ?client.publisher().stats(), "Closed.");
}
