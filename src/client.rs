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
use std::sync::Arc;
use std::time::Duration;

use crate::encoder::{Encoder, Flavor, LineEncoder, MetricEvent};
use crate::publisher::Publisher;

/// Trait for incrementing and decrementing counters.
///
/// Counters are simple values incremented or decremented by a client. The
/// rates at which these events occur or average values will be determined
/// by the server receiving them. Examples of counter uses include number
/// of logins to a system or requests received.
pub trait Counted {
    /// Increment or decrement the counter by the given amount
    fn count_with_tags(&self, key: &str, count: i64, tags: &[(&str, &str)]);

    fn count(&self, key: &str, count: i64) {
        self.count_with_tags(key, count, &[])
    }

    /// Increment the counter by `1`
    fn incr(&self, key: &str) {
        self.count(key, 1)
    }

    fn incr_with_tags(&self, key: &str, tags: &[(&str, &str)]) {
        self.count_with_tags(key, 1, tags)
    }

    /// Decrement the counter by `1`
    fn decr(&self, key: &str) {
        self.count(key, -1)
    }

    fn decr_with_tags(&self, key: &str, tags: &[(&str, &str)]) {
        self.count_with_tags(key, -1, tags)
    }
}

/// Trait for recording timings in milliseconds.
///
/// Timings are a positive number of milliseconds between a start and end
/// time. Examples include time taken to render a web page or time taken
/// for a database call to return.
pub trait Timed {
    fn time_with_tags(&self, key: &str, millis: u64, tags: &[(&str, &str)]);

    /// Record a timing in milliseconds with the given key
    fn time(&self, key: &str, millis: u64) {
        self.time_with_tags(key, millis, &[])
    }

    /// Record a timing given as a `Duration`, truncated to milliseconds.
    fn time_duration(&self, key: &str, duration: Duration) {
        self.time_duration_with_tags(key, duration, &[])
    }

    fn time_duration_with_tags(&self, key: &str, duration: Duration, tags: &[(&str, &str)]) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.time_with_tags(key, millis, tags)
    }
}

/// Trait for recording gauge values.
///
/// Gauge values are an instantaneous measurement of a value determined
/// by the client. They do not change unless changed by the client. Examples
/// include things like load average or how many connections are active.
pub trait Gauged {
    fn gauge_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]);

    fn gauge_f64_with_tags(&self, key: &str, value: f64, tags: &[(&str, &str)]);

    /// Record a gauge value with the given key
    fn gauge(&self, key: &str, value: u64) {
        self.gauge_with_tags(key, value, &[])
    }

    /// Record a floating point gauge value. Non-finite values are dropped.
    fn gauge_f64(&self, key: &str, value: f64) {
        self.gauge_f64_with_tags(key, value, &[])
    }
}

/// Trait for recording histogram values.
///
/// Histogram values are positive values that can represent anything, whose
/// statistical distribution is calculated by the server.
pub trait Histogrammed {
    fn histogram_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]);

    fn histogram(&self, key: &str, value: u64) {
        self.histogram_with_tags(key, value, &[])
    }
}

/// Trait for recording distribution values.
///
/// Similar to histograms, but aggregated globally by the server. Only
/// Datadog understands distributions; other flavors send them as histograms.
pub trait Distributed {
    fn distribution_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]);

    fn distribution(&self, key: &str, value: u64) {
        self.distribution_with_tags(key, value, &[])
    }
}

/// Trait for recording set values.
///
/// Sets count the number of unique elements in a group, such as the number
/// of unique visitors to a site.
pub trait Setted {
    fn set_with_tags(&self, key: &str, value: i64, tags: &[(&str, &str)]);

    fn set(&self, key: &str, value: i64) {
        self.set_with_tags(key, value, &[])
    }
}

/// Trait that encompasses all other traits for sending metrics.
///
/// ```
/// use std::sync::Arc;
/// use statsd_publisher::prelude::*;
/// use statsd_publisher::{NopSink, Publisher, StatsdClient};
///
/// let publisher = Arc::new(Publisher::builder("127.0.0.1:8125", NopSink).build().unwrap());
/// let client: Box<dyn MetricClient> = Box::new(StatsdClient::from_publisher("prefix", publisher));
///
/// client.count("some.counter", 1);
/// client.time("some.timer", 42);
/// client.gauge("some.gauge", 8);
/// client.histogram("some.histogram", 4);
/// ```
pub trait MetricClient: Counted + Timed + Gauged + Histogrammed + Distributed + Setted {}

/// Builder for creating and customizing `StatsdClient` instances.
///
/// Instances of the builder should be created by calling the `::builder()`
/// method on the `StatsdClient` struct.
pub struct StatsdClientBuilder {
    publisher: Arc<Publisher>,
    encoder: LineEncoder,
    custom: Option<Arc<dyn Encoder>>,
}

impl StatsdClientBuilder {
    fn new(prefix: &str, publisher: Arc<Publisher>) -> Self {
        StatsdClientBuilder {
            publisher,
            encoder: LineEncoder::new(prefix),
            custom: None,
        }
    }

    pub fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.encoder = self.encoder.with_flavor(flavor);
        self
    }

    /// Add a default tag to every metric sent by this client.
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.encoder = self.encoder.with_tag(key, value);
        self
    }

    /// Use a custom encoder instead of the built-in one. The prefix, flavor
    /// and default tags of this builder are ignored.
    pub fn with_encoder<E>(mut self, encoder: E) -> Self
    where
        E: Encoder + 'static,
    {
        self.custom = Some(Arc::new(encoder));
        self
    }

    pub fn build(self) -> StatsdClient {
        let encoder: Arc<dyn Encoder> = match self.custom {
            Some(custom) => custom,
            None => Arc::new(self.encoder),
        };

        StatsdClient {
            publisher: self.publisher,
            encoder,
        }
    }
}

impl fmt::Debug for StatsdClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdClientBuilder")
            .field("publisher", &self.publisher)
            .field("encoder", &self.encoder)
            .finish()
    }
}

/// Client for Statsd that encodes metrics and submits them to a `Publisher`.
///
/// Every method is fire-and-forget: it encodes the metric on the calling
/// thread and hands the resulting line to the publisher, which drops it if
/// it is stopped. Nothing here ever returns an error or blocks on the
/// network.
///
/// The client is cheap to clone; clones share the same publisher and
/// encoder. Starting and stopping is done through the publisher, which can
/// be obtained from `.publisher()`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use statsd_publisher::prelude::*;
/// use statsd_publisher::{Flavor, NopSink, Publisher, StatsdClient};
///
/// let publisher = Arc::new(Publisher::builder("127.0.0.1:8125", NopSink).build_started().unwrap());
/// let client = StatsdClient::builder("my.app", publisher)
///     .with_flavor(Flavor::Datadog)
///     .with_tag("env", "prod")
///     .build();
///
/// client.incr("requests");
/// client.gauge_with_tags("connections", 12, &[("pool", "db")]);
/// client.publisher().stop();
/// ```
#[derive(Clone)]
pub struct StatsdClient {
    publisher: Arc<Publisher>,
    encoder: Arc<dyn Encoder>,
}

impl StatsdClient {
    /// Create a new builder with the given prefix and publisher.
    pub fn builder(prefix: &str, publisher: Arc<Publisher>) -> StatsdClientBuilder {
        StatsdClientBuilder::new(prefix, publisher)
    }

    /// Create a new client with the given prefix, the Datadog flavor and no
    /// default tags.
    pub fn from_publisher(prefix: &str, publisher: Arc<Publisher>) -> Self {
        Self::builder(prefix, publisher).build()
    }

    /// Encode and submit an arbitrary metric event.
    pub fn record(&self, event: &MetricEvent) {
        for line in self.encoder.encode(event) {
            self.publisher.submit(line);
        }
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    fn record_tagged(&self, event: MetricEvent, tags: &[(&str, &str)]) {
        let event = tags.iter().fold(event, |e, &(k, v)| e.with_tag(k, v));
        self.record(&event);
    }
}

impl Counted for StatsdClient {
    fn count_with_tags(&self, key: &str, count: i64, tags: &[(&str, &str)]) {
        self.record_tagged(MetricEvent::counter(key, count), tags)
    }
}

impl Timed for StatsdClient {
    fn time_with_tags(&self, key: &str, millis: u64, tags: &[(&str, &str)]) {
        self.record_tagged(MetricEvent::timer(key, millis), tags)
    }
}

impl Gauged for StatsdClient {
    fn gauge_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]) {
        self.record_tagged(MetricEvent::gauge(key, value), tags)
    }

    fn gauge_f64_with_tags(&self, key: &str, value: f64, tags: &[(&str, &str)]) {
        self.record_tagged(MetricEvent::gauge_f64(key, value), tags)
    }
}

impl Histogrammed for StatsdClient {
    fn histogram_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]) {
        self.record_tagged(MetricEvent::histogram(key, value), tags)
    }
}

impl Distributed for StatsdClient {
    fn distribution_with_tags(&self, key: &str, value: u64, tags: &[(&str, &str)]) {
        self.record_tagged(MetricEvent::distribution(key, value), tags)
    }
}

impl Setted for StatsdClient {
    fn set_with_tags(&self, key: &str, value: i64, tags: &[(&str, &str)]) {
        self.record_tagged(MetricEvent::set(key, value), tags)
    }
}

impl MetricClient for StatsdClient {}

impl fmt::Debug for StatsdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsdClient")
            .field("publisher", &self.publisher)
            .finish()
    }
}
