// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt::{self, Write};

use crate::types::Line;

/// Type of a metric, determining the symbol used for it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Timer,
    Histogram,
    Distribution,
    Set,
}

impl MetricKind {
    fn symbol(self, flavor: Flavor) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Gauge => "g",
            MetricKind::Timer => "ms",
            MetricKind::Histogram => "h",
            // Only Datadog understands distributions, everyone else gets
            // the closest thing they support.
            MetricKind::Distribution if flavor == Flavor::Datadog => "d",
            MetricKind::Distribution => "h",
            MetricKind::Set => "s",
        }
    }
}

/// Numeric value of a single metric event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl MetricValue {
    fn is_finite(&self) -> bool {
        match *self {
            MetricValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MetricValue::Signed(i) => i.fmt(f),
            MetricValue::Unsigned(i) => i.fmt(f),
            MetricValue::Float(v) => v.fmt(f),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Signed(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Unsigned(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

/// One observed measurement, as produced by the metrics facade.
///
/// Events are immutable once built and consumed exactly once by an
/// [`Encoder`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    name: String,
    kind: MetricKind,
    value: MetricValue,
    tags: Vec<(String, String)>,
    sample_rate: Option<f64>,
}

impl MetricEvent {
    pub fn new<N, V>(name: N, kind: MetricKind, value: V) -> Self
    where
        N: Into<String>,
        V: Into<MetricValue>,
    {
        MetricEvent {
            name: name.into(),
            kind,
            value: value.into(),
            tags: Vec::new(),
            sample_rate: None,
        }
    }

    pub fn counter<N: Into<String>>(name: N, value: i64) -> Self {
        Self::new(name, MetricKind::Counter, value)
    }

    pub fn gauge<N: Into<String>>(name: N, value: u64) -> Self {
        Self::new(name, MetricKind::Gauge, value)
    }

    pub fn gauge_f64<N: Into<String>>(name: N, value: f64) -> Self {
        Self::new(name, MetricKind::Gauge, value)
    }

    pub fn timer<N: Into<String>>(name: N, millis: u64) -> Self {
        Self::new(name, MetricKind::Timer, millis)
    }

    pub fn histogram<N: Into<String>>(name: N, value: u64) -> Self {
        Self::new(name, MetricKind::Histogram, value)
    }

    pub fn distribution<N: Into<String>>(name: N, value: u64) -> Self {
        Self::new(name, MetricKind::Distribution, value)
    }

    pub fn set<N: Into<String>>(name: N, value: i64) -> Self {
        Self::new(name, MetricKind::Set, value)
    }

    /// Attach a `key:value` tag to this event.
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Mark this event as sampled at the given rate. Rates outside of the
    /// range `(0, 1)` are not written to the line.
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn value(&self) -> MetricValue {
        self.value
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }
}

/// Statsd dialect used when encoding tags.
///
/// * `Datadog`: `name:value|type|@rate|#k:v,k2:v2`
/// * `Etsy`: no tag support, tags are folded into the name as `name.k.v`
/// * `Telegraf`: `name,k=v,k2=v2:value|type|@rate`
/// * `Sysdig`: `name#k=v,k2=v2:value|type|@rate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Flavor {
    #[default]
    Datadog,
    Etsy,
    Telegraf,
    Sysdig,
}

/// Conversion of metric events into protocol lines.
///
/// Implementations must be pure: no I/O and no shared mutable state, so that
/// any number of threads can encode concurrently without coordination. They
/// must also be total, returning an empty sequence for input they can't
/// encode instead of failing.
pub trait Encoder: Send + Sync {
    fn encode(&self, event: &MetricEvent) -> Vec<Line>;
}

/// Encoder for the plain text Statsd protocol and its tagged dialects.
///
/// # Example
///
/// ```
/// use statsd_publisher::{Encoder, Flavor, LineEncoder, MetricEvent};
///
/// let encoder = LineEncoder::new("my.app").with_flavor(Flavor::Telegraf);
/// let lines = encoder.encode(&MetricEvent::counter("requests", 1).with_tag("host", "web01"));
///
/// assert_eq!("my.app.requests,host=web01:1|c", lines[0].to_string());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LineEncoder {
    prefix: String,
    flavor: Flavor,
    tags: Vec<(String, String)>,
}

impl LineEncoder {
    /// Create an encoder that prepends `prefix` to every metric name. A
    /// trailing `.` on the prefix is ignored.
    pub fn new(prefix: &str) -> Self {
        LineEncoder {
            prefix: prefix.trim_end_matches('.').to_string(),
            flavor: Flavor::default(),
            tags: Vec::new(),
        }
    }

    pub fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    /// Add a tag appended to every encoded event after its own tags.
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn encode_line(&self, event: &MetricEvent) -> Option<String> {
        if event.name.is_empty() || !event.value.is_finite() {
            return None;
        }

        let tags: Vec<(&str, &str)> = event
            .tags
            .iter()
            .chain(self.tags.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut buf = String::with_capacity(self.prefix.len() + event.name.len() + 32);
        if !self.prefix.is_empty() {
            push_sanitized(&mut buf, &self.prefix, self.flavor.name_reserved());
            buf.push('.');
        }
        push_sanitized(&mut buf, &event.name, self.flavor.name_reserved());

        match self.flavor {
            Flavor::Etsy => push_folded_tags(&mut buf, &tags),
            Flavor::Telegraf => push_kv_tags(&mut buf, ',', &tags),
            Flavor::Sysdig => push_kv_tags(&mut buf, '#', &tags),
            Flavor::Datadog => {}
        }

        let _ = write!(buf, ":{}|{}", event.value, event.kind.symbol(self.flavor));

        if let Some(rate) = event.sample_rate.filter(|r| *r > 0.0 && *r < 1.0) {
            let _ = write!(buf, "|@{}", rate);
        }

        if self.flavor == Flavor::Datadog {
            push_datadog_tags(&mut buf, &tags);
        }

        Some(buf)
    }
}

impl Encoder for LineEncoder {
    fn encode(&self, event: &MetricEvent) -> Vec<Line> {
        self.encode_line(event).map(Line::from).into_iter().collect()
    }
}

impl Flavor {
    fn name_reserved(self) -> &'static [char] {
        match self {
            Flavor::Telegraf => &[':', '|', '@', '#', '\n', '\r', ',', '='],
            _ => &[':', '|', '@', '#', '\n', '\r'],
        }
    }
}

const TAG_RESERVED: &[char] = &[':', '|', '@', '#', '\n', '\r', ',', '='];

fn push_sanitized(buf: &mut String, s: &str, reserved: &[char]) {
    buf.extend(s.chars().map(|c| if reserved.contains(&c) { '_' } else { c }));
}

fn push_datadog_tags(buf: &mut String, tags: &[(&str, &str)]) {
    if tags.is_empty() {
        return;
    }

    buf.push_str("|#");
    for (i, &(key, value)) in tags.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        push_sanitized(buf, key, TAG_RESERVED);
        buf.push(':');
        push_sanitized(buf, value, TAG_RESERVED);
    }
}

fn push_kv_tags(buf: &mut String, start: char, tags: &[(&str, &str)]) {
    for (i, &(key, value)) in tags.iter().enumerate() {
        buf.push(if i == 0 { start } else { ',' });
        push_sanitized(buf, key, TAG_RESERVED);
        buf.push('=');
        push_sanitized(buf, value, TAG_RESERVED);
    }
}

fn push_folded_tags(buf: &mut String, tags: &[(&str, &str)]) {
    const FOLDED_RESERVED: &[char] = &[':', '|', '@', '#', '\n', '\r', ',', '=', '.'];

    for &(key, value) in tags {
        buf.push('.');
        push_sanitized(buf, key, FOLDED_RESERVED);
        buf.push('.');
        push_sanitized(buf, value, FOLDED_RESERVED);
    }
}
