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
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::pipeline::{nop_error_handler, ErrorHandler, Pipeline, PipelineConfig, PublisherStats};
use crate::sinks::Sink;
use crate::sync::lock;
use crate::types::{LifecycleState, Line, PublishError, PublishResult};

const DEFAULT_QUEUE_CAPACITY: usize = 128 * 1024;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_THREAD_NAME: &str = "statsd-publisher";

/// Builder for creating and customizing `Publisher` instances.
///
/// Instances of the builder should be created by calling the `::builder()`
/// method on the `Publisher` struct.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use statsd_publisher::{NopSink, Publisher};
///
/// let publisher = Publisher::builder("127.0.0.1:8125", NopSink)
///     .with_queue_capacity(1024)
///     .with_settle_timeout(Duration::from_millis(250))
///     .with_error_handler(|e| eprintln!("Error sending metric: {}", e))
///     .build()
///     .unwrap();
///
/// assert!(!publisher.is_running());
/// ```
pub struct PublisherBuilder {
    addr: String,
    sink: Box<dyn Sink>,
    queue_capacity: usize,
    flush_interval: Duration,
    settle_timeout: Duration,
    thread_name: String,
    errors: ErrorHandler,
}

impl PublisherBuilder {
    fn new<S>(addr: &str, sink: S) -> Self
    where
        S: Sink + 'static,
    {
        PublisherBuilder {
            addr: addr.to_string(),
            sink: Box::new(sink),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            errors: Box::new(nop_error_handler),
        }
    }

    /// Set the maximum number of lines waiting for delivery. Lines submitted
    /// while the queue is full are dropped.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set how often a buffering connection is flushed while idle.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set how long `stop()` and `close()` wait for a send in progress
    /// before disposing the connection anyway.
    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// Set a handler invoked with every send failure.
    ///
    /// The handler runs on the delivery thread and should return quickly.
    /// It is called after the failed send has completed, so it may stop the
    /// publisher without waiting for the settle timeout. Failures are logged
    /// regardless of whether a handler is set.
    pub fn with_error_handler<F>(mut self, errors: F) -> Self
    where
        F: Fn(PublishError) + Send + Sync + 'static,
    {
        self.errors = Box::new(errors);
        self
    }

    pub fn with_thread_name<N: Into<String>>(mut self, name: N) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Construct a new, stopped, `Publisher` instance.
    ///
    /// Fails only if the delivery thread cannot be spawned.
    pub fn build(self) -> PublishResult<Publisher> {
        let pipeline = Pipeline::new(PipelineConfig {
            queue_capacity: self.queue_capacity,
            flush_interval: self.flush_interval,
            thread_name: self.thread_name,
            errors: self.errors,
        })?;

        Ok(Publisher {
            addr: self.addr,
            sink: self.sink,
            lifecycle: Mutex::new(LifecycleState::Stopped),
            state: AtomicU8::new(LifecycleState::Stopped.as_u8()),
            pipeline,
            settle_timeout: self.settle_timeout,
        })
    }

    /// Construct a new `Publisher` instance and start it.
    pub fn build_started(self) -> PublishResult<Publisher> {
        let publisher = self.build()?;
        publisher.start()?;
        Ok(publisher)
    }
}

impl fmt::Debug for PublisherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherBuilder")
            .field("addr", &self.addr)
            .field("queue_capacity", &self.queue_capacity)
            .field("flush_interval", &self.flush_interval)
            .field("settle_timeout", &self.settle_timeout)
            .field("thread_name", &self.thread_name)
            .finish()
    }
}

/// Restartable pipeline delivering lines to a Statsd server.
///
/// A publisher owns a `Sink` and at most one connection opened from it.
/// Lines passed to `.submit()` are queued and sent on a dedicated thread
/// to whichever connection is current, so producers never wait on the
/// network and never see a transport error.
///
/// The publisher can be stopped and started again any number of times
/// without being rebuilt. Every `.start()` opens a brand new connection;
/// every `.stop()` disposes the current one before returning. Lines
/// submitted while stopped are dropped, and lines accepted before a stop
/// are never sent on a connection opened after it.
///
/// All methods take `&self` and are safe to call from any thread, so a
/// publisher is typically shared via an `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use statsd_publisher::{LifecycleState, Publisher, SpySink};
///
/// let sink = Arc::new(SpySink::new());
/// let publisher = Publisher::builder("spy", Arc::clone(&sink)).build().unwrap();
///
/// publisher.start().unwrap();
/// publisher.submit("some.counter:1|c");
///
/// publisher.stop();
/// publisher.submit("dropped.counter:1|c");
/// assert_eq!(LifecycleState::Stopped, publisher.state());
///
/// publisher.close();
/// assert!(publisher.start().is_err());
/// ```
pub struct Publisher {
    addr: String,
    sink: Box<dyn Sink>,
    // Serializes transitions, the atomic below mirrors it for lock-free reads.
    lifecycle: Mutex<LifecycleState>,
    state: AtomicU8,
    pipeline: Pipeline,
    settle_timeout: Duration,
}

impl Publisher {
    /// Create a new builder for a publisher sending to `addr` through
    /// connections opened by `sink`.
    pub fn builder<S>(addr: &str, sink: S) -> PublisherBuilder
    where
        S: Sink + 'static,
    {
        PublisherBuilder::new(addr, sink)
    }

    /// Open a new connection and begin forwarding submitted lines to it.
    ///
    /// Calling this while already running with a live connection does
    /// nothing. If the current connection was disposed out from under the
    /// publisher, it is replaced with a new one.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Closed` after `.close()`, or
    /// `PublishError::Open` if the sink could not open a connection, in
    /// which case the publisher stays stopped and may be started again later.
    pub fn start(&self) -> PublishResult<()> {
        let mut state = lock(&self.lifecycle);
        match *state {
            LifecycleState::Closed => return Err(PublishError::Closed),
            LifecycleState::Running if self.is_connected() => return Ok(()),
            LifecycleState::Running => {
                debug!(addr = %self.addr, "Current connection was disposed, replacing it.");
                self.teardown();
                self.transition(&mut state, LifecycleState::Stopped);
            }
            LifecycleState::Stopped => {}
        }

        let conn = self.sink.open(&self.addr).map_err(|source| {
            warn!(addr = %self.addr, error = %source, "Unable to open connection, publisher remains stopped.");
            PublishError::Open {
                addr: self.addr.clone(),
                source,
            }
        })?;

        let generation = self.pipeline.attach(conn);
        self.transition(&mut state, LifecycleState::Running);
        info!(addr = %self.addr, generation, "Publisher started.");
        Ok(())
    }

    /// Dispose the current connection and drop lines until the next start.
    ///
    /// Returns once the connection is disposed. Does nothing if the
    /// publisher is not running.
    pub fn stop(&self) {
        let mut state = lock(&self.lifecycle);
        if *state != LifecycleState::Running {
            return;
        }

        self.teardown();
        self.transition(&mut state, LifecycleState::Stopped);
        info!(addr = %self.addr, "Publisher stopped.");
    }

    /// Stop the publisher for good and shut down the delivery thread.
    ///
    /// Any subsequent `.start()` fails. Closing more than once does nothing.
    pub fn close(&self) {
        let mut state = lock(&self.lifecycle);
        if *state == LifecycleState::Closed {
            return;
        }

        self.teardown();
        self.transition(&mut state, LifecycleState::Closed);

        if !self.pipeline.shutdown(self.settle_timeout) {
            warn!(timeout = ?self.settle_timeout, "Delivery thread did not exit in time.");
        }
        info!(addr = %self.addr, "Publisher closed.");
    }

    /// Queue a line for delivery. Never blocks and never fails.
    ///
    /// The line is dropped if the publisher is not running, if the queue is
    /// full, or if it is empty.
    pub fn submit<L>(&self, line: L)
    where
        L: Into<Line>,
    {
        self.pipeline.submit(line.into());
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Return true if there is a current connection that has not been
    /// disposed.
    pub fn is_connected(&self) -> bool {
        self.pipeline.current().map_or(false, |c| !c.is_disposed())
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> PublisherStats {
        self.pipeline.stats()
    }

    pub fn address(&self) -> &str {
        &self.addr
    }

    fn transition(&self, state: &mut LifecycleState, next: LifecycleState) {
        *state = next;
        self.state.store(next.as_u8(), Ordering::Release);
    }

    /// Remove the current connection from the pipeline, wait for it to be
    /// idle, then flush and dispose it. Must be called with the lifecycle
    /// lock held.
    fn teardown(&self) {
        let (conn, settled) = match self.pipeline.detach(self.settle_timeout) {
            Some(detached) => detached,
            None => return,
        };

        if settled {
            if let Err(e) = conn.flush() {
                debug!(error = %e, "Unable to flush connection before disposing it.");
            }
        } else {
            warn!(timeout = ?self.settle_timeout, "Send still in progress, disposing connection anyway.");
        }

        conn.dispose();
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::Publisher;
    use crate::sinks::{Connection, SpySink};
    use crate::test::wait_until;
    use crate::types::{ErrorKind, LifecycleState, PublishError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, Weak};
    use std::time::{Duration, Instant};

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn new_publisher(sink: &Arc<SpySink>) -> Publisher {
        Publisher::builder("spy", Arc::clone(sink))
            .with_flush_interval(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[test]
    fn test_initial_state_stopped() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);

        assert_eq!(LifecycleState::Stopped, publisher.state());
        assert!(!publisher.is_running());
        assert!(!publisher.is_connected());
        assert_eq!("spy", publisher.address());
        assert_eq!(0, sink.opened());
    }

    #[test]
    fn test_start_twice_opens_one_connection() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);

        publisher.start().unwrap();
        publisher.start().unwrap();

        assert!(publisher.is_running());
        assert_eq!(1, sink.opened());
        assert_eq!(1, sink.live());
    }

    #[test]
    fn test_stop_disposes_before_returning() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);

        publisher.start().unwrap();
        publisher.stop();

        assert_eq!(LifecycleState::Stopped, publisher.state());
        assert!(sink.connections()[0].is_disposed());
        assert_eq!(0, sink.live());

        publisher.stop();
        assert_eq!(LifecycleState::Stopped, publisher.state());
    }

    #[test]
    fn test_stop_from_stopped_is_noop() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);
        publisher.stop();
        assert_eq!(LifecycleState::Stopped, publisher.state());
    }

    #[test]
    fn test_start_after_stop_opens_new_connection() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);

        publisher.start().unwrap();
        publisher.stop();
        publisher.start().unwrap();

        let connections = sink.connections();
        assert_eq!(2, connections.len());
        assert!(connections[0].is_disposed());
        assert!(!connections[1].is_disposed());
        assert_eq!(2, publisher.stats().generation);
    }

    #[test]
    fn test_start_after_close_fails() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);

        publisher.start().unwrap();
        publisher.close();
        publisher.close();

        let err = publisher.start().unwrap_err();
        assert_eq!(ErrorKind::InvalidState, err.kind());
        assert_eq!(LifecycleState::Closed, publisher.state());
        assert_eq!(1, sink.opened());
        assert_eq!(0, sink.live());
    }

    #[test]
    fn test_start_open_failure_stays_stopped() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);

        sink.set_fail_open(true);
        match publisher.start() {
            Err(PublishError::Open { addr, .. }) => assert_eq!("spy", addr),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(LifecycleState::Stopped, publisher.state());

        sink.set_fail_open(false);
        publisher.start().unwrap();
        assert!(publisher.is_running());
    }

    #[test]
    fn test_start_replaces_disposed_connection() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);

        publisher.start().unwrap();
        sink.connections()[0].dispose();
        assert!(publisher.is_running());
        assert!(!publisher.is_connected());

        publisher.start().unwrap();
        assert!(publisher.is_connected());
        assert_eq!(2, sink.opened());

        publisher.submit("foo:1|c");
        assert!(wait_until(TIMEOUT, || sink.connections()[1].sends() == 1));
    }

    #[test]
    fn test_error_handler_receives_send_failures() {
        let sink = Arc::new(SpySink::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_ref = Arc::clone(&count);

        let publisher = Publisher::builder("spy", Arc::clone(&sink))
            .with_error_handler(move |e| {
                assert_eq!(ErrorKind::IoError, e.kind());
                count_ref.fetch_add(1, Ordering::SeqCst);
            })
            .build_started()
            .unwrap();

        sink.connections()[0].set_failing(true);
        publisher.submit("foo:1|c");
        publisher.submit("foo:2|c");

        assert!(wait_until(TIMEOUT, || count.load(Ordering::SeqCst) == 2));
        assert!(publisher.is_running());
        assert_eq!(1, sink.opened());
    }

    #[test]
    fn test_connection_panic_restarts_worker() {
        let sink = Arc::new(SpySink::new());
        let publisher = new_publisher(&sink);
        publisher.start().unwrap();

        let first = Arc::clone(&sink.connections()[0]);
        first.panic_next_send();
        publisher.submit("boom:1|c");
        assert!(wait_until(TIMEOUT, || publisher.stats().panics == 1));

        // The restarted worker keeps delivering to the same connection.
        publisher.submit("after:1|c");
        assert!(wait_until(TIMEOUT, || first.sends() == 1));
        assert_eq!(vec!["after:1|c".to_string()], first.lines());

        let begin = Instant::now();
        publisher.stop();
        assert!(begin.elapsed() < Duration::from_millis(500));
        assert!(first.is_disposed());

        publisher.start().unwrap();
        publisher.submit("again:1|c");
        assert!(wait_until(TIMEOUT, || sink.connections()[1].sends() == 1));
        assert_eq!(1, first.sends());
        assert_eq!(1, publisher.stats().panics);
    }

    #[test]
    fn test_error_handler_may_stop_publisher() {
        let sink = Arc::new(SpySink::new());
        let handle: Arc<Mutex<Weak<Publisher>>> = Arc::new(Mutex::new(Weak::new()));
        let handle_ref = Arc::clone(&handle);
        let stop_took = Arc::new(Mutex::new(None));
        let stop_took_ref = Arc::clone(&stop_took);

        let publisher = Arc::new(
            Publisher::builder("spy", Arc::clone(&sink))
                .with_settle_timeout(Duration::from_secs(2))
                .with_error_handler(move |_e| {
                    let publisher = handle_ref.lock().unwrap().upgrade();
                    if let Some(p) = publisher {
                        let begin = Instant::now();
                        p.stop();
                        let took = begin.elapsed();
                        drop(p);
                        *stop_took_ref.lock().unwrap() = Some(took);
                    }
                })
                .build_started()
                .unwrap(),
        );
        *handle.lock().unwrap() = Arc::downgrade(&publisher);

        sink.connections()[0].set_failing(true);
        publisher.submit("foo:1|c");

        assert!(wait_until(TIMEOUT, || stop_took.lock().unwrap().is_some()));
        let took = stop_took.lock().unwrap().unwrap();
        assert!(took < Duration::from_secs(1), "stop from error handler took {:?}", took);
        assert_eq!(LifecycleState::Stopped, publisher.state());
        assert!(sink.connections()[0].is_disposed());
    }

    #[test]
    fn test_drop_closes() {
        let sink = Arc::new(SpySink::new());
        {
            let publisher = new_publisher(&sink);
            publisher.start().unwrap();
        }
        assert_eq!(0, sink.live());
    }
}
