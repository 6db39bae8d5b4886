// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Delivery path between producer threads and the current connection.
//!
//! Producers push lines onto a bounded channel tagged with the generation of
//! the connection that was current when they submitted. A single worker
//! thread drains the channel and sends each line only if its generation is
//! still the current one, so lines accepted before a `stop()` can never be
//! delivered on a connection opened by a later `start()`.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, trace, warn};

use crate::sinks::{Connection, SinkStats};
use crate::sync::{self, lock, ExecuteStats, Watch};
use crate::types::{Line, PublishError, PublishResult};

pub(crate) type ErrorHandler = Box<dyn Fn(PublishError) + Send + Sync + 'static>;

pub(crate) fn nop_error_handler(_err: PublishError) {
    // nothing
}

pub(crate) struct PipelineConfig {
    pub(crate) queue_capacity: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) thread_name: String,
    pub(crate) errors: ErrorHandler,
}

/// Snapshot of counters describing what a publisher has done with the lines
/// submitted to it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublisherStats {
    /// Lines accepted onto the delivery queue.
    pub submitted: u64,
    /// Lines accepted but not yet taken off the queue by the worker. Since
    /// this is computed from two counters it is necessarily approximate.
    pub queued: u64,
    /// Lines taken off the queue by the worker.
    pub drained: u64,
    /// Lines handed to a connection successfully.
    pub sent: u64,
    /// Sends (or flushes) that failed.
    pub send_failures: u64,
    /// Failures since the last successful send.
    pub consecutive_failures: u64,
    /// Lines dropped because the publisher was not running.
    pub dropped_stopped: u64,
    /// Lines dropped because the queue was full.
    pub dropped_full: u64,
    /// Lines dropped because their connection was torn down before delivery.
    pub dropped_stale: u64,
    /// Empty lines refused at submission.
    pub rejected: u64,
    /// Generation of the current connection, `0` when there is none.
    pub generation: u64,
    /// Number of times the delivery worker panicked and was restarted.
    pub panics: u64,
    /// I/O telemetry of the current connection.
    pub connection: SinkStats,
}

#[derive(Debug, Default)]
struct PipelineStats {
    submitted: AtomicU64,
    drained: AtomicU64,
    sent: AtomicU64,
    send_failures: AtomicU64,
    consecutive_failures: AtomicU64,
    dropped_stopped: AtomicU64,
    dropped_full: AtomicU64,
    dropped_stale: AtomicU64,
    rejected: AtomicU64,
}

fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

enum Message {
    Deliver { generation: u64, line: Line },
    Shutdown,
}

struct Current {
    generation: u64,
    conn: Arc<dyn Connection>,
}

/// Clears the in-flight marker when a send or flush completes, including
/// when the connection panics in the middle of it.
struct InFlight<'a> {
    watch: &'a Watch<Option<u64>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.watch.set(None);
    }
}

/// State shared between the producers, the controller and the worker.
struct Shared {
    receiver: Receiver<Message>,
    // Generation accepting new lines, 0 when none is.
    live: AtomicU64,
    slot: Mutex<Option<Current>>,
    in_flight: Watch<Option<u64>>,
    shutdown: AtomicBool,
    finished: Watch<bool>,
    flush_interval: Duration,
    errors: ErrorHandler,
    stats: PipelineStats,
}

impl Shared {
    fn run(&self) {
        let mut last_flush = Instant::now();

        while !self.shutdown.load(Ordering::Acquire) {
            match self.receiver.recv_timeout(self.flush_interval) {
                Ok(Message::Deliver { generation, line }) => {
                    incr(&self.stats.drained);
                    self.deliver(generation, &line);
                }
                Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            if last_flush.elapsed() >= self.flush_interval {
                self.flush_current();
                last_flush = Instant::now();
            }
        }

        // Whatever is still queued belongs to a connection that is gone.
        let mut discarded = 0u64;
        for msg in self.receiver.try_iter() {
            if let Message::Deliver { .. } = msg {
                incr(&self.stats.drained);
                incr(&self.stats.dropped_stale);
                discarded += 1;
            }
        }

        debug!(discarded, "Delivery worker stopped.");
        self.finished.set(true);
    }

    /// Mark the current connection as in use if it matches `generation`.
    ///
    /// The marker is set while the slot is locked so that a controller which
    /// takes the connection out of the slot afterwards is guaranteed to see
    /// it and wait.
    fn begin(&self, generation: Option<u64>) -> Option<(u64, Arc<dyn Connection>)> {
        let slot = lock(&self.slot);
        match slot.as_ref() {
            Some(current) if generation.map_or(true, |g| g == current.generation) => {
                self.in_flight.set(Some(current.generation));
                Some((current.generation, Arc::clone(&current.conn)))
            }
            _ => None,
        }
    }

    fn deliver(&self, generation: u64, line: &Line) {
        let conn = match self.begin(Some(generation)) {
            Some((_, conn)) => conn,
            None => {
                incr(&self.stats.dropped_stale);
                trace!(generation, "Dropping line queued for a connection that is no longer current.");
                return;
            }
        };

        // The error handler runs once the send is no longer in flight, so
        // a handler that stops the publisher does not wait on itself.
        let res = {
            let _in_flight = InFlight { watch: &self.in_flight };
            conn.send(line.as_bytes())
        };

        match res {
            Ok(_) => self.record_success(),
            Err(e) => self.record_failure(generation, e),
        }
    }

    fn flush_current(&self) {
        let (generation, conn) = match self.begin(None) {
            Some(current) => current,
            None => return,
        };

        let res = {
            let _in_flight = InFlight { watch: &self.in_flight };
            conn.flush()
        };

        if let Err(e) = res {
            self.record_failure(generation, e);
        }
    }

    fn record_success(&self) {
        incr(&self.stats.sent);

        let failures = self.stats.consecutive_failures.swap(0, Ordering::Relaxed);
        if failures > 0 {
            info!(failures, "Sending lines recovered.");
        }
    }

    fn record_failure(&self, generation: u64, e: io::Error) {
        incr(&self.stats.send_failures);

        let failures = self.stats.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == 1 {
            warn!(generation, error = %e, "Failed to send line, dropping it.");
        } else {
            trace!(generation, failures, error = %e, "Failed to send line, dropping it.");
        }

        (self.errors)(PublishError::Send { source: e });
    }
}

/// Bounded queue plus the single worker that sends queued lines to the
/// current connection.
///
/// Only the lifecycle controller calls `.attach()` and `.detach()`; any
/// number of threads may call `.submit()` at the same time.
pub(crate) struct Pipeline {
    shared: Arc<Shared>,
    sender: Sender<Message>,
    executor: Arc<ExecuteStats>,
    next_generation: AtomicU64,
}

impl Pipeline {
    pub(crate) fn new(config: PipelineConfig) -> PublishResult<Pipeline> {
        let (sender, receiver) = crossbeam_channel::bounded(config.queue_capacity.max(1));
        let shared = Arc::new(Shared {
            receiver,
            live: AtomicU64::new(0),
            slot: Mutex::new(None),
            in_flight: Watch::new(None),
            shutdown: AtomicBool::new(false),
            finished: Watch::new(false),
            flush_interval: config.flush_interval,
            errors: config.errors,
            stats: PipelineStats::default(),
        });

        let worker = Arc::clone(&shared);
        let executor = sync::execute(&config.thread_name, move || worker.run())
            .map_err(|source| PublishError::Backend { source })?;

        Ok(Pipeline {
            shared,
            sender,
            executor,
            next_generation: AtomicU64::new(0),
        })
    }

    /// Queue a line for delivery on the current connection, or drop it.
    ///
    /// Never blocks and never fails from the caller's point of view.
    pub(crate) fn submit(&self, line: Line) {
        let stats = &self.shared.stats;

        if line.is_empty() {
            incr(&stats.rejected);
            trace!("Rejecting empty line.");
            return;
        }

        let generation = self.shared.live.load(Ordering::Acquire);
        if generation == 0 {
            incr(&stats.dropped_stopped);
            trace!("Dropping line submitted while not running.");
            return;
        }

        match self.sender.try_send(Message::Deliver { generation, line }) {
            Ok(()) => incr(&stats.submitted),
            Err(TrySendError::Full(_)) => {
                incr(&stats.dropped_full);
                trace!(generation, "Dropping line, delivery queue is full.");
            }
            Err(TrySendError::Disconnected(_)) => incr(&stats.dropped_stopped),
        }
    }

    /// Install a new current connection and start accepting lines for it.
    /// Returns the generation assigned to the connection.
    pub(crate) fn attach(&self, conn: Arc<dyn Connection>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        // The slot must be populated before producers can tag lines with
        // the new generation.
        *lock(&self.shared.slot) = Some(Current { generation, conn });
        self.shared.live.store(generation, Ordering::Release);
        generation
    }

    /// Stop accepting lines, remove the current connection and wait up to
    /// `settle` for a send that is using it to finish.
    ///
    /// Returns the connection, if there was one, and whether it settled in
    /// time. The caller is responsible for disposing it.
    pub(crate) fn detach(&self, settle: Duration) -> Option<(Arc<dyn Connection>, bool)> {
        self.shared.live.store(0, Ordering::Release);

        let current = lock(&self.shared.slot).take()?;
        let settled = self.shared.in_flight.wait_until(settle, |g| g.is_none());
        Some((current.conn, settled))
    }

    /// The current connection, if any.
    pub(crate) fn current(&self) -> Option<Arc<dyn Connection>> {
        lock(&self.shared.slot).as_ref().map(|c| Arc::clone(&c.conn))
    }

    /// Tell the worker to exit and wait up to `timeout` for it to do so.
    pub(crate) fn shutdown(&self, timeout: Duration) -> bool {
        self.shared.live.store(0, Ordering::Release);
        self.shared.shutdown.store(true, Ordering::Release);
        // Only wakes the worker early; the flag above is what stops it.
        let _ = self.sender.try_send(Message::Shutdown);
        self.shared.finished.wait_until(timeout, |done| *done)
    }

    pub(crate) fn stats(&self) -> PublisherStats {
        let stats = &self.shared.stats;
        let submitted = load(&stats.submitted);
        let drained = load(&stats.drained);

        PublisherStats {
            submitted,
            queued: submitted.saturating_sub(drained),
            drained,
            sent: load(&stats.sent),
            send_failures: load(&stats.send_failures),
            consecutive_failures: load(&stats.consecutive_failures),
            dropped_stopped: load(&stats.dropped_stopped),
            dropped_full: load(&stats.dropped_full),
            dropped_stale: load(&stats.dropped_stale),
            rejected: load(&stats.rejected),
            generation: self.shared.live.load(Ordering::Acquire),
            panics: self.executor.panics(),
            connection: self.current().map(|c| c.stats()).unwrap_or_default(),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("generation", &self.shared.live.load(Ordering::Acquire))
            .field("queued", &self.sender.len())
            .field("in_flight", &self.shared.in_flight.get())
            .finish()
    }
}
