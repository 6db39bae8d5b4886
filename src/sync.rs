// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::error;

/// Lock a mutex, ignoring poisoning.
///
/// Every piece of state guarded this way is left consistent between
/// statements, so a panic on another thread holding the lock never leaves
/// anything half-written that we need to refuse to read.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Value guarded by a mutex that threads can wait on until it satisfies
/// some condition.
#[derive(Debug, Default)]
pub(crate) struct Watch<T> {
    value: Mutex<T>,
    cond: Condvar,
}

impl<T> Watch<T> {
    pub(crate) fn new(value: T) -> Self {
        Watch {
            value: Mutex::new(value),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn set(&self, value: T) {
        *lock(&self.value) = value;
        self.cond.notify_all();
    }

    pub(crate) fn get(&self) -> T
    where
        T: Clone,
    {
        lock(&self.value).clone()
    }

    /// Block until `done` returns true for the current value or the timeout
    /// elapses. Returns whether the condition was met.
    pub(crate) fn wait_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        let guard = lock(&self.value);
        let (guard, _res) = self
            .cond
            .wait_timeout_while(guard, timeout, |v| !done(v))
            .unwrap_or_else(PoisonError::into_inner);
        done(&guard)
    }
}

/// Statistics about the job being run by the `execute` function.
#[derive(Debug, Default)]
pub(crate) struct ExecuteStats {
    panics: AtomicU64,
}

impl ExecuteStats {
    fn incr_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}

/// Execute the task `f` in a new named thread until completion, restarting
/// it if the task panics.
///
/// Since a new thread is created for each task executed, this should only be
/// used for long-running tasks.
pub(crate) fn execute<F>(name: &str, f: F) -> io::Result<Arc<ExecuteStats>>
where
    F: Fn() + Send + Sync + 'static,
{
    let stats = Arc::new(ExecuteStats::default());
    spawn_in_thread(name.to_string(), Arc::new(f), Arc::clone(&stats))?;
    Ok(stats)
}

fn spawn_in_thread<F>(name: String, job: Arc<F>, stats: Arc<ExecuteStats>) -> io::Result<thread::JoinHandle<()>>
where
    F: Fn() + Send + Sync + 'static,
{
    thread::Builder::new().name(name.clone()).spawn(move || {
        let mut sentinel = Sentinel::new(&name, &job, &stats);
        job();
        sentinel.cancel();
    })
}

/// Struct for ensuring a job runs to completion correctly, without panicking.
///
/// The sentinel will spawn a new thread to continue running the job in its
/// destructor unless the `.cancel()` method is called after the job
/// completes (which won't happen if the job panics).
struct Sentinel<'a, F>
where
    F: Fn() + Send + Sync + 'static,
{
    name: &'a str,
    job: &'a Arc<F>,
    stats: &'a Arc<ExecuteStats>,
    active: bool,
}

impl<'a, F> Sentinel<'a, F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn new(name: &'a str, job: &'a Arc<F>, stats: &'a Arc<ExecuteStats>) -> Sentinel<'a, F> {
        Sentinel {
            name,
            job,
            stats,
            active: true,
        }
    }

    fn cancel(&mut self) {
        self.active = false;
    }
}

impl<'a, F> Drop for Sentinel<'a, F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.active {
            self.stats.incr_panic();
            error!(thread = self.name, panics = self.stats.panics(), "Worker panicked, restarting.");

            if let Err(e) = spawn_in_thread(self.name.to_string(), Arc::clone(self.job), Arc::clone(self.stats)) {
                error!(thread = self.name, error = %e, "Unable to restart worker thread.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{execute, Watch};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_watch_wait_until_met() {
        let watch = Arc::new(Watch::new(0u32));
        let watch_ref = Arc::clone(&watch);

        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            watch_ref.set(3);
        });

        assert!(watch.wait_until(Duration::from_secs(5), |v| *v == 3));
        t.join().unwrap();
    }

    #[test]
    fn test_watch_wait_until_timeout() {
        let watch = Watch::new(false);
        assert!(!watch.wait_until(Duration::from_millis(10), |v| *v));
        assert!(!watch.get());
    }

    #[test]
    fn test_execute_restarts_after_panic() {
        let runs = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(Watch::new(false));

        let runs_ref = Arc::clone(&runs);
        let done_ref = Arc::clone(&done);
        let stats = execute("test-execute", move || {
            if runs_ref.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("This thread is supposed to panic");
            }
            done_ref.set(true);
        })
        .unwrap();

        assert!(done.wait_until(Duration::from_secs(5), |v| *v));
        assert_eq!(1, stats.panics());
        assert_eq!(2, runs.load(Ordering::SeqCst));
    }
}
