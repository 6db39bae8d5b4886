use statsd_publisher::{Publisher, SpySink};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(3);

#[allow(dead_code)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[allow(dead_code)]
pub fn new_spy_publisher(sink: &Arc<SpySink>) -> Publisher {
    init_logging();
    Publisher::builder("spy", Arc::clone(sink))
        .with_flush_interval(Duration::from_millis(50))
        .build()
        .unwrap()
}

/// Submit `iterations` lines from each of `num_threads` threads, returning
/// once every thread is done.
#[allow(dead_code)]
pub fn run_producers(publisher: &Arc<Publisher>, num_threads: u64, iterations: u64, pause: Option<Duration>) {
    let threads: Vec<_> = (0..num_threads)
        .map(|t| {
            let local = Arc::clone(publisher);

            thread::spawn(move || {
                for i in 0..iterations {
                    local.submit(format!("producer.{}:{}|c", t, i));
                    if let Some(pause) = pause {
                        thread::sleep(pause);
                    }
                }
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }
}
