use statsd_publisher::test::wait_until;
use statsd_publisher::{Connection, FnSink, LifecycleState, PublishError, Publisher, SpySink};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

mod utils;
use utils::{init_logging, new_spy_publisher, run_producers, TIMEOUT};

#[test]
fn test_all_lines_sent_while_healthy() {
    let sink = Arc::new(SpySink::new());
    let publisher = Arc::new(new_spy_publisher(&sink));
    publisher.start().unwrap();

    run_producers(&publisher, 4, 250, None);

    assert!(wait_until(TIMEOUT, || sink.total_sends() == 1000));
    let stats = publisher.stats();
    assert_eq!(1000, stats.submitted);
    assert_eq!(1000, stats.sent);
    assert_eq!(0, stats.dropped_stopped);
    assert!(wait_until(TIMEOUT, || publisher.stats().queued == 0));
}

#[test]
fn test_lines_submitted_while_stopped_never_delivered() {
    let sink = Arc::new(SpySink::new());
    let publisher = new_spy_publisher(&sink);

    publisher.submit("before.first.start:1|c");
    publisher.start().unwrap();
    publisher.stop();
    publisher.submit("while.stopped:1|c");
    publisher.start().unwrap();
    publisher.submit("marker:1|c");

    assert!(wait_until(TIMEOUT, || sink.total_sends() == 1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(vec!["marker:1|c".to_string()], sink.lines());
    assert_eq!(2, publisher.stats().dropped_stopped);
}

#[test]
fn test_old_connection_frozen_after_stop() {
    let sink = Arc::new(SpySink::new().with_send_delay(Duration::from_millis(2)));
    let publisher = new_spy_publisher(&sink);

    publisher.start().unwrap();
    for i in 0..50 {
        publisher.submit(format!("old:{}|c", i));
    }
    publisher.stop();

    let first = Arc::clone(&sink.connections()[0]);
    let frozen = first.sends();
    assert!(first.is_disposed());

    publisher.start().unwrap();
    for i in 0..5 {
        publisher.submit(format!("new:{}|c", i));
    }

    let second = Arc::clone(&sink.connections()[1]);
    assert!(wait_until(TIMEOUT, || second.sends() == 5));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(frozen, first.sends());
    assert!(first.lines().iter().all(|l| l.starts_with("old:")));
    assert!(second.lines().iter().all(|l| l.starts_with("new:")));
    assert_eq!(0, sink.sends_after_dispose());
}

#[test]
fn test_stop_forces_disposal_of_stuck_send() {
    let sink = Arc::new(SpySink::new().with_send_delay(Duration::from_millis(300)));
    init_logging();
    let publisher = Publisher::builder("spy", Arc::clone(&sink))
        .with_flush_interval(Duration::from_millis(50))
        .with_settle_timeout(Duration::from_millis(50))
        .build_started()
        .unwrap();

    publisher.submit("a:1|c");
    assert!(wait_until(TIMEOUT, || publisher.stats().drained == 1));
    // Let the worker get well into the slow send.
    thread::sleep(Duration::from_millis(50));

    let begin = Instant::now();
    publisher.stop();
    let took = begin.elapsed();
    assert!(took < Duration::from_millis(250), "stop took {:?}", took);

    let first = Arc::clone(&sink.connections()[0]);
    assert!(first.is_disposed());

    publisher.start().unwrap();
    publisher.submit("b:1|c");
    let second = Arc::clone(&sink.connections()[1]);
    assert!(wait_until(TIMEOUT, || second.sends() == 1));

    assert!(first.lines().is_empty());
    assert_eq!(1, first.sends_after_dispose());
    assert_eq!(vec!["b:1|c".to_string()], second.lines());
}

#[test]
fn test_lifecycle_idempotent() {
    let sink = Arc::new(SpySink::new());
    let publisher = new_spy_publisher(&sink);

    publisher.start().unwrap();
    publisher.start().unwrap();
    assert_eq!(1, sink.opened());
    assert_eq!(1, sink.live());

    publisher.stop();
    publisher.stop();
    assert_eq!(LifecycleState::Stopped, publisher.state());
    assert_eq!(0, sink.live());
}

#[test]
fn test_stop_start_end_to_end() {
    let sink = Arc::new(SpySink::new());
    let publisher = new_spy_publisher(&sink);

    publisher.start().unwrap();
    publisher.submit("first:1|c");
    publisher.submit("first:2|c");
    publisher.submit("first:3|c");
    assert!(wait_until(TIMEOUT, || sink.total_sends() == 3));

    publisher.stop();
    publisher.submit("stopped:1|c");
    publisher.submit("stopped:2|c");
    publisher.submit("stopped:3|c");
    assert!(!wait_until(Duration::from_millis(300), || sink.total_sends() != 3));

    publisher.start().unwrap();
    publisher.submit("second:1|c");
    publisher.submit("second:2|c");
    assert!(wait_until(TIMEOUT, || sink.total_sends() == 5));

    let lines = sink.lines();
    assert_eq!(5, lines.len());
    assert!(lines.iter().all(|l| !l.starts_with("stopped:")));
    assert_eq!(vec!["second:1|c".to_string(), "second:2|c".to_string()], sink.connections()[1].lines());
}

#[test]
fn test_fn_sink_stop_start() {
    init_logging();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_ref = Arc::clone(&seen);
    let sink = FnSink::new(move |line: &[u8]| {
        seen_ref.lock().unwrap().push(String::from_utf8_lossy(line).into_owned());
    });

    let publisher = Publisher::builder("callback", sink).build_started().unwrap();
    publisher.submit("my.counter:1|c");
    assert!(wait_until(TIMEOUT, || seen.lock().unwrap().len() == 1));

    publisher.stop();
    publisher.submit("my.counter:2|c");
    publisher.start().unwrap();
    publisher.submit("my.counter:3|c");

    assert!(wait_until(TIMEOUT, || seen.lock().unwrap().len() == 2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(vec!["my.counter:1|c", "my.counter:3|c"], *seen.lock().unwrap());
}

#[test]
fn test_start_after_close_is_rejected() {
    let sink = Arc::new(SpySink::new());
    let publisher = new_spy_publisher(&sink);

    publisher.start().unwrap();
    publisher.close();

    assert!(matches!(publisher.start(), Err(PublishError::Closed)));
    assert_eq!(LifecycleState::Closed, publisher.state());
    publisher.stop();
    assert_eq!(LifecycleState::Closed, publisher.state());

    publisher.submit("after.close:1|c");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(0, sink.total_sends());
    assert_eq!(1, sink.opened());
}

#[test]
fn test_open_failure_then_retry() {
    let sink = Arc::new(SpySink::new());
    let publisher = new_spy_publisher(&sink);

    sink.set_fail_open(true);
    assert!(publisher.start().is_err());
    assert!(!publisher.is_running());
    publisher.submit("not.running:1|c");

    sink.set_fail_open(false);
    publisher.start().unwrap();
    publisher.submit("running:1|c");
    assert!(wait_until(TIMEOUT, || sink.total_sends() == 1));
    assert_eq!(vec!["running:1|c".to_string()], sink.lines());
}

#[test]
fn test_send_failures_do_not_stop_publisher() {
    let sink = Arc::new(SpySink::new());
    let publisher = new_spy_publisher(&sink);
    publisher.start().unwrap();

    let conn = Arc::clone(&sink.connections()[0]);
    conn.set_failing(true);
    publisher.submit("lost:1|c");
    publisher.submit("lost:2|c");
    assert!(wait_until(TIMEOUT, || publisher.stats().send_failures == 2));
    assert!(publisher.is_running());
    assert!(publisher.is_connected());

    conn.set_failing(false);
    publisher.submit("recovered:1|c");
    assert!(wait_until(TIMEOUT, || sink.total_sends() == 1));
    assert_eq!(0, publisher.stats().consecutive_failures);
    assert_eq!(1, sink.opened());
}

#[test]
fn test_empty_lines_rejected() {
    let sink = Arc::new(SpySink::new());
    let publisher = new_spy_publisher(&sink);
    publisher.start().unwrap();

    publisher.submit("");
    publisher.submit(Vec::<u8>::new());
    publisher.submit("ok:1|c");

    assert!(wait_until(TIMEOUT, || sink.total_sends() == 1));
    assert_eq!(2, publisher.stats().rejected);
}
