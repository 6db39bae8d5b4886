// statsd-publisher - A restartable Statsd publishing pipeline for Rust
//
// Copyright 2026 The statsd-publisher developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Utilities for testing the publisher itself.
//!
//! Functionality exported to be used by integration tests. This module
//! is NOT part of the public API and is subject to change at any time.

use std::env;
use std::fs;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::sync::lock;

/// Poll `predicate` until it returns true or `timeout` elapses. Returns the
/// last value of the predicate.
pub fn wait_until<F>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }

        if Instant::now() >= deadline {
            return predicate();
        }

        thread::sleep(Duration::from_millis(5));
    }
}

/// Create a temporary directory and construct paths to files within it
///
/// When this object goes out of scope, any files under the temporary directory
/// it is responsible for ($TMP + $PREFIX) will be deleted.
#[derive(Debug)]
pub struct TempDir {
    base: PathBuf,
}

impl TempDir {
    pub fn new<P>(prefix: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let base = env::temp_dir().join(prefix);
        fs::create_dir_all(&base)?;
        Ok(TempDir { base })
    }

    pub fn new_path<P>(&self, name: P) -> PathBuf
    where
        P: AsRef<Path>,
    {
        self.base.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.base);
    }
}

/// Basic Statsd server listening on a local UDP port.
///
/// The server reads datagrams in a background thread and keeps every
/// received packet, so tests can check what arrived and when. Dropping the
/// server (or calling `.shutdown()`) stops the thread and releases the port,
/// after which a new server may be bound to the same port to simulate a
/// collector restart.
pub struct UdpTestServer {
    addr: SocketAddr,
    packets: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UdpTestServer {
    /// Bind a server to `127.0.0.1` on the given port, `0` for any port.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("127.0.0.1", port))?;
        socket.set_read_timeout(Some(Duration::from_millis(20)))?;
        let addr = socket.local_addr()?;

        let packets = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let packets_ref = Arc::clone(&packets);
        let shutdown_ref = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name(format!("udp-test-server-{}", addr.port()))
            .spawn(move || {
                let mut buf = [0u8; 8192];
                while !shutdown_ref.load(Ordering::Acquire) {
                    match socket.recv(&mut buf) {
                        Ok(n) => lock(&packets_ref).push(String::from_utf8_lossy(&buf[..n]).into_owned()),
                        // Receive timeout, check the shutdown flag again.
                        Err(_) => {}
                    }
                }
            })?;

        Ok(UdpTestServer {
            addr,
            packets,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every datagram received so far.
    pub fn packets(&self) -> Vec<String> {
        lock(&self.packets).clone()
    }

    /// Every non-empty newline separated line received so far.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.packets)
            .iter()
            .flat_map(|p| p.split('\n'))
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn line_count(&self) -> usize {
        self.lines().len()
    }

    /// Stop the server and release its port.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for UdpTestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::{wait_until, UdpTestServer};
    use std::net::UdpSocket;
    use std::time::Duration;

    #[test]
    fn test_udp_test_server_receives_lines() {
        let server = UdpTestServer::bind(0).unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(b"a:1|c\nb:2|c\n", server.addr()).unwrap();

        assert!(wait_until(Duration::from_secs(3), || server.line_count() == 2));
        assert_eq!(vec!["a:1|c".to_string(), "b:2|c".to_string()], server.lines());
        assert_eq!(1, server.packets().len());
    }

    #[test]
    fn test_udp_test_server_releases_port() {
        let server = UdpTestServer::bind(0).unwrap();
        let port = server.port();
        server.shutdown();

        let again = UdpTestServer::bind(port).unwrap();
        assert_eq!(port, again.port());
    }

    #[test]
    fn test_wait_until_timeout() {
        assert!(!wait_until(Duration::from_millis(10), || false));
    }
}
