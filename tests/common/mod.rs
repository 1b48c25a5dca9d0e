#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use kvtap::connection::Connection;
use kvtap::{Destination, Frame, Result, TapError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const SET_FOO_BAR: &str = "1700000000.000000 [0 127.0.0.1:1234] \"SET\" \"foo\" \"bar\"";

pub fn monitor_line(args: &[&str]) -> String {
    let quoted: Vec<String> = args.iter().map(|a| format!("\"{a}\"")).collect();
    format!("1700000000.000000 [0 127.0.0.1:1234] {}\r\n", quoted.join(" "))
}

/// In-memory destination recording every replayed command.
pub struct MockDestination {
    calls: Mutex<Vec<Vec<String>>>,
    polls: AtomicUsize,
    /// Number of `INFO` polls answered with a replica role before turning
    /// master, `usize::MAX` never turns master.
    master_after: usize,
    fail_info: AtomicBool,
    fail_writes: AtomicBool,
    /// Writes are recorded but never answered.
    stall_writes: AtomicBool,
}

impl MockDestination {
    fn with_master_after(master_after: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
            master_after,
            fail_info: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            stall_writes: AtomicBool::new(false),
        }
    }

    pub fn master() -> Arc<Self> {
        Arc::new(Self::with_master_after(0))
    }

    pub fn replica() -> Arc<Self> {
        Arc::new(Self::with_master_after(usize::MAX))
    }

    pub fn promoted_after(polls: usize) -> Arc<Self> {
        Arc::new(Self::with_master_after(polls))
    }

    pub fn failing_info() -> Arc<Self> {
        let mock = Self::with_master_after(usize::MAX);
        mock.fail_info.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn failing_writes() -> Arc<Self> {
        let mock = Self::with_master_after(0);
        mock.fail_writes.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn stalled() -> Arc<Self> {
        let mock = Self::with_master_after(0);
        mock.stall_writes.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl Destination for MockDestination {
    fn call(&self, args: Vec<String>) -> impl Future<Output = Result<Frame>> + Send {
        async move {
            if args[0] == "INFO" {
                if self.fail_info.load(Ordering::SeqCst) {
                    return Err(TapError::ConnectionClosed);
                }
                let seen = self.polls.fetch_add(1, Ordering::SeqCst);
                let role = if seen >= self.master_after {
                    "master"
                } else {
                    "slave"
                };
                let info = format!("# Replication\r\nrole:{role}\r\n");
                return Ok(Frame::Bulk(Bytes::from(info)));
            }

            self.calls.lock().unwrap().push(args);
            if self.stall_writes.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(TapError::ErrorReply("READONLY".to_string()));
            }
            Ok(Frame::Simple("OK".to_string()))
        }
    }
}

/// Wait until `cond` holds, panicking after a few seconds.
pub async fn eventually<F: Fn() -> bool>(cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn catalog_entry(name: &str, flags: &[&str]) -> Frame {
    Frame::Array(vec![
        Frame::Bulk(Bytes::copy_from_slice(name.as_bytes())),
        Frame::Integer(-1),
        Frame::Array(flags.iter().map(|f| Frame::Simple(f.to_string())).collect()),
        Frame::Integer(1),
    ])
}

/// A fake store speaking enough RESP for the replicator.
///
/// It answers `COMMAND` with a small catalog, `INFO` with the configured
/// role, records every other command and, when a client sends the inline
/// `MONITOR` command, streams `feed` to it.
pub struct FakeStore {
    pub addr: String,
    pub received: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeStore {
    pub async fn start(role: &'static str, feed: Vec<String>) -> FakeStore {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let received = Arc::new(Mutex::new(Vec::new()));

        let store_received = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let received = store_received.clone();
                let feed = feed.clone();
                tokio::spawn(async move {
                    let mut first = [0u8; 1];
                    if stream.peek(&mut first).await.is_err() {
                        return;
                    }
                    if first[0] == b'*' {
                        serve_resp(stream, role, received).await;
                    } else {
                        serve_monitor(stream, feed).await;
                    }
                });
            }
        });

        FakeStore { addr, received }
    }

    pub fn received(&self) -> Vec<Vec<String>> {
        self.received.lock().unwrap().clone()
    }
}

async fn serve_resp(stream: TcpStream, role: &str, received: Arc<Mutex<Vec<Vec<String>>>>) {
    let mut conn = Connection::new(stream);
    while let Ok(Some(frame)) = conn.read_frame().await {
        let Frame::Array(items) = frame else {
            return;
        };
        let args: Vec<String> = items.iter().filter_map(Frame::as_text).collect();
        let reply = match args[0].to_uppercase().as_str() {
            "COMMAND" => Frame::Array(vec![
                catalog_entry("set", &["write", "denyoom"]),
                catalog_entry("get", &["readonly", "fast"]),
                catalog_entry("lpush", &["write", "fast"]),
            ]),
            "INFO" => Frame::Bulk(Bytes::from(format!("# Replication\r\nrole:{role}\r\n"))),
            _ => {
                received.lock().unwrap().push(args);
                Frame::Simple("OK".to_string())
            }
        };
        if conn.write_frame(&reply).await.is_err() {
            return;
        }
    }
}

async fn serve_monitor(stream: TcpStream, feed: Vec<String>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line).await.is_err() {
        return;
    }
    let mut stream = reader.into_inner();
    if stream.write_all(b"+OK\r\n").await.is_err() {
        return;
    }
    for line in feed {
        if stream.write_all(line.as_bytes()).await.is_err() {
            return;
        }
    }
    // Keep the feed open, the replicator treats a closed feed as fatal.
    tokio::time::sleep(Duration::from_secs(30)).await;
}
