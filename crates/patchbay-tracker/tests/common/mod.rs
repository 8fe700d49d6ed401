//! Common test utilities for tracker integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use patchbay_proto::{read_frame, write_frame, MAX_FRAME_SIZE, RPC_TRACKER_MAGIC, STATUS_SUCCESS};
use patchbay_tracker::{Tracker, TrackerConfig};

/// Starts a tracker on an OS-assigned loopback port.
pub async fn start_tracker() -> Arc<Tracker> {
    let config = TrackerConfig::default()
        .with_host("127.0.0.1")
        .with_port_range(0, 0)
        .silent();
    Tracker::start(config).await.expect("tracker should start")
}

/// A handshaken tracker connection.
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    /// Connects to a loopback tracker and completes the magic handshake.
    pub async fn connect(port: u16) -> Self {
        let mut stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to tracker");
        stream
            .write_all(&RPC_TRACKER_MAGIC.to_le_bytes())
            .await
            .expect("send magic");
        let mut echo = [0u8; 4];
        stream.read_exact(&mut echo).await.expect("read magic echo");
        assert_eq!(u32::from_le_bytes(echo), RPC_TRACKER_MAGIC);
        Self { stream }
    }

    /// Connects without handshaking, for handshake tests.
    pub async fn connect_raw(port: u16) -> TcpStream {
        TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to tracker")
    }

    /// Sends one request frame.
    pub async fn send(&mut self, message: Value) {
        write_frame(&mut self.stream, &message.to_string())
            .await
            .expect("send frame");
    }

    /// Sends raw bytes, bypassing framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("send raw bytes");
    }

    /// Receives one reply frame as text.
    pub async fn recv_text(&mut self) -> String {
        read_frame(&mut self.stream, MAX_FRAME_SIZE)
            .await
            .expect("receive frame")
    }

    /// Receives one reply frame parsed as JSON.
    pub async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv_text().await).expect("reply should be JSON")
    }

    /// Receives one frame and asserts it is the bare success status.
    pub async fn expect_success(&mut self) {
        assert_eq!(self.recv_text().await, STATUS_SUCCESS.to_string());
    }

    /// Reads until the tracker closes this connection.
    pub async fn expect_closed(&mut self) {
        let mut buf = [0u8; 1];
        match self.stream.read(&mut buf).await {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("expected close, read {n} bytes"),
        }
    }

    /// UPDATE_INFO and its acknowledgement.
    pub async fn update_info(&mut self, key: &str) {
        self.send(json!([6, {"key": key}])).await;
        self.expect_success().await;
    }

    /// PUT and its acknowledgement.
    pub async fn put(&mut self, key: &str, port: u16, match_key: &str) {
        self.send(json!([4, key, [port, match_key]])).await;
        self.expect_success().await;
    }

    /// REQUEST; the reply is deferred until a pairing serves it.
    pub async fn request(&mut self, key: &str, user: &str, priority: i64) {
        self.send(json!([5, key, user, priority])).await;
    }

    /// SUMMARY round trip.
    pub async fn summary(&mut self) -> Value {
        self.send(json!([7])).await;
        self.recv_json().await
    }

    /// GET_PENDING_MATCHKEYS round trip.
    pub async fn pending_matchkeys(&mut self) -> Value {
        self.send(json!([8])).await;
        self.recv_json().await
    }
}

/// Polls SUMMARY until the key shows the given queue counts.
///
/// REQUEST carries no acknowledgement, so tests use this to sequence
/// arrivals deterministically before triggering a pairing.
pub async fn wait_for_counts(admin: &mut TestClient, key: &str, free: u64, pending: u64) {
    for _ in 0..200 {
        let summary = admin.summary().await;
        let counts = &summary[1]["queue_info"][key];
        if counts["free"] == json!(free) && counts["pending"] == json!(pending) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("queue counts for {key} never reached free={free} pending={pending}");
}
