//! Integration tests for worker/request pairing over live connections.

mod common;

use common::{wait_for_counts, TestClient};
use serde_json::json;

#[tokio::test]
async fn put_then_request_pairs() {
    let tracker = common::start_tracker().await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.update_info("server:gpu0").await;
    worker.put("gpu", 9091, "mk1").await;

    let mut client = TestClient::connect(tracker.port()).await;
    client.request("gpu", "user1", 0).await;

    let reply = client.recv_json().await;
    assert_eq!(reply, json!([2, ["127.0.0.1", 9091, "mk1"]]));

    tracker.terminate().await;
}

#[tokio::test]
async fn request_then_put_pairs() {
    let tracker = common::start_tracker().await;
    let mut admin = TestClient::connect(tracker.port()).await;

    let mut client = TestClient::connect(tracker.port()).await;
    client.request("gpu", "user1", 0).await;
    wait_for_counts(&mut admin, "gpu", 0, 1).await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.put("gpu", 9091, "mk1").await;

    let reply = client.recv_json().await;
    assert_eq!(reply, json!([2, ["127.0.0.1", 9091, "mk1"]]));

    tracker.terminate().await;
}

#[tokio::test]
async fn put_address_override_is_returned() {
    let tracker = common::start_tracker().await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker
        .send(json!([4, "gpu", [9091, "mk1", "10.1.2.3"]]))
        .await;
    worker.expect_success().await;

    let mut client = TestClient::connect(tracker.port()).await;
    client.request("gpu", "user1", 0).await;

    let reply = client.recv_json().await;
    assert_eq!(reply, json!([2, ["10.1.2.3", 9091, "mk1"]]));

    tracker.terminate().await;
}

#[tokio::test]
async fn higher_priority_request_is_served_first() {
    let tracker = common::start_tracker().await;
    let mut admin = TestClient::connect(tracker.port()).await;

    let mut low = TestClient::connect(tracker.port()).await;
    low.request("x", "low", 1).await;
    wait_for_counts(&mut admin, "x", 0, 1).await;

    let mut high = TestClient::connect(tracker.port()).await;
    high.request("x", "high", 5).await;
    wait_for_counts(&mut admin, "x", 0, 2).await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.put("x", 9091, "mk1").await;
    let reply = high.recv_json().await;
    assert_eq!(reply[1][2], json!("mk1"));

    worker.put("x", 9092, "mk2").await;
    let reply = low.recv_json().await;
    assert_eq!(reply[1][2], json!("mk2"));

    tracker.terminate().await;
}

#[tokio::test]
async fn equal_priority_requests_are_fifo() {
    let tracker = common::start_tracker().await;
    let mut admin = TestClient::connect(tracker.port()).await;

    let mut first = TestClient::connect(tracker.port()).await;
    first.request("x", "first", 3).await;
    wait_for_counts(&mut admin, "x", 0, 1).await;

    let mut second = TestClient::connect(tracker.port()).await;
    second.request("x", "second", 3).await;
    wait_for_counts(&mut admin, "x", 0, 2).await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.put("x", 9091, "mk1").await;
    assert_eq!(first.recv_json().await[1][2], json!("mk1"));

    worker.put("x", 9092, "mk2").await;
    assert_eq!(second.recv_json().await[1][2], json!("mk2"));

    tracker.terminate().await;
}

#[tokio::test]
async fn dead_requester_leaves_worker_queued() {
    let tracker = common::start_tracker().await;
    let mut admin = TestClient::connect(tracker.port()).await;

    let requester = {
        let mut requester = TestClient::connect(tracker.port()).await;
        requester.request("x", "doomed", 3).await;
        requester
    };
    wait_for_counts(&mut admin, "x", 0, 1).await;

    // The requester dies; the tracker scrubs its entry.
    drop(requester);
    wait_for_counts(&mut admin, "x", 0, 0).await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.put("x", 9091, "mk1").await;
    wait_for_counts(&mut admin, "x", 1, 0).await;

    // The slot is intact and goes to the next live requester.
    let mut client = TestClient::connect(tracker.port()).await;
    client.request("x", "alive", 0).await;
    assert_eq!(client.recv_json().await[1][2], json!("mk1"));

    tracker.terminate().await;
}

#[tokio::test]
async fn a_match_key_is_handed_out_once() {
    let tracker = common::start_tracker().await;
    let mut admin = TestClient::connect(tracker.port()).await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.put("x", 9091, "mk1").await;

    let mut served = TestClient::connect(tracker.port()).await;
    served.request("x", "served", 0).await;
    assert_eq!(served.recv_json().await[1][2], json!("mk1"));

    // The second requester queues instead of receiving the same slot.
    let mut waiting = TestClient::connect(tracker.port()).await;
    waiting.request("x", "waiting", 0).await;
    wait_for_counts(&mut admin, "x", 0, 1).await;

    worker.put("x", 9092, "mk2").await;
    assert_eq!(waiting.recv_json().await[1][2], json!("mk2"));

    tracker.terminate().await;
}

#[tokio::test]
async fn pairing_consumes_the_workers_pending_matchkey() {
    let tracker = common::start_tracker().await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.put("gpu", 9091, "mk1").await;
    assert_eq!(worker.pending_matchkeys().await, json!(["mk1"]));

    let mut client = TestClient::connect(tracker.port()).await;
    client.request("gpu", "user1", 0).await;
    client.recv_json().await;

    // Consumption happens just after the reply write; poll briefly.
    for _ in 0..200 {
        if worker.pending_matchkeys().await == json!([]) {
            tracker.terminate().await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("match key was never consumed");
}

#[tokio::test]
async fn summary_aggregates_queues_and_servers() {
    let tracker = common::start_tracker().await;
    let mut admin = TestClient::connect(tracker.port()).await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.update_info("server:gpu0").await;
    worker.put("gpu", 9091, "mk1").await;
    worker.put("gpu", 9092, "mk2").await;

    let mut client = TestClient::connect(tracker.port()).await;
    client.request("cpu", "user1", 0).await;
    wait_for_counts(&mut admin, "cpu", 0, 1).await;

    let summary = admin.summary().await;
    assert_eq!(summary[0], json!(2));
    assert_eq!(
        summary[1]["queue_info"],
        json!({
            "gpu": {"free": 2, "pending": 0},
            "cpu": {"free": 0, "pending": 1},
        })
    );

    let server_info = summary[1]["server_info"].as_array().unwrap();
    assert_eq!(server_info.len(), 1);
    assert_eq!(server_info[0]["key"], json!("server:gpu0"));

    tracker.terminate().await;
}

#[tokio::test]
async fn keys_are_independent_pools() {
    let tracker = common::start_tracker().await;

    let mut worker = TestClient::connect(tracker.port()).await;
    worker.put("gpu", 9091, "mk-gpu").await;

    let mut admin = TestClient::connect(tracker.port()).await;
    let mut client = TestClient::connect(tracker.port()).await;
    client.request("cpu", "user1", 0).await;
    wait_for_counts(&mut admin, "cpu", 0, 1).await;

    // The gpu worker does not serve the cpu request.
    wait_for_counts(&mut admin, "gpu", 1, 0).await;

    let mut gpu_client = TestClient::connect(tracker.port()).await;
    gpu_client.request("gpu", "user2", 0).await;
    assert_eq!(gpu_client.recv_json().await[1][2], json!("mk-gpu"));

    tracker.terminate().await;
}
