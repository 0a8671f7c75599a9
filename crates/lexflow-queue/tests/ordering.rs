//! Cross-session behavior under concurrent consumers.

use lexflow_queue::{
    MemoryQueue, QueueConsumer, QueueMessage, QueueProducer, QueueStats, Topic,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn message(session: &str, n: u64) -> QueueMessage {
    QueueMessage::demographics(session.to_string(), json!({ "n": n }), Uuid::new_v4())
}

/// Two workers over two sessions: each session is drained by exactly one
/// worker at a time and both observe producer order.
#[tokio::test]
async fn concurrent_workers_preserve_per_session_order() {
    let queue = Arc::new(MemoryQueue::new());

    for n in 0..20 {
        queue
            .send(Topic::DemographicsFifo, message("demographics_a", n))
            .await
            .unwrap();
        queue
            .send(Topic::DemographicsFifo, message("demographics_b", n))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            // (session, n) observations in processing order.
            let mut seen: Vec<(String, u64)> = Vec::new();
            loop {
                let Some(lease) = queue.lease_session(Topic::DemographicsFifo).await.unwrap()
                else {
                    break;
                };
                loop {
                    let deliveries = queue.receive(&lease, 3).await.unwrap();
                    if deliveries.is_empty() {
                        break;
                    }
                    for delivery in deliveries {
                        seen.push((
                            lease.session.clone(),
                            delivery.message.payload["n"].as_u64().unwrap(),
                        ));
                        queue.complete(&delivery).await.unwrap();
                    }
                }
                queue.release(lease).await.unwrap();
            }
            seen
        }));
    }

    let mut all: Vec<(String, u64)> = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    assert_eq!(all.len(), 40, "every message processed exactly once");

    // Per-session observations, in global processing order, must be the
    // producer order. Workers only interleave across sessions.
    for session in ["demographics_a", "demographics_b"] {
        let ns: Vec<u64> = all
            .iter()
            .filter(|(s, _)| s == session)
            .map(|(_, n)| *n)
            .collect();
        let expected: Vec<u64> = (0..20).collect();
        assert_eq!(ns, expected, "order violated for {session}");
    }

    let depths = queue.depths(Topic::DemographicsFifo).await.unwrap();
    assert_eq!(depths.active, 0);
    assert_eq!(depths.dead_letter, 0);
}

/// A stalled session never blocks another tenant's session.
#[tokio::test]
async fn slow_session_does_not_block_others() {
    let queue = Arc::new(MemoryQueue::new());

    queue
        .send(Topic::DemographicsFifo, message("demographics_slow", 0))
        .await
        .unwrap();
    queue
        .send(Topic::DemographicsFifo, message("demographics_fast", 0))
        .await
        .unwrap();

    // One consumer leases the slow session and sits on it.
    let slow_lease = queue
        .lease_session(Topic::DemographicsFifo)
        .await
        .unwrap()
        .unwrap();
    let _held = queue.receive(&slow_lease, 1).await.unwrap();

    // A second consumer still gets the other session immediately.
    let fast_lease = queue
        .lease_session(Topic::DemographicsFifo)
        .await
        .unwrap()
        .expect("the fast session must be leasable while slow is held");
    assert_ne!(fast_lease.session, slow_lease.session);

    let deliveries = queue.receive(&fast_lease, 1).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    queue.complete(&deliveries[0]).await.unwrap();
}
