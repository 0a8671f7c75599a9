//! Dispatcher behavior against live endpoints: signatures, retry
//! schedule, per-tenant ordering, and cross-tenant parallelism.

mod common;

use common::{detached_pool, wait_until, Recorder, SECRET};
use lexflow_core::{webhook_session, TenantId, WebhookEventKind};
use lexflow_queue::{MemoryQueue, QueueMessage, QueueProducer, QueueStats, Topic};
use lexflow_webhooks::{
    verify_payload, TargetResolver, WebhookDispatcher, WebhookDispatcherConfig, WebhookJob,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

fn dispatcher_config() -> WebhookDispatcherConfig {
    WebhookDispatcherConfig::new(SECRET, "lexflow/test")
        .with_workers(2)
        .with_poll_interval(Duration::from_millis(50))
}

fn webhook_message(tenant: &TenantId, event: WebhookEventKind, n: u64) -> QueueMessage {
    let job = WebhookJob {
        event,
        tenant: tenant.as_str().to_string(),
        data: json!({ "n": n }),
        submission_id: None,
        override_url: None,
    };
    QueueMessage::webhook(
        webhook_session(tenant),
        serde_json::to_value(&job).unwrap(),
        Uuid::new_v4(),
    )
}

async fn start_dispatcher(
    queue: Arc<MemoryQueue>,
    targets: TargetResolver,
) -> (CancellationToken, Vec<tokio::task::JoinHandle<()>>) {
    let dispatcher = Arc::new(
        WebhookDispatcher::new(
            queue.clone(),
            queue,
            detached_pool(),
            targets,
            dispatcher_config(),
        )
        .unwrap(),
    );
    let token = CancellationToken::new();
    let handles = dispatcher.spawn(token.clone());
    (token, handles)
}

#[tokio::test]
async fn delivers_with_verifiable_signature_and_headers() {
    let server = MockServer::start().await;
    let recorder = Recorder::new(200);
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(recorder.clone())
        .mount(&server)
        .await;

    let queue = Arc::new(MemoryQueue::new());
    let targets = TargetResolver::new(Some(format!("{}/hook", server.uri())), HashMap::new());
    let (token, _handles) = start_dispatcher(queue.clone(), targets).await;

    let tenant = TenantId::new("Smith & Associates").unwrap();
    let message = webhook_message(&tenant, WebhookEventKind::DemographicsCreated, 1);
    let correlation = message.correlation_id;
    queue.send(Topic::WebhooksFifo, message).await.unwrap();

    assert!(wait_until(Duration::from_secs(3), || recorder.count() == 1).await);
    token.cancel();

    let request = recorder.captured().remove(0);
    let body = request.body_json();

    assert_eq!(body["event"], "demographics.created");
    assert_eq!(body["tenant"], "Smith & Associates");
    assert_eq!(body["data"]["n"], 1);
    assert_eq!(body["correlation_id"], correlation.to_string());
    assert!(body["timestamp"].is_string());

    // Invariant: the signature field equals the HMAC over the canonical
    // payload without it, and the header carries the same value.
    assert!(verify_payload(SECRET, &body));
    assert!(!verify_payload("wrong-secret", &body));
    assert_eq!(
        request.header("x-webhook-signature").unwrap(),
        body["signature"].as_str().unwrap()
    );
    assert_eq!(request.header("x-retry-attempt"), Some("0"));
    assert_eq!(
        request.header("x-correlation-id"),
        Some(correlation.to_string().as_str())
    );
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("user-agent"), Some("lexflow/test"));
}

#[tokio::test]
async fn failing_endpoint_gets_bounded_backoff_retries() {
    let server = MockServer::start().await;
    let recorder = Recorder::new(500);
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(recorder.clone())
        .mount(&server)
        .await;

    let queue = Arc::new(MemoryQueue::new());
    let targets = TargetResolver::new(Some(format!("{}/hook", server.uri())), HashMap::new());
    let (token, _handles) = start_dispatcher(queue.clone(), targets).await;

    let tenant = TenantId::new("acme").unwrap();
    let mut message = webhook_message(&tenant, WebhookEventKind::DemographicsProcessed, 1);
    message.max_retries = 2;
    queue.send(Topic::WebhooksFifo, message).await.unwrap();

    // Attempt 0 immediately, attempt 1 after ~1 s, then nothing more.
    assert!(wait_until(Duration::from_secs(5), || recorder.count() == 2).await);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(recorder.count(), 2, "retry bound exceeded");
    token.cancel();

    let captured = recorder.captured();
    assert_eq!(captured[0].header("x-retry-attempt"), Some("0"));
    assert_eq!(captured[1].header("x-retry-attempt"), Some("1"));

    let gap = captured[1].received_at - captured[0].received_at;
    assert!(
        gap >= chrono::Duration::milliseconds(800),
        "retry arrived after {gap} instead of ~1s"
    );

    // Terminal: the message is settled, not dead-lettered or pending.
    let depths = queue.depths(Topic::WebhooksFifo).await.unwrap();
    assert_eq!(depths.active, 0);
    assert_eq!(depths.scheduled, 0);
}

#[tokio::test]
async fn slow_tenant_does_not_delay_others_and_keeps_its_order() {
    let server_a = MockServer::start().await;
    let recorder_a = Recorder::new(200).with_delay(Duration::from_millis(400));
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(recorder_a.clone())
        .mount(&server_a)
        .await;

    let server_b = MockServer::start().await;
    let recorder_b = Recorder::new(200);
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(recorder_b.clone())
        .mount(&server_b)
        .await;

    let tenant_a = TenantId::new("tenant-a").unwrap();
    let tenant_b = TenantId::new("tenant-b").unwrap();
    let mut overrides = HashMap::new();
    overrides.insert(tenant_a.env_suffix(), format!("{}/hook", server_a.uri()));
    overrides.insert(tenant_b.env_suffix(), format!("{}/hook", server_b.uri()));

    let queue = Arc::new(MemoryQueue::new());
    let (token, _handles) =
        start_dispatcher(queue.clone(), TargetResolver::new(None, overrides)).await;

    // A1, A2 for the stalling tenant, then B1 for the healthy one.
    for n in 1..=2 {
        queue
            .send(
                Topic::WebhooksFifo,
                webhook_message(&tenant_a, WebhookEventKind::DemographicsProcessed, n),
            )
            .await
            .unwrap();
    }
    queue
        .send(
            Topic::WebhooksFifo,
            webhook_message(&tenant_b, WebhookEventKind::DemographicsProcessed, 1),
        )
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            recorder_a.count() == 2 && recorder_b.count() == 1
        })
        .await
    );
    token.cancel();

    let a = recorder_a.captured();
    let b = recorder_b.captured();

    // Per-tenant order: A1 strictly before A2.
    assert_eq!(a[0].body_json()["data"]["n"], 1);
    assert_eq!(a[1].body_json()["data"]["n"], 2);

    // Parallelism: B's delivery is not stuck behind A's stall. A2 cannot
    // start before A1's 400 ms response; B1 must land before that.
    assert!(
        b[0].received_at < a[1].received_at,
        "the healthy tenant waited on the stalled one"
    );
}

#[tokio::test]
async fn missing_target_completes_without_delivery() {
    let queue = Arc::new(MemoryQueue::new());
    let (token, _handles) =
        start_dispatcher(queue.clone(), TargetResolver::new(None, HashMap::new())).await;

    let tenant = TenantId::new("unconfigured").unwrap();
    queue
        .send(
            Topic::WebhooksFifo,
            webhook_message(&tenant, WebhookEventKind::DemographicsCreated, 1),
        )
        .await
        .unwrap();

    // Settled: nothing active, nothing dead-lettered.
    let mut settled = false;
    for _ in 0..60 {
        let depths = queue.depths(Topic::WebhooksFifo).await.unwrap();
        if depths.active == 0 && depths.dead_letter == 0 {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    token.cancel();
    assert!(settled, "message without a target should complete silently");
}

#[tokio::test]
async fn batch_override_url_beats_configured_target() {
    let configured = MockServer::start().await;
    let configured_recorder = Recorder::new(200);
    Mock::given(method("POST"))
        .respond_with(configured_recorder.clone())
        .mount(&configured)
        .await;

    let override_server = MockServer::start().await;
    let override_recorder = Recorder::new(200);
    Mock::given(method("POST"))
        .respond_with(override_recorder.clone())
        .mount(&override_server)
        .await;

    let tenant = TenantId::new("acme").unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let targets = TargetResolver::new(Some(configured.uri()), HashMap::new());
    let (token, _handles) = start_dispatcher(queue.clone(), targets).await;

    let job = WebhookJob {
        event: WebhookEventKind::DemographicsBatchCompleted,
        tenant: tenant.as_str().to_string(),
        data: json!({ "total": 3, "accepted": 3, "failed": 0 }),
        submission_id: None,
        override_url: Some(override_server.uri()),
    };
    let message = QueueMessage::webhook(
        webhook_session(&tenant),
        serde_json::to_value(&job).unwrap(),
        Uuid::new_v4(),
    );
    queue.send(Topic::WebhooksFifo, message).await.unwrap();

    assert!(wait_until(Duration::from_secs(3), || override_recorder.count() == 1).await);
    token.cancel();

    assert_eq!(configured_recorder.count(), 0);
    let body = override_recorder.captured()[0].body_json();
    assert_eq!(body["event"], "demographics.batch_completed");
    assert_eq!(body["data"]["accepted"], 3);
}
