//! lexflow ingestion API.
//!
//! Process bootstrap: configuration, logging, the database pool, the
//! queue, the worker pools, and the HTTP gateway. All state is built
//! here and passed down explicitly; nothing else in the workspace holds
//! globals.

mod config;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lexflow_api::{build_router, AppState};
use lexflow_auth::CredentialResolver;
use lexflow_blob::{CapabilityIssuer, MemoryObjectStore};
use lexflow_db::{run_migrations, DbPool};
use lexflow_queue::MemoryQueue;
use lexflow_ratelimit::{MemoryCounterStore, RateLimiter};
use lexflow_webhooks::{TargetResolver, WebhookDispatcher, WebhookDispatcherConfig};
use lexflow_workers::{
    BlobEventReactor, BlobWrittenEvent, DeadLetterMonitor, DemographicsWorkerPool, DocumentWorker,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::Config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Drain window for in-flight requests and workers on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = VERSION,
        host = %config.host,
        port = config.port,
        env = %config.environment,
        "Starting lexflow ingest API"
    );

    // Database
    let pool = match DbPool::connect(&config.database_url).await {
        Ok(pool) => {
            info!("Database connection established");
            pool
        }
        Err(e) => {
            eprintln!("FATAL: Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = run_migrations(&pool).await {
        eprintln!("FATAL: Database migration failed: {e}");
        std::process::exit(1);
    }

    // Broker. The in-process queue honors the full session contract;
    // a multi-node deployment substitutes a brokered implementation of
    // the same traits here.
    let queue = Arc::new(MemoryQueue::new());

    // Rate limiting
    let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryCounterStore::new())));

    // Object store + capability issuer. The memory store feeds its
    // upload events straight into the blob reactor below.
    let (object_store, mut blob_events) =
        MemoryObjectStore::with_events(config.webhook_secret.as_bytes().to_vec());
    let object_store = Arc::new(object_store);
    let capabilities = CapabilityIssuer::new(object_store, pool.inner().clone());

    // Credential resolution
    let resolver = CredentialResolver::new(pool.inner().clone(), config.credential_prefix.clone());

    // Webhook targets
    let targets = TargetResolver::new(
        config.default_webhook_url.clone(),
        config.tenant_webhook_urls.clone(),
    );

    let shutdown = CancellationToken::new();
    let mut worker_handles = Vec::new();

    // C7: demographics worker pool
    let demographics_pool = Arc::new(DemographicsWorkerPool::new(
        queue.clone(),
        queue.clone(),
        pool.inner().clone(),
        config.worker_pool_size,
    ));
    worker_handles.extend(demographics_pool.spawn(shutdown.clone()));

    // C8: webhook dispatcher
    let dispatcher = Arc::new(WebhookDispatcher::new(
        queue.clone(),
        queue.clone(),
        pool.inner().clone(),
        targets,
        WebhookDispatcherConfig::new(
            config.webhook_secret.clone(),
            format!("lexflow/{VERSION}"),
        ),
    )?);
    worker_handles.extend(dispatcher.spawn(shutdown.clone()));

    // Document worker and dead-letter monitor
    let document_worker = Arc::new(DocumentWorker::new(queue.clone(), capabilities.clone()));
    worker_handles.push(document_worker.spawn(shutdown.clone()));
    let dead_letter = Arc::new(DeadLetterMonitor::new(
        queue.clone(),
        queue.clone(),
        pool.inner().clone(),
    ));
    worker_handles.push(dead_letter.spawn(shutdown.clone()));

    // C9: blob-event reactor, fed by the store's event channel
    let reactor = BlobEventReactor::new(capabilities.clone(), queue.clone());
    let reactor_token = shutdown.clone();
    worker_handles.push(tokio::spawn(async move {
        loop {
            tokio::select! {
                () = reactor_token.cancelled() => break,
                event = blob_events.recv() => {
                    let Some(blob_path) = event else { break };
                    let event = BlobWrittenEvent { blob_path, size_bytes: None };
                    if let Err(e) = reactor.handle(&event).await {
                        tracing::error!(target: "worker", error = %e, "Blob event handling failed");
                    }
                }
            }
        }
    }));

    // Gateway
    let state = AppState::new(
        pool.inner().clone(),
        queue.clone(),
        queue.clone(),
        resolver,
        limiter,
        capabilities,
        config.batch_size_limit_bytes,
        VERSION,
    );
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The listener has stopped accepting; give workers their grace
    // window to finish the current message and release sessions.
    info!("Shutting down, draining workers");
    shutdown.cancel();
    let drain = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("Workers did not drain within the grace period");
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
