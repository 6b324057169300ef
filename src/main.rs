//! Vocalis Server: voice conversion job pipeline.
//!
//! Main entry point that wires all crates together, starts the background
//! processors and serves the HTTP boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt};

use vocalis_core::config::{AppConfig, QueueConfig};
use vocalis_core::error::AppError;
use vocalis_core::traits::{Clock, SystemClock};
use vocalis_database::DatabasePool;
use vocalis_database::repositories::{
    AudioInputRepository, ConversionJobRepository, WebhookDeliveryRepository,
    WebhookSubscriptionRepository,
};
use vocalis_gateway::{HttpWebhookSender, MemoryQueueTransport, QueueGateway, QueueTransport};
use vocalis_service::{CallbackService, EventPublisher, WebhookEventPublisher};
use vocalis_worker::{ConversionProcessor, DeliveryProcessor, PollingLoop, QueueRouter};

#[tokio::main]
async fn main() {
    let env = std::env::var("VOCALIS_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Build the queue transport named by `queue.provider`.
async fn build_queue_transport(config: &QueueConfig) -> Result<Arc<dyn QueueTransport>, AppError> {
    match config.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryQueueTransport::with_queues([
            config.main_queue.clone(),
            config.alt_queue.clone(),
            config.preview_queue.clone(),
        ]))),
        #[cfg(feature = "sqs")]
        "sqs" => Ok(Arc::new(vocalis_gateway::queue::SqsQueueTransport::new(config).await)),
        #[cfg(not(feature = "sqs"))]
        "sqs" => Err(AppError::configuration(
            "Queue provider 'sqs' requires building with the `sqs` feature",
        )),
        other => Err(AppError::configuration(format!(
            "Unsupported queue provider '{other}'"
        ))),
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Vocalis v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db_pool = DatabasePool::connect(&config.database).await?;
    if config.database.run_migrations {
        vocalis_database::migration::run_migrations(db_pool.pool()).await?;
    }

    // ── Step 2: Repositories ─────────────────────────────────────
    let pool = db_pool.pool().clone();
    let job_repo = Arc::new(ConversionJobRepository::new(pool.clone()));
    let input_repo = Arc::new(AudioInputRepository::new(pool.clone()));
    let delivery_repo = Arc::new(WebhookDeliveryRepository::new(pool.clone()));
    let subscription_repo = Arc::new(WebhookSubscriptionRepository::new(pool));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // ── Step 3: Gateways ─────────────────────────────────────────
    tracing::info!(provider = %config.queue.provider, "Initializing queue gateway");
    let transport = build_queue_transport(&config.queue).await?;
    let gateway = Arc::new(QueueGateway::new(transport));
    let sender = Arc::new(HttpWebhookSender::new(&config.delivery)?);

    // ── Step 4: Services ─────────────────────────────────────────
    let events: Arc<dyn EventPublisher> = Arc::new(WebhookEventPublisher::new(
        subscription_repo.clone(),
        delivery_repo.clone(),
        Arc::clone(&clock),
    ));
    let callback_service = Arc::new(CallbackService::new(
        job_repo.clone(),
        Arc::clone(&events),
        &config.callback,
        &config.conversion.output_prefix,
        Arc::clone(&clock),
    ));
    if config.callback.shared_secret.is_empty() {
        tracing::warn!("Callback shared secret is empty; every completion callback will be rejected");
    }

    // ── Step 5: Shutdown channel & processors ────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut processor_handles: Vec<JoinHandle<()>> = Vec::new();

    if config.conversion.enabled {
        let processor = Arc::new(ConversionProcessor::new(
            job_repo.clone(),
            input_repo,
            Arc::clone(&gateway),
            QueueRouter::new(&config.queue),
            Arc::clone(&events),
            config.conversion.clone(),
            Arc::clone(&clock),
        ));
        processor_handles.push(PollingLoop::new(processor).spawn(shutdown_rx.clone()));
    } else {
        tracing::info!("Conversion processor disabled");
    }

    if config.delivery.enabled {
        let processor = Arc::new(DeliveryProcessor::new(
            delivery_repo,
            subscription_repo,
            sender,
            config.delivery.clone(),
            Arc::clone(&clock),
        ));
        processor_handles.push(PollingLoop::new(processor).spawn(shutdown_rx.clone()));
    } else {
        tracing::info!("Delivery processor disabled");
    }

    // ── Step 6: HTTP server ──────────────────────────────────────
    let app_state = vocalis_api::AppState {
        callback_config: Arc::new(config.callback.clone()),
        callback_service,
        db_pool: Some(db_pool.clone()),
        started_at: Instant::now(),
    };
    let app = vocalis_api::build_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(addr = %addr, "Vocalis server listening");

    // ── Step 7: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 8: Wait for processors to drain ─────────────────────
    tracing::info!("Waiting for background processors to finish their current cycle...");
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    for handle in processor_handles {
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!("Processor did not stop within the shutdown grace period");
        }
    }

    db_pool.close().await;
    tracing::info!("Vocalis server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
