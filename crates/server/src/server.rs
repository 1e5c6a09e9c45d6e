//! Server initialization and routing
//!
//! This module handles:
//! - Router configuration and the middleware stack
//! - Building the index queue and starting the indexing sink before the
//!   listener accepts connections
//! - Graceful shutdown: stop accepting, let in-flight requests finish, then
//!   let the sink drain whatever is still queued

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::routes::{greeting, health, report};
use crate::state::ServerState;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{any, get, post};
use axum::Router;
use perfreport::{IndexQueue, IndexStore, IndexingSink, SinkError, SinkReport};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// Middleware stack (outermost first):
/// 1. HTTP tracing
/// 2. Request ID tracking
/// 3. Request logging
/// 4. CORS
/// 5. Timeout handling
/// 6. Body size limit
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", any(greeting))
        .route(
            "/perfReport",
            post(report::ingest_report).fallback(report::method_not_allowed),
        )
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        // `/` answers every path no other route claims.
        .fallback(greeting)
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the JSON tracing subscriber. Safe to call more than once.
pub fn init_tracing(log_level: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .try_init();

    if let Err(err) = installed {
        tracing::debug!(
            log_level,
            "Tracing subscriber already installed, log level not applied: {err}"
        );
    }
}

/// Start the report ingestion server
///
/// Blocks until the server is shut down via SIGTERM or Ctrl+C, or until the
/// indexing sink stops on a failed write. The latter is returned as an error
/// so the process exits non-zero.
///
/// # Example
///
/// ```rust,no_run
/// use server::ServerConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load()?;
///     server::start_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    init_tracing(&config.log_level);

    let store = config
        .index
        .backend
        .build()
        .context("failed to build index store")?;
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Starting perfreport server on {}", addr);
    tracing::info!(
        "Index: {}/{} via {:?}",
        config.index.index_name,
        config.index.category,
        config.index.backend
    );

    let totals = serve(config, listener, store, shutdown_signal()).await?;

    tracing::info!(
        indexed = totals.indexed,
        dead_lettered = totals.dead_lettered,
        "Server shutdown complete"
    );
    Ok(())
}

/// Run the pipeline on an already-bound listener until `shutdown` resolves.
///
/// The index queue is created here and handed to both the router state and
/// the sink; the sink is spawned before the first connection is accepted.
pub async fn serve<F>(
    config: ServerConfig,
    listener: TcpListener,
    store: Arc<dyn IndexStore>,
    shutdown: F,
) -> anyhow::Result<SinkReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (sender, receiver) = IndexQueue::bounded(config.queue_capacity)?;
    let mut sink = IndexingSink::new(store, receiver, &config.index).spawn();

    let drain = config.shutdown_drain();
    tracing::info!(
        "Timeout: {}s, Max body: {}KB, Queue capacity: {}",
        config.timeout_secs,
        config.max_body_size_kb,
        config.queue_capacity
    );
    tracing::info!(
        "CORS: {}, Metrics: {}",
        config.enable_cors,
        config.metrics_enabled
    );

    let app = build_router(Arc::new(ServerState::new(config, sender)));
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .into_future();

    tokio::select! {
        served = server => {
            served.context("http server failed")?;
        }
        finished = &mut sink => {
            // The server future (and every queue sender with it) is dropped
            // when this branch wins.
            return match finished {
                Ok(Ok(_)) => Err(anyhow::anyhow!("indexing sink exited while the server was running")),
                other => sink_outcome(other),
            };
        }
    }

    tracing::info!("HTTP server stopped, draining index queue");
    drain_sink(sink, drain).await
}

async fn drain_sink(
    mut sink: JoinHandle<Result<SinkReport, SinkError>>,
    deadline: std::time::Duration,
) -> anyhow::Result<SinkReport> {
    match tokio::time::timeout(deadline, &mut sink).await {
        Ok(finished) => sink_outcome(finished),
        Err(_) => {
            sink.abort();
            tracing::warn!(
                "Index queue not drained within {:?}; remaining reports dropped",
                deadline
            );
            anyhow::bail!("index queue did not drain within {deadline:?}")
        }
    }
}

fn sink_outcome(
    finished: Result<Result<SinkReport, SinkError>, JoinError>,
) -> anyhow::Result<SinkReport> {
    match finished {
        Ok(Ok(totals)) => Ok(totals),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Indexing sink stopped on a failed write");
            Err(err).context("indexing sink failed")
        }
        Err(err) => Err(err).context("indexing sink task panicked or was cancelled"),
    }
}

/// Shutdown signal handler
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
