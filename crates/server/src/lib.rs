//! perfreport server - HTTP ingestion for performance telemetry reports
//!
//! Clients POST one JSON report per request to `/perfReport`. Each report is
//! decoded, enriched by type, re-encoded and placed on a bounded queue; a
//! single background sink writes queued reports to the document index. The
//! HTTP response only waits for a queue slot, never for the index write.
//!
//! # Features
//!
//! - **Backpressure**: a full queue holds requests instead of dropping reports
//! - **Failure policy**: stop on the first failed index write (default) or
//!   retry with backoff and dead-letter
//! - **Middleware**: CORS, request ID tracking, structured logging, timeouts,
//!   body size limit
//! - **Configuration**: `.env`, optional `server.*` file, `PERFREPORT_SERVER__*`
//!   environment variables
//! - **Graceful Shutdown**: in-flight requests finish and the queue drains
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `ANY /` - Greeting, also served for every unrouted path
//! - `POST /perfReport` - Submit a report (`405 post only` for other methods)
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check (queue depth, sink state)
//! - `GET /metrics` - Prometheus metrics

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, serve, start_server};
pub use state::ServerState;
