//! API route handlers
//!
//! - `report`: the `/perfReport` ingestion endpoint
//! - `health`: liveness, readiness and metrics

pub mod health;
pub mod report;

/// Plain-text greeting served on `/` and every unrouted path, for any method.
pub async fn greeting() -> &'static str {
    "Hello World!"
}
