use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use std::sync::Arc;

/// Body returned for any method other than POST on `/perfReport`.
pub const POST_ONLY: &str = "post only";

/// Accept one performance report.
///
/// The body is decoded, enriched by type, re-encoded and queued for the
/// indexing sink. The response does not wait for the index write; it only
/// waits for a free queue slot, so a stalled sink slows clients down instead
/// of dropping reports.
///
/// # Responses
/// - `200` with an empty body once the report is queued
/// - `400` `MALFORMED_PAYLOAD` when the body is not a report
/// - `413` `PAYLOAD_TOO_LARGE` past `max_body_size_kb`
/// - `503` `QUEUE_CLOSED` when the sink has stopped
pub async fn ingest_report(
    State(state): State<Arc<ServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<impl IntoResponse> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(state.config.max_body_size_kb)
        } else {
            ServerError::MalformedPayload(rejection.body_text())
        }
    });
    let body = match body {
        Ok(body) => body,
        Err(err) => {
            reject(&err);
            return Err(err);
        }
    };

    let (queued, outcome) = match perfreport::prepare(&body) {
        Ok(prepared) => prepared,
        Err(err) => {
            let err = ServerError::from(err);
            reject(&err);
            return Err(err);
        }
    };

    metrics::counter!("perfreport_reports_received_total", "kind" => outcome.label).increment(1);
    tracing::debug!(
        guid = %queued.guid,
        kind = outcome.label,
        enriched = outcome.enriched,
        bytes = queued.body.len(),
        "Queueing report"
    );

    state.queue.enqueue(queued).await?;
    Ok(StatusCode::OK)
}

/// Fallback for every non-POST method on `/perfReport`.
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        POST_ONLY,
    )
}

fn reject(err: &ServerError) {
    metrics::counter!("perfreport_reports_rejected_total", "reason" => err.error_code())
        .increment(1);
    tracing::warn!(error = %err, "Rejected report");
}
