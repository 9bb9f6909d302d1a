//! Webhook endpoint handlers.
//!
//! Each handler opens a [`Lifecycle`], runs the pipeline inside the request
//! span and hands the result back through [`Lifecycle::respond`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::error::Result;
use crate::message::{QueryParams, RawWebhookPayload};
use crate::process::Pipeline;
use crate::web::lifecycle::{InvocationShape, Lifecycle};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Sigfox Webhook
// =============================================================================

/// Sigfox callback endpoint.
///
/// The body is the JSON callback payload; an empty body is an empty payload.
/// `?type=` selects the type-specific queue, `?device=` is a fallback device id.
pub async fn sigfox_webhook(
    State(state): State<AppState>,
    Query(query): Query<QueryParams>,
    body: Bytes,
) -> Response {
    let lifecycle = Lifecycle::start(InvocationShape::Webhook);
    let span = lifecycle.span().clone();

    async move {
        info!(
            body_length = body.len(),
            message_type = ?query.get("type"),
            "webhook_received"
        );
        let raw = parse_payload(&body);
        invoke(&state, lifecycle, raw, query).await
    }
    .instrument(span)
    .await
}

// =============================================================================
// Direct Invocation
// =============================================================================

/// Body of a direct (non-webhook) invocation.
#[derive(Debug, Default, Deserialize)]
pub struct DirectInvocation {
    #[serde(default)]
    pub body: RawWebhookPayload,
    #[serde(default)]
    pub query: QueryParams,
}

/// Direct invocation endpoint: `{"body": {...}, "query": {...}}`.
pub async fn direct_invocation(State(state): State<AppState>, body: Bytes) -> Response {
    let lifecycle = Lifecycle::start(InvocationShape::Direct);
    let span = lifecycle.span().clone();

    async move {
        info!(body_length = body.len(), "invocation_received");
        match parse_json::<DirectInvocation>(&body) {
            Ok(invocation) => {
                invoke(&state, lifecycle, Ok(invocation.body), invocation.query).await
            }
            Err(e) => lifecycle.respond(Err(e)),
        }
    }
    .instrument(span)
    .await
}

async fn invoke(
    state: &AppState,
    mut lifecycle: Lifecycle,
    raw: Result<RawWebhookPayload>,
    query: QueryParams,
) -> Response {
    let result = match raw {
        Ok(raw) => state
            .pipeline
            .run(&raw, &query, &mut lifecycle)
            .await
            .map(|processed| processed.response),
        Err(e) => Err(e),
    };
    lifecycle.respond(result)
}

fn parse_payload(body: &[u8]) -> Result<RawWebhookPayload> {
    parse_json(body)
}

/// Parse a JSON body, treating an empty body as the type's default.
fn parse_json<T: Default + for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}
