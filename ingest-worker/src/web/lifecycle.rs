//! Request lifecycle around one invocation.
//!
//! ```text
//! received → normalizing → guarding → dispatching → responding → terminated
//! ```
//!
//! A [`Lifecycle`] is created per invocation and consumed by
//! [`Lifecycle::respond`], so each invocation produces exactly one response.
//! End-of-task bookkeeping runs on a detached task after the response is
//! handed back; the caller never waits for it.

use std::time::Instant;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::downlink::DownlinkResponse;
use crate::error::Result;

/// Stages of one invocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Normalizing,
    Guarding,
    Dispatching,
    Responding,
    Terminated,
}

/// How the invocation reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationShape {
    /// Sigfox callback: 204 + JSON on success, 500 + plain text on failure.
    Webhook,
    /// Direct JSON invocation: 200 / 500, both JSON.
    Direct,
}

pub struct Lifecycle {
    trace_id: String,
    shape: InvocationShape,
    stage: Stage,
    span: Span,
    started: Instant,
}

impl Lifecycle {
    /// Begin an invocation with a fresh root trace id.
    pub fn start(shape: InvocationShape) -> Self {
        let trace_id = Uuid::new_v4().simple().to_string();
        let span = info_span!("webhook_request", trace_id = %trace_id, shape = ?shape);

        Self {
            trace_id,
            shape,
            stage: Stage::Received,
            span,
            started: Instant::now(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Move forward to `next`. Stages never go backwards.
    pub fn advance(&mut self, next: Stage) {
        if next <= self.stage {
            warn!(from = ?self.stage, to = ?next, "lifecycle_stage_out_of_order");
            return;
        }
        debug!(from = ?self.stage, to = ?next, "lifecycle_stage");
        self.stage = next;
    }

    /// Produce the one terminal response for this invocation.
    pub fn respond(mut self, result: Result<DownlinkResponse>) -> Response {
        if self.stage < Stage::Responding {
            self.advance(Stage::Responding);
        }

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };

        let response = match (self.shape, result) {
            (InvocationShape::Webhook, Ok(downlink)) => {
                info!(device = %downlink.device, "webhook_responded");
                (
                    StatusCode::NO_CONTENT,
                    [(header::CONTENT_TYPE, "application/json")],
                    Json(downlink),
                )
                    .into_response()
            }
            (InvocationShape::Webhook, Err(e)) => {
                error!(error = %e, kind = e.kind(), "webhook_failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    e.to_string(),
                )
                    .into_response()
            }
            (InvocationShape::Direct, Ok(downlink)) => {
                info!(device = %downlink.device, "invocation_responded");
                (StatusCode::OK, Json(downlink)).into_response()
            }
            (InvocationShape::Direct, Err(e)) => {
                error!(error = %e, kind = e.kind(), "invocation_failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        };

        self.advance(Stage::Terminated);

        let trace_id = self.trace_id;
        let started = self.started;
        tokio::spawn(
            async move {
                info!(
                    trace_id = %trace_id,
                    outcome = outcome,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request_task_ended"
                );
            }
            .instrument(self.span),
        );

        response
    }
}
