//! Web server module for the Sigfox callback.
//!
//! This module provides the axum surface:
//! - `GET /health`
//! - `ANY /sigfox`: the network operator's callback, answered with the downlink decision
//! - `POST /invoke`: the same pipeline for direct JSON invocations

pub mod handlers;
pub mod lifecycle;

use axum::{
    routing::{any, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    direct_invocation, health, sigfox_webhook, AppState, DirectInvocation, HealthResponse,
};
pub use lifecycle::{InvocationShape, Lifecycle, Stage};

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sigfox", any(sigfox_webhook))
        .route("/invoke", post(direct_invocation))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
