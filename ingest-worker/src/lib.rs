//! Sigfox ingest - webhook front door for device telemetry.
//!
//! The `sigfox-ingest-web` binary receives the network operator's callback,
//! normalizes and timestamps the message, rejects stale ones, fans it out to
//! RabbitMQ and answers with the downlink decision in the same response.
//!
//! ## Architecture
//!
//! ```text
//! Callback → Lifecycle → normalize → freshness guard → resolve targets
//!          → fan-out (RabbitMQ) → downlink response → 204
//! ```

pub mod config;
pub mod downlink;
pub mod error;
pub mod message;
pub mod process;
pub mod queue;
pub mod shadow;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use downlink::{DownlinkDecision, DownlinkResponse, DownlinkSource, MISSING_DEVICE};
pub use error::{IngestError, Result};
pub use message::{MessageEnvelope, RawWebhookPayload};
pub use process::{Pipeline, Processed};
pub use queue::{MemoryTransport, Publisher, QueueTransport, RoutingMode};
pub use shadow::{DeviceShadow, InMemoryShadow};
pub use web::{build_router, AppState};
