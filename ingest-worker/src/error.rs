//! Error taxonomy for the ingestion pipeline.
//!
//! Only errors raised before the downlink response is composed ever reach the
//! webhook caller. Per-target publish failures are recovered by the dispatcher
//! and only show up in logs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// A device-shadow operation was attempted without a device id.
    #[error("missing device id")]
    MissingDeviceId,

    /// Base station time is older than the freshness threshold.
    #[error("stale message: age {age_ms}ms exceeds {max_age_ms}ms")]
    StaleMessage { age_ms: i64, max_age_ms: i64 },

    /// The downlink payload is not exactly 8 bytes of hex.
    #[error("invalid downlink payload: {reason}")]
    InvalidDownlinkPayload { reason: String },

    /// Publishing to one queue target failed.
    #[error("failed to publish to {address}: {source}")]
    QueuePublish {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    /// The queue transport endpoint could not be resolved.
    #[error("failed to resolve queue endpoint: {0}")]
    EndpointResolution(#[source] anyhow::Error),

    /// The inbound request body is not a JSON object.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The envelope could not be serialized for publishing.
    #[error("failed to serialize envelope: {0}")]
    Serialize(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// Short machine-readable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MissingDeviceId => "missing_device_id",
            IngestError::StaleMessage { .. } => "stale_message",
            IngestError::InvalidDownlinkPayload { .. } => "invalid_downlink_payload",
            IngestError::QueuePublish { .. } => "queue_publish_failure",
            IngestError::EndpointResolution(_) => "endpoint_resolution_failure",
            IngestError::InvalidBody(_) => "invalid_body",
            IngestError::Serialize(_) => "serialize_failure",
        }
    }
}
