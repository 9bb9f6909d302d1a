//! Downlink response composition.
//!
//! The Sigfox backend waits on the callback response for an 8-byte downlink
//! frame when the device asked for one (`ack` not false). The payload is
//! validated strictly before it is ever handed back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::message::MessageEnvelope;
use crate::shadow::DeviceShadow;

/// Response key used when the request carried no device id.
pub const MISSING_DEVICE: &str = "missing_device";

/// Downlink payload size in bytes.
pub const DOWNLINK_PAYLOAD_BYTES: usize = 8;

/// Shadow field holding a per-device downlink payload.
pub const SHADOW_DOWNLINK_FIELD: &str = "downlinkData";

/// What the caller is told for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownlinkDecision {
    NoData,
    Data(String),
}

/// `{<device>: {"noData": true}}` or `{<device>: {"downlinkData": "<hex>"}}`.
///
/// Always exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkResponse {
    pub device: String,
    pub decision: DownlinkDecision,
}

impl DownlinkResponse {
    pub fn new(device: Option<&str>, decision: DownlinkDecision) -> Self {
        Self {
            device: device.unwrap_or(MISSING_DEVICE).to_string(),
            decision,
        }
    }
}

impl Serialize for DownlinkDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            DownlinkDecision::NoData => map.serialize_entry("noData", &true)?,
            DownlinkDecision::Data(hex) => map.serialize_entry("downlinkData", hex)?,
        }
        map.end()
    }
}

impl Serialize for DownlinkResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.device, &self.decision)?;
        map.end()
    }
}

/// Whether the raw `ack` field asks for a downlink.
///
/// Only boolean `false` and the string `"false"` mean no; an absent field
/// means yes.
pub fn wants_downlink(ack: Option<&Value>) -> bool {
    match ack {
        Some(Value::Bool(false)) => false,
        Some(Value::String(s)) if s == "false" => false,
        _ => true,
    }
}

/// Validate a downlink payload: exactly 16 hex characters after lower-casing.
pub fn validate_downlink_payload(payload: &str) -> Result<String> {
    let lower = payload.to_lowercase();

    if lower.len() != DOWNLINK_PAYLOAD_BYTES * 2 {
        return Err(IngestError::InvalidDownlinkPayload {
            reason: format!(
                "expected {} hex characters, got {}",
                DOWNLINK_PAYLOAD_BYTES * 2,
                lower.chars().count()
            ),
        });
    }

    let mut frame = [0u8; DOWNLINK_PAYLOAD_BYTES];
    hex::decode_to_slice(&lower, &mut frame).map_err(|e| IngestError::InvalidDownlinkPayload {
        reason: e.to_string(),
    })?;

    Ok(lower)
}

/// Where a downlink payload comes from.
#[async_trait]
pub trait DownlinkSource: Send + Sync {
    async fn payload_for(&self, envelope: &MessageEnvelope) -> Result<String>;
}

/// Same configured payload for every device.
#[derive(Debug, Clone)]
pub struct FixedDownlink {
    payload: String,
}

impl FixedDownlink {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

#[async_trait]
impl DownlinkSource for FixedDownlink {
    async fn payload_for(&self, _envelope: &MessageEnvelope) -> Result<String> {
        Ok(self.payload.clone())
    }
}

/// Per-device payload from the device shadow, with a configured fallback.
#[derive(Clone)]
pub struct ShadowDownlink {
    shadow: Arc<dyn DeviceShadow>,
    fallback: String,
}

impl ShadowDownlink {
    pub fn new(shadow: Arc<dyn DeviceShadow>, fallback: impl Into<String>) -> Self {
        Self {
            shadow,
            fallback: fallback.into(),
        }
    }
}

#[async_trait]
impl DownlinkSource for ShadowDownlink {
    async fn payload_for(&self, envelope: &MessageEnvelope) -> Result<String> {
        // No shadow to read without a device id; the response is keyed by the sentinel.
        let Some(device) = envelope.device.as_deref() else {
            debug!("downlink_shadow_skipped_missing_device");
            return Ok(self.fallback.clone());
        };

        let state = self.shadow.get_state(device).await?;
        match state.get(SHADOW_DOWNLINK_FIELD).and_then(Value::as_str) {
            Some(stored) => {
                debug!(device = %device, "downlink_from_shadow");
                Ok(stored.to_string())
            }
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Decide what to tell the caller for this message.
///
/// `ack` is read from the raw body, before normalization.
pub async fn compose_response(
    ack: Option<&Value>,
    envelope: &MessageEnvelope,
    source: &dyn DownlinkSource,
) -> Result<DownlinkResponse> {
    let device = envelope.device.as_deref();

    if !wants_downlink(ack) {
        info!(device = ?device, "downlink_not_requested");
        return Ok(DownlinkResponse::new(device, DownlinkDecision::NoData));
    }

    let payload = source.payload_for(envelope).await?;
    let payload = validate_downlink_payload(&payload).map_err(|e| {
        warn!(device = ?device, error = %e, "downlink_payload_rejected");
        e
    })?;

    info!(device = ?device, downlink_data = %payload, "downlink_composed");
    Ok(DownlinkResponse::new(device, DownlinkDecision::Data(payload)))
}
