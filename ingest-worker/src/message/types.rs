//! Message types flowing through one webhook invocation.
//!
//! - [`RawWebhookPayload`]: the string-typed body posted by the network operator
//! - [`NormalizedMessageBody`]: typed projection of the raw payload
//! - [`MessageEnvelope`]: what gets published to every queue target

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::normalize::{normalize_body, normalize_device_id};

/// Query parameters of the inbound request.
pub type QueryParams = BTreeMap<String, String>;

// =============================================================================
// Raw payload
// =============================================================================

/// Raw webhook body as delivered by the Sigfox backend.
///
/// Values are expected to be strings but nothing is enforced here; the
/// normalizer decides how to read each field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawWebhookPayload(Map<String, Value>);

impl RawWebhookPayload {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of a field, if it is present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// Normalized body
// =============================================================================

/// A leniently parsed number.
///
/// Malformed numeric strings do not fail normalization; they become
/// `NotANumber`, which serializes as JSON `null`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lenient<T> {
    Number(T),
    NotANumber,
}

impl<T: Copy> Lenient<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Lenient::Number(v) => Some(*v),
            Lenient::NotANumber => None,
        }
    }
}

impl<T: Serialize> Serialize for Lenient<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Lenient::Number(v) => v.serialize(serializer),
            Lenient::NotANumber => serializer.serialize_none(),
        }
    }
}

/// Typed projection of [`RawWebhookPayload`].
///
/// `time` never appears here: it is replaced by `baseStationTime` (seconds)
/// and `timestamp` (milliseconds, as a string). Fields absent from the raw
/// payload stay absent. Unrecognised fields are carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_station_time: Option<Lenient<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_polling: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snr: Option<Lenient<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_snr: Option<Lenient<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<Lenient<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<Lenient<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<Lenient<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_number: Option<Lenient<i64>>,

    /// Everything else (`device`, `data`, `station`, custom callback fields)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NormalizedMessageBody {
    /// Base station time in seconds, when present and numeric.
    pub fn base_station_seconds(&self) -> Option<i64> {
        self.base_station_time.and_then(|t| t.value())
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Envelope published to every resolved queue target.
///
/// Built once per request. `isDispatched` flips to true only after every
/// fan-out attempt has settled; it is informational, not a delivery receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub device: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub body: NormalizedMessageBody,
    pub query: QueryParams,
    pub root_trace_id: String,
    is_dispatched: bool,
}

impl MessageEnvelope {
    /// Build the envelope for one inbound request.
    ///
    /// The device id comes from the body, falling back to the `device` query
    /// parameter. The message type comes from the `type` query parameter.
    pub fn build(raw: &RawWebhookPayload, query: &QueryParams, root_trace_id: String) -> Self {
        let device = raw
            .get_str("device")
            .or_else(|| query.get("device").map(String::as_str))
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(normalize_device_id);

        let message_type = query
            .get("type")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Self {
            device,
            message_type,
            body: normalize_body(raw),
            query: query.clone(),
            root_trace_id,
            is_dispatched: false,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        self.is_dispatched
    }

    /// Consume the envelope and return it marked as dispatched.
    pub(crate) fn into_dispatched(self) -> Self {
        Self {
            is_dispatched: true,
            ..self
        }
    }
}
