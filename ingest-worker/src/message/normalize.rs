//! Field normalization for raw Sigfox callback payloads.

use std::borrow::Cow;
use std::str::FromStr;

use serde_json::{Map, Value};

use super::types::{Lenient, NormalizedMessageBody, RawWebhookPayload};

/// Device ids longer than this are hex ids and are kept verbatim.
const SHORT_DEVICE_ID_MAX_LEN: usize = 6;

/// Output names the normalizer computes itself; raw keys with these names are dropped.
const COMPUTED_FIELDS: [&str; 2] = ["baseStationTime", "timestamp"];

/// Normalize a device id so it addresses the same record everywhere.
///
/// Ids of up to six characters are upper-cased; longer ids are returned
/// unchanged. Applying it twice gives the same result as applying it once.
pub fn normalize_device_id(id: &str) -> String {
    if id.chars().count() > SHORT_DEVICE_ID_MAX_LEN {
        id.to_string()
    } else {
        id.to_ascii_uppercase()
    }
}

/// Convert a raw payload into its typed projection.
///
/// The input is only borrowed. Absent fields stay absent, and malformed
/// numbers become [`Lenient::NotANumber`] instead of failing.
pub fn normalize_body(raw: &RawWebhookPayload) -> NormalizedMessageBody {
    let mut body = NormalizedMessageBody {
        extra: Map::new(),
        ..Default::default()
    };

    for (key, value) in raw.fields() {
        match key.as_str() {
            "time" => {
                let seconds = parse_number::<i64>(value);
                body.timestamp = seconds
                    .value()
                    .and_then(|s| s.checked_mul(1000))
                    .map(|ms| ms.to_string());
                body.base_station_time = Some(seconds);
            }
            "duplicate" => body.duplicate = Some(parse_flag(value)),
            "ack" => body.ack = Some(parse_flag(value)),
            "longPolling" => body.long_polling = Some(parse_flag(value)),
            "snr" => body.snr = Some(parse_number(value)),
            "avgSnr" => body.avg_snr = Some(parse_number(value)),
            "rssi" => body.rssi = Some(parse_number(value)),
            "lat" => body.lat = Some(parse_number(value)),
            "lng" => body.lng = Some(parse_number(value)),
            "seqNumber" => body.seq_number = Some(parse_number(value)),
            _ if COMPUTED_FIELDS.contains(&key.as_str()) => {}
            _ => {
                body.extra.insert(key.clone(), value.clone());
            }
        }
    }

    body
}

/// `"true"` is true, anything else is false.
fn parse_flag(value: &Value) -> bool {
    match value {
        Value::String(s) => s == "true",
        Value::Bool(b) => *b,
        _ => false,
    }
}

fn parse_number<T: FromStr>(value: &Value) -> Lenient<T> {
    match scalar_text(value) {
        Some(text) => text
            .trim()
            .parse::<T>()
            .map(Lenient::Number)
            .unwrap_or(Lenient::NotANumber),
        None => Lenient::NotANumber,
    }
}

fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        _ => None,
    }
}
