//! Inbound message handling.
//!
//! ```text
//! RawWebhookPayload → normalize_body() → NormalizedMessageBody
//!                   → MessageEnvelope::build() → check_freshness()
//! ```

pub mod freshness;
pub mod normalize;
pub mod types;

pub use freshness::{check_freshness, Clock, FixedClock, SystemClock, MAX_MESSAGE_AGE_MS};
pub use normalize::{normalize_body, normalize_device_id};
pub use types::{Lenient, MessageEnvelope, NormalizedMessageBody, QueryParams, RawWebhookPayload};
