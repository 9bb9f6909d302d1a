//! Device shadow: last-known reported state per device.
//!
//! The pipeline only reads it to find a stored downlink payload; downstream
//! consumers of the fanned-out messages write to it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::message::normalize_device_id;

pub type ShadowState = Map<String, Value>;

#[async_trait]
pub trait DeviceShadow: Send + Sync {
    /// Reported state of a device; empty when nothing is stored.
    async fn get_state(&self, device: &str) -> Result<ShadowState>;

    /// Merge `partial` into the reported state of a device.
    async fn set_state(&self, device: &str, partial: ShadowState) -> Result<()>;
}

/// Device shadow held in process memory.
#[derive(Clone, Default)]
pub struct InMemoryShadow {
    states: Arc<RwLock<HashMap<String, ShadowState>>>,
}

impl InMemoryShadow {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Normalize a device id for shadow access, rejecting empty ids.
fn shadow_key(device: &str) -> Result<String> {
    let device = device.trim();
    if device.is_empty() {
        return Err(IngestError::MissingDeviceId);
    }
    Ok(normalize_device_id(device))
}

#[async_trait]
impl DeviceShadow for InMemoryShadow {
    async fn get_state(&self, device: &str) -> Result<ShadowState> {
        let key = shadow_key(device)?;
        let states = self.states.read().await;
        Ok(states.get(&key).cloned().unwrap_or_default())
    }

    async fn set_state(&self, device: &str, partial: ShadowState) -> Result<()> {
        let key = shadow_key(device)?;
        let mut states = self.states.write().await;
        let state = states.entry(key.clone()).or_default();
        let fields = partial.len();
        for (k, v) in partial {
            state.insert(k, v);
        }
        debug!(device = %key, fields = fields, "shadow_state_updated");
        Ok(())
    }
}
