//! Queue transport seam.
//!
//! The dispatcher only talks to [`QueueTransport`]. The RabbitMQ
//! [`Publisher`](super::Publisher) is the production implementation,
//! [`MemoryTransport`] keeps everything in process.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result as AnyResult};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::annotations::Annotations;
use crate::error::Result;

/// One serialized envelope, shared by every target of a fan-out.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message_id: String,
    pub body: Arc<[u8]>,
    pub annotations: Annotations,
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Make sure the transport endpoint is known, resolving it if needed.
    ///
    /// Fails with [`IngestError::EndpointResolution`](crate::IngestError::EndpointResolution)
    /// after clearing any cached endpoint.
    async fn resolve_endpoint(&self) -> Result<()>;

    /// Submit a message to one transport address.
    async fn publish(&self, address: &str, message: &OutboundMessage) -> AnyResult<()>;
}

/// A message accepted by [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub address: String,
    pub message: OutboundMessage,
}

/// In-process transport that records every publish.
///
/// Addresses registered with [`fail_address`](Self::fail_address) reject
/// publishes.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    attempts: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    unreachable: Arc<Mutex<bool>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_address(&self, address: impl Into<String>) {
        self.failing.lock().await.insert(address.into());
    }

    /// Make endpoint resolution fail until reset.
    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().await = unreachable;
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    /// Every address a publish was attempted on, successful or not.
    pub async fn attempts(&self) -> Vec<String> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    async fn resolve_endpoint(&self) -> Result<()> {
        if *self.unreachable.lock().await {
            return Err(crate::IngestError::EndpointResolution(anyhow::anyhow!(
                "memory transport unreachable"
            )));
        }
        Ok(())
    }

    async fn publish(&self, address: &str, message: &OutboundMessage) -> AnyResult<()> {
        self.attempts.lock().await.push(address.to_string());

        if self.failing.lock().await.contains(address) {
            bail!("queue {address} rejected the message");
        }

        self.published.lock().await.push(PublishedMessage {
            address: address.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}
