//! Concurrent fan-out of one envelope to every resolved queue target.
//!
//! All publishes start together and the dispatcher waits until each one has
//! settled. A failing target is logged and recorded, never propagated: the
//! envelope comes back marked dispatched whatever the individual outcomes.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use super::annotations::annotate;
use super::transport::{OutboundMessage, QueueTransport};
use super::types::{QueueTarget, TopicLayout};
use crate::error::{IngestError, Result};
use crate::message::MessageEnvelope;

/// Outcome of publishing to one target.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub target: QueueTarget,
    pub address: String,
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a completed fan-out.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// The envelope, now with `isDispatched = true`.
    pub envelope: MessageEnvelope,
    /// One entry per target, in target order.
    pub outcomes: Vec<TargetOutcome>,
}

impl Dispatched {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_delivered()).count()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn QueueTransport>,
    layout: TopicLayout,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn QueueTransport>, layout: TopicLayout) -> Self {
        Self { transport, layout }
    }

    pub fn layout(&self) -> &TopicLayout {
        &self.layout
    }

    /// Publish `envelope` to every target concurrently.
    ///
    /// Fails only before any publish starts: when the envelope cannot be
    /// serialized or the transport endpoint cannot be resolved.
    pub async fn dispatch(
        &self,
        envelope: MessageEnvelope,
        targets: &[QueueTarget],
    ) -> Result<Dispatched> {
        let value =
            serde_json::to_value(&envelope).map_err(|e| IngestError::Serialize(e.to_string()))?;
        let body = serde_json::to_vec(&value).map_err(|e| IngestError::Serialize(e.to_string()))?;

        let message = OutboundMessage {
            message_id: envelope.root_trace_id.clone(),
            body: Arc::from(body),
            annotations: annotate(&value),
        };

        self.transport.resolve_endpoint().await?;

        let outcomes =
            join_all(targets.iter().map(|target| self.publish_one(target, &message))).await;

        let failed = outcomes.iter().filter(|o| !o.is_delivered()).count();
        info!(
            root_trace_id = %envelope.root_trace_id,
            targets = outcomes.len(),
            failed = failed,
            "fan_out_complete"
        );

        Ok(Dispatched {
            envelope: envelope.into_dispatched(),
            outcomes,
        })
    }

    async fn publish_one(&self, target: &QueueTarget, message: &OutboundMessage) -> TargetOutcome {
        let address = self.layout.address(target);

        match self.transport.publish(&address, message).await {
            Ok(()) => {
                info!(
                    target = %target,
                    address = %address,
                    root_trace_id = %message.message_id,
                    "queue_target_published"
                );
                TargetOutcome {
                    target: target.clone(),
                    address,
                    error: None,
                }
            }
            Err(source) => {
                let err = IngestError::QueuePublish {
                    address: address.clone(),
                    source,
                };
                error!(
                    target = %target,
                    address = %address,
                    root_trace_id = %message.message_id,
                    error = %err,
                    "queue_target_failed"
                );
                TargetOutcome {
                    target: target.clone(),
                    address,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}
