//! Message processing pipeline.
//!
//! ## Processing Flow
//!
//! ```text
//! RawWebhookPayload → MessageEnvelope → freshness guard → resolve_targets()
//!                   → Dispatcher (concurrent) → compose_response() → DownlinkResponse
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, DownlinkSourceKind};
use crate::downlink::{
    compose_response, DownlinkResponse, DownlinkSource, FixedDownlink, ShadowDownlink,
};
use crate::error::Result;
use crate::message::{check_freshness, Clock, MessageEnvelope, QueryParams, RawWebhookPayload};
use crate::queue::{resolve_targets, Dispatcher, QueueTransport, TargetOutcome, TopicLayout};
use crate::shadow::DeviceShadow;
use crate::web::lifecycle::{Lifecycle, Stage};

/// Everything produced by one successful pass through the pipeline.
#[derive(Debug, Clone)]
pub struct Processed {
    /// Envelope as published, marked dispatched.
    pub envelope: MessageEnvelope,
    pub outcomes: Vec<TargetOutcome>,
    pub response: DownlinkResponse,
}

/// The pipeline, wired once at startup and shared by every request.
#[derive(Clone)]
pub struct Pipeline {
    dispatcher: Dispatcher,
    downlink: Arc<dyn DownlinkSource>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        dispatcher: Dispatcher,
        downlink: Arc<dyn DownlinkSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            downlink,
            clock,
        }
    }

    /// Wire the pipeline from configuration.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn QueueTransport>,
        shadow: Arc<dyn DeviceShadow>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let layout = TopicLayout::new(config.queue_root.clone(), config.routing_mode);
        let downlink: Arc<dyn DownlinkSource> = match config.downlink_source {
            DownlinkSourceKind::Config => {
                Arc::new(FixedDownlink::new(config.downlink_data.clone()))
            }
            DownlinkSourceKind::Shadow => {
                Arc::new(ShadowDownlink::new(shadow, config.downlink_data.clone()))
            }
        };

        Self::new(Dispatcher::new(transport, layout), downlink, clock)
    }

    /// Run one message through normalization, the freshness guard, fan-out
    /// and downlink composition.
    ///
    /// A stale message fails before anything is published. Individual target
    /// failures do not fail the run.
    pub async fn run(
        &self,
        raw: &RawWebhookPayload,
        query: &QueryParams,
        lifecycle: &mut Lifecycle,
    ) -> Result<Processed> {
        lifecycle.advance(Stage::Normalizing);
        let envelope = MessageEnvelope::build(raw, query, lifecycle.trace_id().to_string());

        info!(
            device = ?envelope.device,
            message_type = ?envelope.message_type,
            base_station_time = ?envelope.body.base_station_seconds(),
            "message_normalized"
        );

        lifecycle.advance(Stage::Guarding);
        check_freshness(envelope.body.base_station_seconds(), self.clock.now_millis())?;

        lifecycle.advance(Stage::Dispatching);
        let targets = resolve_targets(
            self.dispatcher.layout().mode(),
            envelope.device.as_deref(),
            envelope.message_type.as_deref(),
        );
        let dispatched = self.dispatcher.dispatch(envelope, &targets).await?;

        lifecycle.advance(Stage::Responding);
        let response =
            compose_response(raw.get("ack"), &dispatched.envelope, self.downlink.as_ref()).await?;

        Ok(Processed {
            envelope: dispatched.envelope,
            outcomes: dispatched.outcomes,
            response,
        })
    }
}
