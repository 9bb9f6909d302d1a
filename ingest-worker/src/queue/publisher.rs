//! Async RabbitMQ publisher for fanned-out envelopes.
//!
//! The connection and channel are the process-wide cached endpoint. They are
//! created on first use, shared by every request, and dropped wholesale when
//! they fail so the next call reconnects.

use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::annotations::{AnnotationValue, Annotations};
use super::transport::{OutboundMessage, QueueTransport};
use crate::error::{IngestError, Result};

/// Async RabbitMQ publisher with connection management.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    exchange: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl Publisher {
    /// Create a publisher for the given RabbitMQ URL and topic exchange.
    pub fn new(url: String, exchange: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                exchange,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.inner.exchange
    }

    /// Ensure we have a valid connection and channel.
    async fn ensure_connected(&self) -> AnyResult<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Another request may have reconnected while we waited for the lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        *channel = None;
        *connection = None;

        info!(exchange = %self.inner.exchange, "rabbitmq_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.exchange_declare(
            &self.inner.exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare exchange")?;

        info!(exchange = %self.inner.exchange, "rabbitmq_publisher_connected");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Drop the cached channel if it is no longer usable.
    async fn invalidate_if_closed(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;
        let closed = channel
            .as_ref()
            .map(|ch| !ch.status().connected())
            .unwrap_or(false);

        if closed {
            *channel = None;
            *connection = None;
            warn!("rabbitmq_endpoint_invalidated");
        }
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        if let Some(ch) = channel.take() {
            if let Err(e) = ch.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }

        if let Some(conn) = connection.take() {
            if let Err(e) = conn.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_publisher_closed");
    }
}

#[async_trait]
impl QueueTransport for Publisher {
    async fn resolve_endpoint(&self) -> Result<()> {
        self.ensure_connected()
            .await
            .map(|_| ())
            .map_err(IngestError::EndpointResolution)
    }

    async fn publish(&self, address: &str, message: &OutboundMessage) -> AnyResult<()> {
        let channel = self.ensure_connected().await?;

        let result = channel
            .basic_publish(
                &self.inner.exchange,
                address,
                BasicPublishOptions::default(),
                &message.body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into())
                    .with_message_id(message.message_id.clone().into())
                    .with_headers(headers(&message.annotations)),
            )
            .await
            .context("Failed to publish to exchange");

        let confirm = match result {
            Ok(confirm) => confirm.await.context("Failed to confirm publish"),
            Err(e) => Err(e),
        };

        if confirm.is_err() {
            self.invalidate_if_closed().await;
        }
        confirm?;

        info!(
            exchange = %self.inner.exchange,
            routing_key = %address,
            message_id = %message.message_id,
            body_length = message.body.len(),
            "rabbitmq_envelope_published"
        );

        Ok(())
    }
}

/// Convert annotations into AMQP message headers.
fn headers(annotations: &Annotations) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in annotations {
        let value = match value {
            AnnotationValue::Text(s) => AMQPValue::LongString(s.clone().into()),
            AnnotationValue::Integer(i) => AMQPValue::LongLongInt(*i),
            AnnotationValue::Float(f) => AMQPValue::Double(*f),
            AnnotationValue::Flag(b) => AMQPValue::Boolean(*b),
        };
        table.insert(key.clone().into(), value);
    }
    table
}
