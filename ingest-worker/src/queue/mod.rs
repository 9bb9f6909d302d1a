//! Queue module for RabbitMQ fan-out.
//!
//! This module provides:
//! - Queue targets, the routing mode and the routing key layout
//! - Scalar header annotations
//! - The transport seam and its RabbitMQ implementation
//! - The concurrent fan-out dispatcher
//!
//! ## Routing
//!
//! ```text
//! single : sigfox.received
//! fanout : sigfox.devices.all → sigfox.types.<type> → sigfox.devices.<device>
//! ```

pub mod annotations;
pub mod dispatch;
pub mod publisher;
pub mod transport;
pub mod types;

pub use annotations::{annotate, AnnotationValue, Annotations};
pub use dispatch::{Dispatched, Dispatcher, TargetOutcome};
pub use publisher::Publisher;
pub use transport::{MemoryTransport, OutboundMessage, PublishedMessage, QueueTransport};
pub use types::{resolve_targets, QueueTarget, RoutingMode, TopicLayout, ROUTING_KEY_SEPARATOR};
