//! Queue targets and routing key layout.
//!
//! A target is a logical selector; [`TopicLayout`] turns it into a RabbitMQ
//! routing key by joining hierarchical segments with `.`.

use std::fmt;

/// Separator between routing key segments on a topic exchange.
pub const ROUTING_KEY_SEPARATOR: &str = ".";

/// Whether one message goes to a single queue or is fanned out three ways.
///
/// One mode per deployment, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Everything goes to one catch-all queue.
    Single,
    /// Catch-all, then type-specific, then device-specific.
    FanOut,
}

/// Logical queue selector.
///
/// Exactly one kind per selector. As a `{device, type}` pair the catch-all
/// is `{null, null}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueTarget {
    CatchAll,
    Type(String),
    Device(String),
}

impl QueueTarget {
    /// The `{device, type}` selector pair for this target.
    pub fn selector(&self) -> (Option<&str>, Option<&str>) {
        match self {
            QueueTarget::CatchAll => (None, None),
            QueueTarget::Type(t) => (None, Some(t.as_str())),
            QueueTarget::Device(d) => (Some(d.as_str()), None),
        }
    }
}

impl fmt::Display for QueueTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueTarget::CatchAll => write!(f, "catch_all"),
            QueueTarget::Type(t) => write!(f, "type:{t}"),
            QueueTarget::Device(d) => write!(f, "device:{d}"),
        }
    }
}

/// Compute the ordered list of targets a message is fanned out to.
///
/// In fan-out mode the device target comes last: its queue may not exist
/// yet and must not hold up targets that always exist.
pub fn resolve_targets(
    mode: RoutingMode,
    device: Option<&str>,
    message_type: Option<&str>,
) -> Vec<QueueTarget> {
    match mode {
        RoutingMode::Single => vec![QueueTarget::CatchAll],
        RoutingMode::FanOut => {
            let mut targets = vec![QueueTarget::CatchAll];
            if let Some(t) = message_type {
                targets.push(QueueTarget::Type(t.to_string()));
            }
            if let Some(d) = device {
                targets.push(QueueTarget::Device(d.to_string()));
            }
            targets
        }
    }
}

/// Maps logical targets onto routing keys.
#[derive(Debug, Clone)]
pub struct TopicLayout {
    root: String,
    mode: RoutingMode,
}

impl TopicLayout {
    pub fn new(root: impl Into<String>, mode: RoutingMode) -> Self {
        Self {
            root: root.into(),
            mode,
        }
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Hierarchical name segments for a target.
    ///
    /// The catch-all is `received` in single mode and `devices.all` (the
    /// catch-all of the device class) in fan-out mode.
    pub fn segments<'a>(&'a self, target: &'a QueueTarget) -> Vec<&'a str> {
        let root = self.root.as_str();
        match (target, self.mode) {
            (QueueTarget::CatchAll, RoutingMode::Single) => vec![root, "received"],
            (QueueTarget::CatchAll, RoutingMode::FanOut) => vec![root, "devices", "all"],
            (QueueTarget::Type(t), _) => vec![root, "types", t.as_str()],
            (QueueTarget::Device(d), _) => vec![root, "devices", d.as_str()],
        }
    }

    /// Transport address (routing key) for a target.
    pub fn address(&self, target: &QueueTarget) -> String {
        self.segments(target).join(ROUTING_KEY_SEPARATOR)
    }
}
