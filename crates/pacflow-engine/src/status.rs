/*!
 * Advisory node status shown by the host next to each node.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// Status indicator color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    /// Red
    Red,
    /// Green
    Green,
    /// Yellow
    Yellow,
}

/// Status indicator shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Filled dot
    Dot,
    /// Hollow ring
    Ring,
}

/// A node status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Indicator color
    pub fill: Fill,
    /// Indicator shape
    pub shape: Shape,
    /// Short text
    pub text: String,
}

impl NodeStatus {
    /// Create a status
    pub fn new(fill: Fill, shape: Shape, text: impl Into<String>) -> Self {
        Self {
            fill,
            shape,
            text: text.into(),
        }
    }

    /// Red dot with the given text
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Fill::Red, Shape::Dot, text)
    }

    /// Shown while the controller dialect is probed
    pub fn determining_device_type() -> Self {
        Self::new(Fill::Green, Shape::Ring, "determining device type")
    }

    /// Work is waiting behind another node's request
    pub fn queued(previous_error: Option<&str>) -> Self {
        match previous_error {
            Some(err) => Self::new(Fill::Red, Shape::Ring, format!("queued [{}]", err)),
            None => Self::new(Fill::Green, Shape::Ring, "queued"),
        }
    }

    /// A request of the given activity ("reading", "writing") is in flight
    pub fn busy(activity: &str, previous_error: Option<&str>) -> Self {
        match previous_error {
            Some(err) => Self::new(Fill::Red, Shape::Dot, format!("{} [{}]", activity, err)),
            None => Self::new(Fill::Green, Shape::Dot, activity),
        }
    }

    /// The last scan succeeded
    pub fn scanning() -> Self {
        Self::new(Fill::Green, Shape::Dot, "scanning")
    }

    /// A scan is taking longer than the watchdog threshold
    pub fn scanning_delayed() -> Self {
        Self::new(Fill::Yellow, Shape::Dot, "scanning (delayed)")
    }

    /// The node is not linked to a device
    pub fn missing_controller() -> Self {
        Self::error("missing controller configuration")
    }

    /// The linked device has a static configuration problem
    pub fn configuration_error() -> Self {
        Self::error("Configuration error")
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_previous_error_turns_status_red() {
        assert_eq!(NodeStatus::queued(None), NodeStatus::new(Fill::Green, Shape::Ring, "queued"));
        assert_eq!(
            NodeStatus::queued(Some("Timeout")),
            NodeStatus::new(Fill::Red, Shape::Ring, "queued [Timeout]")
        );
        assert_eq!(NodeStatus::busy("reading", Some("Bad API key")).text, "reading [Bad API key]");
        assert_eq!(NodeStatus::busy("writing", None).fill, Fill::Green);
    }

    #[test]
    fn test_serializes_like_host_status() {
        let value = serde_json::to_value(NodeStatus::scanning_delayed()).unwrap();
        assert_eq!(value, json!({"fill": "yellow", "shape": "dot", "text": "scanning (delayed)"}));
    }
}
