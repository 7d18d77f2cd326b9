/*!
 * The outbound surface of a node.
 *
 * Nodes never talk to the host directly. Everything they produce goes
 * through a [`NodeSink`]; hosts either implement the trait or consume the
 * event stream of a [`ChannelSink`].
 */
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::trace;

use pacflow_core::types::Id;

use crate::message::Message;
use crate::status::NodeStatus;

/// Receives everything a node emits
pub trait NodeSink: Send + Sync {
    /// Emit a message on the node's output
    fn send(&self, msg: Message);

    /// Set the node status; `None` clears it
    fn status(&self, status: Option<NodeStatus>);

    /// Report an error, optionally with the message that caused it
    fn error(&self, text: &str, msg: Option<&Message>);

    /// Report a warning
    fn warn(&self, text: &str);
}

/// One thing a node produced
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// An output message
    Message(Message),
    /// A status change
    Status(Option<NodeStatus>),
    /// An error report
    Error {
        /// Diagnostic text
        text: String,
        /// The offending message
        msg: Option<Message>,
    },
    /// A warning
    Warning(String),
}

/// A node event stamped with its origin
#[derive(Debug, Clone)]
pub struct NodeOutput {
    /// Emitting node
    pub node: Id,
    /// When it was emitted
    pub at: DateTime<Utc>,
    /// What was emitted
    pub event: NodeEvent,
}

/// A sink that forwards every event over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    node: Id,
    tx: mpsc::UnboundedSender<NodeOutput>,
}

impl ChannelSink {
    /// Create a sink for `node` and the receiving end of its events
    pub fn new(node: Id) -> (Self, mpsc::UnboundedReceiver<NodeOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { node, tx }, rx)
    }

    /// A sink for another node feeding the same channel
    pub fn for_node(&self, node: Id) -> Self {
        Self {
            node,
            tx: self.tx.clone(),
        }
    }

    fn emit(&self, event: NodeEvent) {
        let output = NodeOutput {
            node: self.node.clone(),
            at: Utc::now(),
            event,
        };
        if self.tx.send(output).is_err() {
            trace!(node = %self.node, "Node output receiver dropped");
        }
    }
}

impl NodeSink for ChannelSink {
    fn send(&self, msg: Message) {
        self.emit(NodeEvent::Message(msg));
    }

    fn status(&self, status: Option<NodeStatus>) {
        self.emit(NodeEvent::Status(status));
    }

    fn error(&self, text: &str, msg: Option<&Message>) {
        self.emit(NodeEvent::Error {
            text: text.to_string(),
            msg: msg.cloned(),
        });
    }

    fn warn(&self, text: &str) {
        self.emit(NodeEvent::Warning(text.to_string()));
    }
}
