/*!
 * Behaviour shared by every node kind.
 *
 * A [`NodeWorker`] checks that its device is usable, resolves the dialect,
 * hands work to the device queue and turns failures into status, log lines
 * and message decorations. Read, write and input nodes compose one worker
 * each and only add how their request is built and what happens with the
 * answer.
 */
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use pacflow_core::types::Id;
use pacflow_devices::{
    classify, decoration, Admission, ControllerConnection, Decoration, DeviceError, ErrorDetails,
    QueueFull, RequestQueue,
};

use crate::message::Message;
use crate::sink::NodeSink;
use crate::status::NodeStatus;

/// A node instance created by the host
#[async_trait]
pub trait FlowNode: Send + Sync {
    /// Node id
    fn id(&self) -> &Id;

    /// Host node type (`pac-read`, `pac-write`, `pac-input`)
    fn node_type(&self) -> &'static str;

    /// Handle an inbound message
    async fn on_input(&self, msg: Message);

    /// The node is being removed
    fn on_close(&self);
}

/// Queue, resolver and error plumbing for one node
pub struct NodeWorker {
    node_id: Id,
    connection: Option<Arc<ControllerConnection>>,
    sink: Arc<dyn NodeSink>,
    previous_error: Mutex<Option<ErrorDetails>>,
    error_cooldown: Duration,
}

impl std::fmt::Debug for NodeWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeWorker")
            .field("node_id", &self.node_id)
            .field("device", &self.connection.as_ref().map(|c| c.id().clone()))
            .field("error_cooldown", &self.error_cooldown)
            .finish()
    }
}

impl NodeWorker {
    /// Create a worker; `connection` is `None` when the node has no usable device link
    pub fn new(
        node_id: Id,
        connection: Option<Arc<ControllerConnection>>,
        sink: Arc<dyn NodeSink>,
        error_cooldown: Duration,
    ) -> Self {
        if connection.is_none() {
            error!(node = %node_id, "Missing controller configuration");
            sink.error("Missing controller configuration", None);
        }
        Self {
            node_id,
            connection,
            sink,
            previous_error: Mutex::new(None),
            error_cooldown,
        }
    }

    /// The node id, also used as the queue owner
    pub fn node_id(&self) -> &Id {
        &self.node_id
    }

    /// The linked device connection
    pub fn connection(&self) -> Option<&Arc<ControllerConnection>> {
        self.connection.as_ref()
    }

    /// Where output goes
    pub fn sink(&self) -> &dyn NodeSink {
        self.sink.as_ref()
    }

    /// Delay before the queue advances after a failed exchange
    pub fn error_cooldown(&self) -> Duration {
        self.error_cooldown
    }

    /// Short text of the last failure, until the next success
    pub fn previous_error(&self) -> Option<String> {
        self.lock_error().as_ref().map(|e| e.short.clone())
    }

    /// Forget the last failure
    pub fn clear_error(&self) {
        *self.lock_error() = None;
    }

    fn lock_error(&self) -> std::sync::MutexGuard<'_, Option<ErrorDetails>> {
        self.previous_error.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The connection to use for a unit of work, or `None` after reporting
    /// why the work is dropped
    pub fn ready(&self) -> Option<Arc<ControllerConnection>> {
        let connection = match &self.connection {
            Some(connection) => connection,
            None => {
                self.sink.status(Some(NodeStatus::missing_controller()));
                return None;
            }
        };
        if connection.controller().has_config_error() {
            debug!(
                node = %self.node_id,
                reason = connection.controller().config_error().unwrap_or_default(),
                "Message dropped, device configuration error"
            );
            self.sink.status(Some(NodeStatus::configuration_error()));
            return None;
        }
        Some(connection.clone())
    }

    /// Make sure the device dialect is known. Failures are reported against
    /// `msg` and the unit of work must then be dropped.
    pub async fn resolve(&self, connection: &ControllerConnection, msg: &mut Message) -> bool {
        let controller = connection.controller();
        if !controller.resolver().is_resolved() {
            self.sink.status(Some(NodeStatus::determining_device_type()));
        }
        match controller.resolve().await {
            Ok(_) => true,
            Err(err) => {
                self.report_failure(&err, msg);
                false
            }
        }
    }

    /// Report a failed controller exchange
    pub fn report_failure(&self, err: &DeviceError, msg: &mut Message) {
        let details = classify(err);
        match decoration(err) {
            Some(Decoration::PacError(value)) => msg.pac_error = Some(value),
            Some(Decoration::ReqError(value)) => msg.req_error = Some(value),
            None => {}
        }

        error!(node = %self.node_id, short = %details.short, "{}", details.long);
        self.sink.status(Some(NodeStatus::error(details.short.clone())));
        self.sink.error(&details.long, Some(msg));
        *self.lock_error() = Some(details);
    }

    /// Report a unit of work that failed before reaching the controller
    pub fn report_error(&self, text: &str, msg: &Message) {
        error!(node = %self.node_id, "{}", text);
        self.sink.error(text, Some(msg));
        self.sink.status(Some(NodeStatus::error("error")));
    }

    /// Show that a request of `activity` is in flight
    pub fn busy_status(&self, activity: &str) {
        let previous = self.previous_error();
        self.sink.status(Some(NodeStatus::busy(activity, previous.as_deref())));
    }

    /// Show how many requests of this node are still waiting
    pub fn update_queued_status(&self, remaining: usize) {
        if remaining == 0 {
            return;
        }
        let previous = self.previous_error();
        self.sink.status(Some(NodeStatus::queued(previous.as_deref())));
    }

    /// Act on the queue's answer to an `add`. Returns whether the work was accepted.
    pub fn after_admission(&self, queue: &RequestQueue, admission: Result<Admission, QueueFull>) -> bool {
        match admission {
            Ok(admission) => {
                // The status of the request in flight belongs to that request.
                let current = queue.current_owner();
                if current.as_ref() != Some(&self.node_id) && admission.queued != 0 {
                    self.update_queued_status(admission.queued);
                }
                true
            }
            Err(full) => {
                warn!(node = %self.node_id, max_length = full.max_length, "Message rejected, queue full");
                self.sink.warn("Message rejected. Queue is full for controller.");
                false
            }
        }
    }

    /// Clear the node status
    pub fn close(&self) {
        self.sink.status(None);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sink::{ChannelSink, NodeEvent, NodeOutput};
    use pacflow_core::config::{DeviceConfig, QueueConfig, Scheme};
    use pacflow_devices::{SimulatedController, TransportError};
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) fn connection(sim: Arc<SimulatedController>, secret: &str) -> Arc<ControllerConnection> {
        let device = DeviceConfig::new(Id::from("pac"), "10.0.0.5", Scheme::Http, "kernel", secret);
        Arc::new(ControllerConnection::with_transport(&device, sim, &QueueConfig::default()))
    }

    pub(crate) fn drain(rx: &mut UnboundedReceiver<NodeOutput>) -> Vec<NodeEvent> {
        let mut events = Vec::new();
        while let Ok(output) = rx.try_recv() {
            events.push(output.event);
        }
        events
    }

    fn worker(connection: Option<Arc<ControllerConnection>>) -> (NodeWorker, UnboundedReceiver<NodeOutput>) {
        let (sink, rx) = ChannelSink::new(Id::from("node"));
        (
            NodeWorker::new(Id::from("node"), connection, Arc::new(sink), Duration::from_millis(50)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_missing_connection() {
        let (worker, mut rx) = worker(None);
        assert!(worker.ready().is_none());

        let events = drain(&mut rx);
        assert!(matches!(&events[0], NodeEvent::Error { text, .. } if text == "Missing controller configuration"));
        assert_eq!(events[1], NodeEvent::Status(Some(NodeStatus::missing_controller())));
    }

    #[tokio::test]
    async fn test_configuration_error_drops_work() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        let (worker, mut rx) = worker(Some(connection(sim.clone(), "")));

        assert!(worker.ready().is_none());
        assert_eq!(drain(&mut rx), vec![NodeEvent::Status(Some(NodeStatus::configuration_error()))]);
        assert_eq!(sim.request_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_shows_probe_status_once() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        let conn = connection(sim, "pw");
        let (worker, mut rx) = worker(Some(conn.clone()));
        let mut msg = Message::new();

        assert!(worker.resolve(&conn, &mut msg).await);
        assert_eq!(drain(&mut rx), vec![NodeEvent::Status(Some(NodeStatus::determining_device_type()))]);

        assert!(worker.resolve(&conn, &mut msg).await);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_failure_decorates_and_remembers() {
        let (worker, mut rx) = worker(None);
        drain(&mut rx);

        let mut msg = Message::new();
        let err = DeviceError::Transport(TransportError::with_code("ECONNREFUSED", "connect refused"));
        worker.report_failure(&err, &mut msg);

        assert_eq!(
            msg.req_error.as_ref().and_then(|v| v.get("code")).and_then(|v| v.as_str()),
            Some("ECONNREFUSED")
        );
        assert_eq!(worker.previous_error().as_deref(), Some("Connection refused"));

        let events = drain(&mut rx);
        assert_eq!(events[0], NodeEvent::Status(Some(NodeStatus::error("Connection refused"))));
        assert!(matches!(&events[1], NodeEvent::Error { text, msg: Some(_) } if text.starts_with("Connection refused.")));

        worker.update_queued_status(2);
        assert_eq!(
            drain(&mut rx),
            vec![NodeEvent::Status(Some(NodeStatus::queued(Some("Connection refused"))))]
        );

        worker.clear_error();
        worker.busy_status("reading");
        assert_eq!(drain(&mut rx), vec![NodeEvent::Status(Some(NodeStatus::busy("reading", None)))]);
    }

    #[tokio::test]
    async fn test_queue_full_is_a_warning() {
        let (worker, mut rx) = worker(None);
        drain(&mut rx);

        let queue = RequestQueue::new("q", 1, Default::default());
        assert!(!worker.after_admission(&queue, Err(QueueFull { max_length: 1 })));
        assert_eq!(
            drain(&mut rx),
            vec![NodeEvent::Warning("Message rejected. Queue is full for controller.".into())]
        );
    }
}
