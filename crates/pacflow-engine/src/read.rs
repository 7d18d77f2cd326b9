/*!
 * Read nodes: one controller read per inbound message.
 */
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, Instrument};

use pacflow_core::logging::operation_span;
use pacflow_core::types::Id;
use pacflow_devices::{ApiRequest, TableRange};

use crate::error::Result;
use crate::mapping::unwrap_read_value;
use crate::message::Message;
use crate::node_config::{NodeBaseConfig, ReadConfig};
use crate::worker::{FlowNode, NodeWorker};

/// A node that reads a point, variable, table or metadata on each message
#[derive(Debug)]
pub struct ReadNode {
    worker: Arc<NodeWorker>,
    config: Arc<ReadConfig>,
}

impl ReadNode {
    /// Create a read node
    pub fn new(worker: NodeWorker, config: ReadConfig) -> Self {
        Self {
            worker: Arc::new(worker),
            config: Arc::new(config),
        }
    }

    /// The node configuration
    pub fn config(&self) -> &ReadConfig {
        &self.config
    }
}

/// The request a read of `config` issues
pub fn read_request(config: &NodeBaseConfig) -> ApiRequest {
    let range = TableRange::parse(&config.table_start_index, &config.table_length);
    ApiRequest::read(config.data_type, config.tag(), range)
}

// Attach a successful answer to the message.
fn deliver(read: &ReadConfig, effective: &NodeBaseConfig, msg: &mut Message, body: Value) -> Result<()> {
    let value = unwrap_read_value(&body);
    msg.body = Some(body);
    msg.set_property(read.target_property(), value)?;
    if let Some(topic) = read.topic_type.topic(effective, &read.topic) {
        msg.topic = Some(topic);
    }
    Ok(())
}

#[async_trait]
impl FlowNode for ReadNode {
    fn id(&self) -> &Id {
        self.worker.node_id()
    }

    fn node_type(&self) -> &'static str {
        "pac-read"
    }

    async fn on_input(&self, mut msg: Message) {
        let Some(connection) = self.worker.ready() else {
            return;
        };
        if !self.worker.resolve(&connection, &mut msg).await {
            return;
        }

        let effective = self.config.base.with_overrides(&msg);
        let request = read_request(&effective);
        let path = request.path();

        let worker = self.worker.clone();
        let read = self.config.clone();
        let conn = connection.clone();

        let admission = connection.queue().add(self.worker.node_id(), move |slot| async move {
            let mut msg = msg;
            worker.busy_status("reading");

            let exchange = conn.controller().execute(&request);
            match exchange.instrument(operation_span("read", "pac-read")).await {
                Ok(response) => match deliver(&read, &effective, &mut msg, response.body) {
                    Ok(()) => {
                        worker.clear_error();
                        worker.sink().status(None);
                        worker.sink().send(msg);
                        let remaining = slot.done(Duration::ZERO);
                        worker.update_queued_status(remaining);
                    }
                    Err(err) => {
                        worker.report_error(&err.to_string(), &msg);
                        slot.done(Duration::ZERO);
                    }
                },
                Err(err) => {
                    worker.report_failure(&err, &mut msg);
                    slot.done(worker.error_cooldown());
                }
            }
        });

        if self.worker.after_admission(connection.queue(), admission) {
            debug!(node = %self.worker.node_id(), path = %path, "Read queued");
        }
    }

    fn on_close(&self) {
        self.worker.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_config::{ReadValueType, TopicType};
    use crate::sink::{ChannelSink, NodeEvent, NodeOutput};
    use crate::worker::tests::connection;
    use pacflow_devices::{DataKind, Dialect, SimulatedController};
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn node(
        sim: Arc<SimulatedController>,
        config: ReadConfig,
        name: &str,
    ) -> (ReadNode, UnboundedReceiver<NodeOutput>) {
        let (sink, rx) = ChannelSink::new(Id::from(name));
        let worker = NodeWorker::new(
            Id::from(name),
            Some(connection(sim, "pw")),
            Arc::new(sink),
            Duration::from_millis(50),
        );
        (ReadNode::new(worker, config), rx)
    }

    async fn next_message(rx: &mut UnboundedReceiver<NodeOutput>) -> Message {
        loop {
            match rx.recv().await.map(|o| o.event) {
                Some(NodeEvent::Message(msg)) => return msg,
                Some(_) => continue,
                None => panic!("sink closed"),
            }
        }
    }

    async fn next_error(rx: &mut UnboundedReceiver<NodeOutput>) -> (String, Option<Message>) {
        loop {
            match rx.recv().await.map(|o| o.event) {
                Some(NodeEvent::Error { text, msg }) => return (text, msg),
                Some(_) => continue,
                None => panic!("sink closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_read_scalar_into_payload() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        sim.set_value(DataKind::FloatVariable, "temp", json!(21.5));

        let config = ReadConfig::new(NodeBaseConfig::new("pac", DataKind::FloatVariable).with_tag("temp"));
        let (node, mut rx) = node(sim, config, "r1");

        node.on_input(Message::from_value(json!({"payload": "go", "keep": 1})).unwrap()).await;
        let msg = next_message(&mut rx).await;

        assert_eq!(msg.payload, Some(json!(21.5)));
        assert_eq!(msg.body, Some(json!({"value": 21.5})));
        assert_eq!(msg.extra.get("keep"), Some(&json!(1)));
        assert_eq!(msg.topic, None);
    }

    #[tokio::test]
    async fn test_read_into_message_path_with_topic() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        sim.set_value(DataKind::Int32Table, "tbl", json!([1, 2, 3, 4, 5]));

        let mut config = ReadConfig::new(
            NodeBaseConfig::new("pac", DataKind::Int32Table)
                .with_tag("tbl")
                .with_table_range("1", "3"),
        );
        config.value_type = ReadValueType::Msg;
        config.value = "data.values".into();
        config.topic_type = TopicType::Auto;
        let (node, mut rx) = node(sim.clone(), config, "r1");

        node.on_input(Message::new()).await;
        let msg = next_message(&mut rx).await;

        assert_eq!(msg.extra.get("data"), Some(&json!({"values": [2, 3, 4]})));
        assert_eq!(msg.topic.as_deref(), Some("int32-table/tbl"));

        let last = sim.requests().pop().unwrap();
        assert!(last.query.contains(&("startIndex".to_string(), "1".to_string())));
        assert!(last.query.contains(&("numElements".to_string(), "3".to_string())));
    }

    #[tokio::test]
    async fn test_payload_overrides_tag() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        sim.set_value(DataKind::DigInput, "a", json!(false));
        sim.set_value(DataKind::DigInput, "b", json!(true));

        let config = ReadConfig::new(NodeBaseConfig::new("pac", DataKind::DigInput).with_tag("a"));
        let (node, mut rx) = node(sim, config, "r1");

        node.on_input(Message::from_value(json!({"payload": {"tagName": "b"}})).unwrap()).await;
        assert_eq!(next_message(&mut rx).await.payload, Some(json!(true)));

        // The override applies to that message only.
        node.on_input(Message::new()).await;
        assert_eq!(next_message(&mut rx).await.payload, Some(json!(false)));
    }

    #[tokio::test]
    async fn test_read_all_without_tag() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        sim.set_value(DataKind::StringVariable, "s1", json!("hello"));

        let config = ReadConfig::new(NodeBaseConfig::new("pac", DataKind::StringVariable));
        let (node, mut rx) = node(sim, config, "r1");

        node.on_input(Message::new()).await;
        assert_eq!(
            next_message(&mut rx).await.payload,
            Some(json!([{"name": "s1", "value": "hello"}]))
        );
    }

    #[tokio::test]
    async fn test_controller_error_is_classified() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        let config = ReadConfig::new(NodeBaseConfig::new("pac", DataKind::Int32Variable).with_tag("missing"));
        let (node, mut rx) = node(sim, config, "r1");

        node.on_input(Message::new()).await;
        let (text, msg) = next_error(&mut rx).await;

        assert_eq!(text, "PAC response error : -28. Undefined tag.");
        let msg = msg.unwrap();
        assert_eq!(msg.pac_error.as_ref().and_then(|e| e.get("statusCode")), Some(&json!(404)));
        assert_eq!(node.worker.previous_error().as_deref(), Some("Tag undefined"));
    }

    #[test]
    fn test_metadata_request_ignores_tag() {
        let base = NodeBaseConfig::new("pac", DataKind::StrategyInfo).with_tag("x");
        assert_eq!(read_request(&base).path(), "/device/strategy");
    }

    #[tokio::test]
    async fn test_device_info_ignores_tag_override() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        let config = ReadConfig::new(NodeBaseConfig::new("pac", DataKind::DeviceInfo).with_tag("stale"));
        let (node, mut rx) = node(sim.clone(), config, "r1");

        node.on_input(Message::from_value(json!({"payload": {"tagName": "abc"}})).unwrap()).await;
        let msg = next_message(&mut rx).await;
        assert!(msg.payload.as_ref().and_then(|p| p.get("controllerType")).is_some());

        let last = sim.requests().pop().unwrap();
        assert_eq!(last.url.path(), "/api/v1/device");
    }

    #[tokio::test]
    async fn test_groov_controller_is_detected() {
        let sim = Arc::new(SimulatedController::groov("pw"));
        sim.set_value(DataKind::AnaInput, "level", json!(3.25));

        let config = ReadConfig::new(NodeBaseConfig::new("pac", DataKind::AnaInput).with_tag("level"));
        let (node, mut rx) = node(sim, config, "r1");

        node.on_input(Message::new()).await;
        let msg = next_message(&mut rx).await;
        assert_eq!(msg.payload, Some(json!(3.25)));

        let resolver = node.worker.connection().unwrap().controller().resolver();
        assert_eq!(resolver.dialect(), Dialect::Groov);
        assert!(resolver.is_resolved());
    }
}
