/*!
 * Write nodes: one controller write per inbound message.
 */
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, Instrument};

use pacflow_core::logging::operation_span;
use pacflow_core::types::Id;
use pacflow_devices::endpoints::parse_leading_int;
use pacflow_devices::ApiRequest;

use crate::error::{Error, Result};
use crate::mapping::{string_value, write_value};
use crate::message::Message;
use crate::node_config::{NodeBaseConfig, WriteConfig, WriteValueType};
use crate::worker::{FlowNode, NodeWorker};

/// A node that writes a message value to a point, variable or table
#[derive(Debug)]
pub struct WriteNode {
    worker: Arc<NodeWorker>,
    config: Arc<WriteConfig>,
}

impl WriteNode {
    /// Create a write node; only writable data kinds are accepted
    pub fn new(worker: NodeWorker, config: WriteConfig) -> Result<Self> {
        if !config.base.data_type.is_writable() {
            return Err(Error::validation(format!(
                "Data type '{}' cannot be written",
                config.base.data_type
            )));
        }
        Ok(Self {
            worker: Arc::new(worker),
            config: Arc::new(config),
        })
    }

    /// The node configuration
    pub fn config(&self) -> &WriteConfig {
        &self.config
    }
}

/// The body to send for `msg` under `config`
pub fn write_body(config: &WriteConfig, msg: &Message) -> Result<Value> {
    let kind = config.base.data_type;
    let property = match config.value_type {
        WriteValueType::Value => {
            return match string_value(kind, &config.value)? {
                Some(body) => Ok(body),
                None => write_value(kind, &Value::String(config.value.clone())),
            }
        }
        WriteValueType::Payload => "payload",
        WriteValueType::Msg => config.value.as_str(),
    };

    match msg.get_property(property)? {
        Some(value) => write_value(kind, &value),
        None => Err(Error::mapping(format!("msg.{} is undefined.", property))),
    }
}

/// The request writing `body` under `config`
pub fn write_request(config: &NodeBaseConfig, body: Value) -> Result<ApiRequest> {
    let start_index = parse_leading_int(&config.table_start_index);
    Ok(ApiRequest::write(config.data_type, &config.tag_name, body, start_index)?)
}

#[async_trait]
impl FlowNode for WriteNode {
    fn id(&self) -> &Id {
        self.worker.node_id()
    }

    fn node_type(&self) -> &'static str {
        "pac-write"
    }

    async fn on_input(&self, mut msg: Message) {
        let Some(connection) = self.worker.ready() else {
            return;
        };
        if !self.worker.resolve(&connection, &mut msg).await {
            return;
        }

        let effective = self.config.base.with_overrides(&msg);
        let worker = self.worker.clone();
        let write = self.config.clone();
        let conn = connection.clone();

        let admission = connection.queue().add(self.worker.node_id(), move |slot| async move {
            let mut msg = msg;
            worker.busy_status("writing");

            // Nothing reaches the controller when the value cannot be mapped,
            // so the queue moves on without a cooldown.
            let request = match write_body(&write, &msg).and_then(|body| write_request(&effective, body)) {
                Ok(request) => request,
                Err(err) => {
                    worker.report_error(&err.to_string(), &msg);
                    slot.done(Duration::ZERO);
                    return;
                }
            };

            let exchange = conn.controller().execute(&request);
            match exchange.instrument(operation_span("write", "pac-write")).await {
                Ok(response) => {
                    worker.clear_error();
                    worker.sink().status(None);
                    msg.body = Some(response.body);
                    worker.sink().send(msg);
                    let remaining = slot.done(Duration::ZERO);
                    worker.update_queued_status(remaining);
                }
                Err(err) => {
                    worker.report_failure(&err, &mut msg);
                    slot.done(worker.error_cooldown());
                }
            }
        });

        if self.worker.after_admission(connection.queue(), admission) {
            debug!(node = %self.worker.node_id(), "Write queued");
        }
    }

    fn on_close(&self) {
        self.worker.close();
    }
}
