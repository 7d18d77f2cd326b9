/*!
 * The composition root consuming the host's create, input and close events.
 *
 * A [`FlowRuntime`] owns the connection registry and every node instance.
 * Nodes bound to the same device id share that device's connection, queue
 * and resolved dialect.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use pacflow_core::config::{Config, DeviceConfig, SharedConfig};
use pacflow_core::types::Id;
use pacflow_core::utils::spawn_and_log;
use pacflow_devices::{ConnectionRegistry, ControllerConnection, SharedConnectionRegistry, Transport};

use crate::error::{Error, Result};
use crate::input::{InputNode, ScanSettings};
use crate::message::Message;
use crate::node_config::NodeConfig;
use crate::read::ReadNode;
use crate::sink::NodeSink;
use crate::worker::{FlowNode, NodeWorker};
use crate::write::WriteNode;

struct NodeEntry {
    node: Arc<dyn FlowNode>,
    device: Option<Id>,
}

/// Devices and nodes of one flow host
pub struct FlowRuntime {
    config: SharedConfig,
    registry: SharedConnectionRegistry,
    nodes: RwLock<HashMap<Id, NodeEntry>>,
}

impl std::fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRuntime")
            .field("devices", &self.registry.ids())
            .field("nodes", &self.node_ids())
            .finish()
    }
}

impl FlowRuntime {
    /// Create a runtime without any devices
    pub fn new(config: SharedConfig) -> Self {
        let general = &config.get().general;
        info!(app = %general.app_name, environment = %general.environment, "Starting flow runtime");
        Self {
            config,
            registry: SharedConnectionRegistry::new(),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Create a runtime and connect every configured device over HTTP(S)
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let runtime = Self::new(SharedConfig::new(config));
        for device in &runtime.config.get().devices {
            runtime.create_device(device)?;
        }
        info!(devices = runtime.registry.len(), "Flow runtime ready");
        Ok(runtime)
    }

    /// The runtime configuration
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// The device connections
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Add a device that is reached over HTTP(S)
    pub fn create_device(&self, device: &DeviceConfig) -> Result<Arc<ControllerConnection>> {
        let config = self.config.get();
        let connection = ControllerConnection::from_config(device, &config.http, &config.queue)?;
        Ok(self.registry.register(connection)?)
    }

    /// Add a device reached through a custom transport
    pub fn create_device_with_transport(
        &self,
        device: &DeviceConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<ControllerConnection>> {
        let connection = ControllerConnection::with_transport(device, transport, &self.config.get().queue);
        Ok(self.registry.register(connection)?)
    }

    /// Remove a device and drain its queue. Nodes bound to it stop finding
    /// a connection once they are recreated.
    pub fn remove_device(&self, id: &Id) -> Result<()> {
        self.registry.unregister(id)?;
        Ok(())
    }

    /// Create a node. Input nodes start scanning right away, so this must
    /// be called from within a Tokio runtime.
    pub fn create_node(&self, id: Id, config: NodeConfig, sink: Arc<dyn NodeSink>) -> Result<()> {
        if self.read_nodes().contains_key(&id) {
            return Err(Error::already_exists(format!("Node {}", id)));
        }

        let settings = self.config.get();
        let device = config.base().device.clone();
        let connection = device.as_ref().and_then(|device| self.registry().get(device));
        let worker = NodeWorker::new(id.clone(), connection, sink, settings.queue.error_cooldown());
        let node_type = config.node_type();

        let node: Arc<dyn FlowNode> = match config {
            NodeConfig::Read(read) => Arc::new(ReadNode::new(worker, read)),
            NodeConfig::Write(write) => Arc::new(WriteNode::new(worker, write)?),
            NodeConfig::Input(input) => {
                let node = InputNode::new(worker, input, &ScanSettings::from_config(&settings.scan))?;
                node.start();
                Arc::new(node)
            }
        };

        let mut nodes = self.write_nodes();
        if nodes.contains_key(&id) {
            node.on_close();
            return Err(Error::already_exists(format!("Node {}", id)));
        }
        nodes.insert(id.clone(), NodeEntry { node, device });
        debug!(node = %id, node_type, "Node created");
        Ok(())
    }

    /// Deliver a message to a node
    pub async fn input(&self, node_id: &Id, msg: Message) -> Result<()> {
        let node = self
            .read_nodes()
            .get(node_id)
            .map(|entry| entry.node.clone())
            .ok_or_else(|| Error::not_found(format!("Node {}", node_id)))?;
        node.on_input(msg).await;
        Ok(())
    }

    /// Deliver a message without waiting for the node to accept it
    pub fn post_input(self: &Arc<Self>, node_id: Id, msg: Message) -> tokio::task::JoinHandle<()> {
        let runtime = self.clone();
        spawn_and_log(&format!("input {}", node_id), async move { runtime.input(&node_id, msg).await })
    }

    /// Close a node: clear its status, stop scanning and drain its
    /// device's pending requests. The request in flight still completes.
    pub fn close_node(&self, node_id: &Id) -> Result<()> {
        let entry = self
            .write_nodes()
            .remove(node_id)
            .ok_or_else(|| Error::not_found(format!("Node {}", node_id)))?;

        entry.node.on_close();
        if let Some(connection) = entry.device.as_ref().and_then(|device| self.registry().get(device)) {
            let dropped = connection.queue().dump();
            if dropped > 0 {
                debug!(node = %node_id, device = %connection.id(), dropped, "Pending requests dropped on close");
            }
        }
        Ok(())
    }

    /// Ids of all nodes
    pub fn node_ids(&self) -> Vec<Id> {
        self.read_nodes().keys().cloned().collect()
    }

    /// Whether a node exists
    pub fn has_node(&self, node_id: &Id) -> bool {
        self.read_nodes().contains_key(node_id)
    }

    /// Close every node and remove every device
    pub fn shutdown(&self) {
        let ids = self.node_ids();
        for id in &ids {
            if let Err(err) = self.close_node(id) {
                warn!(node = %id, error = %err, "Failed to close node");
            }
        }
        let devices = self.registry.clear();
        info!(nodes = ids.len(), devices, "Flow runtime shut down");
    }

    fn read_nodes(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Id, NodeEntry>> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_nodes(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Id, NodeEntry>> {
        self.nodes.write().unwrap_or_else(|e| e.into_inner())
    }
}
