/*!
 * A controller paired with the queue that guards it.
 */
use std::sync::Arc;

use tracing::debug;

use pacflow_core::config::{DeviceConfig, HttpConfig, QueueConfig};
use pacflow_core::types::Id;

use crate::controller::PacController;
use crate::error::Result;
use crate::queue::RequestQueue;
use crate::transport::Transport;

/// One configured controller: its REST client and its request queue.
///
/// Every node bound to the same device id shares one connection, and with it
/// the queue and the cached dialect.
#[derive(Debug)]
pub struct ControllerConnection {
    controller: PacController,
    queue: RequestQueue,
}

impl ControllerConnection {
    /// Pair a controller with a queue
    pub fn new(controller: PacController, queue: RequestQueue) -> Self {
        Self { controller, queue }
    }

    /// Build a connection that talks HTTP(S) to a real controller
    pub fn from_config(device: &DeviceConfig, http: &HttpConfig, queue: &QueueConfig) -> Result<Self> {
        let controller = PacController::from_config(device, http)?;
        Ok(Self::new(
            controller,
            RequestQueue::from_config(device.id.to_string(), queue),
        ))
    }

    /// Build a connection over a custom transport
    pub fn with_transport(device: &DeviceConfig, transport: Arc<dyn Transport>, queue: &QueueConfig) -> Self {
        Self::new(
            PacController::new(device, transport),
            RequestQueue::from_config(device.id.to_string(), queue),
        )
    }

    /// The device configuration id
    pub fn id(&self) -> &Id {
        self.controller.device_id()
    }

    /// The REST client
    pub fn controller(&self) -> &PacController {
        &self.controller
    }

    /// The request queue
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Drop every pending request; the request in flight completes normally
    pub fn close(&self) -> usize {
        let dropped = self.queue.dump();
        debug!(device = %self.id(), dropped, "Connection closed");
        dropped
    }
}
