/*!
 * Connection registry for PacFlow.
 *
 * This module provides the process-wide table of controller connections,
 * keyed by device configuration id.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use pacflow_core::types::Id;

use crate::connection::ControllerConnection;
use crate::error::{DeviceError, Result};

/// Registry of controller connections
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Id, Arc<ControllerConnection>>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create a new connection registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection under its device id
    pub fn register(&self, connection: ControllerConnection) -> Result<Arc<ControllerConnection>> {
        let id = connection.id().clone();
        let connection = Arc::new(connection);

        let mut connections = self.write();
        if connections.contains_key(&id) {
            return Err(DeviceError::configuration(format!(
                "Connection with ID {} already registered",
                id
            )));
        }

        connections.insert(id.clone(), connection.clone());
        drop(connections);

        info!(device = %id, "Registered controller connection");

        Ok(connection)
    }

    /// Remove a connection and drain its queue
    pub fn unregister(&self, id: &Id) -> Result<Arc<ControllerConnection>> {
        let connection = self.write().remove(id).ok_or_else(|| {
            DeviceError::configuration(format!("Connection with ID {} not registered", id))
        })?;

        connection.close();
        debug!(device = %id, "Unregistered controller connection");

        Ok(connection)
    }

    /// Get a connection by device id
    pub fn get(&self, id: &Id) -> Option<Arc<ControllerConnection>> {
        self.read().get(id).cloned()
    }

    /// All registered device ids
    pub fn ids(&self) -> Vec<Id> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no connection is registered
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove every connection, draining their queues
    pub fn clear(&self) -> usize {
        let drained: Vec<(Id, Arc<ControllerConnection>)> = self.write().drain().collect();
        for (id, connection) in &drained {
            connection.close();
            debug!(device = %id, "Closed controller connection");
        }
        drained.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Id, Arc<ControllerConnection>>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Id, Arc<ControllerConnection>>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// A thread-safe reference to a connection registry
#[derive(Debug, Clone, Default)]
pub struct SharedConnectionRegistry(Arc<ConnectionRegistry>);

impl SharedConnectionRegistry {
    /// Create a new shared connection registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a reference to the registry
    pub fn get(&self) -> &ConnectionRegistry {
        &self.0
    }
}

impl std::ops::Deref for SharedConnectionRegistry {
    type Target = ConnectionRegistry;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
