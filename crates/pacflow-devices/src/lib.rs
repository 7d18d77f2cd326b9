/*!
 * PacFlow Devices
 *
 * This crate provides everything needed to talk to one PAC controller over
 * its REST API: the data kind and endpoint catalog, the HTTP transport,
 * dialect negotiation (SNAP PAC vs. Groov EPIC), the per-device request queue
 * and error classification.
 */

#![warn(missing_docs)]

// Re-export core types
pub use pacflow_core::prelude;

pub mod classify;
pub mod connection;
pub mod controller;
pub mod dialect;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod kinds;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod simulator;
pub mod transport;

pub use classify::{classify, decoration, Decoration, ErrorDetails};
pub use connection::ControllerConnection;
pub use controller::PacController;
pub use dialect::Dialect;
pub use endpoints::{ApiRequest, Method, TableRange};
pub use error::{DeviceError, Result, TransportError};
pub use kinds::DataKind;
pub use queue::{Admission, QueueFull, QueueSlot, RequestQueue};
pub use registry::{ConnectionRegistry, SharedConnectionRegistry};
pub use resolver::{DeviceProbe, DeviceTypeResolver};
pub use simulator::SimulatedController;
pub use transport::{ApiResponse, Auth, HttpRequest, Transport};

/// PacFlow devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the device system
pub fn init() -> std::result::Result<(), pacflow_core::error::Error> {
    tracing::info!("PacFlow Devices {} initialized", VERSION);
    Ok(())
}
