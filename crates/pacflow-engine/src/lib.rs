/*!
 * PacFlow Engine
 *
 * This crate provides the flow-node layer of PacFlow: the message envelope,
 * node configurations, value mapping, and the read, write and input nodes
 * that drive controller connections on behalf of a flow host.
 */

#![warn(missing_docs)]

// Re-export core types
pub use pacflow_core::prelude;

// Re-export types from pacflow_core for convenience
pub use pacflow_core::types::Id;

pub mod error;
pub mod input;
pub mod mapping;
pub mod message;
pub mod node_config;
pub mod read;
pub mod runtime;
pub mod scanner;
pub mod sink;
pub mod status;
pub mod worker;
pub mod write;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use input::{InputNode, ScanSettings};
pub use message::Message;
pub use node_config::{
    InputConfig, NodeBaseConfig, NodeConfig, ReadConfig, ReadValueType, TopicType, WriteConfig,
    WriteValueType,
};
pub use read::ReadNode;
pub use runtime::FlowRuntime;
pub use scanner::{ChangeDetector, ChangeMode};
pub use sink::{ChannelSink, NodeEvent, NodeOutput, NodeSink};
pub use status::{Fill, NodeStatus, Shape};
pub use worker::{FlowNode, NodeWorker};
pub use write::WriteNode;

/// PacFlow engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine
pub fn init() -> Result<()> {
    tracing::info!("PacFlow Engine {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
