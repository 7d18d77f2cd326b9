use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use serde_json::json;

use pacflow_core::config::{ConfigBuilder, DeviceConfig, Scheme, SharedConfig};
use pacflow_core::logging;
use pacflow_devices::{DataKind, SimulatedController};
use pacflow_engine::{
    ChannelSink, FlowRuntime, InputConfig, Message, NodeBaseConfig, NodeConfig, NodeEvent, ReadConfig, WriteConfig,
    WriteValueType,
};
use pacflow_engine::Id;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = ConfigBuilder::new()
        .with_config_file("pacflow.toml")
        .with_environment_prefix("PACFLOW")
        .build()
        .context("configuration")?;
    logging::init_from_config(&config.logging).context("logging")?;
    config.scan.default_interval_ms = 250;

    let runtime = Arc::new(FlowRuntime::new(SharedConfig::new(config)));

    // A simulated SNAP PAC with a few strategy tags
    let sim = Arc::new(SimulatedController::snap("kernel", "secret"));
    sim.set_value(DataKind::FloatVariable, "tank_level", json!(41.5));
    sim.set_value(DataKind::DigOutput, "pump", json!(false));
    sim.set_value(DataKind::Int32Table, "setpoints", json!([10, 20, 30, 40]));
    sim.set_latency(Some(Duration::from_millis(20)));

    let device = DeviceConfig::new(Id::from("pac-1"), "10.0.0.5", Scheme::Http, "kernel", "secret");
    runtime.create_device_with_transport(&device, sim.clone())?;

    let (sink, mut events) = ChannelSink::new(Id::from("level"));
    let sink = Arc::new(sink);

    runtime.create_node(
        Id::from("level"),
        NodeConfig::Read(ReadConfig::new(
            NodeBaseConfig::new("pac-1", DataKind::FloatVariable).with_tag("tank_level"),
        )),
        sink.clone(),
    )?;
    runtime.create_node(
        Id::from("setpoints"),
        NodeConfig::Read(ReadConfig::new(
            NodeBaseConfig::new("pac-1", DataKind::Int32Table)
                .with_tag("setpoints")
                .with_table_range("1", "2"),
        )),
        Arc::new(sink.for_node(Id::from("setpoints"))),
    )?;

    let mut pump = WriteConfig::new(NodeBaseConfig::new("pac-1", DataKind::DigOutput).with_tag("pump"));
    pump.value_type = WriteValueType::Value;
    pump.value = "true".to_string();
    runtime.create_node(Id::from("pump"), NodeConfig::Write(pump), Arc::new(sink.for_node(Id::from("pump"))))?;

    let mut watch = InputConfig::new(NodeBaseConfig::new("pac-1", DataKind::FloatVariable).with_tag("tank_level"));
    watch.deadband = "1".to_string();
    watch.send_initial_value = true;
    runtime.create_node(Id::from("watch"), NodeConfig::Input(watch), Arc::new(sink.for_node(Id::from("watch"))))?;

    // All three share one controller queue and run one at a time.
    let posted = ["level", "setpoints", "pump"]
        .into_iter()
        .map(|node| runtime.post_input(Id::from(node), Message::new()));
    join_all(posted).await;

    sim.set_value(DataKind::FloatVariable, "tank_level", json!(43.0));

    let mut received = 0;
    while received < 5 {
        let output = match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Some(output)) => output,
            _ => break,
        };
        match output.event {
            NodeEvent::Message(msg) => {
                received += 1;
                println!("[{}] {} payload={}", output.at, output.node, msg.to_value()["payload"]);
            }
            NodeEvent::Status(Some(status)) => println!("[{}] {} status: {}", output.at, output.node, status),
            NodeEvent::Status(None) => {}
            NodeEvent::Error { text, .. } => println!("[{}] {} error: {}", output.at, output.node, text),
            NodeEvent::Warning(text) => println!("[{}] {} warning: {}", output.at, output.node, text),
        }
    }

    println!("pump is now {:?}", sim.value(DataKind::DigOutput, "pump"));
    println!("{} controller requests", sim.request_count());

    runtime.shutdown();
    Ok(())
}
