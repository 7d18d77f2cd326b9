/*!
 * Input nodes: periodic scans that emit a message when the value changes.
 *
 * Scans go through the device queue like any other request, one at a time
 * per node; the next scan starts one interval after the previous one has
 * settled. A watchdog flags a scan as delayed when the controller takes
 * longer than the threshold to answer, without cancelling the request.
 */
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, Instrument};

use pacflow_core::config::ScanConfig;
use pacflow_core::logging::operation_span;
use pacflow_core::types::Id;
use pacflow_core::utils::{duration_to_millis, secs_f64_to_duration};
use pacflow_devices::DeviceError;

use crate::error::{Error, Result};
use crate::mapping::{parse_leading_float, unwrap_read_value};
use crate::message::Message;
use crate::node_config::InputConfig;
use crate::read::read_request;
use crate::scanner::{ChangeDetector, ChangeMode};
use crate::status::NodeStatus;
use crate::worker::{FlowNode, NodeWorker};

/// Scan defaults applied when a node leaves them unset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSettings {
    /// Interval used when `scanTimeSec` is not a number
    pub default_interval: Duration,
    /// Round trip after which a scan is shown as delayed
    pub delayed_threshold: Duration,
    /// Deadband used when `deadband` is not a number
    pub default_deadband: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl ScanSettings {
    /// Settings from the `scan` configuration section
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            default_interval: Duration::from_millis(config.default_interval_ms),
            delayed_threshold: config.delayed_threshold(),
            default_deadband: config.default_deadband,
        }
    }

    /// The scan interval for `scan_time_sec`; `None` disables scanning
    pub fn interval(&self, scan_time_sec: &str) -> Option<Duration> {
        match parse_leading_float(scan_time_sec) {
            None => Some(self.default_interval),
            Some(secs) => secs_f64_to_duration(secs),
        }
    }

    /// How changes of `config`'s data kind are judged
    pub fn change_mode(&self, config: &InputConfig) -> ChangeMode {
        if !config.base.data_type.uses_deadband() {
            return ChangeMode::Strict;
        }
        let deadband = parse_leading_float(&config.deadband)
            .filter(|d| d.is_finite())
            .unwrap_or(self.default_deadband);
        ChangeMode::Deadband(deadband)
    }
}

struct Scan {
    config: InputConfig,
    detector: Mutex<ChangeDetector>,
    delayed_threshold: Duration,
}

/// A node that scans one tag and emits changes
pub struct InputNode {
    worker: Arc<NodeWorker>,
    scan: Arc<Scan>,
    interval: Option<Duration>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for InputNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputNode")
            .field("worker", &self.worker)
            .field("data_type", &self.scan.config.base.data_type)
            .field("interval", &self.interval)
            .finish()
    }
}

impl InputNode {
    /// Create an input node; scanning starts with [`InputNode::start`]
    pub fn new(worker: NodeWorker, config: InputConfig, settings: &ScanSettings) -> Result<Self> {
        let kind = config.base.data_type;
        if !kind.is_scannable() {
            return Err(Error::validation(format!("Data type '{}' cannot be scanned", kind)));
        }

        let interval = settings.interval(&config.scan_time_sec);
        let detector = ChangeDetector::new(settings.change_mode(&config), config.send_initial_value);

        Ok(Self {
            worker: Arc::new(worker),
            scan: Arc::new(Scan {
                config,
                detector: Mutex::new(detector),
                delayed_threshold: settings.delayed_threshold,
            }),
            interval,
            task: Mutex::new(None),
        })
    }

    /// The node configuration
    pub fn config(&self) -> &InputConfig {
        &self.scan.config
    }

    /// Time between scans; `None` when scanning is disabled
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Start the scan loop. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.worker.connection().is_none() {
            self.worker.sink().status(Some(NodeStatus::error("No device")));
            return;
        }
        let Some(interval) = self.interval else {
            debug!(node = %self.worker.node_id(), "Scanning disabled");
            return;
        };

        let mut task = self.lock_task();
        if task.is_some() {
            return;
        }

        info!(
            node = %self.worker.node_id(),
            interval_ms = duration_to_millis(interval),
            "Scanning started"
        );
        let worker = self.worker.clone();
        let scan = self.scan.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                scan_once(&worker, &scan).await;
                tokio::time::sleep(interval).await;
            }
        }));
    }

    /// Whether the scan loop is running
    pub fn is_scanning(&self) -> bool {
        self.lock_task().as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Stop the scan loop; a request in flight still settles
    pub fn stop(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
            debug!(node = %self.worker.node_id(), "Scanning stopped");
        }
    }

    /// Run a single scan now
    pub async fn scan_now(&self) {
        scan_once(&self.worker, &self.scan).await;
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for InputNode {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn scan_once(worker: &Arc<NodeWorker>, scan: &Arc<Scan>) {
    let Some(connection) = worker.ready() else {
        return;
    };

    // Scan failures are reported against a fresh message.
    let mut report = Message::default();
    if !worker.resolve(&connection, &mut report).await {
        return;
    }

    let base = &scan.config.base;
    if base.tag_name.trim().is_empty() {
        worker.sink().status(Some(NodeStatus::error("error")));
        return;
    }
    let request = read_request(base);

    let (tx, rx) = oneshot::channel::<std::result::Result<Value, DeviceError>>();
    let watch = worker.clone();
    let conn = connection.clone();
    let threshold = scan.delayed_threshold;

    let admission = connection.queue().add(worker.node_id(), move |slot| async move {
        let exchange = conn.controller().execute(&request).instrument(operation_span("scan", "pac-input"));
        tokio::pin!(exchange);

        let result = match tokio::time::timeout(threshold, &mut exchange).await {
            Ok(result) => result,
            Err(_) => {
                if watch.previous_error().is_none() {
                    watch.sink().status(Some(NodeStatus::scanning_delayed()));
                }
                exchange.await
            }
        };

        let delay = if result.is_ok() { Duration::ZERO } else { watch.error_cooldown() };
        slot.done(delay);
        if tx.send(result.map(|response| response.body)).is_err() {
            trace!(node = %watch.node_id(), "Scan result discarded");
        }
    });

    if !worker.after_admission(connection.queue(), admission) {
        return;
    }

    match rx.await {
        Ok(Ok(body)) => {
            worker.clear_error();
            worker.sink().status(Some(NodeStatus::scanning()));

            let value = unwrap_read_value(&body);
            let changed = scan.detector.lock().unwrap_or_else(|e| e.into_inner()).update(&value);
            if changed {
                let mut msg = Message::new();
                msg.payload = Some(value);
                msg.body = Some(body);
                msg.extra
                    .insert("inputType".to_string(), Value::String(base.data_type.to_string()));
                msg.topic = scan.config.topic_type.topic(base, &scan.config.topic);
                worker.sink().send(msg);
            }
        }
        Ok(Err(err)) => {
            // The last value is kept, so recovering to it is not a change.
            worker.report_failure(&err, &mut report);
        }
        Err(_) => {
            debug!(node = %worker.node_id(), "Scan dropped from the device queue");
        }
    }
}

#[async_trait]
impl FlowNode for InputNode {
    fn id(&self) -> &Id {
        self.worker.node_id()
    }

    fn node_type(&self) -> &'static str {
        "pac-input"
    }

    async fn on_input(&self, _msg: Message) {
        trace!(node = %self.worker.node_id(), "Input nodes ignore inbound messages");
    }

    fn on_close(&self) {
        self.stop();
        self.worker.close();
    }
}
