/*!
 * Dialect negotiation.
 *
 * A [`DeviceTypeResolver`] probes a controller once to learn whether it speaks
 * the SNAP PAC or the Groov EPIC REST convention and caches the answer. While
 * a probe falls back to Groov the connection's effective dialect is switched
 * in place, so every request built from [`DeviceTypeResolver::dialect`] follows
 * it; a failed resolution resets the connection to SNAP.
 */
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dialect::{has_controller_marker, Dialect};
use crate::error::{DeviceError, Result};

/// Transport error codes after which the fallback probe is not attempted
const UNRECOVERABLE_CODES: [&str; 2] = ["ETIMEDOUT", "ENETUNREACH"];

/// Something that can read the controller's device details using a given dialect
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// Read `/device` and return the body of a successful response
    async fn read_device_details(&self, dialect: Dialect) -> Result<Value>;
}

#[derive(Debug, Default, Clone, Copy)]
struct ResolverState {
    dialect: Dialect,
    resolved: bool,
}

/// Probes and caches the REST dialect of one controller connection
#[derive(Debug, Default)]
pub struct DeviceTypeResolver {
    state: RwLock<ResolverState>,
    // Held for the whole of a probe so that concurrent first calls wait for it.
    gate: Mutex<()>,
}

impl DeviceTypeResolver {
    /// Create a resolver that has not probed yet
    pub fn new() -> Self {
        Self::default()
    }

    /// The dialect requests should currently use
    pub fn dialect(&self) -> Dialect {
        self.read_state().dialect
    }

    /// Whether a dialect has been confirmed
    pub fn is_resolved(&self) -> bool {
        self.read_state().resolved
    }

    /// Determine the dialect, probing the controller only if it is not known yet.
    ///
    /// A cached answer is still returned after yielding to the scheduler, so
    /// callers observe the same ordering whether or not a probe was needed.
    pub async fn resolve<P>(&self, probe: &P) -> Result<Dialect>
    where
        P: DeviceProbe + ?Sized,
    {
        let state = self.read_state();
        if state.resolved {
            tokio::task::yield_now().await;
            return Ok(state.dialect);
        }

        let _gate = self.gate.lock().await;

        // Another caller may have finished probing while we waited.
        let state = self.read_state();
        if state.resolved {
            return Ok(state.dialect);
        }

        debug!("Determining device type");

        match probe.read_device_details(Dialect::Snap).await {
            Ok(body) if has_controller_marker(&body) => {
                self.settle(Dialect::Snap);
                return Ok(Dialect::Snap);
            }
            Ok(_) => {
                debug!("Device details lack the controller marker, trying the Groov path");
            }
            Err(err) if is_unrecoverable(&err) => {
                warn!(error = %err, "Device type probe aborted");
                return Err(err);
            }
            Err(err) => {
                debug!(error = %err, "SNAP probe failed, trying the Groov path");
            }
        }

        self.set_dialect(Dialect::Groov);

        match probe.read_device_details(Dialect::Groov).await {
            Ok(body) if has_controller_marker(&body) => {
                self.settle(Dialect::Groov);
                Ok(Dialect::Groov)
            }
            Ok(_) => {
                self.set_dialect(Dialect::Snap);
                warn!("Controller answered but matches neither dialect");
                Err(DeviceError::UnknownDeviceType)
            }
            Err(err) => {
                self.set_dialect(Dialect::Snap);
                warn!(error = %err, "Device type could not be determined");
                Err(err)
            }
        }
    }

    fn read_state(&self) -> ResolverState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_dialect(&self, dialect: Dialect) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).dialect = dialect;
    }

    fn settle(&self, dialect: Dialect) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.dialect = dialect;
        state.resolved = true;
        info!(dialect = %dialect, "Device type determined");
    }
}

fn is_unrecoverable(err: &DeviceError) -> bool {
    err.transport()
        .map(|t| UNRECOVERABLE_CODES.iter().any(|code| t.has_code(code)))
        .unwrap_or(false)
}
