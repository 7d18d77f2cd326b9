/*!
 * A REST client for one controller.
 */
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use pacflow_core::config::{DeviceConfig, HttpConfig, Scheme};
use pacflow_core::types::Id;

use crate::dialect::Dialect;
use crate::endpoints::ApiRequest;
use crate::error::{DeviceError, Result};
use crate::http::{HttpOptions, ReqwestTransport};
use crate::resolver::{DeviceProbe, DeviceTypeResolver};
use crate::transport::{ApiResponse, HttpRequest, Transport};

/// A controller reachable over REST, in whichever dialect it speaks
pub struct PacController {
    device_id: Id,
    origin: String,
    key: String,
    secret: String,
    transport: Arc<dyn Transport>,
    resolver: DeviceTypeResolver,
    config_error: Option<String>,
}

impl fmt::Debug for PacController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacController")
            .field("device_id", &self.device_id)
            .field("origin", &self.origin)
            .field("dialect", &self.resolver.dialect())
            .field("resolved", &self.resolver.is_resolved())
            .field("config_error", &self.config_error)
            .finish()
    }
}

impl PacController {
    /// Create a controller client that sends through `transport`
    pub fn new(device: &DeviceConfig, transport: Arc<dyn Transport>) -> Self {
        let config_error = if device.secret.is_empty() {
            Some("Missing API key".to_string())
        } else {
            None
        };

        Self {
            device_id: device.id.clone(),
            origin: format!("{}://{}", device.protocol, device.address.trim()),
            key: device.key.clone(),
            secret: device.secret.clone(),
            transport,
            resolver: DeviceTypeResolver::new(),
            config_error,
        }
    }

    /// Create a controller client with an HTTP transport built from
    /// configuration.
    ///
    /// Certificate files that cannot be read leave the controller in a
    /// configuration-error state instead of failing construction.
    pub fn from_config(device: &DeviceConfig, http: &HttpConfig) -> Result<Self> {
        let mut cert_errors = Vec::new();
        let mut options = HttpOptions {
            timeout: http.timeout(),
            pool_max_idle_per_host: http.pool_max_idle_per_host,
            ..HttpOptions::default()
        };

        if device.protocol == Scheme::Https {
            for path in [&device.ca_cert_path, &device.public_cert_path].into_iter().flatten() {
                if path.trim().is_empty() {
                    continue;
                }
                match std::fs::read(path) {
                    Ok(pem) => options.root_certificates.push(pem),
                    Err(e) => {
                        warn!(device = %device.id, path = %path, error = %e, "Unable to read certificate");
                        cert_errors.push(format!("Unable to read certificate {}: {}", path, e));
                    }
                }
            }
            options.accept_invalid_certs =
                http.testing || (device.is_localhost() && options.root_certificates.is_empty());
        }

        let transport = ReqwestTransport::new(&options)?;
        let mut controller = Self::new(device, Arc::new(transport));
        if controller.config_error.is_none() && !cert_errors.is_empty() {
            controller.config_error = Some(cert_errors.join("; "));
        }
        Ok(controller)
    }

    /// The device configuration id
    pub fn device_id(&self) -> &Id {
        &self.device_id
    }

    /// `scheme://address` of the controller
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether the static configuration makes requests pointless
    pub fn has_config_error(&self) -> bool {
        self.config_error.is_some()
    }

    /// Description of the configuration error, if any
    pub fn config_error(&self) -> Option<&str> {
        self.config_error.as_deref()
    }

    /// The dialect resolver of this connection
    pub fn resolver(&self) -> &DeviceTypeResolver {
        &self.resolver
    }

    /// Determine the controller's dialect, probing only the first time
    pub async fn resolve(&self) -> Result<Dialect> {
        self.resolver.resolve(self).await
    }

    /// Send a request using the connection's current dialect.
    ///
    /// Non-success statuses become [`DeviceError::Response`].
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.execute_with(self.resolver.dialect(), request).await
    }

    async fn execute_with(&self, dialect: Dialect, request: &ApiRequest) -> Result<ApiResponse> {
        let http_request = HttpRequest {
            method: request.method,
            url: self.url(dialect, request)?,
            auth: dialect.auth(&self.key, &self.secret),
            query: request.query.clone(),
            body: request.body.clone(),
        };

        debug!(device = %self.device_id, dialect = %dialect, path = %request.path(), "Controller request");

        let response = self.transport.send(http_request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(DeviceError::Response {
                status: response.status,
                body: response.body,
            })
        }
    }

    fn url(&self, dialect: Dialect, request: &ApiRequest) -> Result<Url> {
        let base = format!("{}{}", self.origin, dialect.base_path());
        let mut url = Url::parse(&base).map_err(|e| {
            DeviceError::configuration(format!("Invalid controller address '{}': {}", self.origin, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| DeviceError::configuration(format!("Invalid controller address '{}'", self.origin)))?
            .pop_if_empty()
            .extend(&request.segments);
        Ok(url)
    }
}

#[async_trait]
impl DeviceProbe for PacController {
    async fn read_device_details(&self, dialect: Dialect) -> Result<Value> {
        let response = self.execute_with(dialect, &ApiRequest::device_details()).await?;
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::DataKind;
    use crate::simulator::SimulatedController;
    use crate::endpoints::TableRange;
    use crate::transport::Auth;
    use serde_json::json;

    fn device(secret: &str) -> DeviceConfig {
        DeviceConfig::new(Id::from("pac"), "10.0.0.5", Scheme::Http, "kernel", secret)
    }

    #[tokio::test]
    async fn test_missing_secret_is_config_error() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        let controller = PacController::new(&device(""), sim);
        assert!(controller.has_config_error());
        assert_eq!(controller.config_error(), Some("Missing API key"));
    }

    #[tokio::test]
    async fn test_snap_requests_use_basic_auth() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        let controller = PacController::new(&device("pw"), sim.clone());

        assert_eq!(controller.resolve().await.unwrap(), Dialect::Snap);
        let request = sim.requests().pop().unwrap();
        assert_eq!(request.url.as_str(), "http://10.0.0.5/api/v1/device");
        assert_eq!(
            request.auth,
            Auth::Basic {
                user: "kernel".to_string(),
                password: "pw".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_groov_switch_rewrites_later_requests() {
        let sim = Arc::new(SimulatedController::groov("pw"));
        sim.set_value(DataKind::FloatVariable, "temp", json!(21.5));
        let controller = PacController::new(&device("pw"), sim.clone());

        assert_eq!(controller.resolve().await.unwrap(), Dialect::Groov);

        let response = controller
            .execute(&ApiRequest::read(DataKind::FloatVariable, Some("temp"), TableRange::default()))
            .await
            .unwrap();
        assert_eq!(response.body, json!({"value": 21.5}));

        let request = sim.requests().pop().unwrap();
        assert_eq!(request.url.path(), "/pac/device/strategy/vars/floats/temp");
        assert_eq!(request.auth, Auth::ApiKeyHeader("pw".to_string()));
    }

    #[tokio::test]
    async fn test_error_status_becomes_response_error() {
        let sim = Arc::new(SimulatedController::snap("kernel", "pw"));
        let controller = PacController::new(&device("pw"), sim);
        controller.resolve().await.unwrap();

        let err = controller
            .execute(&ApiRequest::read(DataKind::Int32Variable, Some("nope"), TableRange::default()))
            .await
            .unwrap_err();
        match err {
            DeviceError::Response { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body["errorCode"], json!(-28));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_from_config_flags_unreadable_certificate() {
        let mut config = DeviceConfig::new(Id::from("pac"), "pac.local", Scheme::Https, "k", "s");
        config.ca_cert_path = Some("/nonexistent/pacflow/ca.pem".to_string());

        let controller = PacController::from_config(&config, &HttpConfig::default()).unwrap();
        assert!(controller.has_config_error());
        assert_eq!(controller.origin(), "https://pac.local");
    }
}
