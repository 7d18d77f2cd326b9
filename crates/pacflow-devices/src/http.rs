/*!
 * HTTP transport backed by `reqwest`.
 */
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::endpoints::Method;
use crate::error::{DeviceError, Result, TransportError};
use crate::transport::{ApiResponse, Auth, HttpRequest, Transport};

/// Options for building a [`ReqwestTransport`]
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Idle keep-alive connections kept per host
    pub pool_max_idle_per_host: usize,
    /// Skip certificate validation
    pub accept_invalid_certs: bool,
    /// Additional trusted certificates, PEM encoded
    pub root_certificates: Vec<Vec<u8>>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 1,
            accept_invalid_certs: false,
            root_certificates: Vec::new(),
        }
    }
}

/// A [`Transport`] that talks to a real controller
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given options
    pub fn new(options: &HttpOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .danger_accept_invalid_certs(options.accept_invalid_certs);

        for pem in &options.root_certificates {
            let cert = reqwest::Certificate::from_pem(pem).map_err(|e| {
                DeviceError::configuration(format!("Invalid certificate: {}", e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| DeviceError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse> {
        trace!(method = ?request.method, url = %request.url, "Sending controller request");

        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };

        builder = match &request.auth {
            Auth::Basic { user, password } => builder.basic_auth(user, Some(password)),
            Auth::ApiKeyHeader(key) => builder.header("apiKey", key),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_reqwest_error)?;

        Ok(ApiResponse::new(status, parse_body(text)))
    }
}

fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    }
}

/// Map a `reqwest` failure to an OS-style transport error
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        return TransportError::with_code("ETIMEDOUT", err.to_string()).into();
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if let Some(code) = io_error_code(io_err) {
                return TransportError::with_code(code, io_err.to_string())
                    .with_syscall("connect")
                    .into();
            }
        }
        if let Some(code) = message_error_code(&cause.to_string()) {
            return TransportError::with_code(code, cause.to_string()).into();
        }
        source = cause.source();
    }

    if err.is_builder() {
        return TransportError::with_code("EINVAL", err.to_string()).into();
    }

    TransportError::reason(err.to_string()).into()
}

fn io_error_code(err: &io::Error) -> Option<&'static str> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::HostUnreachable => Some("EHOSTUNREACH"),
        io::ErrorKind::NetworkUnreachable => Some("ENETUNREACH"),
        io::ErrorKind::InvalidInput => Some("EINVAL"),
        _ => None,
    }
}

fn message_error_code(message: &str) -> Option<&'static str> {
    let message = message.to_ascii_lowercase();
    if message.contains("dns error") || message.contains("failed to lookup address") {
        Some("ENOTFOUND")
    } else if message.contains("invalid peer certificate") || message.contains("self-signed") {
        Some("DEPTH_ZERO_SELF_SIGNED_CERT")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_codes() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(io_error_code(&refused), Some("ECONNREFUSED"));
        let unreachable = io::Error::new(io::ErrorKind::NetworkUnreachable, "no route");
        assert_eq!(io_error_code(&unreachable), Some("ENETUNREACH"));
        let other = io::Error::new(io::ErrorKind::Other, "?");
        assert_eq!(io_error_code(&other), None);
    }

    #[test]
    fn test_message_error_codes() {
        assert_eq!(
            message_error_code("dns error: failed to lookup address information"),
            Some("ENOTFOUND")
        );
        assert_eq!(
            message_error_code("invalid peer certificate: UnknownIssuer"),
            Some("DEPTH_ZERO_SELF_SIGNED_CERT")
        );
        assert_eq!(message_error_code("connection reset"), None);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(String::new()), Value::Null);
        assert_eq!(parse_body("{\"value\":1}".to_string()), serde_json::json!({"value": 1}));
        assert_eq!(parse_body("Not Found".to_string()), Value::String("Not Found".to_string()));
    }

    #[tokio::test]
    async fn test_default_client_builds() {
        assert!(ReqwestTransport::new(&HttpOptions::default()).is_ok());
    }
}
