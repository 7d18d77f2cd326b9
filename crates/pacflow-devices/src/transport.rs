/*!
 * Transport abstraction for controller requests.
 *
 * The [`Transport`] trait is the seam between the connection logic (dialect
 * negotiation, queueing, error classification) and the wire. The production
 * implementation lives in [`crate::http`]; tests substitute scripted
 * controllers.
 */
use std::fmt::Debug;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::endpoints::Method;
use crate::error::Result;

/// Authentication attached to a request
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// HTTP Basic authentication (SNAP PAC)
    Basic {
        /// API key id
        user: String,
        /// API key value
        password: String,
    },
    /// `apiKey` request header (Groov EPIC)
    ApiKeyHeader(String),
}

impl Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Basic { user, .. } => f.debug_struct("Basic").field("user", user).finish(),
            Auth::ApiKeyHeader(_) => f.write_str("ApiKeyHeader"),
        }
    }
}

/// A fully resolved HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, including the dialect base path
    pub url: Url,
    /// Authentication to attach
    pub auth: Auth,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

/// A controller response, whatever its status
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, parsed as JSON when possible, else a JSON string
    pub body: Value,
}

impl ApiResponse {
    /// Create a response
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to a controller
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send a request and return the response, or a transport error when no
    /// response was received
    async fn send(&self, request: HttpRequest) -> Result<ApiResponse>;
}
