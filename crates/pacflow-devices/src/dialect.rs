/*!
 * The two REST conventions a controller may speak.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::Auth;

/// Field in the device details response that identifies a supported controller
pub const CONTROLLER_MARKER: &str = "controllerType";

/// REST dialect of a controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SNAP PAC: `/api/v1`, HTTP Basic authentication
    #[default]
    Snap,
    /// Groov EPIC: `/pac`, `apiKey` header
    Groov,
}

impl Dialect {
    /// The base path below the controller address
    pub fn base_path(&self) -> &'static str {
        match self {
            Dialect::Snap => "/api/v1",
            Dialect::Groov => "/pac",
        }
    }

    /// Authentication for the dialect
    pub fn auth(&self, key: &str, secret: &str) -> Auth {
        match self {
            Dialect::Snap => Auth::Basic {
                user: key.to_string(),
                password: secret.to_string(),
            },
            Dialect::Groov => Auth::ApiKeyHeader(secret.to_string()),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Snap => f.write_str("snap"),
            Dialect::Groov => f.write_str("groov"),
        }
    }
}

/// Whether a device details body carries the controller marker
pub fn has_controller_marker(body: &serde_json::Value) -> bool {
    match body.get(CONTROLLER_MARKER) {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_per_dialect() {
        assert_eq!(
            Dialect::Snap.auth("kernel", "pw"),
            Auth::Basic {
                user: "kernel".to_string(),
                password: "pw".to_string()
            }
        );
        assert_eq!(Dialect::Groov.auth("kernel", "pw"), Auth::ApiKeyHeader("pw".to_string()));
    }

    #[test]
    fn test_marker() {
        assert!(has_controller_marker(&json!({"controllerType": "SNAP-PAC-R1"})));
        assert!(!has_controller_marker(&json!({"controllerType": ""})));
        assert!(!has_controller_marker(&json!({"firmwareVersion": "R10"})));
        assert!(!has_controller_marker(&json!("<html>")));
    }
}
