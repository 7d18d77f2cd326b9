/*!
 * Turning controller failures into short status text and long log text.
 *
 * Selection order matters: a controller-domain error always arrives with a 4xx
 * status, so a body-carried `errorCode` wins over the HTTP status, which in
 * turn wins over transport details.
 */
use serde_json::{json, Value};

use crate::error::{DeviceError, TransportError};

/// Short and long descriptions of a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    /// Status-line text for the node
    pub short: String,
    /// Diagnostic text for logs
    pub long: String,
}

impl ErrorDetails {
    /// Create error details
    pub fn new<S: Into<String>, L: Into<String>>(short: S, long: L) -> Self {
        Self {
            short: short.into(),
            long: long.into(),
        }
    }
}

/// Diagnostic field to attach to the message that triggered a failure
#[derive(Debug, Clone, PartialEq)]
pub enum Decoration {
    /// `pacError: {statusCode, body}`
    PacError(Value),
    /// `reqError: {code, syscall, message}`
    ReqError(Value),
}

fn transport_short(code: &str) -> Option<&'static str> {
    match code {
        "ECONNREFUSED" => Some("Connection refused"),
        "ETIMEDOUT" => Some("Timeout"),
        "EHOSTUNREACH" => Some("Device unreachable"),
        "ENETUNREACH" => Some("Network unreachable"),
        "ENOTFOUND" | "EAI_AGAIN" => Some("Address not found"),
        "EINVAL" => Some("Invalid argument"),
        "DEPTH_ZERO_SELF_SIGNED_CERT" => Some("Problem with the security certificate"),
        _ => None,
    }
}

fn controller_short(code: i64) -> Option<&'static str> {
    match code {
        -28 => Some("Tag undefined"),
        -8 => Some("Invalid data"),
        -1 => Some("No strategy in PAC"),
        -12 => Some("Invalid table index"),
        -17 | -20 => Some("PAC busy"),
        -109 => Some("Read-only permission"),
        _ => None,
    }
}

fn status_short(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("Bad request"),
        401 => Some("Bad API key"),
        404 => Some("Not found"),
        _ => None,
    }
}

/// Describe a transport error
pub fn classify_transport(err: &TransportError) -> ErrorDetails {
    let (short, mut long) = match &err.code {
        Some(code) => match transport_short(code) {
            Some(short) => (short.to_string(), format!("{}. Error code: {}", short, code)),
            None => (code.clone(), format!("Error code: {}", code)),
        },
        None if !err.message.is_empty() => {
            (err.message.clone(), format!("Error : {}", err.message))
        }
        None => ("Error".to_string(), "Error".to_string()),
    };

    if err.code.is_some() {
        if let Some(syscall) = &err.syscall {
            long.push_str(&format!(" from system call \"{}\"", syscall));
        }
    }

    ErrorDetails::new(short, long)
}

/// Describe a controller `{errorCode, message}` body
pub fn classify_controller(code: i64, message: &str) -> ErrorDetails {
    let short = match controller_short(code) {
        Some(short) => short.to_string(),
        None => {
            let first = message.split('.').next().unwrap_or_default();
            format!("PAC error {}. {}.", code, first)
        }
    };
    let long = format!("PAC response error : {}. {}", code, message);
    ErrorDetails::new(short, long)
}

/// Describe a bare HTTP status
pub fn classify_status(status: u16) -> ErrorDetails {
    let short = status_short(status)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Status code {}", status));
    let long = format!("{}. HTTP response error : {}", short, status);
    ErrorDetails::new(short, long)
}

fn body_error_code(body: &Value) -> Option<i64> {
    match body.get("errorCode")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Classify any device error
pub fn classify(err: &DeviceError) -> ErrorDetails {
    match err {
        DeviceError::Response { status, body } => match body_error_code(body) {
            Some(code) => {
                let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
                classify_controller(code, message)
            }
            None => classify_status(*status),
        },
        DeviceError::Transport(transport) => classify_transport(transport),
        DeviceError::UnknownDeviceType => {
            ErrorDetails::new("Unknown device type", "Unknown device type. The controller matches neither REST dialect")
        }
        DeviceError::Configuration(msg) => {
            ErrorDetails::new("Configuration error", format!("Configuration error : {}", msg))
        }
        DeviceError::Serialization(msg) => ErrorDetails::new("Error", format!("Error : {}", msg)),
    }
}

/// The diagnostic field for `err`, if it carries one
pub fn decoration(err: &DeviceError) -> Option<Decoration> {
    match err {
        DeviceError::Response { status, body } => Some(Decoration::PacError(json!({
            "statusCode": status,
            "body": body,
        }))),
        DeviceError::Transport(transport) => {
            serde_json::to_value(transport).ok().map(Decoration::ReqError)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_code_wins_over_status() {
        let err = DeviceError::Response {
            status: 404,
            body: json!({"errorCode": -28, "message": "Undefined tag."}),
        };
        let details = classify(&err);
        assert_eq!(details.short, "Tag undefined");
        assert_eq!(details.long, "PAC response error : -28. Undefined tag.");
    }

    #[test]
    fn test_unknown_controller_code_truncates_message() {
        let details = classify_controller(-99, "Something odd. See the user guide.");
        assert_eq!(details.short, "PAC error -99. Something odd.");
        assert_eq!(details.long, "PAC response error : -99. Something odd. See the user guide.");
    }

    #[test]
    fn test_status_only() {
        let err = DeviceError::Response {
            status: 401,
            body: json!("Unauthorized"),
        };
        assert_eq!(classify(&err).short, "Bad API key");
        assert_eq!(classify(&err).long, "Bad API key. HTTP response error : 401");
        assert_eq!(classify_status(503).short, "Status code 503");
    }

    #[test]
    fn test_transport_codes() {
        let err = TransportError::with_code("ECONNREFUSED", "refused").with_syscall("connect");
        let details = classify_transport(&err);
        assert_eq!(details.short, "Connection refused");
        assert_eq!(
            details.long,
            "Connection refused. Error code: ECONNREFUSED from system call \"connect\""
        );

        let details = classify_transport(&TransportError::with_code("ECONNRESET", "reset"));
        assert_eq!(details.short, "ECONNRESET");
        assert_eq!(details.long, "Error code: ECONNRESET");

        let details = classify_transport(&TransportError::reason("socket hang up"));
        assert_eq!(details.short, "socket hang up");
        assert_eq!(details.long, "Error : socket hang up");
    }

    #[test]
    fn test_unknown_device_type() {
        assert_eq!(classify(&DeviceError::UnknownDeviceType).short, "Unknown device type");
    }

    #[test]
    fn test_decorations() {
        let err = DeviceError::Response {
            status: 400,
            body: json!({"errorCode": -8, "message": "Invalid data."}),
        };
        assert_eq!(
            decoration(&err),
            Some(Decoration::PacError(json!({
                "statusCode": 400,
                "body": {"errorCode": -8, "message": "Invalid data."}
            })))
        );

        let err: DeviceError = TransportError::with_code("ETIMEDOUT", "timed out").into();
        assert_eq!(
            decoration(&err),
            Some(Decoration::ReqError(json!({"code": "ETIMEDOUT", "message": "timed out"})))
        );

        assert_eq!(decoration(&DeviceError::UnknownDeviceType), None);
    }
}
