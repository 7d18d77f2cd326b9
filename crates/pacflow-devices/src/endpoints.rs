/*!
 * REST endpoint catalog.
 *
 * Every request is described relative to the dialect base path, so the same
 * [`ApiRequest`] works against a SNAP PAC (`/api/v1`) and a Groov EPIC (`/pac`)
 * controller once the connection knows which one it is talking to.
 */
use serde_json::Value;

use crate::error::{DeviceError, Result};
use crate::kinds::DataKind;

/// HTTP method used by the controller API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read
    Get,
    /// Write
    Post,
}

/// An optional slice of a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableRange {
    /// First element to read or write
    pub start_index: Option<i64>,
    /// Number of elements to read
    pub num_elements: Option<i64>,
}

impl TableRange {
    /// Build a range from the loosely typed strings found in node configuration
    pub fn parse(start_index: &str, num_elements: &str) -> Self {
        Self {
            start_index: parse_leading_int(start_index),
            num_elements: parse_leading_int(num_elements),
        }
    }
}

/// Parse the leading integer of a string the way lenient form input is
/// usually read: leading whitespace and a sign are accepted, parsing stops at
/// the first non-digit, and a missing number yields `None`.
pub fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// A request relative to the dialect base path
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path segments below the base path, not yet percent-encoded
    pub segments: Vec<String>,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON body for writes
    pub body: Option<Value>,
}

impl ApiRequest {
    fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: Method::Get,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    /// `GET /device`
    pub fn device_details() -> Self {
        Self::get(["device"])
    }

    /// `GET /device/strategy`
    pub fn strategy_details() -> Self {
        Self::get(["device", "strategy"])
    }

    /// Read one tag, or every tag of the kind when `tag` is `None`.
    ///
    /// Device and strategy details have no per-tag form, so `tag` is ignored
    /// for them.
    pub fn read(kind: DataKind, tag: Option<&str>, range: TableRange) -> Self {
        match kind {
            DataKind::DeviceInfo => return Self::device_details(),
            DataKind::StrategyInfo => return Self::strategy_details(),
            _ => {}
        }

        let (mut segments, one_suffix, all_suffix) = collection(kind);
        match tag {
            None => {
                if let Some(suffix) = all_suffix {
                    segments.push(suffix.to_string());
                }
                Self::get(segments)
            }
            Some(tag) => {
                segments.push(tag.to_string());
                if let Some(suffix) = one_suffix {
                    segments.push(suffix.to_string());
                }
                let mut request = Self::get(segments);
                if kind.is_table() {
                    if let Some(start) = range.start_index {
                        request.query.push(("startIndex".to_string(), start.to_string()));
                        if let Some(count) = range.num_elements {
                            request.query.push(("numElements".to_string(), count.to_string()));
                        }
                    }
                }
                request
            }
        }
    }

    /// Write `body` to one tag
    pub fn write(kind: DataKind, tag: &str, body: Value, start_index: Option<i64>) -> Result<Self> {
        if !kind.is_writable() {
            return Err(DeviceError::configuration(format!(
                "Data type '{}' cannot be written",
                kind
            )));
        }
        if tag.trim().is_empty() {
            return Err(DeviceError::configuration("A tag name is required for writes"));
        }

        let (mut segments, one_suffix, _) = collection(kind);
        segments.push(tag.to_string());
        if let Some(suffix) = one_suffix {
            segments.push(suffix.to_string());
        }

        let mut query = Vec::new();
        if kind.is_table() {
            if let Some(start) = start_index {
                query.push(("startIndex".to_string(), start.to_string()));
            }
        }

        Ok(Self {
            method: Method::Post,
            segments,
            query,
            body: Some(body),
        })
    }

    /// The relative path, for logging
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

// (collection segments, suffix after a tag name, suffix for the read-all call)
fn collection(kind: DataKind) -> (Vec<String>, Option<&'static str>, Option<&'static str>) {
    let base: &[&str] = match kind {
        DataKind::DeviceInfo => &["device"],
        DataKind::StrategyInfo => &["device", "strategy"],
        DataKind::DigInput => &["device", "strategy", "ios", "digitalInputs"],
        DataKind::DigOutput => &["device", "strategy", "ios", "digitalOutputs"],
        DataKind::AnaInput => &["device", "strategy", "ios", "analogInputs"],
        DataKind::AnaOutput => &["device", "strategy", "ios", "analogOutputs"],
        DataKind::Int32Variable => &["device", "strategy", "vars", "int32s"],
        DataKind::Int64Variable => &["device", "strategy", "vars", "int64s"],
        DataKind::FloatVariable => &["device", "strategy", "vars", "floats"],
        DataKind::StringVariable => &["device", "strategy", "vars", "strings"],
        DataKind::DownTimerVariable => &["device", "strategy", "vars", "downTimers"],
        DataKind::UpTimerVariable => &["device", "strategy", "vars", "upTimers"],
        DataKind::Int32Table => &["device", "strategy", "tables", "int32s"],
        DataKind::Int64Table => &["device", "strategy", "tables", "int64s"],
        DataKind::FloatTable => &["device", "strategy", "tables", "floats"],
        DataKind::StringTable => &["device", "strategy", "tables", "strings"],
    };

    let (one, all) = match kind {
        DataKind::DigInput | DataKind::DigOutput => (Some("state"), None),
        DataKind::AnaInput | DataKind::AnaOutput => (Some("eu"), None),
        DataKind::Int64Variable => (Some("string"), Some("string")),
        DataKind::Int64Table => (Some("string"), None),
        DataKind::DownTimerVariable | DataKind::UpTimerVariable => (Some("value"), None),
        _ => (None, None),
    };

    (base.iter().map(|s| s.to_string()).collect(), one, all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("12"), Some(12));
        assert_eq!(parse_leading_int("  7abc"), Some(7));
        assert_eq!(parse_leading_int("-3"), Some(-3));
        assert_eq!(parse_leading_int("1.9"), Some(1));
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int("-"), None);
    }

    #[test]
    fn test_metadata_paths() {
        assert_eq!(ApiRequest::device_details().path(), "/device");
        assert_eq!(ApiRequest::strategy_details().path(), "/device/strategy");
        assert_eq!(
            ApiRequest::read(DataKind::StrategyInfo, None, TableRange::default()).path(),
            "/device/strategy"
        );
    }

    #[test]
    fn test_metadata_reads_ignore_tag() {
        let range = TableRange::parse("1", "2");
        let request = ApiRequest::read(DataKind::DeviceInfo, Some("stale"), range);
        assert_eq!(request, ApiRequest::device_details());
        let request = ApiRequest::read(DataKind::StrategyInfo, Some("x"), range);
        assert_eq!(request, ApiRequest::strategy_details());
    }

    #[test]
    fn test_read_paths() {
        let none = TableRange::default();
        assert_eq!(
            ApiRequest::read(DataKind::DigInput, Some("sw1"), none).path(),
            "/device/strategy/ios/digitalInputs/sw1/state"
        );
        assert_eq!(
            ApiRequest::read(DataKind::AnaOutput, None, none).path(),
            "/device/strategy/ios/analogOutputs"
        );
        assert_eq!(
            ApiRequest::read(DataKind::Int64Variable, None, none).path(),
            "/device/strategy/vars/int64s/string"
        );
        assert_eq!(
            ApiRequest::read(DataKind::Int64Variable, Some("big"), none).path(),
            "/device/strategy/vars/int64s/big/string"
        );
        assert_eq!(
            ApiRequest::read(DataKind::UpTimerVariable, Some("t"), none).path(),
            "/device/strategy/vars/upTimers/t/value"
        );
        assert_eq!(
            ApiRequest::read(DataKind::Int64Table, Some("tbl"), none).path(),
            "/device/strategy/tables/int64s/tbl/string"
        );
    }

    #[test]
    fn test_table_range_query() {
        let request = ApiRequest::read(DataKind::FloatTable, Some("ft"), TableRange::parse("2", "5"));
        assert_eq!(
            request.query,
            vec![
                ("startIndex".to_string(), "2".to_string()),
                ("numElements".to_string(), "5".to_string())
            ]
        );

        // The element count is only sent along with a start index.
        let request = ApiRequest::read(DataKind::FloatTable, Some("ft"), TableRange::parse("", "5"));
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_write_requests() {
        let request = ApiRequest::write(DataKind::DigOutput, "led", json!({"value": true}), None).unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path(), "/device/strategy/ios/digitalOutputs/led/state");
        assert_eq!(request.body, Some(json!({"value": true})));

        let request = ApiRequest::write(DataKind::Int32Table, "t", json!([1, 2]), Some(4)).unwrap();
        assert_eq!(request.query, vec![("startIndex".to_string(), "4".to_string())]);

        assert!(ApiRequest::write(DataKind::DigInput, "sw", json!({"value": true}), None).is_err());
        assert!(ApiRequest::write(DataKind::FloatVariable, " ", json!({"value": 1}), None).is_err());
    }
}
