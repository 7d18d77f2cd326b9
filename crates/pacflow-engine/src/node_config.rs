/*!
 * Node configurations as persisted by the flow host.
 *
 * Field names follow the host's camelCase JSON. Older hosts store numeric
 * fields as text, so table ranges, scan time and deadband are accepted either
 * as strings or as numbers.
 */
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use pacflow_core::types::Id;
use pacflow_devices::kinds::DataKind;

use crate::mapping::js_number_to_string;
use crate::message::Message;

/// Configuration shared by every node kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBaseConfig {
    /// Linked device configuration
    #[serde(default, deserialize_with = "optional_id")]
    pub device: Option<Id>,
    /// Target data kind
    pub data_type: DataKind,
    /// Tag name; empty selects the read-all variant
    #[serde(default, deserialize_with = "lenient_string")]
    pub tag_name: String,
    /// First table element
    #[serde(default, deserialize_with = "lenient_string")]
    pub table_start_index: String,
    /// Number of table elements
    #[serde(default, deserialize_with = "lenient_string")]
    pub table_length: String,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl NodeBaseConfig {
    /// Create a configuration for a device and data kind
    pub fn new(device: impl Into<Id>, data_type: DataKind) -> Self {
        Self {
            device: Some(device.into()),
            data_type,
            tag_name: String::new(),
            table_start_index: String::new(),
            table_length: String::new(),
            name: String::new(),
        }
    }

    /// Set the tag name
    pub fn with_tag(mut self, tag_name: impl Into<String>) -> Self {
        self.tag_name = tag_name.into();
        self
    }

    /// Set the table range
    pub fn with_table_range(mut self, start_index: impl Into<String>, length: impl Into<String>) -> Self {
        self.table_start_index = start_index.into();
        self.table_length = length.into();
        self
    }

    /// The configuration for one message: `tagName`, `tableStartIndex` and
    /// `tableLength` on an object payload replace the configured values
    pub fn with_overrides(&self, msg: &Message) -> Self {
        let mut config = self.clone();
        if let Some(Value::Object(payload)) = &msg.payload {
            if let Some(tag) = payload.get("tagName").and_then(override_text) {
                config.tag_name = tag;
            }
            if let Some(start) = payload.get("tableStartIndex").and_then(override_text) {
                config.table_start_index = start;
            }
            if let Some(length) = payload.get("tableLength").and_then(override_text) {
                config.table_length = length;
            }
        }
        config
    }

    /// The tag name, if one is set
    pub fn tag(&self) -> Option<&str> {
        if self.tag_name.is_empty() {
            None
        } else {
            Some(self.tag_name.as_str())
        }
    }
}

fn override_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_f64().map(js_number_to_string),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Where a read result goes in the outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadValueType {
    /// `msg.payload`
    #[default]
    #[serde(rename = "msg.payload")]
    Payload,
    /// The message property named by `value`
    #[serde(rename = "msg")]
    Msg,
}

/// Where a write takes its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteValueType {
    /// `msg.payload`
    #[default]
    #[serde(rename = "msg.payload")]
    Payload,
    /// The message property named by `value`
    #[serde(rename = "msg")]
    Msg,
    /// The configured `value` text itself
    #[serde(rename = "value")]
    Value,
}

/// How the outgoing topic is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicType {
    /// Leave the topic untouched
    #[default]
    None,
    /// `"<dataType>/<tagName>"`
    Auto,
    /// The configured topic
    User,
}

impl TopicType {
    /// The topic to attach, if any
    pub fn topic(&self, base: &NodeBaseConfig, user_topic: &str) -> Option<String> {
        match self {
            TopicType::None => None,
            TopicType::User => Some(user_topic.to_string()),
            TopicType::Auto => Some(match base.tag() {
                Some(tag) => format!("{}/{}", base.data_type, tag),
                None => base.data_type.to_string(),
            }),
        }
    }
}

/// Read node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadConfig {
    /// Shared settings
    #[serde(flatten)]
    pub base: NodeBaseConfig,
    /// Result placement
    #[serde(default)]
    pub value_type: ReadValueType,
    /// Property path when `value_type` is `msg`
    #[serde(default)]
    pub value: String,
    /// Topic selection
    #[serde(default)]
    pub topic_type: TopicType,
    /// User topic
    #[serde(default)]
    pub topic: String,
}

impl ReadConfig {
    /// A read into `msg.payload` without a topic
    pub fn new(base: NodeBaseConfig) -> Self {
        Self {
            base,
            value_type: ReadValueType::default(),
            value: String::new(),
            topic_type: TopicType::default(),
            topic: String::new(),
        }
    }

    /// The message property the result is stored in
    pub fn target_property(&self) -> &str {
        match self.value_type {
            ReadValueType::Payload => "payload",
            ReadValueType::Msg => self.value.as_str(),
        }
    }
}

/// Write node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteConfig {
    /// Shared settings
    #[serde(flatten)]
    pub base: NodeBaseConfig,
    /// Value source
    #[serde(default)]
    pub value_type: WriteValueType,
    /// Property path or literal value, depending on `value_type`
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

impl WriteConfig {
    /// A write of `msg.payload`
    pub fn new(base: NodeBaseConfig) -> Self {
        Self {
            base,
            value_type: WriteValueType::default(),
            value: String::new(),
        }
    }
}

/// Input node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    /// Shared settings
    #[serde(flatten)]
    pub base: NodeBaseConfig,
    /// Scan interval in seconds
    #[serde(default, deserialize_with = "lenient_string")]
    pub scan_time_sec: String,
    /// Minimum numeric change reported
    #[serde(default, deserialize_with = "lenient_string")]
    pub deadband: String,
    /// Emit the first scanned value unconditionally
    #[serde(default)]
    pub send_initial_value: bool,
    /// Topic selection
    #[serde(default)]
    pub topic_type: TopicType,
    /// User topic
    #[serde(default)]
    pub topic: String,
}

impl InputConfig {
    /// An input scanning at the default interval
    pub fn new(base: NodeBaseConfig) -> Self {
        Self {
            base,
            scan_time_sec: String::new(),
            deadband: String::new(),
            send_initial_value: false,
            topic_type: TopicType::default(),
            topic: String::new(),
        }
    }
}

/// Any node configuration, tagged by the host's node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeConfig {
    /// `pac-read`
    #[serde(rename = "pac-read")]
    Read(ReadConfig),
    /// `pac-write`
    #[serde(rename = "pac-write")]
    Write(WriteConfig),
    /// `pac-input`
    #[serde(rename = "pac-input")]
    Input(InputConfig),
}

impl NodeConfig {
    /// Shared settings
    pub fn base(&self) -> &NodeBaseConfig {
        match self {
            NodeConfig::Read(c) => &c.base,
            NodeConfig::Write(c) => &c.base,
            NodeConfig::Input(c) => &c.base,
        }
    }

    /// The host node type
    pub fn node_type(&self) -> &'static str {
        match self {
            NodeConfig::Read(_) => "pac-read",
            NodeConfig::Write(_) => "pac-write",
            NodeConfig::Input(_) => "pac-input",
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.as_f64().map(js_number_to_string).unwrap_or_default(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    })
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<Id>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<String>::deserialize(deserializer)?;
    Ok(id.filter(|s| !s.trim().is_empty()).map(Id::from_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_host_configs() {
        let config: NodeConfig = serde_json::from_value(json!({
            "type": "pac-read",
            "device": "dev1",
            "dataType": "int32-table",
            "tagName": "tbl",
            "tableStartIndex": "2",
            "tableLength": 5,
            "valueType": "msg",
            "value": "data.values",
            "topicType": "auto"
        }))
        .unwrap();

        match &config {
            NodeConfig::Read(read) => {
                assert_eq!(read.base.device, Some(Id::from("dev1")));
                assert_eq!(read.base.data_type, DataKind::Int32Table);
                assert_eq!(read.base.table_length, "5");
                assert_eq!(read.target_property(), "data.values");
                assert_eq!(read.topic_type.topic(&read.base, ""), Some("int32-table/tbl".to_string()));
            }
            other => panic!("unexpected config {:?}", other),
        }
        assert_eq!(config.node_type(), "pac-read");
    }

    #[test]
    fn test_defaults_for_older_configs() {
        let config: NodeConfig = serde_json::from_value(json!({
            "type": "pac-input",
            "device": "",
            "dataType": "float-variable",
            "tagName": "f",
            "scanTimeSec": 0.5
        }))
        .unwrap();

        let NodeConfig::Input(input) = config else {
            panic!("expected an input config");
        };
        assert_eq!(input.base.device, None);
        assert_eq!(input.scan_time_sec, "0.5");
        assert_eq!(input.deadband, "");
        assert!(!input.send_initial_value);
        assert_eq!(input.topic_type, TopicType::None);
    }

    #[test]
    fn test_unknown_data_type_is_rejected() {
        let result = serde_json::from_value::<NodeConfig>(json!({
            "type": "pac-write",
            "device": "dev1",
            "dataType": "coil"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_message_overrides() {
        let base = NodeBaseConfig::new("dev1", DataKind::FloatTable)
            .with_tag("configured")
            .with_table_range("0", "10");

        let msg = Message::from_value(json!({
            "payload": {"tagName": "fromMsg", "tableStartIndex": 3, "tableLength": "4"}
        }))
        .unwrap();
        let effective = base.with_overrides(&msg);
        assert_eq!(effective.tag_name, "fromMsg");
        assert_eq!(effective.table_start_index, "3");
        assert_eq!(effective.table_length, "4");

        // Scalar payloads leave the configuration alone.
        let msg = Message::from_value(json!({"payload": 7})).unwrap();
        assert_eq!(base.with_overrides(&msg), base);
    }

    #[test]
    fn test_auto_topic_without_tag() {
        let base = NodeBaseConfig::new("dev1", DataKind::DigInput);
        assert_eq!(TopicType::Auto.topic(&base, ""), Some("dig-input".to_string()));
        assert_eq!(TopicType::User.topic(&base, "t"), Some("t".to_string()));
        assert_eq!(TopicType::None.topic(&base, "t"), None);
    }
}
