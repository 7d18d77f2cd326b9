/*!
 * The message envelope exchanged with the flow host.
 *
 * Well-known fields are typed; anything else the host put on the message is
 * kept in [`Message::extra`] and travels through the nodes untouched. Nested
 * properties are addressed with dotted paths such as `data.points[2].value`.
 */
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A flow message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The main value; `Some(Value::Null)` is an explicit null
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Raw response body of the last controller call
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Message topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// `{statusCode, body}` of a failed controller response
    #[serde(rename = "pacError", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub pac_error: Option<Value>,

    /// Transport error details of a failed request
    #[serde(rename = "reqError", default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub req_error: Option<Value>,

    /// Every other property
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Keeps an explicit `null` distinguishable from a missing field.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// One step of a property path
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut chars = path.trim().chars().peekable();
    let mut key = String::new();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if key.is_empty() && !matches!(segments.last(), Some(Segment::Index(_))) {
                    return Err(Error::path(path));
                }
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                if chars.peek().is_none() {
                    return Err(Error::path(path));
                }
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(Error::path(path));
                }
                let inner = inner.trim();
                let quoted = inner.len() >= 2
                    && ((inner.starts_with('"') && inner.ends_with('"'))
                        || (inner.starts_with('\'') && inner.ends_with('\'')));
                if quoted {
                    segments.push(Segment::Key(inner[1..inner.len() - 1].to_string()));
                } else {
                    let index = inner.parse::<usize>().map_err(|_| Error::path(path))?;
                    segments.push(Segment::Index(index));
                }
            }
            _ => key.push(c),
        }
    }

    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }
    if segments.is_empty() {
        return Err(Error::path(path));
    }
    Ok(segments)
}

impl Message {
    /// Create an empty message with a fresh `_msgid`
    pub fn new() -> Self {
        let mut msg = Self::default();
        msg.extra
            .insert("_msgid".to_string(), Value::String(Uuid::new_v4().simple().to_string()));
        msg
    }

    /// Create a message carrying `payload`
    pub fn with_payload(payload: Value) -> Self {
        let mut msg = Self::new();
        msg.payload = Some(payload);
        msg
    }

    /// Build a message from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::validation("A message must be a JSON object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The message as a JSON object
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Look up a dotted property path; `None` when any step is missing
    pub fn get_property(&self, path: &str) -> Result<Option<Value>> {
        let segments = parse_path(path)?;
        let root = self.to_value();
        let mut current = &root;
        for segment in &segments {
            let next = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(index), Value::Array(items)) => items.get(*index),
                (Segment::Key(key), Value::Array(items)) => {
                    key.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Ok(None),
            }
        }
        Ok(Some(current.clone()))
    }

    /// Set a dotted property path, creating missing intermediate objects and arrays
    pub fn set_property(&mut self, path: &str, value: Value) -> Result<()> {
        let segments = parse_path(path)?;
        let mut root = self.to_value();
        set_in(&mut root, &segments, value, path)?;
        *self = serde_json::from_value(root)
            .map_err(|e| Error::path(format!("{}: {}", path, e)))?;
        Ok(())
    }
}

fn set_in(target: &mut Value, segments: &[Segment], value: Value, path: &str) -> Result<()> {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => {
            *target = value;
            return Ok(());
        }
    };

    let empty_child = || match rest.first() {
        Some(Segment::Index(_)) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    };

    match first {
        Segment::Key(key) => {
            if !target.is_object() {
                if target.is_null() {
                    *target = Value::Object(Map::new());
                } else {
                    return Err(Error::path(format!("{} is not an object at '{}'", path, key)));
                }
            }
            let map = match target.as_object_mut() {
                Some(map) => map,
                None => return Err(Error::path(path)),
            };
            if rest.is_empty() {
                map.insert(key.clone(), value);
                return Ok(());
            }
            let child = map.entry(key.clone()).or_insert_with(empty_child);
            if child.is_null() {
                *child = empty_child();
            }
            set_in(child, rest, value, path)
        }
        Segment::Index(index) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let items = match target.as_array_mut() {
                Some(items) => items,
                None => {
                    return Err(Error::path(format!("{} is not an array at [{}]", path, index)))
                }
            };
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            if rest.is_empty() {
                items[*index] = value;
                return Ok(());
            }
            if items[*index].is_null() {
                items[*index] = empty_child();
            }
            set_in(&mut items[*index], rest, value, path)
        }
    }
}
