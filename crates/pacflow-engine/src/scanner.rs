/*!
 * Change detection for scanned values.
 */
use serde_json::Value;

/// How two scanned values are compared
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeMode {
    /// Any difference is a change
    Strict,
    /// Numbers must move by at least the deadband
    Deadband(f64),
}

/// Decides whether a scanned value should be emitted
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    mode: ChangeMode,
    send_initial_value: bool,
    last: Option<Value>,
}

impl ChangeDetector {
    /// Create a detector
    pub fn new(mode: ChangeMode, send_initial_value: bool) -> Self {
        Self {
            mode,
            send_initial_value,
            last: None,
        }
    }

    /// The comparison mode
    pub fn mode(&self) -> ChangeMode {
        self.mode
    }

    /// The value changes are measured against
    pub fn last(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    /// Record a scanned value; returns whether it should be emitted.
    ///
    /// The first value becomes the reference and is emitted only when
    /// `send_initial_value` is set. Later values are compared against the
    /// last emitted one.
    pub fn update(&mut self, value: &Value) -> bool {
        let changed = match &self.last {
            None => {
                self.last = Some(value.clone());
                return self.send_initial_value;
            }
            Some(last) => match self.mode {
                ChangeMode::Strict => last != value,
                ChangeMode::Deadband(deadband) => exceeds(last, value, deadband),
            },
        };
        if changed {
            self.last = Some(value.clone());
        }
        changed
    }
}

fn exceeds(last: &Value, value: &Value, deadband: f64) -> bool {
    match (last, value) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (b - a).abs() >= deadband,
            _ => a != b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() != b.len() || a.iter().zip(b).any(|(x, y)| exceeds(x, y, deadband))
        }
        _ => last != value,
    }
}
