/*!
 * Conversion of message values into controller write payloads, and of
 * controller responses back into message values.
 *
 * Values from messages may be strings, numbers, booleans or arrays; each has
 * its own conversion table per data kind. Strings are what the host's
 * configuration UI produces, so they get the most lenient treatment. No range
 * validation is done: numbers headed for 64-bit integer tags go through
 * 64-bit floats and may lose precision, exactly as the host runtime would.
 */
use serde_json::{Number, Value};

use pacflow_devices::kinds::DataKind;

use crate::error::{Error, Result};

/// Largest integer a 64-bit float holds exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Convert a message value into the body of a write request
pub fn write_value(kind: DataKind, value: &Value) -> Result<Value> {
    let mapped = match value {
        Value::String(s) => string_value(kind, s)?,
        Value::Number(n) => number_value(kind, n),
        Value::Bool(b) => bool_value(kind, *b),
        Value::Array(items) => array_value(kind, items)?,
        Value::Object(_) => return Err(Error::mapping("Invalid Input")),
        Value::Null => return Err(Error::mapping("\"null\" is not a valid value.")),
    };

    // Anything without a specific rule goes to the controller as is.
    Ok(mapped.unwrap_or_else(|| {
        if kind.is_table() {
            value.clone()
        } else {
            wrap(normalize(value.clone()))
        }
    }))
}

/// Convert configuration text into the body of a write request.
///
/// Returns `None` for kinds that have no string rule.
pub fn string_value(kind: DataKind, value: &str) -> Result<Option<Value>> {
    let mapped = match kind {
        DataKind::DigOutput => {
            let state = match value.trim().to_lowercase().as_str() {
                "off" | "false" | "0" => false,
                "on" | "true" | "-1" | "1" => true,
                _ => {
                    return Err(Error::mapping(format!(
                        "\"{}\" is not a valid value for a digital output.",
                        value
                    )))
                }
            };
            wrap(Value::Bool(state))
        }
        DataKind::AnaOutput | DataKind::Int32Variable | DataKind::Int64Variable | DataKind::FloatVariable => {
            let trimmed = value.trim();
            let number = if trimmed.is_empty() { None } else { parse_js_number(trimmed) };
            let number = match number {
                Some(n) => n,
                None => return Err(Error::mapping(format!("\"{}\" is not a valid number.", value))),
            };
            if kind == DataKind::Int64Variable {
                // 64-bit values travel as text so no digits are lost.
                wrap(Value::String(trimmed.to_string()))
            } else {
                wrap(float_to_value(number)?)
            }
        }
        DataKind::StringVariable => wrap(Value::String(value.to_string())),
        DataKind::Int32Table | DataKind::Int64Table | DataKind::FloatTable | DataKind::StringTable => {
            parse_table_text(value)?
        }
        _ => return Ok(None),
    };
    Ok(Some(mapped))
}

fn number_value(kind: DataKind, value: &Number) -> Option<Value> {
    let n = value.as_f64()?;
    let text = || Value::String(js_number_to_string(n));
    match kind {
        DataKind::DigOutput => Some(wrap(Value::Bool(n != 0.0))),
        DataKind::Int64Variable | DataKind::StringVariable => Some(wrap(text())),
        DataKind::Int32Table | DataKind::FloatTable => Some(Value::Array(vec![Value::Number(value.clone())])),
        DataKind::Int64Table | DataKind::StringTable => Some(Value::Array(vec![text()])),
        _ => None,
    }
}

fn bool_value(kind: DataKind, value: bool) -> Option<Value> {
    let numeric = Value::from(u8::from(value));
    let numeric_text = Value::String(u8::from(value).to_string());
    match kind {
        DataKind::DigOutput => Some(wrap(Value::Bool(value))),
        DataKind::AnaOutput | DataKind::Int32Variable | DataKind::FloatVariable => Some(wrap(numeric)),
        DataKind::Int64Variable => Some(wrap(numeric_text)),
        DataKind::Int32Table | DataKind::FloatTable => Some(Value::Array(vec![numeric])),
        DataKind::Int64Table => Some(Value::Array(vec![numeric_text])),
        DataKind::StringVariable => Some(wrap(Value::String(value.to_string()))),
        DataKind::StringTable => Some(Value::Array(vec![Value::String(value.to_string())])),
        _ => None,
    }
}

fn array_value(kind: DataKind, items: &[Value]) -> Result<Option<Value>> {
    match kind {
        DataKind::AnaOutput => Err(Error::mapping("An array is not a valid value for an analog output.")),
        DataKind::DigOutput => Err(Error::mapping("An array is not a valid value for a digital output.")),
        DataKind::Int32Variable | DataKind::Int64Variable | DataKind::FloatVariable | DataKind::StringVariable => {
            Err(Error::mapping("An array is not a valid value for a variable."))
        }
        DataKind::Int32Table | DataKind::Int64Table | DataKind::FloatTable | DataKind::StringTable => {
            Ok(Some(Value::Array(items.to_vec())))
        }
        _ => Ok(None),
    }
}

// Table text is a JSON array whose brackets may be left out.
fn parse_table_text(value: &str) -> Result<Value> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }

    let mut text = String::with_capacity(trimmed.len() + 2);
    if !trimmed.starts_with('[') {
        text.push('[');
    }
    text.push_str(trimmed);
    if !trimmed.ends_with(']') {
        text.push(']');
    }

    serde_json::from_str::<Value>(&text)
        .map(normalize)
        .map_err(|e| Error::mapping(format!("\"{}\" is not a valid table value: {}", value, e)))
}

fn wrap(value: Value) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("value".to_string(), value);
    Value::Object(body)
}

/// Turn a float into a JSON number, using an integer when it is one exactly
pub fn float_to_value(n: f64) -> Result<Value> {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| Error::mapping(format!("\"{}\" is not a valid number.", js_number_to_string(n))))
}

// Integral floats become integers so that `1.0` and `1` compare equal.
fn normalize(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Value::from(f as i64),
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

/// Convert a controller response body into the value placed in a message.
///
/// Arrays pass through, objects carrying `value` are unwrapped, anything
/// else is returned as is.
pub fn unwrap_read_value(body: &Value) -> Value {
    match body {
        Value::Object(map) => match map.get("value") {
            Some(value) => value.clone(),
            None => body.clone(),
        },
        other => other.clone(),
    }
}

/// Format a number the way JavaScript's `String(n)` does
pub fn js_number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "1.2345e3".
    let formatted = format!("{:e}", n.abs());
    let (mantissa, exponent) = match formatted.split_once('e') {
        Some(parts) => parts,
        None => return formatted,
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{}.{}", int, frac)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, sign, exponent.abs())
        } else {
            format!("{}.{}e{}{}", first, rest, sign, exponent.abs())
        }
    };

    if n < 0.0 {
        format!("-{}", body)
    } else {
        body
    }
}

/// Parse text the way JavaScript's `Number(s)` does, rejecting values that
/// are not finite numbers.
///
/// Whitespace must already be trimmed. Returns `None` for text JavaScript
/// would turn into `NaN` or an infinity.
pub fn parse_js_number(s: &str) -> Option<f64> {
    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return None;
        }
        let value = digits
            .chars()
            .filter_map(|c| c.to_digit(radix))
            .fold(0.0_f64, |acc, d| acc * f64::from(radix) + f64::from(d));
        return value.is_finite().then_some(value);
    }

    if !is_decimal_literal(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_decimal_literal(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;

    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        digits += i - frac_start;
    }
    if digits == 0 {
        return false;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }

    i == bytes.len()
}

/// Parse the leading decimal number of a string, like JavaScript's
/// `parseFloat`. Trailing text is ignored.
pub fn parse_leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    if s[i..].starts_with("Infinity") {
        return Some(if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY });
    }

    let mut digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        let mut j = i + 1;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
            digits += 1;
        }
        i = j;
    }
    if digits == 0 {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    s[..i].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(kind: DataKind, value: Value) -> Value {
        write_value(kind, &value).unwrap()
    }

    fn rejects(kind: DataKind, value: Value) -> bool {
        write_value(kind, &value).is_err()
    }

    #[test]
    fn test_dig_output() {
        let kind = DataKind::DigOutput;
        for text in ["off", " OFF ", "false", "  FALSE  ", "0", " 0 "] {
            assert_eq!(ok(kind, json!(text)), json!({"value": false}), "{:?}", text);
        }
        for text in ["true", " TrUE ", "1", "    1", "-1 ", "on"] {
            assert_eq!(ok(kind, json!(text)), json!({"value": true}), "{:?}", text);
        }
        assert_eq!(ok(kind, json!(true)), json!({"value": true}));
        assert_eq!(ok(kind, json!(false)), json!({"value": false}));
        assert_eq!(ok(kind, json!(0)), json!({"value": false}));
        assert_eq!(ok(kind, json!(2)), json!({"value": true}));
        assert_eq!(ok(kind, json!(-22)), json!({"value": true}));

        for text in ["", " ", " anything ", "1.0", "2"] {
            assert!(rejects(kind, json!(text)), "{:?}", text);
        }
        assert!(rejects(kind, json!(null)));
        assert!(rejects(kind, json!(["abc"])));
        assert!(rejects(kind, json!({"value": "abc"})));
    }

    #[test]
    fn test_error_texts() {
        let err = write_value(DataKind::DigOutput, &json!("maybe")).unwrap_err();
        assert_eq!(err.to_string(), "\"maybe\" is not a valid value for a digital output.");

        let err = write_value(DataKind::FloatVariable, &json!(" x ")).unwrap_err();
        assert_eq!(err.to_string(), "\" x \" is not a valid number.");

        let err = write_value(DataKind::Int32Table, &json!(null)).unwrap_err();
        assert_eq!(err.to_string(), "\"null\" is not a valid value.");

        let err = write_value(DataKind::AnaOutput, &json!([1])).unwrap_err();
        assert_eq!(err.to_string(), "An array is not a valid value for an analog output.");

        let err = write_value(DataKind::StringVariable, &json!(["a"])).unwrap_err();
        assert_eq!(err.to_string(), "An array is not a valid value for a variable.");

        let err = write_value(DataKind::Int32Variable, &json!({"value": 1})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Input");
    }

    #[test]
    fn test_int32_variable() {
        let kind = DataKind::Int32Variable;
        assert_eq!(ok(kind, json!(true)), json!({"value": 1}));
        assert_eq!(ok(kind, json!(false)), json!({"value": 0}));
        assert_eq!(ok(kind, json!(-2147483648i64)), json!({"value": -2147483648i64}));
        assert_eq!(ok(kind, json!("-1")), json!({"value": -1}));
        assert_eq!(ok(kind, json!("2147483647")), json!({"value": 2147483647}));
        assert_eq!(ok(kind, json!("12.34")), json!({"value": 12.34}));
        assert_eq!(ok(kind, json!("  123  ")), json!({"value": 123}));
        // No range checking.
        assert_eq!(ok(kind, json!(2147483648i64)), json!({"value": 2147483648i64}));
        assert_eq!(ok(kind, json!("2147483648")), json!({"value": 2147483648i64}));

        for text in ["", "   ", "abc", "seven"] {
            assert!(rejects(kind, json!(text)), "{:?}", text);
        }
    }

    #[test]
    fn test_int64_variable_precision() {
        let kind = DataKind::Int64Variable;
        assert_eq!(ok(kind, json!(true)), json!({"value": "1"}));
        assert_eq!(ok(kind, json!(-1)), json!({"value": "-1"}));
        assert_eq!(
            ok(kind, json!(9223372036854775807i64)),
            json!({"value": "9223372036854776000"})
        );
        assert_eq!(
            ok(kind, json!(9223372036854775808u64)),
            json!({"value": "9223372036854776000"})
        );
        assert_eq!(
            ok(kind, json!("9223372036854775807")),
            json!({"value": "9223372036854775807"})
        );
        assert_eq!(
            ok(kind, json!("-9223372036854775808")),
            json!({"value": "-9223372036854775808"})
        );
        assert_eq!(ok(kind, json!("12.34")), json!({"value": "12.34"}));
        assert_eq!(ok(kind, json!("  123  ")), json!({"value": "123"}));
        assert!(rejects(kind, json!("abc")));
        assert!(rejects(kind, json!("   ")));
    }

    #[test]
    fn test_float_variable() {
        let kind = DataKind::FloatVariable;
        assert_eq!(ok(kind, json!(3.14159)), json!({"value": 3.14159}));
        assert_eq!(ok(kind, json!(12.3e45)), json!({"value": 1.23e46}));
        assert_eq!(ok(kind, json!(1.0)), json!({"value": 1}));
        assert_eq!(ok(kind, json!("-1234.5678")), json!({"value": -1234.5678}));
        assert_eq!(ok(kind, json!("12.3e45")), json!({"value": 1.23e46}));
        assert_eq!(ok(kind, json!("12.3e-45")), json!({"value": 1.23e-44}));
        assert_eq!(ok(kind, json!("  12.3  ")), json!({"value": 12.3}));
        assert!(rejects(kind, json!("Infinity")));
    }

    #[test]
    fn test_string_variable() {
        let kind = DataKind::StringVariable;
        assert_eq!(ok(kind, json!("")), json!({"value": ""}));
        assert_eq!(ok(kind, json!("A B C")), json!({"value": "A B C"}));
        assert_eq!(ok(kind, json!(true)), json!({"value": "true"}));
        assert_eq!(ok(kind, json!(0)), json!({"value": "0"}));
        assert_eq!(ok(kind, json!(1.23)), json!({"value": "1.23"}));
    }

    #[test]
    fn test_tables() {
        assert_eq!(ok(DataKind::Int32Table, json!("")), json!([]));
        assert_eq!(ok(DataKind::Int32Table, json!(" ")), json!([]));
        assert_eq!(ok(DataKind::Int32Table, json!("1, 2")), json!([1, 2]));
        assert_eq!(ok(DataKind::Int32Table, json!(true)), json!([1]));
        assert_eq!(ok(DataKind::Int32Table, json!(1)), json!([1]));
        assert_eq!(ok(DataKind::Int32Table, json!([1, 2.2, -3.3])), json!([1, 2.2, -3.3]));
        assert_eq!(ok(DataKind::Int32Table, json!(["1"])), json!(["1"]));
        assert!(rejects(DataKind::Int32Table, json!("  [ 1, 2 ] 3 ")));
        assert!(rejects(DataKind::Int32Table, json!({"value": "abc"})));

        assert_eq!(ok(DataKind::Int64Table, json!("\"1\", \"a\"")), json!(["1", "a"]));
        assert_eq!(ok(DataKind::Int64Table, json!(false)), json!(["0"]));
        assert_eq!(ok(DataKind::Int64Table, json!(1)), json!(["1"]));
        assert!(rejects(DataKind::Int64Table, json!("'1', '2'")));

        assert_eq!(ok(DataKind::FloatTable, json!("  [ 1, 2.2 ]  ")), json!([1, 2.2]));
        assert_eq!(ok(DataKind::FloatTable, json!(-12345.6789)), json!([-12345.6789]));
        assert!(rejects(DataKind::FloatTable, json!("  [ 1, 2.2 ] 3.3 ")));

        assert_eq!(
            ok(DataKind::StringTable, json!("\"a\", \"bc\", \" D \"")),
            json!(["a", "bc", " D "])
        );
        assert_eq!(ok(DataKind::StringTable, json!(true)), json!(["true"]));
        assert_eq!(ok(DataKind::StringTable, json!(-12345.6789)), json!(["-12345.6789"]));
        assert_eq!(ok(DataKind::StringTable, json!(["a", "bc", ""])), json!(["a", "bc", ""]));
    }

    #[test]
    fn test_js_number_to_string() {
        assert_eq!(js_number_to_string(0.0), "0");
        assert_eq!(js_number_to_string(-0.0), "0");
        assert_eq!(js_number_to_string(1.23), "1.23");
        assert_eq!(js_number_to_string(-12345.6789), "-12345.6789");
        assert_eq!(js_number_to_string(9223372036854775807.0), "9223372036854776000");
        assert_eq!(js_number_to_string(1e21), "1e+21");
        assert_eq!(js_number_to_string(1.23e46), "1.23e+46");
        assert_eq!(js_number_to_string(0.000001), "0.000001");
        assert_eq!(js_number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(js_number_to_string(f64::NAN), "NaN");
    }

    #[test]
    fn test_parse_js_number() {
        assert_eq!(parse_js_number("12"), Some(12.0));
        assert_eq!(parse_js_number("-.5"), Some(-0.5));
        assert_eq!(parse_js_number("5."), Some(5.0));
        assert_eq!(parse_js_number("1e3"), Some(1000.0));
        assert_eq!(parse_js_number("0x1F"), Some(31.0));
        assert_eq!(parse_js_number("0b101"), Some(5.0));
        for text in ["abc", "1.0.0", "inf", "NaN", "Infinity", "1e", "-0x1", "."] {
            assert_eq!(parse_js_number(text), None, "{:?}", text);
        }
    }

    #[test]
    fn test_parse_leading_float() {
        assert_eq!(parse_leading_float("2.5"), Some(2.5));
        assert_eq!(parse_leading_float("  0.25s"), Some(0.25));
        assert_eq!(parse_leading_float("3e2x"), Some(300.0));
        assert_eq!(parse_leading_float("3e"), Some(3.0));
        assert_eq!(parse_leading_float("-1"), Some(-1.0));
        assert_eq!(parse_leading_float(""), None);
        assert_eq!(parse_leading_float("abc"), None);
    }

    #[test]
    fn test_unwrap_read_value() {
        assert_eq!(unwrap_read_value(&json!({"value": 12})), json!(12));
        assert_eq!(unwrap_read_value(&json!({"value": null})), json!(null));
        assert_eq!(unwrap_read_value(&json!([1, 2])), json!([1, 2]));
        assert_eq!(
            unwrap_read_value(&json!({"controllerType": "SNAP-PAC-R1"})),
            json!({"controllerType": "SNAP-PAC-R1"})
        );
    }
}
