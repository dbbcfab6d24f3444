//! [`Value`] to wire node encoding.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value as JsonValue};

use super::decode::NodeReader;
use super::{index_path, key_path, tags};
use crate::error::{ScriptError, ScriptResult};
use crate::handles::HandleRegistry;
use crate::value::{NumberValue, RegExpValue, Value};

static BIGINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+$").expect("bigint pattern is valid"));

const REGEXP_FLAGS: &str = "dgimsuvy";

/// Encodes local values into wire nodes.
///
/// Handles are forwarded as bare `{"handle": id}` references after checking
/// that the registry still knows them; the encoder never mints handles.
pub struct ValueEncoder<'a> {
    registry: &'a HandleRegistry,
}

impl<'a> ValueEncoder<'a> {
    pub fn new(registry: &'a HandleRegistry) -> Self {
        Self { registry }
    }

    pub fn encode(&self, value: &Value) -> ScriptResult<JsonValue> {
        self.encode_at(value, "value")
    }

    /// Encodes an argument list; errors name the argument index.
    pub fn encode_all(&self, values: &[Value]) -> ScriptResult<Vec<JsonValue>> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| self.encode_at(value, &index_path("arguments", i)))
            .collect()
    }

    /// Reads a local value written as raw JSON, e.g.
    /// `{"type": "regexp", "value": {"pattern": "foo", "flags": "g"}}` or a
    /// bare `{"handle": id}`.
    pub fn parse_local(&self, node: &JsonValue) -> ScriptResult<Value> {
        NodeReader::local(self.registry).read(node, "value")
    }

    /// Validates and normalizes a local value written as raw JSON.
    pub fn encode_local(&self, node: &JsonValue) -> ScriptResult<JsonValue> {
        self.encode(&self.parse_local(node)?)
    }

    pub(crate) fn encode_at(&self, value: &Value, path: &str) -> ScriptResult<JsonValue> {
        let node = match value {
            Value::Undefined => json!({ "type": tags::UNDEFINED }),
            Value::Null => json!({ "type": tags::NULL }),
            Value::String(s) => json!({ "type": tags::STRING, "value": s }),
            Value::Number(n) => json!({
                "type": tags::NUMBER,
                "value": number_payload(n, path)?,
            }),
            Value::Boolean(b) => json!({ "type": tags::BOOLEAN, "value": b }),
            Value::BigInt(digits) => {
                if !BIGINT_RE.is_match(digits) {
                    return Err(ScriptError::encoding(
                        path,
                        format!("bigint '{}' is not a decimal integer", digits),
                    ));
                }
                json!({ "type": tags::BIGINT, "value": digits })
            }
            Value::Array(items) => json!({
                "type": tags::ARRAY,
                "value": self.encode_list(items, path)?,
            }),
            Value::Set(items) => json!({
                "type": tags::SET,
                "value": self.encode_list(items, path)?,
            }),
            Value::Object(entries) => {
                let encoded = entries
                    .iter()
                    .map(|(key, item)| -> ScriptResult<JsonValue> {
                        Ok(json!([key, self.encode_at(item, &key_path(path, key))?]))
                    })
                    .collect::<ScriptResult<Vec<_>>>()?;
                json!({ "type": tags::OBJECT, "value": encoded })
            }
            Value::Map(entries) => {
                let encoded = entries
                    .iter()
                    .enumerate()
                    .map(|(i, (key, item))| -> ScriptResult<JsonValue> {
                        let entry_path = index_path(path, i);
                        let key = match key {
                            Value::String(s) => JsonValue::String(s.clone()),
                            other => self.encode_at(other, &key_path(&entry_path, "key"))?,
                        };
                        let item = self.encode_at(item, &key_path(&entry_path, "value"))?;
                        Ok(json!([key, item]))
                    })
                    .collect::<ScriptResult<Vec<_>>>()?;
                json!({ "type": tags::MAP, "value": encoded })
            }
            Value::Date(iso) => {
                DateTime::parse_from_rfc3339(iso).map_err(|e| {
                    ScriptError::encoding(path, format!("date '{}' is not ISO-8601: {}", iso, e))
                })?;
                json!({ "type": tags::DATE, "value": iso })
            }
            Value::RegExp(re) => {
                validate_flags(re, path)?;
                json!({
                    "type": tags::REGEXP,
                    "value": { "pattern": re.pattern, "flags": re.flags },
                })
            }
            Value::Handle(handle) => {
                match self.registry.resolve(handle) {
                    Ok(_) => {}
                    Err(ScriptError::UnknownHandle { handle }) => {
                        return Err(ScriptError::encoding(
                            path,
                            format!("handle '{}' is not known to this session", handle),
                        ))
                    }
                    Err(err) => return Err(err),
                }
                json!({ "handle": handle.id.as_str() })
            }
        };

        Ok(node)
    }

    fn encode_list(&self, items: &[Value], path: &str) -> ScriptResult<Vec<JsonValue>> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.encode_at(item, &index_path(path, i)))
            .collect()
    }
}

fn number_payload(number: &NumberValue, path: &str) -> ScriptResult<JsonValue> {
    match number {
        NumberValue::Finite(literal) => {
            let parsed: serde_json::Number = literal.parse().map_err(|_| {
                ScriptError::encoding(path, format!("'{}' is not a valid number literal", literal))
            })?;
            match parsed.as_f64() {
                Some(f) if !f.is_finite() => Err(ScriptError::encoding(
                    path,
                    format!("'{}' is out of range", literal),
                )),
                Some(f) if f == 0.0 && f.is_sign_negative() => Err(ScriptError::encoding(
                    path,
                    "negative zero must use the '-0' token",
                )),
                _ => Ok(JsonValue::Number(parsed)),
            }
        }
        special => Ok(JsonValue::String(special.token().to_string())),
    }
}

fn validate_flags(re: &RegExpValue, path: &str) -> ScriptResult<()> {
    let mut seen = String::new();
    for flag in re.flags.chars() {
        if !REGEXP_FLAGS.contains(flag) {
            return Err(ScriptError::encoding(
                path,
                format!("unknown regexp flag '{}'", flag),
            ));
        }
        if seen.contains(flag) {
            return Err(ScriptError::encoding(
                path,
                format!("duplicate regexp flag '{}'", flag),
            ));
        }
        seen.push(flag);
    }
    Ok(())
}
