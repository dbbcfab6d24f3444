//! Wire node to [`Value`] decoding.

use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::warn;

use super::{fields, index_path, key_path, tags};
use crate::error::{ScriptError, ScriptResult};
use crate::handles::{HandleDescriptor, HandleRegistry};
use crate::types::ResultOwnership;
use crate::value::{HandleId, NumberValue, RealmId, RegExpValue, RemoteValue, Value};

/// Where a node is being read from. Local nodes are written by test code and
/// fail with encoding errors; remote nodes come from a response and fail with
/// decoding errors. Bare references resolve only when a registry is at hand.
#[derive(Clone, Copy)]
enum Origin<'a> {
    Local(&'a HandleRegistry),
    Remote(Option<&'a HandleRegistry>),
}

/// Reads a JSON node into a [`Value`].
pub(crate) struct NodeReader<'a> {
    origin: Origin<'a>,
}

impl<'a> NodeReader<'a> {
    pub(crate) fn local(registry: &'a HandleRegistry) -> Self {
        Self {
            origin: Origin::Local(registry),
        }
    }

    pub(crate) fn remote() -> NodeReader<'static> {
        NodeReader {
            origin: Origin::Remote(None),
        }
    }

    pub(crate) fn response(registry: &'a HandleRegistry) -> Self {
        Self {
            origin: Origin::Remote(Some(registry)),
        }
    }

    fn error(&self, path: &str, message: impl Into<String>) -> ScriptError {
        match self.origin {
            Origin::Local(_) => ScriptError::encoding(path, message),
            Origin::Remote(_) => ScriptError::decoding(path, message),
        }
    }

    pub(crate) fn read(&self, node: &JsonValue, path: &str) -> ScriptResult<Value> {
        let node_fields = node
            .as_object()
            .ok_or_else(|| self.error(path, "expected a JSON object node"))?;

        // A local node carrying a handle stands for the remote object itself,
        // whatever else it serializes.
        if matches!(self.origin, Origin::Local(_)) && node_fields.contains_key(tags::HANDLE) {
            return self.read_reference(node_fields, path);
        }

        let tag = match node_fields.get(fields::TYPE) {
            Some(JsonValue::String(tag)) => tag.as_str(),
            Some(_) => return Err(self.error(path, "'type' must be a string")),
            None => return self.read_reference(node_fields, path),
        };

        match tag {
            tags::UNDEFINED => Ok(Value::Undefined),
            tags::NULL => Ok(Value::Null),
            tags::STRING => self.read_string(node_fields, path).map(Value::String),
            tags::NUMBER => self.read_number(node_fields, path).map(Value::Number),
            tags::BOOLEAN => match self.payload(node_fields, path)? {
                JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
                _ => Err(self.error(path, "boolean payload must be true or false")),
            },
            tags::BIGINT => self.read_string(node_fields, path).map(Value::BigInt),
            tags::ARRAY => self.read_list(node_fields, path).map(Value::Array),
            tags::SET => self.read_list(node_fields, path).map(Value::Set),
            tags::OBJECT => self.read_object(node_fields, path).map(Value::Object),
            tags::MAP => self.read_map(node_fields, path).map(Value::Map),
            tags::DATE => self.read_string(node_fields, path).map(Value::Date),
            tags::REGEXP => self.read_regexp(node_fields, path).map(Value::RegExp),
            other => Err(self.error(path, format!("unknown type tag '{}'", other))),
        }
    }

    /// Resolves a `{"handle": id}` reference against the registry.
    fn read_reference(&self, node: &JsonMap<String, JsonValue>, path: &str) -> ScriptResult<Value> {
        let registry = match self.origin {
            Origin::Local(registry) | Origin::Remote(Some(registry)) => registry,
            Origin::Remote(None) => return Err(self.error(path, "node is missing 'type'")),
        };

        let id = match node.get(tags::HANDLE) {
            Some(JsonValue::String(id)) => HandleId::new(id.as_str()),
            Some(_) => return Err(self.error(path, "'handle' must be a string")),
            None => return Err(self.error(path, "node has neither 'type' nor 'handle'")),
        };

        match registry.lookup(&id) {
            Ok(handle) => Ok(Value::Handle(handle)),
            Err(ScriptError::UnknownHandle { handle }) => {
                Err(self.error(path, format!("handle '{}' is not known to this session", handle)))
            }
            Err(err) => Err(err),
        }
    }

    fn payload<'n>(
        &self,
        node: &'n JsonMap<String, JsonValue>,
        path: &str,
    ) -> ScriptResult<&'n JsonValue> {
        node.get(fields::VALUE)
            .ok_or_else(|| self.error(path, "node is missing 'value'"))
    }

    fn read_string(&self, node: &JsonMap<String, JsonValue>, path: &str) -> ScriptResult<String> {
        match self.payload(node, path)? {
            JsonValue::String(s) => Ok(s.clone()),
            _ => Err(self.error(path, "payload must be a string")),
        }
    }

    fn read_number(
        &self,
        node: &JsonMap<String, JsonValue>,
        path: &str,
    ) -> ScriptResult<NumberValue> {
        match self.payload(node, path)? {
            JsonValue::Number(n) => {
                let negative_zero = n
                    .as_f64()
                    .map(|f| f == 0.0 && f.is_sign_negative())
                    .unwrap_or(false);
                if negative_zero {
                    Ok(NumberValue::NegativeZero)
                } else {
                    Ok(NumberValue::Finite(n.to_string()))
                }
            }
            JsonValue::String(token) => NumberValue::special(token).ok_or_else(|| {
                self.error(
                    path,
                    format!("'{}' is not one of NaN, Infinity, -Infinity, -0", token),
                )
            }),
            _ => Err(self.error(path, "number payload must be a number or a special token")),
        }
    }

    fn read_list(&self, node: &JsonMap<String, JsonValue>, path: &str) -> ScriptResult<Vec<Value>> {
        let items = self
            .payload(node, path)?
            .as_array()
            .ok_or_else(|| self.error(path, "payload must be an array"))?;

        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.read(item, &index_path(path, i)))
            .collect()
    }

    fn entries<'n>(
        &self,
        node: &'n JsonMap<String, JsonValue>,
        path: &str,
    ) -> ScriptResult<Vec<(&'n JsonValue, &'n JsonValue)>> {
        let entries = self
            .payload(node, path)?
            .as_array()
            .ok_or_else(|| self.error(path, "payload must be an array of entries"))?;

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry.as_array().map(Vec::as_slice) {
                Some([key, value]) => Ok((key, value)),
                _ => Err(self.error(&index_path(path, i), "entry must be a [key, value] pair")),
            })
            .collect()
    }

    fn read_object(
        &self,
        node: &JsonMap<String, JsonValue>,
        path: &str,
    ) -> ScriptResult<Vec<(String, Value)>> {
        self.entries(node, path)?
            .into_iter()
            .enumerate()
            .map(|(i, (key, value))| -> ScriptResult<(String, Value)> {
                let key = match key {
                    JsonValue::String(key) => key.clone(),
                    other => match self.read(other, &index_path(path, i))? {
                        Value::String(key) => key,
                        _ => {
                            return Err(
                                self.error(&index_path(path, i), "object keys must be strings")
                            )
                        }
                    },
                };
                let value = self.read(value, &key_path(path, &key))?;
                Ok((key, value))
            })
            .collect()
    }

    fn read_map(
        &self,
        node: &JsonMap<String, JsonValue>,
        path: &str,
    ) -> ScriptResult<Vec<(Value, Value)>> {
        self.entries(node, path)?
            .into_iter()
            .enumerate()
            .map(|(i, (key, value))| -> ScriptResult<(Value, Value)> {
                let entry_path = index_path(path, i);
                let key = match key {
                    JsonValue::String(key) => Value::String(key.clone()),
                    other => self.read(other, &key_path(&entry_path, "key"))?,
                };
                let value = self.read(value, &key_path(&entry_path, "value"))?;
                Ok((key, value))
            })
            .collect()
    }

    fn read_regexp(
        &self,
        node: &JsonMap<String, JsonValue>,
        path: &str,
    ) -> ScriptResult<RegExpValue> {
        let payload = self
            .payload(node, path)?
            .as_object()
            .ok_or_else(|| self.error(path, "regexp payload must be an object"))?;

        let pattern = match payload.get(fields::PATTERN) {
            Some(JsonValue::String(pattern)) => pattern.clone(),
            _ => return Err(self.error(path, "regexp is missing 'pattern'")),
        };

        let flags = match (payload.get(fields::FLAGS), self.origin) {
            (Some(JsonValue::String(flags)), _) => flags.clone(),
            (Some(_), _) => return Err(self.error(path, "regexp 'flags' must be a string")),
            (None, Origin::Local(_)) => return Err(self.error(path, "regexp is missing 'flags'")),
            (None, Origin::Remote(_)) => String::new(),
        };

        Ok(RegExpValue { pattern, flags })
    }
}

/// Decodes a response node that carries no ownership, such as a thrown value.
pub fn decode_node(node: &JsonValue) -> ScriptResult<Value> {
    NodeReader::remote().read(node, "value")
}

/// Where a result came from and how it was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultOrigin {
    pub realm: RealmId,
    pub context: Option<String>,
    pub ownership: ResultOwnership,
}

/// Decodes results, registering the handle minted for the root node.
pub struct ValueDecoder<'a> {
    registry: &'a mut HandleRegistry,
}

impl<'a> ValueDecoder<'a> {
    pub fn new(registry: &'a mut HandleRegistry) -> Self {
        Self { registry }
    }

    pub fn decode(&mut self, node: &JsonValue, origin: &ResultOrigin) -> ScriptResult<RemoteValue> {
        let value = NodeReader::response(&*self.registry).read(node, "value")?;

        let handle = match node.get(tags::HANDLE) {
            None => None,
            Some(_) if node.get(fields::TYPE).is_none() => value.as_handle().cloned(),
            Some(JsonValue::String(id)) if origin.ownership == ResultOwnership::Root => {
                let descriptor = HandleDescriptor {
                    realm: origin.realm.clone(),
                    context: origin.context.clone(),
                    kind: value.type_name().to_string(),
                };
                Some(self.registry.register(
                    origin.realm.clone(),
                    HandleId::new(id.as_str()),
                    descriptor,
                )?)
            }
            Some(JsonValue::String(id)) => {
                warn!(
                    "[Script] Ignoring handle {} on a result requested without ownership",
                    id
                );
                None
            }
            Some(_) => return Err(ScriptError::decoding("value", "'handle' must be a string")),
        };

        Ok(RemoteValue {
            value,
            handle,
            realm: origin.realm.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin(ownership: ResultOwnership) -> ResultOrigin {
        ResultOrigin {
            realm: RealmId::new("realm-1"),
            context: Some("ctx".to_string()),
            ownership,
        }
    }

    #[test]
    fn test_decode_primitives() {
        assert_eq!(decode_node(&json!({"type": "undefined"})).unwrap(), Value::Undefined);
        assert_eq!(
            decode_node(&json!({"type": "string", "value": "2"})).unwrap(),
            Value::string("2")
        );
        assert_eq!(
            decode_node(&json!({"type": "bigint", "value": "42"})).unwrap(),
            Value::bigint("42")
        );
        assert_eq!(
            decode_node(&json!({"type": "boolean", "value": false})).unwrap(),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_decode_keeps_number_tokens() {
        let decoded = decode_node(&json!({"type": "number", "value": "-0"})).unwrap();
        assert_eq!(decoded, Value::Number(NumberValue::NegativeZero));

        let decoded = decode_node(&json!({"type": "number", "value": -0.0})).unwrap();
        assert_eq!(decoded, Value::Number(NumberValue::NegativeZero));

        let decoded = decode_node(&json!({"type": "number", "value": 1.4})).unwrap();
        assert_eq!(decoded, Value::Number(NumberValue::Finite("1.4".to_string())));

        assert!(decode_node(&json!({"type": "number", "value": "42"})).is_err());
    }

    #[test]
    fn test_unknown_tag_is_decoding_error() {
        let err = decode_node(&json!({"type": "promise"})).unwrap_err();
        match err {
            ScriptError::Decoding { path, message } => {
                assert_eq!(path, "value");
                assert!(message.contains("promise"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_error_path() {
        let node = json!({
            "type": "array",
            "value": [
                {"type": "string", "value": "a"},
                {"type": "object", "value": [["foobar", {"type": "wat"}]]},
            ],
        });
        match decode_node(&node).unwrap_err() {
            ScriptError::Decoding { path, .. } => assert_eq!(path, "value[1].foobar"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_map_keys_bare_or_nodes() {
        let node = json!({
            "type": "map",
            "value": [
                ["foobar", {"type": "string", "value": "x"}],
                [{"type": "number", "value": 1}, {"type": "null"}],
            ],
        });
        assert_eq!(
            decode_node(&node).unwrap(),
            Value::map([
                (Value::string("foobar"), Value::string("x")),
                (Value::from(1), Value::Null),
            ])
        );
    }

    #[test]
    fn test_remote_regexp_without_flags() {
        let node = json!({"type": "regexp", "value": {"pattern": "foo"}});
        assert_eq!(decode_node(&node).unwrap(), Value::regexp("foo", ""));
    }

    #[test]
    fn test_root_handle_registered_with_ownership() {
        let mut registry = HandleRegistry::new();
        let node = json!({"type": "object", "value": [["a", {"type": "number", "value": 1}]], "handle": "h-1"});

        let remote = ValueDecoder::new(&mut registry)
            .decode(&node, &origin(ResultOwnership::Root))
            .unwrap();

        let handle = remote.handle.expect("handle");
        assert_eq!(handle.id.as_str(), "h-1");
        let descriptor = registry.resolve(&handle).unwrap();
        assert_eq!(descriptor.kind, "object");
        assert_eq!(descriptor.context.as_deref(), Some("ctx"));
    }

    #[test]
    fn test_handle_ignored_without_ownership() {
        let mut registry = HandleRegistry::new();
        let node = json!({"type": "object", "value": [], "handle": "h-1"});

        let remote = ValueDecoder::new(&mut registry)
            .decode(&node, &origin(ResultOwnership::None))
            .unwrap();

        assert!(remote.handle.is_none());
        assert!(registry.is_empty());
    }
}
