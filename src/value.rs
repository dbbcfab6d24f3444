//! Typed value trees exchanged with the remote script engine.
//!
//! A [`Value`] is what test code builds and sends as an argument (a "LocalValue")
//! and what comes back decoded from a response. A [`RemoteValue`] is a decoded
//! value together with the handle the engine minted for it, if any.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ScriptError, ScriptResult};

/// Identifier of a realm (an execution context boundary) on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealmId(pub String);

impl RealmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle id issued by a realm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub String);

impl HandleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-owning reference to a live object in a remote realm.
///
/// Holding a `Handle` keeps nothing alive; it is only a key into the
/// [`HandleRegistry`](crate::HandleRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub realm: RealmId,
    pub id: HandleId,
}

impl Handle {
    pub fn new(realm: RealmId, id: HandleId) -> Self {
        Self { realm, id }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.realm)
    }
}

/// A number as its lexical token.
///
/// The special tokens are kept apart from finite literals so that `-0` never
/// collapses into `0` and `NaN` is never compared numerically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberValue {
    /// A finite decimal or integer literal, kept verbatim.
    Finite(String),
    NaN,
    Infinity,
    NegativeInfinity,
    NegativeZero,
}

impl NumberValue {
    pub const NAN_TOKEN: &'static str = "NaN";
    pub const INFINITY_TOKEN: &'static str = "Infinity";
    pub const NEGATIVE_INFINITY_TOKEN: &'static str = "-Infinity";
    pub const NEGATIVE_ZERO_TOKEN: &'static str = "-0";

    /// Returns the special value named by `token`, if it is one of the four
    /// special tokens.
    pub fn special(token: &str) -> Option<Self> {
        match token {
            Self::NAN_TOKEN => Some(Self::NaN),
            Self::INFINITY_TOKEN => Some(Self::Infinity),
            Self::NEGATIVE_INFINITY_TOKEN => Some(Self::NegativeInfinity),
            Self::NEGATIVE_ZERO_TOKEN => Some(Self::NegativeZero),
            _ => None,
        }
    }

    /// Parses a lexical token. Anything that is neither a special token nor a
    /// finite JSON number literal is rejected.
    pub fn parse(token: &str) -> ScriptResult<Self> {
        if let Some(special) = Self::special(token) {
            return Ok(special);
        }
        let magnitude = finite_magnitude(token).ok_or_else(|| {
            ScriptError::encoding("number", format!("'{}' is not a valid number token", token))
        })?;
        if magnitude == 0.0 && magnitude.is_sign_negative() {
            return Ok(Self::NegativeZero);
        }
        Ok(Self::Finite(token.to_string()))
    }

    /// The token as it appears on the wire and in comparisons.
    pub fn token(&self) -> &str {
        match self {
            Self::Finite(literal) => literal,
            Self::NaN => Self::NAN_TOKEN,
            Self::Infinity => Self::INFINITY_TOKEN,
            Self::NegativeInfinity => Self::NEGATIVE_INFINITY_TOKEN,
            Self::NegativeZero => Self::NEGATIVE_ZERO_TOKEN,
        }
    }

    pub fn is_special(&self) -> bool {
        !matches!(self, Self::Finite(_))
    }

    /// Numeric magnitude of a finite literal; `None` for the special tokens and
    /// for literals that do not parse.
    pub fn finite_value(&self) -> Option<f64> {
        match self {
            Self::Finite(literal) => finite_magnitude(literal),
            _ => None,
        }
    }
}

/// Parses `literal` with JSON number grammar and returns it when finite.
pub(crate) fn finite_magnitude(literal: &str) -> Option<f64> {
    let number: serde_json::Number = literal.parse().ok()?;
    number.as_f64().filter(|n| n.is_finite())
}

impl From<i64> for NumberValue {
    fn from(n: i64) -> Self {
        Self::Finite(n.to_string())
    }
}

impl From<i32> for NumberValue {
    fn from(n: i32) -> Self {
        Self::Finite(n.to_string())
    }
}

impl From<f64> for NumberValue {
    fn from(n: f64) -> Self {
        if n.is_nan() {
            Self::NaN
        } else if n == f64::INFINITY {
            Self::Infinity
        } else if n == f64::NEG_INFINITY {
            Self::NegativeInfinity
        } else if n == 0.0 && n.is_sign_negative() {
            Self::NegativeZero
        } else {
            match serde_json::Number::from_f64(n) {
                Some(number) => Self::Finite(number.to_string()),
                None => Self::NaN,
            }
        }
    }
}

impl fmt::Display for NumberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExpValue {
    pub pattern: String,
    pub flags: String,
}

impl RegExpValue {
    pub fn new(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }
}

/// A value tree, one case per wire tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    String(String),
    Number(NumberValue),
    Boolean(bool),
    /// Decimal digits, optionally signed, without the `n` suffix.
    BigInt(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    /// ISO-8601 timestamp.
    Date(String),
    RegExp(RegExpValue),
    Handle(Handle),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn number(n: impl Into<NumberValue>) -> Self {
        Self::Number(n.into())
    }

    pub fn bigint(digits: impl Into<String>) -> Self {
        Self::BigInt(digits.into())
    }

    pub fn date(iso: impl Into<String>) -> Self {
        Self::Date(iso.into())
    }

    pub fn regexp(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self::RegExp(RegExpValue::new(pattern, flags))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self::Map(entries.into_iter().collect())
    }

    /// The wire tag naming this variant.
    pub fn type_name(&self) -> &'static str {
        use crate::codec::tags;
        match self {
            Self::Undefined => tags::UNDEFINED,
            Self::Null => tags::NULL,
            Self::String(_) => tags::STRING,
            Self::Number(_) => tags::NUMBER,
            Self::Boolean(_) => tags::BOOLEAN,
            Self::BigInt(_) => tags::BIGINT,
            Self::Array(_) => tags::ARRAY,
            Self::Object(_) => tags::OBJECT,
            Self::Map(_) => tags::MAP,
            Self::Set(_) => tags::SET,
            Self::Date(_) => tags::DATE,
            Self::RegExp(_) => tags::REGEXP,
            Self::Handle(_) => tags::HANDLE,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Self::Handle(handle) => Some(handle),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n.into())
    }
}

impl From<Handle> for Value {
    fn from(handle: Handle) -> Self {
        Self::Handle(handle)
    }
}

/// A value decoded from a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteValue {
    pub value: Value,
    /// Present when the result was requested with root ownership.
    pub handle: Option<Handle>,
    /// Realm the result was produced in.
    pub realm: RealmId,
}

impl RemoteValue {
    /// The value to pass back to the engine: a bare handle when one was
    /// minted, otherwise the decoded value itself.
    pub fn to_argument(&self) -> Value {
        match &self.handle {
            Some(handle) => Value::Handle(handle.clone()),
            None => self.value.clone(),
        }
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_tokens_round_trip() {
        for token in ["NaN", "Infinity", "-Infinity", "-0"] {
            let number = NumberValue::parse(token).unwrap();
            assert!(number.is_special());
            assert_eq!(number.token(), token);
        }
    }

    #[test]
    fn test_finite_literal_kept_verbatim() {
        let number = NumberValue::parse("3.0").unwrap();
        assert_eq!(number, NumberValue::Finite("3.0".to_string()));
        assert_eq!(number.finite_value(), Some(3.0));
    }

    #[test]
    fn test_negative_zero_literal_spellings() {
        assert_eq!(NumberValue::parse("-0.0").unwrap(), NumberValue::NegativeZero);
        assert_eq!(NumberValue::from(-0.0_f64), NumberValue::NegativeZero);
        assert_eq!(NumberValue::from(0.0_f64).token(), "0.0");
    }

    #[test]
    fn test_rejects_non_json_literals() {
        for token in ["nan", "inf", "+1", ".5", "1.", "0x10", "", "1e400"] {
            assert!(NumberValue::parse(token).is_err(), "accepted {token:?}");
        }
    }

    #[test]
    fn test_float_conversion() {
        assert_eq!(NumberValue::from(f64::NAN), NumberValue::NaN);
        assert_eq!(NumberValue::from(f64::NEG_INFINITY), NumberValue::NegativeInfinity);
        assert_eq!(NumberValue::from(1.4).token(), "1.4");
    }

    #[test]
    fn test_remote_value_argument_prefers_handle() {
        let handle = Handle::new(RealmId::new("realm-1"), HandleId::new("h-1"));
        let remote = RemoteValue {
            value: Value::object([("a", Value::from(1))]),
            handle: Some(handle.clone()),
            realm: RealmId::new("realm-1"),
        };
        assert_eq!(remote.to_argument(), Value::Handle(handle));

        let plain = RemoteValue {
            handle: None,
            ..remote
        };
        assert_eq!(plain.to_argument(), Value::object([("a", Value::from(1))]));
    }
}
