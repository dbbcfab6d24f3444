//! Deep, type-aware comparison of value trees.
//!
//! The comparator walks both trees in lockstep and stops at the first
//! difference, reporting it with the path from the root.

use crate::codec::{index_path, key_path};
use crate::error::{MismatchError, MismatchKind};
use crate::value::{NumberValue, Value};

pub struct RecursiveComparator {
    root: String,
}

impl Default for RecursiveComparator {
    fn default() -> Self {
        Self::new("value")
    }
}

impl RecursiveComparator {
    /// `root` names the top of the tree in mismatch paths.
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn compare(&self, expected: &Value, actual: &Value) -> Result<(), MismatchError> {
        compare_at(expected, actual, &self.root)
    }
}

/// Compares with the default `value` root label.
pub fn recursive_compare(expected: &Value, actual: &Value) -> Result<(), MismatchError> {
    RecursiveComparator::default().compare(expected, actual)
}

fn mismatch(path: &str, kind: MismatchKind, expected: &Value, actual: &Value) -> MismatchError {
    MismatchError {
        path: path.to_string(),
        kind,
        expected: expected.clone(),
        actual: actual.clone(),
    }
}

fn compare_at(expected: &Value, actual: &Value, path: &str) -> Result<(), MismatchError> {
    let differs = || mismatch(path, MismatchKind::Value, expected, actual);

    match (expected, actual) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => Ok(()),
        (Value::Number(e), Value::Number(a)) => {
            if numbers_equal(e, a) {
                Ok(())
            } else {
                Err(differs())
            }
        }
        (Value::String(e), Value::String(a))
        | (Value::BigInt(e), Value::BigInt(a))
        | (Value::Date(e), Value::Date(a)) => {
            if e == a {
                Ok(())
            } else {
                Err(differs())
            }
        }
        (Value::Boolean(e), Value::Boolean(a)) => {
            if e == a {
                Ok(())
            } else {
                Err(differs())
            }
        }
        (Value::RegExp(e), Value::RegExp(a)) => {
            if e.pattern != a.pattern {
                return Err(mismatch(&key_path(path, "pattern"), MismatchKind::Value, expected, actual));
            }
            if e.flags != a.flags {
                return Err(mismatch(&key_path(path, "flags"), MismatchKind::Value, expected, actual));
            }
            Ok(())
        }
        (Value::Array(e), Value::Array(a)) | (Value::Set(e), Value::Set(a)) => {
            if e.len() != a.len() {
                return Err(mismatch(path, MismatchKind::Length, expected, actual));
            }
            e.iter()
                .zip(a)
                .enumerate()
                .try_for_each(|(i, (e, a))| compare_at(e, a, &index_path(path, i)))
        }
        (Value::Object(e), Value::Object(a)) => {
            if e.len() != a.len() {
                return Err(mismatch(path, MismatchKind::Length, expected, actual));
            }
            for (i, ((e_key, e_value), (a_key, a_value))) in e.iter().zip(a).enumerate() {
                if e_key != a_key {
                    return Err(mismatch(
                        &index_path(path, i),
                        MismatchKind::Key,
                        &Value::string(e_key.as_str()),
                        &Value::string(a_key.as_str()),
                    ));
                }
                compare_at(e_value, a_value, &key_path(path, e_key))?;
            }
            Ok(())
        }
        (Value::Map(e), Value::Map(a)) => {
            if e.len() != a.len() {
                return Err(mismatch(path, MismatchKind::Length, expected, actual));
            }
            for (i, ((e_key, e_value), (a_key, a_value))) in e.iter().zip(a).enumerate() {
                let entry_path = index_path(path, i);
                compare_at(e_key, a_key, &key_path(&entry_path, "key")).map_err(|mut err| {
                    if err.kind == MismatchKind::Value {
                        err.kind = MismatchKind::Key;
                    }
                    err
                })?;
                compare_at(e_value, a_value, &key_path(&entry_path, "value"))?;
            }
            Ok(())
        }
        (Value::Handle(e), Value::Handle(a)) => {
            if e == a {
                Ok(())
            } else {
                Err(differs())
            }
        }
        _ => Err(mismatch(path, MismatchKind::Type, expected, actual)),
    }
}

/// Special tokens only match the identical token; finite literals match when
/// spelled the same or when they denote the same magnitude.
fn numbers_equal(expected: &NumberValue, actual: &NumberValue) -> bool {
    if expected.is_special() || actual.is_special() {
        return expected.token() == actual.token();
    }
    if expected.token() == actual.token() {
        return true;
    }
    match (expected.finite_value(), actual.finite_value()) {
        (Some(e), Some(a)) => e == a,
        _ => false,
    }
}
