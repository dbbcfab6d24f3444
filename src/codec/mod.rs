//! Conversion between [`Value`](crate::Value) trees and wire nodes.

pub mod decode;
pub mod encode;

pub use decode::{decode_node, ResultOrigin, ValueDecoder};
pub use encode::ValueEncoder;

/// Type tags as they appear in the `type` field of a wire node.
pub mod tags {
    pub const UNDEFINED: &str = "undefined";
    pub const NULL: &str = "null";
    pub const STRING: &str = "string";
    pub const NUMBER: &str = "number";
    pub const BOOLEAN: &str = "boolean";
    pub const BIGINT: &str = "bigint";
    pub const ARRAY: &str = "array";
    pub const DATE: &str = "date";
    pub const MAP: &str = "map";
    pub const OBJECT: &str = "object";
    pub const REGEXP: &str = "regexp";
    pub const SET: &str = "set";
    /// Not a `type` value: the name of the field carrying a handle id.
    pub const HANDLE: &str = "handle";
}

/// Field names shared by encoder and decoder.
pub(crate) mod fields {
    pub const TYPE: &str = "type";
    pub const VALUE: &str = "value";
    pub const PATTERN: &str = "pattern";
    pub const FLAGS: &str = "flags";
}

pub(crate) fn index_path(path: &str, index: usize) -> String {
    format!("{}[{}]", path, index)
}

pub(crate) fn key_path(path: &str, key: &str) -> String {
    format!("{}.{}", path, key)
}
