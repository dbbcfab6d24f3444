//! Error types for the BiDi script plugin.

use std::fmt;
use thiserror::Error;

use crate::value::Value;

/// Result type for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors that can occur while exchanging values with a remote realm.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// A local value was malformed before it was sent.
    #[error("Encoding error at {path}: {message}")]
    Encoding { path: String, message: String },

    /// A response node could not be decoded.
    #[error("Decoding error at {path}: {message}")]
    Decoding { path: String, message: String },

    /// The remote function body threw, or the awaited promise rejected.
    #[error("Remote script error: {text} (line {line_number}, column {column_number})")]
    RemoteScript {
        exception: Value,
        text: String,
        line_number: u64,
        column_number: u64,
    },

    /// The handle's realm has been torn down.
    #[error("Stale handle '{handle}': realm '{realm}' was invalidated")]
    StaleHandle { handle: String, realm: String },

    /// The handle was never registered in this session.
    #[error("Unknown handle '{handle}'")]
    UnknownHandle { handle: String },

    /// A value tree differed from the expected one.
    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    /// The remote end answered a command with an error response.
    #[error("Command error ({error}): {message}")]
    Command { error: String, message: String },

    /// The remote end did not answer in time.
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// The transport failed to deliver a command.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// An invoker was used outside its lifecycle.
    #[error("Invalid state: {details}")]
    InvalidState { details: String },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScriptError {
    pub fn encoding(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn decoding(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decoding {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn stale_handle(handle: impl Into<String>, realm: impl Into<String>) -> Self {
        Self::StaleHandle {
            handle: handle.into(),
            realm: realm.into(),
        }
    }

    pub fn unknown_handle(handle: impl Into<String>) -> Self {
        Self::UnknownHandle {
            handle: handle.into(),
        }
    }

    pub fn command(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_state(details: impl Into<String>) -> Self {
        Self::InvalidState {
            details: details.into(),
        }
    }

    /// The thrown value carried by a remote script error.
    pub fn exception(&self) -> Option<&Value> {
        match self {
            Self::RemoteScript { exception, .. } => Some(exception),
            _ => None,
        }
    }
}

/// What kind of difference the comparator found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    Type,
    Value,
    Length,
    Key,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Type => "type",
            Self::Value => "value",
            Self::Length => "length",
            Self::Key => "key",
        };
        f.write_str(name)
    }
}

/// First difference between an expected and an actual value tree.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Mismatch at {path}: {kind} differs (expected {expected:?}, actual {actual:?})")]
pub struct MismatchError {
    /// Path from the root, e.g. `value[2].foobar`.
    pub path: String,
    pub kind: MismatchKind,
    pub expected: Value,
    pub actual: Value,
}
