use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::env;

use crate::value::RealmId;

/// Whether the remote end keeps the result alive and issues a handle for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultOwnership {
    Root,
    #[default]
    None,
}

impl ResultOwnership {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "root" => Some(Self::Root),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// Where a script runs: a browsing context (optionally inside a named
/// sandbox) or a specific realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Context {
        context: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sandbox: Option<String>,
    },
    Realm {
        realm: RealmId,
    },
}

impl Target {
    pub fn context(context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            sandbox: None,
        }
    }

    pub fn sandbox(context: impl Into<String>, sandbox: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            sandbox: Some(sandbox.into()),
        }
    }

    pub fn realm(realm: RealmId) -> Self {
        Self::Realm { realm }
    }

    /// The browsing context this target names, if any.
    pub fn context_id(&self) -> Option<&str> {
        match self {
            Self::Context { context, .. } => Some(context),
            Self::Realm { .. } => None,
        }
    }
}

/// How long `browsingContext.navigate` waits before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    None,
    Interactive,
    #[default]
    Complete,
}

/// Lifecycle of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvocationState {
    Idle,
    Sent,
    AwaitingResult,
    AwaitingPromise,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
    pub target: Target,
    pub await_promise: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ownership: Option<ResultOwnership>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFunctionParams {
    pub function_declaration: String,
    pub arguments: Vec<JsonValue>,
    pub target: Target,
    pub await_promise: bool,
    #[serde(rename = "this", skip_serializing_if = "Option::is_none")]
    pub this: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ownership: Option<ResultOwnership>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateParams {
    pub context: String,
    pub url: String,
    pub wait: WaitCondition,
}

/// Details of an exception thrown by a script or of a promise rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub column_number: u64,
    #[serde(default)]
    pub line_number: u64,
    #[serde(default)]
    pub text: String,
    pub exception: JsonValue,
    #[serde(default)]
    pub stack_trace: JsonValue,
}

/// Result of `script.evaluate` and `script.callFunction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EvaluateResult {
    Success {
        result: JsonValue,
        realm: RealmId,
    },
    Exception {
        #[serde(rename = "exceptionDetails")]
        exception_details: ExceptionDetails,
        realm: RealmId,
    },
}

impl EvaluateResult {
    pub fn realm(&self) -> &RealmId {
        match self {
            Self::Success { realm, .. } | Self::Exception { realm, .. } => realm,
        }
    }
}

/// Parameters of `script.getRealms`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetRealmsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// One entry of a `script.getRealms` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmInfo {
    pub realm: RealmId,
    #[serde(default)]
    pub origin: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRealmsResult {
    pub realms: Vec<RealmInfo>,
}

/// Session-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
    #[serde(default)]
    pub default_result_ownership: ResultOwnership,
    #[serde(default = "default_comparison_root")]
    pub comparison_root: String,
}

fn default_command_timeout() -> u64 {
    30000
}

fn default_comparison_root() -> String {
    "value".to_string()
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30000,
            default_result_ownership: ResultOwnership::None,
            comparison_root: default_comparison_root(),
        }
    }
}

impl ScriptConfig {
    /// Reads `BIDI_COMMAND_TIMEOUT_MS` and `BIDI_RESULT_OWNERSHIP`, falling back
    /// to the defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            command_timeout_ms: env::var("BIDI_COMMAND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.command_timeout_ms),
            default_result_ownership: env::var("BIDI_RESULT_OWNERSHIP")
                .ok()
                .and_then(|v| ResultOwnership::parse(&v))
                .unwrap_or(defaults.default_result_ownership),
            comparison_root: defaults.comparison_root,
        }
    }
}
