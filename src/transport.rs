//! Command channel to the remote end.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ScriptResult;

/// A request/response channel carrying BiDi commands.
///
/// Implementations send `method` with `params` and resolve with the `result`
/// member of the matching response. Error responses surface as
/// [`ScriptError::Command`](crate::ScriptError::Command).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_command(&self, method: &str, params: Value) -> ScriptResult<Value>;
}
