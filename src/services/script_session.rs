use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::codec::ValueEncoder;
use crate::compare::RecursiveComparator;
use crate::error::{ScriptError, ScriptResult};
use crate::handles::HandleRegistry;
use crate::invoker::{CallFunction, CallFunctionInvoker, Evaluate};
use crate::transport::Transport;
use crate::types::{
    GetRealmsParams, GetRealmsResult, InvocationState, NavigateParams, ResultOwnership,
    ScriptConfig, WaitCondition,
};
use crate::value::{RemoteValue, Value};

pub const NAVIGATE_METHOD: &str = "browsingContext.navigate";
pub const GET_REALMS_METHOD: &str = "script.getRealms";

/// One BiDi session: the command channel, the handles it has been issued and
/// its settings. Invocations run one at a time.
pub struct ScriptSession {
    transport: Arc<dyn Transport>,
    registry: HandleRegistry,
    config: ScriptConfig,
    last_transitions: Vec<InvocationState>,
}

impl ScriptSession {
    pub fn new(transport: Arc<dyn Transport>, config: ScriptConfig) -> Self {
        Self {
            transport,
            registry: HandleRegistry::new(),
            config,
            last_transitions: Vec::new(),
        }
    }

    pub fn from_env(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, ScriptConfig::from_env())
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Encoder bound to this session's handles.
    pub fn encoder(&self) -> ValueEncoder<'_> {
        ValueEncoder::new(&self.registry)
    }

    pub fn comparator(&self) -> RecursiveComparator {
        RecursiveComparator::new(self.config.comparison_root.clone())
    }

    pub fn assert_matches(&self, expected: &Value, actual: &Value) -> ScriptResult<()> {
        self.comparator().compare(expected, actual)?;
        Ok(())
    }

    /// State transitions of the most recent invocation.
    pub fn last_transitions(&self) -> &[InvocationState] {
        &self.last_transitions
    }

    pub async fn call_function(&mut self, mut call: CallFunction) -> ScriptResult<RemoteValue> {
        if call.result_ownership.is_none() {
            call.result_ownership = self.default_ownership();
        }

        let timeout = self.command_timeout();
        let mut invoker = CallFunctionInvoker::new(self.transport.as_ref(), &mut self.registry)
            .with_timeout(timeout);
        let result = invoker.invoke(call).await;
        self.last_transitions = invoker.transitions().to_vec();
        result
    }

    pub async fn evaluate(&mut self, mut evaluate: Evaluate) -> ScriptResult<RemoteValue> {
        if evaluate.result_ownership.is_none() {
            evaluate.result_ownership = self.default_ownership();
        }

        let timeout = self.command_timeout();
        let mut invoker = CallFunctionInvoker::new(self.transport.as_ref(), &mut self.registry)
            .with_timeout(timeout);
        let result = invoker.evaluate(evaluate).await;
        self.last_transitions = invoker.transitions().to_vec();
        result
    }

    /// Navigates `context` and drops every handle issued by its realms.
    ///
    /// The realms of `context` are fetched first so that handles minted by
    /// realm-targeted calls are invalidated too.
    pub async fn navigate(
        &mut self,
        context: &str,
        url: &str,
        wait: WaitCondition,
    ) -> ScriptResult<JsonValue> {
        self.refresh_realms(context).await?;

        let params = serde_json::to_value(NavigateParams {
            context: context.to_string(),
            url: url.to_string(),
            wait,
        })?;

        debug!("[Script] Navigating {} to {}", context, url);
        let response = self.send(NAVIGATE_METHOD, params).await?;

        let dropped = self.registry.invalidate_context(context);
        info!(
            "[Script] Navigated {} to {}, {} handle(s) invalidated",
            context, url, dropped
        );
        Ok(response)
    }

    /// Binds every realm the remote end reports for `context`.
    async fn refresh_realms(&mut self, context: &str) -> ScriptResult<()> {
        let params = serde_json::to_value(GetRealmsParams {
            context: Some(context.to_string()),
        })?;
        let response = self.send(GET_REALMS_METHOD, params).await?;
        let result: GetRealmsResult = serde_json::from_value(response).map_err(|e| {
            ScriptError::decoding("realms", format!("malformed {} response: {}", GET_REALMS_METHOD, e))
        })?;

        for info in result.realms {
            let owner = info.context.unwrap_or_else(|| context.to_string());
            self.registry.bind_realm(info.realm, &owner);
        }
        Ok(())
    }

    async fn send(&self, method: &str, params: JsonValue) -> ScriptResult<JsonValue> {
        tokio::time::timeout(self.command_timeout(), self.transport.send_command(method, params))
            .await
            .map_err(|_| ScriptError::timeout(method))?
    }

    fn default_ownership(&self) -> Option<ResultOwnership> {
        match self.config.default_result_ownership {
            ResultOwnership::Root => Some(ResultOwnership::Root),
            ResultOwnership::None => None,
        }
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.config.command_timeout_ms)
    }
}
