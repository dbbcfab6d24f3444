//! Drives `script.callFunction` and `script.evaluate` through a single
//! invocation.

use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

use crate::codec::{decode_node, ResultOrigin, ValueDecoder, ValueEncoder};
use crate::error::{ScriptError, ScriptResult};
use crate::handles::HandleRegistry;
use crate::transport::Transport;
use crate::types::{
    CallFunctionParams, EvaluateParams, EvaluateResult, ExceptionDetails, InvocationState,
    ResultOwnership, Target,
};
use crate::value::{RemoteValue, Value};

pub const CALL_FUNCTION_METHOD: &str = "script.callFunction";
pub const EVALUATE_METHOD: &str = "script.evaluate";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A function call to run in a remote realm.
#[derive(Debug, Clone)]
pub struct CallFunction {
    pub function_declaration: String,
    /// `None` sends an empty argument list.
    pub arguments: Option<Vec<Value>>,
    pub target: Target,
    pub await_promise: bool,
    pub this: Option<Value>,
    pub result_ownership: Option<ResultOwnership>,
}

impl CallFunction {
    pub fn new(function_declaration: impl Into<String>, target: Target) -> Self {
        Self {
            function_declaration: function_declaration.into(),
            arguments: None,
            target,
            await_promise: false,
            this: None,
            result_ownership: None,
        }
    }

    pub fn arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn await_promise(mut self, await_promise: bool) -> Self {
        self.await_promise = await_promise;
        self
    }

    pub fn this(mut self, this: Value) -> Self {
        self.this = Some(this);
        self
    }

    pub fn result_ownership(mut self, ownership: ResultOwnership) -> Self {
        self.result_ownership = Some(ownership);
        self
    }
}

/// An expression to evaluate in a remote realm.
#[derive(Debug, Clone)]
pub struct Evaluate {
    pub expression: String,
    pub target: Target,
    pub await_promise: bool,
    pub result_ownership: Option<ResultOwnership>,
}

impl Evaluate {
    pub fn new(expression: impl Into<String>, target: Target) -> Self {
        Self {
            expression: expression.into(),
            target,
            await_promise: false,
            result_ownership: None,
        }
    }

    pub fn await_promise(mut self, await_promise: bool) -> Self {
        self.await_promise = await_promise;
        self
    }

    pub fn result_ownership(mut self, ownership: ResultOwnership) -> Self {
        self.result_ownership = Some(ownership);
        self
    }
}

/// Runs exactly one remote invocation and records its state transitions.
///
/// `Idle → Sent → AwaitingResult → (AwaitingPromise) → Completed | Failed`.
/// Failures are reported as they happen; nothing is retried.
pub struct CallFunctionInvoker<'a> {
    transport: &'a dyn Transport,
    registry: &'a mut HandleRegistry,
    timeout: Duration,
    transitions: Vec<InvocationState>,
}

impl<'a> CallFunctionInvoker<'a> {
    pub fn new(transport: &'a dyn Transport, registry: &'a mut HandleRegistry) -> Self {
        Self {
            transport,
            registry,
            timeout: DEFAULT_TIMEOUT,
            transitions: vec![InvocationState::Idle],
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> InvocationState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(InvocationState::Idle)
    }

    pub fn transitions(&self) -> &[InvocationState] {
        &self.transitions
    }

    pub async fn invoke(&mut self, call: CallFunction) -> ScriptResult<RemoteValue> {
        self.begin()?;

        let params = match self.call_params(&call) {
            Ok(params) => params,
            Err(err) => return Err(self.fail(err)),
        };

        let ownership = call.result_ownership.unwrap_or_default();
        self.dispatch(
            CALL_FUNCTION_METHOD,
            params,
            &call.target,
            call.await_promise,
            ownership,
        )
        .await
    }

    pub async fn evaluate(&mut self, evaluate: Evaluate) -> ScriptResult<RemoteValue> {
        self.begin()?;

        let params = EvaluateParams {
            expression: evaluate.expression.clone(),
            target: evaluate.target.clone(),
            await_promise: evaluate.await_promise,
            result_ownership: evaluate.result_ownership,
        };
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(err) => return Err(self.fail(err.into())),
        };

        let ownership = evaluate.result_ownership.unwrap_or_default();
        self.dispatch(
            EVALUATE_METHOD,
            params,
            &evaluate.target,
            evaluate.await_promise,
            ownership,
        )
        .await
    }

    fn begin(&self) -> ScriptResult<()> {
        if self.state() != InvocationState::Idle {
            return Err(ScriptError::invalid_state(format!(
                "invoker already used (state {:?})",
                self.state()
            )));
        }
        Ok(())
    }

    fn call_params(&self, call: &CallFunction) -> ScriptResult<JsonValue> {
        let encoder = ValueEncoder::new(&*self.registry);
        let arguments = match &call.arguments {
            Some(arguments) => encoder.encode_all(arguments)?,
            None => Vec::new(),
        };
        let this = match &call.this {
            Some(this) => Some(encoder.encode_at(this, "this")?),
            None => None,
        };

        let params = CallFunctionParams {
            function_declaration: call.function_declaration.clone(),
            arguments,
            target: call.target.clone(),
            await_promise: call.await_promise,
            this,
            result_ownership: call.result_ownership,
        };
        Ok(serde_json::to_value(params)?)
    }

    async fn dispatch(
        &mut self,
        method: &str,
        params: JsonValue,
        target: &Target,
        await_promise: bool,
        ownership: ResultOwnership,
    ) -> ScriptResult<RemoteValue> {
        self.transition(InvocationState::Sent);
        self.transition(InvocationState::AwaitingResult);
        if await_promise {
            self.transition(InvocationState::AwaitingPromise);
        }

        let outcome =
            tokio::time::timeout(self.timeout, self.transport.send_command(method, params)).await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(self.fail(err)),
            Err(_) => return Err(self.fail(ScriptError::timeout(method))),
        };

        let result: EvaluateResult = match serde_json::from_value(response) {
            Ok(result) => result,
            Err(err) => {
                return Err(self.fail(ScriptError::decoding(
                    "result",
                    format!("malformed {} response: {}", method, err),
                )))
            }
        };

        if let Some(context) = target.context_id() {
            self.registry.bind_realm(result.realm().clone(), context);
        }

        match result {
            EvaluateResult::Success { result, realm } => {
                let origin = ResultOrigin {
                    context: self.registry.context_of(&realm).map(str::to_string),
                    realm,
                    ownership,
                };
                let decoded = ValueDecoder::new(&mut *self.registry).decode(&result, &origin);
                match decoded {
                    Ok(value) => {
                        self.transition(InvocationState::Completed);
                        Ok(value)
                    }
                    Err(err) => Err(self.fail(err)),
                }
            }
            EvaluateResult::Exception {
                exception_details,
                realm,
            } => {
                debug!("[Script] {} threw in realm {}", method, realm);
                let err = remote_script_error(exception_details);
                Err(self.fail(err))
            }
        }
    }

    fn transition(&mut self, next: InvocationState) {
        debug!("[Script] Invocation {:?} -> {:?}", self.state(), next);
        self.transitions.push(next);
    }

    fn fail(&mut self, err: ScriptError) -> ScriptError {
        warn!("[Script] Invocation failed: {}", err);
        self.transition(InvocationState::Failed);
        err
    }
}

fn remote_script_error(details: ExceptionDetails) -> ScriptError {
    match decode_node(&details.exception) {
        Ok(exception) => ScriptError::RemoteScript {
            exception,
            text: details.text,
            line_number: details.line_number,
            column_number: details.column_number,
        },
        Err(err) => err,
    }
}
