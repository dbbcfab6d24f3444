//! A scripted stand-in for a BiDi remote end.
//!
//! Functions and expressions are registered by their source text and answer
//! with an [`Outcome`]. Objects live on a small heap so handles can be
//! resolved back to object identity, and navigation replaces the realm.

#![allow(dead_code)]

use async_trait::async_trait;
use elizaos_bidi::{ScriptError, ScriptResult, Transport};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const CONTEXT: &str = "ctx-1";

const OBJECT_TAGS: &[&str] = &["array", "object", "map", "set", "date", "regexp"];

/// What a registered script does when run.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Returns a freshly created value.
    Return(JsonValue),
    /// Returns the object stored in a global.
    ReturnGlobal(&'static str),
    Throw { text: String, exception: JsonValue },
    /// A promise that fulfills with the value.
    Resolve(JsonValue),
    /// A promise that rejects with the value.
    Reject(JsonValue),
    /// Never answers.
    Hang,
}

/// Arguments as the remote script sees them. Handle references are replaced
/// by `{"$ref": object_id}`.
pub struct Call {
    pub args: Vec<JsonValue>,
    pub this: Option<JsonValue>,
    globals: HashMap<String, u64>,
    objects: HashMap<u64, JsonValue>,
}

impl Call {
    pub fn arg(&self, index: usize) -> JsonValue {
        self.args
            .get(index)
            .cloned()
            .unwrap_or_else(|| json!({"type": "undefined"}))
    }

    /// `node === window[name]`
    pub fn is_global(&self, node: &JsonValue, name: &str) -> bool {
        match (node.get("$ref").and_then(JsonValue::as_u64), self.globals.get(name)) {
            (Some(id), Some(global)) => id == *global,
            _ => false,
        }
    }

    /// Reads `key` from an inline object/map node or a referenced object.
    pub fn property(&self, node: &JsonValue, key: &str) -> Option<JsonValue> {
        let node = match node.get("$ref").and_then(JsonValue::as_u64) {
            Some(id) => self.objects.get(&id)?,
            None => node,
        };
        entry(node, key)
    }

    pub fn element(&self, node: &JsonValue, index: usize) -> Option<JsonValue> {
        node.get("value")?.as_array()?.get(index).cloned()
    }

    /// Whether a set/array node contains `window[name]`.
    pub fn contains_global(&self, node: &JsonValue, name: &str) -> bool {
        node.get("value")
            .and_then(JsonValue::as_array)
            .map(|items| items.iter().any(|item| self.is_global(item, name)))
            .unwrap_or(false)
    }
}

pub fn entry(node: &JsonValue, key: &str) -> Option<JsonValue> {
    node.get("value")?.as_array()?.iter().find_map(|pair| {
        let pair = pair.as_array()?;
        let matches = match pair.first()? {
            JsonValue::String(k) => k == key,
            k => k.get("value").and_then(JsonValue::as_str) == Some(key),
        };
        if matches {
            pair.get(1).cloned()
        } else {
            None
        }
    })
}

/// Constructor name of a node, as `arg.constructor.name` would report it.
pub fn constructor_name(node: &JsonValue) -> &'static str {
    match node.get("type").and_then(JsonValue::as_str) {
        Some("array") => "Array",
        Some("date") => "Date",
        Some("map") => "Map",
        Some("object") => "Object",
        Some("regexp") => "RegExp",
        Some("set") => "Set",
        Some("string") => "String",
        Some("number") => "Number",
        Some("boolean") => "Boolean",
        Some("bigint") => "BigInt",
        _ => "undefined",
    }
}

enum Produced<'a> {
    Fresh(JsonValue),
    Global(&'a str),
}

type Script = Arc<dyn Fn(&Call) -> Outcome + Send + Sync>;

#[derive(Default)]
struct EngineState {
    generation: u64,
    next_object: u64,
    next_handle: u64,
    objects: HashMap<u64, JsonValue>,
    handles: HashMap<String, u64>,
    globals: HashMap<String, u64>,
    functions: HashMap<String, Script>,
    expressions: HashMap<String, Script>,
    sent: Vec<(String, JsonValue)>,
}

impl EngineState {
    fn realm(&self) -> String {
        format!("realm-{}", self.generation)
    }

    fn allocate(&mut self, node: JsonValue) -> u64 {
        self.next_object += 1;
        self.objects.insert(self.next_object, node);
        self.next_object
    }

    fn mint_handle(&mut self, object: u64) -> String {
        self.next_handle += 1;
        let handle = format!("handle-{}", self.next_handle);
        self.handles.insert(handle.clone(), object);
        handle
    }

    fn load_page(&mut self) {
        self.generation += 1;
        self.objects.clear();
        self.handles.clear();
        self.globals.clear();
        let object = self.allocate(json!({
            "type": "object",
            "value": [["SOME_PROPERTY", {"type": "string", "value": "SOME_VALUE"}]],
        }));
        self.globals.insert("SOME_OBJECT".to_string(), object);
    }

    /// Replaces `{"handle": id}` references with `{"$ref": object}`.
    fn resolve_refs(&self, node: &JsonValue) -> ScriptResult<JsonValue> {
        match node {
            JsonValue::Object(fields)
                if fields.contains_key("handle") && !fields.contains_key("type") =>
            {
                let id = fields["handle"].as_str().unwrap_or_default();
                let object = self.handles.get(id).ok_or_else(|| {
                    ScriptError::command("no such handle", format!("unknown handle {id}"))
                })?;
                Ok(json!({"$ref": object}))
            }
            JsonValue::Object(fields) => {
                let mut resolved = fields.clone();
                if let Some(value) = fields.get("value") {
                    resolved.insert("value".to_string(), self.resolve_refs(value)?);
                }
                Ok(JsonValue::Object(resolved))
            }
            JsonValue::Array(items) => items
                .iter()
                .map(|item| self.resolve_refs(item))
                .collect::<ScriptResult<Vec<_>>>()
                .map(JsonValue::Array),
            other => Ok(other.clone()),
        }
    }

    fn serialize(&mut self, produced: Produced<'_>, root: bool) -> JsonValue {
        let (mut node, object) = match produced {
            Produced::Fresh(node) => {
                let is_object = node
                    .get("type")
                    .and_then(JsonValue::as_str)
                    .map(|tag| OBJECT_TAGS.contains(&tag))
                    .unwrap_or(false);
                let object = if is_object && root {
                    Some(self.allocate(node.clone()))
                } else {
                    None
                };
                (node, object)
            }
            Produced::Global(global) => {
                let object = self.globals[global];
                (self.objects[&object].clone(), Some(object))
            }
        };
        if root {
            if let Some(object) = object {
                let handle = self.mint_handle(object);
                node["handle"] = json!(handle);
            }
        }
        node
    }
}

/// Fake remote end. Clone the `Arc` to keep inspecting it after handing it to
/// a session.
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        let mut state = EngineState::default();
        state.load_page();
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn on_call<F>(&self, declaration: &str, script: F)
    where
        F: Fn(&Call) -> Outcome + Send + Sync + 'static,
    {
        let mut state = self.state.lock().unwrap();
        state
            .functions
            .insert(declaration.to_string(), Arc::new(script));
    }

    pub fn on_evaluate<F>(&self, expression: &str, script: F)
    where
        F: Fn(&Call) -> Outcome + Send + Sync + 'static,
    {
        let mut state = self.state.lock().unwrap();
        state
            .expressions
            .insert(expression.to_string(), Arc::new(script));
    }

    pub fn realm(&self) -> String {
        self.state.lock().unwrap().realm()
    }

    pub fn sent(&self) -> Vec<(String, JsonValue)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn last_params(&self) -> JsonValue {
        self.sent().last().map(|(_, p)| p.clone()).unwrap_or_default()
    }

    fn run(&self, method: &str, params: &JsonValue) -> ScriptResult<Option<JsonValue>> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((method.to_string(), params.clone()));

        if method == "script.getRealms" {
            return Ok(Some(json!({
                "realms": [
                    {"realm": state.realm(), "origin": "null", "type": "window", "context": CONTEXT},
                ],
            })));
        }

        if method == "browsingContext.navigate" {
            state.load_page();
            return Ok(Some(json!({"navigation": null, "url": params["url"]})));
        }

        let (source, script) = match method {
            "script.callFunction" => {
                let source = params["functionDeclaration"].as_str().unwrap_or_default();
                (source.to_string(), state.functions.get(source).cloned())
            }
            "script.evaluate" => {
                let source = params["expression"].as_str().unwrap_or_default();
                (source.to_string(), state.expressions.get(source).cloned())
            }
            other => {
                return Err(ScriptError::command(
                    "unknown command",
                    format!("{other} is not supported"),
                ))
            }
        };
        let script = script.ok_or_else(|| {
            ScriptError::command("unknown error", format!("no script registered for {source}"))
        })?;

        let args = match params.get("arguments").and_then(JsonValue::as_array) {
            Some(args) => args
                .iter()
                .map(|arg| state.resolve_refs(arg))
                .collect::<ScriptResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        let this = match params.get("this") {
            Some(this) => Some(state.resolve_refs(this)?),
            None => None,
        };
        let call = Call {
            args,
            this,
            globals: state.globals.clone(),
            objects: state.objects.clone(),
        };

        let root = params["resultOwnership"] == "root";
        let await_promise = params["awaitPromise"] == true;
        let realm = state.realm();

        let outcome = (*script)(&call);
        let response = match outcome {
            Outcome::Hang => return Ok(None),
            Outcome::Return(node) => success(state.serialize(Produced::Fresh(node), root), &realm),
            Outcome::ReturnGlobal(name) => success(state.serialize(Produced::Global(name), root), &realm),
            Outcome::Throw { text, exception } => failure(&text, exception, &realm),
            Outcome::Resolve(node) if await_promise => {
                success(state.serialize(Produced::Fresh(node), root), &realm)
            }
            Outcome::Reject(exception) if await_promise => {
                failure("Uncaught (in promise)", exception, &realm)
            }
            Outcome::Resolve(_) | Outcome::Reject(_) => success(json!({"type": "promise"}), &realm),
        };
        Ok(Some(response))
    }
}

fn success(result: JsonValue, realm: &str) -> JsonValue {
    json!({"type": "success", "result": result, "realm": realm})
}

fn failure(text: &str, exception: JsonValue, realm: &str) -> JsonValue {
    json!({
        "type": "exception",
        "exceptionDetails": {
            "columnNumber": 0,
            "lineNumber": 0,
            "text": text,
            "exception": exception,
            "stackTrace": {"callFrames": []},
        },
        "realm": realm,
    })
}

#[async_trait]
impl Transport for FakeEngine {
    async fn send_command(&self, method: &str, params: JsonValue) -> ScriptResult<JsonValue> {
        match self.run(method, &params)? {
            Some(response) => Ok(response),
            None => std::future::pending().await,
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
