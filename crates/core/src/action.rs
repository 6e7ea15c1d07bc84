use std::collections::BTreeMap;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::node::Target;

/// An ordered behavior program. Order is significant.
pub type ActionList = Vec<Action>;

/// Duration used by a `wait` action that does not specify one.
pub const DEFAULT_WAIT_MS: u64 = 1000;

/// Message used by a `log` action that does not specify one.
pub const DEFAULT_LOG_MESSAGE: &str = "No message provided";

/// HTTP method used by an `http` action that does not specify one.
pub const DEFAULT_METHOD: &str = "GET";

/// One step of a behavior program.
///
/// On the wire an action is a JSON object discriminated by its `type` field,
/// with the kind-specific fields next to the common `repeat`, `wait` and
/// `verbose` options:
///
/// ```json
/// {"type": "log", "message": "hello", "repeat": 2, "wait": false}
/// ```
///
/// Objects whose `type` is not a known kind still decode, into
/// [`ActionKind::Unknown`], so that the interpreter can report them softly.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// What the action does.
    pub kind: ActionKind,
    /// How many times the body runs. Zero is treated as one.
    pub repeat: u32,
    /// When `false` the action runs detached from the enclosing sequence.
    pub wait: bool,
    /// Log every time the action is processed.
    pub verbose: bool,
}

/// The kind-specific part of an [`Action`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Log(LogAction),
    Wait(WaitAction),
    Set(SetAction),
    Code(CodeAction),
    Http(HttpAction),
    Return(ReturnAction),
    Multi(MultiAction),
    /// A `type` this runtime does not know. Carries the raw type name.
    Unknown(String),
}

impl ActionKind {
    /// The wire name of this kind.
    pub fn name(&self) -> &str {
        match self {
            Self::Log(_) => "log",
            Self::Wait(_) => "wait",
            Self::Set(_) => "set",
            Self::Code(_) => "code",
            Self::Http(_) => "http",
            Self::Return(_) => "return",
            Self::Multi(_) => "multi",
            Self::Unknown(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogAction {
    /// The message to emit, or the default placeholder.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(DEFAULT_LOG_MESSAGE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitAction {
    /// Milliseconds to sleep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAction {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAction {
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnAction {
    /// Value tree to resolve against the context store. Strings may hold
    /// `${key}` placeholders.
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiAction {
    #[serde(default)]
    pub actions: ActionList,
}

/// A simulated remote call. `actions` is the behavior the callee runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpAction {
    /// Human-readable name, used only in diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Scheme, host and port of the callee, e.g. `http://localhost:3001`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// Logical node reference, resolved through a
    /// [`NodeDirectory`](crate::node::NodeDirectory). Ignored when `origin`
    /// is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    #[serde(default)]
    pub path: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Ordinary application payload, sent as the JSON request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Behavior program shipped to the callee.
    #[serde(default)]
    pub actions: ActionList,

    /// Store the callee's response in the caller's context under this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_to_context: Option<String>,

    /// Delay before a root request is sent by the bootstrapper.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub start_delay_seconds: f64,
}

fn default_method() -> String {
    DEFAULT_METHOD.to_owned()
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &f64) -> bool {
    value.abs() < f64::EPSILON
}

impl HttpAction {
    fn empty() -> Self {
        Self {
            name: None,
            description: None,
            origin: None,
            node: None,
            path: String::new(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            actions: Vec::new(),
            save_to_context: None,
            start_delay_seconds: 0.0,
        }
    }

    /// A call addressed by origin, e.g. `http://localhost:3001`.
    #[must_use]
    pub fn to_url(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            path: path.into(),
            ..Self::empty()
        }
    }

    /// A call addressed by logical node name.
    #[must_use]
    pub fn to_node(node: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            node: Some(node.into()),
            path: path.into(),
            ..Self::empty()
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_actions(mut self, actions: ActionList) -> Self {
        self.actions = actions;
        self
    }

    /// Save the response under `key` in the caller's context.
    #[must_use]
    pub fn save_to(mut self, key: impl Into<String>) -> Self {
        self.save_to_context = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_start_delay(mut self, seconds: f64) -> Self {
        self.start_delay_seconds = seconds;
        self
    }

    /// Where the call goes. `origin` takes precedence over `node`; `None`
    /// when neither is set.
    pub fn target(&self) -> Option<Target> {
        if let Some(origin) = &self.origin {
            return Some(Target::Url(format!("{origin}{}", self.path)));
        }
        self.node.as_ref().map(|name| Target::Node {
            name: name.clone(),
            path: self.path.clone(),
        })
    }

    /// Label for diagnostics: the name if present, else the target.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.target() {
            Some(target) => target.to_string(),
            None => "<no target>".to_owned(),
        }
    }
}

impl Action {
    /// Wrap a kind with default options (`repeat: 1`, `wait: true`).
    #[must_use]
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            repeat: 1,
            wait: true,
            verbose: false,
        }
    }

    #[must_use]
    pub fn log(message: impl Into<String>) -> Self {
        Self::new(ActionKind::Log(LogAction {
            message: Some(message.into()),
        }))
    }

    #[must_use]
    pub fn wait(duration_ms: u64) -> Self {
        Self::new(ActionKind::Wait(WaitAction {
            duration: Some(duration_ms),
        }))
    }

    #[must_use]
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(ActionKind::Set(SetAction {
            key: key.into(),
            value: value.into(),
        }))
    }

    #[must_use]
    pub fn code(source: impl Into<String>) -> Self {
        Self::new(ActionKind::Code(CodeAction {
            source: source.into(),
        }))
    }

    #[must_use]
    pub fn http(call: HttpAction) -> Self {
        Self::new(ActionKind::Http(call))
    }

    /// A `return` action. Named `ret` because `return` is a keyword.
    #[must_use]
    pub fn ret(data: impl Into<Value>) -> Self {
        Self::new(ActionKind::Return(ReturnAction { data: data.into() }))
    }

    #[must_use]
    pub fn multi(actions: ActionList) -> Self {
        Self::new(ActionKind::Multi(MultiAction { actions }))
    }

    #[must_use]
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Run without blocking the enclosing sequence.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.wait = false;
        self
    }

    #[must_use]
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Effective repetition count.
    pub fn repetitions(&self) -> u32 {
        self.repeat.max(1)
    }

    /// Nested action list, for `multi` and `http`.
    pub fn children(&self) -> &[Action] {
        match &self.kind {
            ActionKind::Multi(multi) => &multi.actions,
            ActionKind::Http(call) => &call.actions,
            _ => &[],
        }
    }

    /// Nesting depth of this action: 1 for a leaf.
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(Action::depth).max().unwrap_or(0)
    }

    fn body(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match &self.kind {
            ActionKind::Log(a) => serde_json::to_value(a)?,
            ActionKind::Wait(a) => serde_json::to_value(a)?,
            ActionKind::Set(a) => serde_json::to_value(a)?,
            ActionKind::Code(a) => serde_json::to_value(a)?,
            ActionKind::Http(a) => serde_json::to_value(a)?,
            ActionKind::Return(a) => serde_json::to_value(a)?,
            ActionKind::Multi(a) => serde_json::to_value(a)?,
            ActionKind::Unknown(_) => Value::Object(Map::new()),
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut fields = self.body().map_err(ser::Error::custom)?;
        fields.insert("type".to_owned(), Value::from(self.kind.name()));
        if self.repeat != 1 {
            fields.insert("repeat".to_owned(), Value::from(self.repeat));
        }
        if !self.wait {
            fields.insert("wait".to_owned(), Value::Bool(false));
        }
        if self.verbose {
            fields.insert("verbose".to_owned(), Value::Bool(true));
        }
        fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "action type must be a string, got {other}"
                )));
            }
            None => return Err(de::Error::missing_field("type")),
        };
        let repeat = option_field::<u32, D::Error>(&mut fields, "repeat")?.unwrap_or(1);
        let wait = option_field::<bool, D::Error>(&mut fields, "wait")?.unwrap_or(true);
        let verbose = option_field::<bool, D::Error>(&mut fields, "verbose")?.unwrap_or(false);

        let body = Value::Object(fields);
        let kind = match kind.as_str() {
            "log" => ActionKind::Log(kind_body(&kind, body)?),
            "wait" => ActionKind::Wait(kind_body(&kind, body)?),
            "set" => ActionKind::Set(kind_body(&kind, body)?),
            "code" => ActionKind::Code(kind_body(&kind, body)?),
            "http" => ActionKind::Http(kind_body(&kind, body)?),
            "return" => ActionKind::Return(kind_body(&kind, body)?),
            "multi" => ActionKind::Multi(kind_body(&kind, body)?),
            _ => ActionKind::Unknown(kind),
        };

        Ok(Self {
            kind,
            repeat,
            wait,
            verbose,
        })
    }
}

fn option_field<T: DeserializeOwned, E: de::Error>(
    fields: &mut Map<String, Value>,
    name: &str,
) -> Result<Option<T>, E> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| E::custom(format!("invalid `{name}`: {e}"))),
    }
}

fn kind_body<T: DeserializeOwned, E: de::Error>(kind: &str, body: Value) -> Result<T, E> {
    serde_json::from_value(body).map_err(|e| E::custom(format!("invalid {kind} action: {e}")))
}
