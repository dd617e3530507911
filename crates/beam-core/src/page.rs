//! Page wire model.
//!
//! A page is the single JSON object every generator must produce. Variant
//! types are explicit sum types; descriptors that accept several wire shapes
//! (commands, previews, nested page sources, request bodies) decode through
//! one function each that tries the shapes in a fixed order.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Output of a generator for one navigation frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Page {
    List(List),
    Detail(Detail),
}

impl Page {
    /// Decode a page from raw JSON bytes and check its structural invariants.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let page: Self = serde_json::from_slice(bytes)?;
        page.check_structure()?;
        Ok(page)
    }

    /// Encode as compact JSON.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::List(list) => &list.title,
            Self::Detail(detail) => &detail.title,
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        match self {
            Self::List(list) => list.title = title.into(),
            Self::Detail(detail) => detail.title = title.into(),
        }
    }

    /// Frame-level actions.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        match self {
            Self::List(list) => &list.actions,
            Self::Detail(detail) => &detail.actions,
        }
    }

    /// Every action reachable from this page, frame-level and per item.
    pub fn actions_mut(&mut self) -> impl Iterator<Item = &mut Action> {
        let (frame, items): (&mut Vec<Action>, Option<&mut Vec<ListItem>>) = match self {
            Self::List(list) => (&mut list.actions, Some(&mut list.items)),
            Self::Detail(detail) => (&mut detail.actions, None),
        };
        frame.iter_mut().chain(
            items
                .into_iter()
                .flat_map(|items| items.iter_mut().flat_map(|item| item.actions.iter_mut())),
        )
    }

    /// Reject pages that decode but are internally inconsistent.
    pub fn check_structure(&self) -> Result<()> {
        match self {
            Self::Detail(detail) => match (&detail.text, &detail.command) {
                (Some(_), Some(_)) => Err(Error::Structural(
                    "detail page must not have both text and command".to_string(),
                )),
                (None, None) => Err(Error::Structural(
                    "detail page must have either text or command".to_string(),
                )),
                _ => Ok(()),
            },
            Self::List(_) => Ok(()),
        }
    }
}

/// A list page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ListItem>,
    /// Re-invoke the generator on every query change instead of filtering.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dynamic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_text: Option<String>,
}

/// A detail page. Exactly one of `text` and `command` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Highlight>,
    /// Base directory for the detail's own command and actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Markdown,
    Ansi,
}

/// One entry of a list page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accessories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<Preview>,
}

impl ListItem {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Stable identity: the explicit id, or the positional index.
    #[must_use]
    pub fn identity(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| index.to_string())
    }
}

/// Lazily evaluated item preview.
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Text(String),
    Command(Command),
    Request(Request),
}

impl Preview {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Object(map) if map.contains_key("url") => {
                Request::from_value(Value::Object(map)).map(Self::Request)
            }
            other => Command::from_value(other)
                .map(Self::Command)
                .map_err(|err| format!("preview must be a string, a command or a request: {err}")),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Command(command) => command.to_value(false),
            Self::Request(request) => request.to_value(),
        }
    }
}

impl Serialize for Preview {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Preview {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Self::from_value(Value::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// A user-selectable action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Keyboard shortcut, e.g. `ctrl+y`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Inputs that must be collected before the action can run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Input>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    #[must_use]
    pub fn new(kind: ActionKind) -> Self {
        Self {
            title: String::new(),
            key: None,
            inputs: Vec::new(),
            kind,
        }
    }

    #[must_use]
    pub fn copy(text: impl Into<String>) -> Self {
        Self::new(ActionKind::Copy { text: text.into() })
    }

    #[must_use]
    pub fn open(target: impl Into<String>) -> Self {
        Self::new(ActionKind::Open {
            target: target.into(),
        })
    }

    #[must_use]
    pub fn read(path: impl Into<String>) -> Self {
        Self::new(ActionKind::Read { path: path.into() })
    }

    #[must_use]
    pub fn run(command: Command, on_success: Option<OnSuccess>) -> Self {
        Self::new(ActionKind::Run {
            command,
            on_success,
        })
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    /// Title to display, falling back to the type default.
    #[must_use]
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            self.kind.default_title()
        } else {
            &self.title
        }
    }
}

/// Type-specific action payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Copy {
        text: String,
    },
    Open {
        target: String,
    },
    Push {
        page: PageSource,
    },
    Run {
        command: Command,
        #[serde(
            default,
            rename = "onSuccess",
            skip_serializing_if = "Option::is_none"
        )]
        on_success: Option<OnSuccess>,
    },
    Read {
        path: String,
    },
    Fetch {
        request: Request,
    },
    Reload,
    Exit,
}

impl ActionKind {
    /// Wire name of the action type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Open { .. } => "open",
            Self::Push { .. } => "push",
            Self::Run { .. } => "run",
            Self::Read { .. } => "read",
            Self::Fetch { .. } => "fetch",
            Self::Reload => "reload",
            Self::Exit => "exit",
        }
    }

    #[must_use]
    pub const fn default_title(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "Copy",
            Self::Open { .. } => "Open",
            Self::Push { .. } => "Show",
            Self::Run { .. } => "Run",
            Self::Read { .. } => "Read",
            Self::Fetch { .. } => "Fetch",
            Self::Reload => "Reload",
            Self::Exit => "Exit",
        }
    }
}

/// What happens after a `run` action's process exits 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnSuccess {
    Push,
    Reload,
    Replace,
    Exit,
}

/// Nested generator descriptor of a `push` action.
#[derive(Debug, Clone, PartialEq)]
pub enum PageSource {
    /// Page file, relative to the base location.
    Path(String),
    Request(Request),
    Command(Command),
}

impl PageSource {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(path) => Ok(Self::Path(path)),
            Value::Object(map) if map.contains_key("url") => {
                Request::from_value(Value::Object(map)).map(Self::Request)
            }
            other => Command::from_value(other)
                .map(Self::Command)
                .map_err(|err| format!("page must be a path, a command or a request: {err}")),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Path(path) => Value::String(path.clone()),
            Self::Request(request) => request.to_value(),
            Self::Command(command) => command.to_value(false),
        }
    }
}

impl Serialize for PageSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PageSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Self::from_value(Value::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// How a command is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exec {
    /// A shell line, run through the configured shell.
    Shell(String),
    /// Program followed by its arguments, no shell involved. Never empty.
    Argv(Vec<String>),
}

/// Process descriptor.
///
/// Wire shapes, tried in order: a bare string (shell line), an array of
/// strings (argv), an object (`name`/`args` or `shell`, plus `input`/`dir`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub exec: Exec,
    /// Data piped to stdin.
    pub input: Option<String>,
    /// Working directory, relative to the base location.
    pub dir: Option<String>,
}

#[derive(Deserialize)]
struct CommandObject {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    shell: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    dir: Option<String>,
}

impl Command {
    /// A shell line.
    #[must_use]
    pub fn shell(line: impl Into<String>) -> Self {
        Self {
            exec: Exec::Shell(line.into()),
            input: None,
            dir: None,
        }
    }

    /// Program and arguments.
    pub fn argv<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err(Error::CommandLine("empty command".to_string()));
        }
        Ok(Self {
            exec: Exec::Argv(argv),
            input: None,
            dir: None,
        })
    }

    /// Word-split a command line into argv, without involving a shell.
    pub fn parse_line(line: &str) -> Result<Self> {
        let words =
            shell_words::split(line).map_err(|err| Error::CommandLine(format!("{line}: {err}")))?;
        Self::argv(words)
    }

    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Program name, for logs and error messages.
    #[must_use]
    pub fn program(&self) -> &str {
        match &self.exec {
            Exec::Shell(_) => "sh",
            Exec::Argv(argv) => argv.first().map_or("", String::as_str),
        }
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(line) => {
                if line.trim().is_empty() {
                    return Err("empty command".to_string());
                }
                Ok(Self::shell(line))
            }
            Value::Array(items) => {
                let argv = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s),
                        _ => Err("command arguments must be strings".to_string()),
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Self::argv(argv).map_err(|err| err.to_string())
            }
            Value::Object(map) => {
                let object: CommandObject =
                    serde_json::from_value(Value::Object(map)).map_err(|err| err.to_string())?;
                let exec = match (object.shell, object.name) {
                    (Some(line), None) => Exec::Shell(line),
                    (None, Some(name)) if !name.is_empty() => {
                        let mut argv = vec![name];
                        argv.extend(object.args);
                        Exec::Argv(argv)
                    }
                    (Some(_), Some(_)) => {
                        return Err("command must not have both `shell` and `name`".to_string());
                    }
                    _ => return Err("command object requires a `name`".to_string()),
                };
                Ok(Self {
                    exec,
                    input: object.input,
                    dir: object.dir,
                })
            }
            _ => Err("command must be a string, an array of strings or an object".to_string()),
        }
    }

    /// Encode in the most compact shape. Bare strings are only used when
    /// `allow_bare` is set, since nested sources read a bare string as a path.
    fn to_value(&self, allow_bare: bool) -> Value {
        let plain = self.input.is_none() && self.dir.is_none();
        match &self.exec {
            Exec::Shell(line) if plain && allow_bare => Value::String(line.clone()),
            Exec::Argv(argv) if plain => {
                Value::Array(argv.iter().cloned().map(Value::String).collect())
            }
            exec => {
                let mut map = Map::new();
                match exec {
                    Exec::Shell(line) => {
                        map.insert("shell".to_string(), Value::String(line.clone()));
                    }
                    Exec::Argv(argv) => {
                        if let Some((name, args)) = argv.split_first() {
                            map.insert("name".to_string(), Value::String(name.clone()));
                            if !args.is_empty() {
                                map.insert(
                                    "args".to_string(),
                                    Value::Array(args.iter().cloned().map(Value::String).collect()),
                                );
                            }
                        }
                    }
                }
                if let Some(input) = &self.input {
                    map.insert("input".to_string(), Value::String(input.clone()));
                }
                if let Some(dir) = &self.dir {
                    map.insert("dir".to_string(), Value::String(dir.clone()));
                }
                Value::Object(map)
            }
        }
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value(true).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Self::from_value(Value::deserialize(deserializer)?).map_err(D::Error::custom)
    }
}

/// HTTP request descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,
}

impl Request {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Method, defaulting to GET.
    #[must_use]
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        serde_json::from_value(value).map_err(|err| err.to_string())
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Request body, normalized to raw text. A JSON object body is stored in
/// its serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body(pub String);

impl Body {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(Self(text)),
            value @ Value::Object(_) => serde_json::to_string(&value)
                .map(Self)
                .map_err(D::Error::custom),
            _ => Err(D::Error::custom("body must be a string or an object")),
        }
    }
}

/// A value the user must supply before an action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// Key used in `${input:name}` substitution.
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(flatten)]
    pub kind: InputKind,
}

impl Input {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            placeholder: None,
            default: None,
            optional: false,
            kind,
        }
    }

    #[must_use]
    pub fn textfield(name: impl Into<String>) -> Self {
        Self::new(name, InputKind::Textfield)
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Label shown next to the field.
    #[must_use]
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputKind {
    Textfield,
    Textarea,
    Password,
    Number,
    Dropdown {
        #[serde(default)]
        items: Vec<DropdownItem>,
    },
    Checkbox {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(
            default,
            rename = "trueSubstitution",
            skip_serializing_if = "Option::is_none"
        )]
        true_substitution: Option<String>,
        #[serde(
            default,
            rename = "falseSubstitution",
            skip_serializing_if = "Option::is_none"
        )]
        false_substitution: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownItem {
    pub title: String,
    pub value: String,
}
