//! Page schema validation.
//!
//! Every generator result is checked against the page schema before it is
//! decoded. The check runs on the untyped JSON value so that a producer gets
//! a precise location (`items[2].actions[0].text`) instead of a generic
//! decode failure.

use std::fmt;

use serde_json::{Map, Value};

/// A schema violation at a JSON location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted location of the offending value, `$` for the root.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Checks a decoded JSON document against the page schema.
pub trait PageValidator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), ValidationError>;
}

/// Validator that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl PageValidator for NoopValidator {
    fn validate(&self, _value: &Value) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Built-in validator for the page schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

const ACTION_TYPES: &[&str] = &[
    "copy", "open", "push", "run", "read", "fetch", "reload", "exit",
];
const INPUT_TYPES: &[&str] = &[
    "textfield",
    "textarea",
    "password",
    "number",
    "dropdown",
    "checkbox",
];
const ON_SUCCESS: &[&str] = &["push", "reload", "replace", "exit"];
const HIGHLIGHTS: &[&str] = &["markdown", "ansi"];

impl PageValidator for SchemaValidator {
    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let page = object(value, "$")?;
        let kind = required_str(page, "$", "type")?;
        optional_str(page, "$", "title")?;
        array_of(page, "$", "actions", check_action)?;
        match kind {
            "list" => {
                array_of(page, "$", "items", check_item)?;
                optional_bool(page, "$", "dynamic")?;
                optional_str(page, "$", "emptyText")?;
                Ok(())
            }
            "detail" => {
                optional_str(page, "$", "text")?;
                if let Some(command) = page.get("command") {
                    check_command(command, "$.command")?;
                }
                optional_enum(page, "$", "highlight", HIGHLIGHTS)?;
                optional_str(page, "$", "dir")?;
                Ok(())
            }
            other => Err(ValidationError::new(
                "$.type",
                format!("expected `list` or `detail`, got `{other}`"),
            )),
        }
    }
}

fn join(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, format!("expected object, got {}", type_name(value))))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_str<'a>(
    map: &'a Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<&'a str, ValidationError> {
    match map.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ValidationError::new(
            &join(path, key),
            format!("expected string, got {}", type_name(other)),
        )),
        None => Err(ValidationError::new(path, format!("missing required field `{key}`"))),
    }
}

fn optional_str(map: &Map<String, Value>, path: &str, key: &str) -> Result<(), ValidationError> {
    match map.get(key) {
        None | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(ValidationError::new(
            &join(path, key),
            format!("expected string, got {}", type_name(other)),
        )),
    }
}

fn optional_bool(map: &Map<String, Value>, path: &str, key: &str) -> Result<(), ValidationError> {
    match map.get(key) {
        None | Some(Value::Bool(_)) => Ok(()),
        Some(other) => Err(ValidationError::new(
            &join(path, key),
            format!("expected boolean, got {}", type_name(other)),
        )),
    }
}

fn optional_enum(
    map: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ValidationError> {
    match map.get(key) {
        None => Ok(()),
        Some(Value::String(s)) if allowed.contains(&s.as_str()) => Ok(()),
        Some(other) => Err(ValidationError::new(
            &join(path, key),
            format!("expected one of {}, got {other}", allowed.join(", ")),
        )),
    }
}

fn array_of(
    map: &Map<String, Value>,
    path: &str,
    key: &str,
    check: fn(&Value, &str) -> Result<(), ValidationError>,
) -> Result<(), ValidationError> {
    match map.get(key) {
        None => Ok(()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .try_for_each(|(index, item)| check(item, &format!("{path}.{key}[{index}]"))),
        Some(other) => Err(ValidationError::new(
            &join(path, key),
            format!("expected array, got {}", type_name(other)),
        )),
    }
}

fn check_item(value: &Value, path: &str) -> Result<(), ValidationError> {
    let item = object(value, path)?;
    required_str(item, path, "title")?;
    optional_str(item, path, "id")?;
    optional_str(item, path, "subtitle")?;
    array_of(item, path, "accessories", |value, path| match value {
        Value::String(_) => Ok(()),
        other => Err(ValidationError::new(
            path,
            format!("expected string, got {}", type_name(other)),
        )),
    })?;
    array_of(item, path, "actions", check_action)?;
    if let Some(preview) = item.get("preview") {
        check_source(preview, &join(path, "preview"))?;
    }
    Ok(())
}

fn check_action(value: &Value, path: &str) -> Result<(), ValidationError> {
    let action = object(value, path)?;
    let kind = required_str(action, path, "type")?;
    if !ACTION_TYPES.contains(&kind) {
        return Err(ValidationError::new(
            &join(path, "type"),
            format!("unknown action type `{kind}`"),
        ));
    }
    optional_str(action, path, "title")?;
    optional_str(action, path, "key")?;
    array_of(action, path, "inputs", check_input)?;
    match kind {
        "copy" => required_str(action, path, "text").map(drop),
        "open" => required_str(action, path, "target").map(drop),
        "read" => required_str(action, path, "path").map(drop),
        "push" => match action.get("page") {
            Some(page) => check_source(page, &join(path, "page")),
            None => Err(ValidationError::new(path, "missing required field `page`")),
        },
        "run" => {
            optional_enum(action, path, "onSuccess", ON_SUCCESS)?;
            match action.get("command") {
                Some(command) => check_command(command, &join(path, "command")),
                None => Err(ValidationError::new(path, "missing required field `command`")),
            }
        }
        "fetch" => match action.get("request") {
            Some(request) => check_request(request, &join(path, "request")),
            None => Err(ValidationError::new(path, "missing required field `request`")),
        },
        _ => Ok(()),
    }
}

/// Page sources and previews: a string, a request (object with `url`) or a
/// command.
fn check_source(value: &Value, path: &str) -> Result<(), ValidationError> {
    match value {
        Value::String(_) => Ok(()),
        Value::Object(map) if map.contains_key("url") => check_request(value, path),
        other => check_command(other, path),
    }
}

fn check_command(value: &Value, path: &str) -> Result<(), ValidationError> {
    match value {
        Value::String(line) if !line.trim().is_empty() => Ok(()),
        Value::String(_) => Err(ValidationError::new(path, "empty command")),
        Value::Array(items) if items.is_empty() => Err(ValidationError::new(path, "empty command")),
        Value::Array(items) => items.iter().enumerate().try_for_each(|(index, item)| {
            if item.is_string() {
                Ok(())
            } else {
                Err(ValidationError::new(
                    &format!("{path}[{index}]"),
                    format!("expected string, got {}", type_name(item)),
                ))
            }
        }),
        Value::Object(map) => {
            if !map.contains_key("name") && !map.contains_key("shell") {
                return Err(ValidationError::new(path, "command requires `name` or `shell`"));
            }
            optional_str(map, path, "name")?;
            optional_str(map, path, "shell")?;
            optional_str(map, path, "input")?;
            optional_str(map, path, "dir")?;
            array_of(map, path, "args", |value, path| {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(ValidationError::new(
                        path,
                        format!("expected string, got {}", type_name(value)),
                    ))
                }
            })
        }
        other => Err(ValidationError::new(
            path,
            format!(
                "expected command string, array or object, got {}",
                type_name(other)
            ),
        )),
    }
}

fn check_request(value: &Value, path: &str) -> Result<(), ValidationError> {
    let request = object(value, path)?;
    required_str(request, path, "url")?;
    optional_str(request, path, "method")?;
    if let Some(headers) = request.get("headers") {
        let headers_path = join(path, "headers");
        for (name, value) in object(headers, &headers_path)? {
            if !value.is_string() {
                return Err(ValidationError::new(
                    &join(&headers_path, name),
                    format!("expected string, got {}", type_name(value)),
                ));
            }
        }
    }
    match request.get("body") {
        None | Some(Value::String(_) | Value::Object(_)) => Ok(()),
        Some(other) => Err(ValidationError::new(
            &join(path, "body"),
            format!("expected string or object, got {}", type_name(other)),
        )),
    }
}

fn check_input(value: &Value, path: &str) -> Result<(), ValidationError> {
    let input = object(value, path)?;
    required_str(input, path, "name")?;
    let kind = required_str(input, path, "type")?;
    if !INPUT_TYPES.contains(&kind) {
        return Err(ValidationError::new(
            &join(path, "type"),
            format!("unknown input type `{kind}`"),
        ));
    }
    optional_str(input, path, "title")?;
    optional_str(input, path, "placeholder")?;
    optional_bool(input, path, "optional")?;
    match kind {
        "dropdown" => array_of(input, path, "items", |value, path| {
            let item = object(value, path)?;
            required_str(item, path, "title")?;
            required_str(item, path, "value").map(drop)
        }),
        "checkbox" => {
            optional_str(input, path, "label")?;
            optional_str(input, path, "trueSubstitution")?;
            optional_str(input, path, "falseSubstitution")
        }
        _ => Ok(()),
    }
}
