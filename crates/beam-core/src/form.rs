//! Form overlay: collects values for unresolved inputs.
//!
//! A form is owned by the runner that opened it. It tracks focus and scroll
//! position over its fields and refuses to submit while a required field is
//! empty. Submission yields a `name -> value` map whose value types follow
//! the input types.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::keymap::{Key, KeyInput};
use crate::page::{DropdownItem, Input, InputKind};

/// A submitted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    Bool(bool),
    Number(i64),
}

impl FormValue {
    /// Text used when substituting this value for `input`.
    #[must_use]
    pub fn substitution(&self, input: &Input) -> String {
        match (self, &input.kind) {
            (
                Self::Bool(checked),
                InputKind::Checkbox {
                    true_substitution,
                    false_substitution,
                    ..
                },
            ) => {
                let replacement = if *checked {
                    true_substitution
                } else {
                    false_substitution
                };
                replacement.clone().unwrap_or_else(|| checked.to_string())
            }
            (Self::Text(text), _) => text.clone(),
            (Self::Bool(checked), _) => checked.to_string(),
            (Self::Number(n), _) => n.to_string(),
        }
    }
}

/// Submitted values keyed by input name.
pub type FormValues = BTreeMap<String, FormValue>;

/// Substitution strings for submitted values.
#[must_use]
pub fn substitutions(inputs: &[Input], values: &FormValues) -> Vec<(String, String)> {
    inputs
        .iter()
        .filter_map(|input| {
            values
                .get(&input.name)
                .map(|value| (input.name.clone(), value.substitution(input)))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldState {
    Text(String),
    Checked(bool),
    Choice(Option<usize>),
}

/// One rendered input.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub input: Input,
    state: FieldState,
}

impl Field {
    fn new(input: Input) -> Self {
        let state = match &input.kind {
            InputKind::Checkbox { .. } => {
                FieldState::Checked(input.default.as_ref().and_then(Value::as_bool).unwrap_or(false))
            }
            InputKind::Dropdown { items } => FieldState::Choice(
                input
                    .default
                    .as_ref()
                    .and_then(default_text)
                    .and_then(|value| items.iter().position(|item| item.value == value)),
            ),
            _ => FieldState::Text(input.default.as_ref().and_then(default_text).unwrap_or_default()),
        };
        Self { input, state }
    }

    /// Current value rendered for display. Password values are masked.
    #[must_use]
    pub fn display_value(&self) -> String {
        match (&self.state, &self.input.kind) {
            (FieldState::Text(text), InputKind::Password) => "*".repeat(text.chars().count()),
            (FieldState::Text(text), _) => text.clone(),
            (FieldState::Checked(checked), InputKind::Checkbox { label, .. }) => {
                let mark = if *checked { "[x]" } else { "[ ]" };
                match label {
                    Some(label) => format!("{mark} {label}"),
                    None => mark.to_string(),
                }
            }
            (FieldState::Checked(checked), _) => checked.to_string(),
            (FieldState::Choice(choice), InputKind::Dropdown { items }) => choice
                .and_then(|index| items.get(index))
                .map(|item| item.title.clone())
                .unwrap_or_default(),
            (FieldState::Choice(_), _) => String::new(),
        }
    }

    #[must_use]
    pub fn is_multiline(&self) -> bool {
        matches!(self.input.kind, InputKind::Textarea)
    }

    fn dropdown_items(&self) -> &[DropdownItem] {
        match &self.input.kind {
            InputKind::Dropdown { items } => items,
            _ => &[],
        }
    }

    fn is_empty(&self) -> bool {
        match &self.state {
            FieldState::Text(text) => text.is_empty(),
            FieldState::Checked(_) => false,
            FieldState::Choice(choice) => choice.is_none(),
        }
    }

    fn value(&self) -> Result<Option<FormValue>, String> {
        match (&self.state, &self.input.kind) {
            (FieldState::Text(text), InputKind::Number) if text.is_empty() => Ok(None),
            (FieldState::Text(text), InputKind::Number) => text
                .trim()
                .parse::<i64>()
                .map(|n| Some(FormValue::Number(n)))
                .map_err(|_| format!("{} must be a whole number", self.input.display_title())),
            (FieldState::Text(text), _) => Ok(Some(FormValue::Text(text.clone()))),
            (FieldState::Checked(checked), _) => Ok(Some(FormValue::Bool(*checked))),
            (FieldState::Choice(choice), _) => Ok(choice
                .and_then(|index| self.dropdown_items().get(index))
                .map(|item| FormValue::Text(item.value.clone()))),
        }
    }

    fn type_char(&mut self, c: char) {
        if matches!(self.state, FieldState::Choice(_)) {
            if c == ' ' {
                self.cycle_choice(1);
            }
            return;
        }
        match (&mut self.state, &self.input.kind) {
            (FieldState::Text(text), InputKind::Number) => {
                if c.is_ascii_digit() || (c == '-' && text.is_empty()) {
                    text.push(c);
                }
            }
            (FieldState::Text(text), _) => text.push(c),
            (FieldState::Checked(checked), _) if c == ' ' => *checked = !*checked,
            _ => {}
        }
    }

    fn backspace(&mut self) {
        if let FieldState::Text(text) = &mut self.state {
            text.pop();
        }
    }

    fn cycle_choice(&mut self, step: isize) {
        let len = self.dropdown_items().len();
        if len == 0 {
            return;
        }
        if let FieldState::Choice(choice) = &mut self.state {
            let next = match *choice {
                None if step >= 0 => 0,
                None => len - 1,
                Some(current) => (current as isize + step).rem_euclid(len as isize) as usize,
            };
            *choice = Some(next);
        }
    }
}

/// Result of feeding a key to a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome {
    /// Keep the form open.
    Pending,
    /// Every required field is set.
    Submitted(FormValues),
    /// Dismissed without submission.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub title: String,
    fields: Vec<Field>,
    focus: usize,
    scroll: usize,
    viewport: usize,
    error: Option<String>,
}

impl Form {
    #[must_use]
    pub fn new(title: impl Into<String>, inputs: Vec<Input>) -> Self {
        Self {
            title: title.into(),
            fields: inputs.into_iter().map(Field::new).collect(),
            focus: 0,
            scroll: 0,
            viewport: usize::MAX,
            error: None,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn focus(&self) -> usize {
        self.focus
    }

    /// Index of the first visible field.
    #[must_use]
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    /// Validation message from the last rejected submission.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of fields that fit on screen.
    pub fn set_viewport(&mut self, fields: usize) {
        self.viewport = fields.max(1);
        self.ensure_visible();
    }

    /// Fields currently on screen, with their indices.
    pub fn visible_fields(&self) -> impl Iterator<Item = (usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .skip(self.scroll)
            .take(self.viewport)
    }

    pub fn focus_next(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + 1) % self.fields.len();
            self.ensure_visible();
        }
    }

    pub fn focus_prev(&mut self) {
        if !self.fields.is_empty() {
            self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
            self.ensure_visible();
        }
    }

    fn ensure_visible(&mut self) {
        if self.focus < self.scroll {
            self.scroll = self.focus;
        } else if self.viewport != usize::MAX && self.focus >= self.scroll + self.viewport {
            self.scroll = self.focus + 1 - self.viewport;
        }
    }

    /// Collect values, or record why submission is refused.
    pub fn submit(&mut self) -> Option<FormValues> {
        let mut values = FormValues::new();
        for field in &self.fields {
            if !field.input.optional && field.is_empty() {
                self.error = Some(format!("{} is required", field.input.display_title()));
                return None;
            }
            match field.value() {
                Ok(Some(value)) => {
                    values.insert(field.input.name.clone(), value);
                }
                Ok(None) => {}
                Err(message) => {
                    self.error = Some(message);
                    return None;
                }
            }
        }
        self.error = None;
        Some(values)
    }

    pub fn handle_key(&mut self, key: KeyInput) -> FormOutcome {
        if key.modifiers.ctrl && key.key == Key::Char('s') {
            return self.submit_outcome();
        }
        match key.key {
            Key::Esc => return FormOutcome::Cancelled,
            Key::Tab | Key::Down => self.focus_next(),
            Key::BackTab | Key::Up => self.focus_prev(),
            Key::Enter => {
                let last = self.focus + 1 >= self.fields.len();
                let multiline = self.fields.get(self.focus).is_some_and(Field::is_multiline);
                if multiline {
                    if let Some(Field {
                        state: FieldState::Text(text),
                        ..
                    }) = self.fields.get_mut(self.focus)
                    {
                        text.push('\n');
                    }
                } else if last {
                    return self.submit_outcome();
                } else {
                    self.focus_next();
                }
            }
            Key::Backspace => {
                if let Some(field) = self.fields.get_mut(self.focus) {
                    field.backspace();
                }
            }
            Key::Left | Key::Right => {
                let step = if key.key == Key::Left { -1 } else { 1 };
                if let Some(field) = self.fields.get_mut(self.focus) {
                    field.cycle_choice(step);
                }
            }
            _ => {
                if let (Some(c), Some(field)) = (key.text(), self.fields.get_mut(self.focus)) {
                    field.type_char(c);
                }
            }
        }
        FormOutcome::Pending
    }

    fn submit_outcome(&mut self) -> FormOutcome {
        match self.submit() {
            Some(values) => FormOutcome::Submitted(values),
            None => FormOutcome::Pending,
        }
    }
}

fn default_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(form: &mut Form, text: &str) {
        for c in text.chars() {
            form.handle_key(KeyInput::char(c));
        }
    }

    fn checkbox(name: &str) -> Input {
        Input::new(
            name,
            InputKind::Checkbox {
                label: Some("Force".into()),
                true_substitution: Some("--force".into()),
                false_substitution: None,
            },
        )
    }

    #[test]
    fn required_field_blocks_submission() {
        let mut form = Form::new("Form", vec![Input::textfield("name").with_title("Name")]);
        assert_eq!(form.handle_key(KeyInput::ctrl('s')), FormOutcome::Pending);
        assert_eq!(form.error(), Some("Name is required"));

        type_text(&mut form, "bob");
        let FormOutcome::Submitted(values) = form.handle_key(KeyInput::ctrl('s')) else {
            panic!("expected submission");
        };
        assert_eq!(values["name"], FormValue::Text("bob".into()));
        assert_eq!(form.error(), None);
    }

    #[test]
    fn optional_field_may_be_empty() {
        let mut form = Form::new("Form", vec![Input::textfield("note").optional()]);
        assert!(form.submit().is_some());
    }

    #[test]
    fn focus_wraps_both_ways() {
        let mut form = Form::new(
            "Form",
            vec![
                Input::textfield("a"),
                Input::textfield("b"),
                Input::textfield("c"),
            ],
        );
        form.handle_key(KeyInput::plain(Key::BackTab));
        assert_eq!(form.focus(), 2);
        form.handle_key(KeyInput::plain(Key::Tab));
        assert_eq!(form.focus(), 0);
    }

    #[test]
    fn scroll_follows_focus() {
        let inputs = (0..5).map(|i| Input::textfield(format!("f{i}"))).collect();
        let mut form = Form::new("Form", inputs);
        form.set_viewport(2);
        for _ in 0..3 {
            form.focus_next();
        }
        assert_eq!(form.focus(), 3);
        assert_eq!(form.scroll(), 2);
        let visible: Vec<usize> = form.visible_fields().map(|(i, _)| i).collect();
        assert_eq!(visible, vec![2, 3]);
        form.focus_next();
        form.focus_next();
        assert_eq!(form.focus(), 0);
        assert_eq!(form.scroll(), 0);
    }

    #[test]
    fn enter_on_last_field_submits() {
        let mut form = Form::new("Form", vec![Input::textfield("a"), Input::textfield("b")]);
        type_text(&mut form, "1");
        assert_eq!(form.handle_key(KeyInput::plain(Key::Enter)), FormOutcome::Pending);
        assert_eq!(form.focus(), 1);
        type_text(&mut form, "2");
        assert!(matches!(
            form.handle_key(KeyInput::plain(Key::Enter)),
            FormOutcome::Submitted(_)
        ));
    }

    #[test]
    fn textarea_enter_inserts_newline() {
        let mut form = Form::new("Form", vec![Input::new("body", InputKind::Textarea)]);
        type_text(&mut form, "a");
        form.handle_key(KeyInput::plain(Key::Enter));
        type_text(&mut form, "b");
        let values = form.submit().unwrap();
        assert_eq!(values["body"], FormValue::Text("a\nb".into()));
    }

    #[test]
    fn checkbox_submits_bool_and_substitutes_strings() {
        let input = checkbox("force");
        let mut form = Form::new("Form", vec![input.clone()]);
        form.handle_key(KeyInput::char(' '));
        let values = form.submit().unwrap();
        assert_eq!(values["force"], FormValue::Bool(true));
        assert_eq!(values["force"].substitution(&input), "--force");
        assert_eq!(FormValue::Bool(false).substitution(&input), "false");
    }

    #[test]
    fn number_field_accepts_digits_only() {
        let mut form = Form::new("Form", vec![Input::new("n", InputKind::Number)]);
        type_text(&mut form, "-4x2");
        let values = form.submit().unwrap();
        assert_eq!(values["n"], FormValue::Number(-42));
    }

    #[test]
    fn dropdown_cycles_and_submits_value() {
        let input = Input::new(
            "color",
            InputKind::Dropdown {
                items: vec![
                    DropdownItem { title: "Red".into(), value: "r".into() },
                    DropdownItem { title: "Blue".into(), value: "b".into() },
                ],
            },
        );
        let mut form = Form::new("Form", vec![input]);
        assert!(form.submit().is_none());
        form.handle_key(KeyInput::plain(Key::Right));
        form.handle_key(KeyInput::plain(Key::Right));
        assert_eq!(form.fields()[0].display_value(), "Blue");
        form.handle_key(KeyInput::plain(Key::Right));
        assert_eq!(form.submit().unwrap()["color"], FormValue::Text("r".into()));
    }

    #[test]
    fn defaults_prefill_fields() {
        let mut input = Input::textfield("name");
        input.default = Some(Value::String("preset".into()));
        let mut form = Form::new("Form", vec![input]);
        assert_eq!(form.submit().unwrap()["name"], FormValue::Text("preset".into()));
    }

    #[test]
    fn password_is_masked() {
        let mut form = Form::new("Form", vec![Input::new("pw", InputKind::Password)]);
        type_text(&mut form, "abc");
        assert_eq!(form.fields()[0].display_value(), "***");
    }

    #[test]
    fn escape_cancels() {
        let mut form = Form::new("Form", vec![Input::textfield("a")]);
        assert_eq!(form.handle_key(KeyInput::plain(Key::Esc)), FormOutcome::Cancelled);
    }

    #[test]
    fn substitutions_follow_input_order() {
        let inputs = vec![Input::textfield("b"), checkbox("a")];
        let mut values = FormValues::new();
        values.insert("a".into(), FormValue::Bool(true));
        values.insert("b".into(), FormValue::Text("x".into()));
        assert_eq!(
            substitutions(&inputs, &values),
            vec![("b".into(), "x".into()), ("a".into(), "--force".into())]
        );
    }
}
