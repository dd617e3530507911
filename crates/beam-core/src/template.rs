//! Template substitution for `${input:NAME}`, `${env:NAME}` and `${query}`.
//!
//! Substitution is a single left-to-right pass: every token is looked up
//! once and replaced by its escaped value, and replaced text is never
//! rescanned. Unknown tokens are left in place so a later pass with more
//! bindings can still resolve them. Re-applying the same bindings to an
//! output whose values contain no token syntax is therefore a no-op.
//!
//! Explicit inputs shadow environment variables of the same name; both
//! token forms consult the same combined lookup.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::environment::Environment;
use crate::page::{Action, ActionKind, Command, Exec, PageSource, Preview, Request};

/// How a substituted value is escaped for the field it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// Shell-quoted, for command lines run through a shell.
    Shell,
    /// For URLs: form-encoded inside the query, percent-encoded in the path
    /// and fragment.
    Url,
    /// Inserted as-is (headers, bodies, paths, text, argv elements).
    Raw,
}

impl Escape {
    /// Escaping for a target that may be either a URL or a path.
    #[must_use]
    pub fn for_target(target: &str) -> Self {
        if target.contains("://") {
            Self::Url
        } else {
            Self::Raw
        }
    }

    /// Escape `value` for insertion after `preceding`, the output so far.
    fn apply<'a>(self, value: &'a str, preceding: &str) -> Cow<'a, str> {
        match self {
            Self::Shell => shell_words::quote(value),
            Self::Url if in_query(preceding) => {
                Cow::Owned(url::form_urlencoded::byte_serialize(value.as_bytes()).collect())
            }
            Self::Url => Cow::from(utf8_percent_encode(value, URL_COMPONENT)),
            Self::Raw => Cow::Borrowed(value),
        }
    }
}

/// Everything but RFC 3986 unreserved characters.
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Whether the next character of a URL lands in its query. Escaped values
/// never contain `?` or `#`, so only literal text decides.
fn in_query(preceding: &str) -> bool {
    !preceding.contains('#') && preceding.contains('?')
}

/// Values available to substitution.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    inputs: BTreeMap<String, String>,
    env: Option<Arc<Environment>>,
    query: Option<String>,
}

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fall back to environment variables for names without an explicit input.
    #[must_use]
    pub fn with_env(mut self, env: Arc<Environment>) -> Self {
        self.env = Some(env);
        self
    }

    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_inputs<I, K, V>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inputs
            .extend(inputs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Whether an explicit input with this name is bound.
    #[must_use]
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.inputs
            .get(name)
            .map(String::as_str)
            .or_else(|| self.env.as_ref().and_then(|env| env.var(name)))
    }

    fn resolve(&self, token: &str) -> Option<&str> {
        if token == "query" {
            return self.query.as_deref();
        }
        let name = token
            .strip_prefix("input:")
            .or_else(|| token.strip_prefix("env:"))?;
        self.lookup(name)
    }

    /// Substitute every resolvable token in `text`.
    #[must_use]
    pub fn substitute(&self, text: &str, escape: Escape) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let token = &after[..end];
                    match self.resolve(token) {
                        Some(value) => {
                            let escaped = escape.apply(value, &out);
                            out.push_str(&escaped);
                        }
                        None => {
                            out.push_str("${");
                            out.push_str(token);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn substitute_in_place(&self, text: &mut String, escape: Escape) {
        if text.contains("${") {
            *text = self.substitute(text, escape);
        }
    }

    /// Substitute into every field of a command.
    pub fn apply_command(&self, command: &mut Command) {
        match &mut command.exec {
            Exec::Shell(line) => self.substitute_in_place(line, Escape::Shell),
            Exec::Argv(argv) => {
                for arg in argv {
                    self.substitute_in_place(arg, Escape::Raw);
                }
            }
        }
        if let Some(input) = &mut command.input {
            self.substitute_in_place(input, Escape::Raw);
        }
        if let Some(dir) = &mut command.dir {
            self.substitute_in_place(dir, Escape::Raw);
        }
    }

    /// Substitute into every field of a request.
    pub fn apply_request(&self, request: &mut Request) {
        self.substitute_in_place(&mut request.url, Escape::Url);
        for value in request.headers.values_mut() {
            self.substitute_in_place(value, Escape::Raw);
        }
        if let Some(body) = &mut request.body {
            self.substitute_in_place(&mut body.0, Escape::Raw);
        }
    }

    pub fn apply_source(&self, source: &mut PageSource) {
        match source {
            PageSource::Path(path) => self.substitute_in_place(path, Escape::Raw),
            PageSource::Request(request) => self.apply_request(request),
            PageSource::Command(command) => self.apply_command(command),
        }
    }

    pub fn apply_preview(&self, preview: &mut Preview) {
        match preview {
            Preview::Text(text) => self.substitute_in_place(text, Escape::Raw),
            Preview::Request(request) => self.apply_request(request),
            Preview::Command(command) => self.apply_command(command),
        }
    }

    /// Substitute into an action's payload, using each field's escaping.
    pub fn apply_action(&self, action: &mut Action) {
        self.substitute_in_place(&mut action.title, Escape::Raw);
        match &mut action.kind {
            ActionKind::Copy { text } => self.substitute_in_place(text, Escape::Raw),
            ActionKind::Open { target } => {
                let escape = Escape::for_target(target);
                self.substitute_in_place(target, escape);
            }
            ActionKind::Push { page } => self.apply_source(page),
            ActionKind::Run { command, .. } => self.apply_command(command),
            ActionKind::Read { path } => self.substitute_in_place(path, Escape::Raw),
            ActionKind::Fetch { request } => self.apply_request(request),
            ActionKind::Reload | ActionKind::Exit => {}
        }
    }
}
