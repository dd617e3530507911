//! Per-frame state machine.
//!
//! A runner owns one navigation frame: its generator, the decoded page and
//! the view derived from it, plus transient overlays (form, action menu,
//! error). It never performs I/O itself. Every input returns a list of
//! [`Outcome`]s that the paginator turns into spawned tasks, stack changes
//! or collaborator calls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::expand::expand_command;
use crate::form::{Form, FormOutcome, substitutions};
use crate::generator::Generator;
use crate::keymap::{Key, KeyInput};
use crate::location::BaseLocation;
use crate::page::{
    Action, ActionKind, Command, Detail, Input, List, ListItem, OnSuccess, Page, PageSource,
    Preview, Request,
};
use crate::task::{RunnerId, TaskKind, TaskOutput};
use crate::template::Bindings;

/// Requests a runner hands to the paginator.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Spawn(TaskKind),
    Push(Generator),
    Pop,
    Quit,
    /// Hand the terminal to a process and exit with its status.
    Exec(Command),
    Copy(String),
    Open(String),
}

/// Lazily evaluated preview text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewState {
    Loading,
    Ready(String),
    Failed(String),
}

/// A rendered list page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListView {
    pub list: List,
    filtered: Vec<usize>,
    selected: usize,
    previews: HashMap<String, PreviewState>,
}

impl ListView {
    fn new(list: List, query: &str, previous: Option<&str>) -> Self {
        let mut view = Self {
            list,
            filtered: Vec::new(),
            selected: 0,
            previews: HashMap::new(),
        };
        view.refilter(query);
        if let Some(identity) = previous {
            view.select_identity(identity);
        }
        view
    }

    fn refilter(&mut self, query: &str) {
        let needle = query.to_lowercase();
        let dynamic = self.list.dynamic;
        self.filtered = self
            .list
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| dynamic || needle.is_empty() || item_matches(item, &needle))
            .map(|(index, _)| index)
            .collect();
        self.selected = 0;
    }

    fn select_identity(&mut self, identity: &str) {
        if let Some(position) = self
            .filtered
            .iter()
            .position(|&index| self.list.items[index].identity(index) == identity)
        {
            self.selected = position;
        }
    }

    /// Item indices that pass the current filter, in display order.
    #[must_use]
    pub fn visible(&self) -> &[usize] {
        &self.filtered
    }

    /// Position of the selection within [`Self::visible`].
    #[must_use]
    pub fn selected_position(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn selected_item(&self) -> Option<&ListItem> {
        self.filtered
            .get(self.selected)
            .map(|&index| &self.list.items[index])
    }

    /// Stable identity of the selected item.
    #[must_use]
    pub fn selected_identity(&self) -> Option<String> {
        self.filtered
            .get(self.selected)
            .map(|&index| self.list.items[index].identity(index))
    }

    fn move_selection(&mut self, delta: isize) {
        if self.filtered.is_empty() {
            return;
        }
        let last = self.filtered.len() - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last as isize) as usize;
    }

    /// Preview for the selected item, if it has one.
    #[must_use]
    pub fn selected_preview(&self) -> Option<PreviewState> {
        let item = self.selected_item()?;
        match item.preview.as_ref()? {
            Preview::Text(text) => Some(PreviewState::Ready(text.clone())),
            _ => self
                .selected_identity()
                .and_then(|identity| self.previews.get(&identity).cloned()),
        }
    }

    fn preview_task(&mut self) -> Option<TaskKind> {
        let identity = self.selected_identity()?;
        let preview = self.selected_item()?.preview.clone()?;
        if matches!(preview, Preview::Text(_)) || self.previews.contains_key(&identity) {
            return None;
        }
        self.previews.insert(identity.clone(), PreviewState::Loading);
        Some(TaskKind::Preview {
            item: identity,
            preview,
        })
    }

    /// Actions offered for the current selection: the item's own actions
    /// followed by the page actions.
    #[must_use]
    pub fn actions(&self) -> Vec<&Action> {
        self.selected_item()
            .into_iter()
            .flat_map(|item| item.actions.iter())
            .chain(self.list.actions.iter())
            .collect()
    }
}

fn item_matches(item: &ListItem, needle: &str) -> bool {
    item.title.to_lowercase().contains(needle)
        || item
            .subtitle
            .as_ref()
            .is_some_and(|subtitle| subtitle.to_lowercase().contains(needle))
        || item
            .accessories
            .iter()
            .any(|accessory| accessory.to_lowercase().contains(needle))
}

/// Text of a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailContent {
    Loading,
    Ready(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailView {
    pub detail: Detail,
    pub content: DetailContent,
    pub scroll: u16,
}

/// What the frame currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerView {
    Loading,
    List(ListView),
    Detail(DetailView),
}

/// What a form submission resumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    /// The initial load of a frame created with required inputs.
    Load(Vec<Input>),
    /// An action whose inputs were unresolved.
    Action(Action),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionMenu {
    pub actions: Vec<Action>,
    pub selected: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Form { form: Form, pending: Pending },
    Menu(ActionMenu),
}

/// Error shown on top of the frame. Enter copies the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOverlay {
    pub message: String,
}

#[derive(Debug)]
pub struct Runner {
    id: RunnerId,
    generator: Generator,
    base: BaseLocation,
    env: Arc<Environment>,
    default_title: String,
    epoch: u64,
    inputs: Vec<(String, String)>,
    view: RunnerView,
    overlay: Option<Overlay>,
    error: Option<ErrorOverlay>,
    in_flight: bool,
    queued: Option<String>,
    has_loaded: bool,
    query: String,
    viewport_rows: usize,
}

impl Runner {
    pub fn new(
        id: RunnerId,
        generator: Generator,
        env: Arc<Environment>,
        default_title: impl Into<String>,
    ) -> Result<Self> {
        let base = generator.base(&env)?;
        Ok(Self {
            id,
            generator,
            base,
            env,
            default_title: default_title.into(),
            epoch: 0,
            inputs: Vec::new(),
            view: RunnerView::Loading,
            overlay: None,
            error: None,
            in_flight: false,
            queued: None,
            has_loaded: false,
            query: String::new(),
            viewport_rows: usize::MAX,
        })
    }

    /// Require `inputs` before the first invocation.
    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<Input>) -> Self {
        if !inputs.is_empty() {
            let title = self.default_title.clone();
            self.overlay = Some(Overlay::Form {
                form: Form::new(title, inputs.clone()),
                pending: Pending::Load(inputs),
            });
        }
        self
    }

    #[must_use]
    pub const fn id(&self) -> RunnerId {
        self.id
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn base(&self) -> &BaseLocation {
        &self.base
    }

    #[must_use]
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    #[must_use]
    pub fn view(&self) -> &RunnerView {
        &self.view
    }

    #[must_use]
    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    #[must_use]
    pub fn form(&self) -> Option<&Form> {
        match &self.overlay {
            Some(Overlay::Form { form, .. }) => Some(form),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorOverlay> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Whether a generator invocation is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match &self.view {
            RunnerView::List(view) if !view.list.title.is_empty() => &view.list.title,
            RunnerView::Detail(view) if !view.detail.title.is_empty() => &view.detail.title,
            _ => &self.default_title,
        }
    }

    /// Start the first invocation, unless a form must be filled first.
    pub fn init(&mut self) -> Vec<Outcome> {
        if matches!(
            self.overlay,
            Some(Overlay::Form {
                pending: Pending::Load(_),
                ..
            })
        ) {
            return Vec::new();
        }
        self.request_load()
    }

    /// Re-invoke the generator with the current query. Requests made while
    /// an invocation is outstanding collapse into one follow-up.
    pub fn request_load(&mut self) -> Vec<Outcome> {
        if self.in_flight {
            self.queued = Some(self.query.clone());
            return Vec::new();
        }
        self.in_flight = true;
        vec![Outcome::Spawn(TaskKind::Generate {
            generator: self.generator.clone(),
            inputs: self.inputs.clone(),
            query: self.query.clone(),
        })]
    }

    /// Number of terminal rows available to the frame.
    pub fn resize(&mut self, rows: u16) {
        self.viewport_rows = usize::from(rows);
        self.sync_form_viewport();
    }

    fn sync_form_viewport(&mut self) {
        let rows = self.viewport_rows;
        if let Some(Overlay::Form { form, .. }) = &mut self.overlay {
            if rows != usize::MAX {
                // Title and footer take four rows, each field three.
                form.set_viewport(rows.saturating_sub(4) / 3);
            }
        }
    }

    pub fn show_error(&mut self, err: &Error) {
        debug!(runner = %self.id, error = %err, "showing error overlay");
        self.error = Some(ErrorOverlay {
            message: err.render_plain(),
        });
    }

    /// Apply a finished task. Results from an older epoch are ignored.
    pub fn on_completion(&mut self, epoch: u64, output: TaskOutput) -> Vec<Outcome> {
        match output {
            TaskOutput::RunOnce(result) => match result {
                Ok(()) => self.request_load(),
                Err(err) => {
                    self.show_error(&err);
                    Vec::new()
                }
            },
            _ if epoch != self.epoch => {
                trace!(runner = %self.id, epoch, current = self.epoch, "dropping stale result");
                Vec::new()
            }
            TaskOutput::Page(result) => self.on_page(result),
            TaskOutput::DetailContent(result) => {
                match result {
                    Ok(text) => {
                        if let RunnerView::Detail(view) = &mut self.view {
                            view.content = DetailContent::Ready(text);
                        }
                    }
                    Err(err) => self.show_error(&err),
                }
                Vec::new()
            }
            TaskOutput::Preview { item, result } => {
                if let RunnerView::List(view) = &mut self.view {
                    let state = match result {
                        Ok(text) => PreviewState::Ready(text),
                        Err(err) => PreviewState::Failed(err.to_string()),
                    };
                    view.previews.insert(item, state);
                }
                Vec::new()
            }
        }
    }

    fn on_page(&mut self, result: Result<Page>) -> Vec<Outcome> {
        self.in_flight = false;
        let mut outcomes = Vec::new();
        match result {
            Ok(page) => {
                self.epoch += 1;
                self.has_loaded = true;
                self.error = None;
                match page {
                    Page::List(list) => {
                        let previous = match &self.view {
                            RunnerView::List(view) => view.selected_identity(),
                            _ => None,
                        };
                        let mut view = ListView::new(list, &self.query, previous.as_deref());
                        outcomes.extend(view.preview_task().map(Outcome::Spawn));
                        self.view = RunnerView::List(view);
                    }
                    Page::Detail(detail) => {
                        let content = match (&detail.text, &detail.command) {
                            (Some(text), _) => DetailContent::Ready(text.clone()),
                            (None, Some(command)) => {
                                outcomes.push(Outcome::Spawn(TaskKind::DetailContent {
                                    command: command.clone(),
                                }));
                                DetailContent::Loading
                            }
                            (None, None) => DetailContent::Ready(String::new()),
                        };
                        self.view = RunnerView::Detail(DetailView {
                            detail,
                            content,
                            scroll: 0,
                        });
                    }
                }
            }
            Err(err) => self.show_error(&err),
        }
        if let Some(query) = self.queued.take() {
            self.query = query;
            outcomes.extend(self.request_load());
        }
        outcomes
    }

    pub fn handle_key(&mut self, key: KeyInput) -> Vec<Outcome> {
        if self.error.is_some() {
            return self.handle_error_key(key);
        }
        match self.overlay.take() {
            Some(Overlay::Form { form, pending }) => self.handle_form_key(form, pending, key),
            Some(Overlay::Menu(menu)) => self.handle_menu_key(menu, key),
            None => {
                if key.key == Key::Esc {
                    return vec![Outcome::Pop];
                }
                if key == KeyInput::ctrl('r') {
                    return self.request_load();
                }
                match &self.view {
                    RunnerView::Loading => Vec::new(),
                    RunnerView::List(_) => self.handle_list_key(key),
                    RunnerView::Detail(_) => self.handle_detail_key(key),
                }
            }
        }
    }

    fn handle_error_key(&mut self, key: KeyInput) -> Vec<Outcome> {
        match key.key {
            Key::Esc => {
                self.error = None;
                if self.has_loaded {
                    Vec::new()
                } else {
                    vec![Outcome::Pop]
                }
            }
            Key::Enter => self
                .error
                .as_ref()
                .map(|error| vec![Outcome::Copy(error.message.clone())])
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn handle_form_key(&mut self, mut form: Form, pending: Pending, key: KeyInput) -> Vec<Outcome> {
        match form.handle_key(key) {
            FormOutcome::Pending => {
                self.overlay = Some(Overlay::Form { form, pending });
                Vec::new()
            }
            FormOutcome::Cancelled => match pending {
                // Nothing to return to when the frame never loaded.
                Pending::Load(_) if !self.has_loaded => vec![Outcome::Pop],
                _ => Vec::new(),
            },
            FormOutcome::Submitted(values) => match pending {
                Pending::Load(inputs) => {
                    self.inputs = substitutions(&inputs, &values);
                    self.request_load()
                }
                Pending::Action(mut action) => {
                    let bound = substitutions(&action.inputs, &values);
                    action.inputs.clear();
                    let bindings = self.bindings().with_inputs(bound);
                    self.perform(action, &bindings)
                }
            },
        }
    }

    fn handle_menu_key(&mut self, mut menu: ActionMenu, key: KeyInput) -> Vec<Outcome> {
        match key.key {
            Key::Esc | Key::Tab => Vec::new(),
            Key::Enter => match menu.actions.get(menu.selected).cloned() {
                Some(action) => self.dispatch(action),
                None => Vec::new(),
            },
            Key::Up => {
                menu.selected = menu.selected.saturating_sub(1);
                self.overlay = Some(Overlay::Menu(menu));
                Vec::new()
            }
            Key::Down => {
                if menu.selected + 1 < menu.actions.len() {
                    menu.selected += 1;
                }
                self.overlay = Some(Overlay::Menu(menu));
                Vec::new()
            }
            _ => {
                self.overlay = Some(Overlay::Menu(menu));
                Vec::new()
            }
        }
    }

    fn current_actions(&self) -> Vec<Action> {
        match &self.view {
            RunnerView::List(view) => view.actions().into_iter().cloned().collect(),
            RunnerView::Detail(view) => view.detail.actions.clone(),
            RunnerView::Loading => Vec::new(),
        }
    }

    fn shortcut(&self, key: KeyInput) -> Option<Action> {
        self.current_actions().into_iter().find(|action| {
            action
                .key
                .as_deref()
                .and_then(|text| text.parse::<KeyInput>().ok())
                .is_some_and(|shortcut| shortcut.matches(&key))
        })
    }

    fn open_menu(&mut self) -> Vec<Outcome> {
        let actions = self.current_actions();
        if !actions.is_empty() {
            self.overlay = Some(Overlay::Menu(ActionMenu {
                actions,
                selected: 0,
            }));
        }
        Vec::new()
    }

    fn primary_action(&mut self) -> Vec<Outcome> {
        match self.current_actions().into_iter().next() {
            Some(action) => self.dispatch(action),
            None => Vec::new(),
        }
    }

    fn handle_list_key(&mut self, key: KeyInput) -> Vec<Outcome> {
        let is_chord = key.modifiers.ctrl || key.modifiers.alt || key.text().is_none();
        if is_chord {
            if let Some(action) = self.shortcut(key) {
                return self.dispatch(action);
            }
        }
        let RunnerView::List(view) = &mut self.view else {
            return Vec::new();
        };
        let before = view.selected;
        match key.key {
            Key::Enter => return self.primary_action(),
            Key::Tab => return self.open_menu(),
            Key::Up => view.move_selection(-1),
            Key::Down => view.move_selection(1),
            Key::Char('p') if key.modifiers.ctrl => view.move_selection(-1),
            Key::Char('n') if key.modifiers.ctrl => view.move_selection(1),
            Key::PageUp => view.move_selection(-10),
            Key::PageDown => view.move_selection(10),
            Key::Home => view.move_selection(isize::MIN / 2),
            Key::End => view.move_selection(isize::MAX / 2),
            Key::Backspace => {
                if self.query.pop().is_some() {
                    return self.query_changed();
                }
            }
            _ => {
                if let Some(c) = key.text() {
                    self.query.push(c);
                    return self.query_changed();
                }
            }
        }
        let RunnerView::List(view) = &mut self.view else {
            return Vec::new();
        };
        if view.selected == before {
            return Vec::new();
        }
        view.preview_task().map(Outcome::Spawn).into_iter().collect()
    }

    fn query_changed(&mut self) -> Vec<Outcome> {
        let RunnerView::List(view) = &mut self.view else {
            return Vec::new();
        };
        if view.list.dynamic {
            return self.request_load();
        }
        view.refilter(&self.query);
        view.preview_task().map(Outcome::Spawn).into_iter().collect()
    }

    fn handle_detail_key(&mut self, key: KeyInput) -> Vec<Outcome> {
        if let Some(action) = self.shortcut(key) {
            return self.dispatch(action);
        }
        let RunnerView::Detail(view) = &mut self.view else {
            return Vec::new();
        };
        match key.key {
            Key::Enter => return self.primary_action(),
            Key::Tab => return self.open_menu(),
            Key::Up => view.scroll = view.scroll.saturating_sub(1),
            Key::Down => view.scroll = view.scroll.saturating_add(1),
            Key::PageUp => view.scroll = view.scroll.saturating_sub(10),
            Key::PageDown => view.scroll = view.scroll.saturating_add(10),
            Key::Home => view.scroll = 0,
            _ => {}
        }
        Vec::new()
    }

    /// Interpret an action. Actions with unresolved inputs open a form and
    /// resume on submission.
    pub fn dispatch(&mut self, mut action: Action) -> Vec<Outcome> {
        let unresolved: Vec<Input> = action
            .inputs
            .iter()
            .filter(|input| !self.inputs.iter().any(|(name, _)| *name == input.name))
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            let title = action.display_title().to_string();
            action.inputs = unresolved.clone();
            self.overlay = Some(Overlay::Form {
                form: Form::new(title, unresolved),
                pending: Pending::Action(action),
            });
            self.sync_form_viewport();
            return Vec::new();
        }
        let bindings = self.bindings();
        self.perform(action, &bindings)
    }

    /// Environment and frame inputs; form values are layered on top.
    fn bindings(&self) -> Bindings {
        Bindings::new()
            .with_env(Arc::clone(&self.env))
            .with_inputs(self.inputs.clone())
    }

    /// Substitute `bindings` into `action` in one pass, then interpret it.
    fn perform(&mut self, mut action: Action, bindings: &Bindings) -> Vec<Outcome> {
        bindings.apply_action(&mut action);
        debug!(runner = %self.id, action_type = action.kind.type_name(), "dispatching action");
        match self.interpret(action) {
            Ok(outcomes) => outcomes,
            Err(err) => {
                self.show_error(&err);
                Vec::new()
            }
        }
    }

    fn interpret(&mut self, action: Action) -> Result<Vec<Outcome>> {
        Ok(match action.kind {
            ActionKind::Copy { text } => vec![Outcome::Copy(text)],
            ActionKind::Open { target } => {
                vec![Outcome::Open(self.base.resolve_target(&target, &self.env)?)]
            }
            ActionKind::Reload => self.request_load(),
            ActionKind::Exit => vec![Outcome::Quit],
            ActionKind::Push { page } => vec![Outcome::Push(self.source_generator(page)?)],
            ActionKind::Fetch { request } => vec![Outcome::Push(self.request_generator(request)?)],
            ActionKind::Read { path } => {
                self.base.require_dir("read a file")?;
                let path = self.base.resolve_path(&path, &self.env)?;
                vec![Outcome::Push(Generator::file(path))]
            }
            ActionKind::Run {
                mut command,
                on_success,
            } => {
                expand_command(&mut command, &self.base, &self.env, "run a command")?;
                match on_success.unwrap_or(OnSuccess::Exit) {
                    OnSuccess::Push => vec![Outcome::Push(Generator::command(command))],
                    OnSuccess::Reload => vec![Outcome::Spawn(TaskKind::RunOnce { command })],
                    OnSuccess::Replace => self.replace_generator(Generator::command(command))?,
                    OnSuccess::Exit => vec![Outcome::Exec(command)],
                }
            }
        })
    }

    fn request_generator(&self, mut request: Request) -> Result<Generator> {
        request.url = self.base.resolve_url(&request.url)?.into();
        Generator::http(request)
    }

    fn source_generator(&self, source: PageSource) -> Result<Generator> {
        match source {
            PageSource::Path(path) if !self.base.is_file() => {
                self.request_generator(Request::get(path))
            }
            PageSource::Path(path) => {
                let path = self.base.resolve_path(&path, &self.env)?;
                Ok(Generator::file(Path::new(&path)))
            }
            PageSource::Request(request) => self.request_generator(request),
            PageSource::Command(mut command) => {
                expand_command(&mut command, &self.base, &self.env, "run a command")?;
                Ok(Generator::command(command))
            }
        }
    }

    /// Swap the generator in place and refresh. Results of the old
    /// generator still in flight are discarded.
    fn replace_generator(&mut self, generator: Generator) -> Result<Vec<Outcome>> {
        self.base = generator.base(&self.env)?;
        self.generator = generator;
        self.epoch += 1;
        self.in_flight = false;
        self.queued = None;
        Ok(self.request_load())
    }
}
