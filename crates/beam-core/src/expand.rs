//! Page expansion.
//!
//! Runs on every decoded page before it reaches a runner: fills in default
//! action titles and rewrites every relative reference against the
//! generator's base location, so that actions carry absolute paths and URLs
//! from then on. Processes and file reads are only allowed from local bases.
//!
//! References that still hold `${..}` tokens are left as written; the runner
//! resolves them after substitution at dispatch.

use std::path::Path;

use crate::environment::Environment;
use crate::error::Result;
use crate::location::BaseLocation;
use crate::page::{Action, ActionKind, Command, Detail, Page, PageSource, Preview, Request};

/// Expand `page` in place against `base`.
pub fn expand_page(page: &mut Page, base: &BaseLocation, env: &Environment) -> Result<()> {
    match page {
        Page::List(list) => {
            for action in &mut list.actions {
                expand_action(action, base, env)?;
            }
            for item in &mut list.items {
                for action in &mut item.actions {
                    expand_action(action, base, env)?;
                }
                if let Some(preview) = &mut item.preview {
                    expand_preview(preview, base, env)?;
                }
            }
            Ok(())
        }
        Page::Detail(detail) => expand_detail(detail, base, env),
    }
}

fn expand_detail(detail: &mut Detail, base: &BaseLocation, env: &Environment) -> Result<()> {
    let scoped;
    let base = match &detail.dir {
        Some(dir) => {
            let resolved = base.resolve_path(dir, env)?;
            scoped = BaseLocation::directory(Path::new(&resolved), env)?;
            detail.dir = Some(resolved);
            &scoped
        }
        None => base,
    };
    if let Some(command) = &mut detail.command {
        expand_command(command, base, env, "run a command")?;
    }
    for action in &mut detail.actions {
        expand_action(action, base, env)?;
    }
    Ok(())
}

/// Expand a single action against `base`.
pub fn expand_action(action: &mut Action, base: &BaseLocation, env: &Environment) -> Result<()> {
    if action.title.is_empty() {
        action.title = action.kind.default_title().to_string();
    }
    match &mut action.kind {
        ActionKind::Read { path } => {
            base.require_dir("read a file")?;
            if !is_templated(path) {
                *path = base.resolve_path(path, env)?;
            }
        }
        ActionKind::Run { command, .. } => expand_command(command, base, env, "run a command")?,
        ActionKind::Open { target } if !is_templated(target) => {
            *target = base.resolve_target(target, env)?;
        }
        ActionKind::Open { .. } => {}
        ActionKind::Fetch { request } => expand_request(request, base)?,
        ActionKind::Push { page } => expand_source(page, base, env)?,
        ActionKind::Copy { .. } | ActionKind::Reload | ActionKind::Exit => {}
    }
    Ok(())
}

fn is_templated(text: &str) -> bool {
    text.contains("${")
}

/// Resolve the working directory of a command, defaulting to the base
/// directory itself. A templated directory is kept for a later pass.
pub fn expand_command(
    command: &mut Command,
    base: &BaseLocation,
    env: &Environment,
    what: &str,
) -> Result<()> {
    let dir = base.require_dir(what)?;
    let resolved = match &command.dir {
        Some(sub) if is_templated(sub) => return Ok(()),
        Some(sub) => base.resolve_path(sub, env)?,
        None => dir.display().to_string(),
    };
    command.dir = Some(resolved);
    Ok(())
}

fn expand_request(request: &mut Request, base: &BaseLocation) -> Result<()> {
    if is_templated(&request.url) {
        return Ok(());
    }
    request.url = base.resolve_url(&request.url)?.into();
    Ok(())
}

fn expand_source(source: &mut PageSource, base: &BaseLocation, env: &Environment) -> Result<()> {
    match source {
        PageSource::Path(path) if is_templated(path) => {}
        PageSource::Path(path) if !base.is_file() => {
            // A relative page on a remote base is another request.
            let url = base.resolve_url(path)?;
            *source = PageSource::Request(Request::get(url));
        }
        PageSource::Path(path) => *path = base.resolve_path(path, env)?,
        PageSource::Request(request) => expand_request(request, base)?,
        PageSource::Command(command) => expand_command(command, base, env, "run a command")?,
    }
    Ok(())
}

fn expand_preview(preview: &mut Preview, base: &BaseLocation, env: &Environment) -> Result<()> {
    match preview {
        Preview::Text(_) => Ok(()),
        Preview::Command(command) => expand_command(command, base, env, "run a preview command"),
        Preview::Request(request) => expand_request(request, base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::page::{List, ListItem};

    fn env() -> Environment {
        Environment::builder().home("/home/user").cwd("/work").build()
    }

    fn local() -> BaseLocation {
        BaseLocation::parse("file:///a/b").unwrap()
    }

    fn remote() -> BaseLocation {
        BaseLocation::parse("https://x.test/pages/").unwrap()
    }

    fn list_with(action: Action) -> Page {
        Page::List(List {
            items: vec![ListItem::new("item").with_action(action)],
            ..List::default()
        })
    }

    fn first_action(page: &Page) -> &Action {
        match page {
            Page::List(list) => &list.items[0].actions[0],
            Page::Detail(detail) => &detail.actions[0],
        }
    }

    #[test]
    fn default_titles_are_filled() {
        let mut page = list_with(Action::copy("x"));
        expand_page(&mut page, &local(), &env()).unwrap();
        assert_eq!(first_action(&page).title, "Copy");
    }

    #[test]
    fn read_paths_resolve_against_base() {
        let mut page = list_with(Action::read("c.json"));
        expand_page(&mut page, &local(), &env()).unwrap();
        assert_eq!(
            first_action(&page).kind,
            ActionKind::Read { path: "/a/b/c.json".into() }
        );

        let mut page = list_with(Action::read("~/x"));
        expand_page(&mut page, &local(), &env()).unwrap();
        assert_eq!(
            first_action(&page).kind,
            ActionKind::Read { path: "/home/user/x".into() }
        );
    }

    #[test]
    fn run_commands_get_working_directory() {
        let command = Command::shell("make").with_dir("sub");
        let mut page = list_with(Action::run(command, None));
        expand_page(&mut page, &local(), &env()).unwrap();
        let ActionKind::Run { command, .. } = &first_action(&page).kind else {
            panic!("expected run action");
        };
        assert_eq!(command.dir.as_deref(), Some("/a/b/sub"));

        let mut page = list_with(Action::run(Command::shell("make"), None));
        expand_page(&mut page, &local(), &env()).unwrap();
        let ActionKind::Run { command, .. } = &first_action(&page).kind else {
            panic!("expected run action");
        };
        assert_eq!(command.dir.as_deref(), Some("/a/b"));
    }

    #[test]
    fn run_and_read_are_rejected_on_remote_base() {
        let mut page = list_with(Action::run(Command::shell("ls"), None));
        assert!(matches!(
            expand_page(&mut page, &remote(), &env()),
            Err(Error::Precondition(_))
        ));
        let mut page = list_with(Action::read("/etc/hosts"));
        assert!(matches!(
            expand_page(&mut page, &remote(), &env()),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn fetch_urls_resolve_on_remote_base() {
        let mut page = list_with(Action::new(ActionKind::Fetch {
            request: Request::get("next.json"),
        }));
        expand_page(&mut page, &remote(), &env()).unwrap();
        let ActionKind::Fetch { request } = &first_action(&page).kind else {
            panic!("expected fetch action");
        };
        assert_eq!(request.url, "https://x.test/pages/next.json");
    }

    #[test]
    fn pushed_path_on_remote_base_becomes_request() {
        let mut page = list_with(Action::new(ActionKind::Push {
            page: PageSource::Path("other.json".into()),
        }));
        expand_page(&mut page, &remote(), &env()).unwrap();
        assert_eq!(
            first_action(&page).kind,
            ActionKind::Push {
                page: PageSource::Request(Request::get("https://x.test/pages/other.json"))
            }
        );
    }

    #[test]
    fn detail_dir_scopes_its_actions() {
        let mut page = Page::Detail(Detail {
            text: Some("hi".into()),
            dir: Some("docs".into()),
            actions: vec![Action::read("readme.md")],
            ..Detail::default()
        });
        expand_page(&mut page, &local(), &env()).unwrap();
        assert_eq!(
            first_action(&page).kind,
            ActionKind::Read { path: "/a/b/docs/readme.md".into() }
        );
    }

    #[test]
    fn templated_references_are_left_for_dispatch() {
        let mut page = list_with(Action::read("${input:file}"));
        expand_page(&mut page, &local(), &env()).unwrap();
        assert_eq!(
            first_action(&page).kind,
            ActionKind::Read { path: "${input:file}".into() }
        );

        let mut page = list_with(Action::open("${env:HOME}/notes.md"));
        expand_page(&mut page, &local(), &env()).unwrap();
        assert_eq!(
            first_action(&page).kind,
            ActionKind::Open { target: "${env:HOME}/notes.md".into() }
        );

        let command = Command::shell("make").with_dir("${input:dir}");
        let mut page = list_with(Action::run(command, None));
        expand_page(&mut page, &local(), &env()).unwrap();
        let ActionKind::Run { command, .. } = &first_action(&page).kind else {
            panic!("expected run action");
        };
        assert_eq!(command.dir.as_deref(), Some("${input:dir}"));
    }

    #[test]
    fn templated_read_is_still_rejected_on_remote_base() {
        let mut page = list_with(Action::read("${input:file}"));
        assert!(matches!(
            expand_page(&mut page, &remote(), &env()),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn absolute_open_target_is_identity() {
        let mut page = list_with(Action::open("/tmp/file.txt"));
        expand_page(&mut page, &local(), &env()).unwrap();
        assert_eq!(
            first_action(&page).kind,
            ActionKind::Open { target: "/tmp/file.txt".into() }
        );
    }
}
