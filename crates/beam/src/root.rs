//! Root list shown by `beam` without a subcommand.

use std::path::Path;

use anyhow::{Context, Result};
use beam_core::config::Config;
use beam_core::environment::Environment;
use beam_core::location::BaseLocation;
use beam_core::page::{Action, List, ListItem, Page};
use beam_core::Generator;

/// Page files picked up from the working directory, in priority order.
pub const MANIFEST_NAMES: &[&str] = &["beam.json", "beam.yaml", "beam.yml"];

/// First manifest present in `dir`.
pub fn find_manifest(dir: &Path) -> Option<&'static str> {
    MANIFEST_NAMES
        .iter()
        .copied()
        .find(|name| dir.join(name).is_file())
}

/// The root page: config `[[root]]` entries followed by the local
/// manifest, if any.
pub fn root_page(config: &Config, env: &Environment) -> Result<Page> {
    let mut items = config
        .root
        .iter()
        .map(|entry| {
            entry
                .to_item()
                .with_context(|| format!("invalid root entry `{}`", entry.title))
        })
        .collect::<Result<Vec<ListItem>>>()?;

    if let Some(name) = find_manifest(env.cwd()) {
        let mut item = ListItem::new(name)
            .with_id(format!("manifest:{name}"))
            .with_action(Action::read(name).with_title("Open"));
        item.subtitle = Some(env.cwd().display().to_string());
        items.push(item);
    }

    Ok(Page::List(List {
        title: config.general.title.clone(),
        items,
        empty_text: Some(
            "No pages configured. Add [[root]] entries to beam.toml or create beam.json here."
                .to_string(),
        ),
        ..List::default()
    }))
}

pub fn root_generator(config: &Config, env: &Environment) -> Result<Generator> {
    let page = root_page(config, env)?;
    let base = BaseLocation::directory(env.cwd(), env)?;
    Ok(Generator::fixed(page, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beam_core::page::ActionKind;

    fn env(cwd: &Path) -> Environment {
        Environment::builder().cwd(cwd).build()
    }

    #[test]
    fn config_entries_become_items() {
        let config = Config::from_toml_str(
            r#"
            [[root]]
            title = "Git"
            command = "git-pages --all"

            [[root]]
            title = "Docs"
            url = "https://docs.test/index.json"
            "#,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let Page::List(list) = root_page(&config, &env(dir.path())).unwrap() else {
            panic!("root page is a list");
        };
        assert_eq!(list.title, "Beam");
        let titles: Vec<_> = list.items.iter().map(|item| item.title.as_str()).collect();
        assert_eq!(titles, ["Git", "Docs"]);
        assert!(matches!(
            list.items[0].actions[0].kind,
            ActionKind::Push { .. }
        ));
    }

    #[test]
    fn manifest_in_cwd_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("beam.yaml"), "type: list\n").unwrap();
        let Page::List(list) = root_page(&Config::default(), &env(dir.path())).unwrap() else {
            panic!("root page is a list");
        };
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].title, "beam.yaml");
        assert!(matches!(
            &list.items[0].actions[0].kind,
            ActionKind::Read { path } if path == "beam.yaml"
        ));
    }

    #[test]
    fn json_manifest_wins_over_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("beam.json"), "{}").unwrap();
        std::fs::write(dir.path().join("beam.yml"), "").unwrap();
        assert_eq!(find_manifest(dir.path()), Some("beam.json"));
    }
}
