//! Base locations and reference resolution.
//!
//! Every frame has a base location, a URL-like root used to resolve the
//! relative paths and URLs its page refers to. Local content has a `file`
//! base (the directory holding the page, or the command's working
//! directory); remote content has an `http(s)` base (the request URL with its
//! last path segment removed). A base always denotes a directory.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::environment::Environment;
use crate::error::{Error, Result};

/// Root against which a frame resolves relative references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseLocation {
    url: Url,
}

impl BaseLocation {
    /// Base for a local directory. Relative directories are taken relative
    /// to the environment's working directory.
    pub fn directory(dir: &Path, env: &Environment) -> Result<Self> {
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            env.cwd().join(dir)
        };
        let url = Url::from_directory_path(&dir).map_err(|()| Error::Url {
            url: dir.display().to_string(),
            reason: "not an absolute directory path".to_string(),
        })?;
        Ok(Self { url })
    }

    /// Base for a local file: the directory that contains it.
    pub fn parent_of(file: &Path, env: &Environment) -> Result<Self> {
        let parent = file.parent().unwrap_or_else(|| Path::new(""));
        Self::directory(parent, env)
    }

    /// Base for content fetched from `url`: the URL with its last path
    /// segment, query and fragment removed.
    #[must_use]
    pub fn for_request(url: &Url) -> Self {
        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);
        if base.scheme() != "file" {
            let dir = match base.path().rfind('/') {
                Some(slash) => base.path()[..=slash].to_string(),
                None => "/".to_string(),
            };
            base.set_path(&dir);
        }
        Self { url: base }
    }

    /// Parse a base from URL text.
    pub fn parse(text: &str) -> Result<Self> {
        let url = Url::parse(text).map_err(|err| Error::Url {
            url: text.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self { url })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether this base denotes local content.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.url.scheme() == "file"
    }

    /// Local directory of a file base.
    #[must_use]
    pub fn dir(&self) -> Option<PathBuf> {
        if self.is_file() {
            // Collecting components drops the trailing separator.
            self.url
                .to_file_path()
                .ok()
                .map(|path| path.components().collect())
        } else {
            None
        }
    }

    /// Local directory, or a precondition error naming `what` for remote bases.
    pub fn require_dir(&self, what: &str) -> Result<PathBuf> {
        self.dir().ok_or_else(|| {
            Error::Precondition(format!(
                "cannot {what} relative to a non-file location ({})",
                self.url
            ))
        })
    }

    fn dir_url(&self) -> Url {
        let mut url = self.url.clone();
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url
    }

    /// Resolve a local path against a file base.
    ///
    /// `~/` paths expand against the home directory, absolute paths and
    /// fully-qualified URLs are returned unchanged.
    pub fn resolve_path(&self, path: &str, env: &Environment) -> Result<String> {
        if is_qualified_url(path) || Path::new(path).is_absolute() {
            return Ok(path.to_string());
        }
        if path.starts_with("~/") {
            return env
                .expand_home(path)
                .map(|p| p.display().to_string())
                .ok_or_else(|| {
                    Error::Precondition(format!("cannot expand `{path}`: home directory unknown"))
                });
        }
        let dir = self.require_dir("resolve a path")?;
        Ok(dir.join(path).display().to_string())
    }

    /// Resolve an `open` target. Relative targets become paths on a file
    /// base and URLs on a remote base.
    pub fn resolve_target(&self, target: &str, env: &Environment) -> Result<String> {
        if self.is_file() || target.starts_with("~/") || Path::new(target).is_absolute() {
            self.resolve_path(target, env)
        } else {
            self.resolve_url(target).map(String::from)
        }
    }

    /// Resolve URL text. Fully-qualified URLs are returned unchanged; on a
    /// remote base, absolute paths resolve against the origin and relative
    /// ones against the base directory.
    pub fn resolve_url(&self, text: &str) -> Result<Url> {
        if is_qualified_url(text) {
            return Url::parse(text).map_err(|err| Error::Url {
                url: text.to_string(),
                reason: err.to_string(),
            });
        }
        if self.is_file() {
            return Err(Error::Precondition(format!(
                "cannot resolve relative url `{text}` against a local location"
            )));
        }
        self.dir_url().join(text).map_err(|err| Error::Url {
            url: text.to_string(),
            reason: err.to_string(),
        })
    }
}

impl fmt::Display for BaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// `scheme://...` with an alphabetic scheme.
#[must_use]
pub fn is_qualified_url(text: &str) -> bool {
    text.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::builder()
            .home("/home/user")
            .cwd("/work")
            .build()
    }

    #[test]
    fn relative_path_joins_file_base() {
        let base = BaseLocation::parse("file:///a/b").unwrap();
        assert_eq!(base.resolve_path("c.json", &env()).unwrap(), "/a/b/c.json");
        let base = BaseLocation::parse("file:///a/b/").unwrap();
        assert_eq!(base.resolve_path("c.json", &env()).unwrap(), "/a/b/c.json");
    }

    #[test]
    fn home_and_absolute_paths() {
        let base = BaseLocation::parse("file:///a/b").unwrap();
        assert_eq!(base.resolve_path("~/x", &env()).unwrap(), "/home/user/x");
        assert_eq!(base.resolve_path("/etc/hosts", &env()).unwrap(), "/etc/hosts");
        assert_eq!(
            base.resolve_path("https://x.test/a", &env()).unwrap(),
            "https://x.test/a"
        );
    }

    #[test]
    fn relative_directory_uses_cwd() {
        let base = BaseLocation::directory(Path::new("sub"), &env()).unwrap();
        assert_eq!(base.dir(), Some(PathBuf::from("/work/sub")));
        assert!(base.is_file());
    }

    #[test]
    fn parent_of_file() {
        let base = BaseLocation::parent_of(Path::new("/a/b/page.json"), &env()).unwrap();
        assert_eq!(base.dir(), Some(PathBuf::from("/a/b")));
    }

    #[test]
    fn request_base_drops_last_segment() {
        let url = Url::parse("https://x.test/a/b/page.json?x=1#f").unwrap();
        let base = BaseLocation::for_request(&url);
        assert_eq!(base.url().as_str(), "https://x.test/a/b/");
        assert!(!base.is_file());
    }

    #[test]
    fn remote_base_resolves_urls() {
        let base = BaseLocation::parse("https://x.test/a/b/").unwrap();
        assert_eq!(
            base.resolve_url("next.json").unwrap().as_str(),
            "https://x.test/a/b/next.json"
        );
        assert_eq!(
            base.resolve_url("/root.json").unwrap().as_str(),
            "https://x.test/root.json"
        );
        assert_eq!(
            base.resolve_url("https://other.test/p").unwrap().as_str(),
            "https://other.test/p"
        );
    }

    #[test]
    fn remote_base_rejects_local_paths() {
        let base = BaseLocation::parse("https://x.test/a/").unwrap();
        let err = base.resolve_path("script.sh", &env()).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(base.require_dir("run a command").is_err());
    }

    #[test]
    fn file_base_rejects_relative_urls() {
        let base = BaseLocation::parse("file:///a/").unwrap();
        assert!(matches!(
            base.resolve_url("page.json"),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn open_target_follows_base_kind() {
        let remote = BaseLocation::parse("https://x.test/a/").unwrap();
        assert_eq!(
            remote.resolve_target("doc.html", &env()).unwrap(),
            "https://x.test/a/doc.html"
        );
        let local = BaseLocation::parse("file:///a/").unwrap();
        assert_eq!(local.resolve_target("doc.html", &env()).unwrap(), "/a/doc.html");
    }

    #[test]
    fn qualified_url_detection() {
        assert!(is_qualified_url("https://x"));
        assert!(is_qualified_url("git+ssh://x"));
        assert!(!is_qualified_url("./a://b"));
        assert!(!is_qualified_url("plain"));
        assert!(!is_qualified_url("://x"));
    }
}
