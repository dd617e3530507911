//! Generators: producers of raw page bytes.
//!
//! A generator turns an external source (a process, an HTTP endpoint, a
//! page file, or an in-process page) into JSON bytes expected to decode as a
//! [`Page`]. [`decode_page`] then validates, decodes and expands the result
//! against the generator's base location.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::environment::{Environment, HOST_MARKER_VAR};
use crate::error::{Error, Result};
use crate::expand::expand_page;
use crate::location::BaseLocation;
use crate::page::{Command, Exec, Page, Request};
use crate::template::{Bindings, Escape};
use crate::validate::PageValidator;

/// Shared, read-only collaborators every invocation needs.
#[derive(Clone)]
pub struct GeneratorContext {
    pub env: Arc<Environment>,
    pub validator: Arc<dyn PageValidator>,
    /// Shell used for bare-string command lines.
    pub shell: String,
    pub http: reqwest::Client,
}

impl std::fmt::Debug for GeneratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorContext")
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

impl GeneratorContext {
    #[must_use]
    pub fn new(
        env: Arc<Environment>,
        validator: Arc<dyn PageValidator>,
        shell: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            env,
            validator,
            shell: shell.into(),
            http,
        }
    }

    /// Bindings seeded with this context's environment.
    #[must_use]
    pub fn bindings(&self) -> Bindings {
        Bindings::new().with_env(Arc::clone(&self.env))
    }
}

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub stdin: Option<String>,
}

impl ProcessSpec {
    /// Resolve a command descriptor; shell lines run as `<shell> -c <line>`.
    pub fn from_command(command: &Command, shell: &str) -> Result<Self> {
        let (program, args) = match &command.exec {
            Exec::Shell(line) => (shell.to_string(), vec!["-c".to_string(), line.clone()]),
            Exec::Argv(argv) => match argv.split_first() {
                Some((program, args)) => (program.clone(), args.to_vec()),
                None => return Err(Error::CommandLine("empty command".to_string())),
            },
        };
        Ok(Self {
            program,
            args,
            dir: command.dir.as_ref().map(PathBuf::from),
            stdin: command.input.clone(),
        })
    }

    /// Human-readable command line for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|word| shell_words::quote(word).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Run a process to completion and return its stdout. A non-zero exit is an
/// error carrying the exit code and the captured stderr.
pub async fn run_process(spec: &ProcessSpec) -> Result<Vec<u8>> {
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .env(HOST_MARKER_VAR, "1")
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| Error::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(err) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %err, "child closed stdin early");
            }
        });
    }

    let output = child.wait_with_output().await?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(Error::CommandFailed {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Issue a request and return the body. Non-2xx statuses are errors
/// carrying the status line.
pub async fn send_request(request: &Request, client: &reqwest::Client) -> Result<Vec<u8>> {
    let url = Url::parse(&request.url).map_err(|err| Error::Url {
        url: request.url.clone(),
        reason: err.to_string(),
    })?;
    let method = reqwest::Method::from_bytes(request.method().as_bytes()).map_err(|_| {
        Error::Url {
            url: request.url.clone(),
            reason: format!("invalid method `{}`", request.method()),
        }
    })?;
    let mut builder = client.request(method, url);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.0.clone());
    }
    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus(status.to_string()));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Page file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            _ => Err(Error::UnsupportedFileType(path.to_path_buf())),
        }
    }

    /// Normalize file contents to JSON bytes.
    pub fn to_json(self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Self::Json => Ok(bytes),
            Self::Yaml => {
                let value: Value = serde_yaml::from_slice(&bytes)?;
                Ok(serde_json::to_vec(&value)?)
            }
        }
    }
}

/// Runs a command and reads the page from its stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandGenerator {
    pub command: Command,
}

/// Requests the page from an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpGenerator {
    pub request: Request,
    base: BaseLocation,
}

impl HttpGenerator {
    pub fn new(request: Request) -> Result<Self> {
        let url = Url::parse(&request.url).map_err(|err| Error::Url {
            url: request.url.clone(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            base: BaseLocation::for_request(&url),
            request,
        })
    }
}

/// Reads the page from a JSON or YAML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGenerator {
    pub path: PathBuf,
}

/// Serves a page assembled in-process.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticGenerator {
    pub page: Page,
    pub base: BaseLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generator {
    Command(CommandGenerator),
    Http(HttpGenerator),
    File(FileGenerator),
    Static(StaticGenerator),
}

impl Generator {
    /// Command generator. A missing working directory means the
    /// environment's current directory.
    #[must_use]
    pub fn command(command: Command) -> Self {
        Self::Command(CommandGenerator { command })
    }

    pub fn http(request: Request) -> Result<Self> {
        HttpGenerator::new(request).map(Self::Http)
    }

    /// File generator; relative paths are taken from the current directory.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(FileGenerator { path: path.into() })
    }

    #[must_use]
    pub fn fixed(page: Page, base: BaseLocation) -> Self {
        Self::Static(StaticGenerator { page, base })
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Http(_) => "http",
            Self::File(_) => "file",
            Self::Static(_) => "static",
        }
    }

    /// Base location for the pages this generator produces.
    pub fn base(&self, env: &Environment) -> Result<BaseLocation> {
        match self {
            Self::Command(generator) => match &generator.command.dir {
                Some(dir) => BaseLocation::directory(Path::new(dir), env),
                None => BaseLocation::directory(env.cwd(), env),
            },
            Self::Http(generator) => Ok(generator.base.clone()),
            Self::File(generator) => {
                let path = absolute(&generator.path, env);
                BaseLocation::parent_of(&path, env)
            }
            Self::Static(generator) => Ok(generator.base.clone()),
        }
    }

    /// Produce raw page bytes. `bindings` supplies `${query}`, frame
    /// inputs and the environment.
    pub async fn generate(&self, bindings: &Bindings, ctx: &GeneratorContext) -> Result<Vec<u8>> {
        match self {
            Self::Command(generator) => {
                let mut command = generator.command.clone();
                bindings.apply_command(&mut command);
                if command.dir.is_none() {
                    command.dir = Some(ctx.env.cwd().display().to_string());
                }
                let spec = ProcessSpec::from_command(&command, &ctx.shell)?;
                debug!(command = %spec.display(), "running generator command");
                run_process(&spec).await
            }
            Self::Http(generator) => {
                let mut request = generator.request.clone();
                bindings.apply_request(&mut request);
                debug!(url = %request.url, method = request.method(), "requesting page");
                send_request(&request, &ctx.http).await
            }
            Self::File(generator) => {
                let path = bindings.substitute(&generator.path.display().to_string(), Escape::Raw);
                let path = absolute(Path::new(&path), &ctx.env);
                let format = FileFormat::from_path(&path)?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| Error::ReadFile {
                        path: path.clone(),
                        source,
                    })?;
                format.to_json(bytes)
            }
            Self::Static(generator) => generator.page.to_vec(),
        }
    }

    /// Generate and decode in one step.
    pub async fn load(&self, bindings: &Bindings, ctx: &GeneratorContext) -> Result<Page> {
        let started = Instant::now();
        let base = self.base(&ctx.env)?;
        let result = match self.generate(bindings, ctx).await {
            Ok(bytes) => {
                let len = bytes.len();
                decode_page(&bytes, ctx.validator.as_ref(), &base, &ctx.env).map(|page| (page, len))
            }
            Err(err) => Err(err),
        };
        match result {
            Ok((page, bytes)) => {
                debug!(
                    kind = self.kind_name(),
                    base = %base,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generator finished"
                );
                Ok(page)
            }
            Err(err) => {
                warn!(kind = self.kind_name(), base = %base, error = %err, "generator failed");
                Err(err)
            }
        }
    }
}

fn absolute(path: &Path, env: &Environment) -> PathBuf {
    let text = path.display().to_string();
    if let Some(expanded) = env.expand_home(&text) {
        expanded
    } else if path.is_absolute() {
        path.to_path_buf()
    } else {
        env.cwd().join(path)
    }
}

/// Validate, decode and expand raw page bytes.
///
/// Partial or malformed output is a decode failure; nothing is applied.
pub fn decode_page(
    bytes: &[u8],
    validator: &dyn PageValidator,
    base: &BaseLocation,
    env: &Environment,
) -> Result<Page> {
    let value: Value = serde_json::from_slice(bytes)?;
    validator.validate(&value)?;
    let mut page: Page = serde_json::from_value(value)?;
    page.check_structure()?;
    expand_page(&mut page, base, env)?;
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{ActionKind, Detail, List, ListItem};
    use crate::validate::SchemaValidator;

    fn ctx(cwd: &Path) -> GeneratorContext {
        let env = Environment::builder()
            .var("GREETING", "hello")
            .home("/home/user")
            .cwd(cwd)
            .build();
        GeneratorContext::new(
            Arc::new(env),
            Arc::new(SchemaValidator),
            "sh",
            reqwest::Client::new(),
        )
    }

    #[test]
    fn process_spec_wraps_shell_lines() {
        let spec = ProcessSpec::from_command(&Command::shell("echo hi | wc -c"), "bash").unwrap();
        assert_eq!(spec.program, "bash");
        assert_eq!(spec.args, vec!["-c", "echo hi | wc -c"]);

        let spec =
            ProcessSpec::from_command(&Command::argv(["ls", "-l"]).unwrap().with_dir("/tmp"), "sh")
                .unwrap();
        assert_eq!(spec.program, "ls");
        assert_eq!(spec.args, vec!["-l"]);
        assert_eq!(spec.dir, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn file_format_by_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.json")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("a.yml")).unwrap(), FileFormat::Yaml);
        assert_eq!(FileFormat::from_path(Path::new("a.yaml")).unwrap(), FileFormat::Yaml);
        assert!(matches!(
            FileFormat::from_path(Path::new("a.txt")),
            Err(Error::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn yaml_is_normalized_to_json() {
        let json = FileFormat::Yaml
            .to_json(b"type: list\nitems:\n  - title: A\n".to_vec())
            .unwrap();
        let value: Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["items"][0]["title"], "A");
    }

    #[test]
    fn decode_rejects_partial_output() {
        let base = BaseLocation::parse("file:///tmp/").unwrap();
        let env = Environment::builder().build();
        let err = decode_page(br#"{"type":"list","items":[{"ti"#, &SchemaValidator, &base, &env)
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn decode_runs_validation_before_decoding() {
        let base = BaseLocation::parse("file:///tmp/").unwrap();
        let env = Environment::builder().build();
        let err = decode_page(br#"{"type":"list","items":[{}]}"#, &SchemaValidator, &base, &env)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn static_base_is_explicit() {
        let base = BaseLocation::parse("file:///srv/").unwrap();
        let generator = Generator::fixed(Page::List(List::default()), base.clone());
        assert_eq!(generator.base(&Environment::default()).unwrap(), base);
    }

    #[tokio::test]
    async fn command_generator_reads_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let generator = Generator::command(Command::shell(
            r#"echo '{"type":"list","items":[{"title":"A"}]}'"#,
        ));
        let page = generator.load(&ctx.bindings(), &ctx).await.unwrap();
        let Page::List(list) = page else {
            panic!("expected list");
        };
        assert_eq!(list.items, vec![ListItem::new("A")]);
    }

    #[tokio::test]
    async fn command_failure_carries_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let generator = Generator::command(Command::shell("echo boom >&2; exit 2"));
        let err = generator.load(&ctx.bindings(), &ctx).await.unwrap_err();
        match err {
            Error::CommandFailed { code, stderr } => {
                assert_eq!(code, 2);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn command_receives_stdin_query_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let command = Command::shell(
            r#"read line; printf '{"type":"detail","text":"%s %s %s"}' "$line" ${query} "$BEAM""#,
        )
        .with_input("from-stdin\n");
        let bindings = ctx.bindings().with_query("q");
        let page = Generator::command(command).load(&bindings, &ctx).await.unwrap();
        let Page::Detail(Detail { text, .. }) = page else {
            panic!("expected detail");
        };
        assert_eq!(text.as_deref(), Some("from-stdin q 1"));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let command = Command::argv(["definitely-not-a-real-program-beam"]).unwrap();
        let err = Generator::command(command)
            .load(&ctx.bindings(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn file_generator_expands_against_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.yaml");
        std::fs::write(
            &path,
            "type: list\nitems:\n  - title: A\n    actions:\n      - type: read\n        path: next.json\n",
        )
        .unwrap();
        let ctx = ctx(dir.path());
        let page = Generator::file(&path).load(&ctx.bindings(), &ctx).await.unwrap();
        let Page::List(list) = page else {
            panic!("expected list");
        };
        let expected = dir.path().join("next.json").display().to_string();
        assert_eq!(
            list.items[0].actions[0].kind,
            ActionKind::Read { path: expected }
        );
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let err = Generator::file(dir.path().join("nope.json"))
            .load(&ctx.bindings(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReadFile { .. }));
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let err = Generator::file(dir.path().join("page.txt"))
            .load(&ctx.bindings(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
    }

    /// Serve one HTTP exchange on a loopback port. The handle yields the raw
    /// request as received.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                received.extend_from_slice(&chunk[..n]);
                if n == 0 || request_complete(&received) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn request_complete(bytes: &[u8]) -> bool {
        let text = String::from_utf8_lossy(bytes);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    fn http_ctx() -> GeneratorContext {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        GeneratorContext::new(
            Arc::new(Environment::builder().build()),
            Arc::new(SchemaValidator),
            "sh",
            client,
        )
    }

    #[tokio::test]
    async fn http_generator_substitutes_and_decodes() {
        let (origin, server) = serve_once(
            "200 OK",
            r#"{"type":"list","items":[{"title":"A","actions":[{"type":"push","page":"next.json"}]}]}"#,
        )
        .await;
        let mut request = Request::get(format!("{origin}/pages/index.json?q=${{query}}"));
        request.method = Some("POST".into());
        request
            .headers
            .insert("X-Token".into(), "${input:token}".into());
        request.body = Some(crate::page::Body("token=${input:token}".into()));
        let ctx = http_ctx();
        let bindings = ctx
            .bindings()
            .with_query("a b&c")
            .with_input("token", "x y");

        let page = Generator::http(request)
            .unwrap()
            .load(&bindings, &ctx)
            .await
            .unwrap();
        let received = server.await.unwrap();

        assert!(
            received.starts_with("POST /pages/index.json?q=a+b%26c HTTP/1.1\r\n"),
            "{received}"
        );
        assert!(received.to_ascii_lowercase().contains("\r\nx-token: x y\r\n"), "{received}");
        assert!(received.ends_with("\r\n\r\ntoken=x y"), "{received}");

        let Page::List(list) = page else {
            panic!("expected list");
        };
        assert_eq!(list.items[0].title, "A");
        assert_eq!(
            list.items[0].actions[0].kind,
            ActionKind::Push {
                page: crate::page::PageSource::Request(Request::get(format!(
                    "{origin}/pages/next.json"
                ))),
            }
        );
    }

    #[tokio::test]
    async fn http_error_status_is_a_generator_failure() {
        let (origin, server) = serve_once("404 Not Found", "").await;
        let ctx = http_ctx();
        let err = Generator::http(Request::get(format!("{origin}/missing.json")))
            .unwrap()
            .load(&ctx.bindings(), &ctx)
            .await
            .unwrap_err();
        let received = server.await.unwrap();
        assert!(received.starts_with("GET /missing.json HTTP/1.1\r\n"), "{received}");
        match err {
            Error::HttpStatus(status) => assert_eq!(status, "404 Not Found"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
