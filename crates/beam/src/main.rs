//! beam CLI
//!
//! Renders pages produced by scripts, HTTP endpoints and files. Without a
//! subcommand the root list from the configuration is shown. When stdout is
//! not a terminal the root page is printed as JSON instead.

mod root;

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use beam_core::config::Config;
use beam_core::environment::Environment;
use beam_core::generator::{FileFormat, decode_page};
use beam_core::location::BaseLocation;
use beam_core::logging::{LogConfig, LogFormat, init_logging};
use beam_core::page::{Body, Command, Request};
use beam_core::platform::{Platform, SystemPlatform};
use beam_core::tui::{AppConfig, run_tui};
use beam_core::validate::SchemaValidator;
use beam_core::{Generator, GeneratorContext, Paginator};
use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "beam",
    version,
    about = "Render pages produced by scripts, endpoints and files"
)]
struct Cli {
    /// Config file (default: $BEAM_CONFIG, ./beam.toml upwards, user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log output format: pretty or json
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<String>,

    /// Append logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the page printed by a command
    Run {
        /// Command line; a single argument is word-split
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
    /// Show a page file (.json, .yaml, .yml), or a JSON page from stdin
    Read { file: Option<PathBuf> },
    /// Show the page returned by an HTTP endpoint
    Fetch {
        url: String,
        /// Request method
        #[arg(short = 'X', long, value_name = "METHOD")]
        method: Option<String>,
        /// Header as `name: value`, repeatable
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
        /// Request body
        #[arg(short = 'd', long = "data", value_name = "BODY")]
        data: Option<String>,
    },
    /// Check a page from a file or stdin
    Validate { file: Option<PathBuf> },
    /// Copy text (or stdin) to the clipboard
    Copy { text: Option<String> },
    /// Open a URL or path with the default handler
    Open { target: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let env = Arc::new(Environment::capture());
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load(&env).context("failed to load config")?.0,
    };
    init_logging(&log_config(&cli, &config)?).context("failed to initialize logging")?;

    let command = cli.command;
    match command {
        None => {
            let generator = root::root_generator(&config, &env)?;
            show(generator, &config, env)
        }
        Some(Commands::Run { argv }) => {
            let command = match argv.as_slice() {
                [line] => Command::parse_line(line)?,
                _ => Command::argv(argv)?,
            };
            show(Generator::command(command), &config, env)
        }
        Some(Commands::Read { file: Some(file) }) => show(Generator::file(file), &config, env),
        Some(Commands::Read { file: None }) => {
            let bytes = read_stdin()?;
            let base = BaseLocation::directory(env.cwd(), &env)?;
            let page = decode_page(&bytes, &SchemaValidator, &base, &env)
                .context("failed to read page from stdin")?;
            show(Generator::fixed(page, base), &config, env)
        }
        Some(Commands::Fetch {
            url,
            method,
            headers,
            data,
        }) => {
            let request = build_request(url, method, &headers, data)?;
            show(Generator::http(request)?, &config, env)
        }
        Some(Commands::Validate { file }) => validate(file.as_deref(), &env),
        Some(Commands::Copy { text }) => {
            let text = match text {
                Some(text) => text,
                None => String::from_utf8(read_stdin()?).context("stdin is not valid UTF-8")?,
            };
            SystemPlatform.copy_to_clipboard(&text)?;
            Ok(0)
        }
        Some(Commands::Open { target }) => {
            let target = if target.contains("://") || Path::new(&target).is_absolute() {
                target
            } else {
                env.cwd().join(&target).display().to_string()
            };
            SystemPlatform.open_target(&target)?;
            Ok(0)
        }
    }
}

fn log_config(cli: &Cli, config: &Config) -> Result<LogConfig> {
    let format = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.general.log_format)
        .parse::<LogFormat>()?;
    Ok(LogConfig {
        level: cli
            .log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone()),
        format,
        file: cli.log_file.clone().or_else(|| config.general.log_file.clone()),
    })
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    std::io::stdin()
        .read_to_end(&mut bytes)
        .context("failed to read stdin")?;
    Ok(bytes)
}

fn build_request(
    url: String,
    method: Option<String>,
    headers: &[String],
    data: Option<String>,
) -> Result<Request> {
    let mut request = Request::get(url);
    request.method = method;
    for header in headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("invalid header `{header}`, expected `name: value`");
        };
        request
            .headers
            .insert(name.trim().to_string(), value.trim().to_string());
    }
    request.body = data.map(Body);
    Ok(request)
}

fn validate(file: Option<&Path>, env: &Environment) -> Result<i32> {
    let (bytes, base) = match file {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let bytes = FileFormat::from_path(path)?.to_json(bytes)?;
            let absolute = env.cwd().join(path);
            (bytes, BaseLocation::parent_of(&absolute, env)?)
        }
        None => (read_stdin()?, BaseLocation::directory(env.cwd(), env)?),
    };
    decode_page(&bytes, &SchemaValidator, &base, env)?;
    println!("ok");
    Ok(0)
}

/// Show a page: the interactive UI on a terminal, the expanded page JSON
/// otherwise.
fn show(generator: Generator, config: &Config, env: Arc<Environment>) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let ctx = GeneratorContext::new(
        Arc::clone(&env),
        Arc::new(SchemaValidator),
        config.general.shell.clone(),
        config.http.client()?,
    );

    if !std::io::stdout().is_terminal() {
        debug!(generator = generator.kind_name(), "stdout is not a terminal, printing page");
        let page = runtime.block_on(generator.load(&ctx.bindings(), &ctx))?;
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(0);
    }

    let paginator = Paginator::new(
        generator,
        env,
        Box::new(SystemPlatform),
        config.general.title.clone(),
    )?;
    let app_config = AppConfig {
        tick: Duration::from_millis(config.ui.tick_ms),
        show_accessories: config.ui.show_accessories,
    };
    let code = run_tui(paginator, ctx, runtime.handle().clone(), app_config)?;
    // Outstanding tasks are abandoned.
    runtime.shutdown_background();
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "beam",
            "fetch",
            "https://x.test/page.json",
            "-X",
            "POST",
            "-H",
            "Accept: application/json",
            "-d",
            "{}",
        ])
        .unwrap();
        let Some(Commands::Fetch {
            url,
            method,
            headers,
            data,
        }) = cli.command
        else {
            panic!("expected fetch");
        };
        let request = build_request(url, method, &headers, data).unwrap();
        assert_eq!(request.method(), "POST");
        assert_eq!(request.headers["Accept"], "application/json");
        assert_eq!(request.body, Some(Body("{}".into())));
    }

    #[test]
    fn run_keeps_hyphenated_arguments() {
        let cli = Cli::try_parse_from(["beam", "run", "ls", "-la"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Run { argv }) if argv == ["ls", "-la"]
        ));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(build_request("https://x.test".into(), None, &["nope".into()], None).is_err());
    }

    #[test]
    fn log_flags_override_config() {
        let cli = Cli::try_parse_from(["beam", "--log-level", "debug", "--log-format", "json"])
            .unwrap();
        let config = log_config(&cli, &Config::default()).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }
}
