//! beam-core: page protocol interpreter for beam
//!
//! beam renders interactive pages (lists and detail views) whose content is
//! produced by scripts, HTTP endpoints or files speaking a small JSON
//! contract.
//!
//! # Architecture
//!
//! ```text
//! Generator (command / http / file / static)
//!     → bytes → validate → decode → expand
//!                                     ↓
//!            Paginator [Runner, Runner, ...] ← keys, completions
//!                                     ↓
//!            Effects: spawn task · exec process · quit
//! ```
//!
//! # Modules
//!
//! - `page`: wire model for pages, actions, inputs, commands and requests
//! - `template`: `${input:..}`, `${env:..}` and `${query}` substitution
//! - `location`: base locations and path/URL resolution
//! - `expand`: page expansion after decode
//! - `validate`: page validation seam and the built-in schema check
//! - `generator`: page sources and process/HTTP execution
//! - `form`: input collection overlay
//! - `keymap`: terminal-independent key input and shortcut parsing
//! - `runner`: per-frame state machine
//! - `paginator`: navigation stack and message routing
//! - `task`: asynchronous work units
//! - `platform`: clipboard and opener collaborators
//! - `environment`: process environment snapshot
//! - `config`: TOML configuration
//! - `logging`: tracing subscriber setup
//! - `error`: error taxonomy and remediation hints
//! - `tui`: terminal frontend (feature-gated: `tui`)
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod environment;
pub mod error;
pub mod expand;
pub mod form;
pub mod generator;
pub mod keymap;
pub mod location;
pub mod logging;
pub mod page;
pub mod paginator;
pub mod platform;
pub mod runner;
pub mod task;
pub mod template;
pub mod validate;

#[cfg(feature = "tui")]
pub mod tui;

pub use environment::Environment;
pub use error::{Error, ErrorKind, Remediation, Result};
pub use generator::{Generator, GeneratorContext};
pub use page::{Action, ActionKind, Command, Page};
pub use paginator::{Effect, Msg, Paginator};
