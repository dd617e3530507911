//! Terminal frontend (feature `tui`).
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ App (event loop, main thread)                │
//! │   views ◀── Paginator ◀── Msg (keys, resize, │
//! │                │           completions)      │
//! │                ▼                             │
//! │             Effect ──▶ tokio tasks / handoff │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Rendering reads the top runner only; all state changes go through
//! [`Paginator::handle`](crate::paginator::Paginator::handle).

// One-writer output gate consulted by the logging layer.
pub mod output_gate;

// Terminal ownership: enter/leave lifecycle with RAII teardown.
pub mod terminal_session;

// Hands the terminal to a process for `run` actions that exit.
pub mod command_handoff;

mod app;
mod views;

pub use app::{App, AppConfig, TuiError, TuiResult, run_tui};
pub use views::{RenderOptions, render_runner};
