//! Fanfuse is a terminal-first chat client that sends one prompt to several
//! remote LLM APIs at once and can synthesize the answers into a single
//! fused response.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the model registry, the fan-out orchestrator, the
//!   selection gate, and the fusion orchestrator.
//! - [`api`] defines the inference-client boundary: request payloads,
//!   the error taxonomy, and the HTTP client implementation.
//! - [`session`] persists the running transcript, with a silent in-memory
//!   fallback when the on-disk store is unavailable.
//! - [`ui`] formats model output for the terminal (markdown, escaping,
//!   code highlighting) and renders response panels.
//! - [`cli`] parses arguments and drives the ask/chat flows.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod session;
pub mod ui;
pub mod utils;
