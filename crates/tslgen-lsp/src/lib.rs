//! tslgen language server
//!
//! LSP server for the primitive and extension data files of the TSL and TVL
//! code generators, providing:
//! - Completions (new documents, sequence entries, missing fields)
//! - Diagnostics (parse errors, missing and redundant schema fields)
//! - Document outline (primitives grouped by target extension)
//! - Generated-code preview and daemon-driven builds, as commands

pub mod completion;
pub mod config;
pub mod ctype;
pub mod daemon;
pub mod diagnostics;
pub mod navigator;
pub mod preview;
pub mod profile;
pub mod project;
mod server;
pub mod symbols;

pub use server::{
    BUILD_COMMAND, KILL_DAEMON_COMMAND, PREVIEW_COMMAND, TslgenLanguageServer, Workspace, run,
};
