//! Command implementations.
//!
//! `offline` commands work on files only; `session` commands drive the chat
//! client through the task runner.
//!
//! CHANGELOG:
//! - 10/05/2026 - Initial module structure

pub mod offline;
pub mod session;

use anyhow::{Context, Result};
use bainian_core::Config;
use std::path::Path;

/// Message template from `--message`, `--message-file`, or the config default.
pub fn message_template(
    message: Option<String>,
    message_file: Option<&Path>,
    config: &Config,
) -> Result<String> {
    if let Some(message) = message {
        return Ok(message);
    }
    if let Some(path) = message_file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read message file {}", path.display()));
    }
    Ok(config.dispatch.message_template.clone())
}
