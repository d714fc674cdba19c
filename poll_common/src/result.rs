//! Result type alias shared across the workspace.
//!
//! This module defines a convenient alias that defaults the error type to the
//! common `PollError`, so functions can simply return `Result<T>`.
use crate::error::PollError;

/// Workspace-wide `Result` alias with `PollError` as the default error.
pub type Result<T, E = PollError> = std::result::Result<T, E>;
