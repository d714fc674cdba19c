//!
//! Common types and utilities shared by the poll client and its tests.
//!
//! This crate aggregates:
//! - `error`: unified error type `PollError` used across the workspace.
//! - `result`: handy `Result<T, PollError>` alias.
//! - `model`: polls, choices, tallies and request payloads exchanged with the backend.
//! - `envelope`: decoding of server-pushed live-result messages.
//! - `net`: backend address constant and endpoint construction.
#![warn(missing_docs)]
pub mod envelope;
pub mod error;
pub mod model;
pub mod net;
pub mod result;

pub use error::PollError;
pub use model::{ChoiceId, Poll, PollId, ResultSnapshot};
pub use result::Result;
