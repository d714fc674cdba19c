//! Error types shared across the workspace.
//!
//! `PollError` covers the client's whole error taxonomy: validation failures that
//! never reach the network, failures of each kind of backend request, and the
//! plumbing errors (I/O, JSON, URLs, channels, locks) those requests can hit.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by the client crates.
#[derive(Error, Debug)]
pub enum PollError {
    /// Client-side precondition failed; nothing was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation that needs an open poll was called from the poll list view.
    #[error("No poll is selected")]
    NoPollSelected,

    /// The live-results subscription could not be established.
    #[error("Connect error: {0}")]
    Connect(String),

    /// Retrieving polls failed.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The backend rejected the vote or could not be reached.
    #[error("Vote error: {0}")]
    Vote(String),

    /// The backend rejected poll creation or could not be reached.
    #[error("Create error: {0}")]
    Create(String),

    /// The backend rejected poll deletion or could not be reached.
    #[error("Delete error: {0}")]
    Delete(String),

    /// I/O error originating from the standard library or sockets.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// The configured backend address is not a usable URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Channel receive failed (e.g., sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl<T> From<PoisonError<T>> for PollError {
    fn from(err: PoisonError<T>) -> Self {
        PollError::MutexLock(err.to_string())
    }
}
