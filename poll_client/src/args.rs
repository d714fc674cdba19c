//! Command-line arguments for the poll client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use poll_client::config::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_READ_TIMEOUT_MS};
use poll_common::net::DEFAULT_BASE_URL;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base address of the poll backend.
    #[clap(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Read timeout of the live-results socket, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_READ_TIMEOUT_MS)]
    pub read_timeout_ms: u64,

    /// Time allowed for opening the live-results socket, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,
}
