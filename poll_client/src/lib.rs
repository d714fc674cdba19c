//! Live poll client.
//!
//! Lists polls, creates and deletes them, submits votes and keeps a live tally of
//! the currently open poll. The pieces, leaves first:
//! - `api`: `PollApi` request/response calls and their `reqwest` implementation.
//! - `transport`: `ResultTransport` for the live-results socket, over `tungstenite`.
//! - `catalog`: `PollCatalog`, the list of available polls.
//! - `channel`: `ResultChannel`, the lifecycle of the single live-results subscription.
//! - `view`: `LiveView`, what the front-end shows for the open poll.
//! - `session`: `PollSession`, the controller tying selection, subscription and requests together.
//! - `config`: `ClientConfig` built from command-line arguments.
//! - `console`: terminal commands and rendering used by the `poll_client` binary.
#![warn(missing_docs)]
pub mod api;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod console;
pub mod session;
pub mod transport;
pub mod view;

pub use channel::{ResultChannel, SubscriptionHandle, SubscriptionState};
pub use config::ClientConfig;
pub use session::{PollSession, SessionNotice};
pub use view::{LiveStatus, LiveView};
