//! Decoding of messages pushed on a live-results subscription.
//!
//! The backend wraps everything it sends in an envelope:
//!
//! ```json
//! {"type": "success", "action": "update", "data": {"poll_id": "…", "results": [{"id": "…", "text": "…", "votes": 3}]}}
//! {"type": "error", "code": "POLL_DELETED", "message": "…"}
//! ```
//!
//! Only `data.results` matters to the client. Everything else (connect
//! acknowledgements, unsubscribe confirmations, error notices) is classified
//! so the caller can log it, and then ignored.
use serde::Deserialize;
use strum_macros::{Display, EnumString};

use crate::error::PollError;
use crate::model::{ChoiceTally, PollId, ResultSnapshot};

/// Error code sent when the subscribed poll is deleted. The server stops
/// broadcasting to the socket but does not close it.
pub const POLL_DELETED: &str = "POLL_DELETED";
/// Error code sent when the subscribed poll does not exist.
pub const POLL_NOT_FOUND: &str = "POLL_NOT_FOUND";

/// Envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MessageKind {
    /// Acknowledgement or broadcast carrying an optional payload.
    Success,
    /// Server-side failure notice with a code and message.
    Error,
}

/// Envelope `action` field of success messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Action {
    /// Socket accepted.
    Connect,
    /// Subscription confirmed; carries the current tally.
    Subscribe,
    /// Subscription dropped.
    Unsubscribe,
    /// Tally changed after a vote.
    Update,
    /// Server is closing the socket.
    Disconnect,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    action: Option<String>,
    data: Option<Payload>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    poll_id: Option<PollId>,
    results: Option<Vec<ChoiceTally>>,
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A full tally for the subscribed poll.
    Snapshot(ResultSnapshot),
    /// The server reported a problem on this subscription.
    ServerError {
        /// Machine-readable code such as `POLL_DELETED`.
        code: String,
        /// Human-readable description.
        message: String,
    },
    /// Well-formed envelope without results for this poll.
    Ignored {
        /// Parsed action, when the envelope had a known one.
        action: Option<Action>,
    },
}

/// Whether an error `code` means the server will send nothing more for the poll.
pub fn ends_subscription(code: &str) -> bool {
    code == POLL_DELETED || code == POLL_NOT_FOUND
}

/// Decode one text frame received on the subscription for `poll_id`.
///
/// Returns an error only when the frame is not a JSON envelope at all.
/// Results addressed to another poll are classified as `Ignored`.
pub fn decode(text: &str, poll_id: &PollId) -> Result<Inbound, PollError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let action = envelope.action.as_deref().and_then(|a| a.parse::<Action>().ok());

    let kind = envelope.kind.as_deref().and_then(|k| k.parse::<MessageKind>().ok());
    if kind == Some(MessageKind::Error) {
        return Ok(Inbound::ServerError {
            code: envelope.code.unwrap_or_default(),
            message: envelope.message.unwrap_or_default(),
        });
    }

    let Some(payload) = envelope.data else {
        return Ok(Inbound::Ignored { action });
    };
    let Some(results) = payload.results else {
        return Ok(Inbound::Ignored { action });
    };
    if payload.poll_id.as_ref().is_some_and(|addressed| addressed != poll_id) {
        return Ok(Inbound::Ignored { action });
    }

    Ok(Inbound::Snapshot(ResultSnapshot {
        poll_id: poll_id.clone(),
        tallies: results,
    }))
}
