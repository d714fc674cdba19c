//! Poll data model shared by the catalog, the live-results channel and the session.
//!
//! Everything here is a plain serde type matching the backend's JSON shapes:
//! - `Poll` / `Choice`: what `GET /polls` returns.
//! - `ChoiceTally` / `ResultSnapshot`: a full vote tally pushed over the live feed.
//! - `NewPoll` / `VoteRequest`: request bodies for poll creation and voting.
//! - `PollStats`: live connection count of one poll.
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PollError;

/// Minimum number of choices a poll must offer.
pub const MIN_CHOICES: usize = 2;

/// Opaque poll identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(String);

impl PollId {
    /// Wrap a backend-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        PollId(id.into())
    }

    /// Borrow the raw identifier, e.g. for building URLs.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque choice identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoiceId(String);

impl ChoiceId {
    /// Wrap a backend-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        ChoiceId(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One selectable answer of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Choice identifier, unique within the backend.
    pub id: ChoiceId,
    /// Display text.
    pub text: String,
}

/// A poll as listed by the backend. Choice order is display order.
///
/// The list payload also carries per-choice vote counts; they are not read here
/// because displayed tallies only ever come from live snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    /// Poll identifier.
    pub id: PollId,
    /// Short title shown in the poll list.
    pub title: String,
    /// The question voters answer.
    pub question: String,
    /// Ordered choices.
    pub choices: Vec<Choice>,
}

impl Poll {
    /// Returns `true` if `choice_id` belongs to this poll.
    pub fn has_choice(&self, choice_id: &ChoiceId) -> bool {
        self.choices.iter().any(|c| &c.id == choice_id)
    }
}

/// One row of a live tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTally {
    /// Choice identifier.
    pub id: ChoiceId,
    /// Display text of the choice.
    pub text: String,
    /// Votes counted by the backend so far.
    pub votes: u64,
}

/// Full replacement tally for one poll, as pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSnapshot {
    /// Poll the tally belongs to.
    pub poll_id: PollId,
    /// Ordered tally rows.
    pub tallies: Vec<ChoiceTally>,
}

impl ResultSnapshot {
    /// Vote count for `choice_id`, if the snapshot contains it.
    pub fn votes_for(&self, choice_id: &ChoiceId) -> Option<u64> {
        self.tallies
            .iter()
            .find(|t| &t.id == choice_id)
            .map(|t| t.votes)
    }

    /// Sum of all votes in the snapshot.
    pub fn total_votes(&self) -> u64 {
        self.tallies.iter().map(|t| t.votes).sum()
    }
}

/// Body of `GET /polls/{id}/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollStats {
    /// Poll the figures belong to.
    pub poll_id: PollId,
    /// Live-results connections currently subscribed to the poll.
    pub connection_count: u64,
}

/// Choice text inside a poll creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChoice {
    /// Display text.
    pub text: String,
}

/// Validated body of `POST /polls`.
///
/// Only constructible through [`NewPoll::new`], so holding one means the
/// title, question and choices already passed client-side validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPoll {
    title: String,
    question: String,
    choices: Vec<NewChoice>,
}

impl NewPoll {
    /// Validate the form fields and build a creation request.
    ///
    /// Title, question and every choice must contain non-whitespace text, and at
    /// least [`MIN_CHOICES`] choices are required.
    pub fn new<S: AsRef<str>>(
        title: &str,
        question: &str,
        choice_texts: &[S],
    ) -> Result<Self, PollError> {
        if title.trim().is_empty() {
            return Err(PollError::Validation("title must not be empty".into()));
        }
        if question.trim().is_empty() {
            return Err(PollError::Validation("question must not be empty".into()));
        }
        if choice_texts.len() < MIN_CHOICES {
            return Err(PollError::Validation(format!(
                "a poll needs at least {} choices, got {}",
                MIN_CHOICES,
                choice_texts.len()
            )));
        }
        if let Some(pos) = choice_texts.iter().position(|c| c.as_ref().trim().is_empty()) {
            return Err(PollError::Validation(format!(
                "choice {} must not be empty",
                pos + 1
            )));
        }

        Ok(NewPoll {
            title: title.to_string(),
            question: question.to_string(),
            choices: choice_texts
                .iter()
                .map(|c| NewChoice {
                    text: c.as_ref().to_string(),
                })
                .collect(),
        })
    }

    /// Poll title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Poll question.
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Choices in display order.
    pub fn choices(&self) -> &[NewChoice] {
        &self.choices
    }
}

/// Body of `POST /polls/{id}/vote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Chosen answer.
    pub choice_id: ChoiceId,
    /// Voter identifier; see [`VoteRequest::anonymous`].
    pub username: String,
}

impl VoteRequest {
    /// Build a vote carrying a freshly generated anonymous voter identifier.
    ///
    /// Every call yields a new UUIDv4; identifiers are never stored or reused.
    pub fn anonymous(choice_id: ChoiceId) -> Self {
        VoteRequest {
            choice_id,
            username: Uuid::new_v4().to_string(),
        }
    }
}
