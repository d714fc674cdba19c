//! What the front-end shows for the open poll.
//!
//! `LiveView` is shared between the session and the snapshot callback it
//! registers on the results channel, behind an `Arc<Mutex<_>>`. Selection
//! changes replace the whole value under one lock, so a reader never sees
//! tallies of a poll other than the selected one.
use chrono::{DateTime, Utc};
use poll_common::model::{ChoiceId, ChoiceTally};
use poll_common::{PollId, ResultSnapshot};
use strum_macros::Display;

/// Health of the live tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Display)]
pub enum LiveStatus {
    /// No poll open.
    #[default]
    #[strum(to_string = "idle")]
    Idle,
    /// Subscription is being established.
    #[strum(to_string = "connecting")]
    Connecting,
    /// Subscription is open; tallies update as snapshots arrive.
    #[strum(to_string = "live")]
    Live,
    /// Subscription ended; tallies stay as last shown but no longer update.
    #[strum(to_string = "not updating ({reason})")]
    Degraded {
        /// Why updates stopped.
        reason: String,
    },
}

/// Display state of the results panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveView {
    /// Poll the panel belongs to; `None` on the poll list.
    pub poll_id: Option<PollId>,
    /// Health of the live tally.
    pub status: LiveStatus,
    /// Last applied tally, in backend order.
    pub results: Vec<ChoiceTally>,
    /// When the last snapshot was applied.
    pub updated_at: Option<DateTime<Utc>>,
    /// Live connections on the poll, as last reported by the backend.
    pub watchers: Option<u64>,
}

impl LiveView {
    /// Votes shown for `choice_id`.
    pub fn votes_for(&self, choice_id: &ChoiceId) -> Option<u64> {
        self.results.iter().find(|t| &t.id == choice_id).map(|t| t.votes)
    }

    /// Switch to `poll_id` with an empty tally.
    pub(crate) fn select(&mut self, poll_id: Option<PollId>) {
        let status = if poll_id.is_some() {
            LiveStatus::Connecting
        } else {
            LiveStatus::Idle
        };
        *self = LiveView {
            poll_id,
            status,
            ..LiveView::default()
        };
    }

    /// Subscription for `poll_id` opened: drop whatever tally is shown.
    pub(crate) fn reset(&mut self, poll_id: &PollId) -> bool {
        if self.poll_id.as_ref() != Some(poll_id) {
            return false;
        }
        self.results.clear();
        self.updated_at = None;
        self.status = LiveStatus::Live;
        true
    }

    /// Replace the tally with `snapshot` if it belongs to the shown poll.
    pub(crate) fn apply(&mut self, snapshot: &ResultSnapshot) -> bool {
        if self.poll_id.as_ref() != Some(&snapshot.poll_id) {
            return false;
        }
        self.results = snapshot.tallies.clone();
        self.updated_at = Some(Utc::now());
        true
    }

    /// Record the backend's connection count for `poll_id`.
    pub(crate) fn set_watchers(&mut self, poll_id: &PollId, count: u64) -> bool {
        if self.poll_id.as_ref() != Some(poll_id) {
            return false;
        }
        self.watchers = Some(count);
        true
    }

    /// Stop presenting the tally as live.
    pub(crate) fn degrade(&mut self, poll_id: &PollId, reason: String) -> bool {
        if self.poll_id.as_ref() != Some(poll_id) {
            return false;
        }
        self.status = LiveStatus::Degraded { reason };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(poll: &str, votes: u64) -> ResultSnapshot {
        ResultSnapshot {
            poll_id: PollId::new(poll),
            tallies: vec![ChoiceTally {
                id: ChoiceId::new("a"),
                text: "A".into(),
                votes,
            }],
        }
    }

    #[test]
    fn select_clears_previous_poll() {
        let mut view = LiveView::default();
        view.select(Some(PollId::new("p1")));
        view.reset(&PollId::new("p1"));
        assert!(view.apply(&snapshot("p1", 4)));

        assert!(view.set_watchers(&PollId::new("p1"), 3));

        view.select(Some(PollId::new("p2")));
        assert!(view.results.is_empty());
        assert_eq!(view.status, LiveStatus::Connecting);
        assert!(view.updated_at.is_none());
        assert!(view.watchers.is_none());
        assert!(!view.set_watchers(&PollId::new("p1"), 5));
    }

    #[test]
    fn foreign_snapshots_are_rejected() {
        let mut view = LiveView::default();
        view.select(Some(PollId::new("p2")));
        assert!(!view.apply(&snapshot("p1", 1)));
        assert!(!view.reset(&PollId::new("p1")));
        assert!(view.results.is_empty());
    }

    #[test]
    fn degraded_keeps_last_tally() {
        let mut view = LiveView::default();
        let poll = PollId::new("p1");
        view.select(Some(poll.clone()));
        view.reset(&poll);
        view.apply(&snapshot("p1", 2));
        assert!(view.degrade(&poll, "connection closed: closed by server".into()));
        assert_eq!(view.votes_for(&ChoiceId::new("a")), Some(2));
        assert_eq!(
            view.status.to_string(),
            "not updating (connection closed: closed by server)"
        );
    }
}
