//! Poll session controller.
//!
//! `PollSession` owns the selected poll, the results subscription and the
//! catalog, and is the only place their state changes. Blocking work runs
//! elsewhere and reports back over channels:
//!
//! - the results channel's reader worker sends `ChannelEvent`s;
//! - HTTP requests run on short-lived worker threads and send a `Completion`.
//!
//! The front-end drives the session by calling [`PollSession::next_notice`] or
//! [`PollSession::pump`], which apply those messages one at a time on the
//! caller's thread and report what changed as `SessionNotice`s.
//!
//! Displayed tallies come only from result snapshots. A vote's completion
//! says the backend accepted it, nothing more; the updated tally arrives as
//! a broadcast on the subscription like any other client's vote.
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error, info, warn};
use poll_common::model::{NewPoll, PollStats, VoteRequest};
use poll_common::{ChoiceId, Poll, PollError, PollId, ResultSnapshot, Result};

use crate::api::{HttpPollApi, PollApi};
use crate::catalog::PollCatalog;
use crate::channel::{
    ChannelEvent, ChannelNotice, CloseReason, ResultChannel, SubscriptionHandle,
    SubscriptionState,
};
use crate::config::ClientConfig;
use crate::transport::{ResultTransport, WsTransport};
use crate::view::LiveView;

/// Something the front-end may want to show.
#[derive(Debug)]
pub enum SessionNotice {
    /// A catalog refresh was applied.
    CatalogUpdated {
        /// Number of polls now listed.
        polls: usize,
    },
    /// The latest catalog refresh failed.
    CatalogFailed(PollError),
    /// A poll requested with [`PollSession::open_poll`] was fetched and selected.
    PollOpened(PollId),
    /// Fetching a poll to open it failed; the selection is unchanged.
    OpenFailed(PollError),
    /// The backend created a poll; a catalog refresh is under way.
    PollCreated {
        /// Title of the created poll.
        title: String,
    },
    /// Poll creation failed.
    CreateFailed(PollError),
    /// The backend deleted a poll; a catalog refresh is under way.
    PollDeleted(PollId),
    /// Poll deletion failed.
    DeleteFailed(PollError),
    /// The backend accepted a vote on the selected poll.
    VoteAccepted {
        /// Choice voted for.
        choice_id: ChoiceId,
    },
    /// A vote on the selected poll failed.
    VoteFailed(PollError),
    /// The subscription opened and the tally was cleared.
    ResultsReset(PollId),
    /// A new tally is shown.
    ResultsUpdated(PollId),
    /// The backend reported how many clients follow the open poll.
    WatchersUpdated {
        /// Poll the count belongs to.
        poll_id: PollId,
        /// Live connections on the poll.
        watchers: u64,
    },
    /// The subscription ended; the tally stays but stops updating.
    LiveDegraded {
        /// Poll whose live view degraded.
        poll_id: PollId,
        /// What ended the subscription.
        reason: CloseReason,
    },
}

/// Result of a request run on a worker thread.
enum Completion {
    Catalog {
        request: u64,
        outcome: Result<Vec<Poll>>,
    },
    Opened {
        request: u64,
        outcome: Result<Poll>,
    },
    Stats {
        poll_id: PollId,
        outcome: Result<PollStats>,
    },
    Created {
        title: String,
        outcome: Result<()>,
    },
    Deleted {
        poll_id: PollId,
        outcome: Result<()>,
    },
    Voted {
        poll_id: PollId,
        choice_id: ChoiceId,
        outcome: Result<()>,
    },
}

/// Controller for poll selection, the live subscription and backend requests.
pub struct PollSession {
    api: Arc<dyn PollApi>,
    catalog: PollCatalog,
    channel: ResultChannel,
    selected: Option<Poll>,
    subscription: Option<SubscriptionHandle>,
    opening: u64,
    view: Arc<Mutex<LiveView>>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
}

impl PollSession {
    /// Session using the given backend and results transport.
    pub fn new(api: Arc<dyn PollApi>, transport: Arc<dyn ResultTransport>) -> Self {
        let (completions_tx, completions_rx) = unbounded();
        PollSession {
            catalog: PollCatalog::new(Arc::clone(&api)),
            api,
            channel: ResultChannel::new(transport),
            selected: None,
            subscription: None,
            opening: 0,
            view: Arc::new(Mutex::new(LiveView::default())),
            completions_tx,
            completions_rx,
        }
    }

    /// Session talking HTTP and WebSocket to the backend in `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let api = HttpPollApi::new(config)?;
        let transport = WsTransport::new(config);
        Ok(Self::new(Arc::new(api), Arc::new(transport)))
    }

    /// Open `poll`, or go back to the poll list with `None`.
    ///
    /// The previous subscription is closed and the view switched to the new
    /// selection with an empty tally before a new subscription is opened.
    /// Selecting the already open poll reopens its subscription, which is how
    /// a degraded live view is recovered.
    pub fn select_poll(&mut self, poll: Option<Poll>) -> Result<()> {
        // Supersedes any open_poll still in flight.
        self.opening += 1;
        if let Some(handle) = self.subscription.take() {
            self.channel.close(&handle);
        }
        self.view.lock()?.select(poll.as_ref().map(|p| p.id.clone()));
        self.selected = poll;

        let Some(poll_id) = self.selected.as_ref().map(|p| p.id.clone()) else {
            info!("Back to poll list");
            return Ok(());
        };
        info!("Poll {} selected", poll_id);

        let handle = match self.channel.open(&poll_id) {
            Ok(handle) => handle,
            Err(e) => {
                self.view.lock()?.degrade(&poll_id, e.to_string());
                return Err(e);
            }
        };
        let view = Arc::clone(&self.view);
        self.channel
            .on_snapshot(&handle, move |snapshot| apply_snapshot(&view, snapshot));
        self.subscription = Some(handle);
        Ok(())
    }

    /// Fetch `poll_id` from the backend and select it once it arrives.
    ///
    /// Any later selection, including another `open_poll`, supersedes this
    /// one; its result is then dropped.
    pub fn open_poll(&mut self, poll_id: PollId) -> Result<()> {
        self.opening += 1;
        let request = self.opening;
        let source = self.catalog.source();
        info!("Opening poll {}", poll_id);
        self.spawn_request("open", move || Completion::Opened {
            request,
            outcome: source.fetch(&poll_id),
        })
    }

    /// Vote for `choice_id` on the selected poll.
    ///
    /// Each vote carries a fresh anonymous voter id. The request is not
    /// retried and does not touch the displayed tally.
    pub fn submit_vote(&mut self, choice_id: ChoiceId) -> Result<()> {
        let poll = self.selected.as_ref().ok_or(PollError::NoPollSelected)?;
        if !poll.has_choice(&choice_id) {
            return Err(PollError::Validation(format!(
                "choice {} is not part of poll {}",
                choice_id, poll.id
            )));
        }

        let poll_id = poll.id.clone();
        let vote = VoteRequest::anonymous(choice_id.clone());
        let api = Arc::clone(&self.api);
        info!("Voting {} on poll {}", choice_id, poll_id);
        self.spawn_request("vote", move || Completion::Voted {
            outcome: api.vote(&poll_id, &vote),
            poll_id,
            choice_id,
        })
    }

    /// Create a poll. Invalid input fails here without any request being sent.
    pub fn create_poll<S: AsRef<str>>(
        &mut self,
        title: &str,
        question: &str,
        choice_texts: &[S],
    ) -> Result<()> {
        let poll = NewPoll::new(title, question, choice_texts)?;
        let api = Arc::clone(&self.api);
        info!("Creating poll {:?}", poll.title());
        self.spawn_request("create", move || Completion::Created {
            outcome: api.create_poll(&poll),
            title: poll.title().to_string(),
        })
    }

    /// Delete a poll. If it is still open when the deletion completes, the
    /// session goes back to the poll list.
    pub fn delete_poll(&mut self, poll_id: PollId) -> Result<()> {
        let api = Arc::clone(&self.api);
        info!("Deleting poll {}", poll_id);
        self.spawn_request("delete", move || Completion::Deleted {
            outcome: api.delete_poll(&poll_id),
            poll_id,
        })
    }

    /// Reload the poll list in the background.
    pub fn refresh_catalog(&mut self) -> Result<()> {
        let request = self.catalog.begin_refresh();
        let source = self.catalog.source();
        self.spawn_request("catalog", move || Completion::Catalog {
            request,
            outcome: source.list(),
        })
    }

    /// Wait up to `timeout` for one event and apply it.
    ///
    /// Returns `Ok(None)` on timeout and for events that were applied but are
    /// not worth reporting, such as completions for a poll no longer selected.
    pub fn next_notice(&mut self, timeout: Duration) -> Result<Option<SessionNotice>> {
        let events = self.channel.events().clone();
        let completions = self.completions_rx.clone();
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => self.on_channel_event(event),
                Err(e) => Err(PollError::ChannelRecv(e.to_string())),
            },
            recv(completions) -> msg => match msg {
                Ok(completion) => self.on_completion(completion),
                Err(e) => Err(PollError::ChannelRecv(e.to_string())),
            },
            default(timeout) => Ok(None),
        }
    }

    /// Apply every event already waiting, without blocking.
    pub fn pump(&mut self) -> Result<Vec<SessionNotice>> {
        let mut notices = Vec::new();
        while let Ok(event) = self.channel.events().try_recv() {
            notices.extend(self.on_channel_event(event)?);
        }
        while let Ok(completion) = self.completions_rx.try_recv() {
            notices.extend(self.on_completion(completion)?);
        }
        Ok(notices)
    }

    /// The open poll, if any.
    pub fn selected(&self) -> Option<&Poll> {
        self.selected.as_ref()
    }

    /// Copy of the current display state.
    pub fn view(&self) -> Result<LiveView> {
        Ok(self.view.lock()?.clone())
    }

    /// Polls of the last applied catalog refresh.
    pub fn polls(&self) -> &[Poll] {
        self.catalog.polls()
    }

    /// State of the selected poll's subscription; `Closed` on the poll list.
    pub fn subscription_state(&self) -> SubscriptionState {
        match &self.subscription {
            Some(handle) => self.channel.state(handle),
            None => SubscriptionState::Closed,
        }
    }

    fn is_selected(&self, poll_id: &PollId) -> bool {
        self.selected.as_ref().is_some_and(|p| &p.id == poll_id)
    }

    fn on_channel_event(&mut self, event: ChannelEvent) -> Result<Option<SessionNotice>> {
        let Some(notice) = self.channel.dispatch(event) else {
            return Ok(None);
        };

        match notice {
            ChannelNotice::Reset(handle) => {
                self.view.lock()?.reset(handle.poll_id());
                self.request_stats(handle.poll_id().clone())?;
                Ok(Some(SessionNotice::ResultsReset(handle.poll_id().clone())))
            }
            ChannelNotice::Delivered(handle) => {
                Ok(Some(SessionNotice::ResultsUpdated(handle.poll_id().clone())))
            }
            ChannelNotice::Closed { handle, reason } => {
                if self.subscription.as_ref() == Some(&handle) {
                    self.subscription = None;
                }
                self.view.lock()?.degrade(handle.poll_id(), reason.to_string());
                Ok(Some(SessionNotice::LiveDegraded {
                    poll_id: handle.poll_id().clone(),
                    reason,
                }))
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) -> Result<Option<SessionNotice>> {
        match completion {
            Completion::Catalog { request, outcome } => {
                if !self.catalog.is_latest(request) {
                    debug!("Discarding superseded catalog refresh #{}", request);
                    return Ok(None);
                }
                match outcome {
                    Ok(polls) => {
                        let count = polls.len();
                        self.catalog.finish_refresh(request, polls);
                        info!("Catalog updated: {} polls", count);
                        Ok(Some(SessionNotice::CatalogUpdated { polls: count }))
                    }
                    Err(e) => {
                        warn!("Catalog refresh failed: {}", e);
                        Ok(Some(SessionNotice::CatalogFailed(e)))
                    }
                }
            }
            Completion::Opened { request, outcome } => {
                if request != self.opening {
                    debug!("Discarding superseded poll fetch #{}", request);
                    return Ok(None);
                }
                match outcome {
                    Ok(poll) => {
                        let poll_id = poll.id.clone();
                        self.select_poll(Some(poll))?;
                        Ok(Some(SessionNotice::PollOpened(poll_id)))
                    }
                    Err(e) => {
                        warn!("Opening poll failed: {}", e);
                        Ok(Some(SessionNotice::OpenFailed(e)))
                    }
                }
            }
            Completion::Stats { poll_id, outcome } => match outcome {
                Ok(stats) => {
                    let watchers = stats.connection_count;
                    if !self.view.lock()?.set_watchers(&poll_id, watchers) {
                        return Ok(None);
                    }
                    Ok(Some(SessionNotice::WatchersUpdated { poll_id, watchers }))
                }
                Err(e) => {
                    debug!("Stats for poll {} unavailable: {}", poll_id, e);
                    Ok(None)
                }
            },
            Completion::Created { title, outcome } => match outcome {
                Ok(()) => {
                    info!("Poll {:?} created", title);
                    self.refresh_catalog()?;
                    Ok(Some(SessionNotice::PollCreated { title }))
                }
                Err(e) => {
                    warn!("Creating poll {:?} failed: {}", title, e);
                    Ok(Some(SessionNotice::CreateFailed(e)))
                }
            },
            Completion::Deleted { poll_id, outcome } => match outcome {
                Ok(()) => {
                    info!("Poll {} deleted", poll_id);
                    if self.is_selected(&poll_id) {
                        self.select_poll(None)?;
                    }
                    self.refresh_catalog()?;
                    Ok(Some(SessionNotice::PollDeleted(poll_id)))
                }
                Err(e) => {
                    warn!("Deleting poll {} failed: {}", poll_id, e);
                    Ok(Some(SessionNotice::DeleteFailed(e)))
                }
            },
            Completion::Voted {
                poll_id,
                choice_id,
                outcome,
            } => {
                if !self.is_selected(&poll_id) {
                    debug!("Discarding vote completion for poll {} (no longer open)", poll_id);
                    return Ok(None);
                }
                match outcome {
                    Ok(()) => Ok(Some(SessionNotice::VoteAccepted { choice_id })),
                    Err(e) => {
                        warn!("Vote on poll {} failed: {}", poll_id, e);
                        Ok(Some(SessionNotice::VoteFailed(e)))
                    }
                }
            }
        }
    }

    fn request_stats(&self, poll_id: PollId) -> Result<()> {
        let api = Arc::clone(&self.api);
        self.spawn_request("stats", move || Completion::Stats {
            outcome: api.poll_stats(&poll_id),
            poll_id,
        })
    }

    fn spawn_request<F>(&self, name: &str, job: F) -> Result<()>
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        thread::Builder::new()
            .name(format!("{}-request", name))
            .spawn(move || {
                if tx.send(job()).is_err() {
                    debug!("Session gone; request result dropped");
                }
            })?;
        Ok(())
    }
}

fn apply_snapshot(view: &Mutex<LiveView>, snapshot: &ResultSnapshot) {
    match view.lock() {
        Ok(mut view) => {
            if !view.apply(snapshot) {
                debug!("Snapshot for poll {} not shown", snapshot.poll_id);
            }
        }
        Err(e) => error!("Live view lock poisoned: {}", e),
    }
}
