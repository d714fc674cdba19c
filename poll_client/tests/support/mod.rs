//! In-memory backend and results transport for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use poll_client::PollSession;
use poll_client::api::PollApi;
use poll_client::session::SessionNotice;
use poll_client::transport::{Frame, ResultStream, ResultTransport};
use poll_common::model::{Choice, NewPoll, PollStats, VoteRequest};
use poll_common::{ChoiceId, Poll, PollError, PollId, Result};

/// Upper bound for anything the tests wait on.
pub const WAIT: Duration = Duration::from_secs(3);

pub fn poll(id: &str, choices: &[&str]) -> Poll {
    Poll {
        id: PollId::new(id),
        title: format!("Poll {}", id),
        question: format!("Question {}?", id),
        choices: choices
            .iter()
            .map(|c| Choice {
                id: ChoiceId::new(*c),
                text: c.to_uppercase(),
            })
            .collect(),
    }
}

/// Envelope the backend broadcasts after a vote.
pub fn results_message(poll_id: &str, rows: &[(&str, u64)]) -> String {
    let results: Vec<serde_json::Value> = rows
        .iter()
        .map(|(id, votes)| {
            serde_json::json!({"id": id, "text": id.to_uppercase(), "votes": votes})
        })
        .collect();
    serde_json::json!({
        "type": "success",
        "action": "update",
        "data": {"poll_id": poll_id, "results": results}
    })
    .to_string()
}

/// Wait for the first notice matching `pred`, applying everything before it.
pub fn wait_for<F>(session: &mut PollSession, pred: F) -> SessionNotice
where
    F: Fn(&SessionNotice) -> bool,
{
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(notice) = session.next_notice(Duration::from_millis(20)).unwrap() {
            if pred(&notice) {
                return notice;
            }
        }
    }
    panic!("timed out waiting for a session notice");
}

/// Apply events for `period` and return every notice produced.
pub fn settle(session: &mut PollSession, period: Duration) -> Vec<SessionNotice> {
    let deadline = Instant::now() + period;
    let mut notices = Vec::new();
    while Instant::now() < deadline {
        notices.extend(session.next_notice(Duration::from_millis(10)).unwrap());
    }
    notices
}

/// Poll `cond` until it holds or `WAIT` elapses.
pub fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Get(PollId),
    Create(NewPoll),
    Delete(PollId),
    Vote(PollId, VoteRequest),
    Stats(PollId),
}

/// Backend keeping polls in memory and recording every call.
#[derive(Default)]
pub struct FakeApi {
    polls: Mutex<Vec<Poll>>,
    calls: Mutex<Vec<Call>>,
    vote_gate: Mutex<Option<Receiver<()>>>,
    fail_votes: AtomicBool,
    fail_list: AtomicBool,
    watchers: AtomicU64,
}

impl FakeApi {
    pub fn with_polls(polls: Vec<Poll>) -> Arc<Self> {
        Arc::new(FakeApi {
            polls: Mutex::new(polls),
            ..FakeApi::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Block votes until the returned sender sends (or is dropped).
    pub fn hold_votes(&self) -> Sender<()> {
        let (tx, rx) = unbounded();
        *self.vote_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn fail_votes(&self) {
        self.fail_votes.store(true, Ordering::SeqCst);
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    /// Connection count reported by the stats endpoint.
    pub fn set_watchers(&self, count: u64) {
        self.watchers.store(count, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PollApi for FakeApi {
    fn list_polls(&self) -> Result<Vec<Poll>> {
        self.record(Call::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(PollError::Fetch("connection refused".into()));
        }
        Ok(self.polls.lock()?.clone())
    }

    fn get_poll(&self, poll_id: &PollId) -> Result<Poll> {
        self.record(Call::Get(poll_id.clone()));
        self.polls
            .lock()?
            .iter()
            .find(|p| &p.id == poll_id)
            .cloned()
            .ok_or_else(|| PollError::Fetch("HTTP 404: Poll not found".into()))
    }

    fn create_poll(&self, new_poll: &NewPoll) -> Result<()> {
        self.record(Call::Create(new_poll.clone()));
        let mut polls = self.polls.lock()?;
        let id = format!("created-{}", polls.len() + 1);
        let choices: Vec<&str> = new_poll.choices().iter().map(|c| c.text.as_str()).collect();
        let mut created = poll(&id, &choices);
        created.title = new_poll.title().to_string();
        polls.push(created);
        Ok(())
    }

    fn delete_poll(&self, poll_id: &PollId) -> Result<()> {
        self.record(Call::Delete(poll_id.clone()));
        let mut polls = self.polls.lock()?;
        let before = polls.len();
        polls.retain(|p| &p.id != poll_id);
        if polls.len() == before {
            return Err(PollError::Delete("HTTP 404: Poll not found".into()));
        }
        Ok(())
    }

    fn vote(&self, poll_id: &PollId, vote: &VoteRequest) -> Result<()> {
        self.record(Call::Vote(poll_id.clone(), vote.clone()));
        let gate = self.vote_gate.lock()?.clone();
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(WAIT);
        }
        if self.fail_votes.load(Ordering::SeqCst) {
            return Err(PollError::Vote("HTTP 400: User has already voted in this poll".into()));
        }
        Ok(())
    }

    fn poll_stats(&self, poll_id: &PollId) -> Result<PollStats> {
        self.record(Call::Stats(poll_id.clone()));
        Ok(PollStats {
            poll_id: poll_id.clone(),
            connection_count: self.watchers.load(Ordering::SeqCst),
        })
    }
}

/// Server end of one fake results connection.
pub struct ServerSide {
    pub poll_id: PollId,
    frames: Sender<Frame>,
    gate: Sender<()>,
    closed: Arc<AtomicBool>,
}

impl ServerSide {
    /// Let a gated connection complete.
    pub fn accept(&self) {
        let _ = self.gate.send(());
    }

    pub fn push(&self, text: &str) {
        let _ = self.frames.send(Frame::Text(text.to_string()));
    }

    pub fn push_results(&self, rows: &[(&str, u64)]) {
        self.push(&results_message(self.poll_id.as_str(), rows));
    }

    pub fn hang_up(&self) {
        let _ = self.frames.send(Frame::Closed);
    }

    /// Whether the client closed its end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Results transport handing each connection's server end to the test.
pub struct FakeTransport {
    connections_tx: Sender<ServerSide>,
    connections_rx: Receiver<ServerSide>,
    refused: Mutex<Vec<PollId>>,
    gated: bool,
    open_streams: Arc<AtomicUsize>,
}

impl FakeTransport {
    /// Connections complete immediately.
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// Connections stay in progress until `ServerSide::accept`.
    pub fn gated() -> Arc<Self> {
        Self::build(true)
    }

    fn build(gated: bool) -> Arc<Self> {
        let (connections_tx, connections_rx) = unbounded();
        Arc::new(FakeTransport {
            connections_tx,
            connections_rx,
            refused: Mutex::new(Vec::new()),
            gated,
            open_streams: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn refuse(&self, poll_id: &str) {
        self.refused.lock().unwrap().push(PollId::new(poll_id));
    }

    /// Server end of the next connection attempt.
    pub fn next_connection(&self) -> ServerSide {
        self.connections_rx
            .recv_timeout(WAIT)
            .expect("no connection attempt")
    }

    pub fn has_pending_connection(&self) -> bool {
        !self.connections_rx.is_empty()
    }

    /// Streams connected and not yet closed by the client.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

impl ResultTransport for FakeTransport {
    fn connect(&self, poll_id: &PollId) -> Result<Box<dyn ResultStream>> {
        if self.refused.lock()?.contains(poll_id) {
            return Err(PollError::Connect("connection refused".into()));
        }

        let (frames_tx, frames_rx) = unbounded();
        let (gate_tx, gate_rx) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        if !self.gated {
            let _ = gate_tx.send(());
        }
        self.connections_tx
            .send(ServerSide {
                poll_id: poll_id.clone(),
                frames: frames_tx,
                gate: gate_tx,
                closed: Arc::clone(&closed),
            })
            .map_err(|e| PollError::ChannelSend(e.to_string()))?;

        gate_rx
            .recv_timeout(WAIT)
            .map_err(|_| PollError::Connect("handshake timed out".into()))?;
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            frames: frames_rx,
            closed,
            open_streams: Arc::clone(&self.open_streams),
        }))
    }
}

struct FakeStream {
    frames: Receiver<Frame>,
    closed: Arc<AtomicBool>,
    open_streams: Arc<AtomicUsize>,
}

impl ResultStream for FakeStream {
    fn next_frame(&mut self) -> Result<Frame> {
        match self.frames.recv_timeout(Duration::from_millis(5)) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Ok(Frame::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(Frame::Closed),
        }
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
