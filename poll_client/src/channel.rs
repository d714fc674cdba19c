//! Live-results channel.
//!
//! A `ResultChannel` owns at most one subscription to one poll's results. The
//! subscription's socket lives on a reader worker thread which connects,
//! decodes frames and sends `ChannelEvent`s over a `crossbeam_channel`. The
//! owner applies those events with [`ResultChannel::dispatch`] on its own
//! thread, which is where the state machine advances and callbacks run:
//!
//! ```text
//! Closed -> Connecting -> Open -> Closed
//!               \_________________/
//! ```
//!
//! Every event carries the id of the subscription that produced it. Ids are
//! never reused, and `dispatch` drops events whose id is not the live one, so a
//! closed or replaced subscription can never reach the consumer, no matter how
//! its worker races with the close.
//!
//! The reader worker checks its shutdown flag between reads; the transport's
//! read timeout bounds how long a closed socket lingers. There is no
//! reconnect: a server-side close ends the subscription, and so does an error
//! saying the poll was deleted, since the server then stops broadcasting
//! without closing the socket.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use poll_common::envelope::{self, Inbound};
use poll_common::{PollError, PollId, ResultSnapshot, Result};
use strum_macros::Display;

use crate::transport::{Frame, ResultStream, ResultTransport};

/// Callback invoked once per delivered snapshot.
pub type SnapshotCallback = Box<dyn FnMut(&ResultSnapshot) + Send>;

/// Identifies one subscription attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    poll_id: PollId,
}

impl SubscriptionHandle {
    /// Poll whose results this subscription carries.
    pub fn poll_id(&self) -> &PollId {
        &self.poll_id
    }

    /// Channel-unique subscription number.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SubscriptionState {
    /// Worker is establishing the connection.
    Connecting,
    /// Connected; snapshots are delivered.
    Open,
    /// Released, failed, or closed by the server.
    Closed,
}

/// Why a subscription ended without being closed by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CloseReason {
    /// The connection could not be established.
    #[strum(to_string = "could not connect: {message}")]
    ConnectFailed {
        /// Transport error text.
        message: String,
    },
    /// The server closed the connection or it broke.
    #[strum(to_string = "connection closed: {message}")]
    Disconnected {
        /// Transport error text, or a note that the server hung up.
        message: String,
    },
}

/// Event produced by a subscription's reader worker.
#[derive(Debug)]
pub struct ChannelEvent {
    subscription: u64,
    kind: EventKind,
}

#[derive(Debug)]
enum EventKind {
    Established,
    Snapshot(ResultSnapshot),
    Disconnected(String),
    ConnectFailed(String),
}

/// Lifecycle notice returned by [`ResultChannel::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelNotice {
    /// The subscription is open; discard any tally shown so far.
    Reset(SubscriptionHandle),
    /// A snapshot was handed to the registered callback.
    Delivered(SubscriptionHandle),
    /// The subscription ended on its own.
    Closed {
        /// The ended subscription.
        handle: SubscriptionHandle,
        /// What ended it.
        reason: CloseReason,
    },
}

struct Subscription {
    handle: SubscriptionHandle,
    state: SubscriptionState,
    shutdown: Arc<AtomicBool>,
    on_snapshot: Option<SnapshotCallback>,
}

impl Subscription {
    fn release(self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Owner of the single live-results subscription.
pub struct ResultChannel {
    transport: Arc<dyn ResultTransport>,
    events_tx: Sender<ChannelEvent>,
    events_rx: Receiver<ChannelEvent>,
    next_id: u64,
    current: Option<Subscription>,
}

impl ResultChannel {
    /// Channel opening connections through `transport`.
    pub fn new(transport: Arc<dyn ResultTransport>) -> Self {
        let (events_tx, events_rx) = unbounded();
        ResultChannel {
            transport,
            events_tx,
            events_rx,
            next_id: 0,
            current: None,
        }
    }

    /// Start a subscription to `poll_id`'s results.
    ///
    /// Any live subscription on this channel is closed first. The returned
    /// handle starts in `Connecting`; a connection failure arrives later as a
    /// [`ChannelNotice::Closed`] with [`CloseReason::ConnectFailed`].
    pub fn open(&mut self, poll_id: &PollId) -> Result<SubscriptionHandle> {
        if let Some(live) = self.current.take() {
            info!(
                "Closing subscription #{} (poll {}) before opening a new one",
                live.handle.id, live.handle.poll_id
            );
            live.release();
        }

        self.next_id += 1;
        let handle = SubscriptionHandle {
            id: self.next_id,
            poll_id: poll_id.clone(),
        };
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = ReaderWorker {
            subscription: handle.id,
            poll_id: poll_id.clone(),
            transport: Arc::clone(&self.transport),
            events: self.events_tx.clone(),
            shutdown: Arc::clone(&shutdown),
        };

        thread::Builder::new()
            .name(format!("results-{}", handle.id))
            .spawn(move || worker.run())
            .map_err(|e| PollError::Connect(format!("failed to start results reader: {}", e)))?;

        info!("Subscription #{} opening for poll {}", handle.id, poll_id);
        self.current = Some(Subscription {
            handle: handle.clone(),
            state: SubscriptionState::Connecting,
            shutdown,
            on_snapshot: None,
        });
        Ok(handle)
    }

    /// Register the snapshot callback of `handle`, replacing any earlier one.
    ///
    /// Returns `false` and drops the callback if `handle` is no longer live.
    pub fn on_snapshot<F>(&mut self, handle: &SubscriptionHandle, callback: F) -> bool
    where
        F: FnMut(&ResultSnapshot) + Send + 'static,
    {
        match self.live_mut(handle) {
            Some(sub) => {
                sub.on_snapshot = Some(Box::new(callback));
                true
            }
            None => {
                debug!("Callback for inactive subscription #{} dropped", handle.id);
                false
            }
        }
    }

    /// Release `handle`'s connection.
    ///
    /// Closing a stale, already closed, or never opened handle does nothing.
    /// Once this returns, `handle`'s callback is gone and none of its pending
    /// events will be dispatched.
    pub fn close(&mut self, handle: &SubscriptionHandle) {
        if self.live_mut(handle).is_none() {
            debug!("Subscription #{} already closed", handle.id);
            return;
        }
        if let Some(sub) = self.current.take() {
            info!("Subscription #{} (poll {}) closed", handle.id, handle.poll_id);
            sub.release();
        }
    }

    /// Current state of `handle`. Anything but the live handle is `Closed`.
    pub fn state(&self, handle: &SubscriptionHandle) -> SubscriptionState {
        match &self.current {
            Some(sub) if sub.handle == *handle => sub.state,
            _ => SubscriptionState::Closed,
        }
    }

    /// The live subscription, if any.
    pub fn current(&self) -> Option<&SubscriptionHandle> {
        self.current.as_ref().map(|sub| &sub.handle)
    }

    /// Receiver of reader-worker events, to be fed back into [`Self::dispatch`].
    pub fn events(&self) -> &Receiver<ChannelEvent> {
        &self.events_rx
    }

    /// Apply one reader-worker event.
    ///
    /// Events from anything but the live subscription are discarded.
    pub fn dispatch(&mut self, event: ChannelEvent) -> Option<ChannelNotice> {
        let Some(sub) = self
            .current
            .as_mut()
            .filter(|sub| sub.handle.id == event.subscription)
        else {
            debug!("Discarding event from stale subscription #{}", event.subscription);
            return None;
        };

        match event.kind {
            EventKind::Established => {
                if sub.state != SubscriptionState::Connecting {
                    return None;
                }
                sub.state = SubscriptionState::Open;
                info!("Subscription #{} open", sub.handle.id);
                Some(ChannelNotice::Reset(sub.handle.clone()))
            }
            EventKind::Snapshot(snapshot) => {
                if sub.state != SubscriptionState::Open {
                    debug!("Snapshot before open on subscription #{}", sub.handle.id);
                    return None;
                }
                if let Some(callback) = sub.on_snapshot.as_mut() {
                    callback(&snapshot);
                }
                Some(ChannelNotice::Delivered(sub.handle.clone()))
            }
            EventKind::Disconnected(message) => {
                warn!("Subscription #{} lost: {}", sub.handle.id, message);
                self.end_current(CloseReason::Disconnected { message })
            }
            EventKind::ConnectFailed(message) => {
                warn!("Subscription #{} failed to connect: {}", sub.handle.id, message);
                self.end_current(CloseReason::ConnectFailed { message })
            }
        }
    }

    fn end_current(&mut self, reason: CloseReason) -> Option<ChannelNotice> {
        let sub = self.current.take()?;
        let handle = sub.handle.clone();
        sub.release();
        Some(ChannelNotice::Closed { handle, reason })
    }

    fn live_mut(&mut self, handle: &SubscriptionHandle) -> Option<&mut Subscription> {
        self.current.as_mut().filter(|sub| sub.handle == *handle)
    }
}

impl Drop for ResultChannel {
    fn drop(&mut self) {
        if let Some(sub) = self.current.take() {
            sub.release();
        }
    }
}

enum Decoded {
    Snapshot(ResultSnapshot),
    Skip,
    /// The server will send nothing more, though the socket may stay open.
    Ended(String),
}

/// Socket side of one subscription; runs on its own thread.
struct ReaderWorker {
    subscription: u64,
    poll_id: PollId,
    transport: Arc<dyn ResultTransport>,
    events: Sender<ChannelEvent>,
    shutdown: Arc<AtomicBool>,
}

impl ReaderWorker {
    fn run(self) {
        let mut stream = match self.transport.connect(&self.poll_id) {
            Ok(stream) => stream,
            Err(e) => {
                self.emit(EventKind::ConnectFailed(e.to_string()));
                return;
            }
        };

        if !self.is_cancelled() && self.emit(EventKind::Established) {
            self.read_loop(stream.as_mut());
        }
        stream.close();
        debug!("Results reader #{} stopping...", self.subscription);
    }

    fn read_loop(&self, stream: &mut dyn ResultStream) {
        while !self.is_cancelled() {
            match stream.next_frame() {
                Ok(Frame::Text(text)) => match self.decode(&text) {
                    Decoded::Snapshot(snapshot) => {
                        if !self.emit(EventKind::Snapshot(snapshot)) {
                            return;
                        }
                    }
                    Decoded::Skip => continue,
                    Decoded::Ended(message) => {
                        self.emit(EventKind::Disconnected(message));
                        return;
                    }
                },
                Ok(Frame::Idle) => continue,
                Ok(Frame::Closed) => {
                    self.emit(EventKind::Disconnected("closed by server".into()));
                    return;
                }
                Err(e) => {
                    self.emit(EventKind::Disconnected(e.to_string()));
                    return;
                }
            }
        }
    }

    /// Malformed and result-less messages are dropped here and never reach the
    /// owner. Errors saying the poll is gone end the subscription.
    fn decode(&self, text: &str) -> Decoded {
        match envelope::decode(text, &self.poll_id) {
            Ok(Inbound::Snapshot(snapshot)) => Decoded::Snapshot(snapshot),
            Ok(Inbound::ServerError { code, message }) => {
                warn!("Server error on poll {}: {} ({})", self.poll_id, message, code);
                if envelope::ends_subscription(&code) {
                    Decoded::Ended(message)
                } else {
                    Decoded::Skip
                }
            }
            Ok(Inbound::Ignored { action }) => {
                debug!("Ignoring message without results (action {:?})", action);
                Decoded::Skip
            }
            Err(e) => {
                debug!("Dropping malformed message {:?}: {}", text, e);
                Decoded::Skip
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn emit(&self, kind: EventKind) -> bool {
        self.events
            .send(ChannelEvent {
                subscription: self.subscription,
                kind,
            })
            .is_ok()
    }
}
