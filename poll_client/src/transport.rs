//! Live-results socket.
//!
//! `ResultTransport` opens one connection per subscription and hands back a
//! `ResultStream` that yields raw text frames. Streams are read from a
//! dedicated worker thread, so `next_frame` is blocking but must return
//! `Frame::Idle` periodically; the worker uses those wake-ups to notice a
//! requested close.
use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;

use log::{debug, info};
use poll_common::net::Endpoints;
use poll_common::{PollError, PollId, Result};
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::config::ClientConfig;

/// One read from a results stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text message, not yet decoded.
    Text(String),
    /// Nothing arrived within the read timeout (or a control frame was handled).
    Idle,
    /// The server closed the connection.
    Closed,
}

/// An established live-results connection.
pub trait ResultStream: Send {
    /// Wait up to the read timeout for the next frame.
    ///
    /// An error means the connection broke; the stream must not be read again.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Close the connection. Safe to call more than once.
    fn close(&mut self);
}

/// Factory for live-results connections.
pub trait ResultTransport: Send + Sync {
    /// Connect to the results feed of `poll_id`, blocking until established.
    fn connect(&self, poll_id: &PollId) -> Result<Box<dyn ResultStream>>;
}

/// `ResultTransport` over WebSocket (`/polls/ws/{id}`).
pub struct WsTransport {
    endpoints: Endpoints,
    read_timeout: Duration,
    connect_timeout: Duration,
}

impl WsTransport {
    /// Transport for the backend described by `config`.
    pub fn new(config: &ClientConfig) -> Self {
        WsTransport {
            endpoints: config.endpoints.clone(),
            read_timeout: config.read_timeout,
            connect_timeout: config.connect_timeout,
        }
    }
}

impl ResultTransport for WsTransport {
    /// The TCP connect and the WebSocket upgrade are each bounded by the
    /// connect timeout, so a peer that never answers fails the attempt.
    fn connect(&self, poll_id: &PollId) -> Result<Box<dyn ResultStream>> {
        let url = self.endpoints.results_feed(poll_id)?;
        if url.scheme() != "ws" {
            return Err(PollError::Connect(format!(
                "{}: TLS is not supported by this client",
                url
            )));
        }
        debug!("Connecting to {}", url);

        let stream = open_socket(&url, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.connect_timeout))?;
        stream.set_write_timeout(Some(self.connect_timeout))?;

        let (socket, _response) = match tungstenite::client(url.as_str(), stream) {
            Ok(done) => done,
            Err(HandshakeError::Interrupted(_)) => {
                return Err(PollError::Connect(format!(
                    "{}: no WebSocket upgrade within {:?}",
                    url, self.connect_timeout
                )));
            }
            Err(HandshakeError::Failure(e)) => {
                return Err(PollError::Connect(format!("{}: {}", url, e)));
            }
        };

        socket.get_ref().set_read_timeout(Some(self.read_timeout))?;
        info!("Live results connected: {}", url);
        Ok(Box::new(WsStream { socket }))
    }
}

/// Connect to the first reachable address of `url`.
fn open_socket(url: &Url, timeout: Duration) -> Result<TcpStream> {
    let addrs = url
        .socket_addrs(|| None)
        .map_err(|e| PollError::Connect(format!("{}: {}", url, e)))?;
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connecting to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    let reason = match last_error {
        Some(e) => e.to_string(),
        None => "no address resolved".to_string(),
    };
    Err(PollError::Connect(format!("{}: {}", url, reason)))
}

struct WsStream {
    socket: WebSocket<TcpStream>,
}

impl ResultStream for WsStream {
    fn next_frame(&mut self) -> Result<Frame> {
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Frame::Text(text.as_str().to_owned())),
            Ok(Message::Close(_)) => Ok(Frame::Closed),
            Ok(_) => Ok(Frame::Idle),
            Err(tungstenite::Error::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                Ok(Frame::Idle)
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(Frame::Closed)
            }
            Err(e) => Err(PollError::Connect(format!("live results connection lost: {}", e))),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.socket.close(None) {
            debug!("WebSocket close: {}", e);
        }
        if let Err(e) = self.socket.flush() {
            debug!("WebSocket flush after close: {}", e);
        }
    }
}
