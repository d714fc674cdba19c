//! `WsTransport` against a loopback WebSocket server.
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use poll_client::ClientConfig;
use poll_client::channel::{ChannelNotice, CloseReason, ResultChannel, SubscriptionState};
use poll_client::transport::WsTransport;
use poll_common::{ChoiceId, PollId};
use tungstenite::Message;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};

fn transport_for(addr: &str) -> Arc<WsTransport> {
    let config = ClientConfig::new(&format!("http://{}", addr))
        .unwrap()
        .with_read_timeout(Duration::from_millis(20))
        .with_connect_timeout(Duration::from_millis(300));
    Arc::new(WsTransport::new(&config))
}

fn next_notice(channel: &mut ResultChannel) -> ChannelNotice {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(event) = channel.events().recv_timeout(Duration::from_millis(20)) {
            if let Some(notice) = channel.dispatch(event) {
                return notice;
            }
        }
    }
    panic!("timed out waiting for a channel notice");
}

fn update(poll_id: &str, votes: u64) -> Message {
    Message::text(
        serde_json::json!({
            "type": "success",
            "action": "update",
            "data": {
                "poll_id": poll_id,
                "results": [{"id": "a", "text": "Pizza", "votes": votes}]
            }
        })
        .to_string(),
    )
}

#[test]
fn streams_results_until_server_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (path_tx, path_rx) = unbounded();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut ws = tungstenite::accept_hdr(stream, |req: &Request, resp: Response| {
            let _ = path_tx.send(req.uri().path().to_string());
            Ok::<Response, ErrorResponse>(resp)
        })
        .unwrap();

        let connected = serde_json::json!({
            "type": "success",
            "action": "connect",
            "data": {"message": "Connected to poll p1"}
        });
        ws.send(Message::text(connected.to_string())).unwrap();
        let subscribed = serde_json::json!({
            "type": "success",
            "action": "subscribe",
            "data": {
                "poll_id": "p1",
                "results": [{"id": "a", "text": "Pizza", "votes": 2}]
            }
        });
        ws.send(Message::text(subscribed.to_string())).unwrap();
        ws.send(Message::text("{not json".to_string())).unwrap();
        ws.send(update("p1", 3)).unwrap();
        ws.close(None).unwrap();
        while ws.read().is_ok() {}
    });

    let mut channel = ResultChannel::new(transport_for(&addr));
    let handle = channel.open(&PollId::new("p1")).unwrap();
    let (seen_tx, seen_rx) = unbounded();
    channel.on_snapshot(&handle, move |snapshot| {
        let _ = seen_tx.send(snapshot.votes_for(&ChoiceId::new("a")));
    });

    assert_eq!(next_notice(&mut channel), ChannelNotice::Reset(handle.clone()));
    assert_eq!(next_notice(&mut channel), ChannelNotice::Delivered(handle.clone()));
    assert_eq!(next_notice(&mut channel), ChannelNotice::Delivered(handle.clone()));
    match next_notice(&mut channel) {
        ChannelNotice::Closed {
            reason: CloseReason::Disconnected { .. },
            ..
        } => {}
        other => panic!("unexpected notice {:?}", other),
    }

    let votes: Vec<Option<u64>> = seen_rx.try_iter().collect();
    assert_eq!(votes, vec![Some(2), Some(3)]);
    assert_eq!(path_rx.recv_timeout(Duration::from_secs(1)).unwrap(), "/polls/ws/p1");
    server.join().unwrap();
}

#[test]
fn client_close_sends_close_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut ws = tungstenite::accept(stream).unwrap();
        loop {
            match ws.read() {
                Ok(Message::Close(_)) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    });

    let mut channel = ResultChannel::new(transport_for(&addr));
    let handle = channel.open(&PollId::new("p1")).unwrap();
    assert!(matches!(next_notice(&mut channel), ChannelNotice::Reset(_)));
    channel.close(&handle);

    assert!(server.join().unwrap());
}

#[test]
fn refused_port_fails_to_connect() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let mut channel = ResultChannel::new(transport_for(&addr));
    channel.open(&PollId::new("p1")).unwrap();
    match next_notice(&mut channel) {
        ChannelNotice::Closed {
            reason: CloseReason::ConnectFailed { .. },
            ..
        } => {}
        other => panic!("unexpected notice {:?}", other),
    }
}

#[test]
fn silent_peer_fails_handshake_within_connect_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let mut channel = ResultChannel::new(transport_for(&addr));
    let handle = channel.open(&PollId::new("p1")).unwrap();
    // Accept the TCP connection but never answer the upgrade request.
    let (_held, _) = listener.accept().unwrap();

    let started = Instant::now();
    match next_notice(&mut channel) {
        ChannelNotice::Closed {
            handle: closed,
            reason: CloseReason::ConnectFailed { message },
        } => {
            assert_eq!(closed, handle);
            assert!(message.contains("/polls/ws/p1"));
        }
        other => panic!("unexpected notice {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(channel.state(&handle), SubscriptionState::Closed);
}

#[test]
fn tls_feed_is_rejected_at_connect() {
    let config = ClientConfig::new("https://127.0.0.1:9").unwrap();
    let mut channel = ResultChannel::new(Arc::new(WsTransport::new(&config)));
    channel.open(&PollId::new("p1")).unwrap();
    match next_notice(&mut channel) {
        ChannelNotice::Closed {
            reason: CloseReason::ConnectFailed { message },
            ..
        } => assert!(message.contains("TLS")),
        other => panic!("unexpected notice {:?}", other),
    }
}
