//! End-to-end tests: a real server on an ephemeral loopback port, driven by
//! `ChatClient`s and by raw sockets speaking the frame format directly.
//!
//! Raw sockets cover the cases a well-behaved client never produces, such as
//! oversized frames or chat before a nickname.

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tcp_chat::codec;
use tcp_chat::message::MessageType;
use tcp_chat::session::SessionSocket;
use tcp_chat::{
    ChatClient, ChatServer, ClientConfig, ClientEvent, Message, Nickname, Registry,
    ServerConfig, ServerHandle, ShutdownReport, StatusCode,
};

const WAIT: Duration = Duration::from_secs(5);

// ── Harness ──────────────────────────────────────────────────────────────────

struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    registry: Arc<Registry>,
    thread: Option<JoinHandle<ShutdownReport>>,
}

impl TestServer {
    fn start(max_clients: usize) -> Self {
        let config = ServerConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            max_clients,
            join_timeout_ms: 200,
            accept_poll_ms: 10,
        };
        let server = ChatServer::bind(config).expect("bind");
        let addr = server.local_addr();
        let handle = server.handle();
        let registry = server.registry();
        let thread = Some(thread::spawn(move || server.run()));
        Self {
            addr,
            handle,
            registry,
            thread,
        }
    }

    fn address(&self) -> String {
        self.addr.to_string()
    }

    fn stop(&mut self) -> ShutdownReport {
        self.handle.shutdown();
        self.thread
            .take()
            .map(|t| t.join().expect("server thread"))
            .unwrap_or_default()
    }

    fn wait_for_sessions(&self, count: usize) {
        let deadline = Instant::now() + WAIT;
        while self.registry.count() != count {
            assert!(
                Instant::now() < deadline,
                "expected {} sessions, have {}",
                count,
                self.registry.count()
            );
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn client_config() -> ClientConfig {
    ClientConfig {
        receive_timeout_ms: 50,
        ..ClientConfig::default()
    }
}

/// Skip events until one matches
fn wait_for<F>(rx: &Receiver<ClientEvent>, what: &str, pred: F) -> ClientEvent
where
    F: Fn(&ClientEvent) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => {}
            Err(_) => panic!("timed out waiting for {}", what),
        }
    }
}

fn join(server: &TestServer, nickname: &str) -> (ChatClient, Receiver<ClientEvent>) {
    let (client, rx) = ChatClient::new(client_config());
    client
        .connect_with_nickname(&server.address(), nickname)
        .expect("connect");
    wait_for(&rx, "nickname accepted", |e| {
        matches!(
            e,
            ClientEvent::NicknameResponse {
                status: StatusCode::Success,
                ..
            }
        )
    });
    assert!(client.has_nickname());
    (client, rx)
}

fn chat(username: &str, message: &str) -> ClientEvent {
    ClientEvent::Chat {
        username: username.to_string(),
        message: message.to_string(),
    }
}

fn raw_connect(server: &TestServer) -> TcpStream {
    let stream = TcpStream::connect(server.addr).expect("raw connect");
    stream.set_read_timeout(Some(WAIT)).unwrap();
    stream
}

/// Read frames until one matches
fn read_until<F>(stream: &mut TcpStream, pred: F) -> Message
where
    F: Fn(&Message) -> bool,
{
    loop {
        let (_, decoded) = codec::read_message(stream).expect("frame");
        let msg = decoded.expect("decodable frame");
        if pred(&msg) {
            return msg;
        }
    }
}

fn raw_join(server: &TestServer, nickname: &str) -> TcpStream {
    let mut stream = raw_connect(server);
    codec::write_message(
        &mut stream,
        &Message::NicknameRequest {
            nickname: nickname.to_string(),
        },
    )
    .unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(
        reply,
        Message::response(StatusCode::Success, "Nickname set successfully")
    );
    stream
}

// ── Join and chat ────────────────────────────────────────────────────────────

#[test]
fn test_chat_reaches_every_named_user() {
    let server = TestServer::start(10);
    let (alice, alice_rx) = join(&server, "Alice");
    wait_for(&alice_rx, "welcome", |e| {
        *e == chat(
            "Server",
            "Welcome to the chat server, Alice! You are now fully connected.",
        )
    });

    let (bob, bob_rx) = join(&server, "Bob");
    wait_for(&bob_rx, "other users notice", |e| {
        *e == chat("Server", "There is 1 other user in the chat.")
    });
    wait_for(&alice_rx, "Bob joined", |e| {
        *e == ClientEvent::UserJoined {
            username: "Bob".to_string(),
        }
    });

    bob.send_chat("hello").unwrap();
    wait_for(&alice_rx, "chat at Alice", |e| *e == chat("Bob", "hello"));
    wait_for(&bob_rx, "echo at Bob", |e| *e == chat("Bob", "hello"));

    alice.send_chat("hi bob").unwrap();
    wait_for(&bob_rx, "reply at Bob", |e| *e == chat("Alice", "hi bob"));
}

#[test]
fn test_roster_lists_all_named_users() {
    let server = TestServer::start(10);
    let (_alice, _alice_rx) = join(&server, "Alice");
    let (_bob, _bob_rx) = join(&server, "Bob");
    let (_carol, carol_rx) = join(&server, "Carol");

    let roster = wait_for(&carol_rx, "full roster", |e| {
        matches!(e, ClientEvent::UserList { users } if users.len() == 3)
    });
    let ClientEvent::UserList { mut users } = roster else {
        unreachable!()
    };
    users.sort();
    assert_eq!(users, vec!["Alice", "Bob", "Carol"]);
    assert_eq!(server.registry.named_count(), 3);
}

// ── Nickname rules ───────────────────────────────────────────────────────────

#[test]
fn test_duplicate_nickname_is_rejected_and_disconnected() {
    let server = TestServer::start(10);
    let (_alice, alice_rx) = join(&server, "Alice");

    let (imposter, imposter_rx) = ChatClient::new(client_config());
    imposter
        .connect_with_nickname(&server.address(), "Alice")
        .unwrap();

    let response = wait_for(&imposter_rx, "rejection", |e| {
        matches!(e, ClientEvent::NicknameResponse { .. })
    });
    assert_eq!(
        response,
        ClientEvent::NicknameResponse {
            status: StatusCode::NicknameTaken,
            message: "Nickname is already in use".to_string(),
        }
    );
    wait_for(&imposter_rx, "disconnect", |e| {
        *e == ClientEvent::Disconnected
    });
    assert!(!imposter.is_connected());

    // Only the original Alice is named; nobody announced a second one
    assert_eq!(server.registry.named_count(), 1);
    while let Ok(event) = alice_rx.recv_timeout(Duration::from_millis(200)) {
        assert!(!matches!(event, ClientEvent::UserJoined { .. }));
    }
}

#[test]
fn test_nickname_is_freed_after_leaving() {
    let server = TestServer::start(10);
    let (first, _rx) = join(&server, "Alice");
    first.disconnect();
    server.wait_for_sessions(0);

    let (_second, _rx) = join(&server, "Alice");
}

#[test]
fn test_short_nickname_rejected_by_server() {
    let server = TestServer::start(10);
    let mut stream = raw_connect(&server);
    codec::write_message(
        &mut stream,
        &Message::NicknameRequest {
            nickname: "A".to_string(),
        },
    )
    .unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(
        reply,
        Message::response(
            StatusCode::Error,
            "Nickname too short (minimum 2 characters)"
        )
    );
}

#[test]
fn test_join_sequence_for_first_user() {
    let server = TestServer::start(10);
    let mut stream = raw_join(&server, "Ann");

    let (_, welcome) = codec::read_message(&mut stream).unwrap();
    assert_eq!(
        welcome.unwrap(),
        Message::Chat {
            username: "Server".to_string(),
            message: "Welcome to the chat server, Ann! You are now fully connected.".to_string(),
        }
    );
    let (_, roster) = codec::read_message(&mut stream).unwrap();
    let Message::UserList(roster) = roster.unwrap() else {
        panic!("expected roster");
    };
    assert_eq!(roster.users(), ["Ann".to_string()]);
}

#[test]
fn test_empty_nickname_can_be_retried() {
    let server = TestServer::start(10);
    let mut stream = raw_connect(&server);
    codec::write_message(
        &mut stream,
        &Message::NicknameRequest {
            nickname: String::new(),
        },
    )
    .unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(
        reply,
        Message::rejection("Nickname too short (minimum 2 characters)")
    );

    codec::write_message(
        &mut stream,
        &Message::NicknameRequest {
            nickname: "Ann".to_string(),
        },
    )
    .unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(
        reply,
        Message::response(StatusCode::Success, "Nickname set successfully")
    );
}

#[test]
fn test_chat_before_nickname_gets_notice() {
    let server = TestServer::start(10);
    let mut stream = raw_connect(&server);
    codec::write_message(
        &mut stream,
        &Message::Chat {
            username: "ghost".to_string(),
            message: "anyone?".to_string(),
        },
    )
    .unwrap();

    let notice = read_until(&mut stream, |m| matches!(m, Message::Chat { .. }));
    assert_eq!(
        notice,
        Message::Chat {
            username: "Server".to_string(),
            message: "You must set a nickname before sending messages".to_string(),
        }
    );
}

#[test]
fn test_named_session_can_rename() {
    let server = TestServer::start(10);
    let (_alice, alice_rx) = join(&server, "Alice");
    let mut stream = raw_join(&server, "Ann");

    codec::write_message(
        &mut stream,
        &Message::NicknameRequest {
            nickname: "Bea".to_string(),
        },
    )
    .unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(
        reply,
        Message::response(StatusCode::Success, "Nickname set successfully")
    );

    wait_for(&alice_rx, "Bea joined", |e| {
        matches!(e, ClientEvent::UserJoined { username } if username == "Bea")
    });
    let roster = wait_for(&alice_rx, "roster with Bea", |e| {
        matches!(e, ClientEvent::UserList { users } if users.iter().any(|u| u == "Bea"))
    });
    let ClientEvent::UserList { mut users } = roster else {
        unreachable!()
    };
    users.sort();
    assert_eq!(users, vec!["Alice", "Bea"]);

    // The name already held counts as taken
    codec::write_message(
        &mut stream,
        &Message::NicknameRequest {
            nickname: "Bea".to_string(),
        },
    )
    .unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(
        reply,
        Message::response(StatusCode::NicknameTaken, "Nickname is already in use")
    );
}

// ── Framing limits ───────────────────────────────────────────────────────────

#[test]
fn test_oversized_chat_frame_keeps_session_alive() {
    let server = TestServer::start(10);
    let mut stream = raw_join(&server, "Raw");

    let oversized = codec::encode_frame(MessageType::Chat as u8, &[0u8; 2000]).unwrap();
    stream.write_all(&oversized).unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(reply, Message::rejection("Message too large"));

    // The stream is still aligned on frame boundaries
    codec::write_message(
        &mut stream,
        &Message::Chat {
            username: "Raw".to_string(),
            message: "still here".to_string(),
        },
    )
    .unwrap();
    let echo = read_until(&mut stream, |m| matches!(m, Message::Chat { username, .. } if username == "Raw"));
    assert_eq!(
        echo,
        Message::Chat {
            username: "Raw".to_string(),
            message: "still here".to_string(),
        }
    );
}

#[test]
fn test_undersized_nickname_frame_rejected() {
    let server = TestServer::start(10);
    let mut stream = raw_connect(&server);

    let short = codec::encode_frame(MessageType::Nickname as u8, b"Ann\0").unwrap();
    stream.write_all(&short).unwrap();
    let reply = read_until(&mut stream, |m| {
        matches!(m, Message::NicknameResponse { .. })
    });
    assert_eq!(reply, Message::rejection("Message too small"));
}

#[test]
fn test_unknown_frame_type_is_skipped() {
    let server = TestServer::start(10);
    let mut stream = raw_join(&server, "Ann");

    let junk = codec::encode_frame(42, b"junk").unwrap();
    stream.write_all(&junk).unwrap();
    codec::write_message(
        &mut stream,
        &Message::Chat {
            username: "Ann".to_string(),
            message: "hi".to_string(),
        },
    )
    .unwrap();

    let echo = read_until(&mut stream, |m| matches!(m, Message::Chat { username, .. } if username == "Ann"));
    assert_eq!(
        echo,
        Message::Chat {
            username: "Ann".to_string(),
            message: "hi".to_string(),
        }
    );
}

// ── Leave notifications ──────────────────────────────────────────────────────

#[test]
fn test_leave_notifies_remaining_users() {
    let server = TestServer::start(10);
    let (_alice, alice_rx) = join(&server, "Alice");
    let (bob, _bob_rx) = join(&server, "Bob");
    wait_for(&alice_rx, "Bob joined", |e| {
        matches!(e, ClientEvent::UserJoined { username } if username == "Bob")
    });

    bob.disconnect();
    wait_for(&alice_rx, "Bob left", |e| {
        *e == ClientEvent::UserLeft {
            username: "Bob".to_string(),
        }
    });
    let roster = wait_for(&alice_rx, "roster after leave", |e| {
        matches!(e, ClientEvent::UserList { .. })
    });
    assert_eq!(
        roster,
        ClientEvent::UserList {
            users: vec!["Alice".to_string()]
        }
    );
}

#[test]
fn test_abrupt_close_counts_as_leave() {
    let server = TestServer::start(10);
    let (_alice, alice_rx) = join(&server, "Alice");
    let stream = raw_join(&server, "Raw");
    wait_for(&alice_rx, "Raw joined", |e| {
        matches!(e, ClientEvent::UserJoined { username } if username == "Raw")
    });

    drop(stream);
    wait_for(&alice_rx, "Raw left", |e| {
        matches!(e, ClientEvent::UserLeft { username } if username == "Raw")
    });
    server.wait_for_sessions(1);
}

#[test]
fn test_unnamed_leave_pushes_one_roster() {
    let server = TestServer::start(10);
    let mut stream = raw_join(&server, "Ann");

    // Welcome, then the roster refresh and Ann's own roster push
    let (_, welcome) = codec::read_message(&mut stream).unwrap();
    assert!(matches!(welcome.unwrap(), Message::Chat { .. }));
    for _ in 0..2 {
        let (_, roster) = codec::read_message(&mut stream).unwrap();
        assert!(matches!(roster.unwrap(), Message::UserList(_)));
    }

    let unnamed = raw_connect(&server);
    server.wait_for_sessions(2);
    drop(unnamed);
    server.wait_for_sessions(1);

    let (_, roster) = codec::read_message(&mut stream).unwrap();
    let Message::UserList(roster) = roster.unwrap() else {
        panic!("expected roster");
    };
    assert_eq!(roster.users(), ["Ann".to_string()]);

    stream
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let extra = codec::read_message(&mut stream).unwrap_err();
    assert!(extra.is_timeout(), "unexpected frame or error: {}", extra);
}

// ── Registry under concurrency ───────────────────────────────────────────────

#[test]
fn test_registry_consistent_under_concurrent_churn() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(Registry::with_capacity(64));

    let workers: Vec<_> = (0..16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let peer = TcpStream::connect(addr).unwrap();
                let socket = Arc::new(SessionSocket::new(peer));
                let id = registry.add(socket).unwrap();
                let name = Nickname::parse(&format!("user-{}", i)).unwrap();
                registry.claim_nickname(id, &name).unwrap();
                if i % 2 == 0 {
                    registry.remove(id).unwrap().close();
                }
            })
        })
        .collect();

    let accepted: Vec<_> = (0..16).map(|_| listener.accept().unwrap().0).collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(registry.count(), 8);
    assert_eq!(registry.named_count(), 8);
    let roster = registry.build_roster();
    assert_eq!(roster.len(), registry.count());

    let mut users = roster.into_users();
    users.sort();
    let mut expected: Vec<_> = (0..16)
        .filter(|i| i % 2 == 1)
        .map(|i| format!("user-{}", i))
        .collect();
    expected.sort();
    assert_eq!(users, expected);
    drop(accepted);
}

// ── Capacity and shutdown ────────────────────────────────────────────────────

#[test]
fn test_connection_over_capacity_is_closed() {
    let server = TestServer::start(2);
    let _first = raw_connect(&server);
    let _second = raw_connect(&server);
    server.wait_for_sessions(2);

    let mut third = raw_connect(&server);
    assert!(codec::read_message(&mut third).is_err());
    assert_eq!(server.registry.count(), 2);
}

#[test]
fn test_shutdown_with_idle_clients() {
    let mut server = TestServer::start(10);
    let (client, rx) = join(&server, "Alice");
    let _idle = raw_connect(&server);
    server.wait_for_sessions(2);
    assert!(server.handle.is_running());

    let report = server.stop();
    assert!(!server.handle.is_running());
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.joined + report.forced, 2);
    assert_eq!(server.registry.count(), 0);

    wait_for(&rx, "disconnect", |e| *e == ClientEvent::Disconnected);
    assert!(!client.is_connected());
}
