//! End-to-end tests over real TCP sockets.
//!
//! Each test binds a server on an ephemeral port with an in-memory store and
//! talks to it through plain `TcpStream` clients.

use std::time::Duration;

use huddle_server::{
    GroupRecord, Hub, Limits, MemoryStore, RecordStore, Server, ServerConfig, UserRecord,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self { lines: BufReader::new(reader).lines(), writer }
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }

    /// Next line from the server, `None` once it closed the connection.
    async fn next(&mut self) -> Option<String> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("server should answer within timeout")
            .unwrap_or(None)
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.next().await.as_deref(), Some(line));
    }

    async fn expect_closed(&mut self) {
        assert_eq!(self.next().await, None, "server should close the connection");
    }

    async fn login(addr: &str, name: &str, password: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send("L").await;
        client.send(name).await;
        client.send(password).await;
        client.expect("Logged in successfully.").await;
        client
    }
}

/// Start a server seeded with bob (admin of eng) and return its address.
async fn start_server(limits: Limits) -> (String, Hub<MemoryStore>) {
    let store = MemoryStore::with_records(
        vec![UserRecord::new("bob", "hunter2", vec!["eng".into()])],
        vec![GroupRecord::new("eng", "bob")],
    );
    let config = ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        accept_interval: Duration::ZERO,
        limits,
        ..ServerConfig::default()
    };

    let server = Server::bind(config, store).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let hub = server.hub().clone();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, hub)
}

#[tokio::test]
async fn register_and_chat_over_tcp() {
    let (addr, hub) = start_server(Limits::default()).await;

    let mut bob = Client::login(&addr, "bob", "hunter2").await;

    let mut alice = Client::connect(&addr).await;
    alice.send("R").await;
    alice.send("alice").await;
    alice.send("pw1234").await;
    alice.expect("Groups List:").await;
    alice.expect("1. eng").await;
    alice.expect("Enter groups to join (comma separated):").await;
    alice.send("eng").await;
    alice.expect("Registered successfully.").await;

    alice.send("hello everyone").await;
    bob.expect("alice: hello everyone").await;

    alice.send("mgroup eng standup in 5").await;
    bob.expect("[eng]alice: standup in 5").await;

    bob.send("acontact alice").await;
    bob.expect("Contact alice was added to your list.").await;
    bob.send("pm alice thanks").await;
    alice.expect("[PM]bob: thanks").await;

    alice.send("exit").await;
    bob.expect("alice has left").await;
    alice.expect_closed().await;

    assert!(hub.registry.find_by_name("alice").is_none());
    assert_eq!(hub.directory.memberships("alice"), Vec::<String>::new());
    assert!(hub.store.find_user("alice").unwrap().is_some());
}

#[tokio::test]
async fn wrong_password_closes_connection() {
    let (addr, hub) = start_server(Limits::default()).await;

    let mut client = Client::connect(&addr).await;
    client.send("L").await;
    client.send("bob").await;
    client.send("wrong").await;

    client.expect("Log in failed.").await;
    client.expect_closed().await;
    assert_eq!(hub.registry.session_count(), 0);
}

#[tokio::test]
async fn oversized_token_closes_connection() {
    let (addr, _hub) = start_server(Limits::default()).await;

    let mut client = Client::connect(&addr).await;
    client.send("R").await;
    client.send(&"x".repeat(100)).await;

    client.expect_closed().await;
}

#[tokio::test]
async fn connections_past_session_limit_are_dropped() {
    let limits = Limits { max_sessions: 1, ..Limits::default() };
    let (addr, _hub) = start_server(limits).await;

    let mut bob = Client::login(&addr, "bob", "hunter2").await;

    let mut refused = Client::connect(&addr).await;
    refused.expect_closed().await;

    bob.send("sgroups").await;
    bob.expect("Groups List:").await;
    bob.expect("1. eng").await;
}

#[tokio::test]
async fn slot_is_reusable_after_disconnect() {
    let limits = Limits { max_sessions: 1, ..Limits::default() };
    let (addr, _hub) = start_server(limits).await;

    let mut bob = Client::login(&addr, "bob", "hunter2").await;
    bob.send("exit").await;
    bob.expect_closed().await;

    // the permit is returned once the connection task finishes
    let mut again = None;
    for _ in 0..50 {
        let mut client = Client::connect(&addr).await;
        // a refused connection may already be reset
        let _ = client.writer.write_all(b"L\nbob\nhunter2\n").await;
        if client.next().await.as_deref() == Some("Logged in successfully.") {
            again = Some(client);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(again.is_some(), "second login should eventually be admitted");
}
