//! Integration tests for the realmwire server over real TCP sockets.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use realmwire::prelude::*;
use realmwire::FrameCodec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// =========================================================================
// Opcodes
// =========================================================================

const SMSG_AUTH_CHALLENGE: Opcode = Opcode(0x01EC);
const CMSG_AUTH_SESSION: Opcode = Opcode(0x01ED);
const SMSG_AUTH_RESPONSE: Opcode = Opcode(0x01EE);
const CMSG_PING: Opcode = Opcode(0x01DC);
const SMSG_PONG: Opcode = Opcode(0x01DD);
const CMSG_ECHO: Opcode = Opcode(0x0050);
const SMSG_ECHO: Opcode = Opcode(0x0051);
const CMSG_SET_NOTE: Opcode = Opcode(0x0070);
const CMSG_STRICT: Opcode = Opcode(0x0060);
const CMSG_PANIC: Opcode = Opcode(0x0061);

const AUTH_OK: u8 = 0x0C;
const AUTH_FAILED: u8 = 0x0D;

// =========================================================================
// Mock world, handlers, and authenticator
// =========================================================================

#[derive(Default)]
struct TestWorld {
    notes: Mutex<Vec<String>>,
}

type World = Arc<TestWorld>;

fn ping(
    _world: &World,
    _session: &Session,
    request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    let nonce = request.read_u32()?;
    let mut pong = PacketWriter::new(SMSG_PONG);
    pong.write_u32(nonce);
    Ok(vec![pong.finish()])
}

fn echo(
    _world: &World,
    session: &Session,
    request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    let text = request.read_string()?;
    let actor = session.actor().map(|a| a.0).unwrap_or_default();
    let mut reply = PacketWriter::new(SMSG_ECHO);
    reply.write_u64(actor).write_string(&text);
    Ok(vec![reply.finish()])
}

fn set_note(
    world: &World,
    _session: &Session,
    request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    let note = request.read_string()?;
    world
        .notes
        .lock()
        .map_err(|_| HandlerError::Rejected("notes poisoned".into()))?
        .push(note);
    Ok(Vec::new())
}

fn strict(
    _world: &World,
    _session: &Session,
    _request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    Err(HandlerError::Violation("movement check failed".into()))
}

fn explode(
    _world: &World,
    _session: &Session,
    _request: &mut PacketReader,
) -> Result<Vec<Message>, HandlerError> {
    panic!("handler bug")
}

fn table() -> DispatchTable<World> {
    DispatchTable::builder()
        .register(CMSG_PING, "ping", Access::Public, ping)
        .and_then(|b| b.register(CMSG_ECHO, "echo", Access::Authenticated, echo))
        .and_then(|b| b.register(CMSG_SET_NOTE, "set_note", Access::Authenticated, set_note))
        .and_then(|b| b.register(CMSG_STRICT, "strict", Access::Authenticated, strict))
        .and_then(|b| b.register(CMSG_PANIC, "explode", Access::Public, explode))
        .expect("opcodes are unique")
        .build()
}

/// Accepts `u64 account` + `u32 proof` when the proof echoes the seed.
struct SeedAuth;

impl Authenticator for SeedAuth {
    async fn authenticate(
        &self,
        seed: u32,
        request: &mut PacketReader,
    ) -> Result<AuthDecision, SessionError> {
        let account = request.read_u64()?;
        let proof = request.read_u32()?;
        if account == 0 || proof != seed {
            return Ok(AuthDecision::Reject {
                reason: format!("bad proof for account {account}"),
                replies: vec![Message::new(SMSG_AUTH_RESPONSE, vec![AUTH_FAILED])],
            });
        }
        Ok(AuthDecision::Accept {
            actor: ActorId(account),
            replies: vec![Message::new(SMSG_AUTH_RESPONSE, vec![AUTH_OK])],
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// Starts a server on a random port and returns its address and world.
async fn start_server() -> (String, World) {
    start_with(RealmwireServer::builder()).await
}

async fn start_with(builder: RealmwireServerBuilder) -> (String, World) {
    let world = World::default();
    let server = builder
        .bind("127.0.0.1:0")
        .build(Arc::clone(&world), table(), SeedAuth)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, world)
}

/// A raw TCP game client speaking the client side of the frame codec.
struct Client {
    stream: TcpStream,
    codec: FrameCodec,
    inbound: BytesMut,
}

impl Client {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("should connect");
        Self {
            stream,
            codec: FrameCodec::new().peer(),
            inbound: BytesMut::new(),
        }
    }

    async fn send(&mut self, msg: &Message) {
        let frame = self.codec.encode_frame(msg).expect("encode");
        self.stream.write_all(&frame).await.expect("send");
    }

    /// Next frame from the server, or `None` once the server hung up.
    async fn recv(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                if let Some(msg) =
                    self.codec.try_extract_frame(&mut self.inbound).expect("valid frame")
                {
                    return Some(msg);
                }
                let mut chunk = [0u8; 1024];
                match self.stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return None,
                    Ok(n) => self.inbound.extend_from_slice(&chunk[..n]),
                }
            }
        })
        .await
        .expect("server should answer or close within 3s")
    }

    async fn expect_closed(&mut self) {
        if let Some(msg) = self.recv().await {
            panic!("expected the connection to close, got {:?}", msg.opcode());
        }
    }

    /// Reads the challenge and returns the seed.
    async fn challenge(&mut self) -> u32 {
        let msg = self.recv().await.expect("challenge frame");
        assert_eq!(msg.opcode(), SMSG_AUTH_CHALLENGE);
        msg.reader().read_u32().expect("seed")
    }

    /// Completes the handshake as `account` and returns the result code.
    async fn login(&mut self, account: u64) -> u8 {
        let seed = self.challenge().await;
        self.login_with_proof(account, seed).await
    }

    async fn login_with_proof(&mut self, account: u64, proof: u32) -> u8 {
        let mut auth = PacketWriter::new(CMSG_AUTH_SESSION);
        auth.write_u64(account).write_u32(proof);
        self.send(&auth.finish()).await;
        let resp = self.recv().await.expect("auth response");
        assert_eq!(resp.opcode(), SMSG_AUTH_RESPONSE);
        resp.reader().read_u8().expect("result code")
    }

    async fn ping(&mut self, nonce: u32) -> u32 {
        let mut w = PacketWriter::new(CMSG_PING);
        w.write_u32(nonce);
        self.send(&w.finish()).await;
        let pong = self.recv().await.expect("pong");
        assert_eq!(pong.opcode(), SMSG_PONG);
        pong.reader().read_u32().expect("nonce")
    }
}

fn string_message(opcode: Opcode, text: &str) -> Message {
    let mut w = PacketWriter::new(opcode);
    w.write_string(text);
    w.finish()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_receives_challenge_seed() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;

    let msg = client.recv().await.expect("challenge");

    assert_eq!(msg.opcode(), SMSG_AUTH_CHALLENGE);
    assert_eq!(msg.body().len(), 4);
}

#[tokio::test]
async fn test_login_with_matching_proof_succeeds() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;

    assert_eq!(client.login(42).await, AUTH_OK);
}

#[tokio::test]
async fn test_login_with_wrong_proof_rejects_and_closes() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    let seed = client.challenge().await;

    let code = client.login_with_proof(42, seed.wrapping_add(1)).await;

    assert_eq!(code, AUTH_FAILED);
    client.expect_closed().await;
}

#[tokio::test]
async fn test_echo_after_login_returns_actor_and_text() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.login(7).await;

    client.send(&string_message(CMSG_ECHO, "for the horde")).await;

    let reply = client.recv().await.expect("echo reply");
    assert_eq!(reply.opcode(), SMSG_ECHO);
    let mut r = reply.reader();
    assert_eq!(r.read_u64().unwrap(), 7);
    assert_eq!(r.read_string().unwrap(), "for the horde");
    assert!(r.is_exhausted());
}

#[tokio::test]
async fn test_public_opcode_works_before_login() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    assert_eq!(client.ping(0xC0FFEE).await, 0xC0FFEE);
}

#[tokio::test]
async fn test_unknown_opcode_keeps_connection_open() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.login(1).await;

    client.send(&Message::new(Opcode(0x7777), vec![1, 2, 3])).await;

    // No reply for the unknown opcode; the next request still works.
    assert_eq!(client.ping(5).await, 5);
}

#[tokio::test]
async fn test_unauthorized_opcode_is_dropped_silently() {
    let (addr, world) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    client.send(&string_message(CMSG_SET_NOTE, "sneaky")).await;
    client.send(&string_message(CMSG_ECHO, "peek")).await;

    // The first reply on the wire is the pong: nothing was sent for the
    // two unauthorized messages.
    assert_eq!(client.ping(9).await, 9);
    assert!(world.notes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_authorized_opcode_mutates_world() {
    let (addr, world) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.login(3).await;

    client.send(&string_message(CMSG_SET_NOTE, "remember me")).await;
    client.ping(1).await;

    assert_eq!(*world.notes.lock().unwrap(), vec!["remember me".to_string()]);
}

#[tokio::test]
async fn test_truncated_body_is_fault_and_keeps_connection() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    // Ping needs four bytes.
    client.send(&Message::new(CMSG_PING, vec![0x01])).await;

    assert_eq!(client.ping(77).await, 77);
}

#[tokio::test]
async fn test_handler_panic_keeps_connection() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    client.send(&Message::empty(CMSG_PANIC)).await;

    assert_eq!(client.ping(11).await, 11);
}

#[tokio::test]
async fn test_violation_disconnects() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.login(4).await;

    client.send(&Message::empty(CMSG_STRICT)).await;

    client.expect_closed().await;
}

#[tokio::test]
async fn test_frames_queued_behind_violation_are_discarded() {
    let (addr, world) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.login(4).await;

    // All three frames land in the server's buffer together.
    let mut ping = PacketWriter::new(CMSG_PING);
    ping.write_u32(1);
    let mut batch = Vec::new();
    for msg in [
        Message::empty(CMSG_STRICT),
        string_message(CMSG_SET_NOTE, "after the violation"),
        ping.finish(),
    ] {
        batch.extend_from_slice(&client.codec.encode_frame(&msg).unwrap());
    }
    client.stream.write_all(&batch).await.unwrap();

    // No pong: the connection closes before the queued ping runs.
    client.expect_closed().await;
    assert!(world.notes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_frames_queued_behind_rejected_login_are_discarded() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    let seed = client.challenge().await;

    let mut auth = PacketWriter::new(CMSG_AUTH_SESSION);
    auth.write_u64(42).write_u32(seed.wrapping_add(1));
    let mut ping = PacketWriter::new(CMSG_PING);
    ping.write_u32(1);
    let mut batch = Vec::new();
    batch.extend_from_slice(&client.codec.encode_frame(&auth.finish()).unwrap());
    batch.extend_from_slice(&client.codec.encode_frame(&ping.finish()).unwrap());
    client.stream.write_all(&batch).await.unwrap();

    let resp = client.recv().await.expect("auth response");
    assert_eq!(resp.opcode(), SMSG_AUTH_RESPONSE);
    assert_eq!(resp.reader().read_u8().unwrap(), AUTH_FAILED);
    client.expect_closed().await;
}

#[tokio::test]
async fn test_violation_with_policy_off_keeps_connection() {
    let config = ServerConfig {
        disconnect_on_violation: false,
        ..ServerConfig::default()
    };
    let (addr, _) = start_with(RealmwireServer::builder().config(config)).await;
    let mut client = Client::connect(&addr).await;
    client.login(4).await;

    client.send(&Message::empty(CMSG_STRICT)).await;

    assert_eq!(client.ping(2).await, 2);
}

#[tokio::test]
async fn test_oversized_frame_disconnects() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    // Declares 65535 bytes against the 10240-byte limit.
    client.stream.write_all(&[0xFF, 0xFF]).await.unwrap();

    client.expect_closed().await;
}

#[tokio::test]
async fn test_frame_shorter_than_opcode_disconnects() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    client.stream.write_all(&[0x01, 0x00, 0xAA]).await.unwrap();

    client.expect_closed().await;
}

#[tokio::test]
async fn test_split_delivery_is_reassembled() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    let mut w = PacketWriter::new(CMSG_PING);
    w.write_u32(0xAABBCCDD);
    let frame = client.codec.encode_frame(&w.finish()).unwrap();

    for byte in frame.iter() {
        client.stream.write_all(&[*byte]).await.unwrap();
        client.stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let pong = client.recv().await.expect("pong");
    assert_eq!(pong.reader().read_u32().unwrap(), 0xAABBCCDD);
}

#[tokio::test]
async fn test_coalesced_frames_are_answered_in_order() {
    let (addr, _) = start_server().await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    let mut batch = Vec::new();
    for nonce in 1..=3u32 {
        let mut w = PacketWriter::new(CMSG_PING);
        w.write_u32(nonce);
        batch.extend_from_slice(&client.codec.encode_frame(&w.finish()).unwrap());
    }
    client.stream.write_all(&batch).await.unwrap();

    for nonce in 1..=3u32 {
        let pong = client.recv().await.expect("pong");
        assert_eq!(pong.reader().read_u32().unwrap(), nonce);
    }
}

#[tokio::test]
async fn test_second_login_for_online_actor_is_refused() {
    let (addr, _) = start_server().await;
    let mut first = Client::connect(&addr).await;
    assert_eq!(first.login(50).await, AUTH_OK);

    let mut second = Client::connect(&addr).await;
    let seed = second.challenge().await;
    let mut auth = PacketWriter::new(CMSG_AUTH_SESSION);
    auth.write_u64(50).write_u32(seed);
    second.send(&auth.finish()).await;

    second.expect_closed().await;
    assert_eq!(first.ping(1).await, 1, "first session is untouched");
}

#[tokio::test]
async fn test_actor_is_released_after_disconnect() {
    let (addr, _) = start_server().await;
    let mut first = Client::connect(&addr).await;
    first.login(60).await;
    drop(first);

    // Release happens when the server notices the hang-up.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut again = Client::connect(&addr).await;
    assert_eq!(again.login(60).await, AUTH_OK);
}

#[tokio::test]
async fn test_handshake_timeout_closes_unauthenticated() {
    let builder =
        RealmwireServer::builder().handshake_timeout(Duration::from_secs(1));
    let (addr, _) = start_with(builder).await;
    let mut client = Client::connect(&addr).await;
    client.challenge().await;

    client.expect_closed().await;
}

#[tokio::test]
async fn test_idle_timeout_closes_authenticated() {
    let builder = RealmwireServer::builder().idle_timeout(Duration::from_secs(1));
    let (addr, _) = start_with(builder).await;
    let mut client = Client::connect(&addr).await;
    assert_eq!(client.login(12).await, AUTH_OK);

    client.expect_closed().await;
}

#[tokio::test]
async fn test_traffic_resets_idle_timeout() {
    let builder = RealmwireServer::builder().idle_timeout(Duration::from_secs(1));
    let (addr, _) = start_with(builder).await;
    let mut client = Client::connect(&addr).await;
    client.login(13).await;

    // Total time exceeds the timeout, but no single gap does.
    for nonce in 0..3u32 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.ping(nonce).await, nonce);
    }
}

#[tokio::test]
async fn test_run_until_shutdown_closes_connections() {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = RealmwireServer::builder()
        .bind("127.0.0.1:0")
        .build(World::default(), table(), SeedAuth)
        .await
        .expect("server should build");
    let addr = server.local_addr().unwrap().to_string();
    let handle = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut client = Client::connect(&addr).await;
    client.login(8).await;
    stop_tx.send(()).unwrap();

    client.expect_closed().await;
    handle.await.unwrap().expect("clean shutdown");
}

#[tokio::test]
async fn test_build_rejects_auth_opcode_registered_as_handler() {
    let table = DispatchTable::<World>::builder()
        .register(CMSG_AUTH_SESSION, "auth", Access::Public, ping)
        .unwrap()
        .build();

    let result = RealmwireServer::builder()
        .bind("127.0.0.1:0")
        .build(World::default(), table, SeedAuth)
        .await;

    assert!(matches!(result, Err(RealmwireError::Config(_))));
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let result = RealmwireServer::builder()
        .bind("127.0.0.1:0")
        .max_message_size(1)
        .build(World::default(), table(), SeedAuth)
        .await;

    assert!(matches!(result, Err(RealmwireError::Config(_))));
}
