#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use wsline_core::protocol::close::{self, CloseInfo};
use wsline_core::protocol::{
    Frame, FrameDecoder, FrameEncoder, ModernVersion, Opcode, ProtocolGeneration, Role, SessionState,
};
use wsline_session::config::{self, SessionConfig};
use wsline_session::obs::EngineMetrics;
use wsline_session::transport::{HeaderVerifier, IoTransport, UpgradeRequest};
use wsline_session::{Engine, Session, SessionHandle, SessionHandler};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

#[derive(Debug, PartialEq)]
enum Event {
    Opened,
    Text(String),
    Binary(Bytes),
    Closed(Option<CloseInfo>),
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
    echo: bool,
}

#[async_trait]
impl SessionHandler for Recorder {
    async fn opened(&mut self, _session: &SessionHandle) {
        let _ = self.tx.send(Event::Opened);
    }

    async fn received_text(&mut self, session: &SessionHandle, text: String) {
        if self.echo {
            session.send_text(text.clone()).unwrap();
        }
        let _ = self.tx.send(Event::Text(text));
    }

    async fn received_binary(&mut self, _session: &SessionHandle, payload: Bytes) {
        let _ = self.tx.send(Event::Binary(payload));
    }

    async fn closed(&mut self, close: Option<CloseInfo>) {
        let _ = self.tx.send(Event::Closed(close));
    }
}

fn modern() -> ProtocolGeneration {
    ProtocolGeneration::Modern(ModernVersion::new(13).unwrap())
}

fn cfg() -> SessionConfig {
    SessionConfig::new(64 * 1024, Duration::from_millis(150))
}

struct Peer {
    io: DuplexStream,
    buf: BytesMut,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
}

impl Peer {
    fn new(io: DuplexStream) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
            decoder: FrameDecoder::new(Role::Client, 1 << 20),
            encoder: FrameEncoder::new(Role::Client),
        }
    }

    async fn send(&mut self, opcode: Opcode, fin: bool, payload: &[u8]) {
        let mut out = BytesMut::new();
        self.encoder.encode_frame(opcode, fin, payload, Some(MASK), &mut out);
        self.io.write_all(&out).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
    }

    async fn frame(&mut self) -> Frame {
        loop {
            if let Some(f) = self.decoder.decode(&mut self.buf).unwrap() {
                return f;
            }
            let n = self.io.read_buf(&mut self.buf).await.unwrap();
            assert!(n > 0, "eof before a full frame");
        }
    }

    async fn raw(&mut self, len: usize) -> Vec<u8> {
        while self.buf.len() < len {
            let n = self.io.read_buf(&mut self.buf).await.unwrap();
            assert!(n > 0, "eof before {len} bytes");
        }
        self.buf.split_to(len).to_vec()
    }

    async fn eof(&mut self) -> bool {
        self.buf.is_empty() && self.io.read_buf(&mut self.buf).await.unwrap() == 0
    }
}

struct Harness {
    peer: Peer,
    handle: SessionHandle,
    task: tokio::task::JoinHandle<()>,
    events: mpsc::UnboundedReceiver<Event>,
}

fn start(generation: ProtocolGeneration, cfg: SessionConfig, echo: bool, metrics: Arc<EngineMetrics>) -> Harness {
    start_on(64 * 1024, generation, cfg, echo, metrics)
}

/// `pipe_bytes` bounds what the transport buffers before writes block.
fn start_on(
    pipe_bytes: usize,
    generation: ProtocolGeneration,
    cfg: SessionConfig,
    echo: bool,
    metrics: Arc<EngineMetrics>,
) -> Harness {
    let (server, client) = tokio::io::duplex(pipe_bytes);
    let (tx, events) = mpsc::unbounded_channel();
    let session = Session::new(generation, IoTransport::new(server), Recorder { tx, echo }, cfg).with_metrics(metrics);
    let handle = session.handle();
    let task = session.start();
    Harness {
        peer: Peer::new(client),
        handle,
        task,
        events,
    }
}

async fn join(task: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("session did not finish")
        .unwrap();
}

fn drain(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = events.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn ping_is_answered_without_notification() {
    let mut h = start(modern(), cfg(), false, Arc::default());

    h.peer.send(Opcode::Ping, true, b"hi").await;
    let pong = h.peer.frame().await;
    assert_eq!(pong.opcode, Opcode::Pong);
    assert!(!pong.masked);
    assert_eq!(&pong.payload[..], b"hi");

    // Exactly one PONG: the next frame on the wire is the application's.
    h.handle.send_text("after").unwrap();
    let next = h.peer.frame().await;
    assert_eq!(next.opcode, Opcode::Text);
    assert_eq!(&next.payload[..], b"after");

    assert_eq!(drain(&mut h.events), vec![Event::Opened]);
    assert_eq!(h.handle.state(), SessionState::Open);
}

#[tokio::test]
async fn ping_is_answered_while_closing() {
    let mut h = start(modern(), cfg(), false, Arc::default());

    h.handle.stop();
    assert_eq!(h.peer.frame().await.opcode, Opcode::Close);
    assert_eq!(h.handle.state(), SessionState::Closing);

    h.peer.send(Opcode::Ping, true, b"P").await;
    let pong = tokio::time::timeout(Duration::from_millis(500), h.peer.frame())
        .await
        .expect("pong while closing");
    assert_eq!(pong.opcode, Opcode::Pong);
    assert_eq!(&pong.payload[..], b"P");

    h.peer.send(Opcode::Close, true, b"\x03\xe8").await;
    join(h.task).await;
    assert_eq!(h.handle.state(), SessionState::Closed);
}

#[tokio::test]
async fn stop_converges_when_peer_stops_reading() {
    let metrics = Arc::new(EngineMetrics::default());
    let h = start_on(64, modern(), cfg(), false, metrics.clone());

    // The client half is never read, so this write cannot complete.
    h.handle.send_binary(vec![0u8; 4096]).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.handle.stop();

    let Harness { handle, task, mut events, peer: _peer } = h;
    join(task).await;
    assert_eq!(handle.state(), SessionState::Closed);
    assert_eq!(drain(&mut events), vec![Event::Opened, Event::Closed(None)]);
    assert_eq!(metrics.closes.get(&[("outcome", "timeout")]), 1);
    assert_eq!(metrics.sessions_active.get(&[("generation", "modern")]), 0);
}

#[tokio::test]
async fn stalled_peer_turns_into_backpressure() {
    let mut cfg = cfg();
    cfg.outbound_queue = 1;
    let h = start_on(64, modern(), cfg, false, Arc::default());

    let mut saw_backpressure = false;
    for _ in 0..100 {
        match h.handle.send_binary(vec![0u8; 1024]) {
            Err(e) => {
                assert_eq!(e.kind().as_str(), "BACKPRESSURE");
                saw_backpressure = true;
                break;
            }
            Ok(()) => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    assert!(saw_backpressure);
    assert_eq!(h.handle.state(), SessionState::Open);

    h.handle.stop();
    join(h.task).await;
}

#[tokio::test]
async fn peer_close_is_echoed_once() {
    let metrics = Arc::new(EngineMetrics::default());
    let mut h = start(modern(), cfg(), false, metrics.clone());

    h.peer.send(Opcode::Close, true, b"\x03\xe8bye").await;
    let echo = h.peer.frame().await;
    assert_eq!(echo.opcode, Opcode::Close);
    assert_eq!(&echo.payload[..], &[0x03, 0xe8]);

    join(h.task).await;
    assert!(h.peer.eof().await);
    assert_eq!(
        drain(&mut h.events),
        vec![Event::Opened, Event::Closed(Some(CloseInfo::with_reason(close::NORMAL, "bye")))]
    );
    assert_eq!(metrics.closes.get(&[("outcome", "peer")]), 1);
    assert_eq!(metrics.sessions_active.get(&[("generation", "modern")]), 0);
}

#[tokio::test]
async fn fragments_are_delivered_as_one_message() {
    let mut h = start(modern(), cfg(), false, Arc::default());

    h.peer.send(Opcode::Text, false, b"hel").await;
    h.peer.send(Opcode::Ping, true, b"").await;
    h.peer.send(Opcode::Continuation, true, b"lo").await;
    h.peer.send(Opcode::Binary, true, &[1, 2, 3]).await;

    // The interleaved ping is answered before the message completes.
    assert_eq!(h.peer.frame().await.opcode, Opcode::Pong);

    h.handle.stop();
    assert_eq!(h.peer.frame().await.opcode, Opcode::Close);
    h.peer.send(Opcode::Close, true, b"\x03\xe8").await;
    join(h.task).await;

    assert_eq!(
        drain(&mut h.events),
        vec![
            Event::Opened,
            Event::Text("hello".into()),
            Event::Binary(Bytes::from_static(&[1, 2, 3])),
            Event::Closed(Some(CloseInfo::code(close::NORMAL))),
        ]
    );
}

#[tokio::test]
async fn unmasked_client_frame_closes_with_protocol_error() {
    let metrics = Arc::new(EngineMetrics::default());
    let mut h = start(modern(), cfg(), false, metrics.clone());

    // text "hi", no mask bit
    h.peer.send_raw(&[0x81, 0x02, b'h', b'i']).await;
    let reply = h.peer.frame().await;
    assert_eq!(reply.opcode, Opcode::Close);
    assert_eq!(&reply.payload[..], &close::PROTOCOL_ERROR.to_be_bytes());

    join(h.task).await;
    assert_eq!(drain(&mut h.events), vec![Event::Opened, Event::Closed(None)]);
    assert_eq!(metrics.protocol_violations.get(&[("reason", "UNMASKED_FRAME")]), 1);
}

#[tokio::test]
async fn invalid_utf8_text_is_a_violation() {
    let mut h = start(modern(), cfg(), false, Arc::default());

    h.peer.send(Opcode::Text, true, &[0xc3, 0x28]).await;
    let reply = h.peer.frame().await;
    assert_eq!(&reply.payload[..], &close::PROTOCOL_ERROR.to_be_bytes());
    join(h.task).await;
    assert_eq!(drain(&mut h.events), vec![Event::Opened, Event::Closed(None)]);
}

#[tokio::test]
async fn continuation_without_message_is_a_violation() {
    let mut h = start(modern(), cfg(), false, Arc::default());

    h.peer.send(Opcode::Continuation, true, b"x").await;
    let reply = h.peer.frame().await;
    assert_eq!(reply.opcode, Opcode::Close);
    assert_eq!(&reply.payload[..], &close::PROTOCOL_ERROR.to_be_bytes());
    join(h.task).await;
}

#[tokio::test]
async fn repeated_stop_closes_once() {
    let mut h = start(modern(), cfg(), false, Arc::default());

    h.handle.stop();
    h.handle.stop();
    let reply = h.peer.frame().await;
    assert_eq!(reply.opcode, Opcode::Close);
    assert_eq!(&reply.payload[..], &[0x03, 0xe8]);

    h.handle.stop();
    h.peer.send(Opcode::Close, true, &reply.payload).await;
    join(h.task).await;

    let events = drain(&mut h.events);
    let closed = events.iter().filter(|e| matches!(e, Event::Closed(_))).count();
    assert_eq!(closed, 1);
    assert_eq!(h.handle.state(), SessionState::Closed);
}

#[tokio::test]
async fn close_timeout_forces_closed() {
    let metrics = Arc::new(EngineMetrics::default());
    let mut h = start(modern(), cfg(), false, metrics.clone());

    h.handle.stop();
    assert_eq!(h.peer.frame().await.opcode, Opcode::Close);
    assert_eq!(h.handle.state(), SessionState::Closing);

    // Never echo; the deadline must fire.
    join(h.task).await;
    assert_eq!(h.handle.state(), SessionState::Closed);
    assert_eq!(drain(&mut h.events), vec![Event::Opened, Event::Closed(None)]);
    assert_eq!(metrics.closes.get(&[("outcome", "timeout")]), 1);
}

#[tokio::test]
async fn transport_eof_closes_session() {
    let h = start(modern(), cfg(), false, Arc::default());
    let Harness { peer, task, mut events, .. } = h;

    drop(peer);
    join(task).await;
    assert_eq!(drain(&mut events), vec![Event::Opened, Event::Closed(None)]);
}

#[tokio::test]
async fn send_after_close_is_rejected() {
    let mut h = start(modern(), cfg(), false, Arc::default());

    h.peer.send(Opcode::Close, true, b"").await;
    assert_eq!(h.peer.frame().await.opcode, Opcode::Close);
    join(h.task).await;

    let err = h.handle.send_text("late").unwrap_err();
    assert_eq!(err.kind().as_str(), "CLOSED");
    assert!(h.handle.send_binary(vec![1u8]).is_err());
}

#[tokio::test]
async fn outbound_messages_are_fragmented() {
    let mut cfg = cfg();
    cfg.max_frame_bytes = Some(4);
    let mut h = start(modern(), cfg, false, Arc::default());

    h.handle.send_text("abcdefgh").unwrap();
    let first = h.peer.frame().await;
    assert_eq!((first.opcode, first.fin), (Opcode::Text, false));
    assert_eq!(&first.payload[..], b"abcd");
    let second = h.peer.frame().await;
    assert_eq!((second.opcode, second.fin), (Opcode::Continuation, true));
    assert_eq!(&second.payload[..], b"efgh");
}

#[tokio::test]
async fn raw_frames_are_modern_only() {
    let mut h = start(modern(), cfg(), false, Arc::default());
    h.handle.send_raw_frame(Opcode::Ping, &b"beat"[..]).unwrap();
    let ping = h.peer.frame().await;
    assert_eq!(ping.opcode, Opcode::Ping);
    assert_eq!(&ping.payload[..], b"beat");

    let err = h.handle.send_raw_frame(Opcode::Ping, vec![0u8; 126]).unwrap_err();
    assert_eq!(err.kind().as_str(), "UNSUPPORTED");

    let legacy = start(ProtocolGeneration::Legacy76, cfg(), false, Arc::default());
    let err = legacy.handle.send_raw_frame(Opcode::Text, &b"x"[..]).unwrap_err();
    assert_eq!(err.kind().as_str(), "UNSUPPORTED");
}

#[tokio::test]
async fn legacy_text_round_trip_and_close() {
    let mut h = start(ProtocolGeneration::Legacy76, cfg(), true, Arc::default());

    h.peer.send_raw(b"\x00hello\xff").await;
    assert_eq!(h.peer.raw(7).await, b"\x00hello\xff");

    h.peer.send_raw(&[0xff, 0x00]).await;
    assert_eq!(h.peer.raw(2).await, vec![0xff, 0x00]);
    join(h.task).await;

    assert_eq!(
        drain(&mut h.events),
        vec![Event::Opened, Event::Text("hello".into()), Event::Closed(None)]
    );
}

#[tokio::test]
async fn legacy75_stop_closes_immediately() {
    let mut h = start(ProtocolGeneration::Legacy75, cfg(), false, Arc::default());

    h.handle.stop();
    join(h.task).await;
    assert!(h.peer.eof().await);
    assert_eq!(drain(&mut h.events), vec![Event::Opened, Event::Closed(None)]);
}

#[tokio::test]
async fn rejected_handshake_builds_no_session() {
    let (server, _client) = tokio::io::duplex(1024);
    let (tx, _events) = mpsc::unbounded_channel();
    let plain = UpgradeRequest::new("GET").header("Host", "example.com");

    let res = Session::accept(&plain, &HeaderVerifier, IoTransport::new(server), Recorder { tx, echo: false }, cfg());
    let err = res.err().expect("must reject");
    assert_eq!(err.kind().as_str(), "HANDSHAKE_REJECTED");
}

#[tokio::test]
async fn engine_registers_and_shuts_down() {
    let engine = Engine::new(
        config::load_from_str(
            r#"
version: 1
session:
  max_message_bytes: 65536
  close_timeout_ms: 200
"#,
        )
        .unwrap(),
    )
    .unwrap();

    let hixie75 = UpgradeRequest::new("GET")
        .header("Upgrade", "WebSocket")
        .header("Connection", "Upgrade");
    let (server, _client) = tokio::io::duplex(1024);
    let (tx, _events) = mpsc::unbounded_channel();
    let handle = engine
        .accept(&hixie75, IoTransport::new(server), Recorder { tx, echo: false })
        .unwrap();
    assert_eq!(handle.generation(), ProtocolGeneration::Legacy75);
    assert!(engine.registry().get(handle.id()).is_some());

    let (server, _client2) = tokio::io::duplex(1024);
    let (tx, _events2) = mpsc::unbounded_channel();
    let plain = UpgradeRequest::new("GET");
    assert!(engine.accept(&plain, IoTransport::new(server), Recorder { tx, echo: false }).is_err());
    assert_eq!(engine.metrics().handshake_rejections.get(&[("reason", "HANDSHAKE_REJECTED")]), 1);
    assert_eq!(engine.len(), 1);

    tokio::time::timeout(Duration::from_secs(2), engine.shutdown()).await.unwrap();
    assert_eq!(handle.state(), SessionState::Closed);

    tokio::time::timeout(Duration::from_secs(2), async {
        while !engine.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("registry drained");
}

#[tokio::test]
async fn stop_before_start_skips_opened() {
    let (server, _client) = tokio::io::duplex(1024);
    let (tx, mut events) = mpsc::unbounded_channel();
    let session = Session::new(modern(), IoTransport::new(server), Recorder { tx, echo: false }, cfg());
    let handle = session.handle();
    assert_eq!(session.state(), SessionState::Created);

    handle.stop();
    assert_eq!(handle.state(), SessionState::Closed);
    tokio::time::timeout(Duration::from_secs(1), handle.wait_closed())
        .await
        .expect("unstarted session reports closed");
    assert!(handle.send_text("x").is_err());

    join(session.start()).await;
    assert_eq!(drain(&mut events), vec![Event::Closed(None)]);
    assert_eq!(handle.state(), SessionState::Closed);
}

#[tokio::test]
async fn accept_validates_config() {
    let (server, _client) = tokio::io::duplex(1024);
    let (tx, _events) = mpsc::unbounded_channel();
    let req = UpgradeRequest::new("GET")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Version", "13");

    let bad = SessionConfig::new(0, Duration::from_secs(1));
    let res = Session::accept(&req, &HeaderVerifier, IoTransport::new(server), Recorder { tx, echo: false }, bad);
    let err = res.err().expect("must reject");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[tokio::test]
async fn failed_close_write_counts_one_outcome() {
    let metrics = Arc::new(EngineMetrics::default());
    let h = start(modern(), cfg(), false, metrics.clone());
    let Harness { mut peer, task, .. } = h;

    // Unmasked frame, then the peer vanishes before the CLOSE(1002) can be read.
    peer.send_raw(&[0x81, 0x02, b'h', b'i']).await;
    drop(peer);
    join(task).await;

    let total: u64 = ["peer", "local", "timeout", "transport", "stalled", "protocol_error"]
        .iter()
        .map(|o| metrics.closes.get(&[("outcome", *o)]))
        .sum();
    assert_eq!(total, 1);
}
