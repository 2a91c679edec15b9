//! The per-session task.
//!
//! Owns decoder, assembler, legacy codec and the lifecycle state; everything
//! here runs sequentially on one tokio task. Two companion tasks own the
//! transport halves: the reader forwards chunks, the writer drains an
//! outbound queue of encoded frames. The actor never awaits the transport
//! itself, so stop requests and the close deadline stay live while a peer
//! is slow to read.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use wsline_core::error::{Violation, WsError};
use wsline_core::protocol::close::{self, CloseInfo};
use wsline_core::protocol::{
    Assembled, ControlAction, ControlHandler, Frame, FrameDecoder, FrameEncoder, LegacyCodec, LegacyFrame,
    MessageAssembler, MessageKind, Opcode, ProtocolGeneration, Role, SessionState,
};

use crate::config::SessionConfig;
use crate::obs::EngineMetrics;
use crate::transport::{TransportReader, TransportWriter};

use super::handle::{Command, SessionHandle};
use super::handler::SessionHandler;

// Chunks buffered between the reader task and the actor.
const READ_QUEUE: usize = 16;

// Outbound slots kept free for PONG and CLOSE once data sends fill the queue.
const CONTROL_RESERVE: usize = 4;

enum IoEvent {
    Data(Bytes),
    Eof,
    ReadFailed(WsError),
    WriteFailed(WsError),
}

struct Outbound {
    buf: Bytes,
    label: &'static str,
}

/// Why a session ended; recorded once per session in `wsline_closes_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Peer,
    Local,
    Timeout,
    Transport,
    Stalled,
    ProtocolError,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Peer => "peer",
            Outcome::Local => "local",
            Outcome::Timeout => "timeout",
            Outcome::Transport => "transport",
            Outcome::Stalled => "stalled",
            Outcome::ProtocolError => "protocol_error",
        }
    }

    /// Queued frames are flushed before release unless the writer is known stuck.
    fn flushes(self) -> bool {
        !matches!(self, Outcome::Timeout | Outcome::Stalled)
    }
}

enum Decoded {
    Frame(Frame),
    Legacy(LegacyFrame),
}

struct ModernCodec {
    decoder: FrameDecoder,
    assembler: MessageAssembler,
    encoder: FrameEncoder,
}

enum Codec {
    Legacy(LegacyCodec),
    Modern(ModernCodec),
}

impl Codec {
    fn new(generation: ProtocolGeneration, cfg: &SessionConfig) -> Self {
        match generation {
            ProtocolGeneration::Legacy75 | ProtocolGeneration::Legacy76 => {
                Codec::Legacy(LegacyCodec::new(generation, cfg.max_message_bytes))
            }
            ProtocolGeneration::Modern(_) => Codec::Modern(ModernCodec {
                decoder: FrameDecoder::new(Role::Server, cfg.max_frame_bytes()),
                assembler: MessageAssembler::new(cfg.max_message_bytes),
                encoder: FrameEncoder::new(Role::Server),
            }),
        }
    }
}

pub(crate) struct Actor<H> {
    generation: ProtocolGeneration,
    cfg: SessionConfig,
    handler: H,
    handle: SessionHandle,
    commands: mpsc::Receiver<Command>,
    stop: mpsc::Receiver<()>,
    state: Arc<watch::Sender<SessionState>>,
    metrics: Arc<EngineMetrics>,
    codec: Codec,
    control: ControlHandler,
    inbound: BytesMut,
    outbound: Option<mpsc::Sender<Outbound>>,
    writer_task: Option<JoinHandle<()>>,
    close_deadline: Option<Instant>,
    peer_close: Option<CloseInfo>,
    opened: bool,
    finished: bool,
}

impl<H: SessionHandler> Actor<H> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        generation: ProtocolGeneration,
        cfg: SessionConfig,
        handler: H,
        handle: SessionHandle,
        commands: mpsc::Receiver<Command>,
        stop: mpsc::Receiver<()>,
        state: Arc<watch::Sender<SessionState>>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let codec = Codec::new(generation, &cfg);
        let inbound = BytesMut::with_capacity(cfg.read_chunk_bytes);
        Self {
            generation,
            cfg,
            handler,
            handle,
            commands,
            stop,
            state,
            metrics,
            codec,
            control: ControlHandler::new(),
            inbound,
            outbound: None,
            writer_task: None,
            close_deadline: None,
            peer_close: None,
            opened: false,
            finished: false,
        }
    }

    pub(crate) async fn run<R: TransportReader, W: TransportWriter>(mut self, reader: R, writer: W) {
        let (io_tx, mut io_rx) = mpsc::channel(READ_QUEUE);
        let (out_tx, out_rx) = mpsc::channel(self.cfg.outbound_queue.max(1) + CONTROL_RESERVE);
        self.outbound = Some(out_tx);
        self.writer_task = Some(tokio::spawn(
            write_loop(writer, out_rx, io_tx.clone(), Arc::clone(&self.metrics)).in_current_span(),
        ));

        // A handle may already have moved an unstarted session to `Closed`.
        let started = self.state.send_if_modified(|s| {
            if *s == SessionState::Created {
                *s = SessionState::Started;
                true
            } else {
                false
            }
        });
        if !started || self.stop.try_recv().is_ok() {
            tracing::debug!("stop requested before open");
            self.finish(Outcome::Local).await;
            return;
        }
        tracing::debug!(from = "created", to = "started", "session state");

        let reader_task = tokio::spawn(read_loop(reader, io_tx).in_current_span());

        self.opened = true;
        self.metrics.sessions_active.inc(&[("generation", self.generation.as_str())]);
        self.set_state(SessionState::Open);
        self.handler.opened(&self.handle).await;

        while !self.finished {
            let deadline = self.close_deadline;
            // Leave commands queued (handles see backpressure) while the writer is behind.
            let writable = self
                .outbound
                .as_ref()
                .map(|tx| tx.capacity() > CONTROL_RESERVE)
                .unwrap_or(false);
            tokio::select! {
                biased;

                Some(()) = self.stop.recv() => self.on_stop().await,

                _ = close_timer(deadline) => {
                    tracing::warn!(timeout_ms = self.cfg.close_timeout_ms, "close handshake timed out");
                    self.finish(Outcome::Timeout).await;
                }

                ev = io_rx.recv() => match ev {
                    Some(IoEvent::Data(bytes)) => self.on_bytes(bytes).await,
                    Some(IoEvent::ReadFailed(e)) => {
                        tracing::warn!(error = %e, "transport read failed");
                        self.finish(Outcome::Transport).await;
                    }
                    Some(IoEvent::WriteFailed(e)) => {
                        tracing::warn!(error = %e, "transport write failed");
                        self.finish(Outcome::Transport).await;
                    }
                    Some(IoEvent::Eof) | None => {
                        tracing::debug!("peer closed the transport");
                        self.finish(Outcome::Transport).await;
                    }
                },

                Some(cmd) = self.commands.recv(), if writable => self.on_command(cmd).await,
            }
        }

        reader_task.abort();
        self.metrics.sessions_active.dec(&[("generation", self.generation.as_str())]);
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = prev.as_str(), to = next.as_str(), "session state");
        }
    }

    /// Single exit path: release the transport once, report `closed` once.
    async fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.close_deadline = None;
        self.metrics.closes.inc(&[("outcome", outcome.as_str())]);

        // Dropping the queue lets the writer flush what is left, then close.
        self.outbound = None;
        if let Some(mut task) = self.writer_task.take() {
            if !outcome.flushes() {
                task.abort();
            } else if tokio::time::timeout(self.cfg.close_timeout(), &mut task).await.is_err() {
                tracing::warn!("outbound flush timed out, dropping transport");
                task.abort();
            }
        }

        self.set_state(SessionState::Closed);
        self.handler.closed(self.peer_close.take()).await;
    }

    // ---- inbound

    async fn on_bytes(&mut self, bytes: Bytes) {
        self.inbound.extend_from_slice(&bytes);

        while !self.finished {
            let next = match &mut self.codec {
                Codec::Modern(m) => m.decoder.decode(&mut self.inbound).map(|f| f.map(Decoded::Frame)),
                Codec::Legacy(l) => l.decode(&mut self.inbound).map(|f| f.map(Decoded::Legacy)),
            };
            match next {
                Ok(Some(Decoded::Frame(frame))) => self.on_frame(frame).await,
                Ok(Some(Decoded::Legacy(frame))) => self.on_legacy(frame).await,
                Ok(None) => return,
                Err(e) => {
                    self.fail(e).await;
                    return;
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        self.metrics.frames_in.inc(&[("opcode", frame.opcode.as_str())]);

        if frame.opcode.is_control() {
            match self.control.handle(self.state(), &frame) {
                Ok(action) => self.on_control(action).await,
                Err(e) => self.fail(e).await,
            }
            return;
        }

        let Codec::Modern(m) = &mut self.codec else {
            return;
        };
        match m.assembler.consume(frame) {
            Ok(Assembled::InProgress) => {}
            Ok(Assembled::Complete { kind, payload }) => self.deliver(kind, payload).await,
            Err(e) => self.fail(e).await,
        }
    }

    async fn on_control(&mut self, action: ControlAction) {
        match action {
            ControlAction::Pong(payload) => {
                if let Err(outcome) = self.queue_frame(Opcode::Pong, &payload) {
                    self.finish(outcome).await;
                }
            }
            ControlAction::Heartbeat => tracing::trace!("pong received"),
            ControlAction::EchoClose { info, reply } => {
                tracing::debug!(code = ?info.code, "peer initiated close");
                self.peer_close = Some(info);
                self.set_state(SessionState::Closing);
                // The writer closes the transport only after the echo is flushed.
                let outcome = self.queue_frame(Opcode::Close, &reply).err().unwrap_or(Outcome::Peer);
                self.finish(outcome).await;
            }
            ControlAction::Closed { info } => {
                tracing::debug!(code = ?info.code, "close handshake complete");
                self.peer_close = Some(info);
                self.finish(Outcome::Local).await;
            }
            ControlAction::Ignore => {}
        }
    }

    async fn on_legacy(&mut self, frame: LegacyFrame) {
        match frame {
            LegacyFrame::Text(payload) => {
                self.metrics.frames_in.inc(&[("opcode", "text")]);
                self.deliver(MessageKind::Text, payload).await;
            }
            LegacyFrame::Binary(payload) => {
                self.metrics.frames_in.inc(&[("opcode", "binary")]);
                self.deliver(MessageKind::Binary, payload).await;
            }
            LegacyFrame::Close => {
                self.metrics.frames_in.inc(&[("opcode", "close")]);
                tracing::debug!("peer sent legacy closing frame");
                let mut outcome = Outcome::Peer;
                if self.state() == SessionState::Open {
                    self.set_state(SessionState::Closing);
                    if let Err(o) = self.queue_close(&CloseInfo::default()) {
                        outcome = o;
                    }
                }
                self.finish(outcome).await;
            }
        }
    }

    async fn deliver(&mut self, kind: MessageKind, payload: Bytes) {
        self.metrics.messages_in.inc(&[("kind", kind.as_str())]);
        match kind {
            MessageKind::Text => match String::from_utf8(payload.to_vec()) {
                Ok(text) => self.handler.received_text(&self.handle, text).await,
                Err(_) => self.fail(Violation::InvalidUtf8.into()).await,
            },
            MessageKind::Binary => self.handler.received_binary(&self.handle, payload).await,
        }
    }

    /// Protocol violation: CLOSE(1002) if still open, then force `Closed`.
    async fn fail(&mut self, e: WsError) {
        let reason = e.violation().map(Violation::as_str).unwrap_or_else(|| e.kind().as_str());
        tracing::warn!(error = %e, reason, "protocol violation, closing session");
        self.metrics.protocol_violations.inc(&[("reason", reason)]);

        if self.state() == SessionState::Open {
            self.set_state(SessionState::Closing);
            let code = e.close_code().unwrap_or(close::PROTOCOL_ERROR);
            // Best effort; the outcome stays a protocol error either way.
            let _ = self.queue_close(&CloseInfo::code(code));
        }
        self.finish(Outcome::ProtocolError).await;
    }

    // ---- outbound

    async fn on_stop(&mut self) {
        match self.state() {
            SessionState::Created | SessionState::Started => self.finish(Outcome::Local).await,
            SessionState::Open => {
                tracing::debug!("local close requested");
                self.set_state(SessionState::Closing);
                if let Err(outcome) = self.queue_close(&CloseInfo::code(close::NORMAL)) {
                    self.finish(outcome).await;
                } else if self.generation.is_legacy() {
                    self.finish(Outcome::Local).await;
                } else {
                    self.close_deadline = Some(Instant::now() + self.cfg.close_timeout());
                }
            }
            SessionState::Closing | SessionState::Closed => {}
        }
    }

    async fn on_command(&mut self, cmd: Command) {
        if self.state() != SessionState::Open {
            tracing::debug!(state = self.state().as_str(), "dropping send on non-open session");
            return;
        }

        let mut buf = BytesMut::new();
        let label = match (&self.codec, cmd) {
            (Codec::Legacy(l), Command::Text(text)) => {
                l.encode_text(text.as_bytes(), &mut buf);
                "text"
            }
            (Codec::Legacy(l), Command::Binary(payload)) => {
                l.encode_binary(&payload, &mut buf);
                "binary"
            }
            (Codec::Legacy(_), Command::Raw(opcode, _)) => {
                tracing::debug!(opcode = opcode.as_str(), "raw frame dropped on legacy session");
                return;
            }
            (Codec::Modern(m), Command::Text(text)) => {
                m.encoder.encode_message(Opcode::Text, text.as_bytes(), self.cfg.max_frame_bytes(), &mut buf);
                "text"
            }
            (Codec::Modern(m), Command::Binary(payload)) => {
                m.encoder.encode_message(Opcode::Binary, &payload, self.cfg.max_frame_bytes(), &mut buf);
                "binary"
            }
            (Codec::Modern(m), Command::Raw(opcode, payload)) => {
                m.encoder.encode_frame(opcode, true, &payload, None, &mut buf);
                if opcode == Opcode::Close {
                    tracing::debug!("local close sent as raw frame");
                    self.set_state(SessionState::Closing);
                    self.close_deadline = Some(Instant::now() + self.cfg.close_timeout());
                }
                opcode.as_str()
            }
        };
        if let Err(outcome) = self.queue(buf, label) {
            self.finish(outcome).await;
        }
    }

    fn queue_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), Outcome> {
        let mut buf = BytesMut::new();
        match &self.codec {
            Codec::Modern(m) => m.encoder.encode_message(opcode, payload, self.cfg.max_frame_bytes(), &mut buf),
            Codec::Legacy(_) => return Ok(()),
        }
        self.queue(buf, opcode.as_str())
    }

    /// CLOSE frame (modern) or closing frame (Hixie-76); nothing for Hixie-75.
    fn queue_close(&mut self, info: &CloseInfo) -> Result<(), Outcome> {
        match &self.codec {
            Codec::Modern(_) => {
                let payload = info.to_payload();
                self.queue_frame(Opcode::Close, &payload)
            }
            Codec::Legacy(l) => {
                let mut buf = BytesMut::new();
                if !l.encode_close(&mut buf) {
                    return Ok(());
                }
                self.queue(buf, "close")
            }
        }
    }

    /// Hand an encoded buffer to the writer task without waiting on the transport.
    fn queue(&mut self, buf: BytesMut, label: &'static str) -> Result<(), Outcome> {
        let Some(tx) = &self.outbound else {
            return Err(Outcome::Transport);
        };
        match tx.try_send(Outbound { buf: buf.freeze(), label }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(opcode = label, "outbound queue full, peer is not reading");
                Err(Outcome::Stalled)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Outcome::Transport),
        }
    }
}

async fn close_timer(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

async fn read_loop<R: TransportReader>(mut reader: R, tx: mpsc::Sender<IoEvent>) {
    loop {
        let ev = match reader.read_chunk().await {
            Ok(Some(bytes)) => IoEvent::Data(bytes),
            Ok(None) => IoEvent::Eof,
            Err(e) => IoEvent::ReadFailed(e),
        };
        let last = !matches!(ev, IoEvent::Data(_));
        if tx.send(ev).await.is_err() || last {
            return;
        }
    }
}

/// Writes queued buffers in order; closes the transport once the queue is dropped and drained.
async fn write_loop<W: TransportWriter>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<IoEvent>,
    metrics: Arc<EngineMetrics>,
) {
    while let Some(out) = rx.recv().await {
        let started = std::time::Instant::now();
        if let Err(e) = writer.write_bytes(&out.buf).await {
            let _ = events.send(IoEvent::WriteFailed(e)).await;
            return;
        }
        metrics.frames_out.inc(&[("opcode", out.label)]);
        metrics.write_duration.observe(&[], started.elapsed());
        tracing::trace!(opcode = out.label, len = out.buf.len(), "written");
    }
    if let Err(e) = writer.close().await {
        tracing::debug!(error = %e, "transport close failed");
    }
}
