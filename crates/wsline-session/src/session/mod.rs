//! Session lifecycle over one transport.
//!
//! A [`Session`] is built from a verified protocol generation, a transport and
//! a [`SessionHandler`]. [`Session::start`] moves it onto its own tokio task;
//! from then on the application talks to it through cloneable
//! [`SessionHandle`]s. A session that is never started stays `Created`
//! until a handle calls `stop()`.

mod actor;
pub mod handle;
pub mod handler;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use wsline_core::error::Result;
use wsline_core::protocol::{ProtocolGeneration, SessionState};

use crate::config::SessionConfig;
use crate::obs::EngineMetrics;
use crate::transport::{HandshakeVerifier, Transport, UpgradeRequest};

use actor::Actor;
pub use handle::SessionHandle;
pub use handler::SessionHandler;

pub struct Session<T: Transport, H: SessionHandler> {
    generation: ProtocolGeneration,
    cfg: SessionConfig,
    transport: T,
    handler: H,
    handle: SessionHandle,
    commands: mpsc::Receiver<handle::Command>,
    stop: mpsc::Receiver<()>,
    state: Arc<watch::Sender<SessionState>>,
    metrics: Arc<EngineMetrics>,
}

impl<T: Transport, H: SessionHandler> Session<T, H> {
    /// Validate `cfg`, verify the upgrade request and build a session for the
    /// negotiated generation.
    pub fn accept(
        request: &UpgradeRequest,
        verifier: &dyn HandshakeVerifier,
        transport: T,
        handler: H,
        cfg: SessionConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        let generation = verifier.verify(request)?;
        Ok(Self::new(generation, transport, handler, cfg))
    }

    /// Build a session for an already negotiated generation. `cfg` is used as
    /// given; call [`SessionConfig::validate`] first when it comes from outside.
    pub fn new(generation: ProtocolGeneration, transport: T, handler: H, cfg: SessionConfig) -> Self {
        let (cmd_tx, commands) = mpsc::channel(cfg.outbound_queue.max(1));
        // One pending stop is enough; extra requests coalesce.
        let (stop_tx, stop) = mpsc::channel(1);
        let (state, _) = watch::channel(SessionState::Created);
        let state = Arc::new(state);
        let handle = SessionHandle::new(0, generation, cmd_tx, stop_tx, Arc::clone(&state));

        Self {
            generation,
            cfg,
            transport,
            handler,
            handle,
            commands,
            stop,
            state,
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.handle.id = id;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Spawn the session task. The returned join handle completes after the
    /// transport is released and `closed` has been delivered.
    pub fn start(self) -> JoinHandle<()> {
        let span = tracing::info_span!(
            "ws_session",
            id = self.handle.id(),
            generation = %self.generation,
        );
        let (reader, writer) = self.transport.into_split(self.cfg.read_chunk_bytes);
        let actor = Actor::new(
            self.generation,
            self.cfg,
            self.handler,
            self.handle,
            self.commands,
            self.stop,
            self.state,
            self.metrics,
        );
        tokio::spawn(actor.run(reader, writer).instrument(span))
    }
}
