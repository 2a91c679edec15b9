//! Shared engine state: config, verifier, metrics and the live-session registry.
//!
//! Hosts keep one `Engine` per listener and hand every upgraded connection to
//! [`Engine::accept`].

use std::sync::Arc;

use wsline_core::error::Result;

use crate::config::EngineConfig;
use crate::obs::EngineMetrics;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionHandle, SessionHandler};
use crate::transport::{HandshakeVerifier, HeaderVerifier, Transport, UpgradeRequest};

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    cfg: EngineConfig,
    verifier: Box<dyn HandshakeVerifier>,
    metrics: Arc<EngineMetrics>,
    registry: SessionRegistry,
}

impl Engine {
    /// Build an engine with the header-based verifier.
    /// Returns Result so a bad config is reported instead of surfacing later.
    pub fn new(cfg: EngineConfig) -> Result<Self> {
        Self::with_verifier(cfg, HeaderVerifier)
    }

    pub fn with_verifier(cfg: EngineConfig, verifier: impl HandshakeVerifier + 'static) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                cfg,
                verifier: Box::new(verifier),
                metrics: Arc::new(EngineMetrics::default()),
                registry: SessionRegistry::new(),
            }),
        })
    }

    pub fn cfg(&self) -> &EngineConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Verify `request`, start a session on `transport` and register it until it closes.
    pub fn accept<T, H>(&self, request: &UpgradeRequest, transport: T, handler: H) -> Result<SessionHandle>
    where
        T: Transport,
        H: SessionHandler,
    {
        let session = Session::accept(
            request,
            self.inner.verifier.as_ref(),
            transport,
            handler,
            self.inner.cfg.session.clone(),
        )
        .map_err(|e| {
            tracing::info!(error = %e, "upgrade rejected");
            self.inner.metrics.handshake_rejections.inc(&[("reason", e.kind().as_str())]);
            e
        })?;

        let id = self.inner.registry.next_id();
        let session = session.with_id(id).with_metrics(self.metrics());
        let handle = session.handle();
        self.inner.registry.insert(handle.clone());
        tracing::debug!(id, generation = %session.generation(), "session accepted");

        let task = session.start();
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tracing::error!(id, error = %e, "session task failed");
            }
            engine.inner.registry.remove(id);
        });

        Ok(handle)
    }

    /// Ask every live session to close.
    pub fn stop_all(&self) {
        for h in self.inner.registry.handles() {
            h.stop();
        }
    }

    /// `stop_all`, then wait until every session reached `Closed`.
    pub async fn shutdown(&self) {
        let handles = self.inner.registry.handles();
        tracing::info!(sessions = handles.len(), "shutting down");
        for h in &handles {
            h.stop();
        }
        for h in &handles {
            h.wait_closed().await;
        }
    }
}
