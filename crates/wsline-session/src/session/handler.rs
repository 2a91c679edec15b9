//! Notification surface: the one capability a session reports to.

use async_trait::async_trait;
use bytes::Bytes;

use wsline_core::protocol::CloseInfo;

use super::handle::SessionHandle;

/// Application callbacks for one session, fixed when the session is built.
///
/// Calls arrive in order on the session's task: at most one `opened`, then
/// any number of `received_text` / `received_binary` in arrival order, then
/// exactly one `closed`, also on abnormal termination.
#[async_trait]
pub trait SessionHandler: Send + 'static {
    async fn opened(&mut self, _session: &SessionHandle) {}

    /// Complete text message, already validated as UTF-8.
    async fn received_text(&mut self, _session: &SessionHandle, _text: String) {}

    async fn received_binary(&mut self, _session: &SessionHandle, _payload: Bytes) {}

    /// `close` is the status the peer sent, if it sent a CLOSE frame.
    async fn closed(&mut self, _close: Option<CloseInfo>) {}
}
