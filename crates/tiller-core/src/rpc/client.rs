//! RPC client: a call handle over the paired channel's client end.
//!
//! `connect` performs the one-time ready handshake and returns a [`Handle`].
//! The handle is cheap to clone; every clone shares the persistent request
//! channel, and every call opens its own throwaway reply session.

use tokio::sync::oneshot;
use tracing::debug;

use super::{ClientEnd, Request, ServerFrame};
use crate::error::{Result, TillerError};

/// Long-lived client-side stand-in for the exposed target.
///
/// There is nothing probe-able here: no method exists until `call` names
/// one, and awaiting a call awaits its reply session, not the handle.
#[derive(Debug, Clone)]
pub struct Handle {
    tx: tokio::sync::mpsc::Sender<Request>,
}

/// Wait for the server's ready frame, then hand back the call handle.
///
/// The handshake runs once per link; calls made through the returned handle
/// never repeat it. If the server end is dropped before signalling ready,
/// this fails with [`TillerError::ChannelClosed`].
pub async fn connect(mut end: ClientEnd) -> Result<Handle> {
    match end.rx.recv().await {
        Some(ServerFrame::Ready) => {
            debug!("rpc handshake complete");
            Ok(Handle { tx: end.tx })
        }
        None => Err(TillerError::ChannelClosed),
    }
}

impl Handle {
    /// Invoke a named operation with positional arguments.
    ///
    /// Suspends until the call's single reply arrives. There is no timeout
    /// at this layer; callers needing bounded latency wrap the call in
    /// [`crate::race::deadline`]. Concurrent calls from any number of
    /// clones resolve independently.
    pub async fn call(
        &self,
        method: impl Into<String>,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let method = method.into();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Request {
                method,
                args,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TillerError::ChannelClosed)?;

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(fault)) => Err(fault.into()),
            Err(_) => Err(TillerError::ChannelClosed),
        }
    }
}
