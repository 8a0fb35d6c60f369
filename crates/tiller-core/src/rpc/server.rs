//! RPC server loop: expose a dispatch target over a paired channel.
//!
//! Serves requests arriving on the channel's server end, running each call
//! in its own task so results come back independently and out of order.
//! Replies travel only on each request's own reply session, never on the
//! persistent channel.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::{Fault, Request, ServerEnd, ServerFrame};
use crate::error::{Result, TillerError};

/// Trait for dispatching named operations on the exposed target.
///
/// Implementations are a match over method names built at compile time.
/// A nullary method stands in for a plain property read; anything async
/// is awaited to its final value before the reply is sent.
#[async_trait::async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Dispatch one named call and return its result value.
    async fn dispatch(
        &self,
        method: &str,
        args: Vec<serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, TillerError>;
}

/// Serve `target` on `end` until the client goes away or `shutdown` fires.
///
/// Sends `ServerFrame::Ready` once the serve loop is installed; requests a
/// client buffered before that moment are drained normally afterwards, so
/// an early caller just waits instead of being dropped.
///
/// Exactly one reply is sent per request. A handler error becomes a
/// [`Fault`] reply; a handler panic tears down that call's task and drops
/// its reply sender, which the caller observes as a closed channel rather
/// than a silent hang.
pub async fn expose<D: Dispatch>(
    target: Arc<D>,
    mut end: ServerEnd,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if end.tx.send(ServerFrame::Ready).await.is_err() {
        debug!("rpc client went away before the ready handshake");
        return Ok(());
    }

    loop {
        tokio::select! {
            request = end.rx.recv() => {
                match request {
                    Some(request) => {
                        let target = target.clone();
                        tokio::spawn(async move {
                            serve_one(&*target, request).await;
                        });
                    }
                    None => {
                        debug!("rpc client endpoint closed, serve loop exiting");
                        return Ok(());
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("rpc serve loop shutting down");
                return Ok(());
            }
        }
    }
}

async fn serve_one<D: Dispatch>(target: &D, request: Request) {
    let Request {
        method,
        args,
        reply,
    } = request;

    let outcome = match target.dispatch(&method, args).await {
        Ok(value) => Ok(value),
        Err(err) => {
            debug!(%method, error = %err, "dispatch returned an error");
            Err(Fault::from_error(&err))
        }
    };

    // The caller may have abandoned the call; a dead session is its problem.
    let _ = reply.send(outcome);
}
