//! Paired, transferable channel endpoints.
//!
//! `pair` links two endpoints so that whatever one sends the other receives.
//! An endpoint is a plain value: it can be moved into another task (the
//! moral equivalent of transferring a port to another execution context),
//! after which the two sides share nothing but the channel itself.

use tokio::sync::mpsc;

/// One end of a paired channel: sends `S`, receives `R`.
#[derive(Debug)]
pub struct Endpoint<S, R> {
    pub tx: mpsc::Sender<S>,
    pub rx: mpsc::Receiver<R>,
}

/// Create a linked endpoint pair.
///
/// `forward` is the buffer depth in the `A` direction (first endpoint
/// sending), `reverse` the depth in the `B` direction. Senders suspend when
/// a buffer is full, which is the only backpressure in the substrate.
pub fn pair<A, B>(forward: usize, reverse: usize) -> (Endpoint<A, B>, Endpoint<B, A>) {
    let (a_tx, a_rx) = mpsc::channel::<A>(forward);
    let (b_tx, b_rx) = mpsc::channel::<B>(reverse);
    (
        Endpoint { tx: a_tx, rx: b_rx },
        Endpoint { tx: b_tx, rx: a_rx },
    )
}
