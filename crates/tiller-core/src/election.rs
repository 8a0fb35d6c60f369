//! Leader election and hand-off over the broadcast bus.
//!
//! Decides, among all live instances of one origin, the single instance
//! that holds the delivery socket. An instance probes for a live leader,
//! claims leadership when nobody answers within the probe window, and while
//! leading answers every probe so the others stay on standby. Leadership
//! ends when the socket closes; the next probe round decides the successor.
//!
//! Liveness is timeout-based: a leader that dies without a trace is
//! discovered when some standby instance's next probe goes unanswered, so
//! worst-case takeover latency is the probe window plus the standby poll
//! interval.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::bus::BusHandle;
use crate::config::ElectionConfig;
use crate::error::Result;
use crate::race::{deadline, Raced};

/// Presence protocol messages.
///
/// The wire-visible schema is a record with a `type` discriminant and no
/// other fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusMessage {
    /// "Is there currently a leader?"
    QueryAlive,
    /// "Yes, I am the leader." Sent only by the current leader, in answer
    /// to a query.
    AckAlive,
    /// "I am claiming leadership now." Sent once per claim, before the
    /// socket opens. Always wins against a concurrent probe's deadline.
    Initializing,
}

/// Phases an instance moves through, observable via its phase watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Asking the bus whether a leader exists.
    Probing,
    /// Holding the delivery socket and answering queries.
    Leading,
    /// A leader exists; waiting out the poll interval before re-probing.
    Standby,
}

/// Result of one election round for one instance.
#[derive(Debug)]
pub enum ElectionOutcome {
    /// This instance claimed leadership. The claim is already announced,
    /// and `queries` subscribed before the announcement went out, so every
    /// query a peer sends from that point on is buffered for the responder.
    Leader { queries: BusHandle<BusMessage> },
    /// A live leader answered; wait out the poll interval and probe again.
    Standby,
}

impl ElectionOutcome {
    pub fn is_leader(&self) -> bool {
        matches!(self, ElectionOutcome::Leader { .. })
    }
}

/// Run one probing round on `handle`'s bus.
///
/// Subscribes before emitting `QueryAlive` so an answer cannot slip past,
/// then races the subscription against the probe window:
///
/// - `AckAlive` or `Initializing` from a peer ends the round on standby.
/// - An empty window ends the round with this instance claiming: the
///   `Initializing` broadcast has already been sent when this returns, so
///   the caller's next step is installing the responder, not announcing.
///
/// A claim that raced the deadline still wins: after the window closes the
/// subscription is swept once without waiting, and a buffered answer yields
/// exactly as if it had arrived in time.
pub async fn probe(
    handle: &BusHandle<BusMessage>,
    cfg: &ElectionConfig,
) -> Result<ElectionOutcome> {
    let mut sub = handle.branch();
    handle.send(BusMessage::QueryAlive);
    trace!(instance = %handle.id(), "probing for a live leader");

    let listen = async {
        loop {
            match sub.recv().await {
                Ok(answer @ BusMessage::AckAlive) | Ok(answer @ BusMessage::Initializing) => {
                    return Ok(answer);
                }
                Ok(BusMessage::QueryAlive) => continue,
                Err(err) => return Err(err),
            }
        }
    };

    let raced = deadline(cfg.probe_timeout, listen).await;
    match raced {
        Raced::Completed(Ok(answer)) => {
            debug!(instance = %handle.id(), ?answer, "leader answered, standing by");
            Ok(ElectionOutcome::Standby)
        }
        Raced::Completed(Err(err)) => Err(err),
        Raced::TimedOut => {
            if let Some(answer) = sweep_for_answer(&mut sub) {
                debug!(
                    instance = %handle.id(),
                    ?answer,
                    "claim raced the deadline, standing by"
                );
                return Ok(ElectionOutcome::Standby);
            }
            // Subscribing before the announcement leaves no window in which
            // a peer's query could reach neither this branch nor a peer's
            // own view of the claim.
            let queries = handle.branch();
            handle.send(BusMessage::Initializing);
            debug!(instance = %handle.id(), "probe window empty, claiming leadership");
            Ok(ElectionOutcome::Leader { queries })
        }
    }
}

fn sweep_for_answer(sub: &mut BusHandle<BusMessage>) -> Option<BusMessage> {
    while let Some(message) = sub.try_recv() {
        match message {
            BusMessage::AckAlive | BusMessage::Initializing => return Some(message),
            BusMessage::QueryAlive => continue,
        }
    }
    None
}

/// Guard over the query responder a leader installs.
///
/// Leaving the Leading phase must detach the responder explicitly; dropping
/// the guard aborts it as a backstop.
pub struct Responder {
    task: JoinHandle<()>,
}

/// Install a responder answering every `QueryAlive` on `sub` with `AckAlive`.
///
/// `sub` is normally the subscription a winning [`probe`] handed back, whose
/// buffered queries are drained first. It carries the leader's own identity,
/// so the responder never answers the leader's own probes.
pub fn answer_queries(mut sub: BusHandle<BusMessage>) -> Responder {
    let task = tokio::spawn(async move {
        loop {
            match sub.recv().await {
                Ok(BusMessage::QueryAlive) => {
                    trace!(instance = %sub.id(), "answering liveness query");
                    sub.send(BusMessage::AckAlive);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    Responder { task }
}

impl Responder {
    /// Stop answering queries.
    pub fn detach(self) {
        self.task.abort();
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.task.abort();
    }
}
