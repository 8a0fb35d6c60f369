//! One UI process's presence on the host.
//!
//! Every instance attaches to the station and can call it; the election
//! loop decides which single instance additionally holds the delivery
//! socket. Dropping an instance aborts its loop, which is how an instance
//! going away looks to the rest of the host: no goodbye, just silence.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{DeliveryConfig, ElectionStrategy};
use crate::election::{self, ElectionOutcome, Phase};
use crate::error::Result;
use crate::host::Host;
use crate::socket;
use crate::station::StationClient;

pub struct Instance {
    host: Arc<Host>,
    client: StationClient,
    phases: watch::Receiver<Phase>,
    task: JoinHandle<()>,
}

impl Instance {
    /// Attach to the host's station and enter the election.
    pub async fn start(host: Arc<Host>) -> Result<Instance> {
        let client = host.attach().await?;
        let (phase_tx, phases) = watch::channel(Phase::Probing);
        let task = tokio::spawn(run(host.clone(), phase_tx));

        Ok(Instance {
            host,
            client,
            phases,
            task,
        })
    }

    /// Station calls, available in every phase.
    pub fn client(&self) -> &StationClient {
        &self.client
    }

    /// Watch the instance move between probing, leading, and standby.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phases.clone()
    }

    pub fn current_phase(&self) -> Phase {
        *self.phases.borrow()
    }

    pub fn is_leader(&self) -> bool {
        self.current_phase() == Phase::Leading
    }

    /// Replace a dead station link after the host restarted the station.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.client = self.host.attach().await?;
        Ok(())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(host: Arc<Host>, phase_tx: watch::Sender<Phase>) {
    match host.config().strategy {
        ElectionStrategy::Bus => run_bus(host, phase_tx).await,
        ElectionStrategy::Lease => run_lease(host, phase_tx).await,
    }
}

/// Probe-and-claim over the presence bus.
///
/// A standby wakes every poll interval and probes again. A winner answers
/// queries for exactly as long as it holds a socket: when the socket closes
/// or errors the responder is detached and the cycle restarts from probing,
/// so this instance may win again or yield to a prober that was waiting.
async fn run_bus(host: Arc<Host>, phase_tx: watch::Sender<Phase>) {
    let handle = host.presence();
    let cfg = host.config().election;

    loop {
        phase_tx.send_replace(Phase::Probing);
        match election::probe(&handle, &cfg).await {
            Ok(ElectionOutcome::Leader { queries }) => {
                phase_tx.send_replace(Phase::Leading);
                let responder = election::answer_queries(queries);
                hold_socket(&host).await;
                // Leaving Leading: stop answering queries before the next
                // probe round, or no waiting instance could ever win one.
                responder.detach();
            }
            Ok(ElectionOutcome::Standby) => {
                phase_tx.send_replace(Phase::Standby);
                tokio::time::sleep(cfg.poll_interval).await;
            }
            Err(err) => {
                warn!("Presence probe failed: {}", err);
                tokio::time::sleep(cfg.poll_interval).await;
            }
        }
    }
}

/// Hold the host's socket lease for as long as each socket session lasts.
///
/// Losing the socket releases the lease, so every instance gets a fresh
/// shot at it; whoever wins opens the next session.
async fn run_lease(host: Arc<Host>, phase_tx: watch::Sender<Phase>) {
    let lease = host.lease();

    loop {
        let guard = match lease.try_acquire() {
            Some(guard) => guard,
            None => {
                phase_tx.send_replace(Phase::Standby);
                lease.acquire().await
            }
        };
        phase_tx.send_replace(Phase::Leading);
        hold_socket(&host).await;

        drop(guard);
        tokio::time::sleep(DeliveryConfig::RECONNECT_DELAY).await;
    }
}

/// One leadership tenure: hold a delivery socket open and feed the station
/// until the socket closes or errors.
async fn hold_socket(host: &Host) {
    match host.attach().await {
        Ok(client) => {
            match socket::run_socket(&host.config().delivery_url, &client).await {
                Ok(()) => debug!("Delivery socket ended; giving up leadership"),
                Err(err) => debug!("Delivery socket failed: {}", err),
            }
        }
        Err(err) => warn!("Could not attach to the station: {}", err),
    }
}
