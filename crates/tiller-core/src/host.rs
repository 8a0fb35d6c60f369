//! Everything instances on one host share: the presence bus, the events
//! bus, the socket lease, and the station runtime.
//!
//! The station is a restartable singleton. [`Host::attach`] starts it if it
//! is not running and returns a fresh client link either way, so instances
//! can treat "reach the station" as one operation regardless of whether it
//! was alive a moment ago. [`Host::stop_station`] tears it down between
//! calls; durable state survives in the store and the next attach resumes
//! it.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::debug;
use url::Url;

use crate::bus::{Bus, BusHandle};
use crate::config::{ElectionConfig, ElectionStrategy};
use crate::election::BusMessage;
use crate::error::Result;
use crate::lease::SocketLease;
use crate::model::AppEvent;
use crate::rpc;
use crate::station::{Station, StationClient};

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Where the station keeps its database.
    pub data_dir: PathBuf,
    /// Base HTTP URL of the delivery relay.
    pub delivery_url: Url,
    pub election: ElectionConfig,
    pub strategy: ElectionStrategy,
}

impl HostConfig {
    pub fn new(data_dir: impl Into<PathBuf>, delivery_url: Url) -> Self {
        HostConfig {
            data_dir: data_dir.into(),
            delivery_url,
            election: ElectionConfig::default(),
            strategy: ElectionStrategy::default(),
        }
    }
}

struct RunningStation {
    station: Arc<Station>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct Host {
    config: HostConfig,
    presence: Bus<BusMessage>,
    events: Bus<AppEvent>,
    lease: SocketLease,
    station: Mutex<Option<RunningStation>>,
}

impl Host {
    pub fn new(config: HostConfig) -> Host {
        Host {
            config,
            presence: Bus::new("presence"),
            events: Bus::new("events"),
            lease: SocketLease::new(),
            station: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// A fresh handle on the presence bus, one identity per call.
    pub fn presence(&self) -> BusHandle<BusMessage> {
        self.presence.open()
    }

    /// A fresh handle on the events bus.
    pub fn events(&self) -> BusHandle<AppEvent> {
        self.events.open()
    }

    pub fn lease(&self) -> SocketLease {
        self.lease.clone()
    }

    /// Connect to the station, starting it first if necessary.
    ///
    /// Each call gets its own link; the handshake completes once the
    /// station is serving it.
    pub async fn attach(&self) -> Result<StationClient> {
        let (client_end, server_end) = rpc::link();

        {
            let mut slot = self.station.lock().await;
            let stopped = match slot.as_ref() {
                Some(running) => *running.shutdown_tx.borrow(),
                None => true,
            };
            if stopped {
                let station = Arc::new(Station::load(
                    &self.config.data_dir,
                    self.config.delivery_url.clone(),
                    self.events.publisher(),
                )?);
                let (shutdown_tx, _first_rx) = watch::channel(false);
                debug!("Starting station");
                *slot = Some(RunningStation {
                    station,
                    shutdown_tx,
                });
            }
            if let Some(running) = slot.as_ref() {
                let shutdown_rx = running.shutdown_tx.subscribe();
                tokio::spawn(rpc::expose(running.station.clone(), server_end, shutdown_rx));
            }
        }

        let handle = rpc::connect(client_end).await?;
        Ok(StationClient::new(handle))
    }

    /// Stop a running station. Existing links die with it; the next
    /// [`Host::attach`] loads a fresh station over the same durable state.
    pub async fn stop_station(&self) {
        let mut slot = self.station.lock().await;
        if let Some(running) = slot.take() {
            let _ = running.shutdown_tx.send(true);
            debug!("Stopped station");
        }
    }
}
