//! Tiller Core - multi-instance coordination for one chat client.
//!
//! This crate decides, among any number of concurrently running UI
//! instances of the same client, which single instance holds the delivery
//! socket, and gives every instance a uniform way to reach the one
//! background station that owns durable state.
//!
//! The moving parts:
//!
//! - **Host**: everything instances on one machine share - the presence
//!   bus, the events bus, the socket lease, and the restartable station.
//! - **Instance**: one UI process. It attaches to the station for calls
//!   and runs the election loop; at most one instance leads at a time.
//! - **Station**: the background singleton owning the store and the
//!   delivery connection. It may be stopped and restarted between calls
//!   without losing state.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tiller_core::{Host, HostConfig, Instance};
//!
//! #[tokio::main]
//! async fn main() -> tiller_core::Result<()> {
//!     let config = HostConfig::new("./tiller-data", "http://127.0.0.1:3000/".parse()?);
//!     let host = Arc::new(Host::new(config));
//!
//!     // Each UI window is one instance; exactly one of them ends up
//!     // holding the delivery socket.
//!     let instance = Instance::start(host).await?;
//!     println!("onboarded: {}", instance.client().is_onboarded().await?);
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod election;
pub mod error;
pub mod host;
pub mod instance;
pub mod lease;
pub mod model;
pub mod race;
pub mod rpc;
pub mod socket;
pub mod station;

// Re-export commonly used types
pub use bus::{Bus, BusHandle, Publisher};
pub use config::{ElectionConfig, ElectionStrategy};
pub use election::{BusMessage, ElectionOutcome, Phase};
pub use error::{Result, TillerError};
pub use host::{Host, HostConfig};
pub use instance::Instance;
pub use lease::{LeaseGuard, SocketLease};
pub use model::{
    AppEvent, ChatMessage, Envelope, Friend, Group, InvitePayload, SendMessageRequest,
};
pub use race::{deadline, Raced};
pub use station::{Station, StationClient, Store};
