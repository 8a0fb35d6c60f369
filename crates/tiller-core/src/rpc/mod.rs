//! RPC substrate for instance-to-station calls.
//!
//! Exposes a target object's named operations to a remote execution context
//! over a paired channel, and produces a client-side handle whose calls
//! transparently become request/reply round-trips.
//!
//! # Architecture
//!
//! - **Channel**: paired, transferable endpoints; the only shared primitive
//! - **Server**: serves a `Dispatch` target, one task per in-flight request
//! - **Client**: waits for the ready handshake, then issues calls
//!
//! Every call opens a throwaway reply session (a oneshot channel) that is
//! carried inside the request itself. The server answers on that session and
//! never on the persistent channel, so any number of calls can be in flight
//! at once with no correlation ids and no head-of-line blocking.

pub mod channel;
pub mod client;
pub mod server;

pub use channel::{pair, Endpoint};
pub use client::{connect, Handle};
pub use server::{expose, Dispatch};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::config::RpcConfig;
use crate::error::TillerError;

/// One remote call: the operation name, positional arguments, and the
/// dedicated reply session for exactly this call.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub args: Vec<serde_json::Value>,
    /// Consumed by the single reply; at-most-once by construction.
    pub reply: oneshot::Sender<Reply>,
}

/// The one message a reply session carries.
pub type Reply = std::result::Result<serde_json::Value, Fault>;

/// Error marker carried in a failed reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn from_error(err: &TillerError) -> Self {
        Fault {
            code: err.to_rpc_error_code(),
            message: err.to_string(),
        }
    }
}

impl From<Fault> for TillerError {
    fn from(fault: Fault) -> Self {
        TillerError::Remote {
            code: fault.code,
            message: fault.message,
        }
    }
}

/// Frames the server sends on the persistent channel.
///
/// A closed enum rather than an in-band sentinel value: the client can never
/// mistake payload data for the handshake, and the handle itself carries no
/// magic property anything could probe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFrame {
    /// The serve loop is installed; buffered requests will now be drained.
    Ready,
}

/// The client's end of a link: sends requests, receives server frames.
pub type ClientEnd = Endpoint<Request, ServerFrame>;

/// The server's end of a link: sends server frames, receives requests.
pub type ServerEnd = Endpoint<ServerFrame, Request>;

/// Create a linked client/server endpoint pair with the configured buffers.
pub fn link() -> (ClientEnd, ServerEnd) {
    pair(RpcConfig::REQUEST_BUFFER, RpcConfig::FRAME_BUFFER)
}
