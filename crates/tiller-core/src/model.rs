//! Domain records shared by the station, its clients, and the delivery wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TillerError};

/// The other party of a pairwise conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: String,
    pub name: String,
}

/// One pairwise conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    /// The name the local user chose to appear as in this group.
    pub user_name: String,
    pub friend: Friend,
}

/// A chat message as stored and shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    Incoming {
        received_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
        text: String,
    },
    Outgoing {
        sent_at: DateTime<Utc>,
        text: String,
    },
}

impl ChatMessage {
    pub fn text(&self) -> &str {
        match self {
            ChatMessage::Incoming { text, .. } | ChatMessage::Outgoing { text, .. } => text,
        }
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            ChatMessage::Incoming { sent_at, .. } | ChatMessage::Outgoing { sent_at, .. } => {
                *sent_at
            }
        }
    }
}

/// What a caller hands to `send_message`.
///
/// The station resolves the recipient from the group; callers never name
/// the friend directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub group_id: String,
    pub sent_at: DateTime<Utc>,
    pub text: String,
}

/// Frames crossing the delivery relay, serialized as JSON bytes.
///
/// The relay, the socket, and the bus all treat these as opaque bytes; only
/// the two stations at either end parse them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Hands a newly created group to the other party. `friend` is the
    /// sender's identity, which becomes the recipient's group peer.
    Welcome { group_id: String, friend: Friend },
    /// One chat message within an existing group.
    Private {
        group_id: String,
        sent_at: DateTime<Utc>,
        text: String,
    },
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Envelope> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Identity payload embedded in an invite URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitePayload {
    pub friend: Friend,
}

impl InvitePayload {
    /// Encode as the URL-safe token carried in an invite link.
    pub fn encode(&self) -> Result<String> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    /// Decode a token back into the inviter's identity.
    pub fn decode(token: &str) -> Result<InvitePayload> {
        let bytes = hex::decode(token).map_err(|err| TillerError::InvalidInvite {
            message: err.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|err| TillerError::InvalidInvite {
            message: err.to_string(),
        })
    }
}

/// State-change notifications the station broadcasts to every instance.
///
/// Published on the host's events bus after the change has been persisted,
/// so an instance that refetches on receipt always observes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    GroupCreated { group: Group },
    MessageAdded { group_id: String, message: ChatMessage },
    Wiped,
}
