//! The station: the background singleton every instance talks to.
//!
//! Exactly one station runs per host at a time, owned by whichever instance
//! currently leads. It is the only component that touches durable state or
//! the delivery relay; instances reach it through the RPC layer and hear
//! about changes on the events bus. The host may stop and reload it at any
//! point between calls, so construction is cheap and everything it must
//! remember goes through [`Store`] before a reply or event leaves the
//! station.

pub mod client;
pub mod store;

pub use client::StationClient;
pub use store::{Configuration, Store};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

use crate::bus::Publisher;
use crate::config::{DeliveryConfig, StoreConfig};
use crate::error::{Result, TillerError};
use crate::model::{
    AppEvent, ChatMessage, Envelope, Friend, Group, InvitePayload, SendMessageRequest,
};
use crate::rpc::Dispatch;

pub struct Station {
    store: Store,
    events: Publisher<AppEvent>,
    http: reqwest::Client,
    delivery_url: Url,
}

impl Station {
    /// Load (or create) the station state under `data_dir`.
    ///
    /// Reloading an existing directory resumes the same identity and
    /// history, which is what lets the host restart the station freely.
    pub fn load(data_dir: &Path, delivery_url: Url, events: Publisher<AppEvent>) -> Result<Station> {
        let store = Store::open_at(&data_dir.join(StoreConfig::DB_FILENAME))?;
        let http = reqwest::Client::builder()
            .timeout(DeliveryConfig::SEND_TIMEOUT)
            .build()?;

        debug!("Station loaded from {}", data_dir.display());
        Ok(Station {
            store,
            events,
            http,
            delivery_url,
        })
    }

    // ========================================
    // Identity and onboarding
    // ========================================

    pub fn client_id(&self) -> Result<String> {
        Ok(self.store.configuration()?.client_id)
    }

    pub fn is_onboarded(&self) -> Result<bool> {
        Ok(self.store.configuration()?.is_onboarded)
    }

    pub fn complete_onboarding(&self, name: &str) -> Result<()> {
        self.store.complete_onboarding(name)?;
        info!("Completed onboarding as {}", name);
        Ok(())
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.store.set_name(name)
    }

    // ========================================
    // Invites
    // ========================================

    /// Build the invite URL a friend opens to start a conversation with us.
    pub fn create_invite(&self) -> Result<String> {
        let config = self.store.configuration()?;
        let payload = InvitePayload {
            friend: Friend {
                id: config.client_id,
                name: config.name.unwrap_or_default(),
            },
        };
        let url = self
            .delivery_url
            .join(&format!("{}/{}", DeliveryConfig::JOIN_PATH, payload.encode()?))?;
        Ok(url.to_string())
    }

    /// Recover the inviter's identity from an invite token.
    pub fn decode_invite(&self, token: &str) -> Result<Friend> {
        Ok(InvitePayload::decode(token)?.friend)
    }

    // ========================================
    // Groups and messages
    // ========================================

    pub fn create_group(&self, friend: Friend, name: String) -> Result<Group> {
        let group = Group {
            id: uuid::Uuid::new_v4().to_string(),
            user_name: name,
            friend,
        };
        self.store.insert_group(&group)?;
        debug!("Created group {} with {}", group.id, group.friend.name);
        self.events.send(AppEvent::GroupCreated {
            group: group.clone(),
        });
        Ok(group)
    }

    /// Send the welcome frame that lets `friend` mirror `group_id` on their
    /// side.
    pub async fn invite_to_group(&self, group_id: &str, friend: &Friend) -> Result<()> {
        if self.store.group(group_id)?.is_none() {
            return Err(TillerError::GroupNotFound {
                group_id: group_id.to_string(),
            });
        }

        let config = self.store.configuration()?;
        let welcome = Envelope::Welcome {
            group_id: group_id.to_string(),
            friend: Friend {
                id: config.client_id,
                name: config.name.unwrap_or_default(),
            },
        };
        self.post_frame(&friend.id, welcome.to_bytes()?).await
    }

    /// Store an outgoing message, announce it, then hand it to the relay.
    ///
    /// The message is kept and announced even when delivery fails, so a
    /// failed send can be retried without losing history.
    pub async fn send_message(&self, request: SendMessageRequest) -> Result<()> {
        let group = self
            .store
            .group(&request.group_id)?
            .ok_or_else(|| TillerError::GroupNotFound {
                group_id: request.group_id.clone(),
            })?;

        let message = ChatMessage::Outgoing {
            sent_at: request.sent_at,
            text: request.text.clone(),
        };
        self.store.push_message(&group.id, &message)?;
        self.events.send(AppEvent::MessageAdded {
            group_id: group.id.clone(),
            message,
        });

        let envelope = Envelope::Private {
            group_id: group.id,
            sent_at: request.sent_at,
            text: request.text,
        };
        self.post_frame(&group.friend.id, envelope.to_bytes()?).await
    }

    pub fn list_groups(&self) -> Result<Vec<Group>> {
        self.store.list_groups()
    }

    pub fn list_messages(&self, group_id: &str) -> Result<Vec<ChatMessage>> {
        self.store.messages(group_id)
    }

    /// Handle one frame pulled off the delivery socket.
    ///
    /// State is persisted before the matching event goes out, so an
    /// instance that refetches on receipt always sees the change.
    pub fn receive_message(&self, frame: &[u8]) -> Result<()> {
        match Envelope::from_bytes(frame)? {
            Envelope::Welcome { group_id, friend } => {
                let config = self.store.configuration()?;
                let group = Group {
                    id: group_id,
                    user_name: config.name.unwrap_or_default(),
                    friend,
                };
                if self.store.insert_group(&group)? {
                    debug!("Joined group {} with {}", group.id, group.friend.name);
                    self.events.send(AppEvent::GroupCreated { group });
                } else {
                    debug!("Ignoring welcome for known group {}", group.id);
                }
            }
            Envelope::Private {
                group_id,
                sent_at,
                text,
            } => {
                let message = ChatMessage::Incoming {
                    received_at: Utc::now(),
                    sent_at,
                    text,
                };
                self.store.push_message(&group_id, &message)?;
                self.events.send(AppEvent::MessageAdded { group_id, message });
            }
        }
        Ok(())
    }

    // ========================================
    // Wipe
    // ========================================

    /// Destroy all local state and start over with a fresh identity.
    pub fn wipe(&self) -> Result<()> {
        info!("Wiping station state");
        self.store.wipe()?;
        self.events.send(AppEvent::Wiped);
        Ok(())
    }

    async fn post_frame(&self, recipient: &str, body: Vec<u8>) -> Result<()> {
        let url = self
            .delivery_url
            .join(&format!("{}/{}", DeliveryConfig::MESSAGES_PATH, recipient))?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, DeliveryConfig::MESSAGE_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 201 {
            warn!("Delivery relay rejected frame for {}: HTTP {}", recipient, status);
            return Err(TillerError::DeliveryRejected { status });
        }
        debug!("Delivered frame to {}", recipient);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Dispatch for Station {
    async fn dispatch(&self, method: &str, mut args: Vec<Value>) -> Result<Value> {
        match method {
            "client_id" => Ok(Value::String(self.client_id()?)),
            "is_onboarded" => Ok(Value::Bool(self.is_onboarded()?)),
            "complete_onboarding" => {
                let name: String = take_arg(method, &mut args, 0)?;
                self.complete_onboarding(&name)?;
                Ok(Value::Null)
            }
            "set_name" => {
                let name: String = take_arg(method, &mut args, 0)?;
                self.set_name(&name)?;
                Ok(Value::Null)
            }
            "create_invite" => Ok(Value::String(self.create_invite()?)),
            "decode_invite" => {
                let token: String = take_arg(method, &mut args, 0)?;
                to_value(self.decode_invite(&token)?)
            }
            "create_group" => {
                let friend: Friend = take_arg(method, &mut args, 0)?;
                let name: String = take_arg(method, &mut args, 1)?;
                to_value(self.create_group(friend, name)?)
            }
            "invite_to_group" => {
                let group_id: String = take_arg(method, &mut args, 0)?;
                let friend: Friend = take_arg(method, &mut args, 1)?;
                self.invite_to_group(&group_id, &friend).await?;
                Ok(Value::Null)
            }
            "send_message" => {
                let request: SendMessageRequest = take_arg(method, &mut args, 0)?;
                self.send_message(request).await?;
                Ok(Value::Null)
            }
            "list_groups" => to_value(self.list_groups()?),
            "list_messages" => {
                let group_id: String = take_arg(method, &mut args, 0)?;
                to_value(self.list_messages(&group_id)?)
            }
            "receive_message" => {
                let frame: Vec<u8> = take_arg(method, &mut args, 0)?;
                self.receive_message(&frame)?;
                Ok(Value::Null)
            }
            "wipe" => {
                self.wipe()?;
                Ok(Value::Null)
            }
            _ => Err(TillerError::MethodNotFound {
                method: method.to_string(),
            }),
        }
    }
}

fn take_arg<T: serde::de::DeserializeOwned>(
    method: &str,
    args: &mut Vec<Value>,
    index: usize,
) -> Result<T> {
    let value = args
        .get_mut(index)
        .map(Value::take)
        .ok_or_else(|| TillerError::InvalidParams {
            method: method.to_string(),
            message: format!("Missing argument {}", index),
        })?;
    serde_json::from_value(value).map_err(|err| TillerError::InvalidParams {
        method: method.to_string(),
        message: err.to_string(),
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
