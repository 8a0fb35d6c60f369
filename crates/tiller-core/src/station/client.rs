//! Typed station calls over a raw RPC handle.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::Result;
use crate::model::{ChatMessage, Friend, Group, SendMessageRequest};
use crate::rpc::Handle;

/// What an instance holds once the ready handshake completed. Clones share
/// the underlying link, so handing one to every UI task is cheap.
#[derive(Debug, Clone)]
pub struct StationClient {
    handle: Handle,
}

impl StationClient {
    pub fn new(handle: Handle) -> Self {
        StationClient { handle }
    }

    pub async fn client_id(&self) -> Result<String> {
        self.call("client_id", vec![]).await
    }

    pub async fn is_onboarded(&self) -> Result<bool> {
        self.call("is_onboarded", vec![]).await
    }

    pub async fn complete_onboarding(&self, name: &str) -> Result<()> {
        self.handle
            .call("complete_onboarding", vec![json!(name)])
            .await?;
        Ok(())
    }

    pub async fn set_name(&self, name: &str) -> Result<()> {
        self.handle.call("set_name", vec![json!(name)]).await?;
        Ok(())
    }

    pub async fn create_invite(&self) -> Result<String> {
        self.call("create_invite", vec![]).await
    }

    pub async fn decode_invite(&self, token: &str) -> Result<Friend> {
        self.call("decode_invite", vec![json!(token)]).await
    }

    pub async fn create_group(&self, friend: &Friend, name: &str) -> Result<Group> {
        self.call("create_group", vec![json!(friend), json!(name)])
            .await
    }

    pub async fn invite_to_group(&self, group_id: &str, friend: &Friend) -> Result<()> {
        self.handle
            .call("invite_to_group", vec![json!(group_id), json!(friend)])
            .await?;
        Ok(())
    }

    pub async fn send_message(
        &self,
        group_id: &str,
        sent_at: DateTime<Utc>,
        text: &str,
    ) -> Result<()> {
        let request = SendMessageRequest {
            group_id: group_id.to_string(),
            sent_at,
            text: text.to_string(),
        };
        self.handle
            .call("send_message", vec![serde_json::to_value(request)?])
            .await?;
        Ok(())
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.call("list_groups", vec![]).await
    }

    pub async fn list_messages(&self, group_id: &str) -> Result<Vec<ChatMessage>> {
        self.call("list_messages", vec![json!(group_id)]).await
    }

    /// Forward one raw frame from the delivery socket.
    pub async fn receive_message(&self, frame: Vec<u8>) -> Result<()> {
        self.handle
            .call("receive_message", vec![json!(frame)])
            .await?;
        Ok(())
    }

    pub async fn wipe(&self) -> Result<()> {
        self.handle.call("wipe", vec![]).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let value = self.handle.call(method, args).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::error::TillerError;
    use crate::model::Envelope;
    use crate::rpc;
    use crate::station::Station;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use url::Url;

    async fn spawn_station() -> (StationClient, TempDir, watch::Sender<bool>) {
        let temp_dir = TempDir::new().unwrap();
        let bus = Bus::new("events-test");
        let station = Arc::new(
            Station::load(
                temp_dir.path(),
                Url::parse("http://127.0.0.1:9/").unwrap(),
                bus.publisher(),
            )
            .unwrap(),
        );

        let (client_end, server_end) = rpc::link();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(rpc::expose(station, server_end, shutdown_rx));

        let handle = rpc::connect(client_end).await.unwrap();
        (StationClient::new(handle), temp_dir, shutdown_tx)
    }

    #[tokio::test]
    async fn test_typed_calls_roundtrip() {
        let (client, _dir, _shutdown) = spawn_station().await;

        assert!(!client.is_onboarded().await.unwrap());
        client.complete_onboarding("Ada").await.unwrap();
        assert!(client.is_onboarded().await.unwrap());

        let friend = Friend {
            id: "f-1".to_string(),
            name: "Bob".to_string(),
        };
        let group = client.create_group(&friend, "Me").await.unwrap();
        assert_eq!(client.list_groups().await.unwrap(), vec![group.clone()]);

        let private = Envelope::Private {
            group_id: group.id.clone(),
            sent_at: Utc::now(),
            text: "hello".to_string(),
        };
        client
            .receive_message(private.to_bytes().unwrap())
            .await
            .unwrap();

        let messages = client.list_messages(&group.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "hello");
    }

    #[tokio::test]
    async fn test_station_fault_surfaces_as_remote_error() {
        let (client, _dir, _shutdown) = spawn_station().await;

        match client.list_messages("no-such-group").await {
            Ok(messages) => assert!(messages.is_empty()),
            Err(other) => panic!("Listing an unknown group is empty, got: {:?}", other),
        }

        match client
            .send_message("no-such-group", Utc::now(), "hi")
            .await
        {
            Err(TillerError::Remote { code, .. }) => assert_eq!(code, -32001),
            other => panic!("Expected Remote fault, got: {:?}", other),
        }
    }
}
