//! The delivery socket: the leader's WebSocket onto the relay.
//!
//! A WebSocket rather than polling because the relay pushes binary frames
//! and holds the connection open. Exactly one socket per client id may
//! exist, which is what the election layer guarantees; this module only
//! knows how to hold one open and feed it to the station.

use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};
use url::Url;

use crate::config::DeliveryConfig;
use crate::error::{Result, TillerError};
use crate::station::StationClient;

/// Derive the WebSocket endpoint for `client_id` from the relay's HTTP URL.
pub fn socket_url(delivery_url: &Url, client_id: &str) -> Result<Url> {
    let mut url =
        delivery_url.join(&format!("{}/{}", DeliveryConfig::MESSAGES_PATH, client_id))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(TillerError::Config {
                message: format!("Unsupported delivery URL scheme {:?}", other),
            })
        }
    };
    url.set_scheme(scheme).map_err(|_| TillerError::Config {
        message: format!("Could not derive a socket URL from {}", delivery_url),
    })?;
    Ok(url)
}

/// Hold the delivery socket open and feed every frame to the station.
///
/// Returns `Ok(())` when the relay closes the connection and an error when
/// the link or the station fails. Either way the socket is gone; the caller
/// decides whether to open a new one.
pub async fn run_socket(delivery_url: &Url, client: &StationClient) -> Result<()> {
    let client_id = client.client_id().await?;
    let url = socket_url(delivery_url, &client_id)?;

    debug!("Connecting delivery socket for {}", client_id);
    let (mut stream, _response) = connect_async(url.as_str()).await?;
    debug!("Delivery socket open for {}", client_id);

    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Binary(data) => {
                match client.receive_message(data.to_vec()).await {
                    Ok(()) => {}
                    // Without a station there is no point holding the socket.
                    Err(err @ TillerError::ChannelClosed) => return Err(err),
                    Err(err) => warn!("Station rejected delivery frame: {}", err),
                }
            }
            Message::Close(_) => {
                debug!("Delivery socket closed by relay");
                break;
            }
            other => {
                debug!("Ignoring unexpected socket message: {:?}", other);
            }
        }
    }
    Ok(())
}
