//! Integration tests for the relay's HTTP and WebSocket surface.

use std::time::Duration;

use futures::StreamExt;
use tiller_delivery::start_server;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn start_relay() -> String {
    let addr = start_server("127.0.0.1", 0).await.unwrap();
    format!("http://{}", addr)
}

/// Post one frame, retrying while the subscriber's upgrade settles.
async fn post_frame(base: &str, to: &str, frame: Vec<u8>) -> u16 {
    let http = reqwest::Client::new();
    let url = format!("{}/messages/{}", base, to);
    let mut status = 0;
    for _ in 0..40 {
        status = http
            .post(&url)
            .body(frame.clone())
            .send()
            .await
            .unwrap()
            .status()
            .as_u16();
        if status == 201 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    status
}

#[tokio::test]
async fn test_health_endpoint_responds() {
    let base = start_relay().await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_post_without_subscriber_is_rejected() {
    let base = start_relay().await;

    let response = reqwest::Client::new()
        .post(format!("{}/messages/nobody", base))
        .body(vec![1u8, 2, 3])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn test_subscriber_receives_posted_frame() {
    let base = start_relay().await;
    let ws_url = format!("{}/messages/c-1", base.replace("http", "ws"));
    let (mut socket, _response) = connect_async(ws_url.as_str()).await.unwrap();

    assert_eq!(post_frame(&base, "c-1", vec![7u8, 8, 9]).await, 201);

    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Binary(data) => assert_eq!(data.to_vec(), vec![7, 8, 9]),
        other => panic!("Expected a binary frame, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_frames_stay_with_their_recipient() {
    let base = start_relay().await;
    let ws_base = base.replace("http", "ws");
    let (mut one, _) = connect_async(format!("{}/messages/c-1", ws_base).as_str())
        .await
        .unwrap();
    let (mut two, _) = connect_async(format!("{}/messages/c-2", ws_base).as_str())
        .await
        .unwrap();

    assert_eq!(post_frame(&base, "c-2", vec![4u8, 2]).await, 201);

    let frame = tokio::time::timeout(Duration::from_secs(2), two.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(frame, Message::Binary(_)));

    // The other subscriber hears nothing.
    let quiet = tokio::time::timeout(Duration::from_millis(200), one.next()).await;
    assert!(quiet.is_err(), "frame crossed to the wrong subscriber");
}

#[tokio::test]
async fn test_new_socket_replaces_the_previous_one() {
    let base = start_relay().await;
    let ws_url = format!("{}/messages/c-9", base.replace("http", "ws"));

    let (mut first, _) = connect_async(ws_url.as_str()).await.unwrap();
    // Make sure the first subscription is in place before the second
    // connection displaces it.
    assert_eq!(post_frame(&base, "c-9", vec![1u8]).await, 201);
    let _ = tokio::time::timeout(Duration::from_secs(2), first.next()).await;

    let (mut second, _) = connect_async(ws_url.as_str()).await.unwrap();

    // The displaced socket ends; close frame, error, or plain EOF all count.
    let ended = tokio::time::timeout(Duration::from_secs(2), first.next())
        .await
        .expect("first socket should end once replaced");
    match ended {
        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {}
        Some(Ok(other)) => panic!("Expected the first socket to end, got: {:?}", other),
    }

    // Frames now land on the replacement, and the displaced socket's
    // cleanup must not have evicted it.
    assert_eq!(post_frame(&base, "c-9", vec![4u8, 2]).await, 201);
    let frame = tokio::time::timeout(Duration::from_secs(2), second.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Binary(data) => assert_eq!(data.to_vec(), vec![4, 2]),
        other => panic!("Expected a binary frame, got: {:?}", other),
    }
}
