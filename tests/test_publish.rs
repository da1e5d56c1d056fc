mod common;

use bytes::Bytes;
use common::connected_client;
use relay_link::{ClientFrame, RelayLinkClient, RelayLinkError, RelayLinkTimeouts};

#[tokio::test]
async fn test_publish_emits_pub_frame() {
    let (client, mut broker) = connected_client().await;

    client.publish("orders.created", "hello").await.unwrap();

    match broker.next_frame().await {
        Some(ClientFrame::Pub {
            subject,
            reply_to,
            payload,
        }) => {
            assert_eq!(subject, "orders.created");
            assert!(reply_to.is_none());
            assert_eq!(payload, Bytes::from_static(b"hello"));
        }
        other => panic!("expected PUB, got {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_with_reply_carries_reply_subject() {
    let (client, mut broker) = connected_client().await;

    client
        .publish_with_reply("svc.echo", "my.reply", "ping")
        .await
        .unwrap();

    match broker.next_frame().await {
        Some(ClientFrame::Pub { reply_to, .. }) => {
            assert_eq!(reply_to.as_deref(), Some("my.reply"));
        }
        other => panic!("expected PUB, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_subjects_are_rejected_before_send() {
    let (client, mut broker) = connected_client().await;

    assert!(matches!(
        client.publish("", "x").await,
        Err(RelayLinkError::BadSubject(_))
    ));
    assert!(matches!(
        client.publish("has space", "x").await,
        Err(RelayLinkError::BadSubject(_))
    ));

    // Nothing reached the wire; the next frame is the valid publish.
    client.publish("ok", "x").await.unwrap();
    match broker.next_frame().await {
        Some(ClientFrame::Pub { subject, .. }) => assert_eq!(subject, "ok"),
        other => panic!("expected PUB, got {:?}", other),
    }
}

#[tokio::test]
async fn test_oversized_payload_is_rejected() {
    let (client, _broker) = common::connected_client_with(
        RelayLinkClient::builder()
            .timeouts(RelayLinkTimeouts::fast())
            .max_payload(8),
    )
    .await;

    let err = client.publish("big", "way more than eight bytes").await;
    match err {
        Err(RelayLinkError::MaxPayloadExceeded { size, limit }) => {
            assert!(size > limit);
            assert_eq!(limit, 8);
        }
        other => panic!("expected MaxPayloadExceeded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_after_close_fails() {
    let (client, _broker) = connected_client().await;
    client.close().await;
    assert!(client.is_closed());
    assert!(matches!(
        client.publish("orders.created", "x").await,
        Err(RelayLinkError::ConnectionClosed)
    ));
}
