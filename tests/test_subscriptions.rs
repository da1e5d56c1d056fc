mod common;

use bytes::Bytes;
use common::connected_client;
use relay_link::{ClientFrame, Message, ServerFrame, SubscribeOptions};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn delivery(sid: u64, subject: &str, payload: &str) -> ServerFrame {
    ServerFrame::Msg {
        sid,
        subject: subject.to_string(),
        reply_to: None,
        payload: Bytes::copy_from_slice(payload.as_bytes()),
    }
}

fn channel_handler() -> (
    impl Fn(Message) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<String>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |msg: Message| {
        let _ = tx.send(msg.payload_lossy());
    }, rx)
}

async fn recv_or_panic(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("delivery should arrive")
        .expect("handler channel open")
}

async fn assert_no_delivery(rx: &mut mpsc::UnboundedReceiver<String>) {
    assert!(
        timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
        "unexpected delivery"
    );
}

#[tokio::test]
async fn test_subscribe_and_deliver() {
    let (client, mut broker) = connected_client().await;
    let (handler, mut rx) = channel_handler();

    let sid = client.subscribe("orders.created", handler).await.unwrap();

    match broker.next_frame().await {
        Some(ClientFrame::Sub {
            sid: wire_sid,
            subject,
            queue_group,
        }) => {
            assert_eq!(wire_sid, sid);
            assert_eq!(subject, "orders.created");
            assert!(queue_group.is_none());
        }
        other => panic!("expected SUB, got {:?}", other),
    }

    broker.deliver(delivery(sid, "orders.created", "hello"));
    assert_eq!(recv_or_panic(&mut rx).await, "hello");
    assert_no_delivery(&mut rx).await;
}

#[tokio::test]
async fn test_queue_group_is_forwarded() {
    let (client, mut broker) = connected_client().await;
    let (handler, _rx) = channel_handler();

    client
        .subscribe_with_options("jobs", SubscribeOptions::new().queue_group("workers"), handler)
        .await
        .unwrap();

    match broker.next_frame().await {
        Some(ClientFrame::Sub { queue_group, .. }) => {
            assert_eq!(queue_group.as_deref(), Some("workers"));
        }
        other => panic!("expected SUB, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deliveries_preserve_order() {
    let (client, mut broker) = connected_client().await;
    let (handler, mut rx) = channel_handler();
    let sid = client.subscribe("seq", handler).await.unwrap();
    broker.next_frame().await; // SUB

    for i in 0..5 {
        broker.deliver(delivery(sid, "seq", &i.to_string()));
    }
    for i in 0..5 {
        assert_eq!(recv_or_panic(&mut rx).await, i.to_string());
    }
}

#[tokio::test]
async fn test_max_deliveries_auto_unsubscribes() {
    let (client, mut broker) = connected_client().await;
    let (handler, mut rx) = channel_handler();

    let sid = client
        .subscribe_with_options("limited", SubscribeOptions::new().max_deliveries(2), handler)
        .await
        .unwrap();
    broker.next_frame().await; // SUB

    broker.deliver(delivery(sid, "limited", "one"));
    broker.deliver(delivery(sid, "limited", "two"));
    assert_eq!(recv_or_panic(&mut rx).await, "one");
    assert_eq!(recv_or_panic(&mut rx).await, "two");

    // Hitting the limit emits an UNSUB for the broker.
    match broker.next_frame().await {
        Some(ClientFrame::Unsub { sid: wire_sid }) => assert_eq!(wire_sid, sid),
        other => panic!("expected UNSUB, got {:?}", other),
    }

    // A racing third delivery is silently dropped.
    broker.deliver(delivery(sid, "limited", "three"));
    assert_no_delivery(&mut rx).await;

    // The engine is still healthy.
    flush_probe(&client, &mut broker).await;
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (client, mut broker) = connected_client().await;
    let (handler, mut rx) = channel_handler();
    let sid = client.subscribe("orders", handler).await.unwrap();
    broker.next_frame().await; // SUB

    client.unsubscribe(sid).await.unwrap();
    match broker.next_frame().await {
        Some(ClientFrame::Unsub { sid: wire_sid }) => assert_eq!(wire_sid, sid),
        other => panic!("expected UNSUB, got {:?}", other),
    }

    // Delivery racing the unsubscribe is dropped without error.
    broker.deliver(delivery(sid, "orders", "late"));
    assert_no_delivery(&mut rx).await;

    // Unsubscribing again is a no-op that emits no frame.
    client.unsubscribe(sid).await.unwrap();
    client.publish("marker", "x").await.unwrap();
    match broker.next_frame().await {
        Some(ClientFrame::Pub { subject, .. }) => assert_eq!(subject, "marker"),
        other => panic!("expected PUB, got {:?}", other),
    }
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_later_deliveries() {
    let (client, mut broker) = connected_client().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sid = client
        .subscribe("flaky", move |msg: Message| {
            if msg.payload_lossy() == "boom" {
                panic!("handler bug");
            }
            let _ = tx.send(msg.payload_lossy());
        })
        .await
        .unwrap();
    broker.next_frame().await; // SUB

    broker.deliver(delivery(sid, "flaky", "boom"));
    broker.deliver(delivery(sid, "flaky", "fine"));
    assert_eq!(recv_or_panic(&mut rx).await, "fine");
}

/// Round-trip helper: proves the dispatch loop is still alive.
async fn flush_probe(
    client: &relay_link::RelayLinkClient,
    broker: &mut relay_link::transport::BrokerEnd,
) {
    let client = client.clone();
    let flush = tokio::spawn(async move { client.flush().await });
    match broker.next_frame().await {
        Some(ClientFrame::Ping) => {}
        other => panic!("expected PING, got {:?}", other),
    }
    broker.deliver(ServerFrame::Pong);
    flush.await.unwrap().unwrap();
}
