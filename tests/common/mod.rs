#![allow(dead_code)]

use relay_link::transport::{memory_pair, BrokerEnd};
use relay_link::{
    ClientFrame, RelayLinkClient, RelayLinkClientBuilder, RelayLinkTimeouts, ServerFrame,
    ServerInfo,
};

/// Play the broker side of the handshake: greet with INFO, accept CONNECT,
/// and answer the verification PING.
pub async fn accept_connect(broker: &mut BrokerEnd) {
    broker.deliver(ServerFrame::Info(ServerInfo {
        server_id: "test-broker".to_string(),
        version: "0.1.0".to_string(),
        max_payload: 1_048_576,
        ..Default::default()
    }));
    match broker.next_frame().await {
        Some(ClientFrame::Connect(_)) => {}
        other => panic!("expected CONNECT, got {:?}", other),
    }
    match broker.next_frame().await {
        Some(ClientFrame::Ping) => {}
        other => panic!("expected PING, got {:?}", other),
    }
    broker.deliver(ServerFrame::Pong);
}

/// Connect a client with fast timeouts over an in-memory transport.
pub async fn connected_client() -> (RelayLinkClient, BrokerEnd) {
    connected_client_with(RelayLinkClient::builder().timeouts(RelayLinkTimeouts::fast())).await
}

/// Connect a client built from the given builder, running the broker side of
/// the handshake concurrently.
pub async fn connected_client_with(
    builder: RelayLinkClientBuilder,
) -> (RelayLinkClient, BrokerEnd) {
    let (transport, mut broker) = memory_pair();
    let handshake = tokio::spawn(async move {
        accept_connect(&mut broker).await;
        broker
    });
    let client = builder
        .connect(Box::new(transport))
        .await
        .expect("handshake should succeed");
    let broker = handshake.await.unwrap();
    (client, broker)
}
