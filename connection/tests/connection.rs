//! Integration tests for the Connection module against a loopback chia node.
//!
//! The node terminates TLS with a throwaway self-signed certificate, upgrades
//! to a websocket at `/ws` and answers the handshake and peer requests the
//! way a full node does.

use chia_peers_connection::protocol::{
    Handshake, Message, NodeType, ProtocolMessageType, RespondPeers, TimestampedPeerInfo,
};
use chia_peers_connection::{
    wire, Connection, ConnectionConfiguration, ConnectionError, NodeId, Peer, ProtocolError,
    SessionState, TlsError, TlsIdentity,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite;

fn self_signed() -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let certified = rcgen::generate_simple_self_signed(vec!["chia.net".to_string()]).unwrap();
    let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
    (certified.cert.der().clone(), PrivateKeyDer::Pkcs8(key))
}

fn client_identity() -> TlsIdentity {
    let (cert, key) = self_signed();
    TlsIdentity::new(vec![cert], key).unwrap()
}

fn handshake(network_id: &str) -> Handshake {
    Handshake {
        network_id: network_id.to_string(),
        protocol_version: "0.0.36".to_string(),
        software_version: "2.4.1".to_string(),
        server_port: 8444,
        node_type: NodeType::FullNode,
        capabilities: vec![(1, "1".to_string()), (2, "1".to_string())],
    }
}

/// Start a single connection chia node, returns its port and certificate.
async fn spawn_node(network_id: &'static str) -> (u16, CertificateDer<'static>) {
    let (cert, key) = self_signed();
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert.clone()], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let tls = acceptor.accept(stream).await.unwrap();
        let mut websocket = tokio_tungstenite::accept_async(tls).await.unwrap();

        let reply = Message::new(ProtocolMessageType::Handshake, None, &handshake(network_id));
        websocket
            .send(tungstenite::Message::Binary(wire::encode(&reply).into()))
            .await
            .unwrap();

        while let Some(Ok(frame)) = websocket.next().await {
            let tungstenite::Message::Binary(data) = frame else {
                continue;
            };
            let message: Message = wire::decode_exact(&data).unwrap();
            if message.message_type() == Some(ProtocolMessageType::RequestPeers) {
                let response = RespondPeers {
                    peer_list: vec![TimestampedPeerInfo {
                        host: "10.0.0.2".to_string(),
                        port: 8444,
                        timestamp: 1_700_000_000,
                    }],
                };
                let reply = Message::new(ProtocolMessageType::RespondPeers, message.id, &response);
                if websocket
                    .send(tungstenite::Message::Binary(wire::encode(&reply).into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    });

    (port, cert)
}

#[tokio::test]
async fn test_tls_connection_and_peer_exchange() {
    let (port, server_cert) = spawn_node("mainnet").await;
    let config = ConnectionConfiguration::full_node("mainnet", Some(client_identity()))
        .with_connection_timeout(Duration::from_secs(5));

    let mut connection = Connection::tls(Peer::new("127.0.0.1", port), config)
        .await
        .expect("Failed to establish connection");
    assert_eq!(connection.state(), SessionState::Ready);

    let node = connection.node().expect("Handshake not recorded");
    assert_eq!(node.node_id, NodeId::from_certificate(server_cert.as_ref()));
    assert_eq!(node.handshake, handshake("mainnet"));
    assert_eq!(node.peer, Peer::new("127.0.0.1", port));

    let peers = connection
        .request_peers(Duration::from_secs(5))
        .await
        .expect("Failed to request peers");
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].host, "10.0.0.2");
    assert_eq!(peers[0].port, 8444);

    // A second round uses a fresh request id and still matches.
    let peers = connection
        .request_peers(Duration::from_secs(5))
        .await
        .expect("Failed to request peers");
    assert_eq!(peers.len(), 1);

    connection.close().await;
    assert_eq!(connection.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_tls_connection_network_mismatch() {
    let (port, _) = spawn_node("testnet10").await;
    let config = ConnectionConfiguration::full_node("mainnet", Some(client_identity()));

    match Connection::tls(Peer::new("127.0.0.1", port), config).await {
        Err(ConnectionError::ProtocolFailed(ProtocolError::NetworkMismatch {
            expected,
            received,
        })) => {
            assert_eq!(expected, "mainnet");
            assert_eq!(received, "testnet10");
        }
        other => panic!("Expected network mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_tls_connection_requires_identity() {
    let config = ConnectionConfiguration::default();
    assert!(matches!(
        Connection::tls(Peer::new("127.0.0.1", 8444), config).await,
        Err(ConnectionError::Tls(TlsError::MissingIdentity))
    ));
}

#[tokio::test]
async fn test_tls_connection_refused() {
    // Bind then drop to find a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ConnectionConfiguration::full_node("mainnet", Some(client_identity()))
        .with_connection_timeout(Duration::from_secs(2));
    assert!(matches!(
        Connection::tls(Peer::new("127.0.0.1", port), config).await,
        Err(ConnectionError::Io(_))
    ));
}
