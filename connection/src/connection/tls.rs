//! TLS websocket connections.
//!
//! Chia nodes authenticate each other with self-signed certificates, so the
//! server certificate is accepted without chain validation. Signatures in the
//! TLS handshake are still checked. A node's id is the SHA-256 of the leaf
//! certificate it presents.

use super::error::{ConnectionError, TlsError};
use super::{AsyncConnection, ConnectionConfiguration};
use crate::peer::{NodeId, Peer};
use crate::transport::TransportError;
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{self, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

/// A TLS websocket connection to a chia peer.
pub type TlsConnection = AsyncConnection<TlsStream<TcpStream>>;

/// Client certificate presented to peers.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    config: Arc<ClientConfig>,
}

impl TlsIdentity {
    /// Build an identity from a certificate chain and its private key.
    pub fn new(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, TlsError> {
        if chain.is_empty() {
            return Err(TlsError::NoCertificates);
        }

        let provider = Arc::new(crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_client_auth_cert(chain, key)?;

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Load an identity from PEM files, e.g. a node's `public_full_node.crt` and `.key`.
    pub fn from_pem_files(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, TlsError> {
        let mut cert_reader = BufReader::new(File::open(cert_path).map_err(TlsError::Io)?);
        let chain = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(TlsError::Io)?;

        let mut key_reader = BufReader::new(File::open(key_path).map_err(TlsError::Io)?);
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(TlsError::Io)?
            .ok_or(TlsError::NoPrivateKey)?;

        Self::new(chain, key)
    }

    fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.config.clone())
    }
}

/// Accepts any server certificate, but still verifies handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Helper function to establish TCP connection with timeout and nodelay.
async fn establish_tcp_connection(
    peer: &Peer,
    connect_timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    match timeout(
        connect_timeout,
        TcpStream::connect((peer.host.as_str(), peer.port)),
    )
    .await
    {
        Ok(Ok(stream)) => {
            // Chia messages are small and latency bound.
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(ConnectionError::Io(e)),
        Err(_) => Err(ConnectionError::TimedOut),
    }
}

/// Establish a TLS websocket connection to a chia peer and perform the handshake.
///
/// This function handles:
/// 1. TCP connection establishment with timeout
/// 2. TLS with the configured client certificate
/// 3. Node id derivation from the server certificate
/// 4. Websocket upgrade at `/ws`
/// 5. Chia handshake
pub async fn connect(
    peer: Peer,
    configuration: ConnectionConfiguration,
) -> Result<TlsConnection, ConnectionError> {
    let connector = configuration
        .identity
        .as_ref()
        .ok_or(TlsError::MissingIdentity)?
        .connector();
    let server_name = ServerName::try_from(peer.host.clone())
        .map_err(|_| ConnectionError::InvalidAddress(peer.host.clone()))?;

    debug!("Connecting to {peer}");
    let stream = establish_tcp_connection(&peer, configuration.connection_timeout).await?;

    let tls = match timeout(
        configuration.connection_timeout,
        connector.connect(server_name, stream),
    )
    .await
    {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => return Err(ConnectionError::Io(e)),
        Err(_) => return Err(ConnectionError::TimedOut),
    };

    let node_id = tls
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|chain| chain.first())
        .map(|cert| NodeId::from_certificate(cert.as_ref()))
        .ok_or(TlsError::NoPeerCertificate)?;
    debug!("TLS established with {peer}, node id {node_id}");

    let (websocket, _response) = match timeout(
        configuration.connection_timeout,
        tokio_tungstenite::client_async(peer.websocket_url(), tls),
    )
    .await
    {
        Ok(Ok(upgraded)) => upgraded,
        Ok(Err(e)) => return Err(TransportError::WebSocket(e).into()),
        Err(_) => return Err(ConnectionError::TimedOut),
    };

    let mut connection = AsyncConnection::new(peer, node_id, configuration, websocket);
    connection.handshake().await?;

    Ok(connection)
}
