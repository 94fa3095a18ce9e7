//! Error types for connection handling.

use super::state::SessionState;
use crate::transport::TransportError;
use crate::wire::WireError;
use std::error::Error;
use std::fmt;
use std::io;
use tokio_rustls::rustls;

/// Violations of the chia protocol by the remote node.
#[derive(Debug)]
pub enum ProtocolError {
    /// A message arrived which is not allowed in the current state.
    UnexpectedMessage { state: SessionState, msg_type: u8 },
    /// The handshake payload could not be decoded.
    InvalidHandshake(WireError),
    /// The remote node is on a different network.
    NetworkMismatch { expected: String, received: String },
    /// An operation was attempted before the connection was ready.
    NotReady(SessionState),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedMessage { state, msg_type } => {
                write!(f, "Unexpected message type {msg_type} while {state}")
            }
            ProtocolError::InvalidHandshake(err) => write!(f, "Invalid handshake: {err}"),
            ProtocolError::NetworkMismatch { expected, received } => {
                write!(f, "Peer is on network {received}, expected {expected}")
            }
            ProtocolError::NotReady(state) => write!(f, "Connection not ready, {state}"),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProtocolError::InvalidHandshake(err) => Some(err),
            ProtocolError::UnexpectedMessage { .. } => None,
            ProtocolError::NetworkMismatch { .. } => None,
            ProtocolError::NotReady(_) => None,
        }
    }
}

/// Errors setting up the TLS layer.
#[derive(Debug)]
pub enum TlsError {
    /// Reading certificate or key material failed.
    Io(io::Error),
    /// No certificates were found in the certificate file.
    NoCertificates,
    /// No private key was found in the key file.
    NoPrivateKey,
    /// The configuration has no client identity to present.
    MissingIdentity,
    /// The remote did not present a certificate.
    NoPeerCertificate,
    /// Rustls rejected the configuration.
    Rustls(rustls::Error),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::Io(err) => write!(f, "Failed to read TLS material: {err}"),
            TlsError::NoCertificates => write!(f, "No certificates found"),
            TlsError::NoPrivateKey => write!(f, "No private key found"),
            TlsError::MissingIdentity => write!(f, "No client certificate configured"),
            TlsError::NoPeerCertificate => write!(f, "Peer presented no certificate"),
            TlsError::Rustls(err) => write!(f, "TLS error: {err}"),
        }
    }
}

impl Error for TlsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TlsError::Io(err) => Some(err),
            TlsError::Rustls(err) => Some(err),
            TlsError::NoCertificates
            | TlsError::NoPrivateKey
            | TlsError::MissingIdentity
            | TlsError::NoPeerCertificate => None,
        }
    }
}

impl From<rustls::Error> for TlsError {
    fn from(err: rustls::Error) -> Self {
        TlsError::Rustls(err)
    }
}

/// Errors that can occur during peer connection establishment and communication.
#[derive(Debug)]
pub enum ConnectionError {
    /// An I/O error occurred during network operations.
    Io(io::Error),
    /// TLS setup or negotiation failed.
    Tls(TlsError),
    /// The peer's host can not be used as a TLS server name.
    InvalidAddress(String),
    /// The connection attempt or handshake took too long.
    TimedOut,
    /// The transport layer (framing and serialization) failed.
    TransportFailed(TransportError),
    /// Chia protocol handling failed.
    ProtocolFailed(ProtocolError),
    /// A message payload could not be decoded.
    MalformedPayload(WireError),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Io(err) => write!(f, "Connection error: {err}"),
            ConnectionError::Tls(err) => write!(f, "TLS failed in peer connection: {err}"),
            ConnectionError::InvalidAddress(host) => write!(f, "Invalid peer address: {host}"),
            ConnectionError::TimedOut => write!(f, "Connection attempt timed out"),
            ConnectionError::TransportFailed(err) => {
                write!(f, "Transport layer failed in peer connection: {err}")
            }
            ConnectionError::ProtocolFailed(err) => {
                write!(f, "Protocol handling failed in peer communication: {err}")
            }
            ConnectionError::MalformedPayload(err) => write!(f, "Malformed payload: {err}"),
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConnectionError::Io(err) => Some(err),
            ConnectionError::Tls(err) => Some(err),
            ConnectionError::InvalidAddress(_) => None,
            ConnectionError::TimedOut => None,
            ConnectionError::TransportFailed(err) => Some(err),
            ConnectionError::ProtocolFailed(err) => Some(err),
            ConnectionError::MalformedPayload(err) => Some(err),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        ConnectionError::Io(err)
    }
}

impl From<TlsError> for ConnectionError {
    fn from(err: TlsError) -> Self {
        ConnectionError::Tls(err)
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        ConnectionError::TransportFailed(err)
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        ConnectionError::ProtocolFailed(err)
    }
}
