//! Chia websocket transport.
//!
//! Chia nodes exchange messages over a websocket at `/ws`. Each binary frame
//! carries exactly one wire encoded [`Message`]. The transport only deals with
//! framing, the connection layer above it tracks protocol state.
//!
//! # Example
//!
//! ```no_run
//! use chia_peers_connection::protocol::{Message, ProtocolMessageType, RequestPeers};
//! use chia_peers_connection::Transport;
//!
//! # async fn example<S>(stream: tokio_tungstenite::WebSocketStream<S>) -> Result<(), Box<dyn std::error::Error>>
//! # where S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {
//! let mut transport = Transport::new(stream);
//!
//! let request = Message::new(ProtocolMessageType::RequestPeers, Some(1), &RequestPeers {});
//! transport.write(&request).await?;
//!
//! let response = transport.read().await?;
//! println!("Received: {response}");
//! # Ok(())
//! # }
//! ```

use crate::protocol::Message;
use crate::wire::{self, WireError};
use futures_util::{SinkExt, StreamExt};
use log::debug;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::WebSocketStream;

/// Error types specific to the transport layer.
#[derive(Debug)]
pub enum TransportError {
    /// Websocket protocol or underlying I/O failure.
    WebSocket(tungstenite::Error),
    /// Failed to deserialize a message.
    Deserialize(WireError),
    /// A frame which does not carry a message, e.g. text.
    UnexpectedFrame(&'static str),
    /// The remote closed the stream.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::WebSocket(e) => write!(f, "Websocket error: {e}"),
            TransportError::Deserialize(e) => write!(f, "Message deserialization error: {e}"),
            TransportError::UnexpectedFrame(kind) => write!(f, "Unexpected {kind} frame"),
            TransportError::Closed => write!(f, "Stream closed by remote"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::WebSocket(e) => Some(e),
            TransportError::Deserialize(e) => Some(e),
            TransportError::UnexpectedFrame(_) => None,
            TransportError::Closed => None,
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        TransportError::WebSocket(e)
    }
}

impl From<WireError> for TransportError {
    fn from(e: WireError) -> Self {
        TransportError::Deserialize(e)
    }
}

/// Message framing over a websocket stream.
#[derive(Debug)]
pub struct Transport<S> {
    stream: WebSocketStream<S>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }

    /// Read the next message.
    ///
    /// Ping and pong frames are answered by the websocket layer and skipped here.
    pub async fn read(&mut self) -> Result<Message, TransportError> {
        loop {
            let frame = match self.stream.next().await {
                Some(frame) => frame?,
                None => return Err(TransportError::Closed),
            };

            match frame {
                tungstenite::Message::Binary(data) => {
                    return Ok(wire::decode_exact::<Message>(&data)?);
                }
                tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => {
                    debug!("Skipping websocket control frame");
                }
                tungstenite::Message::Close(_) => return Err(TransportError::Closed),
                tungstenite::Message::Text(_) => {
                    return Err(TransportError::UnexpectedFrame("text"))
                }
                tungstenite::Message::Frame(_) => {
                    return Err(TransportError::UnexpectedFrame("raw"))
                }
            }
        }
    }

    /// Write a message as a single binary frame.
    pub async fn write(&mut self, message: &Message) -> Result<(), TransportError> {
        let bytes = wire::encode(message);
        self.stream
            .send(tungstenite::Message::Binary(bytes.into()))
            .await?;
        Ok(())
    }

    /// Send a close frame and flush it.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
