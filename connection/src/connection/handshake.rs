//! Chia handshake helpers.
//!
//! Both sides open with a handshake. The remote's must be the first message we
//! receive and must be for the same network, the async flow lives on
//! [`super::AsyncConnection::handshake`].

use super::configuration::ConnectionConfiguration;
use super::error::{ConnectionError, ProtocolError};
use super::state::SessionState;
use crate::protocol::{Handshake, Message, ProtocolMessageType};
use log::debug;

/// Build the handshake we send, from the local configuration.
pub fn local_handshake(configuration: &ConnectionConfiguration) -> Handshake {
    Handshake {
        network_id: configuration.network_id.clone(),
        protocol_version: configuration.protocol_version.clone(),
        software_version: configuration.software_version.clone(),
        server_port: configuration.server_port,
        node_type: configuration.node_type,
        capabilities: configuration.capabilities.clone(),
    }
}

/// Validate the first message received from the remote.
///
/// The message must be a decodable handshake for the configured network.
pub fn accept_handshake(
    configuration: &ConnectionConfiguration,
    message: &Message,
) -> Result<Handshake, ConnectionError> {
    if message.message_type() != Some(ProtocolMessageType::Handshake) {
        return Err(ProtocolError::UnexpectedMessage {
            state: SessionState::AwaitingHandshake,
            msg_type: message.msg_type,
        }
        .into());
    }

    let handshake: Handshake = message
        .decode_data()
        .map_err(ProtocolError::InvalidHandshake)?;

    if handshake.network_id != configuration.network_id {
        return Err(ProtocolError::NetworkMismatch {
            expected: configuration.network_id.clone(),
            received: handshake.network_id,
        }
        .into());
    }

    debug!("Received handshake: {handshake}");
    Ok(handshake)
}
