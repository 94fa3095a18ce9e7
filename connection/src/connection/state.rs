//! Connection session state.
//!
//! A connection walks through a fixed lifecycle.
//!
//! 1. **Disconnected**: Nothing is open yet.
//! 2. **Connecting**: TCP, TLS and the websocket upgrade are in progress.
//! 3. **AwaitingHandshake**: Our handshake is sent. The first message from the
//!    remote must be its handshake, anything else closes the connection.
//! 4. **Ready**: Handshake complete, requests may be sent.
//! 5. **AwaitingPeerResponse**: A `request_peers` is in flight. A response or
//!    a timeout both return to `Ready`.
//!
//! Any failure moves the connection to **Closed**, which is terminal.

use std::fmt;

/// Lifecycle state of a peer connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Ready,
    AwaitingPeerResponse,
    Closed,
}

impl SessionState {
    /// Update the state when the connection attempt starts.
    pub fn on_connect(&self) -> Self {
        match self {
            SessionState::Disconnected => SessionState::Connecting,
            _ => *self,
        }
    }

    /// Update the state when we send our handshake.
    pub fn on_handshake_sent(&self) -> Self {
        match self {
            SessionState::Connecting => SessionState::AwaitingHandshake,
            _ => *self,
        }
    }

    /// Update the state when a valid handshake is received.
    pub fn on_handshake_received(&self) -> Self {
        match self {
            SessionState::AwaitingHandshake => SessionState::Ready,
            _ => *self,
        }
    }

    /// Update the state when we send a peer request.
    pub fn on_peers_requested(&self) -> Self {
        match self {
            SessionState::Ready => SessionState::AwaitingPeerResponse,
            _ => *self,
        }
    }

    /// Update the state when a peer request is answered or times out.
    pub fn on_peers_received(&self) -> Self {
        match self {
            SessionState::AwaitingPeerResponse => SessionState::Ready,
            _ => *self,
        }
    }

    /// Any failure is terminal.
    pub fn on_failure(&self) -> Self {
        SessionState::Closed
    }

    pub fn is_ready(&self) -> bool {
        *self == SessionState::Ready
    }

    pub fn is_closed(&self) -> bool {
        *self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingHandshake => "awaiting handshake",
            SessionState::Ready => "ready",
            SessionState::AwaitingPeerResponse => "awaiting peer response",
            SessionState::Closed => "closed",
        };
        f.write_str(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SessionState::default()
            .on_connect()
            .on_handshake_sent()
            .on_handshake_received();
        assert!(state.is_ready());

        let state = state.on_peers_requested();
        assert_eq!(state, SessionState::AwaitingPeerResponse);
        assert!(state.on_peers_received().is_ready());
    }

    #[test]
    fn test_out_of_order_transitions_are_ignored() {
        // No peer request before the handshake completes.
        assert_eq!(
            SessionState::AwaitingHandshake.on_peers_requested(),
            SessionState::AwaitingHandshake
        );
        assert_eq!(
            SessionState::Connecting.on_handshake_received(),
            SessionState::Connecting
        );
    }

    #[test]
    fn test_closed_is_terminal() {
        let state = SessionState::AwaitingPeerResponse.on_failure();
        assert!(state.is_closed());
        assert!(state
            .on_connect()
            .on_handshake_sent()
            .on_handshake_received()
            .is_closed());
    }
}
