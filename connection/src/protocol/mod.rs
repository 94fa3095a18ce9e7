//! Chia protocol messages.
//!
//! Every frame exchanged with a peer carries a single [`Message`] envelope. The
//! envelope payload stays opaque until it is decoded against the schema of its
//! [`ProtocolMessageType`].

mod types;

pub use types::{
    Capability, Handshake, NodeType, RequestPeers, RespondPeers, TimestampedPeerInfo,
    CAPABILITY_BASE,
};

use crate::wire::{self, wire_struct, Bytes, Decode, Encode, WireError};
use std::fmt;

macro_rules! message_types {
    ($($variant:ident = $value:literal,)*) => {
        /// Message type ids of the chia protocol.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum ProtocolMessageType {
            $($variant = $value,)*
        }

        impl ProtocolMessageType {
            /// Look up a message type by its id.
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(ProtocolMessageType::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

message_types! {
    // Shared.
    Handshake = 1,
    // Harvester and farmer.
    HarvesterHandshake = 3,
    NewSignagePointHarvester = 4,
    NewProofOfSpace = 5,
    RequestSignatures = 6,
    RespondSignatures = 7,
    // Farmer and full node.
    NewSignagePoint = 8,
    DeclareProofOfSpace = 9,
    RequestSignedValues = 10,
    SignedValues = 11,
    FarmingInfo = 12,
    // Timelord and full node.
    NewPeakTimelord = 13,
    NewUnfinishedBlockTimelord = 14,
    NewInfusionPointVdf = 15,
    NewSignagePointVdf = 16,
    NewEndOfSubSlotVdf = 17,
    RequestCompactProofOfTime = 18,
    RespondCompactProofOfTime = 19,
    // Full node.
    NewPeak = 20,
    NewTransaction = 21,
    RequestTransaction = 22,
    RespondTransaction = 23,
    RequestProofOfWeight = 24,
    RespondProofOfWeight = 25,
    RequestBlock = 26,
    RespondBlock = 27,
    RejectBlock = 28,
    RequestBlocks = 29,
    RespondBlocks = 30,
    RejectBlocks = 31,
    NewUnfinishedBlock = 32,
    RequestUnfinishedBlock = 33,
    RespondUnfinishedBlock = 34,
    NewSignagePointOrEndOfSubSlot = 35,
    RequestSignagePointOrEndOfSubSlot = 36,
    RespondSignagePoint = 37,
    RespondEndOfSubSlot = 38,
    RequestMempoolTransactions = 39,
    RequestCompactVdf = 40,
    RespondCompactVdf = 41,
    NewCompactVdf = 42,
    RequestPeers = 43,
    RespondPeers = 44,
    // Wallet.
    RequestPuzzleSolution = 45,
    RespondPuzzleSolution = 46,
    RejectPuzzleSolution = 47,
    SendTransaction = 48,
    TransactionAck = 49,
    NewPeakWallet = 50,
    RequestBlockHeader = 51,
    RespondBlockHeader = 52,
    RejectHeaderRequest = 53,
    RequestRemovals = 54,
    RespondRemovals = 55,
    RejectRemovalsRequest = 56,
    RequestAdditions = 57,
    RespondAdditions = 58,
    RejectAdditionsRequest = 59,
    RequestHeaderBlocks = 60,
    RejectHeaderBlocks = 61,
    RespondHeaderBlocks = 62,
    // Introducer.
    RequestPeersIntroducer = 63,
    RespondPeersIntroducer = 64,
    // Simulator.
    FarmNewBlock = 65,
}

impl From<ProtocolMessageType> for u8 {
    fn from(message_type: ProtocolMessageType) -> Self {
        message_type as u8
    }
}

/// Envelope for a single protocol message.
///
/// Requests carry an `id` which the response echoes back. Like any optional on
/// the wire, an id of `0` is sent as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw message type id, kept raw so unknown types still decode.
    pub msg_type: u8,
    pub id: Option<u16>,
    pub data: Bytes,
}

wire_struct!(Message { msg_type, id, data });

impl Message {
    /// Build a message with `payload` encoded as its data.
    pub fn new<T: Encode>(
        message_type: ProtocolMessageType,
        id: Option<u16>,
        payload: &T,
    ) -> Self {
        Message {
            msg_type: message_type.into(),
            id,
            data: Bytes::from(wire::encode(payload)),
        }
    }

    /// The known message type, if any.
    pub fn message_type(&self) -> Option<ProtocolMessageType> {
        ProtocolMessageType::from_u8(self.msg_type)
    }

    /// Decode the payload, which must span all of the data.
    pub fn decode_data<T: Decode>(&self) -> Result<T, WireError> {
        wire::decode_exact(self.data.as_slice())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message_type() {
            Some(message_type) => write!(f, "{message_type:?}")?,
            None => write!(f, "Unknown({})", self.msg_type)?,
        }
        if let Some(id) = self.id {
            write!(f, " #{id}")?;
        }
        write!(f, " ({} bytes)", self.data.as_slice().len())
    }
}
