//! The relay wire message.

use crate::{UserId, WireError};
use serde::{Deserialize, Serialize};

/// A single relayed message.
///
/// Immutable once constructed. The same shape is used for the handshake
/// (where only `senderID` is meaningful), for client-to-relay sends, and for
/// relay-to-client deliveries, including offline replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Target user of this message.
    #[serde(rename = "recipientID")]
    pub recipient_id: UserId,
    /// Originating user.
    #[serde(rename = "senderID")]
    pub sender_id: UserId,
    /// Opaque ciphertext payload. Never interpreted by the relay.
    #[serde(rename = "encryptedContent")]
    pub encrypted_content: String,
}

impl Message {
    /// Serialize to the JSON wire encoding.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Json)
    }

    /// Deserialize from the JSON wire encoding.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Json)
    }
}
